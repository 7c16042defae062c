use std::error::Error;
use std::fs::File;
use std::io::{BufReader, Cursor};

use pretty_assertions::assert_eq;
use tabula_model::{CellRef, CellValue, Font, Row, Style, Workbook};
use tabula_xlsx::{
    read_workbook_from_bytes, write_workbook_to_vec, ReadOptions, ReaderEvent,
    SharedStringsMode, StreamingReadOptions, WorkbookReader, WorkbookWriter, WriteOptions,
};

fn sample_workbook() -> Workbook {
    let mut workbook = Workbook::new();
    let bold = workbook.intern_style(Style::default().with_font(Font {
        bold: true,
        ..Font::default()
    }));
    for name in ["North", "South"] {
        let sheet = workbook.add_sheet(name).unwrap();
        sheet.set_value(CellRef::new(1, 1), "region");
        sheet.set_value(CellRef::new(1, 2), "total");
        sheet.set_style(CellRef::new(1, 1), bold);
        sheet.set_style(CellRef::new(1, 2), bold);
        for row in 2..=20 {
            sheet.set_value(CellRef::new(row, 1), format!("{name}-{row}"));
            sheet.set_value(CellRef::new(row, 2), f64::from(row) * 1.5);
        }
    }
    workbook
}

#[test]
fn streaming_read_matches_eager_read() -> Result<(), Box<dyn Error>> {
    let bytes = write_workbook_to_vec(&sample_workbook(), &WriteOptions::default())?;
    let eager = read_workbook_from_bytes(&bytes, &ReadOptions::default())?;

    let mut reader = WorkbookReader::new(Cursor::new(bytes), StreamingReadOptions::default())?;
    let sheets = reader.worksheets().to_vec();
    assert_eq!(sheets.len(), eager.sheets().len());

    for info in &sheets {
        let expected = eager.sheet(&info.name).expect("sheet present in both");
        let streamed = reader.rows(info)?.collect::<Result<Vec<(u32, Row)>, _>>()?;
        assert_eq!(streamed.len() as u32, expected.last_row());
        for (number, row) in &streamed {
            for (col, cell) in row.iter() {
                let addr = CellRef::new(*number, col);
                assert_eq!(&cell.value, expected.value(addr), "{} {addr:?}", info.name);
                let eager_style = eager.styles.get(expected.cell(addr).unwrap().style_id);
                assert_eq!(reader.styles().get(cell.style_id), eager_style);
            }
        }
    }
    Ok(())
}

#[test]
fn emitted_shared_strings_precede_worksheets() -> Result<(), Box<dyn Error>> {
    let bytes = write_workbook_to_vec(&sample_workbook(), &WriteOptions::default())?;
    let options = StreamingReadOptions {
        shared_strings: SharedStringsMode::Emit,
        ..StreamingReadOptions::default()
    };
    let events: Vec<ReaderEvent> =
        WorkbookReader::new(Cursor::new(bytes), options)?.collect::<Result<_, _>>()?;

    let first_sheet = events
        .iter()
        .position(|e| matches!(e, ReaderEvent::Worksheet(_)))
        .expect("worksheet events");
    let strings: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            ReaderEvent::SharedString { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    // "region", "total" and 19 labels per sheet.
    assert_eq!(strings, (0..40).collect::<Vec<_>>());
    assert!(events[..first_sheet]
        .iter()
        .all(|e| matches!(e, ReaderEvent::SharedString { .. })));
    assert_eq!(events.last(), Some(&ReaderEvent::Finished));
    Ok(())
}

#[test]
fn streaming_writer_to_file_then_streaming_read() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("large.xlsx");

    let mut book = WorkbookWriter::new(File::create(&path)?, &WriteOptions::default())?;
    let mut sheet = book.add_worksheet("Log")?;
    for number in 1..=2_000u32 {
        let mut row = Row::default();
        row.get_or_create(1).value = CellValue::Number(f64::from(number));
        row.get_or_create(2).value = CellValue::from(if number % 2 == 0 { "even" } else { "odd" });
        sheet.add_row(number, &row)?;
    }
    sheet.commit()?;
    book.finish()?;

    let mut reader = WorkbookReader::new(
        BufReader::new(File::open(&path)?),
        StreamingReadOptions::default(),
    )?;
    let info = reader.worksheets()[0].clone();
    assert_eq!(info.name, "Log");

    let mut count = 0u32;
    for row in reader.rows(&info)? {
        let (number, row) = row?;
        count += 1;
        assert_eq!(number, count);
        assert_eq!(
            row.cell(1).map(|c| &c.value),
            Some(&CellValue::Number(f64::from(number)))
        );
    }
    assert_eq!(count, 2_000);
    // Two distinct labels, however many cells use them.
    assert_eq!(reader.shared_strings().len(), 2);
    Ok(())
}
