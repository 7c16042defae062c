use std::io::{Cursor, Read};

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tabula_model::{
    CellRef, CellValue, Color, ColumnDef, Comment, DateSystem, Fill, Font, Range, RichText,
    RichTextRun, SheetState, Style, Workbook,
};
use tabula_xlsx::{read_workbook_from_bytes, write_workbook_to_vec, ReadOptions, WriteOptions};
use zip::ZipArchive;

fn roundtrip(workbook: &Workbook) -> Workbook {
    let bytes = write_workbook_to_vec(workbook, &WriteOptions::default()).expect("write");
    read_workbook_from_bytes(&bytes, &ReadOptions::default()).expect("read")
}

fn r(a1: &str) -> Range {
    Range::from_a1(a1).unwrap()
}

#[test]
fn basic_values_names_and_merges_survive() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_sheet("Sheet1").unwrap();
    sheet.set_value(CellRef::new(1, 1), "Hello");
    sheet.set_value(CellRef::new(2, 1), 7.0);
    sheet.merge_cells(r("B1:C1")).unwrap();
    workbook.defined_names.add("Sheet1!$A$1", "Greeting").unwrap();

    let back = roundtrip(&workbook);
    let sheet = back.sheet("Sheet1").unwrap();
    assert_eq!(sheet.value(CellRef::new(1, 1)), &CellValue::from("Hello"));
    assert_eq!(sheet.value(CellRef::new(2, 1)), &CellValue::Number(7.0));
    assert_eq!(sheet.merges(), &[r("B1:C1")]);
    assert_eq!(
        sheet.value(CellRef::new(1, 3)),
        &CellValue::Merge(CellRef::new(1, 2))
    );
    assert_eq!(back.defined_names.ranges("Greeting"), vec!["Sheet1!$A$1"]);
}

#[test]
fn styles_are_interned_and_mapped_back() {
    let mut workbook = Workbook::new();
    let header = workbook.intern_style(Style {
        font: Some(Font {
            bold: true,
            ..Font::default()
        }),
        fill: Some(Fill::solid(Color::argb(0xFFDDEEFF))),
        ..Style::default()
    });
    let percent = workbook.intern_style(Style {
        num_fmt: Some("0.0%".into()),
        ..Style::default()
    });
    let sheet = workbook.add_sheet("Report").unwrap();
    for col in 1..=3 {
        sheet.set_value(CellRef::new(1, col), format!("h{col}"));
        sheet.set_style(CellRef::new(1, col), header);
    }
    sheet.set_value(CellRef::new(2, 1), 0.25);
    sheet.set_style(CellRef::new(2, 1), percent);

    let bytes = write_workbook_to_vec(&workbook, &WriteOptions::default()).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
    let mut styles = String::new();
    archive
        .by_name("xl/styles.xml")
        .unwrap()
        .read_to_string(&mut styles)
        .unwrap();
    let doc = roxmltree::Document::parse(&styles).unwrap();
    let xfs = doc
        .descendants()
        .find(|n| n.has_tag_name("cellXfs"))
        .unwrap();
    // Default plus the two distinct styles, shared by every header cell.
    assert_eq!(xfs.attribute("count"), Some("3"));

    let back = read_workbook_from_bytes(&bytes, &ReadOptions::default()).unwrap();
    let sheet = back.sheet("Report").unwrap();
    let ids: Vec<u32> = (1..=3)
        .map(|col| sheet.cell(CellRef::new(1, col)).unwrap().style_id)
        .collect();
    assert!(ids.iter().all(|id| *id == ids[0] && *id != 0));
    let header = back.styles.get(ids[0]).unwrap();
    assert!(header.font.as_ref().is_some_and(|f| f.bold));
    let percent = back
        .styles
        .get(sheet.cell(CellRef::new(2, 1)).unwrap().style_id)
        .unwrap();
    assert_eq!(percent.num_fmt.as_deref(), Some("0.0%"));
}

#[test]
fn dates_follow_the_date_system() {
    let when = NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    for system in [DateSystem::Excel1900, DateSystem::Excel1904] {
        let mut workbook = Workbook::new();
        workbook.date_system = system;
        let style = workbook.intern_style(Style {
            num_fmt: Some("yyyy-mm-dd hh:mm".into()),
            ..Style::default()
        });
        let sheet = workbook.add_sheet("Dates").unwrap();
        sheet.set_value(CellRef::new(1, 1), when);
        sheet.set_style(CellRef::new(1, 1), style);

        let back = roundtrip(&workbook);
        assert_eq!(back.date_system, system);
        assert_eq!(
            back.sheet("Dates").unwrap().value(CellRef::new(1, 1)),
            &CellValue::Date(when)
        );
    }
}

#[test]
fn rich_text_comments_and_sheet_settings() {
    let mut workbook = Workbook::new();
    let rich = RichText::new(vec![
        RichTextRun::plain("plain "),
        RichTextRun::styled(
            "bold",
            Font {
                bold: true,
                ..Font::default()
            },
        ),
    ]);
    let sheet = workbook.add_sheet("Notes").unwrap();
    sheet.set_value(CellRef::new(1, 1), rich.clone());
    sheet.set_comment(
        CellRef::new(1, 1),
        Some(Comment::new(Some("reviewer".into()), "check this")),
    );
    sheet.set_column(ColumnDef::new(2, 4).with_width(18.5));
    sheet.state = SheetState::Hidden;
    workbook.add_sheet("Visible").unwrap();
    workbook.active_sheet = 1;
    workbook.properties.creator = Some("tests".into());
    workbook.properties.company = Some("Tabula".into());

    let back = roundtrip(&workbook);
    let notes = back.sheet("Notes").unwrap();
    assert_eq!(notes.state, SheetState::Hidden);
    assert_eq!(notes.value(CellRef::new(1, 1)), &CellValue::RichText(rich));
    let comment = notes
        .cell(CellRef::new(1, 1))
        .and_then(|c| c.comment.clone())
        .unwrap();
    assert_eq!(comment.author.as_deref(), Some("reviewer"));
    assert_eq!(comment.text.plain_text(), "check this");
    let col = notes.column(3).unwrap();
    assert_eq!((col.min, col.max), (2, 4));
    assert_eq!(col.width.map(|w| w.0), Some(18.5));
    assert_eq!(back.active_sheet, 1);
    assert_eq!(back.properties.creator.as_deref(), Some("tests"));
    assert_eq!(back.properties.company.as_deref(), Some("Tabula"));
}

#[test]
fn loaded_theme_is_written_back_verbatim() {
    let mut workbook = Workbook::new();
    workbook.add_sheet("S").unwrap();
    let first = roundtrip(&workbook);
    let theme = first.theme_xml.clone().expect("default theme is loaded");
    assert!(theme.contains("a:clrScheme"));
    let second = roundtrip(&first);
    assert_eq!(second.theme_xml.as_deref(), Some(theme.as_str()));
}

#[test]
fn path_helpers_write_and_read_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    let mut workbook = Workbook::new();
    workbook
        .add_sheet("Disk")
        .unwrap()
        .set_value(CellRef::new(3, 2), true);
    tabula_xlsx::write_workbook_to_path(&workbook, &path, &WriteOptions::default()).unwrap();
    let back = tabula_xlsx::read_workbook_from_path(&path, &ReadOptions::default()).unwrap();
    assert_eq!(
        back.sheet("Disk").unwrap().value(CellRef::new(3, 2)),
        &CellValue::Boolean(true)
    );
}
