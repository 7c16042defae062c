use std::io::{Cursor, Read, Write};

use tabula_model::{CellRef, Workbook};
use tabula_xlsx::{
    read_workbook_from_bytes, write_workbook_to_vec, PackageLimits, ReadOptions, WriteOptions,
    XlsxError,
};

fn workbook_with_rows(rows: u32, cols: u32) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_sheet("Data").unwrap();
    for row in 1..=rows {
        for col in 1..=cols {
            sheet.set_value(CellRef::new(row, col), f64::from(row * col));
        }
    }
    write_workbook_to_vec(&workbook, &WriteOptions::default()).unwrap()
}

/// Copy `bytes` with `part` replaced by `xml`.
fn replace_part(bytes: &[u8], part: &str, xml: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let name = entry.name().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        out.start_file(name.as_str(), zip::write::SimpleFileOptions::default())
            .unwrap();
        if name == part {
            out.write_all(xml.as_bytes()).unwrap();
        } else {
            out.write_all(&data).unwrap();
        }
    }
    out.finish().unwrap().into_inner()
}

fn with_max_rows(max: usize) -> ReadOptions {
    ReadOptions {
        max_rows: Some(max),
        ..ReadOptions::default()
    }
}

#[test]
fn row_limit_is_inclusive() {
    let bytes = workbook_with_rows(10, 1);
    let workbook = read_workbook_from_bytes(&bytes, &with_max_rows(10)).unwrap();
    assert_eq!(workbook.sheet("Data").unwrap().last_row(), 10);
}

#[test]
fn one_row_over_the_limit_fails() {
    let bytes = workbook_with_rows(11, 1);
    let err = read_workbook_from_bytes(&bytes, &with_max_rows(10)).unwrap_err();
    assert!(
        matches!(err, XlsxError::RowLimitExceeded { max: 10 }),
        "unexpected error: {err:?}"
    );
}

#[test]
fn column_limit_counts_cells_per_row() {
    let bytes = workbook_with_rows(2, 3);
    let options = ReadOptions {
        max_cols: Some(3),
        ..ReadOptions::default()
    };
    assert!(read_workbook_from_bytes(&bytes, &options).is_ok());

    let options = ReadOptions {
        max_cols: Some(2),
        ..ReadOptions::default()
    };
    let err = read_workbook_from_bytes(&bytes, &options).unwrap_err();
    assert!(matches!(err, XlsxError::ColumnLimitExceeded { max: 2 }));
}

#[test]
fn oversized_part_is_rejected() {
    let bytes = workbook_with_rows(50, 5);
    let options = ReadOptions {
        limits: PackageLimits {
            max_part_bytes: 64,
            ..PackageLimits::default()
        },
        ..ReadOptions::default()
    };
    let err = read_workbook_from_bytes(&bytes, &options).unwrap_err();
    assert!(matches!(err, XlsxError::PartTooLarge { max: 64, .. }));
}

#[test]
fn package_budget_is_enforced() {
    let bytes = workbook_with_rows(50, 5);
    let options = ReadOptions {
        limits: PackageLimits {
            max_total_bytes: 1024,
            ..PackageLimits::default()
        },
        ..ReadOptions::default()
    };
    let err = read_workbook_from_bytes(&bytes, &options).unwrap_err();
    assert!(matches!(err, XlsxError::PackageTooLarge { max: 1024, .. }));
}

#[test]
fn non_zip_input_is_a_zip_error() {
    let err = read_workbook_from_bytes(b"definitely not a zip", &ReadOptions::default())
        .unwrap_err();
    assert!(matches!(err, XlsxError::Zip(_)));
}

#[test]
fn huge_row_number_is_malformed_not_allocated() {
    let bytes = replace_part(
        &workbook_with_rows(1, 1),
        "xl/worksheets/sheet1.xml",
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="2000000000"><c r="A1"><v>1</v></c></row></sheetData></worksheet>"#,
    );
    let err = read_workbook_from_bytes(&bytes, &with_max_rows(10)).unwrap_err();
    assert!(
        matches!(err, XlsxError::Malformed { ref part, .. } if part == "xl/worksheets/sheet1.xml"),
        "unexpected error: {err:?}"
    );
}
