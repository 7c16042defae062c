use std::error::Error;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};
use tabula_model::{CellRef, CellValue, Range};
use tabula_xlsx::{read_workbook_from_bytes, ReadOptions};

fn external_workbook() -> Result<Vec<u8>, Box<dyn Error>> {
    let mut workbook = XlsxWorkbook::new();
    let bold = Format::new().set_bold();
    let date = Format::new().set_num_format("yyyy-mm-dd");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Data")?;
    sheet.write_string_with_format(0, 0, "Name", &bold)?;
    sheet.write_string(1, 0, "widget")?;
    sheet.write_number(1, 1, 42.5)?;
    sheet.write_formula(2, 1, "=B2*2")?;
    sheet.write_number_with_format(3, 0, 45306.0, &date)?;
    sheet.merge_range(0, 1, 0, 2, "Merged", &Format::new())?;
    sheet.write_url(4, 0, "https://example.com/docs")?;

    workbook.add_worksheet().set_name("Second")?;
    workbook.define_name("Greeting", "=Data!$A$1")?;
    Ok(workbook.save_to_buffer()?)
}

#[test]
fn reads_values_written_by_rust_xlsxwriter() -> Result<(), Box<dyn Error>> {
    let bytes = external_workbook()?;
    let workbook = read_workbook_from_bytes(&bytes, &ReadOptions::default())?;

    assert_eq!(
        workbook
            .sheets()
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>(),
        vec!["Data", "Second"]
    );
    let sheet = workbook.sheet("Data").unwrap();
    assert_eq!(sheet.value(CellRef::new(1, 1)), &CellValue::from("Name"));
    assert_eq!(sheet.value(CellRef::new(2, 1)), &CellValue::from("widget"));
    assert_eq!(sheet.value(CellRef::new(2, 2)), &CellValue::Number(42.5));

    match sheet.value(CellRef::new(3, 2)) {
        CellValue::Formula(formula) => assert_eq!(formula.formula, "B2*2"),
        other => panic!("expected formula, got {other:?}"),
    }
    Ok(())
}

#[test]
fn styles_and_dates_are_mapped_into_the_model() -> Result<(), Box<dyn Error>> {
    let workbook = read_workbook_from_bytes(&external_workbook()?, &ReadOptions::default())?;
    let sheet = workbook.sheet("Data").unwrap();

    let style_id = sheet.cell(CellRef::new(1, 1)).unwrap().style_id;
    let style = workbook.styles.get(style_id).unwrap();
    assert!(style.font.as_ref().is_some_and(|f| f.bold));

    let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(sheet.value(CellRef::new(4, 1)), &CellValue::Date(expected));
    let date_style = workbook
        .styles
        .get(sheet.cell(CellRef::new(4, 1)).unwrap().style_id)
        .unwrap();
    assert_eq!(date_style.num_fmt.as_deref(), Some("yyyy-mm-dd"));
    Ok(())
}

#[test]
fn merges_hyperlinks_and_names_are_resolved() -> Result<(), Box<dyn Error>> {
    let workbook = read_workbook_from_bytes(&external_workbook()?, &ReadOptions::default())?;
    let sheet = workbook.sheet("Data").unwrap();

    assert_eq!(sheet.merges(), &[Range::from_a1("B1:C1")?]);
    assert_eq!(sheet.value(CellRef::new(1, 2)), &CellValue::from("Merged"));
    assert_eq!(
        sheet.value(CellRef::new(1, 3)),
        &CellValue::Merge(CellRef::new(1, 2))
    );

    match sheet.value(CellRef::new(5, 1)) {
        CellValue::Hyperlink(link) => assert_eq!(link.target, "https://example.com/docs"),
        other => panic!("expected hyperlink, got {other:?}"),
    }

    assert!(workbook.defined_names.contains("Greeting"));
    assert_eq!(workbook.defined_names.ranges("Greeting"), vec!["Data!$A$1"]);
    Ok(())
}
