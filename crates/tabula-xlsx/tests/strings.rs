use proptest::prelude::*;
use tabula_model::{CellRef, CellValue, Workbook};
use tabula_xlsx::{read_workbook_from_bytes, write_workbook_to_vec, ReadOptions, WriteOptions};

fn write_values(values: &[String], use_shared_strings: bool) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_sheet("Text").unwrap();
    for (i, value) in values.iter().enumerate() {
        sheet.set_value(CellRef::new(i as u32 + 1, 1), value.as_str());
    }
    let options = WriteOptions {
        use_shared_strings,
        ..WriteOptions::default()
    };
    write_workbook_to_vec(&workbook, &options).unwrap()
}

fn part(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut xml = String::new();
    std::io::Read::read_to_string(&mut archive.by_name(name).unwrap(), &mut xml).unwrap();
    xml
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn markup_control_chars_and_edge_whitespace_survive(
        values in prop::collection::vec("[ a-z_<>&\"'\t\u{1}\u{1f}]{1,12}", 1..8),
        use_shared_strings in any::<bool>(),
    ) {
        let bytes = write_values(&values, use_shared_strings);
        let text_part = if use_shared_strings {
            "xl/sharedStrings.xml"
        } else {
            "xl/worksheets/sheet1.xml"
        };
        let xml = part(&bytes, text_part);
        prop_assert!(roxmltree::Document::parse(&xml).is_ok(), "{text_part} is not well-formed");

        let back = read_workbook_from_bytes(&bytes, &ReadOptions::default()).unwrap();
        let sheet = back.sheet("Text").unwrap();
        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(
                sheet.value(CellRef::new(i as u32 + 1, 1)),
                &CellValue::from(value.as_str())
            );
        }
    }
}

#[test]
fn control_characters_are_stored_as_escapes() {
    let values = vec!["a\u{1}b".to_string(), "_x0041_".to_string()];
    let bytes = write_values(&values, true);
    let xml = part(&bytes, "xl/sharedStrings.xml");
    let doc = roxmltree::Document::parse(&xml).unwrap();
    let texts: Vec<&str> = doc
        .descendants()
        .filter(|n| n.has_tag_name("t"))
        .filter_map(|n| n.text())
        .collect();
    assert_eq!(texts, vec!["a_x0001_b", "_x005F_x0041_"]);

    let back = read_workbook_from_bytes(&bytes, &ReadOptions::default()).unwrap();
    let sheet = back.sheet("Text").unwrap();
    assert_eq!(sheet.value(CellRef::new(1, 1)), &CellValue::from("a\u{1}b"));
    assert_eq!(sheet.value(CellRef::new(2, 1)), &CellValue::from("_x0041_"));
}

#[test]
fn repeated_strings_share_one_entry() {
    let values: Vec<String> = ["a", "b", "a", "a", "b"].iter().map(|s| s.to_string()).collect();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_sheet("Text").unwrap();
    for (i, value) in values.iter().enumerate() {
        sheet.set_value(CellRef::new(1, i as u32 + 1), value.as_str());
    }
    let bytes = write_workbook_to_vec(&workbook, &WriteOptions::default()).unwrap();

    let xml = part(&bytes, "xl/sharedStrings.xml");
    let doc = roxmltree::Document::parse(&xml).unwrap();
    let sst = doc.root_element();
    assert_eq!(sst.attribute("count"), Some("5"));
    assert_eq!(sst.attribute("uniqueCount"), Some("2"));
}
