//! Eager reader: inflate the package and rebuild a [`Workbook`].

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek};

use tabula_model::{DateSystem, Workbook, Worksheet};
use zip::ZipArchive;

use crate::options::ReadOptions;
use crate::path::{part_number, rels_for_part, resolve_target};
use crate::tables::StyleManager;
use crate::xform::book::{WorkbookModel, WorkbookXform};
use crate::xform::comments::CommentsXform;
use crate::xform::package::{rel_type, AppXform, CoreXform, Relationship, RelationshipsXform};
use crate::xform::parse_part;
use crate::xform::sheet::WorksheetXform;
use crate::xform::strings::{SharedString, SharedStringsXform};
use crate::xform::style::StylesXform;
use crate::xform::{ReconcileContext, Xform};
use crate::zip_util::{part_name_key, read_all_parts};
use crate::XlsxError;

use super::{ROOT_RELS_PART, WORKBOOK_PART};

/// Inflated parts keyed by normalized part name.
pub(crate) struct Parts {
    parts: BTreeMap<String, Vec<u8>>,
}

impl Parts {
    pub(crate) fn new(parts: BTreeMap<String, Vec<u8>>) -> Self {
        Self { parts }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(&part_name_key(name)).map(Vec::as_slice)
    }

    pub(crate) fn require(&self, name: &str) -> Result<&[u8], XlsxError> {
        self.get(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))
    }

    /// Relationships of `part`; an absent `.rels` part means none.
    pub(crate) fn relationships(&self, part: &str) -> Result<Vec<Relationship>, XlsxError> {
        let rels_part = rels_for_part(part);
        match self.get(&rels_part) {
            Some(bytes) => parse_part(&mut RelationshipsXform::default(), bytes, &rels_part),
            None => Ok(Vec::new()),
        }
    }
}

/// Target part of the first relationship of `kind`, resolved against `source`.
pub(crate) fn find_target(rels: &[Relationship], kind: &str, source: &str) -> Option<String> {
    rels.iter()
        .find(|r| r.rel_type == kind && !r.is_external())
        .map(|r| resolve_target(source, &r.target))
}

/// Resolve the workbook part through `_rels/.rels`.
pub(crate) fn workbook_part_name(root_rels: &[Relationship]) -> String {
    match find_target(root_rels, rel_type::OFFICE_DOCUMENT, "") {
        Some(part) => part,
        None => {
            log::debug!("no officeDocument relationship, assuming {WORKBOOK_PART}");
            WORKBOOK_PART.to_string()
        }
    }
}

pub(crate) fn date_system(model: &WorkbookModel) -> DateSystem {
    if model.date1904 {
        DateSystem::Excel1904
    } else {
        DateSystem::Excel1900
    }
}

/// External hyperlink targets by relationship id.
pub(crate) fn hyperlink_targets(rels: &[Relationship]) -> HashMap<String, String> {
    rels.iter()
        .filter(|r| r.rel_type == rel_type::HYPERLINK)
        .map(|r| (r.id.clone(), r.target.clone()))
        .collect()
}

pub(crate) fn styles_from_part(bytes: Option<&[u8]>, part: &str) -> Result<StyleManager, XlsxError> {
    match bytes {
        Some(bytes) => {
            let model = parse_part(&mut StylesXform::default(), bytes, part)?;
            Ok(StyleManager::from_model(model))
        }
        None => {
            log::warn!("package has no styles part, using default formats");
            Ok(StyleManager::fallback())
        }
    }
}

/// Read an xlsx package from `reader`.
///
/// Every entry is inflated up front under the limits in `options`; the
/// returned workbook is fully reconciled or an error is returned.
pub fn read_workbook<R: Read + Seek>(
    reader: R,
    options: &ReadOptions,
) -> Result<Workbook, XlsxError> {
    let mut archive = ZipArchive::new(reader)?;
    let parts = Parts::new(read_all_parts(&mut archive, &options.limits)?);
    load_workbook(&parts, options)
}

fn load_workbook(parts: &Parts, options: &ReadOptions) -> Result<Workbook, XlsxError> {
    let root_rels = parts.relationships("")?;
    if root_rels.is_empty() {
        log::debug!("{ROOT_RELS_PART} missing or empty");
    }
    let workbook_part = workbook_part_name(&root_rels);
    let book: WorkbookModel = parse_part(
        &mut WorkbookXform::default(),
        parts.require(&workbook_part)?,
        &workbook_part,
    )?;
    let book_rels = parts.relationships(&workbook_part)?;
    let rels_by_id: HashMap<&str, &Relationship> =
        book_rels.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut workbook = Workbook::new();
    workbook.date_system = date_system(&book);

    let shared_strings: Vec<SharedString> =
        match find_target(&book_rels, rel_type::SHARED_STRINGS, &workbook_part) {
            Some(part) => match parts.get(&part) {
                Some(bytes) => {
                    parse_part(&mut SharedStringsXform::default(), bytes, &part)?.values
                }
                None => return Err(XlsxError::MissingPart(part)),
            },
            None => Vec::new(),
        };
    log::debug!("loaded {} shared strings", shared_strings.len());

    let styles_part = find_target(&book_rels, rel_type::STYLES, &workbook_part);
    let mut styles = styles_from_part(
        styles_part.as_deref().and_then(|p| parts.get(p)),
        styles_part.as_deref().unwrap_or_default(),
    )?;

    if let Some(theme) = find_target(&book_rels, rel_type::THEME, &workbook_part)
        .and_then(|p| parts.get(&p))
    {
        workbook.theme_xml = Some(String::from_utf8_lossy(theme).into_owned());
    }

    let mut targets = Vec::with_capacity(book.sheets.len());
    for (index, entry) in book.sheets.iter().enumerate() {
        let rel = rels_by_id.get(entry.rel_id.as_str()).ok_or_else(|| {
            XlsxError::malformed(
                &workbook_part,
                format!("sheet {} refers to unknown relationship {}", entry.name, entry.rel_id),
            )
        })?;
        targets.push((index, entry, resolve_target(&workbook_part, &rel.target)));
    }
    // Parts are processed by their sheet number; the workbook keeps declaration order.
    targets.sort_by(|a, b| {
        let key = |part: &str| part_number(part).unwrap_or(u32::MAX);
        key(&a.2).cmp(&key(&b.2)).then_with(|| a.2.cmp(&b.2))
    });

    let mut xform = WorksheetXform::new(options.max_rows, options.max_cols);
    let mut loaded: Vec<(usize, Worksheet)> = Vec::with_capacity(targets.len());
    for (index, entry, part) in targets {
        log::debug!("reading sheet {} from {part}", entry.name);
        let mut model = parse_part(&mut xform, parts.require(&part)?, &part)?;
        model.name = entry.name.clone();
        model.state = entry.state;

        let sheet_rels = parts.relationships(&part)?;
        if let Some(comments_part) = find_target(&sheet_rels, rel_type::COMMENTS, &part) {
            model.comments = parse_part(
                &mut CommentsXform::default(),
                parts.require(&comments_part)?,
                &comments_part,
            )?;
        }

        {
            let mut ctx = ReconcileContext::new(
                &mut styles,
                &mut workbook.styles,
                Some(shared_strings.as_slice()),
                workbook.date_system,
            );
            ctx.hyperlink_targets = hyperlink_targets(&sheet_rels);
            xform
                .reconcile(&mut model, &mut ctx)
                .map_err(|e| e.in_part(&part))?;
        }
        loaded.push((index, model.into_worksheet()?));
    }
    loaded.sort_by_key(|(index, _)| *index);
    for (_, sheet) in loaded {
        workbook.push_sheet(sheet)?;
    }

    workbook.defined_names.set_model(book.defined_names);
    workbook.active_sheet = (book.active_tab as usize).min(workbook.sheets().len().saturating_sub(1));

    if let Some(core) = find_target(&root_rels, rel_type::CORE_PROPERTIES, "") {
        if let Some(bytes) = parts.get(&core) {
            workbook.properties = parse_part(&mut CoreXform::default(), bytes, &core)?;
        }
    }
    if let Some(app) = find_target(&root_rels, rel_type::EXTENDED_PROPERTIES, "") {
        if let Some(bytes) = parts.get(&app) {
            let app = parse_part(&mut AppXform::default(), bytes, &app)?;
            workbook.properties.company = app.company;
            workbook.properties.manager = app.manager;
        }
    }
    Ok(workbook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::writer::write_workbook;
    use crate::WriteOptions;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Write};
    use tabula_model::{CellRef, CellValue};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default();
        for (name, body) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    const MINIMAL_WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Only" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
    const MINIMAL_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

    #[test]
    fn missing_styles_part_falls_back_to_defaults() {
        let bytes = build_zip(&[
            ("xl/workbook.xml", MINIMAL_WORKBOOK),
            ("xl/_rels/workbook.xml.rels", MINIMAL_RELS),
            (
                "xl/worksheets/sheet1.xml",
                r#"<worksheet><sheetData><row r="1"><c r="A1"><v>3</v></c></row></sheetData></worksheet>"#,
            ),
        ]);
        let workbook = read_workbook(Cursor::new(bytes), &ReadOptions::default()).unwrap();
        let sheet = workbook.sheet("Only").unwrap();
        assert_eq!(sheet.value(CellRef::new(1, 1)), &CellValue::Number(3.0));
    }

    #[test]
    fn missing_worksheet_part_is_reported() {
        let bytes = build_zip(&[
            ("xl/workbook.xml", MINIMAL_WORKBOOK),
            ("xl/_rels/workbook.xml.rels", MINIMAL_RELS),
        ]);
        let err = read_workbook(Cursor::new(bytes), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, XlsxError::MissingPart(ref p) if p == "xl/worksheets/sheet1.xml"));
    }

    const SWAPPED_WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Second" sheetId="2" r:id="rId2"/><sheet name="First" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
    const SWAPPED_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/></Relationships>"#;

    #[test]
    fn sheet_parts_are_read_by_number_but_kept_in_declaration_order() {
        let bytes = build_zip(&[
            ("xl/workbook.xml", SWAPPED_WORKBOOK),
            ("xl/_rels/workbook.xml.rels", SWAPPED_RELS),
            ("xl/worksheets/sheet1.xml", "<worksheet><sheetData/></worksheet>"),
            ("xl/worksheets/sheet2.xml", "<worksheet><sheetData/></worksheet>"),
        ]);
        let workbook = read_workbook(Cursor::new(bytes), &ReadOptions::default()).unwrap();
        let names: Vec<&str> = workbook.sheets().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Second", "First"]);

        // Both parts are truncated; the lower-numbered one fails first.
        let bytes = build_zip(&[
            ("xl/workbook.xml", SWAPPED_WORKBOOK),
            ("xl/_rels/workbook.xml.rels", SWAPPED_RELS),
            ("xl/worksheets/sheet1.xml", "<worksheet><sheetData>"),
            ("xl/worksheets/sheet2.xml", "<worksheet><sheetData>"),
        ]);
        let err = read_workbook(Cursor::new(bytes), &ReadOptions::default()).unwrap_err();
        assert!(
            matches!(err, XlsxError::Malformed { ref part, .. } if part == "xl/worksheets/sheet1.xml"),
            "{err:?}"
        );
    }

    #[test]
    fn hyperlinks_resolve_through_sheet_relationships() {
        let mut workbook = Workbook::new();
        workbook.add_sheet("Links").unwrap().set_value(
            CellRef::new(2, 2),
            CellValue::Hyperlink(tabula_model::Hyperlink {
                text: "docs".into(),
                target: "https://docs.example".into(),
                tooltip: None,
            }),
        );
        let bytes = write_workbook(&workbook, Cursor::new(Vec::new()), &WriteOptions::default())
            .unwrap()
            .into_inner();
        let back = read_workbook(Cursor::new(bytes), &ReadOptions::default()).unwrap();
        assert_eq!(
            back.sheet("Links").unwrap().value(CellRef::new(2, 2)),
            workbook.sheet("Links").unwrap().value(CellRef::new(2, 2))
        );
    }
}
