//! Eager writer: render a whole [`Workbook`] into a zip container.

use std::io::{Seek, Write};

use tabula_model::{DateSystem, Workbook};

use crate::options::WriteOptions;
use crate::tables::{SharedStringTable, StyleManager};
use crate::xform::book::{SheetEntry, WorkbookModel, WorkbookXform};
use crate::xform::comments::{render_vml, CommentsXform};
use crate::xform::package::{
    content_type, rel_type, AppModel, AppXform, ContentTypes, ContentTypesXform, CoreXform,
    Relationship, RelationshipsXform,
};
use crate::xform::sheet::{WorksheetModel, WorksheetXform};
use crate::xform::strings::SharedStringsXform;
use crate::xform::{PrepareContext, Xform};
use crate::XlsxError;

use super::theme::default_theme;
use super::{
    comments_part, vml_drawing_part, worksheet_part, PartWriter, APP_PART, CONTENT_TYPES_PART,
    CORE_PART, ROOT_RELS_PART, SHARED_STRINGS_PART, STYLES_PART, THEME_PART, WORKBOOK_PART,
    WORKBOOK_RELS_PART,
};

/// `_rels/.rels`.
pub(crate) fn root_relationships() -> Vec<Relationship> {
    vec![
        Relationship::new("rId1", rel_type::OFFICE_DOCUMENT, WORKBOOK_PART),
        Relationship::new("rId2", rel_type::CORE_PROPERTIES, CORE_PART),
        Relationship::new("rId3", rel_type::EXTENDED_PROPERTIES, APP_PART),
    ]
}

/// Sheets first (`rId1..rIdN`), then theme, styles and, when present,
/// shared strings.
pub(crate) fn workbook_relationships(sheet_count: u32, has_shared_strings: bool) -> Vec<Relationship> {
    let mut rels: Vec<Relationship> = (1..=sheet_count)
        .map(|id| {
            Relationship::new(
                format!("rId{id}"),
                rel_type::WORKSHEET,
                format!("worksheets/sheet{id}.xml"),
            )
        })
        .collect();
    let mut push = |kind: &str, target: &str| {
        let id = format!("rId{}", rels.len() + 1);
        rels.push(Relationship::new(id, kind, target));
    };
    push(rel_type::THEME, "theme/theme1.xml");
    push(rel_type::STYLES, "styles.xml");
    if has_shared_strings {
        push(rel_type::SHARED_STRINGS, "sharedStrings.xml");
    }
    rels
}

/// Overrides for the fixed parts every package carries.
pub(crate) fn base_content_types() -> ContentTypes {
    let mut types = ContentTypes::standard();
    types.add_override(WORKBOOK_PART, content_type::WORKBOOK);
    types.add_override(THEME_PART, content_type::THEME);
    types.add_override(STYLES_PART, content_type::STYLES);
    types.add_override(CORE_PART, content_type::CORE);
    types.add_override(APP_PART, content_type::APP);
    types
}

pub(crate) fn add_sheet_content_types(types: &mut ContentTypes, id: u32, has_comments: bool) {
    types.add_override(&worksheet_part(id), content_type::WORKSHEET);
    if has_comments {
        types.add_default("vml", content_type::VML);
        types.add_override(&comments_part(id), content_type::COMMENTS);
    }
}

/// Write one worksheet part plus its relationships, comments and drawing.
pub(crate) fn write_worksheet_parts<W: Write + Seek>(
    out: &mut PartWriter<W>,
    model: &WorksheetModel,
    xform: &WorksheetXform,
) -> Result<(), XlsxError> {
    let part = worksheet_part(model.id);
    out.write_part(&part, &xform.to_xml(model))?;
    write_worksheet_attachments(out, model)
}

/// Relationships, comments and the VML drawing of a worksheet.
pub(crate) fn write_worksheet_attachments<W: Write + Seek>(
    out: &mut PartWriter<W>,
    model: &WorksheetModel,
) -> Result<(), XlsxError> {
    if !model.rels.is_empty() {
        let rels = RelationshipsXform::default().to_xml(&model.rels);
        out.write_part(&crate::path::rels_for_part(&worksheet_part(model.id)), &rels)?;
    }
    if !model.comments.is_empty() {
        out.write_part(
            &comments_part(model.id),
            &CommentsXform::default().to_xml(&model.comments),
        )?;
        out.write_part(&vml_drawing_part(model.id), &render_vml(&model.comments))?;
    }
    Ok(())
}

pub(crate) fn app_model(sheet_names: Vec<String>, workbook: &Workbook) -> AppModel {
    AppModel {
        sheet_names,
        company: workbook.properties.company.clone(),
        manager: workbook.properties.manager.clone(),
    }
}

pub(crate) fn workbook_model(workbook: &Workbook, sheets: Vec<SheetEntry>) -> WorkbookModel {
    WorkbookModel {
        date1904: workbook.date_system == DateSystem::Excel1904,
        active_tab: workbook.active_sheet as u32,
        sheets,
        defined_names: workbook.defined_names.model(),
    }
}

fn sheet_entry(id: u32, model: &WorksheetModel) -> SheetEntry {
    SheetEntry {
        name: model.name.clone(),
        sheet_id: id,
        state: model.state,
        rel_id: format!("rId{id}"),
    }
}

/// Write `workbook` as an xlsx package into `writer`, returning the writer
/// once the archive is finalized.
pub fn write_workbook<W: Write + Seek>(
    workbook: &Workbook,
    writer: W,
    options: &WriteOptions,
) -> Result<W, XlsxError> {
    let mut styles = if options.use_styles {
        StyleManager::new()
    } else {
        StyleManager::disabled()
    };
    let mut shared_strings = SharedStringTable::new();
    let mut xform = WorksheetXform::default();

    // Every sheet is prepared up front so the content types and workbook
    // relationships know which parts will exist.
    let mut sheets = Vec::with_capacity(workbook.sheets().len());
    for (idx, sheet) in workbook.sheets().iter().enumerate() {
        let mut model = WorksheetModel::from_worksheet(sheet, idx as u32 + 1);
        let mut ctx = PrepareContext::new(
            &mut styles,
            &workbook.styles,
            options.use_shared_strings.then_some(&mut shared_strings),
            workbook.date_system,
        );
        xform.prepare(&mut model, &mut ctx)?;
        sheets.push(model);
    }
    let has_shared_strings = !shared_strings.is_empty();

    let mut content_types = base_content_types();
    for model in &sheets {
        add_sheet_content_types(&mut content_types, model.id, !model.comments.is_empty());
    }
    if has_shared_strings {
        content_types.add_override(SHARED_STRINGS_PART, content_type::SHARED_STRINGS);
    }

    let mut out = PartWriter::new(writer, options.compression);
    out.write_part(
        CONTENT_TYPES_PART,
        &ContentTypesXform::default().to_xml(&content_types),
    )?;
    match &workbook.theme_xml {
        Some(theme) => out.write_part(THEME_PART, theme)?,
        None => out.write_part(THEME_PART, &default_theme())?,
    }
    out.write_part(
        ROOT_RELS_PART,
        &RelationshipsXform::default().to_xml(&root_relationships()),
    )?;
    for model in &sheets {
        write_worksheet_parts(&mut out, model, &xform)?;
    }
    if has_shared_strings {
        out.write_part(
            SHARED_STRINGS_PART,
            &SharedStringsXform::default().to_xml(&shared_strings.model()),
        )?;
    }
    out.write_part(STYLES_PART, &styles.to_xml())?;

    let names = sheets.iter().map(|s| s.name.clone()).collect();
    out.write_part(APP_PART, &AppXform::default().to_xml(&app_model(names, workbook)))?;
    out.write_part(CORE_PART, &CoreXform::default().to_xml(&workbook.properties))?;

    let rels = workbook_relationships(sheets.len() as u32, has_shared_strings);
    out.write_part(WORKBOOK_RELS_PART, &RelationshipsXform::default().to_xml(&rels))?;
    let entries = sheets
        .iter()
        .map(|model| sheet_entry(model.id, model))
        .collect();
    out.write_part(
        WORKBOOK_PART,
        &WorkbookXform::default().to_xml(&workbook_model(workbook, entries)),
    )?;
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use tabula_model::{CellRef, Comment};
    use zip::ZipArchive;

    fn written(workbook: &Workbook, options: &WriteOptions) -> ZipArchive<Cursor<Vec<u8>>> {
        let bytes = write_workbook(workbook, Cursor::new(Vec::new()), options)
            .unwrap()
            .into_inner();
        ZipArchive::new(Cursor::new(bytes)).unwrap()
    }

    fn part(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut out = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn parts_are_written_in_package_order() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_sheet("Notes").unwrap();
        sheet.set_value(CellRef::new(1, 1), "x");
        sheet.set_comment(CellRef::new(1, 1), Some(Comment::new(None, "hi")));

        let archive = written(&workbook, &WriteOptions::default());
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "xl/theme/theme1.xml",
                "_rels/.rels",
                "xl/worksheets/sheet1.xml",
                "xl/worksheets/_rels/sheet1.xml.rels",
                "xl/comments1.xml",
                "xl/drawings/vmlDrawing1.vml",
                "xl/sharedStrings.xml",
                "xl/styles.xml",
                "docProps/app.xml",
                "docProps/core.xml",
                "xl/_rels/workbook.xml.rels",
                "xl/workbook.xml",
            ]
        );
    }

    #[test]
    fn shared_strings_part_only_when_strings_were_interned() {
        let mut workbook = Workbook::new();
        workbook
            .add_sheet("Numbers")
            .unwrap()
            .set_value(CellRef::new(1, 1), 1.5);
        let mut archive = written(&workbook, &WriteOptions::default());
        assert!(archive.by_name("xl/sharedStrings.xml").is_err());
        let types = part(&mut archive, "[Content_Types].xml");
        assert!(!types.contains("sharedStrings"));
        let rels = part(&mut archive, "xl/_rels/workbook.xml.rels");
        assert!(!rels.contains("sharedStrings"));
    }

    #[test]
    fn inline_strings_when_shared_strings_disabled() {
        let mut workbook = Workbook::new();
        workbook
            .add_sheet("S")
            .unwrap()
            .set_value(CellRef::new(1, 1), "inline");
        let options = WriteOptions {
            use_shared_strings: false,
            ..WriteOptions::default()
        };
        let mut archive = written(&workbook, &options);
        let sheet = part(&mut archive, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains(r#"t="inlineStr""#));
        assert!(archive.by_name("xl/sharedStrings.xml").is_err());
    }
}
