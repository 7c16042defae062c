//! Streaming writer: rows go straight into the worksheet's zip entry as they
//! are added, so memory stays bounded by the tables and one row.
//!
//! ```no_run
//! use std::fs::File;
//! use tabula_model::{CellRef, Row};
//! use tabula_xlsx::{WorkbookWriter, WriteOptions};
//!
//! # fn main() -> Result<(), tabula_xlsx::XlsxError> {
//! let mut book = WorkbookWriter::new(File::create("big.xlsx")?, &WriteOptions::default())?;
//! let mut sheet = book.add_worksheet("Data")?;
//! for n in 1..=100_000 {
//!     let mut row = Row::default();
//!     row.get_or_create(1).value = (n as f64).into();
//!     sheet.add_row(n, &row)?;
//! }
//! sheet.commit()?;
//! book.finish()?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::io::{Seek, Write};

use tabula_model::{
    sheet_name_eq_case_insensitive, validate_sheet_name, CellRef, ColumnDef, Comment, DateSystem,
    DefinedNames, DocumentProperties, MergeError, PageMargins, Range, Row, SheetState, SheetView,
    Style, StyleTable, WorkbookError,
};

use crate::options::WriteOptions;
use crate::tables::{SharedStringTable, StyleManager};
use crate::xform::book::{SheetEntry, WorkbookModel, WorkbookXform};
use crate::xform::comments::CommentModel;
use crate::xform::package::{
    content_type, AppModel, AppXform, ContentTypesXform, CoreXform, RelationshipsXform,
};
use crate::xform::sheet::{
    ColModel, ColXform, RowModel, RowXform, SheetFormatModel, WorksheetModel, WorksheetXform,
};
use crate::xform::strings::SharedStringsXform;
use crate::xform::{PrepareContext, Xform};
use crate::xml_stream::XmlStream;
use crate::XlsxError;

use super::theme::default_theme;
use super::writer::{
    add_sheet_content_types, base_content_types, root_relationships, workbook_relationships,
    write_worksheet_attachments,
};
use super::{
    worksheet_part, PartWriter, APP_PART, CONTENT_TYPES_PART, CORE_PART, ROOT_RELS_PART,
    SHARED_STRINGS_PART, STYLES_PART, THEME_PART, WORKBOOK_PART, WORKBOOK_RELS_PART,
};

struct CommittedSheet {
    name: String,
    state: SheetState,
    has_comments: bool,
}

/// Writes a workbook one worksheet, and one row, at a time.
pub struct WorkbookWriter<W: Write + Seek> {
    out: PartWriter<W>,
    use_shared_strings: bool,
    styles: StyleManager,
    model_styles: StyleTable,
    shared_strings: SharedStringTable,
    sheets: Vec<CommittedSheet>,
    open_sheet: Option<String>,
    date_system: DateSystem,
    pub defined_names: DefinedNames,
    pub properties: DocumentProperties,
    /// Written verbatim instead of the default theme when set.
    pub theme_xml: Option<String>,
    pub active_sheet: usize,
}

impl<W: Write + Seek> WorkbookWriter<W> {
    pub fn new(writer: W, options: &WriteOptions) -> Result<Self, XlsxError> {
        let mut out = PartWriter::new(writer, options.compression);
        out.write_part(
            ROOT_RELS_PART,
            &RelationshipsXform::default().to_xml(&root_relationships()),
        )?;
        Ok(Self {
            out,
            use_shared_strings: options.use_shared_strings,
            styles: if options.use_styles {
                StyleManager::new()
            } else {
                StyleManager::disabled()
            },
            model_styles: StyleTable::new(),
            shared_strings: SharedStringTable::new(),
            sheets: Vec::new(),
            open_sheet: None,
            date_system: DateSystem::default(),
            defined_names: DefinedNames::new(),
            properties: DocumentProperties::default(),
            theme_xml: None,
            active_sheet: 0,
        })
    }

    /// Register a style and return the id cells should carry.
    pub fn intern_style(&mut self, style: Style) -> u32 {
        self.model_styles.intern(style)
    }

    /// Must be chosen before any date cell is written.
    pub fn set_date_system(&mut self, date_system: DateSystem) {
        self.date_system = date_system;
    }

    /// Start the next worksheet. The previous one must have been committed.
    pub fn add_worksheet(&mut self, name: &str) -> Result<WorksheetWriter<'_, W>, XlsxError> {
        if let Some(open) = &self.open_sheet {
            return Err(XlsxError::WorksheetNotCommitted(open.clone()));
        }
        validate_sheet_name(name).map_err(WorkbookError::from)?;
        if self
            .sheets
            .iter()
            .any(|s| sheet_name_eq_case_insensitive(&s.name, name))
        {
            return Err(WorkbookError::DuplicateSheet(name.to_string()).into());
        }
        let id = self.sheets.len() as u32 + 1;
        self.out.start(&worksheet_part(id))?;
        self.open_sheet = Some(name.to_string());
        Ok(WorksheetWriter {
            book: self,
            model: WorksheetModel {
                id,
                name: name.to_string(),
                views: vec![SheetView::default()],
                format: Some(SheetFormatModel::default()),
                page_margins: Some(PageMargins::default()),
                ..WorksheetModel::default()
            },
            rows: RowXform::new(None),
            xml: XmlStream::new(),
            head_written: false,
            last_row: 0,
            shared_formulas: HashMap::new(),
        })
    }

    /// Write the tables and workbook parts and close the archive.
    pub fn finish(mut self) -> Result<W, XlsxError> {
        if let Some(name) = self.open_sheet.take() {
            return Err(XlsxError::WorksheetNotCommitted(name));
        }
        let has_shared_strings = !self.shared_strings.is_empty();
        if has_shared_strings {
            self.out.write_part(
                SHARED_STRINGS_PART,
                &SharedStringsXform::default().to_xml(&self.shared_strings.model()),
            )?;
        }
        self.out.write_part(STYLES_PART, &self.styles.to_xml())?;
        match &self.theme_xml {
            Some(theme) => self.out.write_part(THEME_PART, theme)?,
            None => self.out.write_part(THEME_PART, &default_theme())?,
        }

        let app = AppModel {
            sheet_names: self.sheets.iter().map(|s| s.name.clone()).collect(),
            company: self.properties.company.clone(),
            manager: self.properties.manager.clone(),
        };
        self.out
            .write_part(APP_PART, &AppXform::default().to_xml(&app))?;
        self.out
            .write_part(CORE_PART, &CoreXform::default().to_xml(&self.properties))?;

        let rels = workbook_relationships(self.sheets.len() as u32, has_shared_strings);
        self.out
            .write_part(WORKBOOK_RELS_PART, &RelationshipsXform::default().to_xml(&rels))?;
        let book = WorkbookModel {
            date1904: self.date_system == DateSystem::Excel1904,
            active_tab: self.active_sheet.min(self.sheets.len().saturating_sub(1)) as u32,
            sheets: self
                .sheets
                .iter()
                .enumerate()
                .map(|(idx, sheet)| SheetEntry {
                    name: sheet.name.clone(),
                    sheet_id: idx as u32 + 1,
                    state: sheet.state,
                    rel_id: format!("rId{}", idx + 1),
                })
                .collect(),
            defined_names: self.defined_names.model(),
        };
        self.out
            .write_part(WORKBOOK_PART, &WorkbookXform::default().to_xml(&book))?;

        // Every part is known only now.
        let mut types = base_content_types();
        for (idx, sheet) in self.sheets.iter().enumerate() {
            add_sheet_content_types(&mut types, idx as u32 + 1, sheet.has_comments);
        }
        if has_shared_strings {
            types.add_override(SHARED_STRINGS_PART, content_type::SHARED_STRINGS);
        }
        self.out
            .write_part(CONTENT_TYPES_PART, &ContentTypesXform::default().to_xml(&types))?;
        self.out.finish()
    }
}

fn prepare_context<W: Write + Seek>(book: &mut WorkbookWriter<W>) -> PrepareContext<'_> {
    PrepareContext::new(
        &mut book.styles,
        &book.model_styles,
        book.use_shared_strings.then_some(&mut book.shared_strings),
        book.date_system,
    )
}

/// One worksheet being written. Rows must arrive in ascending order; merges,
/// hyperlinks and comments are kept until [`WorksheetWriter::commit`].
pub struct WorksheetWriter<'a, W: Write + Seek> {
    book: &'a mut WorkbookWriter<W>,
    model: WorksheetModel,
    rows: RowXform,
    xml: XmlStream,
    head_written: bool,
    last_row: u32,
    shared_formulas: HashMap<CellRef, u32>,
}

impl<'a, W: Write + Seek> WorksheetWriter<'a, W> {
    pub fn name(&self) -> &str {
        &self.model.name
    }

    pub fn set_state(&mut self, state: SheetState) {
        self.model.state = state;
    }

    pub fn set_page_margins(&mut self, margins: PageMargins) {
        self.model.page_margins = Some(margins);
    }

    /// Column definitions precede the cell data, so they can only be set
    /// before the first row.
    pub fn set_column(&mut self, def: ColumnDef) -> Result<(), XlsxError> {
        if self.head_written {
            return Err(XlsxError::ColumnsAfterRows);
        }
        self.model.cols.retain(|c| c.def.max < def.min || c.def.min > def.max);
        self.model.cols.push(ColModel { def, xf_id: 0 });
        self.model.cols.sort_by_key(|c| c.def.min);
        Ok(())
    }

    fn write_head(&mut self) -> Result<(), XlsxError> {
        if self.head_written {
            return Ok(());
        }
        self.head_written = true;
        let mut ctx = prepare_context(self.book);
        let mut xform = ColXform::default();
        for col in &mut self.model.cols {
            xform.prepare(col, &mut ctx)?;
        }
        WorksheetXform::render_head(&mut self.xml, &self.model);
        self.flush()
    }

    fn flush(&mut self) -> Result<(), XlsxError> {
        let chunk = self.xml.drain();
        self.book.out.append(&chunk)
    }

    /// Write row `number`. Rows must be added in strictly ascending order.
    pub fn add_row(&mut self, number: u32, row: &Row) -> Result<(), XlsxError> {
        if number <= self.last_row {
            return Err(XlsxError::RowOutOfOrder {
                row: number,
                last: self.last_row,
            });
        }
        self.write_head()?;
        self.last_row = number;

        for (col, cell) in row.iter() {
            if let Some(comment) = &cell.comment {
                self.model.comments.push(CommentModel {
                    address: CellRef::new(number, col),
                    comment: comment.clone(),
                });
            }
        }
        let mut model = RowModel::from_row(number, row);
        if model.cells.is_empty() && !row.has_properties() {
            return Ok(());
        }

        let mut ctx = prepare_context(self.book);
        ctx.shared_formulas = std::mem::take(&mut self.shared_formulas);
        let prepared = self.rows.prepare(&mut model, &mut ctx);
        self.shared_formulas = std::mem::take(&mut ctx.shared_formulas);
        self.model.hyperlinks.append(&mut ctx.hyperlinks);
        prepared?;

        self.rows.render(&mut self.xml, &model);
        self.flush()
    }

    /// Record a merged range, rejecting overlaps with earlier merges.
    pub fn merge_cells(&mut self, range: Range) -> Result<(), XlsxError> {
        if let Some(existing) = self.model.merges.iter().find(|m| m.intersects(&range)) {
            return Err(MergeError::Overlap {
                requested: range,
                existing: *existing,
            }
            .into());
        }
        self.model.merges.push(range);
        Ok(())
    }

    /// Attach a note to a cell, whether or not its row was written yet.
    pub fn set_comment(&mut self, address: CellRef, comment: Comment) {
        self.model.comments.retain(|c| c.address != address);
        self.model.comments.push(CommentModel { address, comment });
    }

    /// Close the worksheet entry and write its relationships and comments.
    pub fn commit(mut self) -> Result<(), XlsxError> {
        self.write_head()?;
        self.model.comments.sort_by_key(|c| (c.address.row, c.address.col));
        self.model.assign_relationships();
        WorksheetXform::render_tail(&mut self.xml, &self.model);
        self.flush()?;
        write_worksheet_attachments(&mut self.book.out, &self.model)?;

        log::debug!(
            "committed worksheet {} ({} merges, {} hyperlinks)",
            self.model.name,
            self.model.merges.len(),
            self.model.hyperlinks.len()
        );
        self.book.sheets.push(CommittedSheet {
            name: std::mem::take(&mut self.model.name),
            state: self.model.state,
            has_comments: !self.model.comments.is_empty(),
        });
        self.book.open_sheet = None;
        Ok(())
    }
}
