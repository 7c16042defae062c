//! Pull-based reader for large packages.
//!
//! [`WorkbookReader`] opens the container and the workbook part, then yields
//! [`ReaderEvent`]s as the tables and sheet relationships are loaded. Cell
//! data is never held for a whole sheet: [`WorkbookReader::rows`] streams one
//! worksheet entry straight out of the zip and reconciles each row as it is
//! closed.

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Read, Seek};

use tabula_model::{DateSystem, DefinedNameModel, Range, Row, SheetState, StyleTable};
use zip::ZipArchive;

use crate::options::{
    HyperlinksMode, SharedStringsMode, StreamingReadOptions, StylesMode, WorksheetsMode,
};
use crate::path::{rels_for_part, resolve_target};
use crate::sax::{SaxEvent, SaxNode, SaxReader};
use crate::tables::StyleManager;
use crate::xform::book::{WorkbookModel, WorkbookXform};
use crate::xform::package::{rel_type, Relationship, RelationshipsXform};
use crate::xform::parse_part;
use crate::xform::sheet::{hyperlink_xform, merge_cell_xform, HyperlinkModel, RowXform};
use crate::xform::strings::{SharedString, SharedStringsXform};
use crate::xform::style::StylesXform;
use crate::xform::{ListXform, ReconcileContext, Xform};
use crate::zip_util::{open_zip_part, read_zip_part_optional, ZipInflateBudget};
use crate::XlsxError;

use super::reader::{date_system, find_target, hyperlink_targets, workbook_part_name};

/// A worksheet listed in the workbook part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorksheetInfo {
    /// Position in the workbook, starting at 1.
    pub id: u32,
    pub name: String,
    pub state: SheetState,
    /// Zip entry holding the sheet.
    pub part: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReaderEvent {
    SharedString { index: u32, value: SharedString },
    Worksheet(WorksheetInfo),
    /// An external hyperlink relationship of worksheet `sheet`.
    Hyperlink {
        sheet: u32,
        id: String,
        target: String,
    },
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Tables,
    Sheets(usize),
    Done,
}

/// Streaming reader over an xlsx package.
pub struct WorkbookReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    options: StreamingReadOptions,
    budget: ZipInflateBudget,
    book: WorkbookModel,
    sheets: Vec<WorksheetInfo>,
    shared_strings_part: Option<String>,
    styles_part: Option<String>,
    tables_loaded: bool,
    shared_strings: Vec<SharedString>,
    styles: StyleManager,
    model_styles: StyleTable,
    hyperlinks: HashMap<u32, HashMap<String, String>>,
    pending: VecDeque<ReaderEvent>,
    stage: Stage,
}

fn read_rels<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part: &str,
    options: &StreamingReadOptions,
    budget: &mut ZipInflateBudget,
) -> Result<Vec<Relationship>, XlsxError> {
    let rels_part = rels_for_part(part);
    match read_zip_part_optional(archive, &rels_part, &options.limits, budget)? {
        Some(bytes) => parse_part(&mut RelationshipsXform::default(), bytes.as_slice(), &rels_part),
        None => Ok(Vec::new()),
    }
}

impl<R: Read + Seek> WorkbookReader<R> {
    /// Open the container and read the workbook structure. Tables are
    /// loaded on the first call to [`Iterator::next`] or [`Self::rows`].
    pub fn new(reader: R, options: StreamingReadOptions) -> Result<Self, XlsxError> {
        let mut archive = ZipArchive::new(reader)?;
        let mut budget = ZipInflateBudget::new(options.limits.max_total_bytes);

        let root_rels = read_rels(&mut archive, "", &options, &mut budget)?;
        let workbook_part = workbook_part_name(&root_rels);
        let bytes =
            read_zip_part_optional(&mut archive, &workbook_part, &options.limits, &mut budget)?
                .ok_or_else(|| XlsxError::MissingPart(workbook_part.clone()))?;
        let book = parse_part(&mut WorkbookXform::default(), bytes.as_slice(), &workbook_part)?;
        let book_rels = read_rels(&mut archive, &workbook_part, &options, &mut budget)?;

        let mut sheets = Vec::with_capacity(book.sheets.len());
        for (idx, entry) in book.sheets.iter().enumerate() {
            let rel = book_rels
                .iter()
                .find(|r| r.id == entry.rel_id)
                .ok_or_else(|| {
                    XlsxError::malformed(
                        &workbook_part,
                        format!(
                            "sheet {} refers to unknown relationship {}",
                            entry.name, entry.rel_id
                        ),
                    )
                })?;
            sheets.push(WorksheetInfo {
                id: idx as u32 + 1,
                name: entry.name.clone(),
                state: entry.state,
                part: resolve_target(&workbook_part, &rel.target),
            });
        }
        log::debug!("streaming {} worksheets from {workbook_part}", sheets.len());

        Ok(Self {
            archive,
            shared_strings_part: find_target(&book_rels, rel_type::SHARED_STRINGS, &workbook_part),
            styles_part: find_target(&book_rels, rel_type::STYLES, &workbook_part),
            options,
            budget,
            book,
            sheets,
            tables_loaded: false,
            shared_strings: Vec::new(),
            styles: StyleManager::fallback(),
            model_styles: StyleTable::new(),
            hyperlinks: HashMap::new(),
            pending: VecDeque::new(),
            stage: Stage::Tables,
        })
    }

    /// Worksheets in workbook order.
    pub fn worksheets(&self) -> &[WorksheetInfo] {
        &self.sheets
    }

    pub fn date_system(&self) -> DateSystem {
        date_system(&self.book)
    }

    pub fn defined_names(&self) -> &[DefinedNameModel] {
        &self.book.defined_names
    }

    /// Styles referenced by the rows read so far, indexed by the rows'
    /// `style_id`s.
    pub fn styles(&self) -> &StyleTable {
        &self.model_styles
    }

    /// Cached shared strings; empty until the tables are loaded or when
    /// they are ignored.
    pub fn shared_strings(&self) -> &[SharedString] {
        &self.shared_strings
    }

    fn ensure_tables(&mut self) -> Result<(), XlsxError> {
        if self.tables_loaded {
            return Ok(());
        }
        self.tables_loaded = true;

        if self.options.shared_strings != SharedStringsMode::Ignore {
            if let Some(part) = &self.shared_strings_part {
                let reader = open_zip_part(
                    &mut self.archive,
                    part,
                    &self.options.limits,
                    &mut self.budget,
                )?
                .ok_or_else(|| XlsxError::MissingPart(part.clone()))?;
                self.shared_strings =
                    parse_part(&mut SharedStringsXform::default(), BufReader::new(reader), part)?
                        .values;
                log::debug!("cached {} shared strings", self.shared_strings.len());
            }
        }

        if self.options.styles == StylesMode::Cache {
            self.styles = match &self.styles_part {
                Some(part) => {
                    match open_zip_part(
                        &mut self.archive,
                        part,
                        &self.options.limits,
                        &mut self.budget,
                    )? {
                        Some(reader) => StyleManager::from_model(parse_part(
                            &mut StylesXform::default(),
                            BufReader::new(reader),
                            part,
                        )?),
                        None => {
                            log::warn!("styles part {part} is missing, using default formats");
                            StyleManager::fallback()
                        }
                    }
                }
                None => StyleManager::fallback(),
            };
        }
        Ok(())
    }

    fn ensure_sheet_rels(&mut self, info: &WorksheetInfo) -> Result<(), XlsxError> {
        if self.options.hyperlinks == HyperlinksMode::Ignore
            || self.hyperlinks.contains_key(&info.id)
        {
            return Ok(());
        }
        let rels = read_rels(&mut self.archive, &info.part, &self.options, &mut self.budget)?;
        self.hyperlinks.insert(info.id, hyperlink_targets(&rels));
        Ok(())
    }

    fn advance(&mut self) -> Result<bool, XlsxError> {
        match self.stage {
            Stage::Tables => {
                self.ensure_tables()?;
                if self.options.shared_strings == SharedStringsMode::Emit {
                    let events = self
                        .shared_strings
                        .iter()
                        .enumerate()
                        .map(|(index, value)| ReaderEvent::SharedString {
                            index: index as u32,
                            value: value.clone(),
                        });
                    self.pending.extend(events);
                }
                self.stage = Stage::Sheets(0);
            }
            Stage::Sheets(idx) => match self.sheets.get(idx).cloned() {
                Some(info) => {
                    self.ensure_sheet_rels(&info)?;
                    if self.options.hyperlinks == HyperlinksMode::Emit {
                        let mut links: Vec<(String, String)> = self
                            .hyperlinks
                            .get(&info.id)
                            .into_iter()
                            .flatten()
                            .map(|(id, target)| (id.clone(), target.clone()))
                            .collect();
                        links.sort_by(|a, b| natural_rel_order(&a.0, &b.0));
                        self.pending.extend(links.into_iter().map(|(id, target)| {
                            ReaderEvent::Hyperlink {
                                sheet: info.id,
                                id,
                                target,
                            }
                        }));
                    }
                    if self.options.worksheets == WorksheetsMode::Emit {
                        self.pending.push_back(ReaderEvent::Worksheet(info));
                    }
                    self.stage = Stage::Sheets(idx + 1);
                }
                None => {
                    self.pending.push_back(ReaderEvent::Finished);
                    self.stage = Stage::Done;
                }
            },
            Stage::Done => return Ok(false),
        }
        Ok(true)
    }

    /// Stream the rows of one worksheet.
    ///
    /// Rows are reconciled against the cached tables as they are read. Merge
    /// and hyperlink records follow the cell data in the part, so they are
    /// available from the [`RowReader`] once it is exhausted.
    pub fn rows(
        &mut self,
        info: &WorksheetInfo,
    ) -> Result<RowReader<'_, impl BufRead + '_>, XlsxError> {
        self.ensure_tables()?;
        self.ensure_sheet_rels(info)?;
        let date_system = date_system(&self.book);
        let Self {
            archive,
            options,
            budget,
            styles,
            model_styles,
            shared_strings,
            hyperlinks,
            ..
        } = self;
        let stream = open_zip_part(archive, &info.part, &options.limits, budget)?
            .ok_or_else(|| XlsxError::MissingPart(info.part.clone()))?;
        let strings = match options.shared_strings {
            SharedStringsMode::Ignore => None,
            SharedStringsMode::Cache | SharedStringsMode::Emit => Some(shared_strings.as_slice()),
        };
        let mut ctx = ReconcileContext::new(styles, model_styles, strings, date_system);
        ctx.hyperlink_targets = hyperlinks.get(&info.id).cloned().unwrap_or_default();
        log::debug!("streaming rows of {} from {}", info.name, info.part);
        Ok(RowReader {
            sax: SaxReader::new(BufReader::new(stream), &info.part),
            ctx,
            rows: RowXform::new(options.max_cols),
            max_rows: options.max_rows,
            ignore_styles: options.styles == StylesMode::Ignore,
            row_count: 0,
            merges: Vec::new(),
            hyperlinks: Vec::new(),
            done: false,
        })
    }
}

/// `rId2` sorts before `rId10`.
fn natural_rel_order(a: &str, b: &str) -> std::cmp::Ordering {
    let number = |id: &str| id.trim_start_matches("rId").parse::<u32>().ok();
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

impl<R: Read + Seek> Iterator for WorkbookReader<R> {
    type Item = Result<ReaderEvent, XlsxError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            match self.advance() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(err) => {
                    self.stage = Stage::Done;
                    self.pending.clear();
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Feed the subtree opened by `node` through `xform`.
fn parse_subtree<X: Xform, B: BufRead>(
    sax: &mut SaxReader<B>,
    xform: &mut X,
    node: &SaxNode,
) -> Result<Option<X::Model>, XlsxError> {
    let part = sax.part().to_string();
    if !xform.parse_open(node).map_err(|e| e.in_part(&part))? {
        sax.skip_subtree()?;
        return Ok(None);
    }
    while let Some(event) = sax.next_event()? {
        match event {
            SaxEvent::Open(child) => {
                xform.parse_open(&child).map_err(|e| e.in_part(&part))?;
            }
            SaxEvent::Text(text) => xform.parse_text(&text),
            SaxEvent::Close(name) => {
                if !xform.parse_close(&name).map_err(|e| e.in_part(&part))? {
                    return Ok(xform.take_model());
                }
            }
        }
    }
    Err(XlsxError::malformed(&part, "unexpected end of document"))
}

/// Rows of one worksheet, pulled from the zip entry on demand.
pub struct RowReader<'a, B: BufRead> {
    sax: SaxReader<B>,
    ctx: ReconcileContext<'a>,
    rows: RowXform,
    max_rows: Option<usize>,
    ignore_styles: bool,
    row_count: usize,
    merges: Vec<Range>,
    hyperlinks: Vec<HyperlinkModel>,
    done: bool,
}

impl<'a, B: BufRead> RowReader<'a, B> {
    /// Merged ranges seen so far; complete once the reader is exhausted.
    pub fn merges(&self) -> &[Range] {
        &self.merges
    }

    /// Hyperlinks seen so far, with external targets resolved.
    pub fn hyperlinks(&self) -> &[HyperlinkModel] {
        &self.hyperlinks
    }

    fn next_row(&mut self) -> Result<Option<(u32, Row)>, XlsxError> {
        while let Some(event) = self.sax.next_event()? {
            let SaxEvent::Open(node) = event else {
                continue;
            };
            match node.name.as_str() {
                "worksheet" | "sheetData" => {}
                "row" => {
                    if let Some(max) = self.max_rows {
                        if self.row_count >= max {
                            return Err(XlsxError::RowLimitExceeded { max });
                        }
                    }
                    self.row_count += 1;
                    let Some(mut model) = parse_subtree(&mut self.sax, &mut self.rows, &node)?
                    else {
                        continue;
                    };
                    if self.ignore_styles {
                        model.xf_id = None;
                        for cell in &mut model.cells {
                            cell.xf_id = 0;
                        }
                    }
                    self.rows
                        .reconcile(&mut model, &mut self.ctx)
                        .map_err(|e| e.in_part(self.sax.part()))?;
                    return Ok(Some((model.number, model.into_row())));
                }
                "mergeCells" => {
                    let mut xform = ListXform::new("mergeCells", merge_cell_xform());
                    if let Some(ranges) = parse_subtree(&mut self.sax, &mut xform, &node)? {
                        self.merges.extend(ranges);
                    }
                }
                "hyperlinks" => {
                    let mut xform = ListXform::new("hyperlinks", hyperlink_xform());
                    if let Some(links) = parse_subtree(&mut self.sax, &mut xform, &node)? {
                        for mut link in links {
                            if let Some(target) = link
                                .rel_id
                                .as_ref()
                                .and_then(|id| self.ctx.hyperlink_targets.get(id))
                            {
                                link.target = Some(target.clone());
                            }
                            self.hyperlinks.push(link);
                        }
                    }
                }
                _ => self.sax.skip_subtree()?,
            }
        }
        Ok(None)
    }
}

impl<'a, B: BufRead> Iterator for RowReader<'a, B> {
    type Item = Result<(u32, Row), XlsxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::writer::write_workbook;
    use crate::WriteOptions;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use tabula_model::{CellRef, CellValue, Hyperlink, Workbook};

    fn sample() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_sheet("First").unwrap();
        sheet.set_value(CellRef::new(1, 1), "alpha");
        sheet.set_value(CellRef::new(2, 1), 2.5);
        sheet.set_value(CellRef::new(2, 2), "beta");
        sheet
            .merge_cells(Range::new(CellRef::new(3, 1), CellRef::new(3, 2)))
            .unwrap();
        sheet.set_value(
            CellRef::new(4, 1),
            CellValue::Hyperlink(Hyperlink {
                text: "site".into(),
                target: "https://example.com".into(),
                tooltip: None,
            }),
        );
        workbook
            .add_sheet("Second")
            .unwrap()
            .set_value(CellRef::new(1, 1), "alpha");
        write_workbook(&workbook, Cursor::new(Vec::new()), &WriteOptions::default())
            .unwrap()
            .into_inner()
    }

    #[test]
    fn events_follow_table_then_sheet_order() {
        let options = StreamingReadOptions {
            shared_strings: SharedStringsMode::Emit,
            hyperlinks: HyperlinksMode::Emit,
            ..StreamingReadOptions::default()
        };
        let reader = WorkbookReader::new(Cursor::new(sample()), options).unwrap();
        let events: Vec<ReaderEvent> = reader.map(Result::unwrap).collect();

        let strings: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ReaderEvent::SharedString { index, value } => Some((*index, value.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            strings,
            vec![
                (0, SharedString::Text("alpha".into())),
                (1, SharedString::Text("beta".into())),
                (2, SharedString::Text("site".into())),
            ]
        );
        let tail: Vec<_> = events
            .iter()
            .filter(|e| !matches!(e, ReaderEvent::SharedString { .. }))
            .cloned()
            .collect();
        assert_eq!(
            tail,
            vec![
                ReaderEvent::Hyperlink {
                    sheet: 1,
                    id: "rId1".into(),
                    target: "https://example.com".into(),
                },
                ReaderEvent::Worksheet(WorksheetInfo {
                    id: 1,
                    name: "First".into(),
                    state: SheetState::Visible,
                    part: "xl/worksheets/sheet1.xml".into(),
                }),
                ReaderEvent::Worksheet(WorksheetInfo {
                    id: 2,
                    name: "Second".into(),
                    state: SheetState::Visible,
                    part: "xl/worksheets/sheet2.xml".into(),
                }),
                ReaderEvent::Finished,
            ]
        );
    }

    #[test]
    fn rows_are_reconciled_as_they_stream() {
        let mut reader =
            WorkbookReader::new(Cursor::new(sample()), StreamingReadOptions::default()).unwrap();
        let info = reader.worksheets()[0].clone();
        let mut rows = reader.rows(&info).unwrap();
        let collected: Vec<(u32, Row)> = rows.by_ref().map(Result::unwrap).collect();
        assert_eq!(
            collected.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            collected[0].1.cell(1).map(|c| &c.value),
            Some(&CellValue::from("alpha"))
        );
        assert_eq!(
            collected[1].1.cell(2).map(|c| &c.value),
            Some(&CellValue::from("beta"))
        );
        assert_eq!(
            rows.merges(),
            &[Range::new(CellRef::new(3, 1), CellRef::new(3, 2))]
        );
        assert_eq!(
            rows.hyperlinks()[0].target.as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn ignored_shared_strings_leave_indices() {
        let options = StreamingReadOptions {
            shared_strings: SharedStringsMode::Ignore,
            ..StreamingReadOptions::default()
        };
        let mut reader = WorkbookReader::new(Cursor::new(sample()), options).unwrap();
        let info = reader.worksheets()[1].clone();
        let rows: Vec<_> = reader.rows(&info).unwrap().map(Result::unwrap).collect();
        assert_eq!(rows[0].1.cell(1).map(|c| &c.value), Some(&CellValue::Number(0.0)));
        assert!(reader.shared_strings().is_empty());
    }

    #[test]
    fn row_limit_stops_the_stream() {
        let options = StreamingReadOptions {
            max_rows: Some(2),
            ..StreamingReadOptions::default()
        };
        let mut reader = WorkbookReader::new(Cursor::new(sample()), options).unwrap();
        let info = reader.worksheets()[0].clone();
        let results: Vec<_> = reader.rows(&info).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(matches!(
            results[2],
            Err(XlsxError::RowLimitExceeded { max: 2 })
        ));
    }

    #[test]
    fn error_is_yielded_once() {
        let options = StreamingReadOptions {
            limits: crate::options::PackageLimits {
                max_part_bytes: 16,
                ..Default::default()
            },
            ..StreamingReadOptions::default()
        };
        // The workbook part itself exceeds the limit.
        assert!(matches!(
            WorkbookReader::new(Cursor::new(sample()), options).err(),
            Some(XlsxError::PartTooLarge { .. })
        ));

        let mut reader =
            WorkbookReader::new(Cursor::new(sample()), StreamingReadOptions::default()).unwrap();
        reader.options.limits.max_part_bytes = 16;
        assert!(matches!(reader.next(), Some(Err(XlsxError::PartTooLarge { .. }))));
        assert!(reader.next().is_none());
    }
}
