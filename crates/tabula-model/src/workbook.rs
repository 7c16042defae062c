use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sheet_name::{sheet_name_eq_case_insensitive, validate_sheet_name, SheetNameError};
use crate::{CellValue, DateSystem, DefinedNames, Style, StyleTable, Worksheet};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WorkbookError {
    #[error("invalid sheet name: {0}")]
    InvalidSheetName(#[from] SheetNameError),
    #[error("duplicate sheet name: {0}")]
    DuplicateSheet(String),
    #[error("sheet not found: {0}")]
    SheetNotFound(String),
}

/// Document properties written to `docProps/core.xml` and `docProps/app.xml`.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

/// An in-memory workbook.
#[derive(Clone, Debug, Default)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
    pub styles: StyleTable,
    pub defined_names: DefinedNames,
    pub date_system: DateSystem,
    pub properties: DocumentProperties,
    /// Index of the sheet shown on open.
    pub active_sheet: usize,
    /// Raw theme part, kept verbatim when loaded from a file.
    pub theme_xml: Option<String>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new empty worksheet.
    pub fn add_sheet(&mut self, name: &str) -> Result<&mut Worksheet, WorkbookError> {
        self.push_sheet(Worksheet::new(name))
    }

    /// Add an existing worksheet, validating its name.
    pub fn push_sheet(&mut self, sheet: Worksheet) -> Result<&mut Worksheet, WorkbookError> {
        validate_sheet_name(&sheet.name)?;
        if self.sheet_index(&sheet.name).is_some() {
            return Err(WorkbookError::DuplicateSheet(sheet.name));
        }
        self.sheets.push(sheet);
        let idx = self.sheets.len() - 1;
        Ok(&mut self.sheets[idx])
    }

    fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|s| sheet_name_eq_case_insensitive(&s.name, name))
    }

    pub fn sheets(&self) -> &[Worksheet] {
        &self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheet_index(name).map(|i| &self.sheets[i])
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        self.sheet_index(name).map(move |i| &mut self.sheets[i])
    }

    pub fn remove_sheet(&mut self, name: &str) -> Result<Worksheet, WorkbookError> {
        let idx = self
            .sheet_index(name)
            .ok_or_else(|| WorkbookError::SheetNotFound(name.to_string()))?;
        if self.active_sheet >= idx && self.active_sheet > 0 {
            self.active_sheet -= 1;
        }
        let sheet = self.sheets.remove(idx);
        self.defined_names.remove_sheet(&sheet.name, idx as u32);
        Ok(sheet)
    }

    /// Rename a sheet, carrying defined names along.
    pub fn rename_sheet(&mut self, from: &str, to: &str) -> Result<(), WorkbookError> {
        validate_sheet_name(to)?;
        let idx = self
            .sheet_index(from)
            .ok_or_else(|| WorkbookError::SheetNotFound(from.to_string()))?;
        if let Some(other) = self.sheet_index(to) {
            if other != idx {
                return Err(WorkbookError::DuplicateSheet(to.to_string()));
            }
        }
        let old = std::mem::replace(&mut self.sheets[idx].name, to.to_string());
        self.defined_names.rename_sheet(&old, to);
        Ok(())
    }

    /// Intern a style, returning the id to store on cells.
    pub fn intern_style(&mut self, style: Style) -> u32 {
        self.styles.intern(style)
    }

    /// Splice rows of `sheet`, keeping defined names in step with the grid.
    pub fn splice_rows(
        &mut self,
        sheet: &str,
        start: u32,
        delete: u32,
        inserts: Vec<Vec<CellValue>>,
    ) -> Result<(), WorkbookError> {
        let insert = inserts.len() as u32;
        let ws = self
            .sheet_mut(sheet)
            .ok_or_else(|| WorkbookError::SheetNotFound(sheet.to_string()))?;
        ws.splice_rows(start, delete, inserts);
        let name = ws.name.clone();
        self.defined_names.splice_rows(&name, start, delete, insert);
        Ok(())
    }

    /// Splice columns of `sheet`, keeping defined names in step with the grid.
    pub fn splice_columns(
        &mut self,
        sheet: &str,
        start: u32,
        delete: u32,
        inserts: Vec<Vec<CellValue>>,
    ) -> Result<(), WorkbookError> {
        let insert = inserts.len() as u32;
        let ws = self
            .sheet_mut(sheet)
            .ok_or_else(|| WorkbookError::SheetNotFound(sheet.to_string()))?;
        ws.splice_columns(start, delete, inserts);
        let name = ws.name.clone();
        self.defined_names.splice_columns(&name, start, delete, insert);
        Ok(())
    }
}
