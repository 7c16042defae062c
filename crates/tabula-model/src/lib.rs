//! `tabula-model` defines the in-memory spreadsheet data structures.
//!
//! The crate is free of any file-format concerns so it can be shared by:
//! - the `.xlsx` reader/writer (`tabula-xlsx`)
//! - hosts that build or inspect workbooks directly
//! - IPC boundaries via `serde`

mod address;
mod cell;
pub mod cell_matrix;
mod column;
mod date_system;
mod names;
mod rich_text;
mod row;
mod sheet_name;
pub mod splice;
mod style;
mod value;
mod workbook;
mod worksheet;

pub use address::{
    col_to_name, name_to_col, quote_sheet_name, A1ParseError, CellRef, Range, RangeIter,
    RangeParseError, SheetRange, MAX_COLS, MAX_ROWS,
};
pub use cell::{Cell, Comment};
pub use cell_matrix::{CellMatrix, MatrixCell};
pub use column::{normalize_column_defs, ColumnDef};
pub use date_system::DateSystem;
pub use names::{
    validate_defined_name, DefinedNameError, DefinedNameModel, DefinedNameValidationError,
    DefinedNames, DEFINED_NAME_MAX_LEN, MAX_TRACKED_RANGE_CELLS, XLNM_PRINT_AREA,
};
pub use rich_text::{RichText, RichTextRun};
pub use row::Row;
pub use sheet_name::{
    sheet_name_eq_case_insensitive, validate_sheet_name, SheetNameError, SHEET_NAME_MAX_LEN,
};
pub use style::{
    Alignment, Border, BorderEdge, BorderStyle, Color, Fill, Font, GradientStop,
    HorizontalAlignment, PatternType, Protection, Style, StyleTable, Underline, VertAlign,
    VerticalAlignment,
};
pub use value::{CellValue, ErrorValue, Formula, FormulaResult, Hyperlink, ValueKind};
pub use workbook::{DocumentProperties, Workbook, WorkbookError};
pub use worksheet::{MergeError, PageMargins, SheetState, SheetView, Worksheet};
