use tabula_model::{DefinedNameError, MergeError, WorkbookError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error in {part} at byte {position}: {source}")]
    Xml {
        part: String,
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("malformed {part}: {message}")]
    Malformed { part: String, message: String },
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("Max row count ({max}) exceeded")]
    RowLimitExceeded { max: usize },
    #[error("Max column count ({max}) exceeded")]
    ColumnLimitExceeded { max: usize },
    #[error(
        "xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("xlsx package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
    #[error("unknown style id {0}")]
    UnknownStyleId(u32),
    #[error("unknown shared string index {0}")]
    UnknownSharedString(u32),
    #[error("invalid cell address: {0}")]
    InvalidAddress(String),
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),
    #[error("workbook error: {0}")]
    Workbook(#[from] WorkbookError),
    #[error("defined name error: {0}")]
    DefinedName(#[from] DefinedNameError),
    #[error("rows must be written in ascending order (row {row} after {last})")]
    RowOutOfOrder { row: u32, last: u32 },
    #[error("worksheet {0} was not committed")]
    WorksheetNotCommitted(String),
    #[error("column definitions must be set before the first row")]
    ColumnsAfterRows,
}

impl XlsxError {
    pub(crate) fn malformed(part: &str, message: impl Into<String>) -> Self {
        XlsxError::Malformed {
            part: part.to_string(),
            message: message.into(),
        }
    }

    /// Attach the part name to errors raised without one.
    pub(crate) fn in_part(self, part: &str) -> Self {
        match self {
            XlsxError::Malformed { part: p, message } if p.is_empty() => XlsxError::Malformed {
                part: part.to_string(),
                message,
            },
            XlsxError::Xml {
                part: p,
                position,
                source,
            } if p.is_empty() => XlsxError::Xml {
                part: part.to_string(),
                position,
                source,
            },
            other => other,
        }
    }
}
