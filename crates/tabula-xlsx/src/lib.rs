//! XLSX reading and writing for [`tabula_model::Workbook`].
//!
//! Every XML part is handled by a tree of transform nodes ([`xform`]) that
//! render a model into an [`XmlStream`] and rebuild it from the token stream
//! of [`sax`]. The crate exposes:
//!
//! - [`write_workbook`]/[`read_workbook`]: eager export and import of a whole
//!   workbook. Reading inflates every zip entry under [`PackageLimits`].
//! - [`WorkbookWriter`]: a streaming writer that commits rows straight into
//!   the worksheet's zip entry.
//! - [`WorkbookReader`]: a pull reader yielding [`ReaderEvent`]s and streaming
//!   rows of one worksheet at a time.
//!
//! Style and shared string ids in the file are interned per document through
//! the [`tables`] and mapped back to workbook style ids on read.

mod error;
pub mod options;
mod package;
pub mod path;
pub mod sax;
pub mod tables;
pub mod xform;
mod xml_stream;
mod zip_util;

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Write};
use std::path::Path;

use tabula_model::Workbook;

pub use error::XlsxError;
pub use options::{
    Compression, HyperlinksMode, PackageLimits, ReadOptions, SharedStringsMode,
    StreamingReadOptions, StylesMode, WorksheetsMode, WriteOptions,
};
pub use package::reader::read_workbook;
pub use package::stream_reader::{ReaderEvent, RowReader, WorkbookReader, WorksheetInfo};
pub use package::stream_writer::{WorkbookWriter, WorksheetWriter};
pub use package::theme::{default_theme, render_theme, ThemePalette};
pub use package::writer::write_workbook;
pub use xml_stream::XmlStream;

/// Write `workbook` into an in-memory xlsx package.
pub fn write_workbook_to_vec(
    workbook: &Workbook,
    options: &WriteOptions,
) -> Result<Vec<u8>, XlsxError> {
    Ok(write_workbook(workbook, Cursor::new(Vec::new()), options)?.into_inner())
}

pub fn write_workbook_to_path(
    workbook: &Workbook,
    path: impl AsRef<Path>,
    options: &WriteOptions,
) -> Result<(), XlsxError> {
    let file = File::create(path)?;
    let mut writer = write_workbook(workbook, BufWriter::new(file), options)?;
    writer.flush()?;
    Ok(())
}

pub fn read_workbook_from_bytes(bytes: &[u8], options: &ReadOptions) -> Result<Workbook, XlsxError> {
    read_workbook(Cursor::new(bytes), options)
}

pub fn read_workbook_from_path(
    path: impl AsRef<Path>,
    options: &ReadOptions,
) -> Result<Workbook, XlsxError> {
    let file = File::open(path)?;
    read_workbook(BufReader::new(file), options)
}
