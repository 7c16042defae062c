//! Package orchestration: which parts exist, where they live and the order
//! they are written and read in.

use std::io::{Seek, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

use crate::options::Compression;
use crate::XlsxError;

pub mod reader;
pub mod stream_reader;
pub mod stream_writer;
pub mod theme;
pub mod writer;

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const ROOT_RELS_PART: &str = "_rels/.rels";
pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub(crate) const STYLES_PART: &str = "xl/styles.xml";
pub(crate) const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
pub(crate) const THEME_PART: &str = "xl/theme/theme1.xml";
pub(crate) const CORE_PART: &str = "docProps/core.xml";
pub(crate) const APP_PART: &str = "docProps/app.xml";

pub(crate) fn worksheet_part(id: u32) -> String {
    format!("xl/worksheets/sheet{id}.xml")
}

pub(crate) fn comments_part(id: u32) -> String {
    format!("xl/comments{id}.xml")
}

pub(crate) fn vml_drawing_part(id: u32) -> String {
    format!("xl/drawings/vmlDrawing{id}.vml")
}

/// Zip output with one compression setting for every entry.
pub(crate) struct PartWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions<'static, ()>,
}

impl<W: Write + Seek> PartWriter<W> {
    pub(crate) fn new(writer: W, compression: Compression) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            options: FileOptions::<()>::default().compression_method(compression.method()),
        }
    }

    /// Start an entry whose content is written in pieces with [`Self::append`].
    pub(crate) fn start(&mut self, name: &str) -> Result<(), XlsxError> {
        log::debug!("writing {name}");
        self.zip.start_file(name, self.options)?;
        Ok(())
    }

    pub(crate) fn append(&mut self, content: &str) -> Result<(), XlsxError> {
        self.zip.write_all(content.as_bytes())?;
        Ok(())
    }

    pub(crate) fn write_part(&mut self, name: &str, content: &str) -> Result<(), XlsxError> {
        self.start(name)?;
        self.append(content)
    }

    pub(crate) fn finish(self) -> Result<W, XlsxError> {
        Ok(self.zip.finish()?)
    }
}
