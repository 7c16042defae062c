use serde::{Deserialize, Serialize};

/// Default maximum uncompressed size permitted for any single ZIP part inflated into memory.
pub const DEFAULT_MAX_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Default maximum total uncompressed bytes inflated while loading one package.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512MiB

/// Limits applied when inflating ZIP parts into memory.
///
/// These are guardrails against ZIP bombs and forged size metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageLimits {
    pub max_part_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

/// Options for [`crate::read_workbook`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Fail when a worksheet has more `row` elements than this.
    pub max_rows: Option<usize>,
    /// Fail when a row has more `c` elements than this.
    pub max_cols: Option<usize>,
    pub limits: PackageLimits,
}

/// Options for [`crate::write_workbook`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Write strings through `xl/sharedStrings.xml` instead of inline.
    pub use_shared_strings: bool,
    /// Write cell styles. When false every cell uses the default format.
    pub use_styles: bool,
    pub compression: Compression,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            use_shared_strings: true,
            use_styles: true,
            compression: Compression::Deflated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl Compression {
    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Stored => zip::CompressionMethod::Stored,
            Compression::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

/// How the streaming reader treats shared strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SharedStringsMode {
    /// Keep them and resolve string cells.
    #[default]
    Cache,
    /// Yield each one as an event (and keep resolving cells).
    Emit,
    /// Skip the part; string cells hold their raw index as a number.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StylesMode {
    #[default]
    Cache,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HyperlinksMode {
    /// Resolve hyperlink targets for the row readers.
    #[default]
    Cache,
    /// Also yield hyperlink relationships as events.
    Emit,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorksheetsMode {
    #[default]
    Emit,
    Ignore,
}

/// Options for [`crate::WorkbookReader`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingReadOptions {
    pub shared_strings: SharedStringsMode,
    pub styles: StylesMode,
    pub hyperlinks: HyperlinksMode,
    pub worksheets: WorksheetsMode,
    pub max_rows: Option<usize>,
    pub max_cols: Option<usize>,
    pub limits: PackageLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ReadOptions = serde_json::from_str(r#"{"max_rows": 10}"#).unwrap();
        assert_eq!(opts.max_rows, Some(10));
        assert_eq!(opts.limits, PackageLimits::default());

        let opts: WriteOptions = serde_json::from_str(r#"{"use_shared_strings": false}"#).unwrap();
        assert!(!opts.use_shared_strings);
        assert!(opts.use_styles);

        let opts: StreamingReadOptions =
            serde_json::from_str(r#"{"shared_strings": "emit", "styles": "ignore"}"#).unwrap();
        assert_eq!(opts.shared_strings, SharedStringsMode::Emit);
        assert_eq!(opts.styles, StylesMode::Ignore);
        assert_eq!(opts.worksheets, WorksheetsMode::Emit);
    }
}
