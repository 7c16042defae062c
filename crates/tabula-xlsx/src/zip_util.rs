use std::collections::BTreeMap;
use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::options::PackageLimits;
use crate::XlsxError;

/// Canonical lookup key for a ZIP entry name.
///
/// - percent-decodes valid `%xx` sequences
/// - strips leading `/` or `\` separators
/// - normalizes `\` to `/`
/// - ASCII-lowercases
pub(crate) fn part_name_key(name: &str) -> String {
    fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let mut bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_leading_separators = true;
    while let Some(&b) = bytes.first() {
        let decoded = match (b, bytes.get(1).copied(), bytes.get(2).copied()) {
            (b'%', Some(hi), Some(lo)) => match (hex_val(hi), hex_val(lo)) {
                (Some(hi), Some(lo)) => {
                    bytes = &bytes[3..];
                    (hi << 4) | lo
                }
                _ => {
                    bytes = &bytes[1..];
                    b
                }
            },
            _ => {
                bytes = &bytes[1..];
                b
            }
        };

        if in_leading_separators && matches!(decoded, b'/' | b'\\') {
            continue;
        }
        in_leading_separators = false;

        out.push(if decoded == b'\\' {
            b'/'
        } else {
            decoded.to_ascii_lowercase()
        });
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Locate a ZIP entry by part name, tolerating a leading `/` mismatch,
/// Windows separators and ASCII case differences. Exact matches win.
pub(crate) fn find_zip_part<R: Read + Seek>(archive: &ZipArchive<R>, name: &str) -> Option<usize> {
    let key = part_name_key(name);
    let mut candidate = None::<(usize, u8)>;
    for (idx, entry) in archive.file_names().enumerate() {
        if entry == name {
            return Some(idx);
        }
        let score = if entry.trim_start_matches('/') == name.trim_start_matches('/') {
            2
        } else if part_name_key(entry) == key {
            1
        } else {
            continue;
        };
        if candidate.map_or(true, |(_, best)| best < score) {
            candidate = Some((idx, score));
        }
    }
    candidate.map(|(idx, _)| idx)
}

/// Running total of bytes inflated from one package.
#[derive(Debug, Clone)]
pub(crate) struct ZipInflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl ZipInflateBudget {
    pub(crate) fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    pub(crate) fn consume(&mut self, bytes: u64) -> Result<(), XlsxError> {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
        if self.used_bytes > self.max_total_bytes {
            return Err(XlsxError::PackageTooLarge {
                total: self.used_bytes,
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Read an entry into memory without trusting its declared size: the
/// declared size is a fast-path rejection, and the read itself is capped at
/// `limit + 1` bytes.
pub(crate) fn read_with_limit<R: Read>(
    reader: R,
    declared_size: u64,
    part: &str,
    max_part_bytes: u64,
    budget: &mut ZipInflateBudget,
) -> Result<Vec<u8>, XlsxError> {
    let remaining = budget.remaining_bytes();
    let limit = max_part_bytes.min(remaining);
    let limit_is_total = limit < max_part_bytes;

    let too_large = |size: u64| {
        if limit_is_total {
            XlsxError::PackageTooLarge {
                total: budget.used_bytes.saturating_add(size),
                max: budget.max_total_bytes,
            }
        } else {
            XlsxError::PartTooLarge {
                part: part.to_string(),
                size,
                max: max_part_bytes,
            }
        }
    };

    if declared_size > limit {
        return Err(too_large(declared_size));
    }

    let mut buf = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)?;
    let observed = buf.len() as u64;
    if observed > limit {
        return Err(too_large(observed));
    }

    budget.consume(observed)?;
    Ok(buf)
}

/// Read one part by name, `Ok(None)` when it does not exist.
pub(crate) fn read_zip_part_optional<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limits: &PackageLimits,
    budget: &mut ZipInflateBudget,
) -> Result<Option<Vec<u8>>, XlsxError> {
    let Some(idx) = find_zip_part(archive, name) else {
        return Ok(None);
    };
    let file = archive.by_index(idx)?;
    if file.is_dir() {
        return Ok(None);
    }
    let size = file.size();
    read_with_limit(file, size, name, limits.max_part_bytes, budget).map(Some)
}

/// Open one part for incremental reading, `Ok(None)` when it does not exist.
///
/// The declared size is checked against the limits and charged to the
/// budget up front; the stream never yields more than that, so a forged
/// size shows up as a truncated part.
pub(crate) fn open_zip_part<'a, R: Read + Seek>(
    archive: &'a mut ZipArchive<R>,
    name: &str,
    limits: &PackageLimits,
    budget: &mut ZipInflateBudget,
) -> Result<Option<impl Read + 'a>, XlsxError> {
    let Some(idx) = find_zip_part(archive, name) else {
        return Ok(None);
    };
    let file = archive.by_index(idx)?;
    if file.is_dir() {
        return Ok(None);
    }
    let size = file.size();
    if size > limits.max_part_bytes {
        return Err(XlsxError::PartTooLarge {
            part: name.to_string(),
            size,
            max: limits.max_part_bytes,
        });
    }
    budget.consume(size)?;
    Ok(Some(file.take(size)))
}

/// Inflate every file entry, keyed by [`part_name_key`].
pub(crate) fn read_all_parts<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    limits: &PackageLimits,
) -> Result<BTreeMap<String, Vec<u8>>, XlsxError> {
    let mut budget = ZipInflateBudget::new(limits.max_total_bytes);
    let mut parts = BTreeMap::new();
    for idx in 0..archive.len() {
        let file = archive.by_index(idx)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let size = file.size();
        let bytes = read_with_limit(file, size, &name, limits.max_part_bytes, &mut budget)?;
        // First entry wins when a producer wrote equivalent names twice.
        parts.entry(part_name_key(&name)).or_insert(bytes);
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Write};

    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(cursor);
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn key_handles_case_separators_and_percent_encoding() {
        assert_eq!(part_name_key("XL\\Workbook.xml"), "xl/workbook.xml");
        assert_eq!(part_name_key("/xl/workbook.xml"), "xl/workbook.xml");
        assert_eq!(part_name_key("%2Fxl%2Fsheet%201.xml"), "xl/sheet 1.xml");
    }

    #[test]
    fn find_prefers_exact_over_equivalent() {
        let bytes = build_zip(&[
            ("XL\\Workbook.xml", b"equivalent"),
            ("xl/workbook.xml", b"exact"),
        ]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let limits = PackageLimits::default();
        let mut budget = ZipInflateBudget::new(limits.max_total_bytes);
        let part = read_zip_part_optional(&mut archive, "xl/workbook.xml", &limits, &mut budget)
            .unwrap()
            .unwrap();
        assert_eq!(part, b"exact");
    }

    #[test]
    fn find_accepts_leading_slash_variant() {
        let bytes = build_zip(&[("/xl/workbook.xml", b"with_slash")]);
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(find_zip_part(&archive, "xl/workbook.xml"), Some(0));
        assert_eq!(find_zip_part(&archive, "xl/styles.xml"), None);
    }

    #[test]
    fn part_limit_is_enforced() {
        let bytes = build_zip(&[("a.txt", b"hello world")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let limits = PackageLimits {
            max_part_bytes: 10,
            max_total_bytes: 100,
        };
        let mut budget = ZipInflateBudget::new(limits.max_total_bytes);
        let err = read_zip_part_optional(&mut archive, "a.txt", &limits, &mut budget).unwrap_err();
        match err {
            XlsxError::PartTooLarge { part, .. } => assert_eq!(part, "a.txt"),
            other => panic!("expected PartTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn total_budget_is_enforced_across_parts() {
        let bytes = build_zip(&[("a.txt", b"0123456789"), ("b.txt", b"0123456789")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let limits = PackageLimits {
            max_part_bytes: 100,
            max_total_bytes: 15,
        };
        let err = read_all_parts(&mut archive, &limits).unwrap_err();
        assert!(matches!(err, XlsxError::PackageTooLarge { max: 15, .. }));
    }

    #[test]
    fn streamed_part_is_charged_to_the_budget() {
        let bytes = build_zip(&[("a.txt", b"0123456789"), ("b.txt", b"0123456789")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let limits = PackageLimits {
            max_part_bytes: 100,
            max_total_bytes: 15,
        };
        let mut budget = ZipInflateBudget::new(limits.max_total_bytes);
        let mut out = String::new();
        open_zip_part(&mut archive, "a.txt", &limits, &mut budget)
            .unwrap()
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "0123456789");
        assert!(open_zip_part(&mut archive, "missing.txt", &limits, &mut budget)
            .unwrap()
            .is_none());
        let err = open_zip_part(&mut archive, "b.txt", &limits, &mut budget)
            .err()
            .unwrap();
        assert!(matches!(err, XlsxError::PackageTooLarge { max: 15, .. }));
    }

    #[test]
    fn forged_declared_size_is_not_trusted() {
        let mut budget = ZipInflateBudget::new(1_000);
        let err = read_with_limit(&b"hello world"[..], 1, "x", 5, &mut budget).unwrap_err();
        assert!(matches!(err, XlsxError::PartTooLarge { size: 6, .. }));
    }
}
