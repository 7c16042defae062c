use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell_matrix::CellMatrix;
use crate::{CellRef, Range, RangeParseError, SheetRange};

/// Maximum length of a defined name in characters.
pub const DEFINED_NAME_MAX_LEN: usize = 255;

/// Ranges larger than this are kept as opaque definitions instead of being
/// expanded cell by cell.
pub const MAX_TRACKED_RANGE_CELLS: u64 = 1 << 20;

/// Built-in defined name for a sheet's print area.
pub const XLNM_PRINT_AREA: &str = "_xlnm.Print_Area";

fn is_false(v: &bool) -> bool {
    !*v
}

/// Serialized form of one defined name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinedNameModel {
    pub name: String,
    /// Sheet-qualified absolute ranges, e.g. `'My Sheet'!$A$1:$B$2`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<String>,
    /// Definition that is not a plain list of ranges (constant, formula,
    /// `#REF!`), kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_sheet_id: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
}

impl DefinedNameModel {
    /// Build from the text content of a `definedName` element.
    pub fn from_definition(name: impl Into<String>, text: &str) -> Self {
        let name = name.into();
        match parse_range_list(text) {
            Some(ranges) => Self {
                name,
                ranges: ranges.iter().map(ToString::to_string).collect(),
                formula: None,
                local_sheet_id: None,
                hidden: false,
            },
            None => Self {
                name,
                ranges: Vec::new(),
                formula: Some(text.to_string()),
                local_sheet_id: None,
                hidden: false,
            },
        }
    }

    /// Text content for a `definedName` element.
    pub fn definition(&self) -> String {
        match &self.formula {
            Some(formula) => formula.clone(),
            None => self.ranges.join(","),
        }
    }
}

/// Split on commas that are not inside a quoted sheet name.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            ',' if !in_quote => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Parse `Sheet1!$A$1,'Other'!$B$2:$C$3` into sheet-qualified ranges. Returns
/// `None` when any part is not a bounded, sheet-qualified range.
fn parse_range_list(text: &str) -> Option<Vec<SheetRange>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let mut out = Vec::new();
    for part in split_top_level(text) {
        let range = SheetRange::parse(part).ok()?;
        range.sheet.as_ref()?;
        let area = range.range.width() as u64 * range.range.height() as u64;
        if area > MAX_TRACKED_RANGE_CELLS {
            return None;
        }
        out.push(range);
    }
    Some(out)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct NameInfo {
    local_sheet_id: Option<u32>,
    hidden: bool,
}

/// Errors raised by [`DefinedNames`] operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DefinedNameError {
    #[error(transparent)]
    InvalidName(#[from] DefinedNameValidationError),
    #[error("invalid location: {0}")]
    InvalidLocation(#[from] RangeParseError),
    #[error("location must name a sheet: {0}")]
    MissingSheet(String),
}

/// Workbook defined names.
///
/// Range-valued names are tracked cell by cell in a [`CellMatrix`] per name,
/// so splicing rows or columns moves them with the grid; the ranges are
/// rebuilt by flood fill when read back.
#[derive(Clone, Debug, Default)]
pub struct DefinedNames {
    matrices: BTreeMap<String, CellMatrix<()>>,
    formulas: BTreeMap<String, String>,
    info: BTreeMap<String, NameInfo>,
}

impl DefinedNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name` to every cell of a location like `'Sheet 1'!$A$1:$B$2`.
    pub fn add(&mut self, location: &str, name: &str) -> Result<(), DefinedNameError> {
        let range = SheetRange::parse(location)?;
        self.add_ex(&range, name)
    }

    pub fn add_ex(&mut self, location: &SheetRange, name: &str) -> Result<(), DefinedNameError> {
        validate_defined_name(name)?;
        let sheet = location
            .sheet
            .as_deref()
            .ok_or_else(|| DefinedNameError::MissingSheet(location.to_string()))?;
        self.formulas.remove(name);
        self.info.entry(name.to_string()).or_default();
        self.matrices
            .entry(name.to_string())
            .or_default()
            .add_cell_ex(sheet, location.range);
        Ok(())
    }

    /// Remove `name` from the cells of `location`.
    pub fn remove(&mut self, location: &str, name: &str) -> Result<(), DefinedNameError> {
        let range = SheetRange::parse(location)?;
        let sheet = range
            .sheet
            .as_deref()
            .ok_or_else(|| DefinedNameError::MissingSheet(location.to_string()))?;
        if let Some(matrix) = self.matrices.get_mut(name) {
            matrix.remove_cell_ex(sheet, range.range);
            if matrix.is_empty() {
                self.matrices.remove(name);
                self.info.remove(name);
            }
        }
        Ok(())
    }

    /// Remove every name from the cells of `location`.
    pub fn remove_all_names(&mut self, location: &str) -> Result<(), DefinedNameError> {
        let names: Vec<String> = self.matrices.keys().cloned().collect();
        for name in names {
            self.remove(location, &name)?;
        }
        Ok(())
    }

    /// Names carried by the single cell `location`, in name order.
    pub fn names_at(&self, location: &str) -> Result<Vec<String>, DefinedNameError> {
        let range = SheetRange::parse(location)?;
        let sheet = range
            .sheet
            .as_deref()
            .ok_or_else(|| DefinedNameError::MissingSheet(location.to_string()))?;
        Ok(self
            .matrices
            .iter()
            .filter(|(_, m)| m.find_cell(sheet, range.range.start).is_some())
            .map(|(name, _)| name.clone())
            .collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.matrices.contains_key(name) || self.formulas.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty() && self.formulas.is_empty()
    }

    /// Reconstruct the ranges of `name` as sheet-qualified absolute strings.
    ///
    /// Each unvisited cell seeds a rectangle that first grows up and down
    /// within its column, then left and right one whole column at a time;
    /// a column is taken only when every row of the rectangle has a cell
    /// there.
    pub fn ranges(&self, name: &str) -> Vec<String> {
        let Some(matrix) = self.matrices.get(name) else {
            return Vec::new();
        };
        let mut scratch = matrix.clone();
        reconstruct_ranges(&mut scratch)
            .into_iter()
            .map(|r| r.to_string())
            .collect()
    }

    pub fn splice_rows(&mut self, sheet: &str, start: u32, delete: u32, insert: u32) {
        for matrix in self.matrices.values_mut() {
            matrix.splice_rows(sheet, start, delete, insert);
            matrix.normalise();
        }
        self.drop_empty();
    }

    pub fn splice_columns(&mut self, sheet: &str, start: u32, delete: u32, insert: u32) {
        for matrix in self.matrices.values_mut() {
            matrix.splice_columns(sheet, start, delete, insert);
            matrix.normalise();
        }
        self.drop_empty();
    }

    fn drop_empty(&mut self) {
        let empty: Vec<String> = self
            .matrices
            .iter()
            .filter(|(_, m)| m.is_empty())
            .map(|(n, _)| n.clone())
            .collect();
        for name in empty {
            self.matrices.remove(&name);
            self.info.remove(&name);
        }
    }

    /// Rename a sheet in every range-valued name.
    pub fn rename_sheet(&mut self, from: &str, to: &str) {
        for matrix in self.matrices.values_mut() {
            matrix.rename_sheet(from, to);
        }
    }

    /// Forget sheet `sheet`, which sat at position `index`: its cells leave
    /// every range-valued name, names scoped to it are dropped and later
    /// sheet scopes shift down by one.
    pub fn remove_sheet(&mut self, sheet: &str, index: u32) {
        for matrix in self.matrices.values_mut() {
            matrix.remove_sheet(sheet);
        }
        let scoped: Vec<String> = self
            .info
            .iter()
            .filter(|(_, info)| info.local_sheet_id == Some(index))
            .map(|(name, _)| name.clone())
            .collect();
        for name in scoped {
            self.matrices.remove(&name);
            self.formulas.remove(&name);
            self.info.remove(&name);
        }
        for info in self.info.values_mut() {
            if let Some(id) = info.local_sheet_id.as_mut().filter(|id| **id > index) {
                *id -= 1;
            }
        }
        self.drop_empty();
    }

    /// Snapshot of all names in name order.
    pub fn model(&self) -> Vec<DefinedNameModel> {
        let mut out = Vec::new();
        let names: Vec<String> = self
            .matrices
            .keys()
            .chain(self.formulas.keys())
            .cloned()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        for name in names {
            let info = self.info.get(&name).cloned().unwrap_or_default();
            let (ranges, formula) = match self.formulas.get(&name) {
                Some(formula) => (Vec::new(), Some(formula.clone())),
                None => (self.ranges(&name), None),
            };
            out.push(DefinedNameModel {
                name,
                ranges,
                formula,
                local_sheet_id: info.local_sheet_id,
                hidden: info.hidden,
            });
        }
        out
    }

    /// Replace all names. Names from files are not re-validated.
    pub fn set_model(&mut self, model: Vec<DefinedNameModel>) {
        self.matrices.clear();
        self.formulas.clear();
        self.info.clear();
        for def in model {
            self.info.insert(
                def.name.clone(),
                NameInfo {
                    local_sheet_id: def.local_sheet_id,
                    hidden: def.hidden,
                },
            );
            if let Some(formula) = def.formula {
                self.formulas.insert(def.name, formula);
                continue;
            }
            let matrix = self.matrices.entry(def.name.clone()).or_default();
            for text in &def.ranges {
                match SheetRange::parse(text) {
                    Ok(SheetRange {
                        sheet: Some(sheet),
                        range,
                    }) => matrix.add_cell_ex(&sheet, range),
                    _ => {
                        self.formulas.insert(def.name.clone(), def.ranges.join(","));
                        break;
                    }
                }
            }
            if self.formulas.contains_key(&def.name) {
                self.matrices.remove(&def.name);
            }
        }
    }
}

/// Flood-fill a matrix into maximal rectangles, in matrix iteration order.
fn reconstruct_ranges(matrix: &mut CellMatrix<()>) -> Vec<SheetRange> {
    matrix.for_each(|cell| cell.mark = true);
    let seeds: Vec<(String, u32, u32)> = matrix
        .cells()
        .map(|c| (c.sheet.clone(), c.row, c.col))
        .collect();

    let mut out = Vec::new();
    for (sheet, row, col) in seeds {
        let still_marked = matrix
            .find_cell_at(&sheet, row, col)
            .is_some_and(|c| c.mark);
        if !still_marked {
            continue;
        }
        let range = explore(matrix, &sheet, row, col);
        out.push(SheetRange {
            sheet: Some(sheet),
            range,
        });
    }
    out
}

fn take_mark(matrix: &mut CellMatrix<()>, sheet: &str, row: u32, col: u32) -> bool {
    match matrix.find_cell_at_mut(sheet, row, col) {
        Some(cell) if cell.mark => {
            cell.mark = false;
            true
        }
        _ => false,
    }
}

fn is_marked(matrix: &CellMatrix<()>, sheet: &str, row: u32, col: u32) -> bool {
    matrix
        .find_cell_at(sheet, row, col)
        .is_some_and(|c| c.mark)
}

fn explore(matrix: &mut CellMatrix<()>, sheet: &str, row: u32, col: u32) -> Range {
    take_mark(matrix, sheet, row, col);
    let (mut top, mut bottom, mut left, mut right) = (row, row, col, col);

    while top > 1 && take_mark(matrix, sheet, top - 1, col) {
        top -= 1;
    }
    while take_mark(matrix, sheet, bottom + 1, col) {
        bottom += 1;
    }

    let column_available = |matrix: &CellMatrix<()>, x: u32| {
        (top..=bottom).all(|y| is_marked(matrix, sheet, y, x))
    };
    let claim_column = |matrix: &mut CellMatrix<()>, x: u32| {
        for y in top..=bottom {
            take_mark(matrix, sheet, y, x);
        }
    };

    while left > 1 && column_available(&*matrix, left - 1) {
        left -= 1;
        claim_column(&mut *matrix, left);
    }
    while column_available(&*matrix, right + 1) {
        right += 1;
        claim_column(&mut *matrix, right);
    }

    Range::new(CellRef::new(top, left), CellRef::new(bottom, right))
}

/// Validation errors for defined names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefinedNameValidationError {
    Empty,
    TooLong { len: usize, max: usize },
    InvalidStartCharacter(char),
    InvalidCharacter { ch: char, index: usize },
    LooksLikeCellReference,
}

impl fmt::Display for DefinedNameValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinedNameValidationError::Empty => f.write_str("defined name cannot be empty"),
            DefinedNameValidationError::TooLong { len, max } => {
                write!(f, "defined name is too long ({len} > {max})")
            }
            DefinedNameValidationError::InvalidStartCharacter(ch) => {
                write!(
                    f,
                    "invalid first character '{ch}' (must start with a letter, '_' or '\\\\')"
                )
            }
            DefinedNameValidationError::InvalidCharacter { ch, index } => {
                write!(f, "invalid character '{ch}' at index {index}")
            }
            DefinedNameValidationError::LooksLikeCellReference => {
                f.write_str("defined name cannot look like a cell reference (e.g. A1 or R1C1)")
            }
        }
    }
}

impl std::error::Error for DefinedNameValidationError {}

fn looks_like_a1_cell_reference(name: &str) -> bool {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    // Columns are 1-3 letters.
    if i == 0 || i > 3 {
        return false;
    }
    let digit_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    digit_start != i && i == bytes.len()
}

fn looks_like_r1c1_cell_reference(name: &str) -> bool {
    if name.eq_ignore_ascii_case("r") || name.eq_ignore_ascii_case("c") {
        return true;
    }
    let bytes = name.as_bytes();
    if bytes.first().map(|b| b.to_ascii_uppercase()) != Some(b'R') {
        return false;
    }
    let mut i = 1;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i >= bytes.len() || bytes[i].to_ascii_uppercase() != b'C' {
        return false;
    }
    i += 1;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    i == bytes.len()
}

/// Validate a defined name.
///
/// - must not be empty or longer than [`DEFINED_NAME_MAX_LEN`]
/// - must start with a letter, `_`, or `\`
/// - remaining characters may be letters, digits, `_`, or `.`
/// - must not look like an A1 or R1C1 cell reference
pub fn validate_defined_name(name: &str) -> Result<(), DefinedNameValidationError> {
    let name = name.trim();
    let Some(first) = name.chars().next() else {
        return Err(DefinedNameValidationError::Empty);
    };

    let len = name.chars().count();
    if len > DEFINED_NAME_MAX_LEN {
        return Err(DefinedNameValidationError::TooLong {
            len,
            max: DEFINED_NAME_MAX_LEN,
        });
    }
    if looks_like_a1_cell_reference(name) || looks_like_r1c1_cell_reference(name) {
        return Err(DefinedNameValidationError::LooksLikeCellReference);
    }
    if !(first.is_alphabetic() || first == '_' || first == '\\') {
        return Err(DefinedNameValidationError::InvalidStartCharacter(first));
    }
    for (index, ch) in name.chars().enumerate().skip(1) {
        if !(ch.is_alphabetic() || ch.is_ascii_digit() || ch == '_' || ch == '.') {
            return Err(DefinedNameValidationError::InvalidCharacter { ch, index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn removing_a_sheet_drops_and_shifts_scoped_names() {
        let scoped = |name: &str, text: &str, id: u32| DefinedNameModel {
            local_sheet_id: Some(id),
            ..DefinedNameModel::from_definition(name, text)
        };
        let mut names = DefinedNames::new();
        names.set_model(vec![
            scoped("OnFirst", "A!$A$1", 0),
            scoped("OnSecond", "42", 1),
            scoped("OnThird", "C!$B$2", 2),
            DefinedNameModel::from_definition("Global", "B!$A$1,C!$A$1"),
        ]);

        names.remove_sheet("B", 1);

        let model = names.model();
        let summary: Vec<(&str, Option<u32>, Vec<String>)> = model
            .iter()
            .map(|d| (d.name.as_str(), d.local_sheet_id, d.ranges.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Global", None, vec!["C!$A$1".to_string()]),
                ("OnFirst", Some(0), vec!["A!$A$1".to_string()]),
                ("OnThird", Some(1), vec!["C!$B$2".to_string()]),
            ]
        );
    }

    #[test]
    fn single_rectangle_is_rebuilt() {
        let mut names = DefinedNames::new();
        names.add("Sheet1!$B$2:$D$4", "Block").unwrap();
        assert_eq!(names.ranges("Block"), vec!["Sheet1!$B$2:$D$4"]);
    }

    #[test]
    fn vertical_growth_wins_over_horizontal() {
        // An L shape: A1:A3 plus B1. Seed A1 grows down first.
        let mut names = DefinedNames::new();
        names.add("S!$A$1:$A$3", "L").unwrap();
        names.add("S!$B$1", "L").unwrap();
        assert_eq!(names.ranges("L"), vec!["S!$A$1:$A$3", "S!$B$1"]);
    }

    #[test]
    fn horizontal_growth_is_all_or_nothing() {
        let mut names = DefinedNames::new();
        names.add("S!$A$1:$B$2", "N").unwrap();
        names.add("S!$C$1", "N").unwrap();
        assert_eq!(names.ranges("N"), vec!["S!$A$1:$B$2", "S!$C$1"]);
    }

    #[test]
    fn names_at_lists_overlapping_names() {
        let mut names = DefinedNames::new();
        names.add("'My Sheet'!A1:B2", "Alpha").unwrap();
        names.add("'My Sheet'!B2", "Beta").unwrap();
        assert_eq!(
            names.names_at("'My Sheet'!B2").unwrap(),
            vec!["Alpha".to_string(), "Beta".to_string()]
        );
        assert!(names.names_at("'My Sheet'!C3").unwrap().is_empty());
    }

    #[test]
    fn splice_moves_and_clips_names() {
        let mut names = DefinedNames::new();
        names.add("S!$A$2:$A$5", "Col").unwrap();
        names.splice_rows("S", 1, 0, 2);
        assert_eq!(names.ranges("Col"), vec!["S!$A$4:$A$7"]);
        names.splice_rows("S", 5, 2, 0);
        assert_eq!(names.ranges("Col"), vec!["S!$A$4:$A$5"]);
        names.splice_columns("S", 1, 1, 0);
        assert!(!names.contains("Col"));
    }

    #[test]
    fn splice_on_other_sheet_is_ignored() {
        let mut names = DefinedNames::new();
        names.add("S!$A$2", "X").unwrap();
        names.splice_rows("T", 1, 0, 5);
        assert_eq!(names.ranges("X"), vec!["S!$A$2"]);
    }

    #[test]
    fn non_range_definitions_are_preserved() {
        let model = DefinedNameModel::from_definition("Rate", "0.05");
        assert_eq!(model.formula.as_deref(), Some("0.05"));
        let cols = DefinedNameModel::from_definition("Cols", "Sheet1!$A:$A");
        assert_eq!(cols.formula.as_deref(), Some("Sheet1!$A:$A"));
        let multi = DefinedNameModel::from_definition("Two", "'B c'!$B$2:$C$3,Sheet1!$A$1");
        assert_eq!(multi.ranges, vec!["'B c'!$B$2:$C$3", "Sheet1!$A$1"]);

        let mut names = DefinedNames::new();
        names.set_model(vec![model.clone(), multi.clone()]);
        let snapshot = names.model();
        assert_eq!(snapshot, vec![model, multi]);
    }

    #[test]
    fn rejects_invalid_names() {
        let mut names = DefinedNames::new();
        assert!(matches!(
            names.add("S!A1", "A1"),
            Err(DefinedNameError::InvalidName(
                DefinedNameValidationError::LooksLikeCellReference
            ))
        ));
        assert!(matches!(
            names.add("A1", "Unqualified"),
            Err(DefinedNameError::MissingSheet(_))
        ));
    }
}
