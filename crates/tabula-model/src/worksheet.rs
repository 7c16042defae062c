use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::column::normalize_column_defs;
use crate::splice::Splice;
use crate::{
    Cell, CellRef, CellValue, ColumnDef, Comment, FormulaResult, Range, Row, MAX_ROWS,
};

/// Errors raised by merge operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("cannot merge {requested}: overlaps existing merge {existing}")]
    Overlap { requested: Range, existing: Range },
}

/// Sheet visibility.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetState {
    pub fn as_str(self) -> &'static str {
        match self {
            SheetState::Visible => "visible",
            SheetState::Hidden => "hidden",
            SheetState::VeryHidden => "veryHidden",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "hidden" => SheetState::Hidden,
            "veryHidden" => SheetState::VeryHidden,
            _ => SheetState::Visible,
        }
    }
}

/// Page margins in inches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMargins {
    pub left: OrderedFloat<f64>,
    pub right: OrderedFloat<f64>,
    pub top: OrderedFloat<f64>,
    pub bottom: OrderedFloat<f64>,
    pub header: OrderedFloat<f64>,
    pub footer: OrderedFloat<f64>,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            left: OrderedFloat(0.7),
            right: OrderedFloat(0.7),
            top: OrderedFloat(0.75),
            bottom: OrderedFloat(0.75),
            header: OrderedFloat(0.3),
            footer: OrderedFloat(0.3),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetView {
    #[serde(default)]
    pub tab_selected: bool,
    #[serde(default = "default_true")]
    pub show_grid_lines: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_scale: Option<u32>,
    #[serde(default)]
    pub right_to_left: bool,
}

impl Default for SheetView {
    fn default() -> Self {
        Self {
            tab_selected: false,
            show_grid_lines: true,
            zoom_scale: None,
            right_to_left: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Axis {
    Row,
    Col,
}

fn map_range(range: Range, axis: Axis, splice: &Splice) -> Option<Range> {
    match axis {
        Axis::Row => {
            let (lo, hi) = splice.map_span(range.start.row, range.end.row)?;
            Some(Range::new(
                CellRef::new(lo, range.start.col),
                CellRef::new(hi, range.end.col),
            ))
        }
        Axis::Col => {
            let (lo, hi) = splice.map_span(range.start.col, range.end.col)?;
            Some(Range::new(
                CellRef::new(range.start.row, lo),
                CellRef::new(range.end.row, hi),
            ))
        }
    }
}

fn map_cell(cell: CellRef, axis: Axis, splice: &Splice) -> Option<CellRef> {
    match axis {
        Axis::Row => splice.map(cell.row).map(|row| CellRef::new(row, cell.col)),
        Axis::Col => splice.map(cell.col).map(|col| CellRef::new(cell.row, col)),
    }
}

fn formula_result_value(result: Option<FormulaResult>) -> CellValue {
    match result {
        Some(FormulaResult::Number(n)) => CellValue::Number(n),
        Some(FormulaResult::String(s)) => CellValue::String(s),
        Some(FormulaResult::Boolean(b)) => CellValue::Boolean(b),
        Some(FormulaResult::Error(e)) => CellValue::Error(e),
        Some(FormulaResult::Date(d)) => CellValue::Date(d),
        None => CellValue::Empty,
    }
}

static EMPTY: CellValue = CellValue::Empty;

/// A worksheet: a sparse grid of rows plus merges, column definitions and
/// sheet-level settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub name: String,
    #[serde(default)]
    pub state: SheetState,
    /// `rows[i]` is row `i + 1`.
    #[serde(default)]
    rows: Vec<Option<Row>>,
    #[serde(default)]
    columns: Vec<ColumnDef>,
    /// Non-overlapping merged ranges, sorted by master.
    #[serde(default)]
    merges: Vec<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_row_height: Option<OrderedFloat<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_margins: Option<PageMargins>,
    #[serde(default)]
    pub view: SheetView,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: SheetState::Visible,
            rows: Vec::new(),
            columns: Vec::new(),
            merges: Vec::new(),
            default_row_height: None,
            page_margins: None,
            view: SheetView::default(),
        }
    }

    pub fn row(&self, row: u32) -> Option<&Row> {
        let idx = (row as usize).checked_sub(1)?;
        self.rows.get(idx).and_then(Option::as_ref)
    }

    /// Get row `row`, creating it if needed. `row` is clamped to
    /// `1..=MAX_ROWS`.
    pub fn row_mut(&mut self, row: u32) -> &mut Row {
        let idx = (row.clamp(1, MAX_ROWS) - 1) as usize;
        if self.rows.len() <= idx {
            self.rows.resize(idx + 1, None);
        }
        self.rows[idx].get_or_insert_with(Row::default)
    }

    /// Iterate `(row number, row)` in ascending order.
    pub fn rows(&self) -> impl Iterator<Item = (u32, &Row)> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (i as u32 + 1, r)))
    }

    /// Iterate `(address, cell)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.rows().flat_map(|(r, row)| {
            row.iter()
                .map(move |(c, cell)| (CellRef::new(r, c), cell))
        })
    }

    pub fn cell(&self, addr: CellRef) -> Option<&Cell> {
        self.row(addr.row)?.cell(addr.col)
    }

    /// Get the cell at `addr`, creating an empty one if needed.
    pub fn cell_mut(&mut self, addr: CellRef) -> &mut Cell {
        self.row_mut(addr.row).get_or_create(addr.col)
    }

    pub fn value(&self, addr: CellRef) -> &CellValue {
        self.cell(addr).map(|c| &c.value).unwrap_or(&EMPTY)
    }

    /// Set a cell value. Writing to a merge dependent writes to its master.
    pub fn set_value(&mut self, addr: CellRef, value: impl Into<CellValue>) {
        let value = value.into();
        let target = match self.value(addr) {
            CellValue::Merge(master) if !matches!(value, CellValue::Merge(_)) => *master,
            _ => addr,
        };
        self.cell_mut(target).value = value;
    }

    pub fn set_style(&mut self, addr: CellRef, style_id: u32) {
        self.cell_mut(addr).style_id = style_id;
    }

    pub fn set_comment(&mut self, addr: CellRef, comment: Option<Comment>) {
        self.cell_mut(addr).comment = comment;
    }

    /// Highest row number holding a row record.
    pub fn last_row(&self) -> u32 {
        self.rows
            .iter()
            .rposition(Option::is_some)
            .map(|i| i as u32 + 1)
            .unwrap_or(0)
    }

    /// Bounding range of all non-blank cells.
    pub fn dimensions(&self) -> Option<Range> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (r, row) in self.rows() {
            let Some((lo, hi)) = row.span() else {
                continue;
            };
            bounds = Some(match bounds {
                None => (r, lo, r, hi),
                Some((r0, c0, r1, c1)) => (r0.min(r), c0.min(lo), r1.max(r), c1.max(hi)),
            });
        }
        bounds.map(|(r0, c0, r1, c1)| Range::new(CellRef::new(r0, c0), CellRef::new(r1, c1)))
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, col: u32) -> Option<&ColumnDef> {
        self.columns.iter().find(|d| d.contains(col))
    }

    /// Define properties for `def.min..=def.max`, replacing any previous
    /// definition of those columns.
    pub fn set_column(&mut self, def: ColumnDef) {
        let mut out = Vec::with_capacity(self.columns.len() + 2);
        for existing in self.columns.drain(..) {
            if existing.max < def.min || existing.min > def.max {
                out.push(existing);
                continue;
            }
            if existing.min < def.min {
                out.push(ColumnDef {
                    max: def.min - 1,
                    ..existing.clone()
                });
            }
            if existing.max > def.max {
                out.push(ColumnDef {
                    min: def.max + 1,
                    ..existing
                });
            }
        }
        out.push(def);
        normalize_column_defs(&mut out);
        self.columns = out;
    }

    pub fn merges(&self) -> &[Range] {
        &self.merges
    }

    /// The merged range containing `addr`, if any.
    pub fn find_merge(&self, addr: CellRef) -> Option<Range> {
        self.merges.iter().copied().find(|m| m.contains(addr))
    }

    /// Merge `range`: every cell but the top-left master becomes a
    /// [`CellValue::Merge`] dependent carrying the master's style.
    pub fn merge_cells(&mut self, range: Range) -> Result<(), MergeError> {
        self.merge_cells_inner(range, true)
    }

    /// Merge `range` leaving dependent styles untouched (used by loaders).
    pub fn merge_cells_without_style(&mut self, range: Range) -> Result<(), MergeError> {
        self.merge_cells_inner(range, false)
    }

    fn merge_cells_inner(&mut self, range: Range, copy_style: bool) -> Result<(), MergeError> {
        if let Some(existing) = self.merges.iter().find(|m| m.intersects(&range)) {
            return Err(MergeError::Overlap {
                requested: range,
                existing: *existing,
            });
        }
        if range.is_single_cell() {
            return Ok(());
        }

        self.stamp_merge(range, copy_style);
        let pos = self.merges.partition_point(|m| *m < range);
        self.merges.insert(pos, range);
        Ok(())
    }

    fn stamp_merge(&mut self, range: Range, copy_style: bool) {
        let master = range.start;
        let master_style = self.cell(master).map(|c| c.style_id).unwrap_or(0);
        if matches!(self.value(master), CellValue::Merge(_)) {
            self.cell_mut(master).value = CellValue::Empty;
        }
        for addr in range.iter().skip(1) {
            let cell = self.cell_mut(addr);
            cell.value = CellValue::Merge(master);
            if copy_style {
                cell.style_id = master_style;
            }
        }
    }

    /// Remove the merge containing `addr`. Dependents become empty; the
    /// master keeps its content. Returns false when `addr` is not merged.
    pub fn unmerge_cells(&mut self, addr: CellRef) -> bool {
        let Some(pos) = self.merges.iter().position(|m| m.contains(addr)) else {
            return false;
        };
        let range = self.merges.remove(pos);
        for dep in range.iter().skip(1) {
            self.cell_mut(dep).value = CellValue::Empty;
        }
        true
    }

    /// Remove `delete` rows at `start` and insert one row per entry of
    /// `inserts` (values by column, starting at column A).
    ///
    /// Rows below shift with their cells, styles, comments and row
    /// properties; merges and shared-formula references follow.
    pub fn splice_rows(&mut self, start: u32, delete: u32, inserts: Vec<Vec<CellValue>>) {
        let splice = Splice::new(start, delete, inserts.len() as u32);
        if splice.is_noop() {
            return;
        }

        let at = (splice.start - 1) as usize;
        if self.rows.len() < at && !inserts.is_empty() {
            self.rows.resize(at, None);
        }
        if self.rows.len() >= at {
            let end = (at + delete as usize).min(self.rows.len());
            let new_rows = inserts.into_iter().map(|values| {
                let mut row = Row {
                    cells: values
                        .into_iter()
                        .map(|v| (!v.is_empty()).then(|| Cell::new(v)))
                        .collect(),
                    ..Row::default()
                };
                row.trim();
                Some(row)
            });
            self.rows.splice(at..end, new_rows);
        }

        self.remap_references(Axis::Row, &splice);
        self.trim_rows();
    }

    /// Remove `delete` columns at `start` and insert one column per entry of
    /// `inserts` (values by row, starting at row 1).
    pub fn splice_columns(&mut self, start: u32, delete: u32, inserts: Vec<Vec<CellValue>>) {
        let splice = Splice::new(start, delete, inserts.len() as u32);
        if splice.is_noop() {
            return;
        }

        let at = (splice.start - 1) as usize;
        let insert_height = inserts.iter().map(Vec::len).max().unwrap_or(0);
        let height = self.rows.len().max(insert_height);
        for r in 0..height {
            let new_cells: Vec<Option<Cell>> = inserts
                .iter()
                .map(|col| {
                    col.get(r)
                        .filter(|v| !v.is_empty())
                        .map(|v| Cell::new(v.clone()))
                })
                .collect();
            let has_new = new_cells.iter().any(Option::is_some);
            let existing_len = self
                .rows
                .get(r)
                .and_then(Option::as_ref)
                .map(|row| row.cells.len())
                .unwrap_or(0);
            if !has_new && existing_len <= at {
                continue;
            }

            let row = self.row_mut(r as u32 + 1);
            if row.cells.len() < at {
                row.cells.resize(at, None);
            }
            let end = (at + delete as usize).min(row.cells.len());
            row.cells.splice(at..end, new_cells);
            row.trim();
            if row.cells.is_empty() && !row.has_properties() {
                self.rows[r] = None;
            }
        }
        self.trim_rows();

        let mut defs = Vec::with_capacity(self.columns.len());
        for def in self.columns.drain(..) {
            if def.min < splice.start {
                defs.push(ColumnDef {
                    max: def.max.min(splice.start - 1),
                    ..def.clone()
                });
            }
            let deleted_end = splice.start.saturating_add(splice.delete);
            if def.max >= deleted_end {
                let lo = def.min.max(deleted_end);
                if let (Some(min), Some(max)) = (splice.map(lo), splice.map(def.max)) {
                    defs.push(ColumnDef { min, max, ..def });
                }
            }
        }
        normalize_column_defs(&mut defs);
        self.columns = defs;

        self.remap_references(Axis::Col, &splice);
    }

    /// After cells moved structurally, translate merge records and every
    /// coordinate stored inside cell values.
    fn remap_references(&mut self, axis: Axis, splice: &Splice) {
        let merges: Vec<Range> = self
            .merges
            .drain(..)
            .filter_map(|m| map_range(m, axis, splice))
            .filter(|m| !m.is_single_cell())
            .collect();

        for row in self.rows.iter_mut().flatten() {
            for cell in row.cells.iter_mut().flatten() {
                let replacement = match &mut cell.value {
                    CellValue::Merge(_) => Some(CellValue::Empty),
                    CellValue::SharedFormula { master, result } => {
                        match map_cell(*master, axis, splice) {
                            Some(moved) => {
                                *master = moved;
                                None
                            }
                            None => Some(formula_result_value(result.take())),
                        }
                    }
                    CellValue::Formula(formula) => {
                        if let Some(range) = formula.shared_range {
                            formula.shared_range = map_range(range, axis, splice);
                        }
                        None
                    }
                    _ => None,
                };
                if let Some(value) = replacement {
                    cell.value = value;
                }
            }
        }

        for range in &merges {
            self.stamp_merge(*range, false);
        }
        let mut merges = merges;
        merges.sort();
        self.merges = merges;
    }

    fn trim_rows(&mut self) {
        while matches!(self.rows.last(), Some(None)) {
            self.rows.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn a1(s: &str) -> CellRef {
        CellRef::from_a1(s).unwrap()
    }

    fn r(s: &str) -> Range {
        Range::from_a1(s).unwrap()
    }

    #[test]
    fn merge_marks_dependents_and_copies_style() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value(a1("B1"), "title");
        ws.set_style(a1("B1"), 3);
        ws.merge_cells(r("B1:C2")).unwrap();

        assert_eq!(ws.value(a1("C2")), &CellValue::Merge(a1("B1")));
        assert_eq!(ws.cell(a1("C1")).unwrap().style_id, 3);
        assert_eq!(ws.merges(), &[r("B1:C2")]);
    }

    #[test]
    fn overlapping_merge_is_rejected_without_changes() {
        let mut ws = Worksheet::new("Sheet1");
        ws.merge_cells(r("A1:B2")).unwrap();
        let before = ws.clone();
        let err = ws.merge_cells(r("B2:C3")).unwrap_err();
        assert_eq!(
            err,
            MergeError::Overlap {
                requested: r("B2:C3"),
                existing: r("A1:B2")
            }
        );
        assert_eq!(ws, before);
    }

    #[test]
    fn unmerge_clears_dependents() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value(a1("A1"), 5);
        ws.merge_cells(r("A1:B1")).unwrap();
        assert!(ws.unmerge_cells(a1("B1")));
        assert_eq!(ws.value(a1("A1")), &CellValue::Number(5.0));
        assert_eq!(ws.value(a1("B1")), &CellValue::Empty);
        assert!(ws.merges().is_empty());
        assert!(!ws.unmerge_cells(a1("B1")));
    }

    #[test]
    fn writing_to_dependent_writes_master() {
        let mut ws = Worksheet::new("Sheet1");
        ws.merge_cells(r("A1:A3")).unwrap();
        ws.set_value(a1("A2"), "x");
        assert_eq!(ws.value(a1("A1")), &CellValue::String("x".into()));
        assert_eq!(ws.value(a1("A2")), &CellValue::Merge(a1("A1")));
    }

    #[test]
    fn rows_past_the_grid_are_clamped() {
        let mut ws = Worksheet::new("Sheet1");
        ws.row_mut(u32::MAX).hidden = true;
        assert_eq!(ws.last_row(), crate::MAX_ROWS);
        assert!(ws.row(crate::MAX_ROWS).unwrap().hidden);
    }

    #[test]
    fn insert_rows_shifts_values_and_merges() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value(a1("A1"), 1);
        ws.set_value(a1("A2"), 2);
        ws.set_value(a1("B3"), "m");
        ws.merge_cells(r("B3:C4")).unwrap();
        ws.row_mut(2).hidden = true;

        ws.splice_rows(2, 0, vec![vec!["new".into()]]);

        assert_eq!(ws.value(a1("A1")), &CellValue::Number(1.0));
        assert_eq!(ws.value(a1("A2")), &CellValue::String("new".into()));
        assert_eq!(ws.value(a1("A3")), &CellValue::Number(2.0));
        assert!(ws.row(3).unwrap().hidden);
        assert_eq!(ws.merges(), &[r("B4:C5")]);
        assert_eq!(ws.value(a1("C5")), &CellValue::Merge(a1("B4")));
        assert_eq!(ws.value(a1("B4")), &CellValue::String("m".into()));
    }

    #[test]
    fn insert_inside_merge_grows_it() {
        let mut ws = Worksheet::new("Sheet1");
        ws.merge_cells(r("A1:A3")).unwrap();
        ws.splice_rows(2, 0, vec![vec![], vec![]]);
        assert_eq!(ws.merges(), &[r("A1:A5")]);
        assert_eq!(ws.value(a1("A3")), &CellValue::Merge(a1("A1")));
    }

    #[test]
    fn deleting_master_row_moves_master() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value(a1("A1"), "gone");
        ws.merge_cells(r("A1:B3")).unwrap();
        ws.splice_rows(1, 1, vec![]);
        assert_eq!(ws.merges(), &[r("A1:B2")]);
        assert_eq!(ws.value(a1("A1")), &CellValue::Empty);
        assert_eq!(ws.value(a1("B2")), &CellValue::Merge(a1("A1")));
    }

    #[test]
    fn merge_collapsing_to_one_cell_is_dropped() {
        let mut ws = Worksheet::new("Sheet1");
        ws.merge_cells(r("A1:A2")).unwrap();
        ws.splice_rows(2, 1, vec![]);
        assert!(ws.merges().is_empty());
        assert_eq!(ws.value(a1("A1")), &CellValue::Empty);
    }

    #[test]
    fn splice_rows_insert_then_delete_is_identity() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value(a1("A1"), 1);
        ws.set_value(a1("C5"), "z");
        ws.set_style(a1("C5"), 2);
        ws.merge_cells(r("D2:E6")).unwrap();
        ws.set_column(ColumnDef::new(2, 3).with_width(20.0));
        let before = ws.clone();

        ws.splice_rows(3, 0, vec![vec![1.into()], vec![], vec![]]);
        ws.splice_rows(3, 3, vec![]);
        assert_eq!(ws, before);

        ws.splice_columns(2, 0, vec![vec!["x".into()], vec![]]);
        ws.splice_columns(2, 2, vec![]);
        assert_eq!(ws, before);
    }

    #[test]
    fn splice_columns_moves_cells_defs_and_merges() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value(a1("A1"), "a");
        ws.set_value(a1("C1"), "c");
        ws.set_column(ColumnDef::new(3, 3).with_width(30.0));
        ws.merge_cells(r("C2:D2")).unwrap();

        ws.splice_columns(2, 1, vec![]);

        assert_eq!(ws.value(a1("B1")), &CellValue::String("c".into()));
        assert_eq!(ws.column(2), Some(&ColumnDef::new(2, 2).with_width(30.0)));
        assert_eq!(ws.merges(), &[r("B2:C2")]);
    }

    #[test]
    fn shared_formula_refs_follow_master() {
        let mut ws = Worksheet::new("Sheet1");
        let mut master = crate::Formula::new("A1*2");
        master.shared_range = Some(r("B1:B3"));
        ws.set_value(a1("B1"), master);
        ws.set_value(
            a1("B2"),
            CellValue::SharedFormula {
                master: a1("B1"),
                result: Some(FormulaResult::Number(4.0)),
            },
        );
        ws.splice_rows(1, 0, vec![vec![]]);
        assert_eq!(
            ws.value(a1("B3")),
            &CellValue::SharedFormula {
                master: a1("B2"),
                result: Some(FormulaResult::Number(4.0)),
            }
        );
        match ws.value(a1("B2")) {
            CellValue::Formula(f) => assert_eq!(f.shared_range, Some(r("B2:B4"))),
            other => panic!("unexpected {other:?}"),
        }

        ws.splice_rows(2, 1, vec![]);
        assert_eq!(ws.value(a1("B2")), &CellValue::Number(4.0));
    }

    #[test]
    fn set_column_splits_existing_runs() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_column(ColumnDef::new(1, 5).with_width(10.0));
        ws.set_column(ColumnDef::new(3, 3).with_width(20.0));
        assert_eq!(
            ws.columns(),
            &[
                ColumnDef::new(1, 2).with_width(10.0),
                ColumnDef::new(3, 3).with_width(20.0),
                ColumnDef::new(4, 5).with_width(10.0),
            ]
        );
    }

    #[test]
    fn dimensions_cover_non_blank_cells() {
        let mut ws = Worksheet::new("Sheet1");
        assert_eq!(ws.dimensions(), None);
        ws.set_value(a1("B2"), 1);
        ws.set_value(a1("D5"), 1);
        assert_eq!(ws.dimensions(), Some(r("B2:D5")));
    }
}
