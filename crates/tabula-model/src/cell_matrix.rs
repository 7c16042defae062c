//! Sparse per-sheet 2-D store of marked cells.
//!
//! Used to track which cells carry a given defined name so ranges can be
//! rebuilt after rows or columns are spliced.

use std::collections::BTreeMap;

use crate::splice::Splice;
use crate::{CellRef, Range};

/// One entry of a [`CellMatrix`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatrixCell<T> {
    pub sheet: String,
    pub row: u32,
    pub col: u32,
    /// Scratch flag used by range reconstruction.
    pub mark: bool,
    pub data: T,
}

impl<T> MatrixCell<T> {
    pub fn address(&self) -> CellRef {
        CellRef::new(self.row, self.col)
    }
}

type Grid<T> = Vec<Option<Vec<Option<MatrixCell<T>>>>>;

/// Cells grouped by sheet name, then row, then column (all 1-based).
///
/// At most one entry exists per `(sheet, row, col)`. Iteration is sheets in
/// ascending name order, rows ascending, columns ascending.
#[derive(Clone, Debug)]
pub struct CellMatrix<T> {
    sheets: BTreeMap<String, Grid<T>>,
}

impl<T> Default for CellMatrix<T> {
    fn default() -> Self {
        Self {
            sheets: BTreeMap::new(),
        }
    }
}

impl<T: Default> CellMatrix<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cell at `(sheet, row, col)`, creating it if needed.
    pub fn get_cell_at(&mut self, sheet: &str, row: u32, col: u32) -> &mut MatrixCell<T> {
        let grid = self.sheets.entry(sheet.to_string()).or_default();
        let r = (row.max(1) - 1) as usize;
        if grid.len() <= r {
            grid.resize_with(r + 1, || None);
        }
        let cols = grid[r].get_or_insert_with(Vec::new);
        let c = (col.max(1) - 1) as usize;
        if cols.len() <= c {
            cols.resize_with(c + 1, || None);
        }
        cols[c].get_or_insert_with(|| MatrixCell {
            sheet: sheet.to_string(),
            row: row.max(1),
            col: col.max(1),
            mark: false,
            data: T::default(),
        })
    }

    /// Ensure a single cell exists.
    pub fn add_cell_at(&mut self, sheet: &str, row: u32, col: u32) {
        self.get_cell_at(sheet, row, col);
    }

    /// Ensure every cell of `range` exists.
    pub fn add_cell_ex(&mut self, sheet: &str, range: Range) {
        for addr in range.iter() {
            self.get_cell_at(sheet, addr.row, addr.col);
        }
    }
}

impl<T> CellMatrix<T> {
    pub fn find_cell_at(&self, sheet: &str, row: u32, col: u32) -> Option<&MatrixCell<T>> {
        let r = (row as usize).checked_sub(1)?;
        let c = (col as usize).checked_sub(1)?;
        self.sheets
            .get(sheet)?
            .get(r)?
            .as_ref()?
            .get(c)?
            .as_ref()
    }

    pub fn find_cell_at_mut(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
    ) -> Option<&mut MatrixCell<T>> {
        let r = (row as usize).checked_sub(1)?;
        let c = (col as usize).checked_sub(1)?;
        self.sheets
            .get_mut(sheet)?
            .get_mut(r)?
            .as_mut()?
            .get_mut(c)?
            .as_mut()
    }

    pub fn find_cell(&self, sheet: &str, addr: CellRef) -> Option<&MatrixCell<T>> {
        self.find_cell_at(sheet, addr.row, addr.col)
    }

    /// Remove every cell of `range`; returns how many existed.
    pub fn remove_cell_ex(&mut self, sheet: &str, range: Range) -> usize {
        let Some(grid) = self.sheets.get_mut(sheet) else {
            return 0;
        };
        let mut removed = 0;
        for addr in range.iter() {
            let slot = grid
                .get_mut((addr.row as usize).wrapping_sub(1))
                .and_then(Option::as_mut)
                .and_then(|cols| cols.get_mut((addr.col as usize).wrapping_sub(1)));
            if let Some(slot) = slot {
                if slot.take().is_some() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            compact(grid);
            if grid.is_empty() {
                self.sheets.remove(sheet);
            }
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    /// Cells of one sheet in row-major order.
    pub fn cells_in_sheet<'a>(&'a self, sheet: &str) -> impl Iterator<Item = &'a MatrixCell<T>> {
        self.sheets
            .get(sheet)
            .into_iter()
            .flat_map(|grid| grid_cells(grid))
    }

    /// All cells in matrix order.
    pub fn cells(&self) -> impl Iterator<Item = &MatrixCell<T>> {
        self.sheets.values().flat_map(|grid| grid_cells(grid))
    }

    pub fn for_each_in_sheet(&mut self, sheet: &str, mut f: impl FnMut(&mut MatrixCell<T>)) {
        if let Some(grid) = self.sheets.get_mut(sheet) {
            for cell in grid.iter_mut().flatten().flatten().flatten() {
                f(cell);
            }
        }
    }

    pub fn for_each(&mut self, mut f: impl FnMut(&mut MatrixCell<T>)) {
        for grid in self.sheets.values_mut() {
            for cell in grid.iter_mut().flatten().flatten().flatten() {
                f(cell);
            }
        }
    }

    /// Structurally remove `delete` rows at `start` and open `insert` empty
    /// rows. Entries keep their stored coordinates until [`Self::normalise`].
    pub fn splice_rows(&mut self, sheet: &str, start: u32, delete: u32, insert: u32) {
        let splice = Splice::new(start, delete, insert);
        let Some(grid) = self.sheets.get_mut(sheet) else {
            return;
        };
        let at = (splice.start - 1) as usize;
        if grid.len() <= at {
            return;
        }
        let end = (at + delete as usize).min(grid.len());
        grid.splice(at..end, std::iter::repeat_with(|| None).take(insert as usize));
        compact(grid);
        if grid.is_empty() {
            self.sheets.remove(sheet);
        }
    }

    /// Column counterpart of [`Self::splice_rows`].
    pub fn splice_columns(&mut self, sheet: &str, start: u32, delete: u32, insert: u32) {
        let splice = Splice::new(start, delete, insert);
        let Some(grid) = self.sheets.get_mut(sheet) else {
            return;
        };
        let at = (splice.start - 1) as usize;
        for cols in grid.iter_mut().flatten() {
            if cols.len() <= at {
                continue;
            }
            let end = (at + delete as usize).min(cols.len());
            cols.splice(at..end, std::iter::repeat_with(|| None).take(insert as usize));
        }
        compact(grid);
        if grid.is_empty() {
            self.sheets.remove(sheet);
        }
    }

    /// Drop every entry of `sheet`. Returns whether there were any.
    pub fn remove_sheet(&mut self, sheet: &str) -> bool {
        self.sheets.remove(sheet).is_some()
    }

    /// Move all entries of sheet `from` to sheet `to`.
    pub fn rename_sheet(&mut self, from: &str, to: &str) {
        let Some(mut grid) = self.sheets.remove(from) else {
            return;
        };
        for cell in grid.iter_mut().flatten().flatten().flatten() {
            cell.sheet = to.to_string();
        }
        self.sheets.insert(to.to_string(), grid);
    }

    /// Rewrite every entry's `row`/`col` to match its slot.
    pub fn normalise(&mut self) {
        for grid in self.sheets.values_mut() {
            for (r, cols) in grid.iter_mut().enumerate() {
                let Some(cols) = cols else {
                    continue;
                };
                for (c, cell) in cols.iter_mut().enumerate() {
                    if let Some(cell) = cell {
                        cell.row = r as u32 + 1;
                        cell.col = c as u32 + 1;
                    }
                }
            }
        }
    }
}

fn grid_cells<T>(grid: &Grid<T>) -> impl Iterator<Item = &MatrixCell<T>> {
    grid.iter().flatten().flatten().flatten()
}

fn compact<T>(grid: &mut Grid<T>) {
    for row in grid.iter_mut() {
        if let Some(cols) = row {
            while matches!(cols.last(), Some(None)) {
                cols.pop();
            }
            if cols.is_empty() {
                *row = None;
            }
        }
    }
    while matches!(grid.last(), Some(None)) {
        grid.pop();
    }
}
