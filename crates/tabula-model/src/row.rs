use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{Cell, MAX_COLS};

/// A sparse worksheet row. `cells[i]` is column `i + 1`.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub cells: Vec<Option<Cell>>,
    /// Custom height in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<OrderedFloat<f64>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub outline_level: u8,
    /// Row-level style applied to cells without their own style.
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub style_id: u32,
}

impl Row {
    pub fn cell(&self, col: u32) -> Option<&Cell> {
        let idx = (col as usize).checked_sub(1)?;
        self.cells.get(idx).and_then(Option::as_ref)
    }

    pub fn cell_mut(&mut self, col: u32) -> Option<&mut Cell> {
        let idx = (col as usize).checked_sub(1)?;
        self.cells.get_mut(idx).and_then(Option::as_mut)
    }

    /// Get the cell at `col`, creating an empty one if needed. `col` is
    /// clamped to `1..=MAX_COLS`.
    pub fn get_or_create(&mut self, col: u32) -> &mut Cell {
        let idx = (col.clamp(1, MAX_COLS) - 1) as usize;
        if self.cells.len() <= idx {
            self.cells.resize(idx + 1, None);
        }
        self.cells[idx].get_or_insert_with(Cell::default)
    }

    /// Iterate `(column, cell)` for stored cells.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i as u32 + 1, c)))
    }

    /// True when at least one cell holds a non-empty value.
    pub fn has_values(&self) -> bool {
        self.iter().any(|(_, c)| !c.value.is_empty())
    }

    /// True when the row carries any properties of its own.
    pub fn has_properties(&self) -> bool {
        self.height.is_some() || self.hidden || self.outline_level != 0 || self.style_id != 0
    }

    /// Lowest and highest stored column.
    pub fn span(&self) -> Option<(u32, u32)> {
        let mut cols = self.iter().filter(|(_, c)| !c.is_blank()).map(|(c, _)| c);
        let first = cols.next()?;
        let last = cols.last().unwrap_or(first);
        Some((first, last))
    }

    pub(crate) fn trim(&mut self) {
        while matches!(self.cells.last(), Some(None)) {
            self.cells.pop();
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero_u8(v: &u8) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
