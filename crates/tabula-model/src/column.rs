use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Properties shared by a run of columns `min..=max` (1-based).
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnDef {
    pub min: u32,
    pub max: u32,
    /// Width in character units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<OrderedFloat<f64>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub best_fit: bool,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub outline_level: u8,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub style_id: u32,
}

impl ColumnDef {
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(OrderedFloat(width));
        self
    }

    pub fn contains(&self, col: u32) -> bool {
        col >= self.min && col <= self.max
    }

    fn same_props(&self, other: &ColumnDef) -> bool {
        self.width == other.width
            && self.hidden == other.hidden
            && self.best_fit == other.best_fit
            && self.outline_level == other.outline_level
            && self.style_id == other.style_id
    }
}

/// Sort definitions and merge adjacent runs with identical properties.
pub fn normalize_column_defs(defs: &mut Vec<ColumnDef>) {
    defs.retain(|d| d.min >= 1 && d.min <= d.max);
    defs.sort_by_key(|d| d.min);
    let mut out: Vec<ColumnDef> = Vec::with_capacity(defs.len());
    for def in defs.drain(..) {
        match out.last_mut() {
            Some(prev) if prev.max + 1 == def.min && prev.same_props(&def) => prev.max = def.max,
            _ => out.push(def),
        }
    }
    *defs = out;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_identical_runs_merge() {
        let mut defs = vec![
            ColumnDef::new(3, 4).with_width(12.0),
            ColumnDef::new(1, 2).with_width(12.0),
            ColumnDef::new(6, 6).with_width(12.0),
        ];
        normalize_column_defs(&mut defs);
        assert_eq!(
            defs,
            vec![
                ColumnDef::new(1, 4).with_width(12.0),
                ColumnDef::new(6, 6).with_width(12.0)
            ]
        );
    }
}
