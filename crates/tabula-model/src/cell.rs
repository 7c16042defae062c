use serde::{Deserialize, Serialize};

use crate::{CellValue, RichText};

/// A single stored cell.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub value: CellValue,
    /// Index into the workbook [`crate::StyleTable`]; `0` is the default style.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub style_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<Comment>,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            style_id: 0,
            comment: None,
        }
    }

    pub fn with_style(mut self, style_id: u32) -> Self {
        self.style_id = style_id;
        self
    }

    /// True when the cell stores nothing worth serializing.
    pub fn is_blank(&self) -> bool {
        self.value.is_empty() && self.style_id == 0 && self.comment.is_none()
    }
}

/// A legacy cell note.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub text: RichText,
}

impl Comment {
    pub fn new(author: Option<String>, text: impl Into<RichText>) -> Self {
        Self {
            author,
            text: text.into(),
        }
    }
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}
