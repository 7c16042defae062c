use serde::{Deserialize, Serialize};

use crate::Font;

/// Rich (multi-style) text: an ordered list of runs.
///
/// A run without a font inherits the cell style's font.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RichText {
    pub runs: Vec<RichTextRun>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RichTextRun {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<Font>,
}

impl RichTextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font: None,
        }
    }

    pub fn styled(text: impl Into<String>, font: Font) -> Self {
        Self {
            text: text.into(),
            font: Some(font),
        }
    }
}

impl RichText {
    pub fn new(runs: Vec<RichTextRun>) -> Self {
        Self { runs }
    }

    /// Concatenated visible text of all runs.
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// True when no run carries its own font.
    pub fn is_plain(&self) -> bool {
        self.runs.iter().all(|r| r.font.is_none())
    }

    pub fn push(&mut self, run: RichTextRun) {
        self.runs.push(run);
    }
}

impl From<&str> for RichText {
    fn from(value: &str) -> Self {
        RichText::new(vec![RichTextRun::plain(value)])
    }
}
