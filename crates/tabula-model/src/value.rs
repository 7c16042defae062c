use core::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{CellRef, Range, RichText};

/// Spreadsheet error literals.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorValue {
    #[serde(rename = "#NULL!")]
    Null,
    #[serde(rename = "#DIV/0!")]
    Div0,
    #[serde(rename = "#VALUE!")]
    Value,
    #[serde(rename = "#REF!")]
    Ref,
    #[serde(rename = "#NAME?")]
    Name,
    #[serde(rename = "#NUM!")]
    Num,
    #[serde(rename = "#N/A")]
    NA,
}

impl ErrorValue {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorValue::Null => "#NULL!",
            ErrorValue::Div0 => "#DIV/0!",
            ErrorValue::Value => "#VALUE!",
            ErrorValue::Ref => "#REF!",
            ErrorValue::Name => "#NAME?",
            ErrorValue::Num => "#NUM!",
            ErrorValue::NA => "#N/A",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "#NULL!" => ErrorValue::Null,
            "#DIV/0!" => ErrorValue::Div0,
            "#VALUE!" => ErrorValue::Value,
            "#REF!" => ErrorValue::Ref,
            "#NAME?" => ErrorValue::Name,
            "#NUM!" => ErrorValue::Num,
            "#N/A" => ErrorValue::NA,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hyperlink cell: display text plus an external target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperlink {
    pub text: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

/// Cached result of a formula.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FormulaResult {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(ErrorValue),
    Date(NaiveDateTime),
}

/// A formula cell. When `shared_range` is set this cell is the master of a
/// shared formula covering that range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    /// Formula text without a leading `=`.
    pub formula: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FormulaResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_range: Option<Range>,
}

impl Formula {
    pub fn new(formula: impl Into<String>) -> Self {
        let formula = formula.into();
        let formula = match formula.strip_prefix('=') {
            Some(rest) => rest.to_string(),
            None => formula,
        };
        Self {
            formula,
            result: None,
            shared_range: None,
        }
    }

    pub fn with_result(mut self, result: FormulaResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// Value stored in a cell.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    String(String),
    RichText(RichText),
    Date(NaiveDateTime),
    Boolean(bool),
    Error(ErrorValue),
    Hyperlink(Hyperlink),
    Formula(Formula),
    /// A cell that reuses the formula of `master`, translated to its position.
    SharedFormula {
        master: CellRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<FormulaResult>,
    },
    /// Dependent cell of a merged range; `master` holds the content.
    Merge(CellRef),
}

/// Coarse classification of a value, used to pick default number formats.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Empty,
    Number,
    String,
    Date,
    Boolean,
    Error,
    Formula,
    Merge,
}

impl CellValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            CellValue::Empty => ValueKind::Empty,
            CellValue::Number(_) => ValueKind::Number,
            CellValue::String(_) | CellValue::RichText(_) | CellValue::Hyperlink(_) => {
                ValueKind::String
            }
            CellValue::Date(_) => ValueKind::Date,
            CellValue::Boolean(_) => ValueKind::Boolean,
            CellValue::Error(_) => ValueKind::Error,
            CellValue::Formula(Formula {
                result: Some(FormulaResult::Date(_)),
                ..
            })
            | CellValue::SharedFormula {
                result: Some(FormulaResult::Date(_)),
                ..
            } => ValueKind::Date,
            CellValue::Formula(_) | CellValue::SharedFormula { .. } => ValueKind::Formula,
            CellValue::Merge(_) => ValueKind::Merge,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// True for values that carry content of their own (not empty, not a merge dependent).
    pub fn has_content(&self) -> bool {
        !matches!(self, CellValue::Empty | CellValue::Merge(_))
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::Date(value)
    }
}

impl From<RichText> for CellValue {
    fn from(value: RichText) -> Self {
        CellValue::RichText(value)
    }
}

impl From<Formula> for CellValue {
    fn from(value: Formula) -> Self {
        CellValue::Formula(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_literals_roundtrip() {
        for e in [
            ErrorValue::Null,
            ErrorValue::Div0,
            ErrorValue::Value,
            ErrorValue::Ref,
            ErrorValue::Name,
            ErrorValue::Num,
            ErrorValue::NA,
        ] {
            assert_eq!(ErrorValue::parse(e.as_str()), Some(e));
        }
    }

    #[test]
    fn formula_strips_leading_equals() {
        assert_eq!(Formula::new("=A1+1").formula, "A1+1");
        assert_eq!(Formula::new("SUM(A:A)").formula, "SUM(A:A)");
    }

    #[test]
    fn value_kinds() {
        assert_eq!(CellValue::from("x").kind(), ValueKind::String);
        assert_eq!(CellValue::from(1.5).kind(), ValueKind::Number);
        assert!(!CellValue::Merge(CellRef::new(1, 1)).has_content());
    }
}
