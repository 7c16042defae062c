use std::collections::HashMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize};

/// A color reference as stored in spreadsheet styles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Color {
    /// `AARRGGBB`.
    Argb { argb: u32 },
    /// Theme palette slot with an optional tint in `-1.0..=1.0`.
    Theme {
        theme: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tint: Option<OrderedFloat<f64>>,
    },
    /// Legacy indexed palette entry.
    Indexed { indexed: u32 },
    /// System automatic color.
    Auto,
}

impl Color {
    pub const fn argb(argb: u32) -> Self {
        Color::Argb { argb }
    }

    pub const fn theme(theme: u32) -> Self {
        Color::Theme { theme, tint: None }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Underline {
    Single,
    Double,
    SingleAccounting,
    DoubleAccounting,
}

impl Underline {
    pub fn as_str(self) -> &'static str {
        match self {
            Underline::Single => "single",
            Underline::Double => "double",
            Underline::SingleAccounting => "singleAccounting",
            Underline::DoubleAccounting => "doubleAccounting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "single" | "" => Underline::Single,
            "double" => Underline::Double,
            "singleAccounting" => Underline::SingleAccounting,
            "doubleAccounting" => Underline::DoubleAccounting,
            _ => return None,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VertAlign {
    Superscript,
    Subscript,
}

impl VertAlign {
    pub fn as_str(self) -> &'static str {
        match self {
            VertAlign::Superscript => "superscript",
            VertAlign::Subscript => "subscript",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "superscript" => Some(VertAlign::Superscript),
            "subscript" => Some(VertAlign::Subscript),
            _ => None,
        }
    }
}

/// Font formatting.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Font {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<OrderedFloat<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<Underline>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strike: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub outline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vert_align: Option<VertAlign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl Font {
    /// The workbook default font (`Calibri 11`, theme color 1, minor scheme).
    pub fn default_font() -> Self {
        Font {
            name: Some("Calibri".to_string()),
            size: Some(OrderedFloat(11.0)),
            family: Some(2),
            scheme: Some("minor".to_string()),
            color: Some(Color::theme(1)),
            ..Font::default()
        }
    }
}

/// Pattern fill types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PatternType {
    #[default]
    None,
    Solid,
    MediumGray,
    DarkGray,
    LightGray,
    DarkHorizontal,
    DarkVertical,
    DarkDown,
    DarkUp,
    DarkGrid,
    DarkTrellis,
    LightHorizontal,
    LightVertical,
    LightDown,
    LightUp,
    LightGrid,
    LightTrellis,
    Gray125,
    Gray0625,
}

const PATTERN_NAMES: &[(PatternType, &str)] = &[
    (PatternType::None, "none"),
    (PatternType::Solid, "solid"),
    (PatternType::MediumGray, "mediumGray"),
    (PatternType::DarkGray, "darkGray"),
    (PatternType::LightGray, "lightGray"),
    (PatternType::DarkHorizontal, "darkHorizontal"),
    (PatternType::DarkVertical, "darkVertical"),
    (PatternType::DarkDown, "darkDown"),
    (PatternType::DarkUp, "darkUp"),
    (PatternType::DarkGrid, "darkGrid"),
    (PatternType::DarkTrellis, "darkTrellis"),
    (PatternType::LightHorizontal, "lightHorizontal"),
    (PatternType::LightVertical, "lightVertical"),
    (PatternType::LightDown, "lightDown"),
    (PatternType::LightUp, "lightUp"),
    (PatternType::LightGrid, "lightGrid"),
    (PatternType::LightTrellis, "lightTrellis"),
    (PatternType::Gray125, "gray125"),
    (PatternType::Gray0625, "gray0625"),
];

impl PatternType {
    pub fn as_str(self) -> &'static str {
        PATTERN_NAMES
            .iter()
            .find(|(p, _)| *p == self)
            .map(|(_, name)| *name)
            .unwrap_or("none")
    }

    pub fn parse(s: &str) -> Option<Self> {
        PATTERN_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(p, _)| *p)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GradientStop {
    pub position: OrderedFloat<f64>,
    pub color: Color,
}

/// Fill (background) formatting.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fill {
    Pattern {
        pattern: PatternType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fg_color: Option<Color>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bg_color: Option<Color>,
    },
    /// Linear gradient.
    Gradient {
        degree: OrderedFloat<f64>,
        stops: Vec<GradientStop>,
    },
}

impl Default for Fill {
    fn default() -> Self {
        Fill::Pattern {
            pattern: PatternType::None,
            fg_color: None,
            bg_color: None,
        }
    }
}

impl Fill {
    /// Solid fill in one color.
    pub fn solid(color: Color) -> Self {
        Fill::Pattern {
            pattern: PatternType::Solid,
            fg_color: Some(color),
            bg_color: None,
        }
    }
}

/// Border line style.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BorderStyle {
    Thin,
    Dotted,
    DashDot,
    Hair,
    DashDotDot,
    SlantDashDot,
    MediumDashed,
    MediumDashDotDot,
    MediumDashDot,
    Medium,
    Double,
    Thick,
    Dashed,
}

const BORDER_STYLE_NAMES: &[(BorderStyle, &str)] = &[
    (BorderStyle::Thin, "thin"),
    (BorderStyle::Dotted, "dotted"),
    (BorderStyle::DashDot, "dashDot"),
    (BorderStyle::Hair, "hair"),
    (BorderStyle::DashDotDot, "dashDotDot"),
    (BorderStyle::SlantDashDot, "slantDashDot"),
    (BorderStyle::MediumDashed, "mediumDashed"),
    (BorderStyle::MediumDashDotDot, "mediumDashDotDot"),
    (BorderStyle::MediumDashDot, "mediumDashDot"),
    (BorderStyle::Medium, "medium"),
    (BorderStyle::Double, "double"),
    (BorderStyle::Thick, "thick"),
    (BorderStyle::Dashed, "dashed"),
];

impl BorderStyle {
    pub fn as_str(self) -> &'static str {
        BORDER_STYLE_NAMES
            .iter()
            .find(|(b, _)| *b == self)
            .map(|(_, name)| *name)
            .unwrap_or("thin")
    }

    pub fn parse(s: &str) -> Option<Self> {
        BORDER_STYLE_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(b, _)| *b)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BorderEdge {
    pub style: BorderStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl BorderEdge {
    pub fn new(style: BorderStyle) -> Self {
        Self { style, color: None }
    }
}

/// Border formatting.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Border {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagonal: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub diagonal_up: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub diagonal_down: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HorizontalAlignment {
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
    CenterContinuous,
    Distributed,
}

impl HorizontalAlignment {
    pub fn as_str(self) -> &'static str {
        match self {
            HorizontalAlignment::General => "general",
            HorizontalAlignment::Left => "left",
            HorizontalAlignment::Center => "center",
            HorizontalAlignment::Right => "right",
            HorizontalAlignment::Fill => "fill",
            HorizontalAlignment::Justify => "justify",
            HorizontalAlignment::CenterContinuous => "centerContinuous",
            HorizontalAlignment::Distributed => "distributed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "general" => HorizontalAlignment::General,
            "left" => HorizontalAlignment::Left,
            "center" => HorizontalAlignment::Center,
            "right" => HorizontalAlignment::Right,
            "fill" => HorizontalAlignment::Fill,
            "justify" => HorizontalAlignment::Justify,
            "centerContinuous" => HorizontalAlignment::CenterContinuous,
            "distributed" => HorizontalAlignment::Distributed,
            _ => return None,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerticalAlignment {
    Top,
    Center,
    Bottom,
    Justify,
    Distributed,
}

impl VerticalAlignment {
    pub fn as_str(self) -> &'static str {
        match self {
            VerticalAlignment::Top => "top",
            VerticalAlignment::Center => "center",
            VerticalAlignment::Bottom => "bottom",
            VerticalAlignment::Justify => "justify",
            VerticalAlignment::Distributed => "distributed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "top" => VerticalAlignment::Top,
            "center" => VerticalAlignment::Center,
            "bottom" => VerticalAlignment::Bottom,
            "justify" => VerticalAlignment::Justify,
            "distributed" => VerticalAlignment::Distributed,
            _ => return None,
        })
    }
}

/// Alignment formatting.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Alignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal: Option<HorizontalAlignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical: Option<VerticalAlignment>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub wrap_text: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub shrink_to_fit: bool,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub indent: u32,
    /// Text rotation in degrees.
    ///
    /// - `0` = horizontal
    /// - `1..=90` counter-clockwise, `91..=180` clockwise (stored as in the file)
    /// - `255` is vertical stacked text
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub text_rotation: u32,
    /// `0` context, `1` left-to-right, `2` right-to-left.
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub reading_order: u32,
}

/// Cell protection flags. `None` means the file default (locked, not hidden).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Protection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

/// Complete cell style.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Style {
    /// Number format code, e.g. `0.00%` or `yyyy-mm-dd`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_fmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<Font>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<Border>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<Protection>,
}

impl Style {
    pub fn is_default(&self) -> bool {
        *self == Style::default()
    }

    pub fn with_num_fmt(mut self, code: impl Into<String>) -> Self {
        self.num_fmt = Some(code.into());
        self
    }

    pub fn with_font(mut self, font: Font) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_fill(mut self, fill: Fill) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_border(mut self, border: Border) -> Self {
        self.border = Some(border);
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = Some(alignment);
        self
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Deduplicated table of styles.
///
/// Cells store a `style_id` referencing this table. Style `0` is always the
/// default (empty) style.
#[derive(Clone, Debug, Serialize)]
pub struct StyleTable {
    pub styles: Vec<Style>,
    #[serde(skip)]
    index: HashMap<Style, u32>,
}

impl Default for StyleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleTable {
    pub fn new() -> Self {
        let mut table = Self {
            styles: vec![Style::default()],
            index: HashMap::new(),
        };
        table.rebuild_index();
        table
    }

    /// Insert (or reuse) a style, returning its ID.
    pub fn intern(&mut self, style: Style) -> u32 {
        if let Some(id) = self.index.get(&style) {
            return *id;
        }
        let id = self.styles.len() as u32;
        self.styles.push(style.clone());
        self.index.insert(style, id);
        id
    }

    pub fn get(&self, style_id: u32) -> Option<&Style> {
        self.styles.get(style_id as usize)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.len() <= 1
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, style) in self.styles.iter().cloned().enumerate() {
            self.index.entry(style).or_insert(i as u32);
        }
    }
}

impl<'de> Deserialize<'de> for StyleTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Helper {
            #[serde(default)]
            styles: Vec<Style>,
        }

        let mut helper = Helper::deserialize(deserializer)?;
        if helper.styles.is_empty() {
            helper.styles.push(Style::default());
        }

        let mut table = StyleTable {
            styles: helper.styles,
            index: HashMap::new(),
        };
        table.rebuild_index();
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_table_dedupes_by_value() {
        let mut table = StyleTable::new();
        let bold = Style::default().with_font(Font {
            bold: true,
            ..Font::default()
        });
        let a = table.intern(bold.clone());
        let b = table.intern(bold);
        assert_eq!(a, b);
        assert_eq!(a, 1);
        assert_eq!(table.intern(Style::default()), 0);
    }

    #[test]
    fn style_table_deserialize_restores_index() {
        let json = r#"{"styles":[{},{"num_fmt":"0.00"}]}"#;
        let mut table: StyleTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.intern(Style::default().with_num_fmt("0.00")), 1);
    }

    #[test]
    fn enum_names_roundtrip() {
        assert_eq!(PatternType::parse("darkTrellis"), Some(PatternType::DarkTrellis));
        assert_eq!(PatternType::Gray125.as_str(), "gray125");
        assert_eq!(BorderStyle::parse("mediumDashDot"), Some(BorderStyle::MediumDashDot));
        assert_eq!(BorderStyle::Hair.as_str(), "hair");
    }
}
