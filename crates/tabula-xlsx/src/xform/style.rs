//! `xl/styles.xml` vocabulary.

use ordered_float::OrderedFloat;
use tabula_model::{
    Alignment, Border, BorderEdge, BorderStyle, Color, Fill, Font, GradientStop,
    HorizontalAlignment, PatternType, Protection, Underline, VertAlign, VerticalAlignment,
};

use crate::sax::SaxNode;
use crate::xml_stream::{format_number, XmlStream};
use crate::XlsxError;

use super::simple::{BoolXform, FloatXform, IntegerXform, StringXform};
use super::{ChildMap, Composite, ListXform, Xform};

pub(crate) const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// A number format table entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NumFmt {
    pub id: u32,
    pub code: String,
}

#[derive(Default)]
pub struct NumFmtXform {
    model: Option<NumFmt>,
}

impl Xform for NumFmtXform {
    type Model = NumFmt;

    fn tag(&self) -> &str {
        "numFmt"
    }

    fn render(&self, xml: &mut XmlStream, model: &NumFmt) {
        xml.open_node("numFmt");
        xml.add_attribute_display("numFmtId", model.id);
        xml.add_attribute("formatCode", &model.code);
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if node.name != "numFmt" {
            return Ok(false);
        }
        self.model = Some(NumFmt {
            id: node.attr_u32("numFmtId").unwrap_or(0),
            code: node.attr("formatCode").unwrap_or_default().to_string(),
        });
        Ok(true)
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        Ok(name != "numFmt")
    }

    fn take_model(&mut self) -> Option<NumFmt> {
        self.model.take()
    }

    fn reset(&mut self) {
        self.model = None;
    }
}

/// Any color element (`color`, `fgColor`, `bgColor`).
pub struct ColorXform {
    tag: &'static str,
    model: Option<Color>,
}

impl ColorXform {
    pub fn new(tag: &'static str) -> Self {
        Self { tag, model: None }
    }
}

fn parse_argb(s: &str) -> Option<u32> {
    let s = s.trim();
    let v = u32::from_str_radix(s, 16).ok()?;
    // `RRGGBB` without alpha is opaque.
    Some(if s.len() <= 6 { 0xFF00_0000 | v } else { v })
}

impl Xform for ColorXform {
    type Model = Color;

    fn tag(&self) -> &str {
        self.tag
    }

    fn render(&self, xml: &mut XmlStream, model: &Color) {
        xml.open_node(self.tag);
        match model {
            Color::Argb { argb } => xml.add_attribute("rgb", &format!("{argb:08X}")),
            Color::Theme { theme, tint } => {
                xml.add_attribute_display("theme", theme);
                if let Some(tint) = tint {
                    xml.add_attribute("tint", &format_number(tint.0));
                }
            }
            Color::Indexed { indexed } => xml.add_attribute_display("indexed", indexed),
            Color::Auto => xml.add_attribute("auto", "1"),
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if node.name != self.tag {
            return Ok(false);
        }
        self.model = if let Some(argb) = node.attr("rgb").and_then(parse_argb) {
            Some(Color::Argb { argb })
        } else if let Some(theme) = node.attr_u32("theme") {
            Some(Color::Theme {
                theme,
                tint: node.attr_f64("tint").map(OrderedFloat),
            })
        } else if let Some(indexed) = node.attr_u32("indexed") {
            Some(Color::Indexed { indexed })
        } else if node.attr_bool("auto") == Some(true) {
            Some(Color::Auto)
        } else {
            None
        };
        Ok(true)
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        Ok(name != self.tag)
    }

    fn take_model(&mut self) -> Option<Color> {
        self.model.take()
    }

    fn reset(&mut self) {
        self.model = None;
    }
}

/// `font` in the style table, `rPr` inside rich text runs.
pub struct FontXform {
    name_tag: &'static str,
    inner: Composite<Font>,
}

impl FontXform {
    pub fn font() -> Self {
        Self::new("font", "name")
    }

    pub fn run_properties() -> Self {
        Self::new("rPr", "rFont")
    }

    fn new(tag: &'static str, name_tag: &'static str) -> Self {
        let map = ChildMap::new()
            .with(BoolXform::attr("b", "val"), |f: &mut Font, v| f.bold = v)
            .with(BoolXform::attr("i", "val"), |f: &mut Font, v| f.italic = v)
            .with(BoolXform::attr("strike", "val"), |f: &mut Font, v| {
                f.strike = v
            })
            .with(BoolXform::attr("outline", "val"), |f: &mut Font, v| {
                f.outline = v
            })
            .with(StringXform::attr("u", "val"), |f: &mut Font, v| {
                f.underline = match v.as_str() {
                    "none" => None,
                    other => Underline::parse(other),
                }
            })
            .with(StringXform::attr("vertAlign", "val"), |f: &mut Font, v| {
                f.vert_align = VertAlign::parse(&v)
            })
            .with(FloatXform::attr("sz", "val"), |f: &mut Font, v| {
                f.size = Some(OrderedFloat(v))
            })
            .with(ColorXform::new("color"), |f: &mut Font, v| f.color = Some(v))
            .with(StringXform::attr(name_tag, "val"), |f: &mut Font, v| {
                f.name = Some(v)
            })
            .with(IntegerXform::attr("family", "val"), |f: &mut Font, v| {
                f.family = u32::try_from(v).ok()
            })
            .with(IntegerXform::attr("charset", "val"), |f: &mut Font, v| {
                f.charset = u32::try_from(v).ok()
            })
            .with(StringXform::attr("scheme", "val"), |f: &mut Font, v| {
                f.scheme = Some(v)
            });
        Self {
            name_tag,
            inner: Composite::new(tag, map),
        }
    }
}

impl Xform for FontXform {
    type Model = Font;

    fn tag(&self) -> &str {
        self.inner.tag()
    }

    fn render(&self, xml: &mut XmlStream, model: &Font) {
        xml.open_node(self.inner.tag());
        for (on, tag) in [
            (model.bold, "b"),
            (model.italic, "i"),
            (model.strike, "strike"),
            (model.outline, "outline"),
        ] {
            if on {
                xml.leaf_node(tag, &[], None);
            }
        }
        match model.underline {
            Some(Underline::Single) => xml.leaf_node("u", &[], None),
            Some(u) => xml.leaf_node("u", &[("val", u.as_str())], None),
            None => {}
        }
        if let Some(va) = model.vert_align {
            xml.leaf_node("vertAlign", &[("val", va.as_str())], None);
        }
        if let Some(size) = model.size {
            xml.leaf_node("sz", &[("val", &format_number(size.0))], None);
        }
        if let Some(color) = &model.color {
            ColorXform::new("color").render(xml, color);
        }
        if let Some(name) = &model.name {
            xml.leaf_node(self.name_tag, &[("val", name)], None);
        }
        if let Some(family) = model.family {
            xml.leaf_node("family", &[("val", &family.to_string())], None);
        }
        if let Some(charset) = model.charset {
            xml.leaf_node("charset", &[("val", &charset.to_string())], None);
        }
        if let Some(scheme) = &model.scheme {
            xml.leaf_node("scheme", &[("val", scheme)], None);
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |_| Font::default())
    }

    fn parse_text(&mut self, text: &str) {
        self.inner.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn take_model(&mut self) -> Option<Font> {
        self.inner.take_model()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FillColorSlot {
    Fg,
    Bg,
    Stop,
}

/// `fill` with either a `patternFill` or a linear `gradientFill`.
pub struct FillXform {
    model: Option<Fill>,
    fg: ColorXform,
    bg: ColorXform,
    stop_color: ColorXform,
    active: Option<FillColorSlot>,
    stop_position: Option<f64>,
    pending_stop: Option<Color>,
    skip_depth: usize,
}

impl Default for FillXform {
    fn default() -> Self {
        Self {
            model: None,
            fg: ColorXform::new("fgColor"),
            bg: ColorXform::new("bgColor"),
            stop_color: ColorXform::new("color"),
            active: None,
            stop_position: None,
            pending_stop: None,
            skip_depth: 0,
        }
    }
}

impl FillXform {
    fn color_xform(&mut self, slot: FillColorSlot) -> &mut ColorXform {
        match slot {
            FillColorSlot::Fg => &mut self.fg,
            FillColorSlot::Bg => &mut self.bg,
            FillColorSlot::Stop => &mut self.stop_color,
        }
    }

    fn store_color(&mut self, slot: FillColorSlot, color: Color) {
        match (slot, self.model.as_mut()) {
            (FillColorSlot::Fg, Some(Fill::Pattern { fg_color, .. })) => *fg_color = Some(color),
            (FillColorSlot::Bg, Some(Fill::Pattern { bg_color, .. })) => *bg_color = Some(color),
            (FillColorSlot::Stop, _) => self.pending_stop = Some(color),
            _ => {}
        }
    }
}

impl Xform for FillXform {
    type Model = Fill;

    fn tag(&self) -> &str {
        "fill"
    }

    fn render(&self, xml: &mut XmlStream, model: &Fill) {
        xml.open_node("fill");
        match model {
            Fill::Pattern {
                pattern,
                fg_color,
                bg_color,
            } => {
                xml.open_node("patternFill");
                xml.add_attribute("patternType", pattern.as_str());
                if let Some(color) = fg_color {
                    self.fg.render(xml, color);
                }
                if let Some(color) = bg_color {
                    self.bg.render(xml, color);
                }
                xml.close_node();
            }
            Fill::Gradient { degree, stops } => {
                xml.open_node("gradientFill");
                xml.add_attribute("degree", &format_number(degree.0));
                for stop in stops {
                    xml.open_node("stop");
                    xml.add_attribute("position", &format_number(stop.position.0));
                    self.stop_color.render(xml, &stop.color);
                    xml.close_node();
                }
                xml.close_node();
            }
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return Ok(true);
        }
        if let Some(slot) = self.active {
            if !self.color_xform(slot).parse_open(node)? {
                self.skip_depth = 1;
            }
            return Ok(true);
        }
        if self.model.is_none() {
            if node.name == "fill" {
                self.model = Some(Fill::default());
                return Ok(true);
            }
            return Ok(false);
        }
        match node.name.as_str() {
            "patternFill" => {
                self.model = Some(Fill::Pattern {
                    pattern: node
                        .attr("patternType")
                        .and_then(PatternType::parse)
                        .unwrap_or_default(),
                    fg_color: None,
                    bg_color: None,
                });
            }
            "gradientFill" => {
                self.model = Some(Fill::Gradient {
                    degree: OrderedFloat(node.attr_f64("degree").unwrap_or(0.0)),
                    stops: Vec::new(),
                });
            }
            "stop" => {
                self.stop_position = node.attr_f64("position");
                self.pending_stop = None;
            }
            name => {
                let slot = match name {
                    "fgColor" => FillColorSlot::Fg,
                    "bgColor" => FillColorSlot::Bg,
                    "color" => FillColorSlot::Stop,
                    _ => {
                        self.skip_depth = 1;
                        return Ok(true);
                    }
                };
                if self.color_xform(slot).parse_open(node)? {
                    self.active = Some(slot);
                } else {
                    self.skip_depth = 1;
                }
            }
        }
        Ok(true)
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(true);
        }
        if let Some(slot) = self.active {
            let xform = self.color_xform(slot);
            if !xform.parse_close(name)? {
                if let Some(color) = xform.take_model() {
                    self.store_color(slot, color);
                }
                self.active = None;
            }
            return Ok(true);
        }
        match name {
            "fill" => Ok(false),
            "stop" => {
                if let (Some(Fill::Gradient { stops, .. }), Some(color)) =
                    (self.model.as_mut(), self.pending_stop.take())
                {
                    stops.push(GradientStop {
                        position: OrderedFloat(self.stop_position.unwrap_or(0.0)),
                        color,
                    });
                }
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    fn take_model(&mut self) -> Option<Fill> {
        self.model.take()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

const BORDER_EDGES: [&str; 5] = ["left", "right", "top", "bottom", "diagonal"];

fn edge_slot<'a>(border: &'a mut Border, name: &str) -> Option<&'a mut Option<BorderEdge>> {
    Some(match name {
        "left" | "start" => &mut border.left,
        "right" | "end" => &mut border.right,
        "top" => &mut border.top,
        "bottom" => &mut border.bottom,
        "diagonal" => &mut border.diagonal,
        _ => return None,
    })
}

fn edge_ref<'a>(border: &'a Border, name: &str) -> Option<&'a BorderEdge> {
    match name {
        "left" => border.left.as_ref(),
        "right" => border.right.as_ref(),
        "top" => border.top.as_ref(),
        "bottom" => border.bottom.as_ref(),
        "diagonal" => border.diagonal.as_ref(),
        _ => None,
    }
}

pub struct BorderXform {
    model: Option<Border>,
    color: ColorXform,
    edge: Option<(String, Option<BorderStyle>)>,
    edge_color: Option<Color>,
    in_color: bool,
    skip_depth: usize,
}

impl Default for BorderXform {
    fn default() -> Self {
        Self {
            model: None,
            color: ColorXform::new("color"),
            edge: None,
            edge_color: None,
            in_color: false,
            skip_depth: 0,
        }
    }
}

impl Xform for BorderXform {
    type Model = Border;

    fn tag(&self) -> &str {
        "border"
    }

    fn render(&self, xml: &mut XmlStream, model: &Border) {
        xml.open_node("border");
        if model.diagonal_up {
            xml.add_attribute("diagonalUp", "1");
        }
        if model.diagonal_down {
            xml.add_attribute("diagonalDown", "1");
        }
        for name in BORDER_EDGES {
            xml.open_node(name);
            if let Some(edge) = edge_ref(model, name) {
                xml.add_attribute("style", edge.style.as_str());
                if let Some(color) = &edge.color {
                    self.color.render(xml, color);
                }
            }
            xml.close_node();
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return Ok(true);
        }
        if self.in_color {
            self.skip_depth = 1;
            return Ok(true);
        }
        if self.model.is_none() {
            if node.name == "border" {
                self.model = Some(Border {
                    diagonal_up: node.attr_bool("diagonalUp").unwrap_or(false),
                    diagonal_down: node.attr_bool("diagonalDown").unwrap_or(false),
                    ..Border::default()
                });
                return Ok(true);
            }
            return Ok(false);
        }
        if self.edge.is_some() && node.name == "color" {
            self.in_color = self.color.parse_open(node)?;
            return Ok(true);
        }
        let is_edge = self
            .model
            .as_mut()
            .and_then(|b| edge_slot(b, &node.name))
            .is_some();
        if is_edge && self.edge.is_none() {
            let style = node.attr("style").and_then(BorderStyle::parse);
            self.edge = Some((node.name.clone(), style));
            self.edge_color = None;
        } else {
            self.skip_depth = 1;
        }
        Ok(true)
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(true);
        }
        if self.in_color {
            if !self.color.parse_close(name)? {
                self.edge_color = self.color.take_model();
                self.in_color = false;
            }
            return Ok(true);
        }
        if name == "border" {
            return Ok(false);
        }
        if let Some((edge_name, style)) = self.edge.take() {
            if let (Some(style), Some(border)) = (style, self.model.as_mut()) {
                if let Some(slot) = edge_slot(border, &edge_name) {
                    *slot = Some(BorderEdge {
                        style,
                        color: self.edge_color.take(),
                    });
                }
            }
        }
        Ok(true)
    }

    fn take_model(&mut self) -> Option<Border> {
        self.model.take()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Leaf node reading and writing one attribute-only element. Child
/// elements are left to the parent to skip.
pub struct AttrLeaf<M> {
    tag: &'static str,
    model: Option<M>,
    read: fn(&SaxNode) -> Result<M, XlsxError>,
    write: fn(&mut XmlStream, &M),
}

impl<M> AttrLeaf<M> {
    pub fn new(
        tag: &'static str,
        read: fn(&SaxNode) -> Result<M, XlsxError>,
        write: fn(&mut XmlStream, &M),
    ) -> Self {
        Self {
            tag,
            model: None,
            read,
            write,
        }
    }
}

impl<M> Xform for AttrLeaf<M> {
    type Model = M;

    fn tag(&self) -> &str {
        self.tag
    }

    fn render(&self, xml: &mut XmlStream, model: &M) {
        xml.open_node(self.tag);
        (self.write)(xml, model);
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if node.name != self.tag {
            return Ok(false);
        }
        self.model = Some((self.read)(node)?);
        Ok(true)
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        Ok(name != self.tag)
    }

    fn take_model(&mut self) -> Option<M> {
        self.model.take()
    }

    fn reset(&mut self) {
        self.model = None;
    }
}

pub type AlignmentXform = AttrLeaf<Alignment>;
pub type ProtectionXform = AttrLeaf<Protection>;

pub fn alignment_xform() -> AlignmentXform {
    AttrLeaf::new(
        "alignment",
        |node| {
            Ok(Alignment {
                horizontal: node.attr("horizontal").and_then(HorizontalAlignment::parse),
                vertical: node.attr("vertical").and_then(VerticalAlignment::parse),
                wrap_text: node.attr_bool("wrapText").unwrap_or(false),
                shrink_to_fit: node.attr_bool("shrinkToFit").unwrap_or(false),
                indent: node.attr_u32("indent").unwrap_or(0),
                text_rotation: node.attr_u32("textRotation").unwrap_or(0),
                reading_order: node.attr_u32("readingOrder").unwrap_or(0),
            })
        },
        |xml, a| {
            if let Some(h) = a.horizontal {
                xml.add_attribute("horizontal", h.as_str());
            }
            if let Some(v) = a.vertical {
                xml.add_attribute("vertical", v.as_str());
            }
            if a.wrap_text {
                xml.add_attribute("wrapText", "1");
            }
            if a.shrink_to_fit {
                xml.add_attribute("shrinkToFit", "1");
            }
            if a.indent != 0 {
                xml.add_attribute_display("indent", a.indent);
            }
            if a.text_rotation != 0 {
                xml.add_attribute_display("textRotation", a.text_rotation);
            }
            if a.reading_order != 0 {
                xml.add_attribute_display("readingOrder", a.reading_order);
            }
        },
    )
}

pub fn protection_xform() -> ProtectionXform {
    AttrLeaf::new(
        "protection",
        |node| {
            Ok(Protection {
                locked: node.attr_bool("locked"),
                hidden: node.attr_bool("hidden"),
            })
        },
        |xml, p| {
            if let Some(locked) = p.locked {
                xml.add_attribute("locked", if locked { "1" } else { "0" });
            }
            if let Some(hidden) = p.hidden {
                xml.add_attribute("hidden", if hidden { "1" } else { "0" });
            }
        },
    )
}

/// One `cellXfs` record: indices into the component tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct XfModel {
    pub num_fmt_id: u32,
    pub font_id: u32,
    pub fill_id: u32,
    pub border_id: u32,
    pub alignment: Option<Alignment>,
    pub protection: Option<Protection>,
}

pub struct XfXform {
    inner: Composite<XfModel>,
}

impl Default for XfXform {
    fn default() -> Self {
        let map = ChildMap::new()
            .with(alignment_xform(), |xf: &mut XfModel, v| {
                xf.alignment = Some(v)
            })
            .with(protection_xform(), |xf: &mut XfModel, v| {
                xf.protection = Some(v)
            });
        Self {
            inner: Composite::new("xf", map),
        }
    }
}

impl Xform for XfXform {
    type Model = XfModel;

    fn tag(&self) -> &str {
        "xf"
    }

    fn render(&self, xml: &mut XmlStream, model: &XfModel) {
        xml.open_node("xf");
        xml.add_attribute_display("numFmtId", model.num_fmt_id);
        xml.add_attribute_display("fontId", model.font_id);
        xml.add_attribute_display("fillId", model.fill_id);
        xml.add_attribute_display("borderId", model.border_id);
        xml.add_attribute("xfId", "0");
        if model.num_fmt_id != 0 {
            xml.add_attribute("applyNumberFormat", "1");
        }
        if model.font_id != 0 {
            xml.add_attribute("applyFont", "1");
        }
        if model.fill_id != 0 {
            xml.add_attribute("applyFill", "1");
        }
        if model.border_id != 0 {
            xml.add_attribute("applyBorder", "1");
        }
        if model.alignment.is_some() {
            xml.add_attribute("applyAlignment", "1");
        }
        if model.protection.is_some() {
            xml.add_attribute("applyProtection", "1");
        }
        if let Some(alignment) = &model.alignment {
            alignment_xform().render(xml, alignment);
        }
        if let Some(protection) = &model.protection {
            protection_xform().render(xml, protection);
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |node| XfModel {
            num_fmt_id: node.attr_u32("numFmtId").unwrap_or(0),
            font_id: node.attr_u32("fontId").unwrap_or(0),
            fill_id: node.attr_u32("fillId").unwrap_or(0),
            border_id: node.attr_u32("borderId").unwrap_or(0),
            alignment: None,
            protection: None,
        })
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn take_model(&mut self) -> Option<XfModel> {
        self.inner.take_model()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// A differential format, used by conditional formatting and table styles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DxfModel {
    pub font: Option<Font>,
    pub num_fmt: Option<NumFmt>,
    pub fill: Option<Fill>,
    pub alignment: Option<Alignment>,
    pub protection: Option<Protection>,
    pub border: Option<Border>,
}

pub struct DxfXform {
    inner: Composite<DxfModel>,
}

impl Default for DxfXform {
    fn default() -> Self {
        let map = ChildMap::new()
            .with(FontXform::font(), |d: &mut DxfModel, v| d.font = Some(v))
            .with(NumFmtXform::default(), |d: &mut DxfModel, v| {
                d.num_fmt = Some(v)
            })
            .with(FillXform::default(), |d: &mut DxfModel, v| d.fill = Some(v))
            .with(alignment_xform(), |d: &mut DxfModel, v| d.alignment = Some(v))
            .with(protection_xform(), |d: &mut DxfModel, v| {
                d.protection = Some(v)
            })
            .with(BorderXform::default(), |d: &mut DxfModel, v| {
                d.border = Some(v)
            });
        Self {
            inner: Composite::new("dxf", map),
        }
    }
}

impl Xform for DxfXform {
    type Model = DxfModel;

    fn tag(&self) -> &str {
        "dxf"
    }

    fn render(&self, xml: &mut XmlStream, model: &DxfModel) {
        xml.open_node("dxf");
        if let Some(font) = &model.font {
            FontXform::font().render(xml, font);
        }
        if let Some(num_fmt) = &model.num_fmt {
            NumFmtXform::default().render(xml, num_fmt);
        }
        if let Some(fill) = &model.fill {
            FillXform::default().render(xml, fill);
        }
        if let Some(alignment) = &model.alignment {
            alignment_xform().render(xml, alignment);
        }
        if let Some(protection) = &model.protection {
            protection_xform().render(xml, protection);
        }
        if let Some(border) = &model.border {
            BorderXform::default().render(xml, border);
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |_| DxfModel::default())
    }

    fn parse_text(&mut self, text: &str) {
        self.inner.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn take_model(&mut self) -> Option<DxfModel> {
        self.inner.take_model()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Contents of `xl/styles.xml`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StylesModel {
    pub num_fmts: Vec<NumFmt>,
    pub fonts: Vec<Font>,
    pub fills: Vec<Fill>,
    pub borders: Vec<Border>,
    pub cell_xfs: Vec<XfModel>,
    pub dxfs: Vec<DxfModel>,
}

pub struct StylesXform {
    inner: Composite<StylesModel>,
}

impl Default for StylesXform {
    fn default() -> Self {
        let map = ChildMap::new()
            .with(
                ListXform::new("numFmts", NumFmtXform::default()),
                |m: &mut StylesModel, v| m.num_fmts = v,
            )
            .with(
                ListXform::new("fonts", FontXform::font()),
                |m: &mut StylesModel, v| m.fonts = v,
            )
            .with(
                ListXform::new("fills", FillXform::default()),
                |m: &mut StylesModel, v| m.fills = v,
            )
            .with(
                ListXform::new("borders", BorderXform::default()),
                |m: &mut StylesModel, v| m.borders = v,
            )
            .with(
                ListXform::new("cellXfs", XfXform::default()),
                |m: &mut StylesModel, v| m.cell_xfs = v,
            )
            .with(
                ListXform::new("dxfs", DxfXform::default()),
                |m: &mut StylesModel, v| m.dxfs = v,
            );
        Self {
            inner: Composite::new("styleSheet", map),
        }
    }
}

impl Xform for StylesXform {
    type Model = StylesModel;

    fn tag(&self) -> &str {
        "styleSheet"
    }

    fn render(&self, xml: &mut XmlStream, model: &StylesModel) {
        xml.open_xml();
        xml.open_node("styleSheet");
        xml.add_attribute("xmlns", NS_MAIN);

        ListXform::new("numFmts", NumFmtXform::default())
            .with_count()
            .render(xml, &model.num_fmts);
        ListXform::new("fonts", FontXform::font())
            .with_count()
            .render_empty()
            .render(xml, &model.fonts);
        ListXform::new("fills", FillXform::default())
            .with_count()
            .render_empty()
            .render(xml, &model.fills);
        ListXform::new("borders", BorderXform::default())
            .with_count()
            .render_empty()
            .render(xml, &model.borders);

        xml.open_node("cellStyleXfs");
        xml.add_attribute("count", "1");
        xml.leaf_node(
            "xf",
            &[
                ("numFmtId", "0"),
                ("fontId", "0"),
                ("fillId", "0"),
                ("borderId", "0"),
            ],
            None,
        );
        xml.close_node();

        ListXform::new("cellXfs", XfXform::default())
            .with_count()
            .render_empty()
            .render(xml, &model.cell_xfs);

        xml.open_node("cellStyles");
        xml.add_attribute("count", "1");
        xml.leaf_node(
            "cellStyle",
            &[("name", "Normal"), ("xfId", "0"), ("builtinId", "0")],
            None,
        );
        xml.close_node();

        ListXform::new("dxfs", DxfXform::default())
            .with_count()
            .render_empty()
            .render(xml, &model.dxfs);

        xml.leaf_node(
            "tableStyles",
            &[
                ("count", "0"),
                ("defaultTableStyle", "TableStyleMedium2"),
                ("defaultPivotStyle", "PivotStyleLight16"),
            ],
            None,
        );
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |_| StylesModel::default())
    }

    fn parse_text(&mut self, text: &str) {
        self.inner.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn take_model(&mut self) -> Option<StylesModel> {
        self.inner.take_model()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xform::parse_part;
    use pretty_assertions::assert_eq;

    fn roundtrip<X: Xform>(xform: &mut X, model: &X::Model) -> X::Model {
        let xml = xform.to_xml(model);
        parse_part(xform, xml.as_bytes(), "styles.xml").unwrap()
    }

    #[test]
    fn font_renders_in_schema_order() {
        let font = Font {
            bold: true,
            underline: Some(Underline::Double),
            color: Some(Color::argb(0xFFFF0000)),
            ..Font::default_font()
        };
        assert_eq!(
            FontXform::font().to_xml(&font),
            concat!(
                r#"<font><b/><u val="double"/><sz val="11"/><color rgb="FFFF0000"/>"#,
                r#"<name val="Calibri"/><family val="2"/><scheme val="minor"/></font>"#
            )
        );
        assert_eq!(roundtrip(&mut FontXform::font(), &font), font);
    }

    #[test]
    fn run_properties_use_rfont() {
        let font = Font {
            italic: true,
            name: Some("Arial".into()),
            ..Font::default()
        };
        let xml = FontXform::run_properties().to_xml(&font);
        assert_eq!(xml, r#"<rPr><i/><rFont val="Arial"/></rPr>"#);
        assert_eq!(roundtrip(&mut FontXform::run_properties(), &font), font);
    }

    #[test]
    fn fills_roundtrip() {
        let solid = Fill::solid(Color::Theme {
            theme: 4,
            tint: Some(OrderedFloat(0.5)),
        });
        assert_eq!(roundtrip(&mut FillXform::default(), &solid), solid);

        let gradient = Fill::Gradient {
            degree: OrderedFloat(90.0),
            stops: vec![
                GradientStop {
                    position: OrderedFloat(0.0),
                    color: Color::argb(0xFF000000),
                },
                GradientStop {
                    position: OrderedFloat(1.0),
                    color: Color::theme(1),
                },
            ],
        };
        assert_eq!(roundtrip(&mut FillXform::default(), &gradient), gradient);
    }

    #[test]
    fn rgb_without_alpha_is_opaque() {
        let mut color = ColorXform::new("color");
        let parsed = parse_part(&mut color, r#"<color rgb="00FF00"/>"#.as_bytes(), "x").unwrap();
        assert_eq!(parsed, Color::argb(0xFF00FF00));
    }

    #[test]
    fn border_roundtrip_and_empty_edges() {
        let border = Border {
            top: Some(BorderEdge {
                style: BorderStyle::Thick,
                color: Some(Color::Indexed { indexed: 64 }),
            }),
            bottom: Some(BorderEdge::new(BorderStyle::Dashed)),
            diagonal_up: true,
            ..Border::default()
        };
        let xml = BorderXform::default().to_xml(&border);
        assert!(xml.starts_with(r#"<border diagonalUp="1"><left/><right/><top style="thick">"#));
        assert_eq!(roundtrip(&mut BorderXform::default(), &border), border);
    }

    #[test]
    fn xf_with_alignment_roundtrips() {
        let xf = XfModel {
            num_fmt_id: 164,
            font_id: 1,
            alignment: Some(Alignment {
                horizontal: Some(HorizontalAlignment::Center),
                wrap_text: true,
                ..Alignment::default()
            }),
            ..XfModel::default()
        };
        assert_eq!(roundtrip(&mut XfXform::default(), &xf), xf);
    }

    #[test]
    fn stylesheet_parse_skips_unknown_sections() {
        let xml = r#"<?xml version="1.0"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <numFmts count="1"><numFmt numFmtId="164" formatCode="0.0%"/></numFmts>
  <fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs>
  <colors><indexedColors><rgbColor rgb="FF000000"/></indexedColors></colors>
  <extLst><ext uri="x"><foo/></ext></extLst>
</styleSheet>"#;
        let model = parse_part(&mut StylesXform::default(), xml.as_bytes(), "styles.xml").unwrap();
        assert_eq!(
            model.num_fmts,
            vec![NumFmt {
                id: 164,
                code: "0.0%".into()
            }]
        );
        assert_eq!(model.fonts.len(), 1);
        assert_eq!(model.fills[1], Fill::Pattern {
            pattern: PatternType::Gray125,
            fg_color: None,
            bg_color: None
        });
        assert_eq!(model.borders, vec![Border::default()]);
        assert_eq!(model.cell_xfs[1].num_fmt_id, 164);
    }
}
