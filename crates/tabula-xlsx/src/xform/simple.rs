//! Leaf nodes: a value carried in one attribute or in the element text.

use crate::sax::{parse_xml_bool, SaxNode};
use crate::xml_stream::{format_number, needs_space_preserve, XmlStream};
use crate::XlsxError;

use super::Xform;

/// Where a leaf keeps its value.
#[derive(Clone, Copy, Debug)]
enum Slot {
    Attr(&'static str),
    Text,
}

/// Shared parse state for leaves.
#[derive(Debug)]
struct Leaf {
    tag: &'static str,
    slot: Slot,
    raw: Option<String>,
    in_text: bool,
}

impl Leaf {
    fn new(tag: &'static str, slot: Slot) -> Self {
        Self {
            tag,
            slot,
            raw: None,
            in_text: false,
        }
    }

    fn open(&mut self, node: &SaxNode) -> bool {
        if node.name != self.tag {
            return false;
        }
        match self.slot {
            // Absent attribute: keep the element's presence with an empty value.
            Slot::Attr(key) => self.raw = Some(node.attr(key).unwrap_or_default().to_string()),
            Slot::Text => {
                self.raw = Some(String::new());
                self.in_text = true;
            }
        }
        true
    }

    fn text(&mut self, text: &str) {
        if self.in_text {
            if let Some(raw) = self.raw.as_mut() {
                raw.push_str(text);
            }
        }
    }

    fn close(&mut self, name: &str) -> bool {
        if name == self.tag {
            self.in_text = false;
            return false;
        }
        true
    }

    fn render(&self, xml: &mut XmlStream, value: &str) {
        match self.slot {
            Slot::Attr(_) if value.is_empty() => xml.leaf_node(self.tag, &[], None),
            Slot::Attr(key) => xml.leaf_node(self.tag, &[(key, value)], None),
            Slot::Text => xml.leaf_node(self.tag, &[], Some(value)),
        }
    }

    fn reset(&mut self) {
        self.raw = None;
        self.in_text = false;
    }
}

macro_rules! leaf_xform {
    ($name:ident, $model:ty, $parse:expr, $render:expr) => {
        #[derive(Debug)]
        pub struct $name {
            leaf: Leaf,
        }

        impl $name {
            /// Value in attribute `key` of `<tag>`.
            pub fn attr(tag: &'static str, key: &'static str) -> Self {
                Self {
                    leaf: Leaf::new(tag, Slot::Attr(key)),
                }
            }

            /// Value in the text of `<tag>`.
            pub fn text(tag: &'static str) -> Self {
                Self {
                    leaf: Leaf::new(tag, Slot::Text),
                }
            }
        }

        impl Xform for $name {
            type Model = $model;

            fn tag(&self) -> &str {
                self.leaf.tag
            }

            fn render(&self, xml: &mut XmlStream, model: &Self::Model) {
                let render: fn(&$model) -> Option<String> = $render;
                if let Some(value) = render(model) {
                    self.leaf.render(xml, &value);
                }
            }

            fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
                Ok(self.leaf.open(node))
            }

            fn parse_text(&mut self, text: &str) {
                self.leaf.text(text);
            }

            fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
                Ok(self.leaf.close(name))
            }

            fn take_model(&mut self) -> Option<Self::Model> {
                let parse: fn(&str) -> Option<$model> = $parse;
                self.leaf.raw.take().and_then(|raw| parse(&raw))
            }

            fn reset(&mut self) {
                self.leaf.reset();
            }
        }
    };
}

leaf_xform!(
    StringXform,
    String,
    |raw| Some(raw.to_string()),
    |v| Some(v.clone())
);

// `<b/>` is true; `<b val="0"/>` is false. Only `true` is rendered.
leaf_xform!(
    BoolXform,
    bool,
    |raw| Some(raw.is_empty() || parse_xml_bool(raw)),
    |v| v.then(String::new)
);

leaf_xform!(
    IntegerXform,
    i64,
    |raw| raw.trim().parse().ok(),
    |v| Some(v.to_string())
);

leaf_xform!(
    FloatXform,
    f64,
    |raw| raw.trim().parse().ok(),
    |v| Some(format_number(*v))
);

/// `<t>` text, rendered with `xml:space="preserve"` when edge whitespace
/// would otherwise be lost.
#[derive(Debug)]
pub struct TextXform {
    leaf: Leaf,
}

impl TextXform {
    pub fn new(tag: &'static str) -> Self {
        Self {
            leaf: Leaf::new(tag, Slot::Text),
        }
    }
}

impl Default for TextXform {
    fn default() -> Self {
        Self::new("t")
    }
}

impl Xform for TextXform {
    type Model = String;

    fn tag(&self) -> &str {
        self.leaf.tag
    }

    fn render(&self, xml: &mut XmlStream, model: &String) {
        xml.open_node(self.leaf.tag);
        if needs_space_preserve(model) {
            xml.add_attribute("xml:space", "preserve");
        }
        xml.write_text(model);
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        Ok(self.leaf.open(node))
    }

    fn parse_text(&mut self, text: &str) {
        self.leaf.text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        Ok(self.leaf.close(name))
    }

    fn take_model(&mut self) -> Option<String> {
        self.leaf.raw.take()
    }

    fn reset(&mut self) {
        self.leaf.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xform::parse_part;

    #[test]
    fn bool_leaf_defaults_to_true_without_val() {
        let mut b = BoolXform::attr("b", "val");
        assert!(parse_part(&mut b, "<b/>".as_bytes(), "x").unwrap());
        assert!(!parse_part(&mut b, r#"<b val="0"/>"#.as_bytes(), "x").unwrap());
        assert_eq!(b.to_xml(&true), "<b/>");
        assert_eq!(b.to_xml(&false), "");
    }

    #[test]
    fn text_leaf_preserves_edge_whitespace() {
        let t = TextXform::default();
        assert_eq!(t.to_xml(&" pad".to_string()), r#"<t xml:space="preserve"> pad</t>"#);
        assert_eq!(t.to_xml(&"plain".to_string()), "<t>plain</t>");
        let parsed = parse_part(
            &mut TextXform::default(),
            r#"<t xml:space="preserve"> a &lt; b </t>"#.as_bytes(),
            "x",
        )
        .unwrap();
        assert_eq!(parsed, " a < b ");
    }

    #[test]
    fn numeric_leaves() {
        let mut sz = FloatXform::attr("sz", "val");
        assert_eq!(parse_part(&mut sz, r#"<sz val="10.5"/>"#.as_bytes(), "x").unwrap(), 10.5);
        assert_eq!(sz.to_xml(&11.0), r#"<sz val="11"/>"#);
        let mut n = IntegerXform::text("n");
        assert_eq!(parse_part(&mut n, "<n> 42 </n>".as_bytes(), "x").unwrap(), 42);
    }
}
