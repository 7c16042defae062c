use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape};

pub(crate) const XML_HEADER: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Append-only XML writer with an open-element stack.
///
/// A start tag stays open (`<c r="A1"`) until the first child, text or close,
/// so attributes can be added after `open_node`. Elements closed without
/// content render as `<c/>`.
#[derive(Debug, Default)]
pub struct XmlStream {
    buf: String,
    stack: Vec<String>,
    tag_open: bool,
}

/// Position saved by [`XmlStream::checkpoint`].
#[derive(Clone, Copy, Debug)]
pub struct Checkpoint {
    len: usize,
    depth: usize,
    tag_open: bool,
}

impl XmlStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_xml(&mut self) {
        self.buf.push_str(XML_HEADER);
        self.buf.push('\n');
    }

    fn finish_start_tag(&mut self) {
        if self.tag_open {
            self.buf.push('>');
            self.tag_open = false;
        }
    }

    pub fn open_node(&mut self, name: &str) {
        self.finish_start_tag();
        self.buf.push('<');
        self.buf.push_str(name);
        self.stack.push(name.to_string());
        self.tag_open = true;
    }

    pub fn open_node_with(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.open_node(name);
        for (k, v) in attrs {
            self.add_attribute(k, v);
        }
    }

    /// Add an attribute to the start tag that is still open.
    pub fn add_attribute(&mut self, name: &str, value: &str) {
        debug_assert!(self.tag_open, "attribute {name} after element content");
        self.buf.push(' ');
        self.buf.push_str(name);
        self.buf.push_str("=\"");
        self.buf.push_str(&escape(&*encode_forbidden(value)));
        self.buf.push('"');
    }

    pub fn add_attribute_opt(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.add_attribute(name, value);
        }
    }

    pub fn add_attribute_display(&mut self, name: &str, value: impl std::fmt::Display) {
        self.add_attribute(name, &value.to_string());
    }

    pub fn write_text(&mut self, text: &str) {
        self.finish_start_tag();
        self.buf.push_str(&partial_escape(&*encode_xstring(text)));
    }

    /// Append pre-rendered markup.
    pub fn write_raw(&mut self, xml: &str) {
        self.finish_start_tag();
        self.buf.push_str(xml);
    }

    pub fn close_node(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        if self.tag_open {
            self.buf.push_str("/>");
            self.tag_open = false;
        } else {
            self.buf.push_str("</");
            self.buf.push_str(&name);
            self.buf.push('>');
        }
    }

    /// `<name a="v">text</name>` in one call.
    pub fn leaf_node(&mut self, name: &str, attrs: &[(&str, &str)], text: Option<&str>) {
        self.open_node_with(name, attrs);
        if let Some(text) = text {
            self.write_text(text);
        }
        self.close_node();
    }

    pub fn close_all(&mut self) {
        while !self.stack.is_empty() {
            self.close_node();
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.buf.len(),
            depth: self.stack.len(),
            tag_open: self.tag_open,
        }
    }

    /// Discard everything written since `cp`.
    pub fn rollback(&mut self, cp: Checkpoint) {
        self.buf.truncate(cp.len);
        self.stack.truncate(cp.depth);
        self.tag_open = cp.tag_open;
    }

    /// True when nothing was written since `cp`.
    pub fn unchanged_since(&self, cp: Checkpoint) -> bool {
        self.buf.len() == cp.len
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the rendered text, leaving the stream empty (open elements stay
    /// on the stack). Used by the streaming writer to flush row batches.
    pub fn drain(&mut self) -> String {
        self.finish_start_tag();
        std::mem::take(&mut self.buf)
    }

    pub fn into_string(mut self) -> String {
        self.close_all();
        self.buf
    }
}

/// Render a number the way the file format expects it (`7`, not `7.0`).
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Characters XML 1.0 cannot carry, even as character references.
fn is_forbidden(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
}

/// Length of the `_xHHHH_` escape at the start of `s`, if there is one.
fn escape_len(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    (b.len() >= 7
        && b[0] == b'_'
        && b[1] == b'x'
        && b[2..6].iter().all(u8::is_ascii_hexdigit)
        && b[6] == b'_')
        .then_some(7)
}

/// Replace forbidden characters with `_xHHHH_`.
fn encode_forbidden(text: &str) -> Cow<'_, str> {
    if !text.chars().any(is_forbidden) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if is_forbidden(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Encode text content the way spreadsheet strings are stored: forbidden
/// characters become `_xHHHH_` and a literal `_xHHHH_` gets its underscore
/// escaped as `_x005F_`.
pub(crate) fn encode_xstring(text: &str) -> Cow<'_, str> {
    let needs_literal_escape = text
        .match_indices("_x")
        .any(|(i, _)| escape_len(&text[i..]).is_some());
    if !needs_literal_escape {
        return encode_forbidden(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for (i, c) in text.char_indices() {
        if c == '_' && escape_len(&text[i..]).is_some() {
            out.push_str("_x005F_");
        } else if is_forbidden(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Inverse of [`encode_xstring`]. Escapes naming an invalid code point are
/// kept as written.
pub(crate) fn decode_xstring(text: &str) -> Cow<'_, str> {
    if !text.contains("_x") {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let decoded = escape_len(rest)
            .and_then(|_| u32::from_str_radix(&rest[2..6], 16).ok())
            .and_then(char::from_u32);
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[7..];
            }
            None => {
                out.push_str("_x");
                rest = &rest[2..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// `xml:space="preserve"` is needed when whitespace at the edges would
/// otherwise be dropped by consumers.
pub(crate) fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace)
        || text.contains('\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_attributes_and_escaping() {
        let mut xml = XmlStream::new();
        xml.open_node("row");
        xml.add_attribute("r", "1");
        xml.open_node_with("c", &[("r", "A1"), ("t", "inlineStr")]);
        xml.open_node("is");
        xml.leaf_node("t", &[], Some("a < b & \"c\""));
        xml.close_node();
        xml.close_node();
        xml.leaf_node("c", &[("r", "B1")], None);
        assert_eq!(
            xml.into_string(),
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>a &lt; b &amp; "c"</t></is></c><c r="B1"/></row>"#
        );
    }

    #[test]
    fn rollback_discards_partial_output() {
        let mut xml = XmlStream::new();
        xml.open_node("cols");
        let cp = xml.checkpoint();
        xml.open_node("col");
        xml.add_attribute("min", "1");
        xml.rollback(cp);
        assert!(xml.unchanged_since(cp));
        assert_eq!(xml.into_string(), "<cols/>");
    }

    #[test]
    fn attribute_values_escape_quotes() {
        let mut xml = XmlStream::new();
        xml.leaf_node("definedName", &[("name", "a\"b")], Some("'S'!$A$1"));
        assert_eq!(
            xml.as_str(),
            r#"<definedName name="a&quot;b">'S'!$A$1</definedName>"#
        );
    }

    #[test]
    fn control_characters_are_encoded() {
        let mut xml = XmlStream::new();
        xml.leaf_node("t", &[("tip", "a\u{1}")], Some("a\u{1}b\u{1f}"));
        assert_eq!(xml.as_str(), r#"<t tip="a_x0001_">a_x0001_b_x001F_</t>"#);
    }

    #[test]
    fn xstring_escapes_decode_back() {
        for text in ["plain", "a\u{1}b", "_x0041_", "__x005F_", "tab\there", "_x12_", "\u{ffff}"] {
            assert_eq!(decode_xstring(&encode_xstring(text)), text, "{text:?}");
        }
        assert_eq!(encode_xstring("_x0041_"), "_x005F_x0041_");
        assert_eq!(decode_xstring("_x0041_BC"), "ABC");
        assert_eq!(decode_xstring("_xD800_"), "_xD800_");
    }

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(format_number(7.0), "7");
        assert_eq!(format_number(-0.25), "-0.25");
        assert_eq!(format_number(1e20), "100000000000000000000");
    }
}
