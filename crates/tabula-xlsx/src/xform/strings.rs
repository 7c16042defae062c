//! Shared string vocabulary: `sst`, `si`, inline `is` and comment `text`.

use tabula_model::{RichText, RichTextRun};

use crate::sax::SaxNode;
use crate::xml_stream::XmlStream;
use crate::XlsxError;

use super::simple::TextXform;
use super::style::{FontXform, NS_MAIN};
use super::{ChildMap, Composite, ListXform, Xform};

/// One string table entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SharedString {
    Text(String),
    Rich(RichText),
}

impl SharedString {
    pub fn plain_text(&self) -> String {
        match self {
            SharedString::Text(text) => text.clone(),
            SharedString::Rich(rich) => rich.plain_text(),
        }
    }

    /// Rich text whose runs carry no font collapses to plain text.
    pub fn from_rich_text(rich: &RichText) -> Self {
        if rich.is_plain() {
            SharedString::Text(rich.plain_text())
        } else {
            SharedString::Rich(rich.clone())
        }
    }
}

/// `<r>`: one formatted run.
pub struct RichTextRunXform {
    inner: Composite<RichTextRun>,
}

impl Default for RichTextRunXform {
    fn default() -> Self {
        let map = ChildMap::new()
            .with(FontXform::run_properties(), |r: &mut RichTextRun, v| {
                r.font = Some(v)
            })
            .with(TextXform::default(), |r: &mut RichTextRun, v| {
                r.text.push_str(&v)
            });
        Self {
            inner: Composite::new("r", map),
        }
    }
}

impl Xform for RichTextRunXform {
    type Model = RichTextRun;

    fn tag(&self) -> &str {
        "r"
    }

    fn render(&self, xml: &mut XmlStream, model: &RichTextRun) {
        xml.open_node("r");
        if let Some(font) = &model.font {
            FontXform::run_properties().render(xml, font);
        }
        TextXform::default().render(xml, &model.text);
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |_| RichTextRun::default())
    }

    fn parse_text(&mut self, text: &str) {
        self.inner.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn take_model(&mut self) -> Option<RichTextRun> {
        self.inner.take_model()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

#[derive(Default)]
struct StringParts {
    text: Option<String>,
    runs: Vec<RichTextRun>,
}

/// A string item: `si` in the table, `is` in an inline cell, `text` in a
/// comment. Phonetic runs (`rPh`) are skipped.
pub struct SharedStringXform {
    inner: Composite<StringParts>,
}

impl SharedStringXform {
    pub fn new(tag: &'static str) -> Self {
        let map = ChildMap::new()
            .with(TextXform::default(), |p: &mut StringParts, v| {
                p.text.get_or_insert_with(String::new).push_str(&v)
            })
            .with(RichTextRunXform::default(), |p: &mut StringParts, v| {
                p.runs.push(v)
            });
        Self {
            inner: Composite::new(tag, map),
        }
    }
}

impl Xform for SharedStringXform {
    type Model = SharedString;

    fn tag(&self) -> &str {
        self.inner.tag()
    }

    fn render(&self, xml: &mut XmlStream, model: &SharedString) {
        xml.open_node(self.inner.tag());
        match model {
            SharedString::Text(text) => TextXform::default().render(xml, text),
            SharedString::Rich(rich) => {
                let run = RichTextRunXform::default();
                for r in &rich.runs {
                    run.render(xml, r);
                }
            }
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |_| StringParts::default())
    }

    fn parse_text(&mut self, text: &str) {
        self.inner.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn take_model(&mut self) -> Option<SharedString> {
        let parts = self.inner.take_model()?;
        Some(if parts.runs.is_empty() {
            SharedString::Text(parts.text.unwrap_or_default())
        } else {
            SharedString::Rich(RichText::new(parts.runs))
        })
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Contents of `xl/sharedStrings.xml`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SharedStringsModel {
    /// Total number of string cell references in the workbook.
    pub count: u32,
    pub values: Vec<SharedString>,
}

pub struct SharedStringsXform {
    count: Option<u32>,
    list: ListXform<SharedStringXform>,
}

impl Default for SharedStringsXform {
    fn default() -> Self {
        Self {
            count: None,
            list: ListXform::new("sst", SharedStringXform::new("si")),
        }
    }
}

impl Xform for SharedStringsXform {
    type Model = SharedStringsModel;

    fn tag(&self) -> &str {
        "sst"
    }

    fn render(&self, xml: &mut XmlStream, model: &SharedStringsModel) {
        xml.open_xml();
        xml.open_node("sst");
        xml.add_attribute("xmlns", NS_MAIN);
        xml.add_attribute_display("count", model.count);
        xml.add_attribute_display("uniqueCount", model.values.len());
        let si = self.list.child();
        for value in &model.values {
            si.render(xml, value);
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        let starting = node.name == "sst" && self.count.is_none();
        let consumed = self.list.parse_open(node)?;
        if consumed && starting {
            self.count = Some(node.attr_u32("count").unwrap_or(0));
        }
        Ok(consumed)
    }

    fn parse_text(&mut self, text: &str) {
        self.list.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.list.parse_close(name)
    }

    fn take_model(&mut self) -> Option<SharedStringsModel> {
        let values = self.list.take_model()?;
        let count = self.count.take().unwrap_or(0).max(values.len() as u32);
        Some(SharedStringsModel { count, values })
    }

    fn reset(&mut self) {
        self.count = None;
        self.list.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xform::parse_part;
    use pretty_assertions::assert_eq;
    use tabula_model::Font;

    #[test]
    fn parses_plain_rich_and_phonetic_items() {
        let xml = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="5" uniqueCount="3">
  <si><t>Hello</t></si>
  <si><r><rPr><b/><sz val="11"/></rPr><t>Bold</t></r><r><t xml:space="preserve"> tail</t></r></si>
  <si><t>東京</t><rPh sb="0" eb="2"><t>トウキョウ</t></rPh></si>
</sst>"#;
        let model =
            parse_part(&mut SharedStringsXform::default(), xml.as_bytes(), "sst").unwrap();
        assert_eq!(model.count, 5);
        assert_eq!(model.values[0], SharedString::Text("Hello".into()));
        assert_eq!(model.values[2], SharedString::Text("東京".into()));
        let SharedString::Rich(rich) = &model.values[1] else {
            panic!("expected rich text, got {:?}", model.values[1]);
        };
        assert_eq!(rich.plain_text(), "Bold tail");
        assert!(rich.runs[0].font.as_ref().is_some_and(|f| f.bold));
        assert_eq!(rich.runs[1].font, None);
    }

    #[test]
    fn empty_item_keeps_its_slot() {
        let xml = "<sst><si/><si><t>b</t></si></sst>";
        let model =
            parse_part(&mut SharedStringsXform::default(), xml.as_bytes(), "sst").unwrap();
        assert_eq!(
            model.values,
            vec![SharedString::Text(String::new()), SharedString::Text("b".into())]
        );
    }

    #[test]
    fn rich_item_renders_runs() {
        let rich = RichText::new(vec![
            RichTextRun::styled(
                "x",
                Font {
                    italic: true,
                    ..Font::default()
                },
            ),
            RichTextRun::plain("y"),
        ]);
        let xml = SharedStringXform::new("is").to_xml(&SharedString::Rich(rich));
        assert_eq!(xml, "<is><r><rPr><i/></rPr><t>x</t></r><r><t>y</t></r></is>");
    }
}
