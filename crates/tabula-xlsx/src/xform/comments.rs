//! Legacy cell notes: `xl/commentsN.xml` and the VML drawing that anchors
//! them.

use tabula_model::{CellRef, Comment, RichText};

use crate::sax::SaxNode;
use crate::xml_stream::XmlStream;
use crate::XlsxError;

use super::strings::{SharedString, SharedStringXform};
use super::style::NS_MAIN;
use super::Xform;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentModel {
    pub address: CellRef,
    pub comment: Comment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Root,
    Authors,
    Author,
    List,
    Comment,
    Text,
}

/// `comments` part: an author table plus one entry per annotated cell.
pub struct CommentsXform {
    model: Option<Vec<CommentModel>>,
    authors: Vec<String>,
    author_text: String,
    section: Section,
    current: Option<(CellRef, u32)>,
    text: SharedStringXform,
    skip_depth: usize,
}

impl Default for CommentsXform {
    fn default() -> Self {
        Self {
            model: None,
            authors: Vec::new(),
            author_text: String::new(),
            section: Section::Root,
            current: None,
            text: SharedStringXform::new("text"),
            skip_depth: 0,
        }
    }
}

fn shared_to_rich(value: SharedString) -> RichText {
    match value {
        SharedString::Text(text) => RichText::from(text.as_str()),
        SharedString::Rich(rich) => rich,
    }
}

impl Xform for CommentsXform {
    type Model = Vec<CommentModel>;

    fn tag(&self) -> &str {
        "comments"
    }

    fn render(&self, xml: &mut XmlStream, model: &Vec<CommentModel>) {
        let mut authors: Vec<&str> = Vec::new();
        for c in model {
            let author = c.comment.author.as_deref().unwrap_or("");
            if !authors.contains(&author) {
                authors.push(author);
            }
        }

        xml.open_xml();
        xml.open_node("comments");
        xml.add_attribute("xmlns", NS_MAIN);
        xml.open_node("authors");
        for author in &authors {
            xml.leaf_node("author", &[], Some(author));
        }
        xml.close_node();
        xml.open_node("commentList");
        for c in model {
            let author = c.comment.author.as_deref().unwrap_or("");
            let author_id = authors.iter().position(|a| *a == author).unwrap_or(0);
            xml.open_node("comment");
            xml.add_attribute("ref", &c.address.to_a1());
            xml.add_attribute_display("authorId", author_id);
            self.text
                .render(xml, &SharedString::from_rich_text(&c.comment.text));
            xml.close_node();
        }
        xml.close_node();
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return Ok(true);
        }
        if self.section == Section::Text {
            if !self.text.parse_open(node)? {
                self.skip_depth = 1;
            }
            return Ok(true);
        }
        if self.model.is_none() {
            if node.name != "comments" {
                return Ok(false);
            }
            self.model = Some(Vec::new());
            return Ok(true);
        }
        match (self.section, node.name.as_str()) {
            (Section::Root, "authors") => self.section = Section::Authors,
            (Section::Authors, "author") => {
                self.author_text.clear();
                self.section = Section::Author;
            }
            (Section::Root, "commentList") => self.section = Section::List,
            (Section::List, "comment") => {
                let reference = node.attr("ref").unwrap_or_default();
                let address = CellRef::from_a1(reference)
                    .map_err(|_| XlsxError::InvalidAddress(reference.to_string()))?;
                self.current = Some((address, node.attr_u32("authorId").unwrap_or(0)));
                self.section = Section::Comment;
            }
            (Section::Comment, "text") => {
                self.text.parse_open(node)?;
                self.section = Section::Text;
            }
            _ => self.skip_depth = 1,
        }
        Ok(true)
    }

    fn parse_text(&mut self, text: &str) {
        if self.skip_depth > 0 {
            return;
        }
        match self.section {
            Section::Author => self.author_text.push_str(text),
            Section::Text => self.text.parse_text(text),
            _ => {}
        }
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(true);
        }
        match self.section {
            Section::Text => {
                if !self.text.parse_close(name)? {
                    let text = self.text.take_model().map(shared_to_rich).unwrap_or_default();
                    if let (Some((address, author_id)), Some(model)) =
                        (self.current, self.model.as_mut())
                    {
                        let author = self
                            .authors
                            .get(author_id as usize)
                            .filter(|a| !a.is_empty())
                            .cloned();
                        model.push(CommentModel {
                            address,
                            comment: Comment { author, text },
                        });
                    }
                    self.section = Section::Comment;
                }
            }
            Section::Author => {
                self.authors.push(std::mem::take(&mut self.author_text));
                self.section = Section::Authors;
            }
            Section::Authors | Section::List => self.section = Section::Root,
            Section::Comment => {
                self.current = None;
                self.section = Section::List;
            }
            Section::Root => return Ok(name != "comments"),
        }
        Ok(true)
    }

    fn take_model(&mut self) -> Option<Vec<CommentModel>> {
        self.model.take()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Render the legacy VML drawing that makes notes visible in Excel. One
/// hidden shape per comment, anchored next to its cell.
pub fn render_vml(comments: &[CommentModel]) -> String {
    let mut xml = XmlStream::new();
    xml.open_node_with(
        "xml",
        &[
            ("xmlns:v", "urn:schemas-microsoft-com:vml"),
            ("xmlns:o", "urn:schemas-microsoft-com:office:office"),
            ("xmlns:x", "urn:schemas-microsoft-com:office:excel"),
        ],
    );
    xml.open_node_with("o:shapelayout", &[("v:ext", "edit")]);
    xml.leaf_node("o:idmap", &[("v:ext", "edit"), ("data", "1")], None);
    xml.close_node();

    xml.open_node_with(
        "v:shapetype",
        &[
            ("id", "_x0000_t202"),
            ("coordsize", "21600,21600"),
            ("o:spt", "202"),
            ("path", "m,l,21600r21600,l21600,xe"),
        ],
    );
    xml.leaf_node("v:stroke", &[("joinstyle", "miter")], None);
    xml.leaf_node(
        "v:path",
        &[("gradientshapeok", "t"), ("o:connecttype", "rect")],
        None,
    );
    xml.close_node();

    for (i, c) in comments.iter().enumerate() {
        let id = format!("_x0000_s{}", 1025 + i);
        xml.open_node_with(
            "v:shape",
            &[
                ("id", id.as_str()),
                ("type", "#_x0000_t202"),
                (
                    "style",
                    "position:absolute;margin-left:59.25pt;margin-top:1.5pt;width:108pt;height:59.25pt;z-index:1;visibility:hidden",
                ),
                ("fillcolor", "#ffffe1"),
                ("o:insetmode", "auto"),
            ],
        );
        xml.leaf_node("v:fill", &[("color2", "#ffffe1")], None);
        xml.leaf_node(
            "v:shadow",
            &[("on", "t"), ("color", "black"), ("obscured", "t")],
            None,
        );
        xml.leaf_node("v:path", &[("o:connecttype", "none")], None);
        xml.open_node_with("v:textbox", &[("style", "mso-direction-alt:auto")]);
        xml.leaf_node("div", &[("style", "text-align:left")], None);
        xml.close_node();

        // Anchor columns/rows are zero-based.
        let col = c.address.col - 1;
        let row = c.address.row - 1;
        let anchor = format!("{}, 15, {}, 2, {}, 15, {}, 16", col + 1, row, col + 3, row + 3);
        xml.open_node_with("x:ClientData", &[("ObjectType", "Note")]);
        xml.leaf_node("x:MoveWithCells", &[], None);
        xml.leaf_node("x:SizeWithCells", &[], None);
        xml.leaf_node("x:Anchor", &[], Some(&anchor));
        xml.leaf_node("x:AutoFill", &[], Some("False"));
        xml.leaf_node("x:Row", &[], Some(&row.to_string()));
        xml.leaf_node("x:Column", &[], Some(&col.to_string()));
        xml.close_node();
        xml.close_node();
    }
    xml.into_string()
}
