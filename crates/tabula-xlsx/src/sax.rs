//! Token stream over a SpreadsheetML part.
//!
//! Wraps `quick_xml` and reduces its event vocabulary to element opens (with
//! unescaped attributes), text and element closes, with `_xHHHH_` escapes in
//! text decoded. The input may arrive in arbitrary chunks; tokens are
//! identical regardless of where the chunk boundaries fall.

use std::io::{self, BufRead, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::xml_stream::decode_xstring;
use crate::XlsxError;

/// An element open with its attributes.
///
/// `name` is the local name (`c`, `row`); attribute keys keep their prefix
/// (`r:id`, `xml:space`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaxNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl SaxNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute by local name, ignoring any namespace prefix.
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.rsplit(':').next() == Some(local))
            .map(|(_, v)| v.as_str())
    }

    /// The relationship id attribute (`r:id` under any prefix).
    pub fn rel_id(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| matches!(k.split_once(':'), Some((_, "id"))))
            .map(|(_, v)| v.as_str())
    }

    pub fn attr_u32(&self, key: &str) -> Option<u32> {
        self.attr(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attr(key).and_then(|v| v.trim().parse().ok())
    }

    /// OOXML boolean: `1`/`true` or `0`/`false`; `None` when absent.
    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        self.attr(key).map(parse_xml_bool)
    }
}

pub(crate) fn parse_xml_bool(v: &str) -> bool {
    matches!(v.trim(), "1" | "true" | "TRUE" | "True")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaxEvent {
    Open(SaxNode),
    Text(String),
    Close(String),
}

/// Pull parser producing [`SaxEvent`]s.
pub struct SaxReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    depth: usize,
    seen_root: bool,
    part: String,
}

impl<R: BufRead> SaxReader<R> {
    pub fn new(reader: R, part: &str) -> Self {
        let mut reader = Reader::from_reader(reader);
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;
        Self {
            reader,
            buf: Vec::new(),
            depth: 0,
            seen_root: false,
            part: part.to_string(),
        }
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    /// Byte offset of the parser in the input.
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn xml_err(&self, source: quick_xml::Error) -> XlsxError {
        XlsxError::Xml {
            part: self.part.clone(),
            position: self.reader.error_position() as u64,
            source,
        }
    }

    /// Next token, `Ok(None)` at end of input.
    pub fn next_event(&mut self) -> Result<Option<SaxEvent>, XlsxError> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(err) => return Err(self.xml_err(err)),
            };
            let out = match event {
                Event::Start(e) => {
                    let node = match read_node(&e) {
                        Ok(node) => node,
                        Err(err) => return Err(self.xml_err(err)),
                    };
                    if self.depth == 0 && self.seen_root {
                        return Err(XlsxError::malformed(
                            &self.part,
                            format!("second root element <{}>", node.name),
                        ));
                    }
                    self.depth += 1;
                    self.seen_root = true;
                    SaxEvent::Open(node)
                }
                Event::End(e) => {
                    self.depth = self.depth.saturating_sub(1);
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    SaxEvent::Close(name)
                }
                Event::Text(t) => {
                    let text = match t.unescape() {
                        Ok(text) => decode_xstring(&text).into_owned(),
                        Err(err) => return Err(self.xml_err(err)),
                    };
                    if self.depth == 0 {
                        if text.trim().is_empty() {
                            continue;
                        }
                        return Err(XlsxError::malformed(
                            &self.part,
                            format!(
                                "text outside the root element at byte {}",
                                self.reader.buffer_position()
                            ),
                        ));
                    }
                    SaxEvent::Text(text)
                }
                Event::CData(c) => {
                    if self.depth == 0 {
                        continue;
                    }
                    SaxEvent::Text(String::from_utf8_lossy(&c.into_inner()).into_owned())
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(XlsxError::malformed(
                            &self.part,
                            "unexpected end of document",
                        ));
                    }
                    return Ok(None);
                }
                Event::Empty(_)
                | Event::Decl(_)
                | Event::PI(_)
                | Event::Comment(_)
                | Event::DocType(_) => continue,
            };
            return Ok(Some(out));
        }
    }

    /// Skip the subtree of the element just opened, leaving the reader after
    /// its close tag.
    pub fn skip_subtree(&mut self) -> Result<(), XlsxError> {
        let target = self.depth.saturating_sub(1);
        while self.depth > target {
            if self.next_event()?.is_none() {
                break;
            }
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for SaxReader<R> {
    type Item = Result<SaxEvent, XlsxError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

fn read_node(e: &BytesStart<'_>) -> Result<SaxNode, quick_xml::Error> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(SaxNode { name, attributes })
}

/// Adapts an iterator of byte chunks into a reader so callers can feed a
/// part as it arrives.
pub struct ChunkReader<I> {
    chunks: I,
    current: Vec<u8>,
    pos: usize,
}

impl<I, C> ChunkReader<I>
where
    I: Iterator<Item = C>,
    C: AsRef<[u8]>,
{
    pub fn new(chunks: I) -> Self {
        Self {
            chunks,
            current: Vec::new(),
            pos: 0,
        }
    }
}

impl<I, C> Read for ChunkReader<I>
where
    I: Iterator<Item = C>,
    C: AsRef<[u8]>,
{
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.current.len() {
            match self.chunks.next() {
                Some(chunk) => {
                    self.current.clear();
                    self.current.extend_from_slice(chunk.as_ref());
                    self.pos = 0;
                }
                None => return Ok(0),
            }
        }
        let n = out.len().min(self.current.len() - self.pos);
        out[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
