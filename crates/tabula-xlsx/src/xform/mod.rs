//! Transform nodes: one type per element vocabulary, each able to render a
//! model to XML and rebuild it from the token stream.
//!
//! Parsing is push based. A node receives every token below the element it
//! claimed; composites forward to one active child at a time and harvest
//! the child's model into their own when the child reports it is done.

use std::collections::HashMap;
use std::io::BufRead;

use tabula_model::{CellRef, DateSystem, StyleTable};

use crate::sax::{SaxEvent, SaxNode, SaxReader};
use crate::tables::shared_strings::SharedStringTable;
use crate::tables::styles::StyleManager;
use crate::xml_stream::XmlStream;
use crate::XlsxError;

pub mod book;
pub mod comments;
pub mod package;
pub mod sheet;
pub mod simple;
pub mod strings;
pub mod style;

use self::sheet::HyperlinkModel;
use self::strings::SharedString;

/// State shared by every node while a document is prepared for rendering.
pub struct PrepareContext<'a> {
    pub styles: &'a mut StyleManager,
    /// Styles the cells' `style_id`s refer to.
    pub model_styles: &'a StyleTable,
    /// `None` writes strings inline.
    pub shared_strings: Option<&'a mut SharedStringTable>,
    pub date_system: DateSystem,
    /// Shared formula masters seen so far on the current sheet.
    pub shared_formulas: HashMap<CellRef, u32>,
    /// Hyperlinks collected from cells on the current sheet.
    pub hyperlinks: Vec<HyperlinkModel>,
}

impl<'a> PrepareContext<'a> {
    pub fn new(
        styles: &'a mut StyleManager,
        model_styles: &'a StyleTable,
        shared_strings: Option<&'a mut SharedStringTable>,
        date_system: DateSystem,
    ) -> Self {
        Self {
            styles,
            model_styles,
            shared_strings,
            date_system,
            shared_formulas: HashMap::new(),
            hyperlinks: Vec::new(),
        }
    }
}

/// State used to resolve raw ids after all tables are loaded.
pub struct ReconcileContext<'a> {
    pub styles: &'a mut StyleManager,
    /// Receives the styles referenced by reconciled cells.
    pub model_styles: &'a mut StyleTable,
    /// `None` leaves shared string cells as their raw index.
    pub shared_strings: Option<&'a [SharedString]>,
    pub date_system: DateSystem,
    /// Shared formula index to master cell on the current sheet.
    pub shared_formulas: HashMap<u32, CellRef>,
    /// Relationship id to target for the current sheet.
    pub hyperlink_targets: HashMap<String, String>,
}

impl<'a> ReconcileContext<'a> {
    pub fn new(
        styles: &'a mut StyleManager,
        model_styles: &'a mut StyleTable,
        shared_strings: Option<&'a [SharedString]>,
        date_system: DateSystem,
    ) -> Self {
        Self {
            styles,
            model_styles,
            shared_strings,
            date_system,
            shared_formulas: HashMap::new(),
            hyperlink_targets: HashMap::new(),
        }
    }
}

/// A transform node for one element vocabulary.
pub trait Xform {
    type Model;

    /// The element this node claims.
    fn tag(&self) -> &str;

    /// Make `model` render-ready (style ids, string ids, relationship ids).
    fn prepare(
        &mut self,
        _model: &mut Self::Model,
        _ctx: &mut PrepareContext<'_>,
    ) -> Result<(), XlsxError> {
        Ok(())
    }

    fn render(&self, xml: &mut XmlStream, model: &Self::Model);

    /// Returns whether the element was consumed.
    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError>;

    fn parse_text(&mut self, _text: &str) {}

    /// Returns `false` once the node's own element has closed.
    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError>;

    /// Resolve raw ids captured during parsing.
    fn reconcile(
        &mut self,
        _model: &mut Self::Model,
        _ctx: &mut ReconcileContext<'_>,
    ) -> Result<(), XlsxError> {
        Ok(())
    }

    /// The parsed model, leaving the node ready for the next element.
    fn take_model(&mut self) -> Option<Self::Model>;

    fn reset(&mut self);

    /// Render into a fresh string.
    fn to_xml(&self, model: &Self::Model) -> String {
        let mut xml = XmlStream::new();
        self.render(&mut xml, model);
        xml.into_string()
    }
}

/// Object-safe view of a child node bound to a parent model of type `M`.
pub trait ChildNode<M> {
    fn tag(&self) -> &str;
    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError>;
    fn parse_text(&mut self, text: &str);
    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError>;
    /// Move the finished child model into `parent`.
    fn harvest(&mut self, parent: &mut M);
    fn reset(&mut self);
}

/// A child node plus the setter that stores its model in the parent.
pub struct Bound<X: Xform, M> {
    xform: X,
    assign: fn(&mut M, X::Model),
}

impl<X: Xform, M> ChildNode<M> for Bound<X, M> {
    fn tag(&self) -> &str {
        self.xform.tag()
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.xform.parse_open(node)
    }

    fn parse_text(&mut self, text: &str) {
        self.xform.parse_text(text)
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.xform.parse_close(name)
    }

    fn harvest(&mut self, parent: &mut M) {
        if let Some(model) = self.xform.take_model() {
            (self.assign)(parent, model);
        }
    }

    fn reset(&mut self) {
        self.xform.reset()
    }
}

/// Tag-keyed children of a composite node. At most one child is active;
/// unknown elements are skipped with their whole subtree.
pub struct ChildMap<M> {
    children: Vec<Box<dyn ChildNode<M>>>,
    active: Option<usize>,
    skip_depth: usize,
}

impl<M: 'static> Default for ChildMap<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: 'static> ChildMap<M> {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            active: None,
            skip_depth: 0,
        }
    }

    pub fn with<X>(mut self, xform: X, assign: fn(&mut M, X::Model)) -> Self
    where
        X: Xform + 'static,
    {
        self.children.push(Box::new(Bound { xform, assign }));
        self
    }

    /// True while a child (or a skipped subtree) owns the token stream.
    pub fn is_busy(&self) -> bool {
        self.active.is_some() || self.skip_depth > 0
    }

    pub fn parse_open(&mut self, node: &SaxNode) -> Result<(), XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return Ok(());
        }
        if let Some(idx) = self.active {
            if !self.children[idx].parse_open(node)? {
                self.skip_depth = 1;
            }
            return Ok(());
        }
        let found = self.children.iter().position(|c| c.tag() == node.name);
        match found {
            Some(idx) => {
                if self.children[idx].parse_open(node)? {
                    self.active = Some(idx);
                } else {
                    self.skip_depth = 1;
                }
            }
            None => self.skip_depth = 1,
        }
        Ok(())
    }

    pub fn parse_text(&mut self, text: &str) {
        if self.skip_depth > 0 {
            return;
        }
        if let Some(idx) = self.active {
            self.children[idx].parse_text(text);
        }
    }

    /// Returns `true` when the close belonged to a child or skipped subtree.
    pub fn parse_close(&mut self, name: &str, parent: &mut M) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(true);
        }
        let Some(idx) = self.active else {
            return Ok(false);
        };
        if !self.children[idx].parse_close(name)? {
            self.children[idx].harvest(parent);
            self.active = None;
        }
        Ok(true)
    }

    pub fn reset(&mut self) {
        self.active = None;
        self.skip_depth = 0;
        for child in &mut self.children {
            child.reset();
        }
    }
}

/// Parse state of a composite node: its own model plus the children that
/// fill it in.
pub struct Composite<M> {
    tag: &'static str,
    pub map: ChildMap<M>,
    pub model: Option<M>,
}

impl<M: 'static> Composite<M> {
    pub fn new(tag: &'static str, map: ChildMap<M>) -> Self {
        Self {
            tag,
            map,
            model: None,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// `init` builds the model from the element's own attributes.
    pub fn parse_open(
        &mut self,
        node: &SaxNode,
        init: impl FnOnce(&SaxNode) -> M,
    ) -> Result<bool, XlsxError> {
        if self.map.is_busy() {
            self.map.parse_open(node)?;
            return Ok(true);
        }
        if self.model.is_none() {
            if node.name == self.tag {
                self.model = Some(init(node));
                return Ok(true);
            }
            return Ok(false);
        }
        self.map.parse_open(node)?;
        Ok(true)
    }

    pub fn parse_text(&mut self, text: &str) {
        self.map.parse_text(text);
    }

    pub fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        let Some(model) = self.model.as_mut() else {
            return Ok(false);
        };
        if self.map.parse_close(name, model)? {
            return Ok(true);
        }
        Ok(name != self.tag)
    }

    pub fn take_model(&mut self) -> Option<M> {
        self.model.take()
    }

    pub fn reset(&mut self) {
        self.model = None;
        self.map.reset();
    }
}

/// Repeated child elements under one container (`<cols>`, `<sheetData>`).
pub struct ListXform<X: Xform> {
    tag: &'static str,
    child: X,
    items: Option<Vec<X::Model>>,
    active: bool,
    skip_depth: usize,
    max_items: Option<usize>,
    on_limit: fn(usize) -> XlsxError,
    count: bool,
    render_empty: bool,
}

fn list_limit(max: usize) -> XlsxError {
    XlsxError::malformed("", format!("more than {max} list items"))
}

impl<X: Xform> ListXform<X> {
    pub fn new(tag: &'static str, child: X) -> Self {
        Self {
            tag,
            child,
            items: None,
            active: false,
            skip_depth: 0,
            max_items: None,
            on_limit: list_limit,
            count: false,
            render_empty: false,
        }
    }

    /// Render a `count` attribute.
    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Render the container even when there are no items.
    pub fn render_empty(mut self) -> Self {
        self.render_empty = true;
        self
    }

    /// Fail as soon as more than `max` items are seen.
    pub fn with_max(mut self, max: Option<usize>, on_limit: fn(usize) -> XlsxError) -> Self {
        self.max_items = max;
        self.on_limit = on_limit;
        self
    }

    pub fn child(&self) -> &X {
        &self.child
    }

    pub fn child_mut(&mut self) -> &mut X {
        &mut self.child
    }
}

impl<X: Xform> Xform for ListXform<X> {
    type Model = Vec<X::Model>;

    fn tag(&self) -> &str {
        self.tag
    }

    fn prepare(
        &mut self,
        model: &mut Self::Model,
        ctx: &mut PrepareContext<'_>,
    ) -> Result<(), XlsxError> {
        for item in model.iter_mut() {
            self.child.prepare(item, ctx)?;
        }
        Ok(())
    }

    fn render(&self, xml: &mut XmlStream, model: &Self::Model) {
        if model.is_empty() && !self.render_empty {
            return;
        }
        xml.open_node(self.tag);
        if self.count {
            xml.add_attribute_display("count", model.len());
        }
        for item in model {
            self.child.render(xml, item);
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return Ok(true);
        }
        if self.active {
            if !self.child.parse_open(node)? {
                self.skip_depth = 1;
            }
            return Ok(true);
        }
        let Some(items) = self.items.as_mut() else {
            if node.name == self.tag {
                self.items = Some(Vec::new());
                return Ok(true);
            }
            return Ok(false);
        };
        if node.name == self.child.tag() {
            if let Some(max) = self.max_items {
                if items.len() >= max {
                    return Err((self.on_limit)(max));
                }
            }
            self.active = self.child.parse_open(node)?;
            if !self.active {
                self.skip_depth = 1;
            }
        } else {
            self.skip_depth = 1;
        }
        Ok(true)
    }

    fn parse_text(&mut self, text: &str) {
        if self.active && self.skip_depth == 0 {
            self.child.parse_text(text);
        }
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(true);
        }
        if self.active {
            if !self.child.parse_close(name)? {
                self.active = false;
                if let (Some(items), Some(model)) = (self.items.as_mut(), self.child.take_model())
                {
                    items.push(model);
                }
            }
            return Ok(true);
        }
        Ok(name != self.tag)
    }

    fn reconcile(
        &mut self,
        model: &mut Self::Model,
        ctx: &mut ReconcileContext<'_>,
    ) -> Result<(), XlsxError> {
        for item in model.iter_mut() {
            self.child.reconcile(item, ctx)?;
        }
        Ok(())
    }

    fn take_model(&mut self) -> Option<Self::Model> {
        self.items.take()
    }

    fn reset(&mut self) {
        self.items = None;
        self.active = false;
        self.skip_depth = 0;
        self.child.reset();
    }
}

/// Feed a whole part through `xform`. The root element must be the one the
/// node claims.
pub fn parse_part<X: Xform, R: BufRead>(
    xform: &mut X,
    reader: R,
    part: &str,
) -> Result<X::Model, XlsxError> {
    xform.reset();
    let mut sax = SaxReader::new(reader, part);
    let mut started = false;
    while let Some(event) = sax.next_event()? {
        match event {
            SaxEvent::Open(node) => {
                let consumed = xform.parse_open(&node).map_err(|e| e.in_part(part))?;
                if !started {
                    if !consumed {
                        return Err(XlsxError::malformed(
                            part,
                            format!("unexpected root element <{}>", node.name),
                        ));
                    }
                    started = true;
                }
            }
            SaxEvent::Text(text) => xform.parse_text(&text),
            SaxEvent::Close(name) => {
                if !xform.parse_close(&name).map_err(|e| e.in_part(part))? {
                    return xform
                        .take_model()
                        .ok_or_else(|| XlsxError::malformed(part, "empty document"));
                }
            }
        }
    }
    Err(XlsxError::malformed(part, "missing root element"))
}
