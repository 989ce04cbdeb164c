//! HTML parsing and serialization boundaries.
//!
//! The engine only talks to [`MarkupParser`] and [`MarkupSerializer`]; the
//! [`HtmlParser`] and [`HtmlSerializer`] here are the built-in
//! implementations.

mod serialize;
mod tokenizer;
mod tree_builder;

use pd_core::PdError;
use pd_core::PdResult;
use pd_dom::Document;
use pd_dom::NodeId;
use tracing::debug;

use crate::tree_builder::TreeBuilder;

/// Nesting limit applied by [`HtmlParser::default`].
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Turns markup into a tree.
pub trait MarkupParser: Send + Sync {
    /// Parses a complete document, synthesizing `html`, `head` and `body`.
    fn parse_document(&self, markup: &str) -> PdResult<Document>;

    /// Parses `markup` as the children of `context`, appending them in place.
    fn parse_fragment(
        &self,
        markup: &str,
        document: &mut Document,
        context: NodeId,
    ) -> PdResult<()>;
}

/// Which part of a node ends up in serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeScope {
    /// The node itself, like `outerHTML`.
    Outer,
    /// Only its children, like `innerHTML`.
    Inner,
}

/// Turns a tree back into markup.
pub trait MarkupSerializer: Send + Sync {
    fn serialize(&self, document: &Document, node: NodeId, scope: SerializeScope) -> String;
}

/// Built-in forgiving HTML parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtmlParser {
    max_depth: usize,
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl HtmlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document parsing fails beyond `max_depth` open elements; fragment
    /// parsing keeps going and appends deeper elements as siblings.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl MarkupParser for HtmlParser {
    fn parse_document(&self, markup: &str) -> PdResult<Document> {
        let mut document = Document::new();
        TreeBuilder::for_document(&mut document, self.max_depth).run(markup)?;
        debug!(
            bytes = markup.len(),
            nodes = document.node_count(),
            "parsed html document"
        );
        Ok(document)
    }

    fn parse_fragment(
        &self,
        markup: &str,
        document: &mut Document,
        context: NodeId,
    ) -> PdResult<()> {
        if document.element(context).is_none() {
            return Err(PdError::hierarchy(
                "fragment context must be an element of the target document",
            ));
        }
        let before = document.node_count();
        TreeBuilder::for_fragment(document, context, self.max_depth).run(markup)?;
        debug!(
            bytes = markup.len(),
            nodes = document.node_count().saturating_sub(before),
            "parsed html fragment"
        );
        Ok(())
    }
}

/// Built-in HTML serializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HtmlSerializer;

impl MarkupSerializer for HtmlSerializer {
    fn serialize(&self, document: &Document, node: NodeId, scope: SerializeScope) -> String {
        let mut out = String::new();
        match scope {
            SerializeScope::Outer => serialize::write_node(document, node, &mut out),
            SerializeScope::Inner => serialize::write_children(document, node, &mut out),
        }
        out
    }
}

pub fn outer_html(document: &Document, node: NodeId) -> String {
    HtmlSerializer.serialize(document, node, SerializeScope::Outer)
}

pub fn inner_html(document: &Document, node: NodeId) -> String {
    HtmlSerializer.serialize(document, node, SerializeScope::Inner)
}
