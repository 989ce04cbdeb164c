//! Turns caller input into an isolated working tree.

use std::borrow::Cow;

use pd_core::PdError;
use pd_core::PdResult;
use pd_dom::Document;
use pd_dom::NodeId;
use pd_dom::NodeKind;
use pd_html::MarkupParser;
use pd_html::MarkupSerializer;
use pd_html::SerializeScope;
use serde_json::Value;
use tracing::warn;

/// Something to sanitize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input<'a> {
    Markup(&'a str),
    /// A node of a caller-owned document. It is copied, never mutated.
    Node {
        document: &'a Document,
        node: NodeId,
    },
    /// A loosely typed value: strings are markup, `null` is empty, booleans
    /// and numbers are their text. Arrays and objects are rejected.
    Value(&'a Value),
}

impl<'a> Input<'a> {
    pub fn node(document: &'a Document, node: NodeId) -> Self {
        Self::Node { document, node }
    }
}

impl<'a> From<&'a str> for Input<'a> {
    fn from(markup: &'a str) -> Self {
        Self::Markup(markup)
    }
}

impl<'a> From<&'a String> for Input<'a> {
    fn from(markup: &'a String) -> Self {
        Self::Markup(markup.as_str())
    }
}

impl<'a> From<&'a Value> for Input<'a> {
    fn from(value: &'a Value) -> Self {
        Self::Value(value)
    }
}

/// Input after type checks.
#[derive(Debug, Clone)]
pub(crate) enum Source<'a> {
    Markup(Cow<'a, str>),
    Node {
        document: &'a Document,
        node: NodeId,
    },
}

impl<'a> Source<'a> {
    pub(crate) fn from_input(input: Input<'a>) -> PdResult<Self> {
        match input {
            Input::Markup(markup) => Ok(Self::Markup(Cow::Borrowed(markup))),
            Input::Node { document, node } => match document.kind(node) {
                None => Err(PdError::unsupported_input(format!(
                    "node {} does not belong to the given document",
                    node.index()
                ))),
                Some(NodeKind::Document | NodeKind::Doctype) => Err(PdError::unsupported_input(
                    "documents and doctypes cannot be sanitized as content",
                )),
                Some(_) => Ok(Self::Node { document, node }),
            },
            Input::Value(value) => match value {
                Value::String(markup) => Ok(Self::Markup(Cow::Borrowed(markup.as_str()))),
                Value::Null => Ok(Self::Markup(Cow::Borrowed(""))),
                Value::Bool(flag) => Ok(Self::Markup(Cow::Owned(flag.to_string()))),
                Value::Number(number) => Ok(Self::Markup(Cow::Owned(number.to_string()))),
                Value::Array(_) | Value::Object(_) => Err(PdError::unsupported_input(
                    "arrays and objects cannot be sanitized",
                )),
            },
        }
    }

    /// Markup for the static fallback; nodes contribute their outer markup.
    pub(crate) fn to_markup(&self, serializer: &dyn MarkupSerializer) -> String {
        match self {
            Self::Markup(markup) => markup.to_string(),
            Self::Node { document, node } => {
                serializer.serialize(document, *node, SerializeScope::Outer)
            }
        }
    }
}

/// The working tree of one call: a private document and the node rules
/// start from.
#[derive(Debug)]
pub(crate) struct WorkingTree {
    pub(crate) document: Document,
    pub(crate) root: NodeId,
}

/// True when markup can skip parsing entirely.
pub(crate) fn is_plain_text(markup: &str, whole_document: bool, return_tree: bool) -> bool {
    !whole_document && !return_tree && !markup.contains('<')
}

/// Parses markup; `None` when neither the parser nor the fallback produced
/// the requested root.
pub(crate) fn from_markup(
    parser: &dyn MarkupParser,
    markup: &str,
    whole_document: bool,
) -> Option<WorkingTree> {
    let document = match parser.parse_document(markup) {
        Ok(document) if document.document_element().is_some() => document,
        Ok(_) => {
            warn!("parser produced no document element; assigning markup to an empty body");
            assign_to_empty_body(parser, markup)?
        }
        Err(error) => {
            warn!(%error, "parser failed; assigning markup to an empty body");
            assign_to_empty_body(parser, markup)?
        }
    };

    let name = if whole_document { "html" } else { "body" };
    let root = document.first_element_by_name(document.root(), name)?;
    Some(WorkingTree { document, root })
}

fn assign_to_empty_body(parser: &dyn MarkupParser, markup: &str) -> Option<Document> {
    let mut document = Document::html_shell();
    if let Some(head) = document.head() {
        document.detach(head);
    }
    let body = document.body()?;
    match parser.parse_fragment(markup, &mut document, body) {
        Ok(()) => Some(document),
        Err(error) => {
            warn!(%error, "markup assignment failed; no tree to sanitize");
            None
        }
    }
}

/// Deep-imports `node` into a fresh shell. A `body` replaces the shell's
/// body; anything else is appended to it.
pub(crate) fn from_node(
    source: &Document,
    node: NodeId,
    whole_document: bool,
) -> PdResult<WorkingTree> {
    let mut document = Document::html_shell();
    let imported = document.import_node(source, node)?;
    let (Some(html), Some(body)) = (document.document_element(), document.body()) else {
        return Err(PdError::hierarchy("document shell lacks html or body"));
    };

    let is_body = document
        .element(imported)
        .is_some_and(|element| element.is_html("body"));
    let body = if is_body {
        document.replace_child(body, imported)?;
        imported
    } else {
        document.append_child(body, imported)?;
        body
    };

    let root = if whole_document { html } else { body };
    Ok(WorkingTree { document, root })
}
