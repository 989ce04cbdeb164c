//! DOM tree data structures.
//!
//! Nodes live in a per-document arena and are addressed by [`NodeId`]. Parent
//! and sibling links are plain indices into the same arena, so a node never
//! owns its parent and the tree cannot form ownership cycles.

mod iter;

pub use iter::NodeIterator;
pub use iter::WhatToShow;

use indexmap::IndexMap;
use pd_core::PdError;
use pd_core::PdResult;

/// ID used to address nodes in the DOM arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Element namespaces the tree builder distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Html,
    Svg,
    MathMl,
}

/// Element payload: name, namespace and insertion-ordered attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    local_name: String,
    namespace: Namespace,
    attributes: IndexMap<String, String>,
}

impl Element {
    pub fn new(local_name: &str, namespace: Namespace) -> Self {
        let local_name = match namespace {
            Namespace::Html => local_name.to_ascii_lowercase(),
            Namespace::Svg | Namespace::MathMl => local_name.to_owned(),
        };

        Self {
            local_name,
            namespace,
            attributes: IndexMap::new(),
        }
    }

    pub fn html(local_name: &str) -> Self {
        Self::new(local_name, Namespace::Html)
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// True for an HTML-namespace element with the given (lowercase) name.
    pub fn is_html(&self, local_name: &str) -> bool {
        self.namespace == Namespace::Html && self.local_name == local_name
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(self.attribute_key(name).as_ref())
            .map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(self.attribute_key(name).as_ref())
    }

    /// Sets an attribute, keeping its position when it already exists.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let key = self.attribute_key(name).into_owned();
        self.attributes.insert(key, value.into());
    }

    /// Adds an attribute only when absent; used by the parser where the first
    /// occurrence of a duplicated attribute wins.
    pub fn add_attribute_if_missing(&mut self, name: &str, value: impl Into<String>) -> bool {
        let key = self.attribute_key(name).into_owned();
        if self.attributes.contains_key(&key) {
            return false;
        }
        self.attributes.insert(key, value.into());
        true
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let key = self.attribute_key(name);
        self.attributes.shift_remove(key.as_ref())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    fn attribute_key<'a>(&self, name: &'a str) -> std::borrow::Cow<'a, str> {
        if self.namespace == Namespace::Html && name.bytes().any(|b| b.is_ascii_uppercase()) {
            std::borrow::Cow::Owned(name.to_ascii_lowercase())
        } else {
            std::borrow::Cow::Borrowed(name)
        }
    }
}

/// Coarse node classification, mirroring DOM `nodeType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Doctype,
    Element,
    Text,
    Comment,
    ProcessingInstruction,
}

/// Payload carried by each node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype { name: String },
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Document => NodeKind::Document,
            Self::Doctype { .. } => NodeKind::Doctype,
            Self::Element(_) => NodeKind::Element,
            Self::Text(_) => NodeKind::Text,
            Self::Comment(_) => NodeKind::Comment,
            Self::ProcessingInstruction { .. } => NodeKind::ProcessingInstruction,
        }
    }

    fn can_have_children(&self) -> bool {
        matches!(self, Self::Document | Self::Element(_))
    }
}

/// One arena slot: payload plus tree links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Arena-backed document. Slot 0 is always the document node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document containing only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeData::Document)],
        }
    }

    /// `#document > html > (head, body)`, the empty shell a parser starts from.
    pub fn html_shell() -> Self {
        let mut document = Self::new();
        let html = document.create_element(Element::html("html"));
        let head = document.create_element(Element::html("head"));
        let body = document.create_element(Element::html("body"));
        document.link_last(document.root(), html);
        document.link_last(html, head);
        document.link_last(html, body);
        document
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.node(id).map(Node::data)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).map(Node::kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id)? {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(id.0).map(|node| &mut node.data)? {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Number of arena slots, including detached nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.allocate(NodeData::Element(element))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.allocate(NodeData::Text(text.into()))
    }

    pub fn create_comment(&mut self, data: impl Into<String>) -> NodeId {
        self.allocate(NodeData::Comment(data.into()))
    }

    pub fn create_doctype(&mut self, name: impl Into<String>) -> NodeId {
        self.allocate(NodeData::Doctype { name: name.into() })
    }

    pub fn create_processing_instruction(
        &mut self,
        target: impl Into<String>,
        data: impl Into<String>,
    ) -> NodeId {
        self.allocate(NodeData::ProcessingInstruction {
            target: target.into(),
            data: data.into(),
        })
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.first_child
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.last_child
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.next_sibling
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.prev_sibling
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            document: self,
            next: self.first_child(id),
        }
    }

    /// Pre-order walk of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            document: self,
            root: id,
            next: self.contains(id).then_some(id),
        }
    }

    /// The node after `id` in pre-order, staying inside the subtree at `root`.
    pub fn following(&self, id: NodeId, root: NodeId) -> Option<NodeId> {
        if let Some(child) = self.first_child(id) {
            return Some(child);
        }

        let mut current = id;
        loop {
            if current == root {
                return None;
            }
            if let Some(sibling) = self.next_sibling(current) {
                return Some(sibling);
            }
            current = self.parent(current)?;
        }
    }

    /// True when `ancestor` is `id` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Appends `child` as the last child of `parent`, detaching it first when
    /// it is already attached somewhere else.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> PdResult<()> {
        let parent_data = self
            .data(parent)
            .ok_or_else(|| PdError::hierarchy(format!("unknown parent node {}", parent.0)))?;
        if !parent_data.can_have_children() {
            return Err(PdError::hierarchy(format!(
                "{:?} nodes cannot have children",
                parent_data.kind()
            )));
        }

        let child_kind = self
            .kind(child)
            .ok_or_else(|| PdError::hierarchy(format!("unknown child node {}", child.0)))?;
        if child_kind == NodeKind::Document {
            return Err(PdError::hierarchy("a document cannot be inserted as a child"));
        }

        if self.is_inclusive_ancestor(child, parent) {
            return Err(PdError::hierarchy(
                "a node cannot be appended inside its own subtree",
            ));
        }

        self.detach(child);
        self.link_last(parent, child);
        Ok(())
    }

    /// Appends text under `parent`, merging with a trailing text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> PdResult<()> {
        if text.is_empty() {
            return Ok(());
        }

        if let Some(last) = self.last_child(parent) {
            if let Some(Node {
                data: NodeData::Text(existing),
                ..
            }) = self.nodes.get_mut(last.0)
            {
                existing.push_str(text);
                return Ok(());
            }
        }

        let node = self.create_text(text);
        self.append_child(parent, node)
    }

    /// Unlinks `id` from its parent. The node stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        let Some(node) = self.node(id) else {
            return;
        };
        let Some(parent) = node.parent else {
            return;
        };
        let prev = node.prev_sibling;
        let next = node.next_sibling;

        match prev {
            Some(prev) => self.nodes[prev.0].next_sibling = next,
            None => self.nodes[parent.0].first_child = next,
        }
        match next {
            Some(next) => self.nodes[next.0].prev_sibling = prev,
            None => self.nodes[parent.0].last_child = prev,
        }

        let node = &mut self.nodes[id.0];
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    /// Replaces `old` (attached) with `new` (detached or attached elsewhere).
    pub fn replace_child(&mut self, old: NodeId, new: NodeId) -> PdResult<()> {
        let parent = self
            .parent(old)
            .ok_or_else(|| PdError::hierarchy("replaced node has no parent"))?;
        if old == new {
            return Ok(());
        }
        if !self.contains(new) || self.is_inclusive_ancestor(new, parent) {
            return Err(PdError::hierarchy("replacement would create a cycle"));
        }

        self.detach(new);
        let prev = self.prev_sibling(old);
        let next = self.next_sibling(old);
        self.detach(old);

        match prev {
            Some(prev) => self.nodes[prev.0].next_sibling = Some(new),
            None => self.nodes[parent.0].first_child = Some(new),
        }
        match next {
            Some(next) => self.nodes[next.0].prev_sibling = Some(new),
            None => self.nodes[parent.0].last_child = Some(new),
        }

        let node = &mut self.nodes[new.0];
        node.parent = Some(parent);
        node.prev_sibling = prev;
        node.next_sibling = next;
        Ok(())
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .find(|id| self.kind(*id) == Some(NodeKind::Element))
    }

    pub fn head(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .find(|id| self.element(*id).is_some_and(|el| el.is_html("head")))
    }

    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .find(|id| self.element(*id).is_some_and(|el| el.is_html("body")))
    }

    /// First HTML element named `local_name` at or below `scope`, in document order.
    pub fn first_element_by_name(&self, scope: NodeId, local_name: &str) -> Option<NodeId> {
        self.descendants(scope)
            .find(|id| self.element(*id).is_some_and(|el| el.is_html(local_name)))
    }

    /// Concatenated text of all text nodes under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(NodeData::Text(text)) = self.data(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// Deep-copies `node` out of `source` into this document and returns the
    /// detached copy.
    pub fn import_node(&mut self, source: &Document, node: NodeId) -> PdResult<NodeId> {
        let data = source
            .data(node)
            .ok_or_else(|| PdError::hierarchy(format!("unknown source node {}", node.0)))?;
        if data.kind() == NodeKind::Document {
            return Err(PdError::hierarchy("document nodes cannot be imported"));
        }

        let copy = self.allocate(data.clone());
        let mut pending = vec![(node, copy)];
        while let Some((source_parent, copy_parent)) = pending.pop() {
            for source_child in source.children(source_parent) {
                let Some(child_data) = source.data(source_child) else {
                    continue;
                };
                let child_copy = self.allocate(child_data.clone());
                self.link_last(copy_parent, child_copy);
                pending.push((source_child, child_copy));
            }
        }

        Ok(copy)
    }

    fn allocate(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node::new(data));
        NodeId(self.nodes.len() - 1)
    }

    fn link_last(&mut self, parent: NodeId, child: NodeId) {
        let old_last = self.nodes[parent.0].last_child;
        match old_last {
            Some(last) => self.nodes[last.0].next_sibling = Some(child),
            None => self.nodes[parent.0].first_child = Some(child),
        }
        self.nodes[parent.0].last_child = Some(child);

        let node = &mut self.nodes[child.0];
        node.parent = Some(parent);
        node.prev_sibling = old_last;
        node.next_sibling = None;
    }
}

/// Iterator over the direct children of a node.
#[derive(Debug, Clone)]
pub struct Children<'a> {
    document: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.document.next_sibling(current);
        Some(current)
    }
}

/// Borrowing pre-order iterator over a subtree.
#[derive(Debug, Clone)]
pub struct Descendants<'a> {
    document: &'a Document,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.document.following(current, self.root);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::Document;
    use super::Element;
    use super::Namespace;
    use super::NodeData;
    use super::NodeKind;

    #[test]
    fn html_shell_has_head_and_body() {
        let doc = Document::html_shell();
        assert!(doc.document_element().is_some());
        assert!(doc.head().is_some());
        assert!(doc.body().is_some());
        assert_eq!(doc.node_count(), 4);
    }

    #[test]
    fn set_attribute_keeps_insertion_order() {
        let mut el = Element::html("a");
        el.set_attribute("href", "/x");
        el.set_attribute("rel", "nofollow");
        el.set_attribute("href", "/y");
        let attrs = el.attributes().collect::<Vec<_>>();
        assert_eq!(attrs, vec![("href", "/y"), ("rel", "nofollow")]);
    }

    #[test]
    fn html_attribute_names_are_case_insensitive() {
        let mut el = Element::html("A");
        el.set_attribute("referrerPolicy", "no-referrer");
        assert_eq!(el.local_name(), "a");
        assert_eq!(el.get_attribute("referrerpolicy"), Some("no-referrer"));
        assert!(el.has_attribute("REFERRERPOLICY"));
        assert_eq!(el.remove_attribute("ReferrerPolicy").as_deref(), Some("no-referrer"));
        assert_eq!(el.attribute_count(), 0);
    }

    #[test]
    fn foreign_attribute_names_keep_case() {
        let mut el = Element::new("linearGradient", Namespace::Svg);
        el.set_attribute("gradientUnits", "userSpaceOnUse");
        assert_eq!(el.local_name(), "linearGradient");
        assert!(el.has_attribute("gradientUnits"));
        assert!(!el.has_attribute("gradientunits"));
    }

    #[test]
    fn first_duplicate_attribute_wins() {
        let mut el = Element::html("a");
        assert!(el.add_attribute_if_missing("href", "first"));
        assert!(!el.add_attribute_if_missing("href", "second"));
        assert_eq!(el.get_attribute("href"), Some("first"));
    }

    #[test]
    fn append_child_rejects_cycles_and_leaf_parents() {
        let mut doc = Document::new();
        let outer = doc.create_element(Element::html("div"));
        let inner = doc.create_element(Element::html("span"));
        let text = doc.create_text("hi");
        assert!(doc.append_child(doc.root(), outer).is_ok());
        assert!(doc.append_child(outer, inner).is_ok());
        assert!(doc.append_child(inner, outer).is_err());
        assert!(doc.append_child(inner, inner).is_err());
        assert!(doc.append_child(text, inner).is_err());
    }

    #[test]
    fn append_child_moves_attached_nodes() {
        let mut doc = Document::new();
        let first = doc.create_element(Element::html("div"));
        let second = doc.create_element(Element::html("div"));
        let moved = doc.create_element(Element::html("p"));
        assert!(doc.append_child(first, moved).is_ok());
        assert!(doc.append_child(second, moved).is_ok());
        assert_eq!(doc.children(first).count(), 0);
        assert_eq!(doc.parent(moved), Some(second));
    }

    #[test]
    fn append_text_merges_adjacent_text() {
        let mut doc = Document::new();
        let p = doc.create_element(Element::html("p"));
        assert!(doc.append_text(p, "a").is_ok());
        assert!(doc.append_text(p, "b").is_ok());
        assert_eq!(doc.children(p).count(), 1);
        assert_eq!(doc.text_content(p), "ab");
    }

    #[test]
    fn detach_and_replace_keep_links_consistent() {
        let mut doc = Document::new();
        let parent = doc.create_element(Element::html("ul"));
        let items = (0..3)
            .map(|_| doc.create_element(Element::html("li")))
            .collect::<Vec<_>>();
        for item in &items {
            assert!(doc.append_child(parent, *item).is_ok());
        }

        doc.detach(items[1]);
        assert_eq!(doc.children(parent).collect::<Vec<_>>(), vec![items[0], items[2]]);
        assert_eq!(doc.prev_sibling(items[2]), Some(items[0]));

        let replacement = doc.create_element(Element::html("li"));
        assert!(doc.replace_child(items[2], replacement).is_ok());
        assert_eq!(doc.last_child(parent), Some(replacement));
        assert_eq!(doc.parent(items[2]), None);
    }

    #[test]
    fn import_node_copies_subtree_without_sharing() {
        let mut source = Document::new();
        let div = source.create_element(Element::html("div"));
        let a = source.create_element(Element::html("a"));
        assert!(source.append_child(source.root(), div).is_ok());
        assert!(source.append_child(div, a).is_ok());
        assert!(source.append_text(a, "link").is_ok());

        let mut target = Document::html_shell();
        let copy = match target.import_node(&source, div) {
            Ok(copy) => copy,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(target.parent(copy), None);
        assert_eq!(target.descendants(copy).count(), 3);

        if let Some(copied_a) = target.first_element_by_name(copy, "a") {
            if let Some(el) = target.element_mut(copied_a) {
                el.set_attribute("target", "_blank");
            }
        }
        assert!(source.element(a).is_some_and(|el| !el.has_attribute("target")));
    }

    #[test]
    fn import_node_rejects_documents() {
        let source = Document::html_shell();
        let mut target = Document::new();
        assert!(target.import_node(&source, source.root()).is_err());
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let mut doc = Document::new();
        let html = doc.create_element(Element::html("html"));
        let head = doc.create_element(Element::html("head"));
        let body = doc.create_element(Element::html("body"));
        let comment = doc.create_comment("c");
        assert!(doc.append_child(doc.root(), html).is_ok());
        assert!(doc.append_child(html, head).is_ok());
        assert!(doc.append_child(html, body).is_ok());
        assert!(doc.append_child(body, comment).is_ok());

        let order = doc.descendants(html).collect::<Vec<_>>();
        assert_eq!(order, vec![html, head, body, comment]);
        assert_eq!(doc.descendants(head).collect::<Vec<_>>(), vec![head]);
        assert!(matches!(doc.data(comment), Some(NodeData::Comment(_))));
        assert_eq!(doc.kind(doc.root()), Some(NodeKind::Document));
    }
}
