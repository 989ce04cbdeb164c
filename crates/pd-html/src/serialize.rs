//! HTML fragment serialization.

use pd_dom::Document;
use pd_dom::Namespace;
use pd_dom::NodeData;
use pd_dom::NodeId;

use crate::tree_builder::is_void;

enum Step {
    Open(NodeId),
    Close(NodeId),
}

pub(crate) fn write_children(document: &Document, parent: NodeId, out: &mut String) {
    let mut stack: Vec<Step> = Vec::new();
    push_children(document, parent, &mut stack);
    drain(document, &mut stack, out);
}

pub(crate) fn write_node(document: &Document, node: NodeId, out: &mut String) {
    let mut stack = vec![Step::Open(node)];
    drain(document, &mut stack, out);
}

fn drain(document: &Document, stack: &mut Vec<Step>, out: &mut String) {
    while let Some(step) = stack.pop() {
        match step {
            Step::Open(id) => open(document, id, stack, out),
            Step::Close(id) => {
                if let Some(element) = document.element(id) {
                    out.push_str("</");
                    out.push_str(element.local_name());
                    out.push('>');
                }
            }
        }
    }
}

fn open(document: &Document, id: NodeId, stack: &mut Vec<Step>, out: &mut String) {
    let Some(data) = document.data(id) else {
        return;
    };

    match data {
        NodeData::Document => push_children(document, id, stack),
        NodeData::Doctype { name } => {
            out.push_str("<!DOCTYPE ");
            out.push_str(name);
            out.push('>');
        }
        NodeData::Element(element) => {
            out.push('<');
            out.push_str(element.local_name());
            for (name, value) in element.attributes() {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_attribute(value, out);
                out.push('"');
            }
            out.push('>');

            let html = element.namespace() == Namespace::Html;
            if html && is_void(element.local_name()) {
                return;
            }
            // A parser never leaves `plaintext`, so an end tag would come back as text.
            if !(html && element.local_name() == "plaintext") {
                stack.push(Step::Close(id));
            }
            push_children(document, id, stack);
        }
        NodeData::Text(text) => {
            if parent_is_raw_text(document, id) {
                out.push_str(text);
            } else {
                escape_text(text, out);
            }
        }
        NodeData::Comment(data) => {
            out.push_str("<!--");
            out.push_str(data);
            out.push_str("-->");
        }
        NodeData::ProcessingInstruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            out.push(' ');
            out.push_str(data);
            out.push('>');
        }
    }
}

fn push_children(document: &Document, parent: NodeId, stack: &mut Vec<Step>) {
    let children: Vec<NodeId> = document.children(parent).collect();
    stack.extend(children.into_iter().rev().map(Step::Open));
}

fn parent_is_raw_text(document: &Document, id: NodeId) -> bool {
    document
        .parent(id)
        .and_then(|parent| document.element(parent))
        .is_some_and(|parent| {
            parent.namespace() == Namespace::Html
                && matches!(
                    parent.local_name(),
                    "style"
                        | "script"
                        | "xmp"
                        | "iframe"
                        | "noembed"
                        | "noframes"
                        | "plaintext"
                )
        })
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}
