//! Shapes a finished working tree into what the caller asked for.

use pd_dom::Document;
use pd_dom::Element;
use pd_dom::NodeId;
use pd_html::MarkupSerializer;
use pd_html::SerializeScope;
use pd_html::inner_html;
use pd_html::outer_html;
use serde_json::Value;

use crate::SanitizeOptions;
use crate::acquire::Input;
use crate::acquire::WorkingTree;

/// A hardened tree handed over to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedTree {
    pub document: Document,
    /// The `body` in fragment mode, the `html` element in whole-document mode.
    pub root: NodeId,
}

impl SanitizedTree {
    pub fn root_element(&self) -> Option<&Element> {
        self.document.element(self.root)
    }

    pub fn outer_html(&self) -> String {
        outer_html(&self.document, self.root)
    }

    pub fn inner_html(&self) -> String {
        inner_html(&self.document, self.root)
    }
}

/// Result of a sanitize call.
#[derive(Debug, Clone, PartialEq)]
pub enum Sanitized<'a> {
    Markup(String),
    /// `None` when no tree could be built from the input.
    Tree(Option<SanitizedTree>),
    /// The host cannot parse safely and has no static fallback; the input
    /// is handed back as given.
    Untouched(Input<'a>),
}

impl Sanitized<'_> {
    /// Markup output, including untouched string input.
    pub fn as_markup(&self) -> Option<&str> {
        match self {
            Self::Markup(markup) => Some(markup.as_str()),
            Self::Untouched(Input::Markup(markup)) => Some(*markup),
            Self::Untouched(Input::Value(Value::String(markup))) => Some(markup.as_str()),
            Self::Tree(_) | Self::Untouched(_) => None,
        }
    }

    pub fn into_markup(self) -> Option<String> {
        match self {
            Self::Markup(markup) => Some(markup),
            other => other.as_markup().map(str::to_owned),
        }
    }

    pub fn as_tree(&self) -> Option<&SanitizedTree> {
        match self {
            Self::Tree(tree) => tree.as_ref(),
            Self::Markup(_) | Self::Untouched(_) => None,
        }
    }

    pub fn into_tree(self) -> Option<SanitizedTree> {
        match self {
            Self::Tree(tree) => tree,
            Self::Markup(_) | Self::Untouched(_) => None,
        }
    }
}

pub(crate) fn project<'a>(
    tree: Option<WorkingTree>,
    options: &SanitizeOptions,
    serializer: &dyn MarkupSerializer,
) -> Sanitized<'a> {
    let Some(tree) = tree else {
        return if options.return_tree {
            Sanitized::Tree(None)
        } else {
            Sanitized::Markup(String::new())
        };
    };

    if options.return_tree {
        return Sanitized::Tree(Some(SanitizedTree {
            document: tree.document,
            root: tree.root,
        }));
    }

    let scope = if options.whole_document {
        SerializeScope::Outer
    } else {
        SerializeScope::Inner
    };
    Sanitized::Markup(serializer.serialize(&tree.document, tree.root, scope))
}

#[cfg(test)]
mod tests {
    use pd_dom::Document;
    use pd_html::HtmlSerializer;
    use serde_json::json;

    use super::Sanitized;
    use super::project;
    use crate::SanitizeOptions;
    use crate::acquire::Input;
    use crate::acquire::WorkingTree;

    fn shell_tree() -> WorkingTree {
        let mut document = Document::html_shell();
        let Some(body) = document.body() else {
            panic!("shell has no body");
        };
        assert!(document.append_text(body, "x").is_ok());
        WorkingTree {
            document,
            root: body,
        }
    }

    #[test]
    fn fragment_mode_drops_the_wrapper() {
        let out = project(Some(shell_tree()), &SanitizeOptions::default(), &HtmlSerializer);
        assert_eq!(out, Sanitized::Markup("x".to_owned()));
    }

    #[test]
    fn whole_document_keeps_the_root_tag() {
        let options = SanitizeOptions::default().with_whole_document(true);
        let out = project(Some(shell_tree()), &options, &HtmlSerializer);
        assert_eq!(out.as_markup(), Some("<body>x</body>"));
    }

    #[test]
    fn missing_root_is_empty_or_none() {
        let out = project(None, &SanitizeOptions::default(), &HtmlSerializer);
        assert_eq!(out.into_markup(), Some(String::new()));

        let options = SanitizeOptions::default().with_return_tree(true);
        let out = project(None, &options, &HtmlSerializer);
        assert_eq!(out, Sanitized::Tree(None));
    }

    #[test]
    fn tree_output_hands_over_the_document() {
        let options = SanitizeOptions::default().with_return_tree(true);
        let out = project(Some(shell_tree()), &options, &HtmlSerializer);
        let Some(tree) = out.as_tree() else {
            panic!("expected a tree");
        };
        assert_eq!(tree.root_element().map(|el| el.local_name()), Some("body"));
        assert_eq!(tree.inner_html(), "x");
        assert!(out.as_markup().is_none());
    }

    #[test]
    fn untouched_string_input_reads_as_markup() {
        let value = json!("<b>");
        assert_eq!(Sanitized::Untouched(Input::Value(&value)).as_markup(), Some("<b>"));
        assert_eq!(Sanitized::Untouched(Input::Markup("<i>")).into_markup(), Some("<i>".to_owned()));
    }
}
