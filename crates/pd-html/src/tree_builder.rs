//! Builds a [`Document`] from the token stream.
//!
//! This is a pragmatic subset of the HTML tree construction rules: implicit
//! `html`/`head`/`body`, head-only elements, implied end tags for `p`, list
//! items and options, nested anchors, void elements, raw text elements and
//! foreign (SVG/MathML) content. Tables and the adoption agency algorithm are
//! not modelled; mis-nested end tags simply pop to the nearest match.

use pd_core::ErrorKind;
use pd_core::PdError;
use pd_core::PdResult;
use pd_dom::Document;
use pd_dom::Element;
use pd_dom::Namespace;
use pd_dom::NodeId;
use tracing::debug;

use crate::tokenizer::TextMode;
use crate::tokenizer::Token;
use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    BeforeHtml,
    BeforeHead,
    InHead,
    AfterHead,
    InBody,
}

pub(crate) struct TreeBuilder<'d> {
    document: &'d mut Document,
    mode: Mode,
    html: Option<NodeId>,
    head: Option<NodeId>,
    body: Option<NodeId>,
    /// Open elements; index 0 is never popped.
    open: Vec<NodeId>,
    max_depth: usize,
    fragment: bool,
    too_deep: bool,
}

impl<'d> TreeBuilder<'d> {
    pub(crate) fn for_document(document: &'d mut Document, max_depth: usize) -> Self {
        Self {
            document,
            mode: Mode::BeforeHtml,
            html: None,
            head: None,
            body: None,
            open: Vec::new(),
            max_depth,
            fragment: false,
            too_deep: false,
        }
    }

    pub(crate) fn for_fragment(
        document: &'d mut Document,
        context: NodeId,
        max_depth: usize,
    ) -> Self {
        Self {
            document,
            mode: Mode::InBody,
            html: None,
            head: None,
            body: None,
            open: vec![context],
            max_depth,
            fragment: true,
            too_deep: false,
        }
    }

    pub(crate) fn run(mut self, input: &str) -> PdResult<()> {
        let mut tokenizer = Tokenizer::new(input);
        if self.fragment {
            if let Some(mode) = self.current_element().and_then(text_mode_for) {
                let name = self.current_element().map(|el| el.local_name().to_owned());
                tokenizer.enter_text_mode(mode, name.as_deref().unwrap_or_default());
            }
        }

        while let Some(token) = tokenizer.next_token() {
            if let Some(mode) = self.process(token)? {
                let name = self
                    .current_element()
                    .map(|el| el.local_name().to_owned())
                    .unwrap_or_default();
                tokenizer.enter_text_mode(mode, &name);
            }

            if self.too_deep && !self.fragment {
                return Err(PdError::new(
                    ErrorKind::ParseFailed,
                    format!("element nesting exceeds {} levels", self.max_depth),
                ));
            }
        }

        if !self.fragment {
            self.ensure_body()?;
        }
        Ok(())
    }

    /// Handles one token; returns the text mode the tokenizer must switch to.
    fn process(&mut self, token: Token) -> PdResult<Option<TextMode>> {
        match self.mode {
            Mode::BeforeHtml => self.before_html(token),
            Mode::BeforeHead => self.before_head(token),
            Mode::InHead => self.in_head(token),
            Mode::AfterHead => self.after_head(token),
            Mode::InBody => self.in_body(token),
        }
    }

    fn before_html(&mut self, token: Token) -> PdResult<Option<TextMode>> {
        match token {
            Token::Doctype(name) => {
                let doctype = self.document.create_doctype(name);
                self.document.append_child(self.document.root(), doctype)?;
                Ok(None)
            }
            Token::Comment(data) => {
                let comment = self.document.create_comment(data);
                self.document.append_child(self.document.root(), comment)?;
                Ok(None)
            }
            Token::Text(text) if is_whitespace(&text) => Ok(None),
            Token::Text(text) => {
                self.ensure_html(&[])?;
                self.process(Token::Text(text))
            }
            Token::StartTag { name, attrs, .. } if name == "html" => {
                self.ensure_html(&attrs)?;
                Ok(None)
            }
            other => {
                self.ensure_html(&[])?;
                self.process(other)
            }
        }
    }

    fn before_head(&mut self, token: Token) -> PdResult<Option<TextMode>> {
        match token {
            Token::Text(text) if is_whitespace(&text) => Ok(None),
            Token::Comment(data) => self.append_comment_to(self.html, data),
            Token::Doctype(_) => Ok(None),
            Token::StartTag { name, attrs, .. } if name == "html" => {
                self.merge_attributes(self.html, &attrs);
                Ok(None)
            }
            Token::StartTag { name, attrs, .. } if name == "head" => {
                self.ensure_head(&attrs)?;
                Ok(None)
            }
            other => {
                self.ensure_head(&[])?;
                self.process(other)
            }
        }
    }

    fn in_head(&mut self, token: Token) -> PdResult<Option<TextMode>> {
        match token {
            Token::Text(text) if self.current_node().is_some() && self.current_node() != self.head => {
                let current = self.current_node();
                self.append_text_to(current, &text)?;
                Ok(None)
            }
            Token::Text(text) if is_whitespace(&text) => {
                self.append_text_to(self.head, &text)?;
                Ok(None)
            }
            Token::Comment(data) => self.append_comment_to(self.head, data),
            Token::Doctype(_) => Ok(None),
            Token::StartTag { name, attrs, .. } if is_head_element(&name) => {
                let parent = self.head;
                self.insert_into(parent, &name, &attrs)
            }
            Token::StartTag { name, attrs, .. } if name == "html" => {
                self.merge_attributes(self.html, &attrs);
                Ok(None)
            }
            Token::StartTag { name, .. } if name == "head" => Ok(None),
            Token::EndTag { name } if name == "head" => {
                self.mode = Mode::AfterHead;
                Ok(None)
            }
            Token::EndTag { name } if is_head_element(&name) => {
                self.pop_head_element(&name);
                Ok(None)
            }
            other => {
                self.open.clear();
                self.mode = Mode::AfterHead;
                self.process(other)
            }
        }
    }

    fn after_head(&mut self, token: Token) -> PdResult<Option<TextMode>> {
        match token {
            Token::Text(text) if is_whitespace(&text) => {
                self.append_text_to(self.html, &text)?;
                Ok(None)
            }
            Token::Comment(data) => self.append_comment_to(self.html, data),
            Token::Doctype(_) => Ok(None),
            Token::StartTag { name, attrs, .. } if name == "html" => {
                self.merge_attributes(self.html, &attrs);
                Ok(None)
            }
            Token::StartTag { name, attrs, .. } if name == "body" => {
                self.ensure_body_with(&attrs)?;
                Ok(None)
            }
            Token::StartTag { name, attrs, .. } if is_head_element(&name) && name != "noscript" => {
                self.open = self.head.into_iter().collect();
                self.mode = Mode::InHead;
                let parent = self.head;
                self.insert_into(parent, &name, &attrs)
            }
            Token::EndTag { .. } => Ok(None),
            other => {
                self.ensure_body()?;
                self.process(other)
            }
        }
    }

    fn in_body(&mut self, token: Token) -> PdResult<Option<TextMode>> {
        match token {
            Token::Text(text) => {
                let current = self.current_node();
                self.append_text_to(current, &text)?;
                Ok(None)
            }
            Token::Comment(data) => {
                let current = self.current_node();
                self.append_comment_to(current, data)
            }
            Token::Doctype(_) => Ok(None),
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => self.body_start_tag(&name, &attrs, self_closing),
            Token::EndTag { name } => {
                self.body_end_tag(&name)?;
                Ok(None)
            }
        }
    }

    fn body_start_tag(
        &mut self,
        name: &str,
        attrs: &[(String, String)],
        self_closing: bool,
    ) -> PdResult<Option<TextMode>> {
        if self.in_foreign_content() {
            if !breaks_out_of_foreign_content(name, attrs) {
                let namespace = self
                    .current_element()
                    .map(Element::namespace)
                    .unwrap_or(Namespace::Html);
                return self.insert_foreign(name, attrs, namespace, self_closing);
            }
            while self.in_foreign_content() && self.open.len() > 1 {
                self.open.pop();
            }
        }

        match name {
            "html" => {
                if !self.fragment {
                    self.merge_attributes(self.html, attrs);
                }
                return Ok(None);
            }
            "body" => {
                if !self.fragment {
                    self.merge_attributes(self.body, attrs);
                }
                return Ok(None);
            }
            "head" | "frameset" => return Ok(None),
            "svg" => return self.insert_foreign(name, attrs, Namespace::Svg, self_closing),
            "math" => return self.insert_foreign(name, attrs, Namespace::MathMl, self_closing),
            "a" => {
                if let Some(index) = self.find_open("a", &["table", "td", "th"]) {
                    self.open.truncate(index);
                }
            }
            "li" => self.close_list_item(&["li"]),
            "dd" | "dt" => self.close_list_item(&["dd", "dt"]),
            "option" => self.pop_if_current(&["option"]),
            "optgroup" => self.pop_if_current(&["option", "optgroup"]),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.close_paragraph();
                self.pop_if_current(&["h1", "h2", "h3", "h4", "h5", "h6"]);
            }
            _ => {}
        }

        if closes_paragraph(name) {
            self.close_paragraph();
        }

        let parent = self.current_node();
        self.insert_into(parent, name, attrs)
    }

    fn body_end_tag(&mut self, name: &str) -> PdResult<()> {
        match name {
            "body" | "html" => return Ok(()),
            "br" => {
                let parent = self.current_node();
                self.insert_into(parent, "br", &[])?;
                return Ok(());
            }
            "p" if self.find_open("p", BUTTON_SCOPE).is_none() => {
                let parent = self.current_node();
                self.insert_into(parent, "p", &[])?;
                self.pop_if_current(&["p"]);
                return Ok(());
            }
            _ => {}
        }

        match self.find_open(name, &[]) {
            Some(index) => self.open.truncate(index),
            None => debug!(tag = name, "ignoring end tag without a matching open element"),
        }
        Ok(())
    }

    /// Creates an HTML element under `parent`; pushes it unless it is void.
    /// The self-closing flag is ignored for HTML elements.
    fn insert_into(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        attrs: &[(String, String)],
    ) -> PdResult<Option<TextMode>> {
        let Some(parent) = parent else {
            return Ok(None);
        };

        let mut element = Element::html(name);
        for (attr_name, value) in attrs {
            element.add_attribute_if_missing(attr_name, value.as_str());
        }
        let mode = text_mode_for(&element);
        let node = self.document.create_element(element);
        self.document.append_child(parent, node)?;

        if is_void(name) {
            return Ok(None);
        }
        if !self.push_open(node) {
            return Ok(None);
        }
        Ok(mode)
    }

    fn insert_foreign(
        &mut self,
        name: &str,
        attrs: &[(String, String)],
        namespace: Namespace,
        self_closing: bool,
    ) -> PdResult<Option<TextMode>> {
        let local_name = match namespace {
            Namespace::Svg => adjust_svg_tag_name(name),
            Namespace::Html | Namespace::MathMl => name,
        };
        let mut element = Element::new(local_name, namespace);
        for (attr_name, value) in attrs {
            let attr_name = match namespace {
                Namespace::Svg => adjust_svg_attribute_name(attr_name),
                Namespace::MathMl if attr_name == "definitionurl" => "definitionURL",
                Namespace::Html | Namespace::MathMl => attr_name.as_str(),
            };
            element.add_attribute_if_missing(attr_name, value.as_str());
        }

        let parent = self.current_node().unwrap_or_else(|| self.document.root());
        let node = self.document.create_element(element);
        self.document.append_child(parent, node)?;
        if !self_closing {
            self.push_open(node);
        }
        Ok(None)
    }

    /// Pushes onto the open stack, refusing past `max_depth`.
    fn push_open(&mut self, node: NodeId) -> bool {
        if self.open.len() >= self.max_depth {
            self.too_deep = true;
            return false;
        }
        self.open.push(node);
        true
    }

    fn current_node(&self) -> Option<NodeId> {
        self.open.last().copied()
    }

    fn current_element(&self) -> Option<&Element> {
        self.current_node().and_then(|id| self.document.element(id))
    }

    fn in_foreign_content(&self) -> bool {
        self.current_element().is_some_and(|el| {
            el.namespace() != Namespace::Html && !is_html_integration_point(el)
        })
    }

    /// Index of the topmost open element named `name`, stopping at any
    /// element in `scope_boundaries`. Index 0 is never returned.
    fn find_open(&self, name: &str, scope_boundaries: &[&str]) -> Option<usize> {
        for index in (1..self.open.len()).rev() {
            let Some(element) = self.document.element(self.open[index]) else {
                continue;
            };
            if element.local_name().eq_ignore_ascii_case(name) {
                return Some(index);
            }
            if element.namespace() == Namespace::Html
                && scope_boundaries.contains(&element.local_name())
            {
                return None;
            }
        }
        None
    }

    fn close_paragraph(&mut self) {
        if let Some(index) = self.find_open("p", BUTTON_SCOPE) {
            self.open.truncate(index);
        }
    }

    fn close_list_item(&mut self, names: &[&str]) {
        for index in (1..self.open.len()).rev() {
            let Some(element) = self.document.element(self.open[index]) else {
                continue;
            };
            if element.namespace() == Namespace::Html && names.contains(&element.local_name()) {
                self.open.truncate(index);
                return;
            }
            if element.namespace() == Namespace::Html
                && !matches!(element.local_name(), "address" | "div" | "p")
                && is_special(element.local_name())
            {
                return;
            }
        }
    }

    fn pop_if_current(&mut self, names: &[&str]) {
        if self.open.len() < 2 {
            return;
        }
        if self
            .current_element()
            .is_some_and(|el| el.namespace() == Namespace::Html && names.contains(&el.local_name()))
        {
            self.open.pop();
        }
    }

    fn pop_head_element(&mut self, name: &str) {
        if self
            .current_element()
            .is_some_and(|el| el.local_name() == name)
        {
            self.open.pop();
        }
    }

    fn append_text_to(&mut self, parent: Option<NodeId>, text: &str) -> PdResult<()> {
        match parent {
            Some(parent) => self.document.append_text(parent, text),
            None => Ok(()),
        }
    }

    fn append_comment_to(
        &mut self,
        parent: Option<NodeId>,
        data: String,
    ) -> PdResult<Option<TextMode>> {
        if let Some(parent) = parent {
            let comment = self.document.create_comment(data);
            self.document.append_child(parent, comment)?;
        }
        Ok(None)
    }

    fn merge_attributes(&mut self, target: Option<NodeId>, attrs: &[(String, String)]) {
        let Some(element) = target.and_then(|id| self.document.element_mut(id)) else {
            return;
        };
        for (name, value) in attrs {
            element.add_attribute_if_missing(name, value.as_str());
        }
    }

    fn ensure_html(&mut self, attrs: &[(String, String)]) -> PdResult<()> {
        if self.html.is_none() {
            let html = self.document.create_element(Element::html("html"));
            self.document.append_child(self.document.root(), html)?;
            self.html = Some(html);
        }
        self.merge_attributes(self.html, attrs);
        self.mode = Mode::BeforeHead;
        Ok(())
    }

    fn ensure_head(&mut self, attrs: &[(String, String)]) -> PdResult<()> {
        self.ensure_html_exists()?;
        if self.head.is_none() {
            let head = self.document.create_element(Element::html("head"));
            if let Some(html) = self.html {
                self.document.append_child(html, head)?;
            }
            self.head = Some(head);
        }
        self.merge_attributes(self.head, attrs);
        self.open = self.head.into_iter().collect();
        self.mode = Mode::InHead;
        Ok(())
    }

    fn ensure_body(&mut self) -> PdResult<()> {
        self.ensure_body_with(&[])
    }

    fn ensure_body_with(&mut self, attrs: &[(String, String)]) -> PdResult<()> {
        if self.head.is_none() {
            self.ensure_head(&[])?;
        }
        if self.body.is_none() {
            let body = self.document.create_element(Element::html("body"));
            if let Some(html) = self.html {
                self.document.append_child(html, body)?;
            }
            self.body = Some(body);
        }
        self.merge_attributes(self.body, attrs);
        if self.mode != Mode::InBody {
            self.open = self.body.into_iter().collect();
            self.mode = Mode::InBody;
        }
        Ok(())
    }

    fn ensure_html_exists(&mut self) -> PdResult<()> {
        if self.html.is_none() {
            self.ensure_html(&[])?;
        }
        Ok(())
    }
}

const BUTTON_SCOPE: &[&str] = &[
    "applet", "caption", "html", "table", "td", "th", "marquee", "object", "template", "button",
];

fn is_whitespace(text: &str) -> bool {
    text.bytes()
        .all(|byte| matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c'))
}

fn text_mode_for(element: &Element) -> Option<TextMode> {
    if element.namespace() != Namespace::Html {
        return None;
    }
    match element.local_name() {
        "script" | "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(TextMode::RawText),
        "textarea" | "title" => Some(TextMode::EscapableRawText),
        "plaintext" => Some(TextMode::Plaintext),
        _ => None,
    }
}

fn is_head_element(name: &str) -> bool {
    matches!(
        name,
        "base" | "basefont" | "bgsound" | "link" | "meta" | "title" | "noscript" | "script"
            | "style" | "template"
    )
}

pub(crate) fn is_void(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "basefont"
            | "bgsound"
            | "br"
            | "col"
            | "embed"
            | "frame"
            | "hr"
            | "img"
            | "input"
            | "keygen"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn closes_paragraph(name: &str) -> bool {
    matches!(
        name,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "center"
            | "details"
            | "dialog"
            | "dir"
            | "div"
            | "dl"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "header"
            | "hgroup"
            | "hr"
            | "li"
            | "dd"
            | "dt"
            | "listing"
            | "main"
            | "menu"
            | "nav"
            | "ol"
            | "p"
            | "plaintext"
            | "pre"
            | "section"
            | "summary"
            | "table"
            | "ul"
            | "xmp"
    )
}

fn is_special(name: &str) -> bool {
    closes_paragraph(name)
        || matches!(
            name,
            "applet" | "body" | "button" | "caption" | "html" | "marquee" | "object" | "td"
                | "th" | "tr" | "template"
        )
}

fn is_html_integration_point(element: &Element) -> bool {
    match element.namespace() {
        Namespace::Svg => matches!(element.local_name(), "foreignObject" | "desc" | "title"),
        Namespace::MathMl => matches!(
            element.local_name(),
            "annotation-xml" | "mi" | "mo" | "mn" | "ms" | "mtext"
        ),
        Namespace::Html => false,
    }
}

fn breaks_out_of_foreign_content(name: &str, attrs: &[(String, String)]) -> bool {
    if name == "font" {
        return attrs
            .iter()
            .any(|(attr, _)| matches!(attr.as_str(), "color" | "face" | "size"));
    }
    matches!(
        name,
        "b" | "big"
            | "blockquote"
            | "body"
            | "br"
            | "center"
            | "code"
            | "dd"
            | "div"
            | "dl"
            | "dt"
            | "em"
            | "embed"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "head"
            | "hr"
            | "i"
            | "img"
            | "li"
            | "listing"
            | "menu"
            | "meta"
            | "nobr"
            | "ol"
            | "p"
            | "pre"
            | "ruby"
            | "s"
            | "small"
            | "span"
            | "strong"
            | "strike"
            | "sub"
            | "sup"
            | "table"
            | "tt"
            | "u"
            | "ul"
            | "var"
    )
}

fn adjust_svg_tag_name(name: &str) -> &str {
    match name {
        "clippath" => "clipPath",
        "foreignobject" => "foreignObject",
        "lineargradient" => "linearGradient",
        "radialgradient" => "radialGradient",
        "textpath" => "textPath",
        "animatemotion" => "animateMotion",
        "animatetransform" => "animateTransform",
        "fegaussianblur" => "feGaussianBlur",
        "feoffset" => "feOffset",
        "feblend" => "feBlend",
        "fecolormatrix" => "feColorMatrix",
        "femerge" => "feMerge",
        "femergenode" => "feMergeNode",
        other => other,
    }
}

fn adjust_svg_attribute_name(name: &str) -> &str {
    match name {
        "viewbox" => "viewBox",
        "preserveaspectratio" => "preserveAspectRatio",
        "gradientunits" => "gradientUnits",
        "gradienttransform" => "gradientTransform",
        "patternunits" => "patternUnits",
        "patterncontentunits" => "patternContentUnits",
        "clippathunits" => "clipPathUnits",
        "markerwidth" => "markerWidth",
        "markerheight" => "markerHeight",
        "refx" => "refX",
        "refy" => "refY",
        "textlength" => "textLength",
        "stddeviation" => "stdDeviation",
        "attributename" => "attributeName",
        other => other,
    }
}
