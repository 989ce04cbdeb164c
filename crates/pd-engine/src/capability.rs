//! Host capability detection and the environment handed to the engine.

use core::fmt;
use std::sync::Arc;
use std::sync::OnceLock;

use pd_html::HtmlParser;
use pd_html::MarkupParser;
use tracing::debug;
use tracing::info;

const CANARY: &str =
    "<!doctype html><html><head><title>probe</title></head><body><p>probe</p></body></html>";

/// Decides whether markup can be turned into a tree safely.
#[derive(Debug, Clone, Copy)]
pub struct Capability;

impl Capability {
    /// Parses a small canary document and requires a document element and a
    /// body to come back.
    pub fn probe(parser: &dyn MarkupParser) -> bool {
        match parser.parse_document(CANARY) {
            Ok(document) => document.document_element().is_some() && document.body().is_some(),
            Err(error) => {
                debug!(%error, "canary document failed to parse");
                false
            }
        }
    }

    /// Probe result for the bundled parser, computed once per process.
    pub fn detect() -> bool {
        static DETECTED: OnceLock<bool> = OnceLock::new();
        *DETECTED.get_or_init(|| {
            let can_parse_safely = Self::probe(&HtmlParser::default());
            info!(can_parse_safely, "markup capability probe settled");
            can_parse_safely
        })
    }
}

/// Platform hook that turns markup into an inert static form when the host
/// cannot parse it.
pub trait StaticFallback: Send + Sync {
    fn to_static(&self, markup: &str) -> String;
}

/// What the host can do, passed explicitly into [`crate::Paranoid`].
#[derive(Clone)]
pub struct Environment {
    pub can_parse_safely: bool,
    pub static_fallback: Option<Arc<dyn StaticFallback>>,
}

impl Environment {
    pub fn detect() -> Self {
        Self {
            can_parse_safely: Capability::detect(),
            static_fallback: None,
        }
    }

    pub fn capable() -> Self {
        Self {
            can_parse_safely: true,
            static_fallback: None,
        }
    }

    pub fn incapable() -> Self {
        Self {
            can_parse_safely: false,
            static_fallback: None,
        }
    }

    pub fn with_static_fallback(mut self, fallback: Arc<dyn StaticFallback>) -> Self {
        self.static_fallback = Some(fallback);
        self
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("can_parse_safely", &self.can_parse_safely)
            .field("static_fallback", &self.static_fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pd_core::ErrorKind;
    use pd_core::PdError;
    use pd_core::PdResult;
    use pd_dom::Document;
    use pd_dom::NodeId;
    use pd_html::HtmlParser;
    use pd_html::MarkupParser;

    use super::Capability;

    struct Broken;

    impl MarkupParser for Broken {
        fn parse_document(&self, _markup: &str) -> PdResult<Document> {
            Err(PdError::new(ErrorKind::ParseFailed, "no parser available"))
        }

        fn parse_fragment(
            &self,
            _markup: &str,
            _document: &mut Document,
            _context: NodeId,
        ) -> PdResult<()> {
            Err(PdError::new(ErrorKind::ParseFailed, "no parser available"))
        }
    }

    struct Hollow;

    impl MarkupParser for Hollow {
        fn parse_document(&self, _markup: &str) -> PdResult<Document> {
            Ok(Document::new())
        }

        fn parse_fragment(
            &self,
            _markup: &str,
            _document: &mut Document,
            _context: NodeId,
        ) -> PdResult<()> {
            Ok(())
        }
    }

    #[test]
    fn bundled_parser_is_capable() {
        assert!(Capability::probe(&HtmlParser::default()));
        assert!(Capability::detect());
        assert_eq!(Capability::detect(), Capability::detect());
    }

    #[test]
    fn failing_or_hollow_parsers_are_not() {
        assert!(!Capability::probe(&Broken));
        assert!(!Capability::probe(&Hollow));
    }
}
