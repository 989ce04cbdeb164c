//! Markup hardening engine.
//!
//! [`sanitize`] parses markup (or copies a caller's node) into a private
//! tree, runs the enabled rules over every element exactly once and returns
//! serialized markup or the tree itself.

mod acquire;
mod capability;
mod config;
mod output;
mod traverse;

use core::fmt;
use std::sync::Arc;

use pd_core::PdResult;
use pd_html::HtmlParser;
use pd_html::HtmlSerializer;
use pd_html::MarkupParser;
use pd_html::MarkupSerializer;
use serde_json::Value;
use tracing::debug;
use tracing::trace;

use crate::acquire::Source;

pub use crate::acquire::Input;
pub use crate::capability::Capability;
pub use crate::capability::Environment;
pub use crate::capability::StaticFallback;
pub use crate::config::SanitizeOptions;
pub use crate::output::Sanitized;
pub use crate::output::SanitizedTree;
pub use crate::traverse::TraversalReport;
pub use crate::traverse::VISITED_KINDS;
pub use crate::traverse::traverse;

/// Sanitizes `input` with the detected environment and the bundled HTML
/// parser and serializer.
pub fn sanitize<'a>(input: impl Into<Input<'a>>, config: &Value) -> PdResult<Sanitized<'a>> {
    Paranoid::new().sanitize(input, config)
}

/// A configured engine. Cheap to clone; holds no per-call state.
#[derive(Clone)]
pub struct Paranoid {
    environment: Environment,
    parser: Arc<dyn MarkupParser>,
    serializer: Arc<dyn MarkupSerializer>,
}

impl Default for Paranoid {
    fn default() -> Self {
        Self::new()
    }
}

impl Paranoid {
    pub fn new() -> Self {
        Self::with_environment(Environment::detect())
    }

    pub fn with_environment(environment: Environment) -> Self {
        Self {
            environment,
            parser: Arc::new(HtmlParser::default()),
            serializer: Arc::new(HtmlSerializer),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn MarkupParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn MarkupSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Resolves `config` (see [`SanitizeOptions::resolve`]) and sanitizes.
    pub fn sanitize<'a>(
        &self,
        input: impl Into<Input<'a>>,
        config: &Value,
    ) -> PdResult<Sanitized<'a>> {
        self.sanitize_with(input, &SanitizeOptions::resolve(config))
    }

    pub fn sanitize_with<'a>(
        &self,
        input: impl Into<Input<'a>>,
        options: &SanitizeOptions,
    ) -> PdResult<Sanitized<'a>> {
        let input = input.into();
        let source = Source::from_input(input)?;

        if !self.environment.can_parse_safely {
            return Ok(match &self.environment.static_fallback {
                Some(fallback) => {
                    let markup = source.to_markup(self.serializer.as_ref());
                    Sanitized::Markup(fallback.to_static(&markup))
                }
                None => match (input, source) {
                    (Input::Value(value), Source::Markup(text)) if !value.is_string() => {
                        Sanitized::Markup(text.into_owned())
                    }
                    _ => Sanitized::Untouched(input),
                },
            });
        }

        let mut tree = match source {
            Source::Markup(markup) => {
                if acquire::is_plain_text(&markup, options.whole_document, options.return_tree) {
                    trace!(bytes = markup.len(), "no markup to harden");
                    return Ok(Sanitized::Markup(markup.into_owned()));
                }
                acquire::from_markup(self.parser.as_ref(), &markup, options.whole_document)
            }
            Source::Node { document, node } => {
                Some(acquire::from_node(document, node, options.whole_document)?)
            }
        };

        if let Some(tree) = tree.as_mut() {
            let report = traverse(
                &mut tree.document,
                tree.root,
                &options.rules,
                &options.rule_context(),
            )?;
            debug!(
                visited = report.visited,
                elements = report.elements,
                rule_applications = report.rule_applications,
                "hardened tree"
            );
        }

        Ok(output::project(tree, options, self.serializer.as_ref()))
    }
}

impl fmt::Debug for Paranoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paranoid")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}
