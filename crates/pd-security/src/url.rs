//! URL resolution used by the scheme-sensitive rules.

use pd_core::ErrorKind;
use pd_core::PdError;
use pd_core::PdResult;
use url::ParseError;
use url::Url;

/// Outcome of resolving an attribute value as a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The value resolved to an absolute URL, possibly against the base.
    Absolute(Url),
    /// A relative reference with no base to resolve against; it has no scheme.
    Relative,
    /// The value cannot be interpreted as a URL at all.
    Invalid,
}

impl Resolution {
    pub fn scheme(&self) -> Option<&str> {
        match self {
            Self::Absolute(url) => Some(url.scheme()),
            Self::Relative | Self::Invalid => None,
        }
    }
}

/// Resolves attribute values with WHATWG URL semantics against an optional
/// document base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlResolver {
    base: Option<Url>,
}

impl UrlResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: Url) -> Self {
        Self { base: Some(base) }
    }

    pub fn parse_base(input: &str) -> PdResult<Self> {
        let base = Url::parse(input).map_err(|error| {
            PdError::new(
                ErrorKind::InvalidConfig,
                format!("failed to parse base URL `{input}`: {error}"),
            )
        })?;

        if base.cannot_be_a_base() {
            return Err(PdError::new(
                ErrorKind::InvalidConfig,
                format!("`{input}` cannot be used as a base URL"),
            ));
        }

        Ok(Self::with_base(base))
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    pub fn resolve(&self, value: &str) -> Resolution {
        match Url::options().base_url(self.base.as_ref()).parse(value) {
            Ok(url) => Resolution::Absolute(url),
            Err(ParseError::RelativeUrlWithoutBase)
            | Err(ParseError::RelativeUrlWithCannotBeABaseBase) => Resolution::Relative,
            Err(_) => Resolution::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Resolution;
    use super::UrlResolver;

    #[test]
    fn resolves_absolute_values_without_base() {
        let resolver = UrlResolver::new();
        assert_eq!(resolver.resolve("http://example.com").scheme(), Some("http"));
        assert_eq!(
            resolver.resolve("JavaScript:alert(1)").scheme(),
            Some("javascript")
        );
    }

    #[test]
    fn strips_tabs_and_newlines_like_a_browser() {
        let resolver = UrlResolver::new();
        assert_eq!(
            resolver.resolve(" java\tscr\nipt:alert(1)").scheme(),
            Some("javascript")
        );
    }

    #[test]
    fn relative_values_need_a_base() {
        let resolver = UrlResolver::new();
        assert_eq!(resolver.resolve("/path?q=1"), Resolution::Relative);
        assert_eq!(resolver.resolve(""), Resolution::Relative);

        let resolver = match UrlResolver::parse_base("http://example.com/dir/") {
            Ok(resolver) => resolver,
            Err(error) => panic!("base rejected: {error}"),
        };
        match resolver.resolve("page.html") {
            Resolution::Absolute(url) => assert_eq!(url.as_str(), "http://example.com/dir/page.html"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn malformed_values_are_invalid() {
        assert_eq!(UrlResolver::new().resolve("http://["), Resolution::Invalid);
    }

    #[test]
    fn rejects_unusable_bases() {
        assert!(UrlResolver::parse_base("not a url").is_err());
        assert!(UrlResolver::parse_base("mailto:someone@example.com").is_err());
    }
}
