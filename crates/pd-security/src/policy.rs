//! Typed options for the configurable rules.

use core::fmt;
use core::str::FromStr;

use pd_core::ErrorKind;
use pd_core::PdError;
use pd_core::PdResult;

/// Schemes `validateURI` keeps. Entries are lowercase and unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeAllowList {
    schemes: Vec<String>,
}

impl Default for SchemeAllowList {
    fn default() -> Self {
        Self {
            schemes: vec!["http".to_owned(), "https".to_owned()],
        }
    }
}

impl SchemeAllowList {
    /// Builds a list from user input, rejecting empty lists and entries that
    /// are not valid URL schemes. A trailing `:` is accepted and dropped.
    pub fn new<I, S>(schemes: I) -> PdResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self {
            schemes: Vec::new(),
        };
        for raw in schemes {
            let raw = raw.as_ref();
            let Some(scheme) = normalize_scheme(raw) else {
                return Err(PdError::new(
                    ErrorKind::InvalidConfig,
                    format!("`{raw}` is not a valid URL scheme"),
                ));
            };
            list.push(scheme);
        }

        if list.schemes.is_empty() {
            return Err(PdError::new(
                ErrorKind::InvalidConfig,
                "scheme allow-list must not be empty",
            ));
        }
        Ok(list)
    }

    /// Like [`SchemeAllowList::new`] but skips bad entries and falls back to
    /// the default list when nothing usable remains.
    pub fn lenient<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self {
            schemes: Vec::new(),
        };
        for scheme in schemes.into_iter().filter_map(|raw| normalize_scheme(raw.as_ref())) {
            list.push(scheme);
        }

        if list.schemes.is_empty() {
            return Self::default();
        }
        list
    }

    pub fn allows(&self, scheme: &str) -> bool {
        self.schemes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(scheme))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.schemes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }

    fn push(&mut self, scheme: String) {
        if !self.schemes.contains(&scheme) {
            self.schemes.push(scheme);
        }
    }
}

/// `scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`, lowercased.
fn normalize_scheme(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(':').unwrap_or(trimmed);
    let bytes = trimmed.as_bytes();
    let first = *bytes.first()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
    {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

/// Referrer policy tokens accepted by the `referrerpolicy` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReferrerPolicy {
    /// The empty string: defer to the document's policy.
    Unset,
    #[default]
    NoReferrer,
    NoReferrerWhenDowngrade,
    Origin,
    OriginWhenCrossOrigin,
    SameOrigin,
    StrictOrigin,
    StrictOriginWhenCrossOrigin,
    UnsafeUrl,
}

impl ReferrerPolicy {
    pub const ALL: [Self; 9] = [
        Self::Unset,
        Self::NoReferrer,
        Self::NoReferrerWhenDowngrade,
        Self::Origin,
        Self::OriginWhenCrossOrigin,
        Self::SameOrigin,
        Self::StrictOrigin,
        Self::StrictOriginWhenCrossOrigin,
        Self::UnsafeUrl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::NoReferrer => "no-referrer",
            Self::NoReferrerWhenDowngrade => "no-referrer-when-downgrade",
            Self::Origin => "origin",
            Self::OriginWhenCrossOrigin => "origin-when-cross-origin",
            Self::SameOrigin => "same-origin",
            Self::StrictOrigin => "strict-origin",
            Self::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
            Self::UnsafeUrl => "unsafe-url",
        }
    }

    /// ASCII case-insensitive token match.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str().eq_ignore_ascii_case(token))
    }
}

impl FromStr for ReferrerPolicy {
    type Err = PdError;

    fn from_str(token: &str) -> PdResult<Self> {
        Self::parse(token).ok_or_else(|| {
            PdError::new(
                ErrorKind::InvalidConfig,
                format!("`{token}` is not a referrer policy"),
            )
        })
    }
}

impl fmt::Display for ReferrerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
