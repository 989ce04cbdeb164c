//! Shared primitives used across the pd crates.

use core::fmt;

/// Result alias used across the workspace.
pub type PdResult<T> = Result<T, PdError>;

/// Error taxonomy shared by the tree, parser, rule and engine layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input is neither markup, a node, nor convertible to markup.
    UnsupportedInputType,
    /// The markup parser could not produce a usable document.
    ParseFailed,
    /// A rule aborted the traversal.
    RuleFailed,
    /// An illegal tree mutation was requested.
    HierarchyRequest,
    /// A strictly typed configuration value was rejected.
    InvalidConfig,
    /// Reading or writing outside the engine failed.
    Io,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::UnsupportedInputType => "input.unsupported_type",
            Self::ParseFailed => "html.parse_failed",
            Self::RuleFailed => "rules.rule_failed",
            Self::HierarchyRequest => "dom.hierarchy_request",
            Self::InvalidConfig => "config.invalid",
            Self::Io => "io.failed",
        }
    }
}

/// Top-level error type for the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PdError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unsupported_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedInputType, message)
    }

    pub fn hierarchy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HierarchyRequest, message)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_unsupported_input(&self) -> bool {
        self.kind == ErrorKind::UnsupportedInputType
    }
}

impl fmt::Display for PdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for PdError {}

impl From<std::io::Error> for PdError {
    fn from(error: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorKind;
    use super::PdError;

    #[test]
    fn display_prefixes_stable_code() {
        let error = PdError::unsupported_input("arrays cannot be sanitized");
        assert_eq!(
            error.to_string(),
            "input.unsupported_type: arrays cannot be sanitized"
        );
        assert!(error.is_unsupported_input());
    }

    #[test]
    fn io_errors_map_to_io_kind() {
        let error = PdError::from(std::io::Error::other("disk gone"));
        assert_eq!(error.kind, ErrorKind::Io);
        assert_eq!(error.code(), "io.failed");
    }
}
