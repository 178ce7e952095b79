//! Error types for object store operations.
//!
//! Errors are categorized so callers can tell a missing object from a
//! permission problem or a flaky network without parsing messages.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for object store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// YT error code for a path that cannot be resolved.
pub const CODE_RESOLVE_ERROR: i64 = 500;
/// YT error code for an object or node that already exists.
pub const CODE_ALREADY_EXISTS: i64 = 501;
/// YT error code for a denied permission check.
pub const CODE_AUTHORIZATION: i64 = 901;

/// Categories of store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Path or object id does not resolve.
    NotFound,
    /// Object with the same name or path already exists.
    AlreadyExists,
    /// Token is missing, invalid or lacks a permission.
    Authorization,
    /// Connection, TLS or timeout failure (transient, retryable).
    Transport,
    /// The proxy answered with something we could not decode.
    Protocol,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Object not found",
            Self::AlreadyExists => "Object already exists",
            Self::Authorization => "Permission denied",
            Self::Transport => "Cannot reach the cluster",
            Self::Protocol => "Unexpected response from the cluster",
            Self::Other => "Cluster rejected the request",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Refresh state or import the object again by id",
            Self::AlreadyExists => "Import the existing object instead of creating it",
            Self::Authorization => "Check YT_TOKEN and the ACLs of the target object",
            Self::Transport => "Check the proxy address and network, then retry",
            Self::Protocol => "Check that the proxy speaks API v4",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors returned by an [`ObjectStore`](crate::ObjectStore).
#[derive(Debug, Error)]
pub enum Error {
    /// Error reported by the cluster itself.
    #[error("{}", render_remote(message, inner))]
    Remote {
        /// Every error code found in the error tree, outermost first.
        codes: Vec<i64>,
        /// Top-level message.
        message: String,
        /// Messages of nested errors, outermost first.
        inner: Vec<String>,
    },

    /// Non-2xx HTTP status without a parsable YT error body.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A value was read but did not have the expected shape.
    #[error("cannot decode {path}: {message}")]
    Decode {
        /// Path that was read.
        path: String,
        /// Deserializer message.
        message: String,
    },

    /// Response that is not valid JSON or lacks a required field.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

fn render_remote(message: &str, inner: &[String]) -> String {
    if inner.is_empty() {
        message.to_string()
    } else {
        format!("{message}: {}", inner.join(": "))
    }
}

/// Wire shape of a YT error.
#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    inner_errors: Vec<WireError>,
}

impl WireError {
    fn collect(&self, codes: &mut Vec<i64>, inner: &mut Vec<String>) {
        for nested in &self.inner_errors {
            codes.push(nested.code);
            if !nested.message.is_empty() {
                inner.push(nested.message.clone());
            }
            nested.collect(codes, inner);
        }
    }
}

impl Error {
    /// Build a remote error from a code and message.
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Remote {
            codes: vec![code],
            message: message.into(),
            inner: Vec::new(),
        }
    }

    /// Get the error category.
    ///
    /// For cluster errors the whole error tree is searched, because the
    /// proxy usually wraps the meaningful code in a generic outer error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Remote { codes, .. } => {
                if codes.contains(&CODE_RESOLVE_ERROR) {
                    ErrorCategory::NotFound
                } else if codes.contains(&CODE_ALREADY_EXISTS) {
                    ErrorCategory::AlreadyExists
                } else if codes.contains(&CODE_AUTHORIZATION) {
                    ErrorCategory::Authorization
                } else {
                    ErrorCategory::Other
                }
            }
            Self::Http { status, .. } => match status {
                401 | 403 => ErrorCategory::Authorization,
                404 => ErrorCategory::NotFound,
                500.. => ErrorCategory::Transport,
                _ => ErrorCategory::Other,
            },
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Decode { .. } | Self::InvalidResponse(_) => ErrorCategory::Protocol,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether the error means the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Create an error from a failed proxy response.
    ///
    /// The body is parsed as a YT error; anything else falls back to a
    /// plain HTTP error carrying the raw text.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<WireError>(body) {
            Ok(wire) if wire.code != 0 || !wire.message.is_empty() => {
                let mut codes = vec![wire.code];
                let mut inner = Vec::new();
                wire.collect(&mut codes, &mut inner);
                Self::Remote {
                    codes,
                    message: wire.message,
                    inner,
                }
            }
            _ => Self::Http {
                status,
                message: body.trim().to_string(),
            },
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                status: code,
                message: format!("HTTP {code}"),
            },
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Transport.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Authorization.is_retryable());
    }

    #[test]
    fn test_from_response_nested_resolve_error() {
        let body = r#"{
            "code": 1,
            "message": "Error getting //sys/accounts/missing",
            "inner_errors": [
                {"code": 500, "message": "Node //sys/accounts has no child with key \"missing\""}
            ]
        }"#;
        let err = Error::from_response(400, body);
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("has no child with key"));
    }

    #[test]
    fn test_from_response_authorization() {
        let body = r#"{"code": 901, "message": "Access denied for user \"robot\""}"#;
        let err = Error::from_response(403, body);
        assert_eq!(err.category(), ErrorCategory::Authorization);
    }

    #[test]
    fn test_from_response_plain_text() {
        let err = Error::from_response(502, "Bad Gateway\n");
        assert!(matches!(err, Error::Http { status: 502, .. }));
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_remote_display_without_inner() {
        let err = Error::remote(CODE_ALREADY_EXISTS, "Account \"a\" already exists");
        assert_eq!(err.to_string(), "Account \"a\" already exists");
        assert_eq!(err.category(), ErrorCategory::AlreadyExists);
    }
}
