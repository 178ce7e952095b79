//! Error taxonomy for reconciliation.
//!
//! Every error aborts the operation that raised it. Nothing here is retried
//! automatically; re-running the same operation against the same declared
//! state is always safe because every emitted mutation is idempotent.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by controllers and the components they compose.
#[derive(Debug, Error)]
pub enum Error {
    /// A store call failed. Carries the call and the address involved.
    #[error("{operation} {target}: {source}")]
    Remote {
        operation: &'static str,
        target: String,
        source: cypress::Error,
    },

    /// Delete was asked to remove an object that still has children.
    #[error("cannot delete {object}: remove its dependents first: {}", dependents.join(", "))]
    DependentObjectsExist {
        object: String,
        dependents: Vec<String>,
    },

    /// Update tried to change a field the store only sets at creation.
    #[error("{object}: '{field}' cannot be changed in place ({observed} -> {declared}); recreate the object instead")]
    ImmutableFieldChanged {
        object: String,
        field: &'static str,
        observed: String,
        declared: String,
    },

    /// A declared reference violates a presence rule.
    #[error("{object}: {field} {reason}")]
    UnresolvedReference {
        object: String,
        field: &'static str,
        reason: String,
    },

    /// A convergence poll ran past its deadline.
    #[error("{target}: {condition} not reached after {waited:?}")]
    ConvergenceTimeout {
        target: String,
        condition: String,
        waited: Duration,
    },

    /// The store never allows this operation on this kind.
    #[error("{object}: {reason}")]
    Forbidden { object: String, reason: String },

    /// Declared values are inconsistent with each other.
    #[error("{object}: {reason}")]
    InvalidDeclaration { object: String, reason: String },

    /// A declared value could not be turned into its wire form.
    #[error("{object}: cannot encode '{field}': {message}")]
    Encoding {
        object: String,
        field: String,
        message: String,
    },

    /// The operation needs a store id the snapshot does not carry.
    #[error("{object} has no id; create or import it first")]
    MissingId { object: String },
}

impl Error {
    /// Short category label for the orchestration boundary.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote_call",
            Self::DependentObjectsExist { .. } => "dependent_objects_exist",
            Self::ImmutableFieldChanged { .. } => "immutable_field_changed",
            Self::UnresolvedReference { .. } => "unresolved_reference",
            Self::ConvergenceTimeout { .. } => "convergence_timeout",
            Self::Forbidden { .. } => "forbidden",
            Self::InvalidDeclaration { .. } => "invalid_declaration",
            Self::Encoding { .. } => "encoding",
            Self::MissingId { .. } => "missing_id",
        }
    }

    /// Whether the store reported the addressed object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote { source, .. } if source.is_not_found())
    }

    /// The tagged form handed to the orchestration boundary.
    pub fn to_failure(&self) -> Failure {
        Failure {
            label: self.label(),
            detail: self.to_string(),
        }
    }
}

/// Category label plus human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub label: &'static str,
    pub detail: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.label, self.detail)
    }
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        err.to_failure()
    }
}

/// Attach the failing call and its address to a store error.
pub(crate) trait RemoteContext<T> {
    fn remote(self, operation: &'static str, target: impl fmt::Display) -> Result<T>;
}

impl<T> RemoteContext<T> for cypress::Result<T> {
    fn remote(self, operation: &'static str, target: impl fmt::Display) -> Result<T> {
        self.map_err(|source| Error::Remote {
            operation,
            target: target.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_names_call_and_target() {
        let result: cypress::Result<()> =
            Err(cypress::Error::remote(500, "Error resolving path #1-2"));
        let err = result.remote("get", "#1-2/@tablet_cell_count").unwrap_err();
        assert_eq!(
            err.to_string(),
            "get #1-2/@tablet_cell_count: Error resolving path #1-2"
        );
        assert_eq!(err.label(), "remote_call");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_dependents_listed_in_detail() {
        let err = Error::DependentObjectsExist {
            object: "account team".to_string(),
            dependents: vec!["child-a".to_string(), "child-b".to_string()],
        };
        let failure = err.to_failure();
        assert_eq!(failure.label, "dependent_objects_exist");
        assert!(failure.detail.ends_with("child-a, child-b"));
        assert!(failure.to_string().starts_with("[dependent_objects_exist]"));
    }

    #[test]
    fn test_labels_are_distinct() {
        let errors = [
            Error::MissingId {
                object: "x".into(),
            },
            Error::Forbidden {
                object: "x".into(),
                reason: "no".into(),
            },
            Error::InvalidDeclaration {
                object: "x".into(),
                reason: "no".into(),
            },
            Error::UnresolvedReference {
                object: "x".into(),
                field: "parent_name",
                reason: "is empty".into(),
            },
        ];
        let labels: std::collections::HashSet<_> = errors.iter().map(Error::label).collect();
        assert_eq!(labels.len(), errors.len());
    }
}
