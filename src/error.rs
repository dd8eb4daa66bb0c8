//! Error types for the sitekeeper operator

use thiserror::Error;

use crate::child::ChildKind;

/// Main error type for sitekeeper operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Site spec cannot be turned into dependents (e.g. unparsable storage size)
    #[error("validation error: {0}")]
    Validation(String),

    /// One or more dependents failed to delete during teardown
    ///
    /// `source` is the first failure; `failed` counts every dependent whose
    /// delete failed in the same pass.
    #[error("failed to delete {kind} {name} ({failed} dependent(s) failed): {source}")]
    ChildDeletion {
        /// Kind of the first dependent that failed to delete
        kind: ChildKind,
        /// Name of the first dependent that failed to delete
        name: String,
        /// Number of dependents that failed to delete in this pass
        failed: usize,
        /// The first failure
        source: Box<Error>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Broken invariant inside the controller or unexpected store response
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is transient and worth retrying without user action
    ///
    /// Connection failures, conflicts, throttling and server errors are
    /// transient. Other 4xx responses mean the store refused the write.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(source) => match source {
                kube::Error::Api(ae) => matches!(ae.code, 409 | 429) || ae.code >= 500,
                _ => true,
            },
            Error::Validation(_) => false,
            Error::ChildDeletion { .. } => true,
            Error::Serialization(_) => false,
            Error::Internal(_) => false,
        }
    }

    /// Check if the store (or our own validation) rejected the desired state
    ///
    /// Rejections are terminal for the attempt: retrying without a spec
    /// change will fail the same way.
    pub fn is_rejection(&self) -> bool {
        match self {
            Error::Validation(_) => true,
            Error::Kube(kube::Error::Api(ae)) => {
                (400..500).contains(&ae.code) && !matches!(ae.code, 404 | 409 | 429)
            }
            _ => false,
        }
    }
}
