//! Error types for reconciliation.
//!
//! Errors are categorized so the caller can tell local pre-flight failures
//! (nothing was sent to the control plane) from remote rejections.

use crate::validate::ValidationErrors;
use std::fmt;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Remote operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Listing installable versions.
    ListVersions,
    /// Creating a cluster.
    Create,
    /// Fetching a cluster by id.
    Fetch,
    /// Patching a cluster.
    Patch,
    /// Deleting a cluster.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListVersions => "list versions",
            Self::Create => "create",
            Self::Fetch => "fetch",
            Self::Patch => "patch",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`ClusterStore`](crate::store::ClusterStore) or
/// [`VersionSource`](crate::store::VersionSource).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The control plane answered and refused the request.
    #[error("{message}")]
    Rejected {
        /// HTTP status code if the store is HTTP based.
        status: Option<u16>,
        /// Message as returned by the control plane.
        message: String,
    },

    /// The control plane could not be reached.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The control plane answered with something that is not a valid document.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Create a rejection error.
    pub fn rejected(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }
}

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Requested version is not installable.
    Version,
    /// Local validation failed.
    Validation,
    /// The control plane refused the request.
    Remote,
    /// The control plane could not be reached.
    Transport,
    /// A document could not be decoded.
    Document,
}

impl ErrorCategory {
    /// Whether the failure happened before anything was sent to the control plane.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Version | Self::Validation)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Version => "Version not available",
            Self::Validation => "Invalid cluster specification",
            Self::Remote => "Rejected by the control plane",
            Self::Transport => "Control plane unreachable",
            Self::Document => "Malformed cluster document",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Version => "Run `rosaform versions` to list installable versions",
            Self::Validation => "Fix the listed fields in the spec file and retry",
            Self::Remote => "Check the message from the control plane; nothing was changed",
            Self::Transport => "Check the API URL and your network connection",
            Self::Document => "The control plane returned an unexpected document",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while reconciling a cluster.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested version/channel-group combination is not in the catalog.
    #[error("version {version} not found in channel group {channel_group}")]
    VersionNotFound {
        /// Requested version id.
        version: String,
        /// Requested channel group.
        channel_group: String,
    },

    /// One or more local validation rules failed.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// The control plane refused a create, patch or delete.
    #[error("{operation} rejected by control plane: {message}")]
    RemoteRejected {
        /// Operation that was refused.
        operation: Operation,
        /// HTTP status code if available.
        status: Option<u16>,
        /// Message as returned by the control plane.
        message: String,
    },

    /// The store failed without a verdict from the control plane.
    #[error("{operation} failed: {source}")]
    Store {
        /// Operation that failed.
        operation: Operation,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The cluster to update no longer exists.
    #[error("cluster {id} not found")]
    NotFound {
        /// Cluster id that was looked up.
        id: String,
    },

    /// A document could not be converted.
    #[error("invalid cluster document: {0}")]
    InvalidDocument(String),
}

impl Error {
    /// Wrap a store error raised by `operation`.
    ///
    /// Rejections keep the control plane's message verbatim.
    pub fn from_store(operation: Operation, err: StoreError) -> Self {
        match err {
            StoreError::Rejected { status, message } => Self::RemoteRejected {
                operation,
                status,
                message,
            },
            source => Self::Store { operation, source },
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::VersionNotFound { .. } => ErrorCategory::Version,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::RemoteRejected { .. } | Self::NotFound { .. } => ErrorCategory::Remote,
            Self::Store { source, .. } => match source {
                StoreError::InvalidResponse(_) => ErrorCategory::Document,
                _ => ErrorCategory::Transport,
            },
            Self::InvalidDocument(_) => ErrorCategory::Document,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidDocument(err.to_string())
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_keeps_message_verbatim() {
        let err = Error::from_store(
            Operation::Create,
            StoreError::rejected("Cluster name 'my-cluster' already exists", Some(400)),
        );
        match &err {
            Error::RemoteRejected {
                operation,
                status,
                message,
            } => {
                assert_eq!(*operation, Operation::Create);
                assert_eq!(*status, Some(400));
                assert_eq!(message, "Cluster name 'my-cluster' already exists");
            }
            other => panic!("Expected RemoteRejected, got {other:?}"),
        }
        assert_eq!(err.category(), ErrorCategory::Remote);
        assert!(err.to_string().ends_with("Cluster name 'my-cluster' already exists"));
    }

    #[test]
    fn test_transport_failure_category() {
        let err = Error::from_store(Operation::Fetch, StoreError::Transport("reset".into()));
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert!(!err.category().is_local());
    }

    #[test]
    fn test_version_not_found_is_local() {
        let err = Error::VersionNotFound {
            version: "openshift-v4.99.99".into(),
            channel_group: "fast".into(),
        };
        assert!(err.category().is_local());
        let display = err.to_string();
        assert!(display.contains("openshift-v4.99.99"));
        assert!(display.contains("fast"));
    }

    #[test]
    fn test_category_advice() {
        assert!(!ErrorCategory::Version.advice().is_empty());
        assert!(!ErrorCategory::Remote.advice().is_empty());
        assert_eq!(format!("{}", ErrorCategory::Validation), "Invalid cluster specification");
    }
}
