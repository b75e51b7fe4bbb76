//! Error types for control plane requests.
//!
//! Errors convert into [`StoreError`], which is how the lifecycle layer tells
//! an unreachable API from a request the control plane refused.

use reconcile::StoreError;
use serde::Deserialize;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the control plane.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The API answered with a structured error document.
    #[error("{reason}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Machine-readable error code, e.g. `CLUSTERS-MGMT-400`.
        code: Option<String>,
        /// Human-readable reason, surfaced verbatim.
        reason: String,
    },

    /// The API answered with an error status and no usable error document.
    #[error("HTTP request failed: {message}")]
    HttpError {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The request never got an answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid response from API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::HttpError {
            message: message.into(),
            status,
        }
    }

    /// Build an error from a non-success response body.
    ///
    /// Structured error documents keep their `reason`; anything else is
    /// reported with the raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(ApiErrorBody {
                reason: Some(reason),
                code,
                ..
            }) if !reason.is_empty() => Self::Api { status, code, reason },
            _ => {
                let body = body.trim();
                let message = if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    format!("HTTP {status}: {body}")
                };
                Self::http(message, Some(status))
            }
        }
    }
}

/// Error document returned by the API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::HttpError {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            ureq::Error::Json(e) => Self::InvalidResponse(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        match err {
            Error::Api { status, reason, .. } => Self::rejected(reason, Some(status)),
            Error::HttpError {
                status: Some(status),
                message,
            } if status < 500 => Self::rejected(message, Some(status)),
            Error::HttpError { message, .. } | Error::Transport(message) => Self::Transport(message),
            Error::InvalidResponse(message) => Self::InvalidResponse(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUPLICATE_NAME: &str = r#"{
        "kind": "Error",
        "id": "400",
        "href": "/api/clusters_mgmt/v1/errors/400",
        "code": "CLUSTERS-MGMT-400",
        "reason": "Cluster name 'my-cluster' already exists",
        "operation_id": "0b1c2d"
    }"#;

    #[test]
    fn test_from_response_keeps_reason() {
        let err = Error::from_response(400, DUPLICATE_NAME);
        match &err {
            Error::Api { status, code, reason } => {
                assert_eq!(*status, 400);
                assert_eq!(code.as_deref(), Some("CLUSTERS-MGMT-400"));
                assert_eq!(reason, "Cluster name 'my-cluster' already exists");
            }
            other => panic!("Expected Error::Api, got {other:?}"),
        }
        assert_eq!(err.to_string(), "Cluster name 'my-cluster' already exists");
    }

    #[test]
    fn test_from_response_unstructured_body() {
        let err = Error::from_response(502, "<html>Bad Gateway</html>");
        assert!(matches!(err, Error::HttpError { status: Some(502), .. }));
        assert!(err.to_string().contains("Bad Gateway"));

        let err = Error::from_response(503, "");
        assert_eq!(err.to_string(), "HTTP request failed: HTTP 503");
    }

    #[test]
    fn test_into_store_error() {
        let store: StoreError = Error::from_response(400, DUPLICATE_NAME).into();
        assert_eq!(
            store,
            StoreError::rejected("Cluster name 'my-cluster' already exists", Some(400))
        );

        let store: StoreError = Error::from_response(409, "conflict").into();
        assert!(matches!(store, StoreError::Rejected { status: Some(409), .. }));

        let store: StoreError = Error::from_response(401, "").into();
        assert!(matches!(store, StoreError::Rejected { status: Some(401), .. }));

        let store: StoreError = Error::Transport("timed out".into()).into();
        assert!(matches!(store, StoreError::Transport(_)));

        let store: StoreError = Error::from_response(500, "").into();
        assert!(matches!(store, StoreError::Transport(_)));

        let store: StoreError = Error::InvalidResponse("bad json".into()).into();
        assert!(matches!(store, StoreError::InvalidResponse(_)));
    }
}
