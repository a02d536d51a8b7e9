//! Error types for the Graph/SharePoint client.
//!
//! # Design
//! Errors are surfaced, never recovered locally. Authentication failures,
//! non-2xx answers, exhausted retries and malformed JSON each get their own
//! variant so callers can tell them apart. `NotFound` is split out of
//! `Http` because "the item does not exist" is the one status callers
//! routinely branch on.

use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum GraphError {
    /// The identity platform rejected the credentials or could not be reached.
    #[error("authentication failed: {message}")]
    Authentication { status: Option<u16>, message: String },

    /// The server returned 404.
    #[error("resource not found: {body}")]
    NotFound { body: String },

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A transient failure persisted through every allowed attempt.
    #[error("gave up after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<GraphError>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body could not be deserialized into the expected shape.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("client certificate error: {0}")]
    Certificate(String),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A SharePoint REST operation was called without `SP_*` credentials.
    #[error("SharePoint REST credentials are not configured")]
    SharePointNotConfigured,
}

impl GraphError {
    /// HTTP status behind this error, looking through `RetriesExhausted`.
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::Authentication { status, .. } => *status,
            GraphError::NotFound { .. } => Some(404),
            GraphError::Http { status, .. } => Some(*status),
            GraphError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Whether the failed request may succeed if sent again unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            GraphError::Http { status, .. } => crate::retry::is_retryable_status(*status),
            GraphError::Transport(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_looks_through_retries_exhausted() {
        let err = GraphError::RetriesExhausted {
            attempts: 3,
            last: Box::new(GraphError::Http {
                status: 503,
                body: String::new(),
            }),
        };
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_transient());
    }

    #[test]
    fn throttling_and_server_errors_are_transient() {
        for status in [429, 500, 502, 503, 504] {
            let err = GraphError::Http {
                status,
                body: String::new(),
            };
            assert!(err.is_transient(), "{status}");
        }
        for status in [400, 401, 403, 409] {
            let err = GraphError::Http {
                status,
                body: String::new(),
            };
            assert!(!err.is_transient(), "{status}");
        }
    }

    #[test]
    fn not_found_is_final() {
        let err = GraphError::NotFound {
            body: String::new(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_transient());
    }
}
