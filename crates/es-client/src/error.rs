//! Error types for the Elasticsearch client layer.

use thiserror::Error;

/// HTTP status Elasticsearch answers with when a node rejects work because its
/// queues are full.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Errors that can occur while talking to the cluster.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The cluster hostname could not be resolved.
    #[error("Failed to resolve host '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The hostname resolved to no addresses at all.
    #[error("No addresses found for host '{0}'")]
    NoAddress(String),

    /// The cluster endpoint could not be turned into a valid URL or header.
    #[error("Invalid endpoint configuration: {0}")]
    Endpoint(String),

    /// Transport-level error reported by the Elasticsearch client.
    #[error("Elasticsearch error: {0}")]
    Elasticsearch(#[from] elasticsearch::Error),

    /// The cluster answered with an unexpected HTTP status.
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The bulk processor no longer accepts documents.
    #[error("Bulk processor is closed")]
    ProcessorClosed,
}

impl ClientError {
    /// HTTP status of the answer, when the cluster answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the cluster rejected the whole request because it is overloaded.
    pub fn is_rejected(&self) -> bool {
        self.status() == Some(TOO_MANY_REQUESTS)
    }
}
