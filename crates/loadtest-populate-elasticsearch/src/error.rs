//! Error types for the Elasticsearch populator.

use es_client::ClientError;
use thiserror::Error;

/// Errors that can occur while provisioning or populating an index.
#[derive(Error, Debug)]
pub enum PopulatorError {
    /// Cluster request failed.
    #[error("Elasticsearch error: {0}")]
    Client(#[from] ClientError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
