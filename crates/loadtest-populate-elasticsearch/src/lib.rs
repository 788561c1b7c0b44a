//! Elasticsearch populator for es-index-loader.
//!
//! This crate provisions a time-stamped index (`example_index_<timestamp>`)
//! with a fixed shard count, no replicas and refresh disabled, then fills it
//! with random mock documents through a bulk processor.
//!
//! # Example
//!
//! ```ignore
//! use loadtest_populate_elasticsearch::{IndexLoader, IndexName, LoaderSettings};
//!
//! let loader = IndexLoader::new(session.cluster(), session.address().to_string(), settings);
//! let outcome = loader.update_index(&IndexName::now()).await?;
//! ```

pub mod args;
pub mod document;
pub mod duration;
pub mod error;
pub mod index_name;
pub mod populator;
pub mod provision;

pub use args::{BulkOpts, ConnectionOpts, ElasticsearchPopulateArgs};
pub use document::MockDocument;
pub use error::PopulatorError;
pub use index_name::IndexName;
pub use populator::{IndexLoader, LoadOutcome, LoaderSettings, PopulateMetrics};
pub use provision::{ensure_index, Provisioning};
