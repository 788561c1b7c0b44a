//! Elasticsearch client layer for es-index-loader.
//!
//! - [`Session`]: resolves a hosted deployment, builds an authenticated TLS
//!   client and keeps the connection alive for the duration of a run.
//! - [`SearchCluster`]: the operations the loader needs (health, index
//!   existence and creation, bulk indexing), implemented by
//!   [`ElasticsearchCluster`].
//! - [`bulk::BulkProcessor`]: buffers documents and flushes them as `_bulk`
//!   requests by count, size or time, with backoff on rejections.
//!
//! # Example
//!
//! ```ignore
//! use es_client::bulk::{BulkConfig, BulkListener, BulkProcessor};
//! use es_client::{Session, SessionConfig};
//!
//! let session = Session::open(&config).await?;
//! let processor = BulkProcessor::spawn(
//!     session.cluster(),
//!     "example_index_20240101000000",
//!     BulkConfig::default(),
//!     BulkListener::new(),
//! );
//! processor.add(serde_json::json!({"user_id": 1})).await?;
//! processor.flush_and_shutdown(std::time::Duration::from_secs(60)).await;
//! session.close().await;
//! ```

pub mod bulk;
pub mod cluster;
pub mod elastic;
pub mod error;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cluster::{wait_for_green, ClusterHealth, HealthStatus, IndexSettings, SearchCluster};
pub use elastic::ElasticsearchCluster;
pub use error::ClientError;
pub use session::{Session, SessionConfig};
