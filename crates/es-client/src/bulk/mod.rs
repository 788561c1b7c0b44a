//! Batched document submission.

pub mod backoff;
pub mod listener;
pub mod processor;
pub mod response;

pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use listener::BulkListener;
pub use processor::{
    BulkConfig, BulkProcessor, BulkStats, DrainOutcome, DEFAULT_BULK_ACTIONS,
    DEFAULT_BULK_SIZE_BYTES, DEFAULT_FLUSH_INTERVAL,
};
pub use response::{BulkItem, BulkItemError, BulkItemResult, BulkResponse};
