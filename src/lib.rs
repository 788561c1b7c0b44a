//! es-index-loader
//!
//! Creates a time-stamped index on a hosted Elasticsearch deployment and fills
//! it with randomly generated documents through the bulk API.
//!
//! # CLI Usage
//!
//! ```bash
//! es-index-loader <clusterId> <region> <username> <password> 3 10000 1000
//! ```
//!
//! The crates doing the work:
//!
//! - `es_client` - cluster session, admin calls and the bulk processor
//! - `loadtest_populate_elasticsearch` - index provisioning and mock documents

pub mod cli;
pub mod logging;
pub mod run;
