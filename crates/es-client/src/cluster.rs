//! SearchCluster trait definition.
//!
//! This trait abstracts over the concrete Elasticsearch client so the index
//! provisioning and loading logic can be exercised against an in-memory
//! cluster in tests.

use crate::bulk::BulkResponse;
use crate::error::ClientError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

/// Aggregate readiness reported by the cluster for the deployment or one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

/// Subset of the `_cluster/health` response used by the loader.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterHealth {
    #[serde(default)]
    pub cluster_name: String,
    pub status: HealthStatus,
    #[serde(default)]
    pub timed_out: bool,
}

impl ClusterHealth {
    pub fn new(status: HealthStatus) -> Self {
        Self {
            cluster_name: String::new(),
            status,
            timed_out: false,
        }
    }
}

/// Settings applied when an index is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub refresh_interval: String,
}

impl IndexSettings {
    /// Settings tuned for an initial bulk load: no replicas and no automatic
    /// refresh. Replicas are expected to be added once loading is done.
    pub fn bulk_load(number_of_shards: u32) -> Self {
        Self {
            number_of_shards,
            number_of_replicas: 0,
            refresh_interval: "-1".to_string(),
        }
    }

    /// Request body for `PUT /<index>`.
    pub fn to_body(&self) -> Value {
        json!({
            "settings": {
                "index": {
                    "number_of_shards": self.number_of_shards,
                    "number_of_replicas": self.number_of_replicas,
                    "refresh_interval": self.refresh_interval,
                }
            }
        })
    }
}

/// Operations the loader needs from a search cluster.
#[async_trait::async_trait]
pub trait SearchCluster: Send + Sync {
    /// Check that the cluster answers at all.
    async fn ping(&self) -> Result<(), ClientError>;

    /// Fetch health for the whole cluster (`index == None`) or one index,
    /// letting the server wait up to `wait` for the status to become green.
    async fn health(&self, index: Option<&str>, wait: Duration)
        -> Result<ClusterHealth, ClientError>;

    /// Whether the index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, ClientError>;

    /// Create the index with the given settings.
    async fn create_index(&self, index: &str, settings: &IndexSettings)
        -> Result<(), ClientError>;

    /// Submit one `_bulk` request indexing every document into `index`.
    async fn bulk(&self, index: &str, documents: &[Value]) -> Result<BulkResponse, ClientError>;
}

/// Block until the cluster (or the given index) reports green.
///
/// Each round lets the server wait up to `poll` before answering; a round that
/// ends yellow or red is logged and another round is started. There is no
/// overall deadline.
pub async fn wait_for_green<C: SearchCluster + ?Sized>(
    cluster: &C,
    index: Option<&str>,
    poll: Duration,
) -> Result<ClusterHealth, ClientError> {
    let target = index.unwrap_or("cluster");
    loop {
        let health = cluster.health(index, poll).await?;
        if health.status == HealthStatus::Green {
            return Ok(health);
        }
        info!(
            "Health of {} is {:?} (timed out: {}), still waiting for green",
            target, health.status, health.timed_out
        );
    }
}
