//! In-memory `SearchCluster` that records every call, for tests.

use crate::bulk::{BulkItem, BulkResponse};
use crate::cluster::{ClusterHealth, HealthStatus, IndexSettings, SearchCluster};
use crate::error::ClientError;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A call received by [`MockCluster`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterCall {
    Ping,
    Health { index: Option<String> },
    IndexExists(String),
    CreateIndex { index: String, settings: IndexSettings },
    Bulk { index: String, documents: usize },
}

/// Scripted answer for the next bulk request. Requests beyond the script are
/// accepted with every item created.
#[derive(Debug, Clone)]
pub enum MockBulk {
    Accept,
    /// Whole request answered with HTTP 429.
    RejectRequest,
    /// Whole request answered with HTTP 500.
    FailRequest,
    /// Per-item statuses; items past the end of the list are created.
    ItemStatus(Vec<u16>),
    /// Only the first `n` documents are created and answered; the response
    /// carries no item for the rest.
    Truncated(usize),
}

#[derive(Default)]
pub struct MockCluster {
    calls: Mutex<Vec<ClusterCall>>,
    existing: Mutex<HashSet<String>>,
    health: Mutex<VecDeque<HealthStatus>>,
    bulk_script: Mutex<VecDeque<MockBulk>>,
    bulk_delay: Option<Duration>,
    documents: Mutex<Vec<Value>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_pings: bool,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing_index(self, index: &str) -> Self {
        self.existing.lock().unwrap().insert(index.to_string());
        self
    }

    /// Health answers returned in order; green once exhausted.
    pub fn with_health(self, statuses: Vec<HealthStatus>) -> Self {
        *self.health.lock().unwrap() = statuses.into();
        self
    }

    pub fn with_bulk_script(self, script: Vec<MockBulk>) -> Self {
        *self.bulk_script.lock().unwrap() = script.into();
        self
    }

    /// Time every bulk request takes to answer.
    pub fn with_bulk_delay(mut self, delay: Duration) -> Self {
        self.bulk_delay = Some(delay);
        self
    }

    pub fn with_failing_pings(mut self) -> Self {
        self.fail_pings = true;
        self
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn bulk_batch_sizes(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::Bulk { documents, .. } => Some(documents),
                _ => None,
            })
            .collect()
    }

    pub fn created_indices(&self) -> Vec<(String, IndexSettings)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::CreateIndex { index, settings } => Some((index, settings)),
                _ => None,
            })
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ClusterCall::Ping))
            .count()
    }

    /// Documents the mock answered as created.
    pub fn indexed_documents(&self) -> Vec<Value> {
        self.documents.lock().unwrap().clone()
    }

    pub fn max_bulk_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: ClusterCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl SearchCluster for MockCluster {
    async fn ping(&self) -> Result<(), ClientError> {
        self.record(ClusterCall::Ping);
        if self.fail_pings {
            return Err(ClientError::Status {
                operation: "ping",
                status: 503,
                body: String::new(),
            });
        }
        Ok(())
    }

    async fn health(
        &self,
        index: Option<&str>,
        _wait: Duration,
    ) -> Result<ClusterHealth, ClientError> {
        self.record(ClusterCall::Health {
            index: index.map(str::to_string),
        });
        let status = self
            .health
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(HealthStatus::Green);
        Ok(ClusterHealth::new(status))
    }

    async fn index_exists(&self, index: &str) -> Result<bool, ClientError> {
        self.record(ClusterCall::IndexExists(index.to_string()));
        Ok(self.existing.lock().unwrap().contains(index))
    }

    async fn create_index(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<(), ClientError> {
        self.record(ClusterCall::CreateIndex {
            index: index.to_string(),
            settings: settings.clone(),
        });
        if !self.existing.lock().unwrap().insert(index.to_string()) {
            return Err(ClientError::Status {
                operation: "create index",
                status: 400,
                body: "resource_already_exists_exception".to_string(),
            });
        }
        Ok(())
    }

    async fn bulk(&self, index: &str, documents: &[Value]) -> Result<BulkResponse, ClientError> {
        self.record(ClusterCall::Bulk {
            index: index.to_string(),
            documents: documents.len(),
        });

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if let Some(delay) = self.bulk_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = self
            .bulk_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockBulk::Accept);
        let (statuses, answered) = match script {
            MockBulk::Accept => (Vec::new(), documents.len()),
            MockBulk::RejectRequest => {
                return Err(ClientError::Status {
                    operation: "bulk",
                    status: 429,
                    body: "es_rejected_execution_exception".to_string(),
                })
            }
            MockBulk::FailRequest => {
                return Err(ClientError::Status {
                    operation: "bulk",
                    status: 500,
                    body: "internal_server_error".to_string(),
                })
            }
            MockBulk::ItemStatus(statuses) => (statuses, documents.len()),
            MockBulk::Truncated(n) => (Vec::new(), n.min(documents.len())),
        };

        let mut items = Vec::with_capacity(documents.len());
        let mut indexed = self.documents.lock().unwrap();
        for (position, document) in documents.iter().enumerate().take(answered) {
            let status = statuses.get(position).copied().unwrap_or(201);
            if status < 300 {
                indexed.push(document.clone());
                items.push(BulkItem::indexed(index, Some(position.to_string()), status));
            } else if status == 429 {
                items.push(BulkItem::failed(
                    index,
                    status,
                    "es_rejected_execution_exception",
                    "rejected execution",
                ));
            } else {
                items.push(BulkItem::failed(
                    index,
                    status,
                    "mapper_parsing_exception",
                    "failed to parse",
                ));
            }
        }

        Ok(BulkResponse {
            took: 1,
            errors: items.iter().any(BulkItem::is_failure),
            items,
        })
    }
}
