//! Buffering bulk processor.
//!
//! Documents are handed to a single worker task through a bounded channel. The
//! worker accumulates them and sends a `_bulk` request when the action count or
//! the byte size threshold is reached, when the flush interval elapses, or when
//! the processor is shut down. Exactly one request is in flight at a time.

use super::{BackoffPolicy, BulkItem, BulkListener, BulkResponse};
use crate::cluster::SearchCluster;
use crate::error::{ClientError, TOO_MANY_REQUESTS};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Default number of actions per batch.
pub const DEFAULT_BULK_ACTIONS: usize = 1000;

/// Default batch size ceiling in bytes (8 MiB).
pub const DEFAULT_BULK_SIZE_BYTES: usize = 8 * 1024 * 1024;

/// Default maximum time a document waits in the buffer.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Bytes added per document for the `{"index":{}}` action line and newlines.
const ACTION_LINE_BYTES: usize = 14;

/// Upper bound of the queue between the handle and the worker, independent of
/// the action threshold.
const MAX_QUEUED_DOCUMENTS: usize = 1 << 16;

/// Flush thresholds and retry policy of a bulk processor.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub bulk_actions: usize,
    pub bulk_size_bytes: usize,
    pub flush_interval: Option<Duration>,
    pub backoff: BackoffPolicy,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            bulk_actions: DEFAULT_BULK_ACTIONS,
            bulk_size_bytes: DEFAULT_BULK_SIZE_BYTES,
            flush_interval: Some(DEFAULT_FLUSH_INTERVAL),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl BulkConfig {
    pub fn with_bulk_actions(mut self, bulk_actions: usize) -> Self {
        self.bulk_actions = bulk_actions.max(1);
        self
    }

    pub fn with_bulk_size_bytes(mut self, bulk_size_bytes: usize) -> Self {
        self.bulk_size_bytes = bulk_size_bytes;
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Option<Duration>) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Counters collected by the worker over the processor's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkStats {
    /// Number of batches sent (retries of a batch are not counted again).
    pub executions: u64,
    /// Number of batches that failed as a whole.
    pub failed_executions: u64,
    /// Documents handed to the cluster.
    pub documents_sent: u64,
    /// Documents the cluster reported as indexed.
    pub documents_indexed: u64,
    /// Documents that failed, individually or with their whole batch.
    pub documents_failed: u64,
    /// Number of backoff retries performed.
    pub retries: u64,
}

/// Result of [`BulkProcessor::flush_and_shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every buffered document was sent and the worker finished.
    Drained(BulkStats),
    /// The worker was still sending when the timeout elapsed.
    TimedOut,
    /// The worker task ended abnormally.
    Aborted(String),
}

/// Handle used to add documents to a running bulk worker.
pub struct BulkProcessor {
    sender: mpsc::Sender<Value>,
    worker: JoinHandle<BulkStats>,
}

impl BulkProcessor {
    /// Start a worker that indexes every added document into `index`.
    pub fn spawn<C>(
        cluster: Arc<C>,
        index: impl Into<String>,
        config: BulkConfig,
        listener: BulkListener,
    ) -> Self
    where
        C: SearchCluster + ?Sized + 'static,
    {
        let (sender, receiver) = mpsc::channel(config.bulk_actions.clamp(1, MAX_QUEUED_DOCUMENTS));
        let worker = BulkWorker {
            cluster,
            index: index.into(),
            config,
            listener,
            buffer: Vec::new(),
            buffer_bytes: 0,
            next_execution_id: 0,
            stats: BulkStats::default(),
        };
        let worker = tokio::spawn(worker.run(receiver));
        Self { sender, worker }
    }

    /// Queue one document. Waits while the worker's queue is full.
    pub async fn add(&self, document: Value) -> Result<(), ClientError> {
        self.sender
            .send(document)
            .await
            .map_err(|_| ClientError::ProcessorClosed)
    }

    /// Stop accepting documents, flush what is buffered and wait up to
    /// `timeout` for the worker to finish.
    ///
    /// On `TimedOut` the worker keeps running in the background until it is
    /// done or the runtime shuts down.
    pub async fn flush_and_shutdown(self, timeout: Duration) -> DrainOutcome {
        let Self { sender, mut worker } = self;
        drop(sender);
        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(Ok(stats)) => DrainOutcome::Drained(stats),
            Ok(Err(e)) => DrainOutcome::Aborted(e.to_string()),
            Err(_) => DrainOutcome::TimedOut,
        }
    }
}

struct BulkWorker<C: ?Sized> {
    cluster: Arc<C>,
    index: String,
    config: BulkConfig,
    listener: BulkListener,
    buffer: Vec<Value>,
    buffer_bytes: usize,
    next_execution_id: u64,
    stats: BulkStats,
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl<C: SearchCluster + ?Sized> BulkWorker<C> {
    async fn run(mut self, mut receiver: mpsc::Receiver<Value>) -> BulkStats {
        let mut ticker = self.config.flush_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Some(document) => self.push(document).await,
                    None => break,
                },
                _ = tick(&mut ticker) => {
                    if !self.buffer.is_empty() {
                        debug!("Flush interval elapsed with {} buffered documents", self.buffer.len());
                        self.flush().await;
                    }
                }
            }
        }

        self.flush().await;
        self.stats
    }

    async fn push(&mut self, document: Value) {
        self.buffer_bytes += document.to_string().len() + ACTION_LINE_BYTES;
        self.buffer.push(document);

        if self.buffer.len() >= self.config.bulk_actions
            || self.buffer_bytes >= self.config.bulk_size_bytes
        {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let documents = std::mem::take(&mut self.buffer);
        self.buffer_bytes = 0;
        self.next_execution_id += 1;
        let execution_id = self.next_execution_id;
        let actions = documents.len();

        self.listener.before(execution_id, actions);
        self.stats.executions += 1;
        self.stats.documents_sent += actions as u64;

        match self.execute_with_backoff(&documents).await {
            Ok(response) => {
                let failed = response.failed_count() as u64;
                self.stats.documents_failed += failed;
                self.stats.documents_indexed += actions as u64 - failed.min(actions as u64);
                self.listener.after(execution_id, actions, &response);
            }
            Err(err) => {
                self.stats.failed_executions += 1;
                self.stats.documents_failed += actions as u64;
                self.listener.after_failure(execution_id, actions, &err);
            }
        }
    }

    /// Send `documents`, resending rejected (429) items or a rejected request
    /// according to the backoff policy. The returned response has one item per
    /// document, holding the last answer received for it.
    ///
    /// An error is returned only when no round produced per-item results. Once
    /// the cluster has answered items, a later failed round marks the items
    /// still pending as failed and the merged response is returned.
    async fn execute_with_backoff(
        &mut self,
        documents: &[Value],
    ) -> Result<BulkResponse, ClientError> {
        let mut delays = self.config.backoff.delays();
        let mut slots: Vec<Option<BulkItem>> = vec![None; documents.len()];
        let mut pending: Vec<usize> = (0..documents.len()).collect();
        let mut answered = false;
        let mut took = 0;

        loop {
            let result = if pending.len() == documents.len() {
                self.cluster.bulk(&self.index, documents).await
            } else {
                let retry: Vec<Value> = pending.iter().map(|&i| documents[i].clone()).collect();
                self.cluster.bulk(&self.index, &retry).await
            };

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    if err.is_rejected() {
                        if let Some(delay) = delays.next() {
                            warn!(
                                "Bulk request of {} documents rejected, retrying in {:?}",
                                pending.len(),
                                delay
                            );
                            self.stats.retries += 1;
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                    if !answered {
                        return Err(err);
                    }
                    error!(
                        "Retry of {} bulk items failed: {}",
                        pending.len(),
                        err
                    );
                    let status = err.status().unwrap_or_default();
                    for &position in &pending {
                        slots[position] = Some(BulkItem::failed(
                            &self.index,
                            status,
                            "bulk_retry_failed",
                            &err.to_string(),
                        ));
                    }
                    break;
                }
            };

            answered = true;
            took += response.took;
            let mut rejected = Vec::new();
            for (&position, item) in pending.iter().zip(response.items) {
                if item.result().status == TOO_MANY_REQUESTS {
                    rejected.push(position);
                }
                slots[position] = Some(item);
            }

            if rejected.is_empty() {
                break;
            }
            match delays.next() {
                Some(delay) => {
                    warn!(
                        "{} bulk items rejected, retrying in {:?}",
                        rejected.len(),
                        delay
                    );
                    self.stats.retries += 1;
                    tokio::time::sleep(delay).await;
                    pending = rejected;
                }
                None => {
                    error!(
                        "{} bulk items still rejected after {} retries",
                        rejected.len(),
                        self.config.backoff.max_retries
                    );
                    break;
                }
            }
        }

        let missing = slots.iter().filter(|slot| slot.is_none()).count();
        if missing > 0 {
            warn!("{} documents got no item in the bulk response", missing);
        }
        let items: Vec<BulkItem> = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    BulkItem::failed(
                        &self.index,
                        0,
                        "missing_bulk_item",
                        "no item returned for document",
                    )
                })
            })
            .collect();
        let errors = items.iter().any(BulkItem::is_failure);
        Ok(BulkResponse {
            took,
            errors,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBulk, MockCluster};
    use serde_json::json;
    use std::sync::Mutex;

    fn config(bulk_actions: usize) -> BulkConfig {
        BulkConfig::default()
            .with_bulk_actions(bulk_actions)
            .with_flush_interval(None)
            .with_backoff(BackoffPolicy::exponential(Duration::from_millis(4000), 3))
    }

    fn recording_listener() -> (BulkListener, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let before = events.clone();
        let after = events.clone();
        let failure = events.clone();
        let listener = BulkListener::new()
            .on_before(move |id, n| before.lock().unwrap().push(format!("before {id} {n}")))
            .on_after(move |id, n, r| {
                after
                    .lock()
                    .unwrap()
                    .push(format!("after {id} {n} failed={}", r.failed_count()))
            })
            .on_failure(move |id, n, _| failure.lock().unwrap().push(format!("failure {id} {n}")));
        (listener, events)
    }

    async fn add_documents(processor: &BulkProcessor, count: usize) {
        for i in 0..count {
            processor.add(json!({ "n": i })).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_flushes_on_action_threshold() {
        let cluster = Arc::new(MockCluster::new());
        let processor =
            BulkProcessor::spawn(cluster.clone(), "idx", config(3), BulkListener::new());

        add_documents(&processor, 7).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes(), vec![3, 3, 1]);
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected drained, got {outcome:?}");
        };
        assert_eq!(stats.executions, 3);
        assert_eq!(stats.documents_sent, 7);
        assert_eq!(stats.documents_indexed, 7);
        assert_eq!(stats.documents_failed, 0);
        assert_eq!(cluster.indexed_documents().len(), 7);
    }

    #[tokio::test]
    async fn test_flushes_on_byte_ceiling() {
        let cluster = Arc::new(MockCluster::new());
        // Each document is 46 bytes of JSON plus the action line: 60 bytes.
        let config = config(1000).with_bulk_size_bytes(100);
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config, BulkListener::new());

        for _ in 0..5 {
            processor
                .add(json!({ "pad": "x".repeat(36) }))
                .await
                .unwrap();
        }
        processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes(), vec![2, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_on_interval() {
        let cluster = Arc::new(MockCluster::new());
        let config = config(100).with_flush_interval(Some(Duration::from_secs(5)));
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config, BulkListener::new());

        add_documents(&processor, 2).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(cluster.bulk_batch_sizes(), vec![2]);

        processor.flush_and_shutdown(Duration::from_secs(60)).await;
        assert_eq!(cluster.bulk_batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn test_zero_documents_sends_nothing() {
        let cluster = Arc::new(MockCluster::new());
        let processor =
            BulkProcessor::spawn(cluster.clone(), "idx", config(10), BulkListener::new());

        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(outcome, DrainOutcome::Drained(BulkStats::default()));
        assert!(cluster.bulk_batch_sizes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rejected_items() {
        let cluster = Arc::new(
            MockCluster::new().with_bulk_script(vec![MockBulk::ItemStatus(vec![201, 429, 201])]),
        );
        let (listener, events) = recording_listener();
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config(3), listener);

        add_documents(&processor, 3).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes(), vec![3, 1]);
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected drained, got {outcome:?}");
        };
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.documents_indexed, 3);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["before 1 3".to_string(), "after 1 3 failed=0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_item_failures_are_not_retried() {
        let cluster = Arc::new(
            MockCluster::new().with_bulk_script(vec![MockBulk::ItemStatus(vec![201, 400])]),
        );
        let (listener, events) = recording_listener();
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config(2), listener);

        add_documents(&processor, 2).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes(), vec![2]);
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected drained, got {outcome:?}");
        };
        assert_eq!(stats.documents_indexed, 1);
        assert_eq!(stats.documents_failed, 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["before 1 2".to_string(), "after 1 2 failed=1".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_gives_up_after_max_retries() {
        let cluster = Arc::new(MockCluster::new().with_bulk_script(vec![
            MockBulk::RejectRequest,
            MockBulk::RejectRequest,
            MockBulk::RejectRequest,
            MockBulk::RejectRequest,
        ]));
        let (listener, events) = recording_listener();
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config(2), listener);

        let started = Instant::now();
        add_documents(&processor, 2).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes(), vec![2, 2, 2, 2]);
        assert!(started.elapsed() >= Duration::from_millis(4000 + 4010 + 4030));
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected drained, got {outcome:?}");
        };
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.documents_failed, 2);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["before 1 2".to_string(), "failure 1 2".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_retry_keeps_answered_items() {
        let cluster = Arc::new(MockCluster::new().with_bulk_script(vec![
            MockBulk::ItemStatus(vec![201, 429, 201]),
            MockBulk::FailRequest,
        ]));
        let (listener, events) = recording_listener();
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config(3), listener);

        add_documents(&processor, 3).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes(), vec![3, 1]);
        assert_eq!(cluster.indexed_documents().len(), 2);
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected drained, got {outcome:?}");
        };
        assert_eq!(stats.failed_executions, 0);
        assert_eq!(stats.documents_indexed, 2);
        assert_eq!(stats.documents_failed, 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["before 1 3".to_string(), "after 1 3 failed=1".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_retry_request_keeps_answered_items() {
        let cluster = Arc::new(MockCluster::new().with_bulk_script(vec![
            MockBulk::ItemStatus(vec![429, 201]),
            MockBulk::RejectRequest,
            MockBulk::RejectRequest,
            MockBulk::RejectRequest,
        ]));
        let (listener, events) = recording_listener();
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config(2), listener);

        add_documents(&processor, 2).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes(), vec![2, 1, 1, 1]);
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected drained, got {outcome:?}");
        };
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.failed_executions, 0);
        assert_eq!(stats.documents_indexed, 1);
        assert_eq!(stats.documents_failed, 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["before 1 2".to_string(), "after 1 2 failed=1".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_rejections_stop_after_max_retries() {
        let cluster = Arc::new(MockCluster::new().with_bulk_script(vec![
            MockBulk::ItemStatus(vec![201, 429]),
            MockBulk::ItemStatus(vec![429]),
            MockBulk::ItemStatus(vec![429]),
            MockBulk::ItemStatus(vec![429]),
        ]));
        let (listener, events) = recording_listener();
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config(2), listener);

        let started = Instant::now();
        add_documents(&processor, 2).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes(), vec![2, 1, 1, 1]);
        assert!(started.elapsed() >= Duration::from_millis(4000 + 4010 + 4030));
        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected drained, got {outcome:?}");
        };
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.documents_indexed, 1);
        assert_eq!(stats.documents_failed, 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["before 1 2".to_string(), "after 1 2 failed=1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_items_count_as_failed() {
        let cluster = Arc::new(MockCluster::new().with_bulk_script(vec![MockBulk::Truncated(1)]));
        let (listener, events) = recording_listener();
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config(3), listener);

        add_documents(&processor, 3).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        let DrainOutcome::Drained(stats) = outcome else {
            panic!("expected drained, got {outcome:?}");
        };
        assert_eq!(stats.documents_indexed, 1);
        assert_eq!(stats.documents_failed, 2);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["before 1 3".to_string(), "after 1 3 failed=2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_huge_action_threshold_does_not_size_the_queue() {
        let cluster = Arc::new(MockCluster::new());
        let config = config(1).with_bulk_actions(usize::MAX);
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config, BulkListener::new());

        add_documents(&processor, 3).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert!(matches!(outcome, DrainOutcome::Drained(_)));
        assert_eq!(cluster.bulk_batch_sizes(), vec![3]);
    }

    #[tokio::test]
    async fn test_server_error_fails_batch_without_retry() {
        let cluster = Arc::new(MockCluster::new().with_bulk_script(vec![MockBulk::FailRequest]));
        let (listener, events) = recording_listener();
        let processor = BulkProcessor::spawn(cluster.clone(), "idx", config(2), listener);

        add_documents(&processor, 4).await;
        processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes(), vec![2, 2]);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "before 1 2".to_string(),
                "failure 1 2".to_string(),
                "before 2 2".to_string(),
                "after 2 2 failed=0".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_never_overlap() {
        let cluster = Arc::new(MockCluster::new().with_bulk_delay(Duration::from_millis(500)));
        let processor =
            BulkProcessor::spawn(cluster.clone(), "idx", config(2), BulkListener::new());

        add_documents(&processor, 10).await;
        processor.flush_and_shutdown(Duration::from_secs(60)).await;

        assert_eq!(cluster.bulk_batch_sizes().len(), 5);
        assert_eq!(cluster.max_bulk_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out() {
        let cluster = Arc::new(MockCluster::new().with_bulk_delay(Duration::from_secs(10)));
        let processor =
            BulkProcessor::spawn(cluster.clone(), "idx", config(10), BulkListener::new());

        add_documents(&processor, 1).await;
        let outcome = processor.flush_and_shutdown(Duration::from_secs(1)).await;

        assert_eq!(outcome, DrainOutcome::TimedOut);
    }
}
