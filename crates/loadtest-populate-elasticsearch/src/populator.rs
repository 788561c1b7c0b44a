//! Elasticsearch populator: provision a time-stamped index and fill it with
//! mock documents.

use crate::args::ElasticsearchPopulateArgs;
use crate::document::MockDocument;
use crate::error::PopulatorError;
use crate::index_name::IndexName;
use crate::provision::{ensure_index, Provisioning};
use es_client::bulk::{BulkConfig, BulkListener, BulkProcessor, DrainOutcome};
use es_client::{wait_for_green, SearchCluster};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Metrics from a populate operation.
#[derive(Debug, Clone, Default)]
pub struct PopulateMetrics {
    /// Documents handed to the bulk processor.
    pub documents_added: u64,
    /// Documents that could not be serialized.
    pub build_failures: u64,
    /// Documents the cluster reported as indexed.
    pub documents_indexed: u64,
    /// Documents that failed, individually or with their batch.
    pub documents_failed: u64,
    /// Number of bulk requests executed.
    pub batch_count: u64,
    /// Batches whose request failed as a whole.
    pub failed_batches: u64,
    /// Backoff retries after the cluster rejected work.
    pub retries: u64,
    /// Whether the final drain gave up before every batch was answered.
    pub drain_timed_out: bool,
    /// Total time taken.
    pub total_duration: Duration,
}

impl PopulateMetrics {
    /// Calculate documents added per second.
    pub fn documents_per_second(&self) -> f64 {
        if self.total_duration.as_secs_f64() > 0.0 {
            self.documents_added as f64 / self.total_duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Result of [`IndexLoader::update_index`].
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The index was already there; nothing was loaded.
    AlreadyExists,
    /// The index was created and loaded.
    Loaded(PopulateMetrics),
}

/// What to create and how much to load.
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub shards: u32,
    pub record_count: u64,
    pub bulk: BulkConfig,
    pub drain_timeout: Duration,
    pub health_timeout: Duration,
}

impl From<&ElasticsearchPopulateArgs> for LoaderSettings {
    fn from(args: &ElasticsearchPopulateArgs) -> Self {
        let batch_size = usize::try_from(args.batch_size).unwrap_or(usize::MAX);
        Self {
            shards: args.shards,
            record_count: args.record_count,
            bulk: args.bulk.to_bulk_config(batch_size),
            drain_timeout: args.bulk.drain_timeout,
            health_timeout: args.connection.health_timeout,
        }
    }
}

/// Provisions an index and loads mock documents into it.
pub struct IndexLoader<C: SearchCluster + ?Sized + 'static> {
    cluster: Arc<C>,
    address: String,
    settings: LoaderSettings,
}

impl<C: SearchCluster + ?Sized + 'static> IndexLoader<C> {
    /// Create a loader.
    ///
    /// # Arguments
    ///
    /// * `cluster` - Cluster to provision and load
    /// * `address` - Address of the cluster, used as context in batch logs
    /// * `settings` - Shard count, record count and bulk tuning
    pub fn new(cluster: Arc<C>, address: impl Into<String>, settings: LoaderSettings) -> Self {
        Self {
            cluster,
            address: address.into(),
            settings,
        }
    }

    /// Create `index` if it does not exist yet and load it. An existing index
    /// is left untouched and no documents are loaded.
    pub async fn update_index(&self, index: &IndexName) -> Result<LoadOutcome, PopulatorError> {
        let provisioning = ensure_index(
            &*self.cluster,
            index,
            self.settings.shards,
            self.settings.health_timeout,
        )
        .await?;

        if provisioning == Provisioning::AlreadyExists {
            return Ok(LoadOutcome::AlreadyExists);
        }

        let metrics = self.index_mock_documents(index).await?;
        Ok(LoadOutcome::Loaded(metrics))
    }

    /// Wait for the index to be green, then add `record_count` mock documents
    /// to a bulk processor and drain it.
    pub async fn index_mock_documents(
        &self,
        index: &IndexName,
    ) -> Result<PopulateMetrics, PopulatorError> {
        let start_time = Instant::now();
        let mut metrics = PopulateMetrics::default();

        info!("Waiting for index health to be green");
        wait_for_green(
            &*self.cluster,
            Some(index.as_str()),
            self.settings.health_timeout,
        )
        .await?;

        info!(
            "Populating index '{}' with {} documents (batch size: {})",
            index, self.settings.record_count, self.settings.bulk.bulk_actions
        );

        let processor = BulkProcessor::spawn(
            self.cluster.clone(),
            index.as_str(),
            self.settings.bulk.clone(),
            self.listener(),
        );

        let mut rng = StdRng::from_entropy();
        for _ in 0..self.settings.record_count {
            let document = match MockDocument::random(&mut rng).to_json() {
                Ok(document) => document,
                Err(e) => {
                    error!("Problem building example JSON: {}", e);
                    metrics.build_failures += 1;
                    continue;
                }
            };

            if let Err(e) = processor.add(document).await {
                error!("Problem indexing for address {}: {}", self.address, e);
                continue;
            }
            metrics.documents_added += 1;

            if metrics.documents_added % 10000 == 0 {
                debug!("Added {} documents", metrics.documents_added);
            }
        }

        match processor
            .flush_and_shutdown(self.settings.drain_timeout)
            .await
        {
            DrainOutcome::Drained(stats) => {
                metrics.documents_indexed = stats.documents_indexed;
                metrics.documents_failed = stats.documents_failed;
                metrics.batch_count = stats.executions;
                metrics.failed_batches = stats.failed_executions;
                metrics.retries = stats.retries;
            }
            DrainOutcome::TimedOut => {
                error!(
                    "Problem waiting for batch to process: not drained within {:?}",
                    self.settings.drain_timeout
                );
                metrics.drain_timed_out = true;
            }
            DrainOutcome::Aborted(reason) => {
                error!("Problem waiting for batch to process: {}", reason);
            }
        }

        metrics.total_duration = start_time.elapsed();
        info!(
            "Population complete: {} documents added, {} indexed, {} failed in {:?} ({:.2} docs/sec)",
            metrics.documents_added,
            metrics.documents_indexed,
            metrics.documents_failed,
            metrics.total_duration,
            metrics.documents_per_second()
        );
        if metrics.build_failures > 0 || metrics.failed_batches > 0 || metrics.retries > 0 {
            info!(
                "{} documents could not be built, {} of {} batches failed, {} retries",
                metrics.build_failures, metrics.failed_batches, metrics.batch_count, metrics.retries
            );
        }

        Ok(metrics)
    }

    fn listener(&self) -> BulkListener {
        let before_address = self.address.clone();
        let after_address = self.address.clone();
        let failure_address = self.address.clone();

        BulkListener::new()
            .on_before(move |execution_id, actions| {
                debug!(
                    "Sending: {} records, in execution: {}, to: {}",
                    actions, execution_id, before_address
                );
            })
            .on_after(move |execution_id, _actions, response| {
                if response.has_failures() {
                    error!("{}", response.build_failure_message());
                } else {
                    info!(
                        "Successful execution request: {}, address: {}",
                        execution_id, after_address
                    );
                }
            })
            .on_failure(move |execution_id, _actions, failure| {
                error!(
                    "Bulk Load Failed : {}, address: {}, message: {}",
                    execution_id, failure_address, failure
                );
            })
    }
}
