//! CLI argument definitions for the Elasticsearch populator.

use crate::duration::parse_duration;
use crate::error::PopulatorError;
use clap::Args;
use es_client::bulk::{BackoffPolicy, BulkConfig};
use es_client::session::{DEFAULT_CLUSTER_DOMAIN, DEFAULT_PORT};
use es_client::SessionConfig;
use std::time::Duration;

/// Positional load parameters followed by connection and tuning options.
#[derive(Args, Clone, Debug)]
pub struct ElasticsearchPopulateArgs {
    /// Deployment id, first label of the cluster hostname
    #[arg(value_name = "CLUSTER_ID")]
    pub cluster_id: String,

    /// Deployment region, second label of the cluster hostname
    #[arg(value_name = "REGION")]
    pub region: String,

    /// Username for basic authentication
    #[arg(value_name = "USERNAME")]
    pub username: String,

    /// Password for basic authentication
    #[arg(value_name = "PASSWORD")]
    pub password: String,

    /// Number of primary shards of the new index
    #[arg(value_name = "SHARDS", value_parser = clap::value_parser!(u32).range(1..))]
    pub shards: u32,

    /// Number of mock documents to index
    #[arg(value_name = "RECORD_COUNT")]
    pub record_count: u64,

    /// Number of documents per bulk request
    #[arg(value_name = "BATCH_SIZE", value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: u64,

    #[command(flatten)]
    pub connection: ConnectionOpts,

    #[command(flatten)]
    pub bulk: BulkOpts,

    /// Dry-run mode: validate configuration without contacting the cluster
    #[arg(long)]
    pub dry_run: bool,
}

/// How to reach the deployment.
#[derive(Args, Clone, Debug)]
pub struct ConnectionOpts {
    /// Domain appended to `<cluster_id>.<region>`
    #[arg(long, env = "ES_CLUSTER_DOMAIN", default_value = DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// HTTPS port of the deployment
    #[arg(long, env = "ES_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interval between keepalive pings (e.g. "5s")
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub ping_interval: Duration,

    /// Lifetime of a hostname resolution before it is refreshed (e.g. "5s")
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub dns_ttl: Duration,

    /// Server-side wait per cluster health request (e.g. "30s")
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub health_timeout: Duration,
}

/// Bulk processor tuning.
#[derive(Args, Clone, Debug)]
pub struct BulkOpts {
    /// Maximum time a document stays buffered before its batch is sent
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub flush_interval: Duration,

    /// Maximum time to wait for outstanding batches at the end of the run
    #[arg(long, default_value = "1m", value_parser = parse_duration)]
    pub drain_timeout: Duration,

    /// Batch size ceiling in MiB
    #[arg(long, default_value_t = 8)]
    pub bulk_size_mb: usize,

    /// First backoff delay in milliseconds when the cluster rejects a batch
    #[arg(long, default_value_t = 4000)]
    pub backoff_initial_ms: u64,

    /// Maximum number of backoff retries
    #[arg(long, default_value_t = 3)]
    pub backoff_retries: u32,
}

impl ElasticsearchPopulateArgs {
    /// Reject option combinations clap cannot check on its own.
    pub fn validate(&self) -> Result<(), PopulatorError> {
        let intervals = [
            ("--ping-interval", self.connection.ping_interval),
            ("--dns-ttl", self.connection.dns_ttl),
            ("--health-timeout", self.connection.health_timeout),
            ("--flush-interval", self.bulk.flush_interval),
        ];
        for (flag, value) in intervals {
            if value.is_zero() {
                return Err(PopulatorError::Config(format!("{flag} must be greater than zero")));
            }
        }
        if self.bulk.bulk_size_mb == 0 {
            return Err(PopulatorError::Config(
                "--bulk-size-mb must be greater than zero".to_string(),
            ));
        }
        if self.connection.cluster_domain.is_empty() {
            return Err(PopulatorError::Config(
                "--cluster-domain must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl BulkOpts {
    pub fn to_bulk_config(&self, batch_size: usize) -> BulkConfig {
        BulkConfig::default()
            .with_bulk_actions(batch_size)
            .with_bulk_size_bytes(self.bulk_size_mb.saturating_mul(1024 * 1024))
            .with_flush_interval(Some(self.flush_interval))
            .with_backoff(BackoffPolicy::exponential(
                Duration::from_millis(self.backoff_initial_ms),
                self.backoff_retries,
            ))
    }
}

impl From<&ElasticsearchPopulateArgs> for SessionConfig {
    fn from(args: &ElasticsearchPopulateArgs) -> Self {
        Self {
            cluster_id: args.cluster_id.clone(),
            region: args.region.clone(),
            cluster_domain: args.connection.cluster_domain.clone(),
            port: args.connection.port,
            username: args.username.clone(),
            password: args.password.clone(),
            ping_interval: args.connection.ping_interval,
            dns_ttl: args.connection.dns_ttl,
        }
    }
}
