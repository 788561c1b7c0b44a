//! Connection management for a hosted Elasticsearch deployment.
//!
//! A [`Session`] owns the client for one run together with a keepalive task
//! that pings the cluster and re-resolves its hostname, so address changes
//! after a failover show up in the logs.

use crate::cluster::SearchCluster;
use crate::elastic::ElasticsearchCluster;
use crate::error::ClientError;
use elasticsearch::http::Url;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Domain hosted deployments live under.
pub const DEFAULT_CLUSTER_DOMAIN: &str = "aws.found.io";

/// HTTPS port of hosted deployments.
pub const DEFAULT_PORT: u16 = 9243;

/// Connection settings for one deployment.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cluster_id: String,
    pub region: String,
    pub cluster_domain: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub ping_interval: Duration,
    pub dns_ttl: Duration,
}

impl SessionConfig {
    /// `<cluster_id>.<region>.<cluster_domain>`
    pub fn hostname(&self) -> String {
        format!("{}.{}.{}", self.cluster_id, self.region, self.cluster_domain)
    }

    /// HTTPS endpoint without credentials.
    pub fn endpoint(&self) -> String {
        format!("https://{}:{}", self.hostname(), self.port)
    }

    pub fn url(&self) -> Result<Url, ClientError> {
        let endpoint = self.endpoint();
        Url::parse(&endpoint).map_err(|e| ClientError::Endpoint(format!("{endpoint}: {e}")))
    }
}

/// Resolve `host:port` to the first address returned by the system resolver.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ClientError> {
    let mut addresses = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| ClientError::Resolve {
            host: host.to_string(),
            source,
        })?;
    addresses
        .next()
        .ok_or_else(|| ClientError::NoAddress(host.to_string()))
}

/// An open connection to the cluster.
pub struct Session {
    cluster: Arc<ElasticsearchCluster>,
    address: watch::Receiver<SocketAddr>,
    keepalive: JoinHandle<()>,
}

impl Session {
    /// Resolve the deployment hostname, build the client and start the
    /// keepalive task.
    pub async fn open(config: &SessionConfig) -> Result<Self, ClientError> {
        let hostname = config.hostname();
        let address = resolve(&hostname, config.port).await?;
        info!("Connecting client to: {} ({})", hostname, address);

        let cluster = Arc::new(ElasticsearchCluster::connect(
            config.url()?,
            &config.cluster_id,
            &config.username,
            &config.password,
        )?);

        let (address_tx, address_rx) = watch::channel(address);
        let port = config.port;
        let lookup_host = hostname.clone();
        let resolver = move || {
            let host = lookup_host.clone();
            async move { resolve(&host, port).await }
        };
        let keepalive = tokio::spawn(keepalive(
            cluster.clone(),
            hostname,
            address_tx,
            config.ping_interval,
            config.dns_ttl,
            resolver,
        ));

        Ok(Self {
            cluster,
            address: address_rx,
            keepalive,
        })
    }

    pub fn cluster(&self) -> Arc<ElasticsearchCluster> {
        self.cluster.clone()
    }

    /// Most recently resolved address of the deployment.
    pub fn address(&self) -> SocketAddr {
        *self.address.borrow()
    }

    /// Stop the keepalive task and release the client.
    pub async fn close(self) {
        self.keepalive.abort();
        let _ = self.keepalive.await;
        info!("Closed connection to {}", *self.address.borrow());
    }
}

/// Ping the cluster every `ping_interval`, calling `resolver` first when the
/// last resolution is older than `dns_ttl`. Address changes are logged and
/// published on `address`. Runs until aborted.
pub(crate) async fn keepalive<C, R, F>(
    cluster: Arc<C>,
    hostname: String,
    address: watch::Sender<SocketAddr>,
    ping_interval: Duration,
    dns_ttl: Duration,
    resolver: R,
) where
    C: SearchCluster + ?Sized,
    R: Fn() -> F + Send,
    F: Future<Output = Result<SocketAddr, ClientError>> + Send,
{
    let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut resolved_at = Instant::now();

    loop {
        ticker.tick().await;

        if resolved_at.elapsed() >= dns_ttl {
            match resolver().await {
                Ok(current) => {
                    let previous = address.send_replace(current);
                    if previous != current {
                        info!(
                            "Address of {} changed from {} to {}",
                            hostname, previous, current
                        );
                    }
                    resolved_at = Instant::now();
                }
                Err(e) => warn!("Failed to re-resolve {}: {}", hostname, e),
            }
        }

        let current = *address.borrow();
        match cluster.ping().await {
            Ok(()) => debug!("Keepalive ping to {} succeeded", current),
            Err(e) => warn!("Keepalive ping to {} failed: {}", current, e),
        }
    }
}
