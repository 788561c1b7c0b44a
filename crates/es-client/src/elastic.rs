//! `SearchCluster` implementation backed by the official Elasticsearch client.

use crate::bulk::BulkResponse;
use crate::cluster::{ClusterHealth, IndexSettings, SearchCluster};
use crate::error::ClientError;
use elasticsearch::auth::Credentials;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::headers::{HeaderName, HeaderValue};
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::http::Url;
use elasticsearch::indices::{IndicesCreateParts, IndicesExistsParts};
use elasticsearch::params::WaitForStatus;
use elasticsearch::{BulkParts, Elasticsearch};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Header the hosted service uses to route requests to the right deployment.
pub const FOUND_CLUSTER_HEADER: &str = "x-found-cluster";

/// HTTP status returned by `_cluster/health` when the wait timed out.
const REQUEST_TIMEOUT: u16 = 408;

/// Elasticsearch REST cluster.
pub struct ElasticsearchCluster {
    client: Elasticsearch,
}

impl ElasticsearchCluster {
    /// Wrap an already configured client.
    pub fn new(client: Elasticsearch) -> Self {
        Self { client }
    }

    /// Build a client for a single node endpoint with basic authentication and
    /// the deployment routing header.
    pub fn connect(
        url: Url,
        cluster_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, ClientError> {
        let header_value = HeaderValue::from_str(cluster_id)
            .map_err(|e| ClientError::Endpoint(format!("invalid cluster id '{cluster_id}': {e}")))?;

        let conn_pool = SingleNodeConnectionPool::new(url);
        let transport = TransportBuilder::new(conn_pool)
            .auth(Credentials::Basic(username.into(), password.into()))
            .header(HeaderName::from_static(FOUND_CLUSTER_HEADER), header_value)
            .build()
            .map_err(|e| ClientError::Endpoint(e.to_string()))?;

        Ok(Self::new(Elasticsearch::new(transport)))
    }
}

/// Turn a non-success response into a `ClientError::Status` carrying the body.
async fn status_error(operation: &'static str, response: Response) -> ClientError {
    let status = response.status_code().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::Status {
        operation,
        status,
        body,
    }
}

#[async_trait::async_trait]
impl SearchCluster for ElasticsearchCluster {
    async fn ping(&self) -> Result<(), ClientError> {
        let response = self.client.ping().send().await?;
        if !response.status_code().is_success() {
            return Err(status_error("ping", response).await);
        }
        Ok(())
    }

    async fn health(
        &self,
        index: Option<&str>,
        wait: Duration,
    ) -> Result<ClusterHealth, ClientError> {
        let indices: Vec<&str> = index.into_iter().collect();
        let parts = if indices.is_empty() {
            ClusterHealthParts::None
        } else {
            ClusterHealthParts::Index(&indices)
        };
        let timeout = format!("{}s", wait.as_secs().max(1));

        let response = self
            .client
            .cluster()
            .health(parts)
            .wait_for_status(WaitForStatus::Green)
            .timeout(&timeout)
            .send()
            .await?;

        // A timed out wait still carries a regular health body.
        let status = response.status_code().as_u16();
        if !response.status_code().is_success() && status != REQUEST_TIMEOUT {
            return Err(status_error("cluster health", response).await);
        }
        let health: ClusterHealth = response.json().await?;
        debug!("Health for {:?}: {:?}", indices, health);
        Ok(health)
    }

    async fn index_exists(&self, index: &str) -> Result<bool, ClientError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await?;
        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(status_error("index exists", response).await),
        }
    }

    async fn create_index(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(settings.to_body())
            .send()
            .await?;
        if !response.status_code().is_success() {
            return Err(status_error("create index", response).await);
        }
        Ok(())
    }

    async fn bulk(&self, index: &str, documents: &[Value]) -> Result<BulkResponse, ClientError> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for document in documents {
            body.push(json!({"index": {}}).into());
            body.push(document.clone().into());
        }

        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .body(body)
            .send()
            .await?;
        if !response.status_code().is_success() {
            return Err(status_error("bulk", response).await);
        }
        Ok(response.json().await?)
    }
}
