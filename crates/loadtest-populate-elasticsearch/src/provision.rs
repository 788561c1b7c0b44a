//! Index provisioning.

use crate::error::PopulatorError;
use crate::index_name::IndexName;
use es_client::{wait_for_green, IndexSettings, SearchCluster};
use std::time::Duration;
use tracing::info;

/// What [`ensure_index`] found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioning {
    Created,
    AlreadyExists,
}

/// Create `index` with `shards` primary shards, no replicas and refresh
/// disabled, unless it already exists.
///
/// Creation waits for the whole cluster to be green first. Replicas are left
/// for a later step once the data is loaded.
pub async fn ensure_index<C: SearchCluster + ?Sized>(
    cluster: &C,
    index: &IndexName,
    shards: u32,
    health_timeout: Duration,
) -> Result<Provisioning, PopulatorError> {
    if cluster.index_exists(index.as_str()).await? {
        info!("Index {} already exists, nothing to do", index);
        return Ok(Provisioning::AlreadyExists);
    }

    info!("Waiting for cluster health to be green");
    wait_for_green(cluster, None, health_timeout).await?;

    let settings = IndexSettings::bulk_load(shards);
    info!(
        "Creating index {} with {} shards, {} replicas, refresh interval {}",
        index, settings.number_of_shards, settings.number_of_replicas, settings.refresh_interval
    );
    cluster.create_index(index.as_str(), &settings).await?;

    Ok(Provisioning::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use es_client::testing::{ClusterCall, MockCluster};
    use es_client::HealthStatus;

    fn index() -> IndexName {
        IndexName::now()
    }

    #[tokio::test]
    async fn test_creates_missing_index() {
        let cluster = MockCluster::new();
        let index = index();

        let result = ensure_index(&cluster, &index, 3, Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(result, Provisioning::Created);
        assert_eq!(
            cluster.calls(),
            vec![
                ClusterCall::IndexExists(index.to_string()),
                ClusterCall::Health { index: None },
                ClusterCall::CreateIndex {
                    index: index.to_string(),
                    settings: IndexSettings {
                        number_of_shards: 3,
                        number_of_replicas: 0,
                        refresh_interval: "-1".to_string(),
                    },
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_index_is_left_alone() {
        let index = index();
        let cluster = MockCluster::new().with_existing_index(index.as_str());

        let result = ensure_index(&cluster, &index, 3, Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(result, Provisioning::AlreadyExists);
        assert_eq!(
            cluster.calls(),
            vec![ClusterCall::IndexExists(index.to_string())]
        );
    }

    #[tokio::test]
    async fn test_waits_for_green_before_creating() {
        let cluster =
            MockCluster::new().with_health(vec![HealthStatus::Yellow, HealthStatus::Green]);
        let index = index();

        ensure_index(&cluster, &index, 1, Duration::from_secs(30))
            .await
            .unwrap();

        let calls = cluster.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[1], ClusterCall::Health { index: None }));
        assert!(matches!(calls[2], ClusterCall::Health { index: None }));
        assert!(matches!(calls[3], ClusterCall::CreateIndex { .. }));
    }

    #[tokio::test]
    async fn test_shard_count_is_passed_through() {
        for shards in [1, 5, 12] {
            let cluster = MockCluster::new();
            ensure_index(&cluster, &index(), shards, Duration::from_secs(30))
                .await
                .unwrap();

            let created = cluster.created_indices();
            assert_eq!(created.len(), 1);
            assert_eq!(created[0].1, IndexSettings::bulk_load(shards));
        }
    }
}
