//! One load run: connect, provision, load, close.

use crate::logging::masked_endpoint;
use es_client::{Session, SessionConfig};
use loadtest_populate_elasticsearch::{
    ElasticsearchPopulateArgs, IndexLoader, IndexName, LoadOutcome, LoaderSettings,
};
use tracing::{error, info};

/// Run a load against the deployment described by `args`.
///
/// Connection and load problems are logged, not returned: the process still
/// exits normally once the session is closed. Only invalid options are errors.
pub async fn run_load(args: ElasticsearchPopulateArgs) -> anyhow::Result<()> {
    args.validate()?;

    let config = SessionConfig::from(&args);
    let settings = LoaderSettings::from(&args);
    let index = IndexName::now();

    info!(
        "Loading {} documents into {} on {} ({} shards, batch size {})",
        settings.record_count,
        index,
        masked_endpoint(&config.username, &config.password, &config.endpoint()),
        settings.shards,
        settings.bulk.bulk_actions
    );

    if args.dry_run {
        info!("Dry-run mode: configuration is valid, not contacting the cluster");
        return Ok(());
    }

    let session = match Session::open(&config).await {
        Ok(session) => session,
        Err(e) => {
            error!("Problem connecting to elastic search: {}", e);
            return Ok(());
        }
    };

    let loader = IndexLoader::new(session.cluster(), session.address().to_string(), settings);
    match loader.update_index(&index).await {
        Ok(LoadOutcome::AlreadyExists) => {
            info!("Index {} already exists, no documents loaded", index);
        }
        Ok(LoadOutcome::Loaded(metrics)) => {
            if metrics.drain_timed_out {
                error!("Index {} may be incomplete: outstanding batches were abandoned", index);
            }
            info!(
                "Finished {}: {} documents indexed, {} failed, {} batches ({} failed, {} retries), {} documents not built",
                index,
                metrics.documents_indexed,
                metrics.documents_failed,
                metrics.batch_count,
                metrics.failed_batches,
                metrics.retries,
                metrics.build_failures
            );
        }
        Err(e) => {
            error!("Problem loading index {}: {}", index, e);
        }
    }

    session.close().await;
    Ok(())
}
