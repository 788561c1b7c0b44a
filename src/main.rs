//! Command-line entry point for es-index-loader
//!
//! ```bash
//! # 3 shards, 10000 documents, 1000 documents per bulk request
//! es-index-loader abc123 us-east-1 elastic changeme 3 10000 1000
//!
//! # Validate the options without contacting the cluster
//! es-index-loader abc123 us-east-1 elastic changeme 3 10000 1000 --dry-run
//! ```
//!
//! Fewer positional arguments print the usage line and exit successfully.

use es_index_loader::cli::{parse_invocation, Invocation, USAGE};
use es_index_loader::run::run_load;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = match parse_invocation(std::env::args_os()) {
        Ok(Invocation::Run(cli)) => cli,
        Ok(Invocation::Usage) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(e) => e.exit(),
    };

    run_load(cli.args).await
}
