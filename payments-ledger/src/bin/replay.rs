//! Replay an NDJSON event stream into the ledger
//!
//! ```text
//! rail-replay <events.ndjson> [config.toml]
//! ```
//!
//! Without a config file the configuration comes from `LEDGER_*` variables.

use anyhow::Context;
use payments_ledger::{Config, Indexer};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let events_path = args
        .next()
        .context("usage: rail-replay <events.ndjson> [config.toml]")?;

    let config = match args.next() {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => Config::from_env().context("loading config from environment")?,
    };

    tracing::info!(events = %events_path, data_dir = ?config.data_dir, "Starting replay");

    let indexer = Indexer::open(config).await?;

    let file = tokio::fs::File::open(&events_path)
        .await
        .with_context(|| format!("opening {}", events_path))?;
    let summary = indexer
        .ingest_ndjson(tokio::io::BufReader::new(file))
        .await
        .with_context(|| format!("replaying {}", events_path))?;

    indexer.flush().await?;
    let network = indexer.network_metric().await?;
    let reconciliation = indexer.reconciliation().await?;
    let cursor = indexer.cursor().await?;

    if !reconciliation.is_consistent() {
        tracing::warn!(
            total_rails = %reconciliation.total_rails,
            rails_by_state = %reconciliation.rails_by_state,
            "Rail totals do not reconcile"
        );
    }

    let report = json!({
        "summary": summary,
        "cursor": cursor,
        "network": network,
        "reconciliation": reconciliation,
        "consistent": reconciliation.is_consistent(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    indexer.shutdown().await?;
    Ok(())
}
