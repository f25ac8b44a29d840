//! Main indexer orchestration layer
//!
//! Ties the store, the event processor and the actor together into a
//! high-level API: feed events in chain order, query the derived records.
//!
//! # Example
//!
//! ```no_run
//! use payments_ledger::{Config, Indexer};
//!
//! #[tokio::main]
//! async fn main() -> payments_ledger::Result<()> {
//!     let config = Config::default();
//!     let indexer = Indexer::open(config).await?;
//!
//!     let file = tokio::fs::File::open("events.ndjson").await?;
//!     let summary = indexer.ingest_ndjson(tokio::io::BufReader::new(file)).await?;
//!     println!("applied {}", summary.applied);
//!
//!     indexer.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_indexer_actor, BatchPolicy, IndexerHandle},
    entities::{
        Account, Cursor, DailyMetric, Operator, OperatorApproval, OperatorMetric, PaymentsMetric,
        Rail, RateChangeEntry, Settlement, Token, TokenMetric, UserToken, WeeklyMetric,
    },
    events::RecordedEvent,
    ledger::{FixedNetworkFee, NetworkFeeSource, RailLedger},
    metrics::Metrics,
    processor::{ApplyOutcome, EventProcessor},
    query::Reconciliation,
    store::{EntityStore, RocksStore},
    types::{Address, RailId, TxHash},
    Config, Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::Duration;

/// Counts of a replayed stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Events applied
    pub applied: u64,
    /// Events skipped
    pub skipped: u64,
    /// Re-deliveries ignored
    pub duplicates: u64,
}

impl ReplaySummary {
    fn record(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied { .. } => self.applied += 1,
            ApplyOutcome::Skipped { .. } => self.skipped += 1,
            ApplyOutcome::Duplicate => self.duplicates += 1,
        }
    }

    /// Events seen
    pub fn total(&self) -> u64 {
        self.applied + self.skipped + self.duplicates
    }
}

/// Main indexer interface
pub struct Indexer {
    /// Actor handle for async operations
    handle: IndexerHandle,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Indexer {
    /// Open indexer on RocksDB under `config.data_dir`
    pub async fn open(config: Config) -> Result<Self> {
        let store = Arc::new(RocksStore::open(&config)?);
        Self::with_store(config, store).await
    }

    /// Open indexer on an existing store, with the fee from `config`
    pub async fn with_store(config: Config, store: Arc<dyn EntityStore>) -> Result<Self> {
        let fee_source = Arc::new(FixedNetworkFee(config.ledger.network_fee));
        Self::with_fee_source(config, store, fee_source).await
    }

    /// Open indexer on an existing store with a custom fee source
    pub async fn with_fee_source(
        config: Config,
        store: Arc<dyn EntityStore>,
        fee_source: Arc<dyn NetworkFeeSource>,
    ) -> Result<Self> {
        let metrics = Metrics::new().map_err(|e| Error::Other(format!("Metrics: {}", e)))?;
        let processor = EventProcessor::new(RailLedger::new(fee_source), metrics.clone());

        let policy = BatchPolicy {
            max_batch_size: config.batching.max_batch_size.max(1),
            batch_timeout: Duration::from_millis(config.batching.batch_timeout_ms.max(1)),
            enabled: config.batching.enabled,
        };
        let handle = spawn_indexer_actor(
            store,
            processor,
            policy,
            config.ledger.mailbox_capacity,
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            batching = config.batching.enabled,
            "Indexer opened"
        );

        Ok(Self {
            handle,
            metrics,
            config,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Apply the next event of the stream
    pub async fn apply(&self, event: RecordedEvent) -> Result<ApplyOutcome> {
        self.handle.apply_event(event).await
    }

    /// Apply events in order; stops at the first fatal error
    pub async fn apply_all(
        &self,
        events: impl IntoIterator<Item = RecordedEvent>,
    ) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();
        for event in events {
            let outcome = self.apply(event).await?;
            summary.record(&outcome);
        }
        Ok(summary)
    }

    /// Apply an NDJSON stream, one event per line. Blank lines are ignored;
    /// a line that does not decode stops the replay.
    pub async fn ingest_ndjson<R>(&self, reader: R) -> Result<ReplaySummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut summary = ReplaySummary::default();
        let mut lines = reader.lines();
        let mut line_number = 0u64;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            let event = RecordedEvent::from_json(&line).map_err(|e| {
                tracing::error!(line = line_number, error = %e, "Malformed event line");
                Error::Other(format!("line {}: {}", line_number, e))
            })?;

            let outcome = self.apply(event).await?;
            summary.record(&outcome);
        }

        tracing::info!(
            applied = summary.applied,
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            "Stream ingested"
        );
        Ok(summary)
    }

    /// Network-wide totals
    pub async fn network_metric(&self) -> Result<Option<PaymentsMetric>> {
        self.handle.query(|surface| surface.network_metric()).await
    }

    /// Most recent daily buckets, newest first
    pub async fn daily_metrics(&self, limit: usize) -> Result<Vec<DailyMetric>> {
        self.handle
            .query(move |surface| surface.daily_metrics(limit))
            .await
    }

    /// Most recent weekly buckets, newest first
    pub async fn weekly_metrics(&self, limit: usize) -> Result<Vec<WeeklyMetric>> {
        self.handle
            .query(move |surface| surface.weekly_metrics(limit))
            .await
    }

    /// Daily buckets of the given tokens, newest first
    pub async fn token_metrics(&self, tokens: Vec<Address>, limit: usize) -> Result<Vec<TokenMetric>> {
        self.handle
            .query(move |surface| surface.token_metrics(&tokens, limit))
            .await
    }

    /// Daily buckets of the given operators, newest first
    pub async fn operator_metrics(
        &self,
        operators: Vec<Address>,
        limit: usize,
    ) -> Result<Vec<OperatorMetric>> {
        self.handle
            .query(move |surface| surface.operator_metrics(&operators, limit))
            .await
    }

    /// Rail by id
    pub async fn rail(&self, rail_id: RailId) -> Result<Option<Rail>> {
        self.handle.query(move |surface| surface.rail(&rail_id)).await
    }

    /// Rate-change history of a rail, oldest first
    pub async fn rate_changes(&self, rail_id: RailId) -> Result<Vec<RateChangeEntry>> {
        self.handle
            .query(move |surface| surface.rate_changes(&rail_id))
            .await
    }

    /// Last applied stream position
    pub async fn cursor(&self) -> Result<Option<Cursor>> {
        self.handle.query(|surface| surface.cursor()).await
    }

    /// Compare `totalRails` with the per-state totals
    pub async fn reconciliation(&self) -> Result<Reconciliation> {
        self.handle.query(|surface| surface.reconciliation()).await
    }

    /// Approval of `operator` by `payer` for `token`
    pub async fn approval(
        &self,
        payer: Address,
        operator: Address,
        token: Address,
    ) -> Result<Option<OperatorApproval>> {
        self.handle
            .query(move |surface| surface.approval(&payer, &operator, &token))
            .await
    }

    /// Balance of `account` in `token`
    pub async fn user_token(&self, account: Address, token: Address) -> Result<Option<UserToken>> {
        self.handle
            .query(move |surface| surface.user_token(&account, &token))
            .await
    }

    /// Account by address
    pub async fn account(&self, address: Address) -> Result<Option<Account>> {
        self.handle.query(move |surface| surface.account(&address)).await
    }

    /// Operator by address
    pub async fn operator(&self, address: Address) -> Result<Option<Operator>> {
        self.handle.query(move |surface| surface.operator(&address)).await
    }

    /// Token by address
    pub async fn token(&self, address: Address) -> Result<Option<Token>> {
        self.handle.query(move |surface| surface.token(&address)).await
    }

    /// Settlement emitted at `(tx_hash, log_index)`
    pub async fn settlement(&self, tx_hash: TxHash, log_index: u64) -> Result<Option<Settlement>> {
        self.handle
            .query(move |surface| surface.settlement(&tx_hash, log_index))
            .await
    }

    /// Flush staged writes immediately
    pub async fn flush(&self) -> Result<()> {
        self.handle.flush_batch().await
    }

    /// Shutdown indexer; returns once staged writes are in the store
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("service_name", &self.config.service_name)
            .field("data_dir", &self.config.data_dir)
            .finish()
    }
}
