//! Prometheus instrumentation of the indexer
//!
//! # Metrics
//!
//! - `ledger_events_applied_total` - Events applied to the ledger
//! - `ledger_events_skipped_total` - Events skipped (missing reference, invalid transition)
//! - `ledger_events_duplicate_total` - Re-delivered events ignored by the cursor
//! - `ledger_clamps_total` - Values clamped at zero instead of going negative
//! - `ledger_batch_flushes_total` - Write batches committed to the store
//! - `ledger_apply_duration_seconds` - Histogram of per-event apply latencies
//! - `ledger_flush_batch_size` - Histogram of events per flushed batch
//!
//! Each collector owns its registry, so several indexers can live in one
//! process.

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Events applied
    pub events_applied: IntCounter,

    /// Events skipped
    pub events_skipped: IntCounter,

    /// Duplicate deliveries
    pub events_duplicate: IntCounter,

    /// Clamp occurrences
    pub clamps: IntCounter,

    /// Batch flushes
    pub batch_flushes: IntCounter,

    /// Apply duration histogram
    pub apply_duration: Histogram,

    /// Flush batch size histogram
    pub flush_batch_size: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn histogram(
    registry: &Registry,
    name: &str,
    help: &str,
    buckets: Vec<f64>,
) -> prometheus::Result<Histogram> {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))?;
    registry.register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        Ok(Self {
            events_applied: counter(
                &registry,
                "ledger_events_applied_total",
                "Total number of events applied",
            )?,
            events_skipped: counter(
                &registry,
                "ledger_events_skipped_total",
                "Total number of events skipped",
            )?,
            events_duplicate: counter(
                &registry,
                "ledger_events_duplicate_total",
                "Total number of re-delivered events ignored",
            )?,
            clamps: counter(
                &registry,
                "ledger_clamps_total",
                "Total number of values clamped at zero",
            )?,
            batch_flushes: counter(
                &registry,
                "ledger_batch_flushes_total",
                "Total number of write batches committed",
            )?,
            apply_duration: histogram(
                &registry,
                "ledger_apply_duration_seconds",
                "Histogram of per-event apply latencies",
                vec![0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.010, 0.050],
            )?,
            flush_batch_size: histogram(
                &registry,
                "ledger_flush_batch_size",
                "Histogram of events per flushed batch",
                vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0],
            )?,
            registry,
        })
    }

    /// Record an applied event
    pub fn record_applied(&self, duration_seconds: f64, clamps: u32) {
        self.events_applied.inc();
        self.apply_duration.observe(duration_seconds);
        self.clamps.inc_by(u64::from(clamps));
    }

    /// Record a skipped event
    pub fn record_skipped(&self) {
        self.events_skipped.inc();
    }

    /// Record an ignored re-delivery
    pub fn record_duplicate(&self) {
        self.events_duplicate.inc();
    }

    /// Record batch flush
    pub fn record_batch_flush(&self, events: usize) {
        self.batch_flushes.inc();
        self.flush_batch_size.observe(events as f64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
