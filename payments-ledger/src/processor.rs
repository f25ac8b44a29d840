//! Per-event pipeline: cursor check, ledger, aggregator
//!
//! The ledger and the aggregator share one [`UnitOfWork`], so an event
//! either lands with all of its rollups or not at all. The delivery cursor
//! is written in the same unit; a skipped event advances only the cursor.

use crate::{
    aggregator,
    entities::Cursor,
    error::Result,
    events::RecordedEvent,
    ids,
    ledger::RailLedger,
    metrics::Metrics,
    store::{EntityStore, UnitOfWork, WriteSet},
};
use std::time::Instant;
use tracing::{debug, warn};

/// What happened to one delivered event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Effects written
    Applied {
        /// Ledger mutations fed to the aggregator
        mutations: usize,
        /// Values clamped at zero
        clamps: u32,
    },
    /// Dropped without effects
    Skipped {
        /// Why
        reason: String,
    },
    /// At or before the cursor; ignored
    Duplicate,
}

impl ApplyOutcome {
    /// True for [`ApplyOutcome::Applied`]
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

/// Applies events on top of a store and the staged writes of earlier events
#[derive(Clone)]
pub struct EventProcessor {
    ledger: RailLedger,
    metrics: Metrics,
}

impl EventProcessor {
    /// Create new processor
    pub fn new(ledger: RailLedger, metrics: Metrics) -> Self {
        Self { ledger, metrics }
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Last applied stream position
    pub fn cursor(store: &dyn EntityStore, staged: &WriteSet) -> Result<Option<Cursor>> {
        UnitOfWork::new(store, staged).load(&ids::cursor_key())
    }

    /// Process one event. The returned writes must be staged (or flushed)
    /// before the next event is processed.
    pub fn process(
        &self,
        store: &dyn EntityStore,
        staged: &WriteSet,
        recorded: &RecordedEvent,
    ) -> Result<(ApplyOutcome, WriteSet)> {
        let RecordedEvent { meta, event } = recorded;
        let position = meta.position();

        if let Some(cursor) = Self::cursor(store, staged)? {
            if position <= cursor {
                debug!(
                    event = event.name(),
                    block = meta.block_number,
                    log_index = meta.log_index,
                    cursor_block = cursor.block_number,
                    cursor_log_index = cursor.log_index,
                    "Ignoring re-delivered event"
                );
                self.metrics.record_duplicate();
                return Ok((ApplyOutcome::Duplicate, WriteSet::new()));
            }
        }

        let started = Instant::now();
        let mut uow = UnitOfWork::new(store, staged);

        let result = self.ledger.apply(&mut uow, meta, event).and_then(|effects| {
            let clamps = aggregator::aggregate(&mut uow, meta.block_timestamp, &effects.mutations)?;
            Ok((effects.mutations.len(), effects.clamps + clamps))
        });

        match result {
            Ok((mutations, clamps)) => {
                uow.save(&position)?;
                let mut writes = uow.into_writes();
                writes.record_event();

                self.metrics
                    .record_applied(started.elapsed().as_secs_f64(), clamps);

                debug!(
                    event = event.name(),
                    block = meta.block_number,
                    log_index = meta.log_index,
                    records = writes.len(),
                    "Event applied"
                );

                Ok((ApplyOutcome::Applied { mutations, clamps }, writes))
            }
            Err(err) if err.is_skippable() => {
                drop(uow);

                warn!(
                    event = event.name(),
                    rail_id = ?event.rail_id(),
                    block = meta.block_number,
                    log_index = meta.log_index,
                    error = %err,
                    "Skipping event"
                );
                self.metrics.record_skipped();

                let mut cursor_only = UnitOfWork::new(store, staged);
                cursor_only.save(&position)?;
                let mut writes = cursor_only.into_writes();
                writes.record_event();

                Ok((
                    ApplyOutcome::Skipped {
                        reason: err.to_string(),
                    },
                    writes,
                ))
            }
            Err(err) => Err(err),
        }
    }
}
