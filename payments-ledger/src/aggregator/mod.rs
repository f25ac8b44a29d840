//! Metrics aggregator
//!
//! Turns ledger mutations into time-bucketed rollups: daily and weekly
//! network buckets, per-token and per-operator daily buckets, and the
//! network-wide totals. Collectors compute deltas, [`apply`] writes them.

pub mod apply;
pub mod buckets;
pub mod collectors;

pub use collectors::{Change, Counter, MetricDelta, MetricTarget};

use crate::{error::Result, ledger::LedgerMutation, store::UnitOfWork};

/// Roll `mutations` into the buckets of `timestamp`. Returns the number of
/// clamped decrements.
pub fn aggregate(
    uow: &mut UnitOfWork<'_>,
    timestamp: u64,
    mutations: &[LedgerMutation],
) -> Result<u32> {
    let deltas: Vec<MetricDelta> = mutations.iter().flat_map(collectors::collect).collect();
    apply::apply_deltas(uow, timestamp, &deltas)
}
