//! Payments Ledger
//!
//! Event-sourced ledger of payment rails and their rollups, derived from the
//! log stream of a payments settlement contract.
//!
//! # Architecture
//!
//! - **Event Sourcing**: All records are derived from on-chain events
//! - **Single Writer**: One actor applies events strictly in chain order
//! - **Unit of Work**: Ledger and rollup writes of an event commit together
//! - **Batching**: Committed units are flushed to RocksDB in batches
//!
//! # Invariants
//!
//! - Rails only move forward: ZERORATE → ACTIVE → TERMINATED → FINALIZED
//! - Balances and usages never go negative; an underflow clamps at zero
//! - `totalRails` equals the sum of the four per-state totals
//! - Replay: the same event stream always yields the same records

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod actor;
pub mod aggregator;
pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod ids;
pub mod indexer;
pub mod ledger;
pub mod lockup;
pub mod metrics;
pub mod processor;
pub mod query;
pub mod store;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventMeta, PaymentsEvent, RecordedEvent};
pub use indexer::{Indexer, ReplaySummary};
pub use ledger::{FixedNetworkFee, NetworkFeeSource, RailLedger};
pub use processor::{ApplyOutcome, EventProcessor};
pub use query::Reconciliation;
pub use store::{EntityStore, MemoryStore, RocksStore};
pub use types::{Address, RailId, RailState, TxHash, U256};
