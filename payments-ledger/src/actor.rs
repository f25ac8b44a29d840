//! Single-writer indexer actor
//!
//! Events must be applied strictly in order, one to completion before the
//! next. One task owns the store and the staged writes; everything else talks
//! to it through a cloneable [`IndexerHandle`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │           Event delivery (block order)                │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               IndexerHandle (Clone)                   │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              IndexerActor (Single Task)               │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ EventProcessor: cursor → ledger → aggregator   │  │
//! │  │ Staged: WriteSet of committed, unflushed units │  │
//! │  │ Timer or max_batch_size → flush_batch()        │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │                       ▼                               │
//! │             EntityStore::write()                      │
//! │          (atomic write to RocksDB)                    │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Reads flush first, so they always observe every applied event.

use crate::{
    error::{Error, Result},
    events::RecordedEvent,
    processor::{ApplyOutcome, EventProcessor},
    query::ReadSurface,
    store::{EntityStore, WriteSet},
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Duration, Instant};

/// Read run by the actor once staged writes are flushed; receives the flush
/// error instead of a surface when the flush fails
pub type ReadFn = Box<dyn FnOnce(Result<&ReadSurface<'_>>) + Send>;

fn read_fn<F>(read: F) -> ReadFn
where
    F: FnOnce(Result<&ReadSurface<'_>>) + Send + 'static,
{
    Box::new(read)
}

/// Message sent to the indexer actor
pub enum IndexerMessage {
    /// Apply the next event of the stream
    ApplyEvent {
        event: RecordedEvent,
        response: oneshot::Sender<Result<ApplyOutcome>>,
    },

    /// Flush, then run a read against the store
    Query { read: ReadFn },

    /// Flush staged writes immediately
    FlushBatch {
        response: oneshot::Sender<Result<()>>,
    },

    /// Flush and stop; replies with the flush result
    Shutdown {
        response: oneshot::Sender<Result<()>>,
    },
}

/// Batching parameters of the actor
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    /// Flush once this many events are staged
    pub max_batch_size: usize,
    /// Flush staged events at least this often
    pub batch_timeout: Duration,
    /// When off, every event is flushed on its own
    pub enabled: bool,
}

/// Actor that owns the store
pub struct IndexerActor {
    /// Storage backend
    store: Arc<dyn EntityStore>,

    /// Event pipeline
    processor: EventProcessor,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<IndexerMessage>,

    /// Writes of applied events not yet in the store
    staged: WriteSet,

    policy: BatchPolicy,
}

impl IndexerActor {
    /// Create new actor
    pub fn new(
        store: Arc<dyn EntityStore>,
        processor: EventProcessor,
        mailbox: mpsc::Receiver<IndexerMessage>,
        policy: BatchPolicy,
    ) -> Self {
        Self {
            store,
            processor,
            mailbox,
            staged: WriteSet::new(),
            policy,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        // First tick one timeout from now, not immediately
        let mut batch_timer = interval_at(
            Instant::now() + self.policy.batch_timeout,
            self.policy.batch_timeout,
        );
        batch_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(msg) = self.mailbox.recv() => {
                    if let IndexerMessage::Shutdown { response } = msg {
                        let result = self.flush_batch();
                        if let Err(e) = &result {
                            tracing::error!(error = %e, "Error flushing batch on shutdown");
                        }
                        let _ = response.send(result);
                        break;
                    }

                    self.handle_message(msg);

                    let full = self.staged.events() >= self.policy.max_batch_size;
                    if (!self.policy.enabled || full) && self.staged.events() > 0 {
                        if let Err(e) = self.flush_batch() {
                            tracing::error!(error = %e, "Error flushing batch");
                        }
                    }
                }

                // Batch timeout expired
                _ = batch_timer.tick(), if self.staged.events() > 0 => {
                    if let Err(e) = self.flush_batch() {
                        tracing::error!(error = %e, "Error flushing batch on timeout");
                    }
                }

                // Mailbox closed
                else => {
                    if let Err(e) = self.flush_batch() {
                        tracing::error!(error = %e, "Error flushing batch on close");
                    }
                    break;
                }
            }
        }

        tracing::info!("Indexer actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: IndexerMessage) {
        match msg {
            IndexerMessage::ApplyEvent { event, response } => {
                let result = self.apply_event(&event);
                let _ = response.send(result);
            }

            IndexerMessage::Query { read } => match self.flush_batch() {
                Ok(()) => read(Ok(&ReadSurface::new(self.store.as_ref()))),
                Err(e) => read(Err(e)),
            },

            IndexerMessage::FlushBatch { response } => {
                let _ = response.send(self.flush_batch());
            }

            IndexerMessage::Shutdown { response } => {
                // Handled in main loop
                let _ = response.send(Ok(()));
            }
        }
    }

    fn apply_event(&mut self, event: &RecordedEvent) -> Result<ApplyOutcome> {
        let (outcome, writes) = self
            .processor
            .process(self.store.as_ref(), &self.staged, event)?;
        self.staged.merge(writes);
        Ok(outcome)
    }

    /// Flush staged writes to storage
    fn flush_batch(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }

        let events = self.staged.events();
        tracing::debug!(events, records = self.staged.len(), "Flushing batch");

        // Atomic; on failure the writes stay staged for the next attempt
        self.store.write(&self.staged)?;
        self.staged = WriteSet::new();

        self.processor.metrics().record_batch_flush(events);
        Ok(())
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct IndexerHandle {
    sender: mpsc::Sender<IndexerMessage>,
}

impl IndexerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<IndexerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T>>) -> IndexerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Apply an event
    pub async fn apply_event(&self, event: RecordedEvent) -> Result<ApplyOutcome> {
        self.request(|response| IndexerMessage::ApplyEvent { event, response })
            .await
    }

    /// Run a read against the store once every applied event is flushed
    pub async fn query<T, F>(&self, query: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ReadSurface<'_>) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let read = read_fn(move |surface| {
            let _ = tx.send(surface.and_then(query));
        });
        self.sender
            .send(IndexerMessage::Query { read })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Flush staged writes immediately
    pub async fn flush_batch(&self) -> Result<()> {
        self.request(|response| IndexerMessage::FlushBatch { response })
            .await
    }

    /// Shutdown actor; resolves once staged writes are flushed
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|response| IndexerMessage::Shutdown { response })
            .await
    }
}

/// Spawn the indexer actor
pub fn spawn_indexer_actor(
    store: Arc<dyn EntityStore>,
    processor: EventProcessor,
    policy: BatchPolicy,
    mailbox_capacity: usize,
) -> IndexerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1)); // Bounded channel for backpressure
    let actor = IndexerActor::new(store, processor, rx, policy);

    tokio::spawn(async move {
        actor.run().await;
    });

    IndexerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventMeta, PaymentsEvent};
    use crate::ledger::RailLedger;
    use crate::metrics::Metrics;
    use crate::store::MemoryStore;
    use crate::types::{Address, TxHash, U256};

    fn spawn(store: Arc<MemoryStore>, max_batch_size: usize, enabled: bool) -> (IndexerHandle, Metrics) {
        let metrics = Metrics::new().unwrap();
        let processor = EventProcessor::new(RailLedger::with_fixed_fee(U256::zero()), metrics.clone());
        let policy = BatchPolicy {
            max_batch_size,
            batch_timeout: Duration::from_secs(3600),
            enabled,
        };
        (spawn_indexer_actor(store, processor, policy, 16), metrics)
    }

    fn deposit(block: u64) -> RecordedEvent {
        RecordedEvent::new(
            EventMeta {
                block_number: block,
                block_timestamp: 1_700_000_000 + block,
                transaction_hash: TxHash::repeat_byte(block as u8),
                log_index: 0,
            },
            PaymentsEvent::DepositRecorded {
                token: Address::repeat_byte(4),
                from: Address::repeat_byte(1),
                amount: U256::from(10),
            },
        )
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, _) = spawn(Arc::new(MemoryStore::new()), 10, true);
        handle.shutdown().await.unwrap();
        assert!(handle.apply_event(deposit(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_before_returning() {
        let store = Arc::new(MemoryStore::new());
        let (handle, metrics) = spawn(store.clone(), 100, true);

        handle.apply_event(deposit(1)).await.unwrap();
        assert!(store.is_empty());

        handle.shutdown().await.unwrap();
        assert!(!store.is_empty());
        assert_eq!(metrics.batch_flushes.get(), 1);
    }

    #[tokio::test]
    async fn test_actor_batches_until_full() {
        let store = Arc::new(MemoryStore::new());
        let (handle, metrics) = spawn(store.clone(), 3, true);

        for block in 1..=2 {
            handle.apply_event(deposit(block)).await.unwrap();
        }
        assert!(store.is_empty());

        handle.apply_event(deposit(3)).await.unwrap();
        // Flush happens after the response; the next request is ordered behind it
        handle.query(|surface| surface.cursor()).await.unwrap();
        assert_eq!(metrics.batch_flushes.get(), 1);
        assert_eq!(metrics.events_applied.get(), 3);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reads_flush_first() {
        let store = Arc::new(MemoryStore::new());
        let (handle, _) = spawn(store.clone(), 100, true);

        handle.apply_event(deposit(1)).await.unwrap();
        let cursor = handle
            .query(|surface| surface.cursor())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.block_number, 1);
        assert!(!store.is_empty());

        let network = handle
            .query(|surface| surface.network_metric())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(network.total_tokens, U256::one());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unbatched_writes_through() {
        let store = Arc::new(MemoryStore::new());
        let (handle, metrics) = spawn(store.clone(), 100, false);

        handle.apply_event(deposit(1)).await.unwrap();
        handle.flush_batch().await.unwrap();
        assert_eq!(metrics.batch_flushes.get(), 1);
        assert!(!store.is_empty());

        handle.shutdown().await.unwrap();
    }
}
