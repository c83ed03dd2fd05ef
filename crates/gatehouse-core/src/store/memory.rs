//! In-memory event store for tests.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::{CoreError, Result},
    event::Event,
};

use super::EventStore;

/// In-memory store with deterministic sequencing and failure injection.
///
/// Sequence numbers start at 1 and increase by one per allocation, which
/// lets tests assert exactly how many numbers a code path consumed.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    seq: AtomicI64,
    events: RwLock<Vec<Event>>,
    add_error: RwLock<Option<String>>,
}

impl MemoryEventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every persisted event, in insertion order.
    pub async fn persisted_events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    /// Number of sequence numbers allocated so far.
    pub fn sequence_numbers_consumed(&self) -> i64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Makes the next `add_events` call fail with the given message.
    pub async fn inject_add_error(&self, message: impl Into<String>) {
        *self.add_error.write().await = Some(message.into());
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn next_sequence_number(&self) -> Result<i64> {
        Ok(self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn add_events(&self, events: &[Event]) -> Result<()> {
        if let Some(message) = self.add_error.write().await.take() {
            return Err(CoreError::Database(message));
        }
        self.events.write().await.extend_from_slice(events);
        Ok(())
    }
}
