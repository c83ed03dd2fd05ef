//! Event persistence and global sequence allocation.
//!
//! The store owns two things: the globally monotonic sequence number every
//! dispatched event is stamped with, and the durable record of post-commit
//! events for asynchronous delivery and audit. The sequence lives in the
//! database, not in-process, because its total order must hold across
//! concurrent transactions and processes.

use async_trait::async_trait;

use crate::{error::Result, event::Event};

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

/// Persistence operations required by the event pipeline.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Allocates the next global sequence number.
    ///
    /// Allocation is serialized by the backing store so concurrent
    /// transactions never observe duplicates.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the sequence is unavailable. The
    /// caller must abort the dispatch; there is no client-side fallback.
    async fn next_sequence_number(&self) -> Result<i64>;

    /// Persists a batch of events atomically.
    ///
    /// Called once per transaction from the commit hook with every "after"
    /// event the transaction produced. A failure here is fatal to the
    /// enclosing transaction: committing without these records would lose
    /// audit and notification history.
    async fn add_events(&self, events: &[Event]) -> Result<()>;
}
