//! PostgreSQL event store.
//!
//! Repository over two database objects: the `event_sequence` global
//! sequence and the `events` table. The sequence generator is the single
//! serialization point for event ordering across the whole deployment.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE SEQUENCE event_sequence;
//! CREATE TABLE events (
//!     id         UUID PRIMARY KEY,
//!     seq        BIGINT NOT NULL UNIQUE,
//!     type       TEXT NOT NULL,
//!     payload    JSONB NOT NULL,
//!     context    JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug_span, Instrument};

use crate::{
    error::Result,
    event::Event,
};

use super::EventStore;

/// Production event store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgEventStore {
    pool: Arc<PgPool>,
}

impl PgEventStore {
    /// Creates a new store on the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Persists events inside an already-open transaction.
    ///
    /// This is the variant the commit hook uses so event persistence shares
    /// the fate of the business operation: if the transaction rolls back,
    /// no events are recorded.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if any insert fails; the caller must
    /// roll back the transaction.
    pub async fn add_events_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        events: &[Event],
    ) -> Result<()> {
        let span = debug_span!("add_events", count = events.len());
        async {
            for event in events {
                let payload = serde_json::to_value(&event.payload)?;
                let context = serde_json::to_value(&event.context)?;

                sqlx::query(
                    r"
                    INSERT INTO events (id, seq, type, payload, context)
                    VALUES ($1, $2, $3, $4, $5)
                    ",
                )
                .bind(event.id.0)
                .bind(event.seq)
                .bind(event.typ.as_str())
                .bind(payload)
                .bind(context)
                .execute(&mut **tx)
                .await?;

                tracing::debug!(event_id = %event.id, seq = event.seq, "event persisted");
            }

            Ok(())
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn next_sequence_number(&self) -> Result<i64> {
        let seq: i64 = sqlx::query_scalar("SELECT nextval('event_sequence')")
            .fetch_one(&*self.pool)
            .await?;
        Ok(seq)
    }

    async fn add_events(&self, events: &[Event]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.add_events_in_tx(&mut tx, events).await?;
        tx.commit().await?;
        Ok(())
    }
}
