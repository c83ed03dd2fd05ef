//! Dispatch orchestration and transaction lifecycle integration.
//!
//! The provider is the entry point business logic calls to raise events. It
//! decides whether a blocking dispatch needs a sequence number and a network
//! call at all, runs the blocking chain through the deliverer, and parks
//! non-blocking payloads until the owning transaction commits. At commit it
//! synthesizes one `user.sync` per distinct user the transaction touched,
//! persists the whole batch atomically, and after commit fans the batch out
//! best-effort.
//!
//! One provider instance serves exactly one request/transaction. The pending
//! payload list and the registration flag are transaction-scoped state;
//! sharing an instance across transactions would leak events between them.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::{
    BlockingPayload, Clock, CoreError, Event, EventContext, EventStore, Mutations,
    NonBlockingPayload, UserSnapshot,
};
use tokio::sync::Mutex;

use crate::{
    deliverer::{Deliverer, DeliveryOutcome},
    error::{ErrorCategory, Result},
    transport::HookTransport,
};

/// Reads current user state for `user.sync` synthesis.
#[async_trait]
pub trait UserReader: Send + Sync {
    /// Loads the user's current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` when the user does not exist.
    async fn load_user(&self, user_id: &str) -> gatehouse_core::Result<UserSnapshot>;
}

/// Work hooked into the owning transaction's lifecycle.
#[async_trait]
pub trait TxLifecycleHook: Send + Sync {
    /// Runs inside the transaction, immediately before commit. An error
    /// aborts the commit.
    async fn will_commit_tx(&self) -> Result<()>;

    /// Runs after a successful commit. Must not fail the caller.
    async fn did_commit_tx(&self);
}

/// Transaction layer surface for registering lifecycle hooks.
pub trait TxHookRegistrar {
    /// Registers a hook to be driven by the transaction's lifecycle.
    fn use_hook(&mut self, hook: Arc<dyn TxLifecycleHook>);
}

/// Per-transaction event dispatch orchestrator.
pub struct HookProvider<T> {
    deliverer: Deliverer<T>,
    store: Arc<dyn EventStore>,
    users: Arc<dyn UserReader>,
    clock: Arc<dyn Clock>,
    context: EventContext,
    pending: Mutex<Vec<NonBlockingPayload>>,
    persisted: Mutex<Vec<Event>>,
    hooked: AtomicBool,
}

impl<T: HookTransport + 'static> HookProvider<T> {
    /// Creates a provider scoped to one request/transaction.
    ///
    /// `context` carries the ambient request data (languages, trigger,
    /// OAuth state); the timestamp is re-stamped per event at dispatch.
    pub fn new(
        deliverer: Deliverer<T>,
        store: Arc<dyn EventStore>,
        users: Arc<dyn UserReader>,
        clock: Arc<dyn Clock>,
        context: EventContext,
    ) -> Self {
        Self {
            deliverer,
            store,
            users,
            clock,
            context,
            pending: Mutex::new(Vec::new()),
            persisted: Mutex::new(Vec::new()),
            hooked: AtomicBool::new(false),
        }
    }

    /// Dispatches a blocking event and waits for the verdict.
    ///
    /// When no handler is bound to the event type, no sequence number is
    /// consumed and no network call happens; the returned event carries the
    /// `seq = 0` sentinel and the unchanged payload.
    ///
    /// # Errors
    ///
    /// `HookError::Disallowed` when a handler vetoes the operation; other
    /// variants for infrastructure failures. Either way the input payload is
    /// not committed by the caller.
    pub async fn dispatch_blocking(&self, payload: BlockingPayload) -> Result<DeliveryOutcome> {
        let typ = payload.event_type();

        if !self.deliverer.will_deliver_blocking_event(typ) {
            let event = Event::new_blocking(0, payload, self.context_now());
            return Ok(DeliveryOutcome {
                event,
                mutations: Mutations::default(),
                mutated: false,
            });
        }

        let seq = self.store.next_sequence_number().await?;
        let event = Event::new_blocking(seq, payload, self.context_now());
        self.deliverer.deliver_blocking_event(&event).await
    }

    /// Queues a non-blocking payload for delivery after commit.
    ///
    /// The first call registers this provider with the transaction's
    /// lifecycle; subsequent calls only append.
    pub async fn dispatch_non_blocking(
        self: &Arc<Self>,
        registrar: &mut dyn TxHookRegistrar,
        payload: NonBlockingPayload,
    ) {
        self.pending.lock().await.push(payload);

        if !self.hooked.swap(true, Ordering::SeqCst) {
            registrar.use_hook(self.clone());
        }
    }

    fn context_now(&self) -> EventContext {
        let mut context = self.context.clone();
        context.timestamp = DateTime::<Utc>::from(self.clock.now_system());
        context
    }

    /// Appends one `user.sync` per distinct user touched by an operation.
    ///
    /// Sign-in and the synthesized sync itself are not operations; deleted
    /// users are skipped since there is no post-commit state to re-read.
    async fn synthesize_user_sync(&self, pending: &mut Vec<NonBlockingPayload>) -> Result<()> {
        let deleted: BTreeSet<String> =
            pending.iter().flat_map(NonBlockingPayload::deleted_user_ids).collect();

        let touched: BTreeSet<String> = pending
            .iter()
            .filter(|p| p.is_operation())
            .map(|p| p.user_id().to_string())
            .filter(|id| !deleted.contains(id))
            .collect();

        for user_id in touched {
            match self.users.load_user(&user_id).await {
                Ok(user) => pending.push(NonBlockingPayload::UserSync { user }),
                // Deleted concurrently, nothing left to sync.
                Err(CoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<T: HookTransport + 'static> TxLifecycleHook for HookProvider<T> {
    /// Sequences and persists the pending payloads, still inside the
    /// transaction.
    ///
    /// A payload matching no handler is discarded here without consuming a
    /// sequence number; it still counts toward `user.sync` synthesis first,
    /// so a handler bound only to `user.sync` observes users touched by
    /// operations it is not itself subscribed to. Persistence is a single
    /// atomic batch: a failure aborts the commit rather than committing an
    /// operation whose events were lost.
    async fn will_commit_tx(&self) -> Result<()> {
        let mut pending: Vec<NonBlockingPayload> =
            self.pending.lock().await.drain(..).collect();
        if pending.is_empty() {
            return Ok(());
        }

        self.synthesize_user_sync(&mut pending).await?;

        let kept: Vec<NonBlockingPayload> = pending
            .into_iter()
            .filter(|p| self.deliverer.will_deliver_non_blocking_event(p.event_type()))
            .collect();
        if kept.is_empty() {
            return Ok(());
        }

        let mut events = Vec::with_capacity(kept.len());
        for payload in kept {
            let seq = self.store.next_sequence_number().await?;
            events.push(Event::new_non_blocking(seq, payload, self.context_now()));
        }

        self.store.add_events(&events).await?;

        self.persisted.lock().await.extend(events);
        Ok(())
    }

    /// Fans the persisted batch out to matching handlers, best-effort.
    ///
    /// The operation already committed; a failed delivery is logged and
    /// never surfaces to the caller. Failures do not stop later events in
    /// the batch.
    async fn did_commit_tx(&self) {
        let events: Vec<Event> = self.persisted.lock().await.drain(..).collect();

        for event in events {
            let Some(payload) = event.non_blocking_payload() else {
                continue;
            };
            if !payload.for_webhook() {
                continue;
            }
            if !self.deliverer.will_deliver_non_blocking_event(event.typ) {
                continue;
            }

            if let Err(e) = self.deliverer.deliver_non_blocking_event(&event).await {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.typ,
                    category = %ErrorCategory::from(&e),
                    error = %e,
                    "post-commit delivery failed"
                );
            }
        }
    }
}
