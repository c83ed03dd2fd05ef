//! Blocking chain execution and non-blocking fan-out.
//!
//! The deliverer walks the ordered handler chain bound to one event. For
//! blocking events it enforces the total wall-clock budget across the whole
//! chain, feeds each handler the event as mutated so far, folds the
//! accumulated mutations, and stops the chain on the first deny. A deny or
//! an exhausted budget leaves the caller's original event untouched;
//! mutation is copy-on-write all the way down.

use std::sync::Arc;

use gatehouse_core::{Clock, Event, Mutations};
use tracing::{info_span, Instrument};

use crate::{
    config::HookConfig,
    error::{ErrorCategory, HookError, Result},
    transport::HookTransport,
};

/// Result of a successful blocking chain run.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// The event with every accepted mutation applied.
    pub event: Event,
    /// The folded mutation set, in handler order with later handlers
    /// winning field-wise.
    pub mutations: Mutations,
    /// Whether any field actually changed.
    pub mutated: bool,
}

/// Executes handler chains for one configuration.
pub struct Deliverer<T> {
    config: Arc<HookConfig>,
    transport: T,
    clock: Arc<dyn Clock>,
}

impl<T: HookTransport> Deliverer<T> {
    /// Creates a deliverer over the given transport and clock.
    pub fn new(config: Arc<HookConfig>, transport: T, clock: Arc<dyn Clock>) -> Self {
        Self { config, transport, clock }
    }

    /// Whether any blocking handler is bound to this event type.
    pub fn will_deliver_blocking_event(&self, typ: gatehouse_core::EventType) -> bool {
        self.config.will_deliver_blocking_event(typ)
    }

    /// Whether any non-blocking handler matches this event type.
    pub fn will_deliver_non_blocking_event(&self, typ: gatehouse_core::EventType) -> bool {
        self.config.will_deliver_non_blocking_event(typ)
    }

    /// Runs the blocking handler chain for one event.
    ///
    /// Handlers run in configuration order. Before each hop the elapsed
    /// wall-clock time is checked against the total budget; once spent, the
    /// remaining handlers are never invoked.
    ///
    /// # Errors
    ///
    /// - `HookError::Disallowed` when a handler vetoes; handlers after it
    ///   are not called.
    /// - `HookError::DeliveryTimeout` when the budget is exhausted.
    /// - Transport errors propagate and abort the chain.
    pub async fn deliver_blocking_event(&self, event: &Event) -> Result<DeliveryOutcome> {
        let span = info_span!("blocking_chain", event_id = %event.id, event_type = %event.typ);
        async {
            let handlers = self.config.blocking_handlers_for(event.typ);
            let budget = self.config.sync_timeout();
            let started = self.clock.now();

            let mut current = event.clone();
            let mut accumulated = Mutations::default();
            let mut mutated = false;

            for handler in handlers {
                let elapsed = self.clock.now().saturating_duration_since(started);
                if elapsed >= budget {
                    tracing::warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        budget_ms = budget.as_millis() as u64,
                        "handler chain budget exhausted"
                    );
                    return Err(HookError::timeout(elapsed));
                }

                let response = self.transport.perform_with_response(&handler.url, &current).await?;

                if !response.is_allowed {
                    tracing::info!(url = %handler.url, "handler disallowed operation");
                    return Err(HookError::Disallowed {
                        title: response.title.unwrap_or_default(),
                        reason: response.reason.unwrap_or_default(),
                    });
                }

                if let Some(mutations) = response.mutations {
                    if !mutations.is_empty() {
                        let (next, changed) = current.apply_mutations(&mutations);
                        current = next;
                        mutated = mutated || changed;
                        accumulated = accumulated.merge(&mutations);
                    }
                }
            }

            Ok(DeliveryOutcome { event: current, mutations: accumulated, mutated })
        }
        .instrument(span)
        .await
    }

    /// Delivers a non-blocking event to every matching handler.
    ///
    /// All matching handlers are attempted even when earlier ones fail; the
    /// first failure is reported after the fan-out completes so the caller
    /// can log it.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure encountered, if any.
    pub async fn deliver_non_blocking_event(&self, event: &Event) -> Result<()> {
        let span = info_span!("non_blocking_fanout", event_id = %event.id, event_type = %event.typ);
        async {
            let mut first_error = None;

            for handler in self.config.non_blocking_handlers_for(event.typ) {
                if let Err(e) = self.transport.perform_no_response(&handler.url, event).await {
                    tracing::warn!(
                        url = %handler.url,
                        category = %ErrorCategory::from(&e),
                        error = %e,
                        "non-blocking delivery failed"
                    );
                    first_error.get_or_insert(e);
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
        .instrument(span)
        .await
    }
}
