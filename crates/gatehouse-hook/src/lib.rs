//! Hook delivery pipeline for the Gatehouse identity platform.
//!
//! Business logic raises events through a [`sink::HookProvider`]. Blocking
//! events run an ordered handler chain before the operation commits and can
//! veto it or mutate the payload; non-blocking events are persisted with the
//! owning transaction and delivered best-effort after commit. Handlers are
//! reached over two transports: signed HTTP webhooks and sandboxed scripts
//! executed by an isolation sidecar.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod deliverer;
pub mod error;
pub mod sink;
pub mod transport;

pub use config::{BlockingHandlerConfig, HookConfig, NonBlockingHandlerConfig};
pub use deliverer::{Deliverer, DeliveryOutcome};
pub use error::{ErrorCategory, HookError, Result};
pub use sink::{HookProvider, TxHookRegistrar, TxLifecycleHook, UserReader};
pub use transport::{
    verify_signature, HookTransport, ScriptSource, ScriptTransport, StaticScriptSource,
    Transports, WebhookTransport, SIGNATURE_HEADER,
};
