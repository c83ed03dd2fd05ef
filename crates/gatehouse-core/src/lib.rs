//! Event vocabulary and persistence for the Gatehouse hook pipeline.
//!
//! Defines the immutable event model (events, payloads, context, mutations,
//! hook responses with per-event-type schemas), the clock abstraction used
//! for delivery budgets, and the sequence-allocating event store. The
//! delivery machinery itself lives in `gatehouse-hook`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod mutations;
pub mod payload;
pub mod response;
pub mod store;
pub mod time;

pub use error::{CoreError, Result};
pub use event::{Event, EventContext, EventId, EventType, OAuthContext, TriggeredBy};
pub use mutations::{AttributeMap, JwtMutations, Mutations, UserMutations};
pub use payload::{
    AuthenticationPreInitialize, BlockingPayload, NonBlockingPayload, OidcJwtPreCreate, Payload,
    UserPreCreate, UserProfilePreUpdate, UserSnapshot,
};
pub use response::{parse_hook_response, HookResponse, ResponseCapabilities};
pub use store::{EventStore, MemoryEventStore, PgEventStore};
pub use time::{Clock, RealClock, TestClock};
