//! Event envelope and dispatch-time context.
//!
//! An [`Event`] is the immutable value handed to hook handlers: an opaque
//! time-sortable id, a globally monotonic sequence number assigned at
//! dispatch, the payload, and the ambient request context. Events are never
//! mutated after construction, applying mutations produces a new value.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    mutations::Mutations,
    payload::{BlockingPayload, NonBlockingPayload, Payload},
};

/// Strongly-typed event identifier.
///
/// Wraps a UUIDv7 so ids sort by creation time, which keeps event logs
/// readable even before sequence numbers are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new time-sortable event ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// The catalogue of event types this pipeline dispatches.
///
/// Blocking types are raised before the owning operation commits and may be
/// vetoed or mutated; non-blocking types are raised after commit and are
/// notification-only. The set here is the representative subset exercised by
/// the platform's user operations; adding a type means extending the two
/// payload enums, so a new type cannot silently skip a dispatch check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Before a user is created. Blocking.
    #[serde(rename = "user.pre_create")]
    UserPreCreate,
    /// Before a user profile update is committed. Blocking.
    #[serde(rename = "user.profile.pre_update")]
    UserProfilePreUpdate,
    /// Before an authentication flow starts. Blocking.
    #[serde(rename = "authentication.pre_initialize")]
    AuthenticationPreInitialize,
    /// Before an OIDC JWT is minted. Blocking.
    #[serde(rename = "oidc.jwt.pre_create")]
    OidcJwtPreCreate,

    /// A user was created.
    #[serde(rename = "user.created")]
    UserCreated,
    /// A user profile was updated.
    #[serde(rename = "user.profile.updated")]
    UserProfileUpdated,
    /// A user was deleted.
    #[serde(rename = "user.deleted")]
    UserDeleted,
    /// A user signed in.
    #[serde(rename = "user.signed_in")]
    UserSignedIn,
    /// A role was assigned to a user.
    #[serde(rename = "user.role.assigned")]
    UserRoleAssigned,
    /// A group was assigned to a user.
    #[serde(rename = "user.group.assigned")]
    UserGroupAssigned,
    /// Post-commit snapshot of every user touched in a transaction.
    #[serde(rename = "user.sync")]
    UserSync,
}

impl EventType {
    /// Wire name of this event type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserPreCreate => "user.pre_create",
            Self::UserProfilePreUpdate => "user.profile.pre_update",
            Self::AuthenticationPreInitialize => "authentication.pre_initialize",
            Self::OidcJwtPreCreate => "oidc.jwt.pre_create",
            Self::UserCreated => "user.created",
            Self::UserProfileUpdated => "user.profile.updated",
            Self::UserDeleted => "user.deleted",
            Self::UserSignedIn => "user.signed_in",
            Self::UserRoleAssigned => "user.role.assigned",
            Self::UserGroupAssigned => "user.group.assigned",
            Self::UserSync => "user.sync",
        }
    }

    /// Whether this type is raised before commit and can veto the operation.
    pub const fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::UserPreCreate
                | Self::UserProfilePreUpdate
                | Self::AuthenticationPreInitialize
                | Self::OidcJwtPreCreate
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user.pre_create" => Ok(Self::UserPreCreate),
            "user.profile.pre_update" => Ok(Self::UserProfilePreUpdate),
            "authentication.pre_initialize" => Ok(Self::AuthenticationPreInitialize),
            "oidc.jwt.pre_create" => Ok(Self::OidcJwtPreCreate),
            "user.created" => Ok(Self::UserCreated),
            "user.profile.updated" => Ok(Self::UserProfileUpdated),
            "user.deleted" => Ok(Self::UserDeleted),
            "user.signed_in" => Ok(Self::UserSignedIn),
            "user.role.assigned" => Ok(Self::UserRoleAssigned),
            "user.group.assigned" => Ok(Self::UserGroupAssigned),
            "user.sync" => Ok(Self::UserSync),
            _ => Err(format!("unknown event type: {s}")),
        }
    }
}

/// Who triggered the operation that raised an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    /// The end user themselves, through a regular flow.
    User,
    /// An operator through the admin API.
    AdminApi,
    /// The platform itself (e.g. scheduled cleanup).
    System,
    /// The management portal.
    Portal,
}

impl fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::AdminApi => write!(f, "admin_api"),
            Self::System => write!(f, "system"),
            Self::Portal => write!(f, "portal"),
        }
    }
}

/// OAuth-specific ambient state carried on events raised inside an OAuth
/// authorization flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthContext {
    /// The `state` parameter of the authorization request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Ambient request/session state attached to every event at dispatch time.
///
/// This is the only value that mixes caller identity into an event. Payloads
/// may enrich it further through `fill_context` (e.g. stamping the acting
/// user id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    /// When the event was dispatched.
    pub timestamp: DateTime<Utc>,

    /// The acting user, when one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Languages preferred by the client, most preferred first.
    pub preferred_languages: Vec<String>,

    /// Language resolved for this request.
    pub language: String,

    /// Who triggered the operation.
    pub triggered_by: TriggeredBy,

    /// OAuth flow state, when the event was raised inside one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthContext>,
}

impl EventContext {
    /// Creates a context with the given timestamp and trigger, no caller
    /// identity, and empty language preferences.
    pub fn new(timestamp: DateTime<Utc>, triggered_by: TriggeredBy) -> Self {
        Self {
            timestamp,
            user_id: None,
            preferred_languages: Vec::new(),
            language: String::new(),
            triggered_by,
            oauth: None,
        }
    }
}

/// An immutable dispatched event.
///
/// `seq` is globally monotonic across all transactions and processes; audit
/// consumers rely on it to detect loss or reordering. A `seq` of zero means
/// the event was never sequenced (no handler was bound) and must never be
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Opaque, time-sortable identifier.
    pub id: EventId,

    /// Globally monotonic sequence number assigned at dispatch time.
    pub seq: i64,

    /// The event type.
    #[serde(rename = "type")]
    pub typ: EventType,

    /// The payload variant.
    pub payload: Payload,

    /// Ambient context captured at dispatch.
    pub context: EventContext,

    /// Whether this event is delivered after commit, notification-only.
    #[serde(skip)]
    pub is_non_blocking: bool,
}

impl Event {
    /// Builds a blocking event, letting the payload enrich the context.
    pub fn new_blocking(seq: i64, payload: BlockingPayload, mut context: EventContext) -> Self {
        payload.fill_context(&mut context);
        Self {
            id: EventId::new(),
            seq,
            typ: payload.event_type(),
            payload: Payload::Blocking(payload),
            context,
            is_non_blocking: false,
        }
    }

    /// Builds a non-blocking event, letting the payload enrich the context.
    pub fn new_non_blocking(
        seq: i64,
        payload: NonBlockingPayload,
        mut context: EventContext,
    ) -> Self {
        payload.fill_context(&mut context);
        Self {
            id: EventId::new(),
            seq,
            typ: payload.event_type(),
            payload: Payload::NonBlocking(payload),
            context,
            is_non_blocking: true,
        }
    }

    /// Produces a new event with `mutations` applied to the payload.
    ///
    /// Copy-on-write: `self` is left untouched, so an aborted chain can
    /// never leak a half-mutated event to the caller. Returns the new event
    /// and whether anything actually changed. Mutations only apply to
    /// blocking payloads; a non-blocking event is returned unchanged.
    pub fn apply_mutations(&self, mutations: &Mutations) -> (Event, bool) {
        match &self.payload {
            Payload::Blocking(payload) => {
                let (mutated, changed) = payload.apply_mutations(mutations);
                let mut next = self.clone();
                next.payload = Payload::Blocking(mutated);
                (next, changed)
            },
            Payload::NonBlocking(_) => (self.clone(), false),
        }
    }

    /// The blocking payload, when this is a blocking event.
    pub fn blocking_payload(&self) -> Option<&BlockingPayload> {
        match &self.payload {
            Payload::Blocking(payload) => Some(payload),
            Payload::NonBlocking(_) => None,
        }
    }

    /// The non-blocking payload, when this is a non-blocking event.
    pub fn non_blocking_payload(&self) -> Option<&NonBlockingPayload> {
        match &self.payload {
            Payload::Blocking(_) => None,
            Payload::NonBlocking(payload) => Some(payload),
        }
    }
}
