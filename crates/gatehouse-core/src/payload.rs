//! Payload variants for blocking and non-blocking events.
//!
//! Payloads split into two capability sets. Blocking payloads are raised
//! before the owning operation commits: handlers can veto them or propose
//! mutations, so they implement `apply_mutations` and
//! `generate_full_mutations`. Non-blocking payloads are raised after commit
//! and only carry classification flags (webhook, audit, reindex hints).
//!
//! Both enums are matched exhaustively at the deliverer and sink call sites,
//! so a newly added event type cannot silently skip a dispatch check.

use serde::{Deserialize, Serialize};

use crate::{
    event::{EventContext, EventType, TriggeredBy},
    mutations::{AttributeMap, JwtMutations, Mutations, UserMutations},
};

/// Point-in-time user state carried inside payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    /// User identifier.
    pub id: String,

    /// OIDC standard claims (name, email, ...).
    pub standard_attributes: AttributeMap,

    /// Deployment-defined custom attributes.
    pub custom_attributes: AttributeMap,

    /// Role keys currently assigned.
    pub roles: Vec<String>,

    /// Group keys currently assigned.
    pub groups: Vec<String>,
}

impl UserSnapshot {
    /// Creates an empty snapshot for the given user id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    /// Applies user mutations, returning the new snapshot and whether
    /// anything actually changed.
    fn apply(&self, m: &UserMutations) -> (UserSnapshot, bool) {
        let mut next = self.clone();
        if let Some(standard) = &m.standard_attributes {
            next.standard_attributes = standard.clone();
        }
        if let Some(custom) = &m.custom_attributes {
            next.custom_attributes = custom.clone();
        }
        if let Some(roles) = &m.roles {
            next.roles = roles.clone();
        }
        if let Some(groups) = &m.groups {
            next.groups = groups.clone();
        }
        let changed = next != *self;
        (next, changed)
    }

    /// Full mutation set expressing the current state of every mutable field.
    fn full_mutations(&self) -> UserMutations {
        UserMutations {
            standard_attributes: Some(self.standard_attributes.clone()),
            custom_attributes: Some(self.custom_attributes.clone()),
            roles: Some(self.roles.clone()),
            groups: Some(self.groups.clone()),
        }
    }
}

/// Raised before a user is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreCreate {
    /// The user as it would be created.
    pub user: UserSnapshot,
}

/// Raised before a profile update is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfilePreUpdate {
    /// The user with the proposed profile already applied.
    pub user: UserSnapshot,
}

/// Raised before an authentication flow starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationPreInitialize {
    /// The flow about to start (e.g. `login`, `signup`).
    pub flow_type: String,

    /// The authenticating user, when already identified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Raised before an OIDC JWT is minted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcJwtPreCreate {
    /// The user the token is minted for.
    pub user: UserSnapshot,

    /// The claims about to be signed.
    pub jwt_payload: AttributeMap,
}

/// Payloads that can veto or mutate the in-flight operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BlockingPayload {
    /// `user.pre_create`
    UserPreCreate(UserPreCreate),
    /// `user.profile.pre_update`
    UserProfilePreUpdate(UserProfilePreUpdate),
    /// `authentication.pre_initialize`
    AuthenticationPreInitialize(AuthenticationPreInitialize),
    /// `oidc.jwt.pre_create`
    OidcJwtPreCreate(OidcJwtPreCreate),
}

impl BlockingPayload {
    /// The event type this payload dispatches as.
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::UserPreCreate(_) => EventType::UserPreCreate,
            Self::UserProfilePreUpdate(_) => EventType::UserProfilePreUpdate,
            Self::AuthenticationPreInitialize(_) => EventType::AuthenticationPreInitialize,
            Self::OidcJwtPreCreate(_) => EventType::OidcJwtPreCreate,
        }
    }

    /// The subject user, when one exists yet.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::UserPreCreate(p) => Some(&p.user.id),
            Self::UserProfilePreUpdate(p) => Some(&p.user.id),
            Self::AuthenticationPreInitialize(p) => p.user_id.as_deref(),
            Self::OidcJwtPreCreate(p) => Some(&p.user.id),
        }
    }

    /// The payload's own opinion on who triggered it, when it has one.
    ///
    /// Blocking payloads never do: they are raised inside the caller's own
    /// request, so the ambient context already names the right trigger
    /// (user, admin API, portal, ...).
    pub const fn triggered_by(&self) -> Option<TriggeredBy> {
        None
    }

    /// Payload-specific context enrichment.
    pub fn fill_context(&self, context: &mut EventContext) {
        if context.user_id.is_none() {
            context.user_id = self.user_id().map(str::to_string);
        }
        if let Some(triggered_by) = self.triggered_by() {
            context.triggered_by = triggered_by;
        }
    }

    /// Produces a new payload with `mutations` applied.
    ///
    /// Fields the mutation has no opinion on are untouched. Returns whether
    /// anything actually changed, which drives downstream effects such as
    /// profile re-validation.
    pub fn apply_mutations(&self, mutations: &Mutations) -> (BlockingPayload, bool) {
        match self {
            Self::UserPreCreate(p) => {
                let (user, changed) = apply_user(&p.user, mutations);
                (Self::UserPreCreate(UserPreCreate { user }), changed)
            },
            Self::UserProfilePreUpdate(p) => {
                let (user, changed) = apply_user(&p.user, mutations);
                (Self::UserProfilePreUpdate(UserProfilePreUpdate { user }), changed)
            },
            // Nothing mutable; the schema refuses mutations for this type.
            Self::AuthenticationPreInitialize(p) => {
                (Self::AuthenticationPreInitialize(p.clone()), false)
            },
            Self::OidcJwtPreCreate(p) => {
                let mut next = p.clone();
                let mut changed = false;
                if let Some(JwtMutations { payload: Some(claims) }) = &mutations.jwt {
                    if *claims != next.jwt_payload {
                        next.jwt_payload = claims.clone();
                        changed = true;
                    }
                }
                (Self::OidcJwtPreCreate(next), changed)
            },
        }
    }

    /// Full mutation set describing the payload's current mutable state.
    ///
    /// Applying the result back onto an unmodified payload is a no-op.
    pub fn generate_full_mutations(&self) -> Mutations {
        match self {
            Self::UserPreCreate(p) => {
                Mutations { user: Some(p.user.full_mutations()), jwt: None }
            },
            Self::UserProfilePreUpdate(p) => {
                Mutations { user: Some(p.user.full_mutations()), jwt: None }
            },
            Self::AuthenticationPreInitialize(_) => Mutations::default(),
            Self::OidcJwtPreCreate(p) => Mutations {
                user: None,
                jwt: Some(JwtMutations { payload: Some(p.jwt_payload.clone()) }),
            },
        }
    }
}

fn apply_user(user: &UserSnapshot, mutations: &Mutations) -> (UserSnapshot, bool) {
    match &mutations.user {
        Some(m) => user.apply(m),
        None => (user.clone(), false),
    }
}

impl From<UserPreCreate> for BlockingPayload {
    fn from(p: UserPreCreate) -> Self {
        Self::UserPreCreate(p)
    }
}

impl From<UserProfilePreUpdate> for BlockingPayload {
    fn from(p: UserProfilePreUpdate) -> Self {
        Self::UserProfilePreUpdate(p)
    }
}

impl From<AuthenticationPreInitialize> for BlockingPayload {
    fn from(p: AuthenticationPreInitialize) -> Self {
        Self::AuthenticationPreInitialize(p)
    }
}

impl From<OidcJwtPreCreate> for BlockingPayload {
    fn from(p: OidcJwtPreCreate) -> Self {
        Self::OidcJwtPreCreate(p)
    }
}

/// Notification-only payloads raised after commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NonBlockingPayload {
    /// `user.created`
    UserCreated {
        /// The created user.
        user: UserSnapshot,
    },
    /// `user.profile.updated`
    UserProfileUpdated {
        /// The user after the update.
        user: UserSnapshot,
    },
    /// `user.deleted`
    UserDeleted {
        /// The deleted user's id.
        user_id: String,
        /// Who triggered the deletion.
        triggered_by: TriggeredBy,
    },
    /// `user.signed_in`
    UserSignedIn {
        /// The signed-in user.
        user: UserSnapshot,
    },
    /// `user.role.assigned`
    UserRoleAssigned {
        /// The affected user's id.
        user_id: String,
        /// The assigned role key.
        role_key: String,
        /// Who triggered the assignment.
        triggered_by: TriggeredBy,
    },
    /// `user.group.assigned`
    UserGroupAssigned {
        /// The affected user's id.
        user_id: String,
        /// The assigned group key.
        group_key: String,
        /// Who triggered the assignment.
        triggered_by: TriggeredBy,
    },
    /// `user.sync` — synthesized at commit time, one per distinct user
    /// touched by an operation in the transaction, carrying the re-read
    /// post-commit state.
    UserSync {
        /// The user's current state.
        user: UserSnapshot,
    },
}

impl NonBlockingPayload {
    /// The event type this payload dispatches as.
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::UserCreated { .. } => EventType::UserCreated,
            Self::UserProfileUpdated { .. } => EventType::UserProfileUpdated,
            Self::UserDeleted { .. } => EventType::UserDeleted,
            Self::UserSignedIn { .. } => EventType::UserSignedIn,
            Self::UserRoleAssigned { .. } => EventType::UserRoleAssigned,
            Self::UserGroupAssigned { .. } => EventType::UserGroupAssigned,
            Self::UserSync { .. } => EventType::UserSync,
        }
    }

    /// The subject user.
    pub fn user_id(&self) -> &str {
        match self {
            Self::UserCreated { user }
            | Self::UserProfileUpdated { user }
            | Self::UserSignedIn { user }
            | Self::UserSync { user } => &user.id,
            Self::UserDeleted { user_id, .. }
            | Self::UserRoleAssigned { user_id, .. }
            | Self::UserGroupAssigned { user_id, .. } => user_id,
        }
    }

    /// The payload's own opinion on who triggered it, when it has one.
    ///
    /// Payloads carrying an explicit trigger override the ambient context;
    /// the rest inherit whatever the request context says, so a user created
    /// through the admin API is attributed to the admin API.
    pub const fn triggered_by(&self) -> Option<TriggeredBy> {
        match self {
            Self::UserCreated { .. }
            | Self::UserProfileUpdated { .. }
            | Self::UserSignedIn { .. } => None,
            Self::UserDeleted { triggered_by, .. }
            | Self::UserRoleAssigned { triggered_by, .. }
            | Self::UserGroupAssigned { triggered_by, .. } => Some(*triggered_by),
            // Synthesized at commit time, not raised by any caller.
            Self::UserSync { .. } => Some(TriggeredBy::System),
        }
    }

    /// Whether this payload should be delivered to webhook handlers.
    pub const fn for_webhook(&self) -> bool {
        match self {
            Self::UserCreated { .. }
            | Self::UserProfileUpdated { .. }
            | Self::UserDeleted { .. }
            | Self::UserSignedIn { .. }
            | Self::UserRoleAssigned { .. }
            | Self::UserGroupAssigned { .. }
            | Self::UserSync { .. } => true,
        }
    }

    /// Whether this payload should be recorded in the audit log.
    pub const fn for_audit(&self) -> bool {
        match self {
            Self::UserCreated { .. }
            | Self::UserProfileUpdated { .. }
            | Self::UserDeleted { .. }
            | Self::UserSignedIn { .. } => true,
            // FIXME: should be true; role/group assignments are currently
            // invisible to audit consumers. Flipping the flag needs an audit
            // schema entry for these two types first.
            Self::UserRoleAssigned { .. } | Self::UserGroupAssigned { .. } => false,
            Self::UserSync { .. } => false,
        }
    }

    /// User ids whose search index entries must be rebuilt.
    pub fn require_reindex_user_ids(&self) -> Vec<String> {
        match self {
            Self::UserCreated { user }
            | Self::UserProfileUpdated { user }
            | Self::UserSync { user } => vec![user.id.clone()],
            Self::UserRoleAssigned { user_id, .. } | Self::UserGroupAssigned { user_id, .. } => {
                vec![user_id.clone()]
            },
            Self::UserDeleted { .. } | Self::UserSignedIn { .. } => Vec::new(),
        }
    }

    /// User ids whose index entries must be removed.
    pub fn deleted_user_ids(&self) -> Vec<String> {
        match self {
            Self::UserDeleted { user_id, .. } => vec![user_id.clone()],
            _ => Vec::new(),
        }
    }

    /// Whether this payload represents a user-touching operation.
    ///
    /// Operations feed the per-user `user.sync` synthesis at commit time;
    /// purely informational payloads (sign-in) and the synthesized sync
    /// itself do not.
    pub const fn is_operation(&self) -> bool {
        match self {
            Self::UserCreated { .. }
            | Self::UserProfileUpdated { .. }
            | Self::UserDeleted { .. }
            | Self::UserRoleAssigned { .. }
            | Self::UserGroupAssigned { .. } => true,
            Self::UserSignedIn { .. } | Self::UserSync { .. } => false,
        }
    }

    /// Payload-specific context enrichment.
    pub fn fill_context(&self, context: &mut EventContext) {
        if context.user_id.is_none() {
            context.user_id = Some(self.user_id().to_string());
        }
        if let Some(triggered_by) = self.triggered_by() {
            context.triggered_by = triggered_by;
        }
    }
}

/// Sum over the two payload capability sets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// Raised before commit; can mutate or abort the operation.
    Blocking(BlockingPayload),
    /// Raised after commit; purely informational.
    NonBlocking(NonBlockingPayload),
}

impl Payload {
    /// The subject user, when one exists.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Blocking(p) => p.user_id(),
            Self::NonBlocking(p) => Some(p.user_id()),
        }
    }
}
