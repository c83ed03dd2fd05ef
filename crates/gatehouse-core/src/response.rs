//! Hook response wire contract and per-event-type schema validation.
//!
//! Every delivery target answers with a `HookResponse`. The structural
//! schema differs per event type: a blocking type advertises which of
//! {user mutations, jwt mutations, constraints, bot_protection, rate_limits}
//! it accepts, and a response carrying anything outside that allow-list is a
//! hard validation error, never silently ignored. A deny response forbids
//! mutations entirely.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{CoreError, Result},
    event::EventType,
    mutations::Mutations,
};

/// Structured response returned by every delivery target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookResponse {
    /// Whether the handler allows the operation to proceed.
    pub is_allowed: bool,

    /// Short human-readable rejection title. Deny case only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Human-readable rejection reason intended for end-user display.
    /// Deny case only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Proposed mutations. Allow case only, and only for event types that
    /// advertise mutation support.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutations: Option<Mutations>,

    /// Declarative authorization constraints. Interpreted by the caller,
    /// passed through opaquely here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Value>,

    /// Bot-protection verdict override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_protection: Option<Value>,

    /// Rate-limit weight overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<Value>,
}

impl HookResponse {
    /// An allow response with no opinion.
    pub fn allowed() -> Self {
        Self { is_allowed: true, ..Self::default() }
    }

    /// An allow response proposing mutations.
    pub fn with_mutations(mutations: Mutations) -> Self {
        Self { is_allowed: true, mutations: Some(mutations), ..Self::default() }
    }

    /// A deny response carrying a user-facing title and reason.
    pub fn denied(title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            is_allowed: false,
            title: Some(title.into()),
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Which response fields a blocking event type accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseCapabilities {
    /// `mutations.user.*` accepted.
    pub user_mutations: bool,
    /// `mutations.jwt.payload` accepted.
    pub jwt_mutations: bool,
    /// `constraints` accepted.
    pub constraints: bool,
    /// `bot_protection` accepted.
    pub bot_protection: bool,
    /// `rate_limits` accepted.
    pub rate_limits: bool,
}

impl EventType {
    /// Response capabilities advertised by this event type.
    ///
    /// `None` for non-blocking types: their responses are never parsed.
    pub const fn response_capabilities(&self) -> Option<ResponseCapabilities> {
        match self {
            Self::UserPreCreate => Some(ResponseCapabilities {
                user_mutations: true,
                jwt_mutations: false,
                constraints: true,
                bot_protection: true,
                rate_limits: true,
            }),
            Self::UserProfilePreUpdate => Some(ResponseCapabilities {
                user_mutations: true,
                jwt_mutations: false,
                constraints: false,
                bot_protection: false,
                rate_limits: false,
            }),
            Self::AuthenticationPreInitialize => Some(ResponseCapabilities {
                user_mutations: false,
                jwt_mutations: false,
                constraints: true,
                bot_protection: true,
                rate_limits: true,
            }),
            Self::OidcJwtPreCreate => Some(ResponseCapabilities {
                user_mutations: false,
                jwt_mutations: true,
                constraints: false,
                bot_protection: false,
                rate_limits: false,
            }),
            Self::UserCreated
            | Self::UserProfileUpdated
            | Self::UserDeleted
            | Self::UserSignedIn
            | Self::UserRoleAssigned
            | Self::UserGroupAssigned
            | Self::UserSync => None,
        }
    }
}

/// Builds the JSON Schema document for one event type's responses.
///
/// The allow branch whitelists exactly the advertised fields with
/// `additionalProperties: false`; the deny branch admits only
/// `is_allowed: false` plus `title`/`reason`.
fn response_schema(caps: ResponseCapabilities) -> Value {
    let mut allow_properties = serde_json::Map::new();
    allow_properties.insert("is_allowed".to_string(), json!({ "const": true }));

    if caps.user_mutations || caps.jwt_mutations {
        let mut mutation_properties = serde_json::Map::new();
        if caps.user_mutations {
            mutation_properties.insert(
                "user".to_string(),
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "standard_attributes": { "type": "object" },
                        "custom_attributes": { "type": "object" },
                        "roles": { "type": "array", "items": { "type": "string" } },
                        "groups": { "type": "array", "items": { "type": "string" } },
                    },
                }),
            );
        }
        if caps.jwt_mutations {
            mutation_properties.insert(
                "jwt".to_string(),
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "payload": { "type": "object" },
                    },
                }),
            );
        }
        allow_properties.insert(
            "mutations".to_string(),
            json!({
                "type": "object",
                "additionalProperties": false,
                "properties": Value::Object(mutation_properties),
            }),
        );
    }
    if caps.constraints {
        allow_properties.insert("constraints".to_string(), json!({ "type": "object" }));
    }
    if caps.bot_protection {
        allow_properties.insert("bot_protection".to_string(), json!({ "type": "object" }));
    }
    if caps.rate_limits {
        allow_properties.insert("rate_limits".to_string(), json!({ "type": "object" }));
    }

    json!({
        "oneOf": [
            {
                "type": "object",
                "additionalProperties": false,
                "required": ["is_allowed"],
                "properties": Value::Object(allow_properties),
            },
            {
                "type": "object",
                "additionalProperties": false,
                "required": ["is_allowed"],
                "properties": {
                    "is_allowed": { "const": false },
                    "title": { "type": "string" },
                    "reason": { "type": "string" },
                },
            },
        ],
    })
}

/// Parses and validates a raw hook response for the given event type.
///
/// # Errors
///
/// Returns `CoreError::SchemaViolation` when the value does not match the
/// event type's schema (including any field outside the type's allow-list),
/// or when the type is non-blocking and has no response contract at all.
pub fn parse_hook_response(typ: EventType, raw: &Value) -> Result<HookResponse> {
    let caps = typ.response_capabilities().ok_or_else(|| {
        CoreError::schema_violation(format!("event type {typ} does not accept hook responses"))
    })?;

    let schema_doc = response_schema(caps);
    let schema = jsonschema::JSONSchema::compile(&schema_doc)
        .map_err(|e| CoreError::schema_violation(format!("schema compilation failed: {e}")))?;

    if let Err(errors) = schema.validate(raw) {
        let detail: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();
        return Err(CoreError::schema_violation(detail.join("; ")));
    }

    Ok(serde_json::from_value(raw.clone())?)
}
