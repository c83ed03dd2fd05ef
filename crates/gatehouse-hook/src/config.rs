//! Hook configuration: handler bindings, timeouts, and secrets.
//!
//! Configuration is loaded in priority order:
//! 1. Environment variables prefixed `GATEHOUSE_` (highest priority)
//! 2. Configuration file (`gatehouse.toml`)
//! 3. Built-in defaults (lowest priority)
//!
//! Binding order is significant: it is the delivery order of the handler
//! chain, and therefore the order mutations are merged in.

use std::{str::FromStr, time::Duration};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use gatehouse_core::EventType;
use serde::{Deserialize, Serialize};

use crate::error::{HookError, Result};

const CONFIG_FILE: &str = "gatehouse.toml";

/// Literal matching every non-blocking event type.
pub const WILDCARD: &str = "*";

/// URL scheme routing a handler to the sandboxed-script sidecar.
pub const SCRIPT_SCHEME: &str = "authscript";

/// A blocking handler binding: exactly one event type to one URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockingHandlerConfig {
    /// Event type this handler receives, e.g. `user.pre_create`.
    pub event: String,
    /// Delivery target. `http(s)://` for webhooks, `authscript:` for
    /// sandboxed scripts.
    pub url: String,
}

/// A non-blocking handler binding: a set of event types (or `"*"`) to one
/// URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NonBlockingHandlerConfig {
    /// Event types this handler receives, or the single entry `"*"`.
    pub events: Vec<String>,
    /// Delivery target URL.
    pub url: String,
}

impl NonBlockingHandlerConfig {
    /// Whether this binding matches the given event type.
    pub fn matches(&self, typ: EventType) -> bool {
        self.events.iter().any(|e| e == WILDCARD || e == typ.as_str())
    }
}

/// Complete hook pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    /// Ordered blocking handler bindings.
    #[serde(default)]
    pub blocking_handlers: Vec<BlockingHandlerConfig>,

    /// Ordered non-blocking handler bindings.
    #[serde(default)]
    pub non_blocking_handlers: Vec<NonBlockingHandlerConfig>,

    /// Total wall-clock budget for one blocking handler chain, in seconds.
    ///
    /// Environment variable: `GATEHOUSE_SYNC_TIMEOUT_SECONDS`
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_seconds: u64,

    /// Per-request timeout for a single transport call, in seconds.
    ///
    /// Environment variable: `GATEHOUSE_REQUEST_TIMEOUT_SECONDS`
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// HMAC-SHA256 signing key for outbound webhook bodies.
    ///
    /// Environment variable: `GATEHOUSE_WEBHOOK_SECRET`
    #[serde(default)]
    pub webhook_secret: String,

    /// Base URL of the sandboxed-script sidecar, e.g.
    /// `http://127.0.0.1:8091`.
    ///
    /// Environment variable: `GATEHOUSE_SCRIPT_RUNNER_URL`
    #[serde(default = "default_script_runner_url")]
    pub script_runner_url: String,

    /// Maximum accepted response body size in bytes.
    ///
    /// Environment variable: `GATEHOUSE_MAX_RESPONSE_BYTES`
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            blocking_handlers: Vec::new(),
            non_blocking_handlers: Vec::new(),
            sync_timeout_seconds: default_sync_timeout(),
            request_timeout_seconds: default_request_timeout(),
            webhook_secret: String::new(),
            script_runner_url: default_script_runner_url(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl HookConfig {
    /// Loads configuration from defaults, `gatehouse.toml`, and
    /// `GATEHOUSE_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `HookError::Configuration` when extraction or validation
    /// fails.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("GATEHOUSE_"));

        let config: Self = figment
            .extract()
            .map_err(|e| HookError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Whether any blocking handler is bound to the given event type.
    ///
    /// Cheap and side-effect-free: this gates whether a dispatch consumes a
    /// sequence number and touches the network at all.
    pub fn will_deliver_blocking_event(&self, typ: EventType) -> bool {
        self.blocking_handlers.iter().any(|h| h.event == typ.as_str())
    }

    /// Whether any non-blocking handler matches the given event type.
    pub fn will_deliver_non_blocking_event(&self, typ: EventType) -> bool {
        self.non_blocking_handlers.iter().any(|h| h.matches(typ))
    }

    /// Blocking handlers bound to the given type, in configuration order.
    pub fn blocking_handlers_for(&self, typ: EventType) -> Vec<&BlockingHandlerConfig> {
        self.blocking_handlers
            .iter()
            .filter(|h| h.event == typ.as_str())
            .collect()
    }

    /// Non-blocking handlers matching the given type, in configuration
    /// order.
    pub fn non_blocking_handlers_for(&self, typ: EventType) -> Vec<&NonBlockingHandlerConfig> {
        self.non_blocking_handlers
            .iter()
            .filter(|h| h.matches(typ))
            .collect()
    }

    /// Total wall-clock budget for one blocking chain.
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_seconds)
    }

    /// Timeout applied to each individual transport call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Validates binding shapes, URL schemes, and timeout sanity.
    pub fn validate(&self) -> Result<()> {
        if self.sync_timeout_seconds == 0 {
            return Err(HookError::configuration(
                "sync_timeout_seconds must be greater than 0",
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(HookError::configuration(
                "request_timeout_seconds must be greater than 0",
            ));
        }
        if self.max_response_bytes == 0 {
            return Err(HookError::configuration(
                "max_response_bytes must be greater than 0",
            ));
        }
        // A single request may never outlive the whole chain's budget.
        if self.request_timeout_seconds > self.sync_timeout_seconds {
            return Err(HookError::configuration(
                "request_timeout_seconds must not exceed sync_timeout_seconds",
            ));
        }

        for handler in &self.blocking_handlers {
            let typ = EventType::from_str(&handler.event).map_err(|_| {
                HookError::configuration(format!(
                    "unknown blocking event type '{}'",
                    handler.event
                ))
            })?;
            if !typ.is_blocking() {
                return Err(HookError::configuration(format!(
                    "'{}' is not a blocking event type",
                    handler.event
                )));
            }
            validate_handler_url(&handler.url)?;
        }

        for handler in &self.non_blocking_handlers {
            if handler.events.is_empty() {
                return Err(HookError::configuration(
                    "non-blocking handler binds no event types",
                ));
            }
            for event in &handler.events {
                if event == WILDCARD {
                    continue;
                }
                let typ = EventType::from_str(event).map_err(|_| {
                    HookError::configuration(format!(
                        "unknown non-blocking event type '{event}'"
                    ))
                })?;
                if typ.is_blocking() {
                    return Err(HookError::configuration(format!(
                        "'{event}' is a blocking type; non-blocking handlers cannot bind it"
                    )));
                }
            }
            validate_handler_url(&handler.url)?;
        }

        Ok(())
    }
}

fn validate_handler_url(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| HookError::configuration(format!("invalid handler URL '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" | SCRIPT_SCHEME => Ok(()),
        other => Err(HookError::configuration(format!(
            "unsupported handler URL scheme '{other}' in '{url}'"
        ))),
    }
}

fn default_sync_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    5
}

fn default_script_runner_url() -> String {
    "http://127.0.0.1:8091".to_string()
}

fn default_max_response_bytes() -> usize {
    1024 * 1024
}
