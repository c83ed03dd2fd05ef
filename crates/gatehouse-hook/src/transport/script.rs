//! Sandboxed-script transport.
//!
//! Handlers with an `authscript:` URL run as scripts inside an isolation
//! sidecar rather than as remote webhooks. The transport resolves the script
//! source from the URL path, ships it to the sidecar's `/run` endpoint
//! together with the serialized Event as input, and interprets the sidecar's
//! envelope: a non-empty `error` field is a script failure carrying the
//! captured stdout/stderr, distinct from a transport failure.

use std::collections::HashMap;

use async_trait::async_trait;
use gatehouse_core::{parse_hook_response, Event, HookResponse};
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::{
    config::HookConfig,
    error::{HookError, Result},
};

use super::{webhook::map_parse_error, HookTransport};

/// Provides script source text by path.
///
/// The path is the opaque part of the handler URL: for
/// `authscript:policy/check` the source is looked up under `policy/check`.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    /// Loads the source text of the script at the given path.
    ///
    /// # Errors
    ///
    /// Returns `HookError::Configuration` if no script exists at the path.
    async fn load(&self, path: &str) -> Result<String>;
}

/// Script source backed by an in-memory map, loaded at startup.
#[derive(Debug, Default)]
pub struct StaticScriptSource {
    scripts: HashMap<String, String>,
}

impl StaticScriptSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a script under a path.
    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.scripts.insert(path.into(), source.into());
    }
}

#[async_trait]
impl ScriptSource for StaticScriptSource {
    async fn load(&self, path: &str) -> Result<String> {
        self.scripts
            .get(path)
            .cloned()
            .ok_or_else(|| HookError::configuration(format!("no script registered at '{path}'")))
    }
}

#[derive(Serialize)]
struct RunRequest<'a> {
    script: &'a str,
    input: &'a Event,
}

#[derive(Deserialize)]
struct RunResponse {
    #[serde(default)]
    output: serde_json::Value,
    #[serde(default)]
    error: String,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

/// Transport executing handler scripts via the isolation sidecar.
pub struct ScriptTransport {
    client: reqwest::Client,
    runner_url: String,
    timeout: std::time::Duration,
    sources: Box<dyn ScriptSource>,
}

impl ScriptTransport {
    /// Builds the transport from hook configuration and a script source.
    ///
    /// # Errors
    ///
    /// Returns `HookError::Configuration` if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &HookConfig, sources: Box<dyn ScriptSource>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent("Gatehouse-Hook/1.0")
            .build()
            .map_err(|e| {
                HookError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            runner_url: config.script_runner_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
            sources,
        })
    }

    fn script_path(url: &str) -> Result<String> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| HookError::configuration(format!("invalid script URL '{url}': {e}")))?;
        let path = parsed.path().trim_start_matches('/');
        if path.is_empty() {
            return Err(HookError::configuration(format!(
                "script URL '{url}' names no script"
            )));
        }
        Ok(path.to_string())
    }

    async fn run(&self, url: &str, event: &Event) -> Result<RunResponse> {
        let path = Self::script_path(url)?;
        let script = self.sources.load(&path).await?;

        let response = self
            .client
            .post(format!("{}/run", self.runner_url))
            .json(&RunRequest { script: &script, input: event })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HookError::timeout(self.timeout)
                } else {
                    HookError::network(format!("script runner unreachable: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HookError::InvalidStatus { status: status.as_u16() });
        }

        let run: RunResponse = response
            .json()
            .await
            .map_err(|e| HookError::invalid_response(format!("bad runner envelope: {e}")))?;

        if !run.error.is_empty() {
            tracing::warn!(script = %path, error = %run.error, "hook script failed");
            return Err(HookError::ScriptRuntime {
                error: run.error,
                stdout: run.stdout,
                stderr: run.stderr,
            });
        }

        Ok(run)
    }
}

#[async_trait]
impl HookTransport for ScriptTransport {
    async fn perform_with_response(&self, url: &str, event: &Event) -> Result<HookResponse> {
        let span = info_span!("script_blocking", event_id = %event.id, event_type = %event.typ, url);
        async {
            let run = self.run(url, event).await?;
            // Script output goes through the same per-event-type schema gate
            // as webhook bodies.
            parse_hook_response(event.typ, &run.output).map_err(map_parse_error)
        }
        .instrument(span)
        .await
    }

    async fn perform_no_response(&self, url: &str, event: &Event) -> Result<()> {
        let span = info_span!("script_non_blocking", event_id = %event.id, event_type = %event.typ, url);
        async {
            self.run(url, event).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }
}
