//! Delivery transports.
//!
//! A transport turns one Event into one outbound call and, for blocking
//! events, parses the structured response. Transports are stateless between
//! calls; selection happens per handler URL by scheme: `http(s)://` routes
//! to the signed webhook transport, `authscript:` to the sandboxed-script
//! sidecar.

use async_trait::async_trait;
use gatehouse_core::{Event, HookResponse};

use crate::{
    config::SCRIPT_SCHEME,
    error::{HookError, Result},
};

pub mod script;
pub mod webhook;

pub use script::{ScriptSource, ScriptTransport, StaticScriptSource};
pub use webhook::{verify_signature, WebhookTransport, SIGNATURE_HEADER};

/// One outbound delivery mechanism.
#[async_trait]
pub trait HookTransport: Send + Sync {
    /// Delivers a blocking event and parses the handler's response.
    ///
    /// The response is validated against the event type's schema before
    /// being returned.
    async fn perform_with_response(&self, url: &str, event: &Event) -> Result<HookResponse>;

    /// Delivers a non-blocking event. The response body is drained and
    /// discarded; only transport-level success matters.
    async fn perform_no_response(&self, url: &str, event: &Event) -> Result<()>;
}

/// The full transport set, dispatching on URL scheme.
pub struct Transports {
    webhook: WebhookTransport,
    script: ScriptTransport,
}

impl Transports {
    /// Creates the transport set.
    pub fn new(webhook: WebhookTransport, script: ScriptTransport) -> Self {
        Self { webhook, script }
    }

    fn select(&self, url: &str) -> Result<&dyn HookTransport> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| HookError::configuration(format!("invalid handler URL '{url}': {e}")))?;
        match parsed.scheme() {
            "http" | "https" => Ok(&self.webhook),
            SCRIPT_SCHEME => Ok(&self.script),
            other => Err(HookError::configuration(format!(
                "unsupported handler URL scheme '{other}'"
            ))),
        }
    }
}

#[async_trait]
impl HookTransport for Transports {
    async fn perform_with_response(&self, url: &str, event: &Event) -> Result<HookResponse> {
        self.select(url)?.perform_with_response(url, event).await
    }

    async fn perform_no_response(&self, url: &str, event: &Event) -> Result<()> {
        self.select(url)?.perform_no_response(url, event).await
    }
}
