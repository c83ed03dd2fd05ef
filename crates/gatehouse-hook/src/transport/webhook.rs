//! Signed HTTP webhook transport.
//!
//! Serializes the Event to JSON, signs the raw body with HMAC-SHA256, and
//! POSTs it to the handler. Blocking deliveries require a 2xx status and a
//! body that validates against the event type's response schema;
//! non-blocking deliveries require only the 2xx.

use bytes::Bytes;
use gatehouse_core::{parse_hook_response, CoreError, Event, HookResponse};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info_span, Instrument};

use crate::{
    config::HookConfig,
    error::{HookError, Result},
};

use super::HookTransport;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the raw request body.
pub const SIGNATURE_HEADER: &str = "X-Gatehouse-Signature";

/// HTTP transport for webhook handlers.
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: reqwest::Client,
    secret: String,
    timeout: std::time::Duration,
    max_response_bytes: usize,
}

impl WebhookTransport {
    /// Builds the transport from hook configuration.
    ///
    /// # Errors
    ///
    /// Returns `HookError::Configuration` if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &HookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent("Gatehouse-Hook/1.0")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                HookError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            secret: config.webhook_secret.clone(),
            timeout: config.request_timeout(),
            max_response_bytes: config.max_response_bytes,
        })
    }

    /// Serializes the event and computes its body signature.
    fn prepare_request(&self, event: &Event) -> Result<(Bytes, String)> {
        let body = serde_json::to_vec(event)
            .map_err(|e| HookError::invalid_response(format!("event serialization: {e}")))?;
        let signature = sign_body(&body, &self.secret)?;
        Ok((Bytes::from(body), signature))
    }

    async fn post(&self, url: &str, event: &Event) -> Result<reqwest::Response> {
        let (body, signature) = self.prepare_request(event)?;

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HookError::timeout(self.timeout)
                } else if e.is_connect() {
                    HookError::network(format!("connection failed: {e}"))
                } else {
                    HookError::network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), url, "hook endpoint returned error status");
            return Err(HookError::InvalidStatus { status: status.as_u16() });
        }

        Ok(response)
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Bytes> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HookError::network(format!("failed to read response body: {e}")))?;
        if bytes.len() > self.max_response_bytes {
            return Err(HookError::invalid_response(format!(
                "response body of {} bytes exceeds limit of {}",
                bytes.len(),
                self.max_response_bytes
            )));
        }
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl HookTransport for WebhookTransport {
    async fn perform_with_response(&self, url: &str, event: &Event) -> Result<HookResponse> {
        let span = info_span!("webhook_blocking", event_id = %event.id, event_type = %event.typ, url);
        async {
            let response = self.post(url, event).await?;
            let body = self.read_body(response).await?;

            let value: serde_json::Value = serde_json::from_slice(&body)
                .map_err(|e| HookError::invalid_response(format!("response is not JSON: {e}")))?;

            parse_hook_response(event.typ, &value).map_err(map_parse_error)
        }
        .instrument(span)
        .await
    }

    async fn perform_no_response(&self, url: &str, event: &Event) -> Result<()> {
        let span = info_span!("webhook_non_blocking", event_id = %event.id, event_type = %event.typ, url);
        async {
            let response = self.post(url, event).await?;
            // Drain the body so the connection can be reused; the content is
            // irrelevant for non-blocking deliveries.
            let _ = response.bytes().await;
            Ok(())
        }
        .instrument(span)
        .await
    }
}

pub(crate) fn map_parse_error(error: CoreError) -> HookError {
    match error {
        CoreError::SchemaViolation(message) => HookError::SchemaViolation { message },
        other => HookError::invalid_response(other.to_string()),
    }
}

/// Computes the hex HMAC-SHA256 signature of a request body.
///
/// # Errors
///
/// Returns `HookError::Configuration` if the secret cannot key the MAC.
pub fn sign_body(body: &[u8], secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| HookError::configuration("invalid webhook signing secret"))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a received body against its signature header value.
///
/// Receiver-side helper for handler implementations. Uses a constant-time
/// comparison so timing does not leak the expected signature.
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = sign_body(body, secret) else {
        return false;
    };
    timing_safe_eq(signature, &expected)
}

fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.as_bytes().iter().zip(b.as_bytes()) {
        result |= a_byte ^ b_byte;
    }
    result == 0
}
