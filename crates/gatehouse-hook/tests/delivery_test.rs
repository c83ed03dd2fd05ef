//! End-to-end delivery tests against mock HTTP endpoints.
//!
//! Covers the blocking chain (allow, mutate, deny, budget), response schema
//! enforcement, webhook signatures, the script sidecar protocol, and the
//! full dispatch-persist-deliver cycle for non-blocking events.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::{
    BlockingPayload, CoreError, EventContext, MemoryEventStore, NonBlockingPayload, RealClock,
    TriggeredBy, UserPreCreate, UserSnapshot,
};
use gatehouse_hook::{
    sink::{HookProvider, TxHookRegistrar, TxLifecycleHook, UserReader},
    verify_signature, BlockingHandlerConfig, Deliverer, HookConfig, HookError,
    NonBlockingHandlerConfig, ScriptTransport, StaticScriptSource, Transports, WebhookTransport,
    SIGNATURE_HEADER,
};
use serde_json::json;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

const SECRET: &str = "integration-test-secret";

fn transports(config: &HookConfig) -> Result<Transports> {
    transports_with_scripts(config, StaticScriptSource::new())
}

fn transports_with_scripts(config: &HookConfig, scripts: StaticScriptSource) -> Result<Transports> {
    Ok(Transports::new(
        WebhookTransport::new(config)?,
        ScriptTransport::new(config, Box::new(scripts))?,
    ))
}

fn deliverer(config: HookConfig) -> Result<Deliverer<Transports>> {
    let transports = transports(&config)?;
    Ok(Deliverer::new(Arc::new(config), transports, Arc::new(RealClock::new())))
}

fn blocking_config(bindings: Vec<(&str, String)>) -> HookConfig {
    HookConfig {
        blocking_handlers: bindings
            .into_iter()
            .map(|(event, url)| BlockingHandlerConfig { event: event.to_string(), url })
            .collect(),
        webhook_secret: SECRET.to_string(),
        ..HookConfig::default()
    }
}

fn pre_create_event(seq: i64) -> gatehouse_core::Event {
    gatehouse_core::Event::new_blocking(
        seq,
        BlockingPayload::from(UserPreCreate { user: UserSnapshot::with_id("user-1") }),
        EventContext::new(Utc::now(), TriggeredBy::User),
    )
}

#[tokio::test]
async fn blocking_allow_leaves_payload_unchanged() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .and(matchers::header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"is_allowed": true})))
        .expect(1)
        .mount(&server)
        .await;

    let deliverer =
        deliverer(blocking_config(vec![("user.pre_create", format!("{}/hook", server.uri()))]))?;

    let event = pre_create_event(1);
    let outcome = deliverer.deliver_blocking_event(&event).await?;

    assert!(!outcome.mutated);
    assert!(outcome.mutations.is_empty());
    assert_eq!(serde_json::to_value(&outcome.event)?, serde_json::to_value(&event)?);
    Ok(())
}

#[tokio::test]
async fn blocking_mutations_are_applied_to_payload() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_allowed": true,
            "mutations": {
                "user": {
                    "standard_attributes": {"name": "Renamed"}
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let deliverer =
        deliverer(blocking_config(vec![("user.pre_create", format!("{}/hook", server.uri()))]))?;

    let outcome = deliverer.deliver_blocking_event(&pre_create_event(1)).await?;

    assert!(outcome.mutated);
    let payload = serde_json::to_value(&outcome.event)?;
    assert_eq!(payload["payload"]["user"]["standard_attributes"]["name"], json!("Renamed"));
    Ok(())
}

#[tokio::test]
async fn second_handler_is_posted_the_first_handlers_mutations() -> Result<()> {
    let first = MockServer::start().await;
    let second = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_allowed": true,
            "mutations": {
                "user": {
                    "standard_attributes": {"name": "Renamed"}
                }
            }
        })))
        .expect(1)
        .mount(&first)
        .await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"is_allowed": true})))
        .expect(1)
        .mount(&second)
        .await;

    let deliverer = deliverer(blocking_config(vec![
        ("user.pre_create", format!("{}/hook", first.uri())),
        ("user.pre_create", format!("{}/hook", second.uri())),
    ]))?;

    deliverer.deliver_blocking_event(&pre_create_event(1)).await?;

    let requests = second.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1);

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(body["payload"]["user"]["standard_attributes"]["name"], json!("Renamed"));
    Ok(())
}

#[tokio::test]
async fn deny_stops_chain_and_later_handler_is_never_called() -> Result<()> {
    let denying = MockServer::start().await;
    let never_reached = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_allowed": false,
            "title": "Signup disabled",
            "reason": "New registrations are closed."
        })))
        .expect(1)
        .mount(&denying)
        .await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"is_allowed": true})))
        .expect(0)
        .mount(&never_reached)
        .await;

    let deliverer = deliverer(blocking_config(vec![
        ("user.pre_create", format!("{}/hook", denying.uri())),
        ("user.pre_create", format!("{}/hook", never_reached.uri())),
    ]))?;

    let error = deliverer.deliver_blocking_event(&pre_create_event(1)).await.unwrap_err();

    match error {
        HookError::Disallowed { title, reason } => {
            assert_eq!(title, "Signup disabled");
            assert_eq!(reason, "New registrations are closed.");
        },
        other => panic!("expected Disallowed, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn slow_handler_exhausts_budget_and_skips_the_rest() -> Result<()> {
    let slow = MockServer::start().await;
    let never_reached = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"is_allowed": true}))
                .set_delay(Duration::from_millis(1200)),
        )
        .expect(1)
        .mount(&slow)
        .await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"is_allowed": true})))
        .expect(0)
        .mount(&never_reached)
        .await;

    let mut config = blocking_config(vec![
        ("user.pre_create", format!("{}/hook", slow.uri())),
        ("user.pre_create", format!("{}/hook", never_reached.uri())),
    ]);
    config.sync_timeout_seconds = 1;

    let deliverer = deliverer(config)?;
    let error = deliverer.deliver_blocking_event(&pre_create_event(1)).await.unwrap_err();

    assert!(matches!(error, HookError::DeliveryTimeout { .. }));
    Ok(())
}

#[tokio::test]
async fn non_2xx_status_is_a_delivery_failure() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let deliverer =
        deliverer(blocking_config(vec![("user.pre_create", format!("{}/hook", server.uri()))]))?;

    let error = deliverer.deliver_blocking_event(&pre_create_event(1)).await.unwrap_err();
    assert!(matches!(error, HookError::InvalidStatus { status: 503 }));
    Ok(())
}

#[tokio::test]
async fn unsupported_response_field_is_a_schema_violation() -> Result<()> {
    let server = MockServer::start().await;

    // user.profile.pre_update accepts user mutations but not jwt mutations.
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_allowed": true,
            "mutations": {"jwt": {"payload": {"role": "admin"}}}
        })))
        .mount(&server)
        .await;

    let deliverer = deliverer(blocking_config(vec![(
        "user.profile.pre_update",
        format!("{}/hook", server.uri()),
    )]))?;

    let event = gatehouse_core::Event::new_blocking(
        1,
        BlockingPayload::from(gatehouse_core::UserProfilePreUpdate {
            user: UserSnapshot::with_id("user-1"),
        }),
        EventContext::new(Utc::now(), TriggeredBy::User),
    );

    let error = deliverer.deliver_blocking_event(&event).await.unwrap_err();
    assert!(matches!(error, HookError::SchemaViolation { .. }));
    Ok(())
}

#[tokio::test]
async fn webhook_body_is_signed_and_verifiable() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::header_exists(SIGNATURE_HEADER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"is_allowed": true})))
        .expect(1)
        .mount(&server)
        .await;

    let deliverer =
        deliverer(blocking_config(vec![("user.pre_create", format!("{}/hook", server.uri()))]))?;
    deliverer.deliver_blocking_event(&pre_create_event(1)).await?;

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    let signature = request
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("signature header present");

    assert!(verify_signature(&request.body, signature, SECRET));
    assert!(!verify_signature(&request.body, signature, "wrong-secret"));
    Ok(())
}

#[tokio::test]
async fn script_handler_allow_and_deny() -> Result<()> {
    let sidecar = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/run"))
        .and(matchers::body_partial_json(json!({
            "script": "export default async function(e) { return { is_allowed: true }; }"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"is_allowed": true},
            "error": "",
            "stdout": "",
            "stderr": ""
        })))
        .expect(1)
        .mount(&sidecar)
        .await;

    let mut config = blocking_config(vec![("user.pre_create", "authscript:signup".to_string())]);
    config.script_runner_url = sidecar.uri();

    let mut scripts = StaticScriptSource::new();
    scripts.insert("signup", "export default async function(e) { return { is_allowed: true }; }");

    let transports = transports_with_scripts(&config, scripts)?;
    let deliverer = Deliverer::new(Arc::new(config), transports, Arc::new(RealClock::new()));

    let outcome = deliverer.deliver_blocking_event(&pre_create_event(1)).await?;
    assert!(!outcome.mutated);
    Ok(())
}

#[tokio::test]
async fn script_runtime_error_carries_stdout_and_stderr() -> Result<()> {
    let sidecar = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": null,
            "error": "TypeError: e.user is undefined",
            "stdout": "checking user\n",
            "stderr": "stack trace here\n"
        })))
        .mount(&sidecar)
        .await;

    let mut config = blocking_config(vec![("user.pre_create", "authscript:signup".to_string())]);
    config.script_runner_url = sidecar.uri();

    let mut scripts = StaticScriptSource::new();
    scripts.insert("signup", "broken();");

    let transports = transports_with_scripts(&config, scripts)?;
    let deliverer = Deliverer::new(Arc::new(config), transports, Arc::new(RealClock::new()));

    let error = deliverer.deliver_blocking_event(&pre_create_event(1)).await.unwrap_err();
    match error {
        HookError::ScriptRuntime { error, stdout, stderr } => {
            assert_eq!(error, "TypeError: e.user is undefined");
            assert_eq!(stdout, "checking user\n");
            assert_eq!(stderr, "stack trace here\n");
        },
        other => panic!("expected ScriptRuntime, got {other:?}"),
    }
    Ok(())
}

// --- full dispatch cycle -------------------------------------------------

struct SingleUser;

#[async_trait]
impl UserReader for SingleUser {
    async fn load_user(&self, user_id: &str) -> gatehouse_core::Result<UserSnapshot> {
        if user_id == "user-1" {
            Ok(UserSnapshot::with_id(user_id))
        } else {
            Err(CoreError::NotFound(format!("user {user_id}")))
        }
    }
}

#[derive(Default)]
struct Registrar {
    hooks: Vec<Arc<dyn TxLifecycleHook>>,
}

impl TxHookRegistrar for Registrar {
    fn use_hook(&mut self, hook: Arc<dyn TxLifecycleHook>) {
        self.hooks.push(hook);
    }
}

fn provider(
    config: HookConfig,
    store: Arc<MemoryEventStore>,
) -> Result<Arc<HookProvider<Transports>>> {
    let transports = transports(&config)?;
    let clock = Arc::new(RealClock::new());
    let deliverer = Deliverer::new(Arc::new(config), transports, clock.clone());
    Ok(Arc::new(HookProvider::new(
        deliverer,
        store,
        Arc::new(SingleUser),
        clock,
        EventContext::new(Utc::now(), TriggeredBy::User),
    )))
}

#[tokio::test]
async fn wildcard_handler_receives_exactly_one_post_even_on_500() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/all"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = HookConfig {
        non_blocking_handlers: vec![NonBlockingHandlerConfig {
            events: vec!["*".to_string()],
            url: format!("{}/all", server.uri()),
        }],
        webhook_secret: SECRET.to_string(),
        ..HookConfig::default()
    };

    let store = Arc::new(MemoryEventStore::new());
    let provider = provider(config, store.clone())?;
    let mut registrar = Registrar::default();

    // Sign-in is not an operation, so no user.sync gets synthesized and the
    // wildcard handler sees exactly this one event.
    provider
        .dispatch_non_blocking(
            &mut registrar,
            NonBlockingPayload::UserSignedIn { user: UserSnapshot::with_id("user-1") },
        )
        .await;

    for hook in &registrar.hooks {
        hook.will_commit_tx().await?;
    }
    for hook in &registrar.hooks {
        hook.did_commit_tx().await;
    }

    // The 500 is logged, never surfaced; the event is still persisted.
    let persisted = store.persisted_events().await;
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].seq, 1);

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1);

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(body["type"], json!("user.signed_in"));
    assert_eq!(body["seq"], json!(1));
    assert_eq!(body["payload"]["user"]["id"], json!("user-1"));
    Ok(())
}

#[tokio::test]
async fn commit_cycle_delivers_operation_and_synthesized_sync() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/all"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let config = HookConfig {
        non_blocking_handlers: vec![NonBlockingHandlerConfig {
            events: vec!["*".to_string()],
            url: format!("{}/all", server.uri()),
        }],
        webhook_secret: SECRET.to_string(),
        ..HookConfig::default()
    };

    let store = Arc::new(MemoryEventStore::new());
    let provider = provider(config, store.clone())?;
    let mut registrar = Registrar::default();

    provider
        .dispatch_non_blocking(
            &mut registrar,
            NonBlockingPayload::UserCreated { user: UserSnapshot::with_id("user-1") },
        )
        .await;

    for hook in &registrar.hooks {
        hook.will_commit_tx().await?;
    }
    for hook in &registrar.hooks {
        hook.did_commit_tx().await;
    }

    let persisted = store.persisted_events().await;
    assert_eq!(persisted.len(), 2);

    let types: Vec<String> = persisted.iter().map(|e| e.typ.to_string()).collect();
    assert_eq!(types, vec!["user.created", "user.sync"]);
    Ok(())
}
