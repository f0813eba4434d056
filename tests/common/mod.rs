#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use deckflow::agent::{BriefAgent, DispatchAgent, OutlineAgent};
use deckflow::auth;
use deckflow::engine::AgentOrchestrator;
use deckflow::provider::ProviderClient;
use deckflow::relay::{Relay, RelayConfig};
use deckflow::server::AppState;
use deckflow::store::Store;
use deckflow::Config;

pub const TOKEN_SECRET: &str = "test-token-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Everything a server-level test needs. The relay must stay alive for
/// the duration of the test, so it rides along.
pub struct TestContext {
    pub state: Arc<AppState>,
    pub relay: Relay,
}

/// Build app state over an in-memory store, a relay on an ephemeral port,
/// and a provider client pointing at an unroutable address (tests never
/// reach the network unless a stub base url is supplied).
pub async fn test_context(webhook_secret: Option<&str>) -> TestContext {
    test_context_with(webhook_secret, None).await
}

pub async fn test_context_with(
    webhook_secret: Option<&str>,
    provider_base_url: Option<&str>,
) -> TestContext {
    let mut config = Config::default();
    config.auth.token_secret = TOKEN_SECRET.to_string();
    config.webhook.secret = webhook_secret.map(String::from);
    config.provider.base_url = provider_base_url
        .unwrap_or("http://127.0.0.1:9")
        .to_string();
    config.provider.retry = None;
    config.provider.timeout = 500;

    let store = Arc::new(Store::in_memory().expect("in-memory store"));
    let provider = Arc::new(ProviderClient::new(config.provider.clone()).expect("provider client"));

    let relay = Relay::start(
        RelayConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            auth_grace: Duration::from_secs(2),
        },
        config.auth.token_secret.clone(),
    )
    .await
    .expect("relay start");

    let mut orchestrator = AgentOrchestrator::new();
    orchestrator.register(Arc::new(BriefAgent));
    orchestrator.register(Arc::new(OutlineAgent));
    orchestrator.register(Arc::new(DispatchAgent::new(
        Arc::clone(&provider),
        Arc::clone(&store),
        None,
    )));

    let state = Arc::new(AppState {
        store,
        relay: relay.handle(),
        provider,
        orchestrator: Arc::new(orchestrator),
        config: Arc::new(config),
    });

    TestContext { state, relay }
}

pub fn bearer(user_id: &str) -> String {
    format!("Bearer {}", auth::sign_user_token(TOKEN_SECRET, user_id))
}

/// Seed a presentation with a running render task; returns the
/// presentation id (the task id is the caller's choice).
pub fn seed_task(state: &AppState, user_id: &str, task_id: &str) -> String {
    let presentation = state
        .store
        .create_presentation(user_id, "Seeded deck", "seed prompt")
        .expect("seed presentation");
    state
        .store
        .set_presentation_task(&presentation.id, task_id)
        .expect("link task");
    state
        .store
        .create_render_task(task_id, &presentation.id, user_id)
        .expect("seed task");
    presentation.id
}

/// One-shot request against a fresh router over the shared state.
pub async fn request(
    ctx: &TestContext,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Vec<u8>>,
) -> (StatusCode, Value) {
    let app = deckflow::server::router(Arc::clone(&ctx.state));

    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(bytes) => builder
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Deliver a webhook payload with a valid signature under the test secret.
pub async fn deliver_signed_webhook(ctx: &TestContext, payload: &Value) -> (StatusCode, Value) {
    let raw = serde_json::to_vec(payload).expect("payload");
    let signature = auth::webhook_signature(WEBHOOK_SECRET, &raw);
    request(
        ctx,
        "POST",
        "/api/webhooks/render",
        &[(deckflow::server::SIGNATURE_HEADER, signature.as_str())],
        Some(raw),
    )
    .await
}
