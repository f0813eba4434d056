//! HTTP JSON API server
//!
//! Exposes the presentation lifecycle as an async HTTP service using
//! `axum` + `tokio`:
//! - `GET  /health`                            - liveness (no auth)
//! - `POST /api/webhooks/render`               - render-service webhook (signature auth)
//! - `POST /api/presentations`                 - start a generation
//! - `GET  /api/presentations`                 - list own presentations
//! - `GET  /api/presentations/{id}/status`     - poll lifecycle status
//! - `GET  /api/presentations/{id}/slides`     - fetch generated slides
//! - `POST /api/conversations`                 - create a conversation
//! - `POST /api/conversations/{id}/messages`   - append a message
//! - `GET  /api/conversations/{id}/export`     - export title + ordered messages
//! - `POST /api/conversations/import`          - recreate from an export
//!
//! All responses are JSON. Bearer tokens are verified by middleware for
//! everything except /health and the webhook endpoint, which authenticates
//! via body signature instead.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::info;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::{EventReceiver, WorkflowEvent};
use crate::relay::{events, RelayHandle};

mod handlers;
mod middleware;
mod state;
mod webhook;

pub use middleware::AuthedUser;
pub use state::AppState;
pub use webhook::SIGNATURE_HEADER;

use self::handlers::{
    handle_append_message, handle_create_conversation, handle_create_presentation,
    handle_export_conversation, handle_health, handle_import_conversation,
    handle_list_presentations, handle_not_found, handle_presentation_slides,
    handle_presentation_status,
};
use self::middleware::auth_middleware;
use self::webhook::handle_render_webhook;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Construct a JSON response with the given status code
pub(crate) fn json_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// Construct a JSON error response in the uniform failure shape
pub(crate) fn json_error(status: StatusCode, message: &str) -> Response {
    json_response(status, json!({ "success": false, "error": message }))
}

/// Build the API router over shared state
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route(
            "/api/presentations",
            post(handle_create_presentation).get(handle_list_presentations),
        )
        .route(
            "/api/presentations/{id}/status",
            get(handle_presentation_status),
        )
        .route(
            "/api/presentations/{id}/slides",
            get(handle_presentation_slides),
        )
        .route("/api/conversations", post(handle_create_conversation))
        .route("/api/conversations/import", post(handle_import_conversation))
        .route(
            "/api/conversations/{id}/messages",
            post(handle_append_message),
        )
        .route(
            "/api/conversations/{id}/export",
            get(handle_export_conversation),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/webhooks/render", post(handle_render_webhook))
        .merge(protected)
        .fallback(handle_not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve the API until the process exits
pub async fn start_server(state: Arc<AppState>, bind_addr: &str) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("API listening on http://{}", listener.local_addr()?);
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Forward engine progress events to the owning user's room. Events for
/// plans with no owner are dropped.
pub fn spawn_event_bridge(receiver: EventReceiver, relay: RelayHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            let user_id = match event.user_id() {
                Some(user_id) => user_id.to_string(),
                None => continue,
            };
            match event {
                WorkflowEvent::StepStarted { step_name, plan_name, .. } => {
                    relay
                        .emit_to_user(
                            &user_id,
                            events::GENERATION_STATUS,
                            json!({
                                "plan": plan_name,
                                "status": "running",
                                "message": format!("Running {step_name}"),
                            }),
                        )
                        .await;
                }
                WorkflowEvent::StepFinished {
                    step_name,
                    success: false,
                    error,
                    plan_name,
                    ..
                } => {
                    relay
                        .emit_to_user(
                            &user_id,
                            events::GENERATION_ERROR,
                            json!({
                                "plan": plan_name,
                                "step": step_name,
                                "error": error,
                            }),
                        )
                        .await;
                }
                WorkflowEvent::StepFinished { .. } => {}
                WorkflowEvent::WorkflowFinished {
                    success: true,
                    plan_name,
                    ..
                } => {
                    relay
                        .emit_to_user(
                            &user_id,
                            events::GENERATION_COMPLETED,
                            json!({ "plan": plan_name }),
                        )
                        .await;
                }
                WorkflowEvent::WorkflowFinished { .. } => {}
            }
        }
    })
}
