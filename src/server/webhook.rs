//! Render-service webhook endpoint
//!
//! `POST /api/webhooks/render`. The raw body is authenticated with
//! `x-deckflow-signature` (hex HMAC-SHA256 under the shared secret) before
//! any processing; when no secret is configured, verification is skipped.
//!
//! Response policy: business outcomes (task finished, task failed, event
//! ignored) all return 200 with a descriptive body; non-200 is reserved
//! for protocol failures (bad signature, bad input, missing rows, server
//! errors).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::auth;
use crate::tasks::{self, ApplyOutcome, ProtocolError, TaskEvent};

use super::state::AppState;
use super::{json_error, json_response};

pub const SIGNATURE_HEADER: &str = "x-deckflow-signature";

pub(crate) async fn handle_render_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.config.webhook.secret {
        let signature = match headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
            Some(signature) => signature,
            None => return json_error(StatusCode::UNAUTHORIZED, "Missing signature"),
        };
        if !auth::verify_webhook_signature(secret, &body, signature) {
            warn!("Webhook rejected: signature mismatch");
            return json_error(StatusCode::UNAUTHORIZED, "Invalid signature");
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid JSON body"),
    };

    let task_id = match payload.get("task_id").and_then(|v| v.as_str()) {
        Some(task_id) if !task_id.is_empty() => task_id,
        _ => return json_error(StatusCode::BAD_REQUEST, "Missing task_id"),
    };

    let task = match state.store.render_task(task_id) {
        Ok(Some(task)) => task,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Task not found"),
        Err(e) => {
            error!(task_id, error = %e, "Webhook task lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    // Resolve the owning presentation before acting; events are only ever
    // emitted to that user's room.
    match state.store.presentation(&task.presentation_id) {
        Ok(Some(_)) => {}
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Presentation not found"),
        Err(e) => {
            error!(task_id, error = %e, "Webhook presentation lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    }

    let event = TaskEvent::from_webhook(&payload);
    match tasks::apply_task_event(&state.store, &state.relay, &task, event).await {
        Ok(ApplyOutcome::Completed { slides_count }) => json_response(
            StatusCode::OK,
            json!({ "success": true, "data": { "slides_count": slides_count } }),
        ),
        Ok(ApplyOutcome::FailureRecorded) => json_response(
            StatusCode::OK,
            json!({ "success": true, "message": "Task failure recorded" }),
        ),
        Ok(ApplyOutcome::PlanningRecorded)
        | Ok(ApplyOutcome::TopicsRecorded)
        | Ok(ApplyOutcome::ProgressRecorded) => json_response(
            StatusCode::OK,
            json!({ "success": true, "message": "Progress recorded" }),
        ),
        Ok(ApplyOutcome::AlreadySettled) | Ok(ApplyOutcome::Acknowledged) => json_response(
            StatusCode::OK,
            json!({ "success": true, "message": "Event acknowledged" }),
        ),
        Err(ProtocolError::SlideParse(reason)) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Failed to parse slides: {reason}"),
        ),
        Err(e) => {
            error!(task_id, error = %e, "Webhook apply failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
