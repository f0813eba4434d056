//! HTTP route handlers: presentation lifecycle and conversations

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::agent::builtin::presentation_plan;
use crate::store::ConversationExport;
use crate::tasks::{self, spawn_poller};

use super::middleware::AuthedUser;
use super::state::AppState;
use super::{json_error, json_response};

pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "deckflow" })),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatePresentationRequest {
    pub prompt: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slides_count: Option<u32>,
}

/// POST /api/presentations
///
/// Runs the creation pipeline (brief -> outline -> dispatch) through the
/// orchestrator; the dispatch step starts the external render task. The
/// rest of the lifecycle is driven by the webhook/poll protocol.
pub(crate) async fn handle_create_presentation(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Json(request): Json<CreatePresentationRequest>,
) -> Response {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "prompt must not be empty");
    }

    let title = request
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .unwrap_or_else(|| prompt.lines().next().unwrap_or(prompt).chars().take(80).collect());

    let presentation = match state.store.create_presentation(&user_id, &title, prompt) {
        Ok(presentation) => presentation,
        Err(e) => {
            error!(error = %e, "Failed to insert presentation");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let plan = presentation_plan(&presentation.id, &user_id, prompt, request.slides_count);
    let result = match state.orchestrator.execute(plan).await {
        Ok(result) => result,
        Err(e) => {
            // Plan validation failures mean the pipeline itself is
            // misconfigured, not that the user sent bad input.
            error!(error = %e, "Pipeline plan rejected");
            fail_creation(&state, &user_id, &presentation.id, "pipeline misconfigured").await;
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to start generation");
        }
    };

    let task_id = result
        .step_result("dispatch")
        .filter(|r| r.success)
        .and_then(|r| r.data.as_ref())
        .and_then(|d| d.get("task_id"))
        .and_then(|v| v.as_str())
        .map(String::from);

    let task_id = match task_id {
        Some(task_id) => task_id,
        None => {
            let reason = result
                .errors
                .first()
                .cloned()
                .unwrap_or_else(|| "dispatch produced no task id".to_string());
            warn!(presentation_id = %presentation.id, %reason, "Creation pipeline failed");
            fail_creation(&state, &user_id, &presentation.id, &reason).await;
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to start generation");
        }
    };

    if !state.config.webhook.enabled {
        spawn_poller(
            Arc::clone(&state.store),
            Arc::clone(&state.provider),
            state.relay.clone(),
            task_id.clone(),
            state.config.poller.clone(),
        );
    }

    info!(presentation_id = %presentation.id, task_id = %task_id, "Generation started");
    state
        .relay
        .emit_generation_status(&user_id, &presentation.id, "generating", "Generating slides...")
        .await;

    json_response(
        StatusCode::OK,
        json!({
            "success": true,
            "data": {
                "presentation_id": presentation.id,
                "task_id": task_id,
                "status": "generating",
            }
        }),
    )
}

async fn fail_creation(state: &AppState, user_id: &str, presentation_id: &str, reason: &str) {
    if let Err(e) = state.store.set_presentation_error(presentation_id, reason) {
        error!(presentation_id, error = %e, "Failed to record creation failure");
    }
    state
        .relay
        .emit_generation_error(user_id, presentation_id, reason)
        .await;
}

/// GET /api/presentations
pub(crate) async fn handle_list_presentations(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
) -> Response {
    match state.store.user_presentations(&user_id) {
        Ok(presentations) => json_response(
            StatusCode::OK,
            json!({ "success": true, "data": presentations }),
        ),
        Err(e) => {
            error!(error = %e, "Failed to list presentations");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// GET /api/presentations/{id}/status
///
/// Progress and current step come from stored webhook data when present,
/// otherwise per-status defaults apply.
pub(crate) async fn handle_presentation_status(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Path(id): Path<String>,
) -> Response {
    let presentation = match state.store.presentation(&id) {
        Ok(Some(presentation)) if presentation.user_id == user_id => presentation,
        Ok(_) => return json_error(StatusCode::NOT_FOUND, "Presentation not found"),
        Err(e) => {
            error!(error = %e, "Status lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let webhook_data = presentation
        .task_id
        .as_deref()
        .and_then(|task_id| state.store.render_task(task_id).ok().flatten())
        .and_then(|task| task.webhook_data);

    let (progress, current_step) = tasks::progress_for(&presentation, webhook_data.as_ref());

    json_response(
        StatusCode::OK,
        json!({
            "success": true,
            "data": {
                "presentation_id": presentation.id,
                "status": presentation.status,
                "progress": progress,
                "current_step": current_step,
                "task_id": presentation.task_id,
                "created_at": presentation.created_at,
                "updated_at": presentation.updated_at,
            }
        }),
    )
}

/// GET /api/presentations/{id}/slides
pub(crate) async fn handle_presentation_slides(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Path(id): Path<String>,
) -> Response {
    match state.store.presentation_owner(&id) {
        Ok(Some(owner)) if owner == user_id => {}
        Ok(_) => return json_error(StatusCode::NOT_FOUND, "Presentation not found"),
        Err(e) => {
            error!(error = %e, "Slides lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    }

    match state.store.slides(&id) {
        Ok(slides) => json_response(StatusCode::OK, json!({ "success": true, "data": slides })),
        Err(e) => {
            error!(error = %e, "Slides query failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateConversationRequest {
    pub title: String,
}

/// POST /api/conversations
pub(crate) async fn handle_create_conversation(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Json(request): Json<CreateConversationRequest>,
) -> Response {
    let title = request.title.trim();
    if title.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "title must not be empty");
    }
    match state.store.create_conversation(&user_id, title) {
        Ok(conversation) => json_response(
            StatusCode::OK,
            json!({ "success": true, "data": conversation }),
        ),
        Err(e) => {
            error!(error = %e, "Failed to create conversation");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AppendMessageRequest {
    pub role: String,
    pub content: String,
}

/// POST /api/conversations/{id}/messages
pub(crate) async fn handle_append_message(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Path(id): Path<String>,
    Json(request): Json<AppendMessageRequest>,
) -> Response {
    if request.role.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "role must not be empty");
    }

    match state.store.conversation(&id) {
        Ok(Some(conversation)) if conversation.user_id == user_id => {}
        Ok(_) => return json_error(StatusCode::NOT_FOUND, "Conversation not found"),
        Err(e) => {
            error!(error = %e, "Conversation lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    }

    match state.store.append_message(&id, &request.role, &request.content) {
        Ok(message) => json_response(StatusCode::OK, json!({ "success": true, "data": message })),
        Err(e) => {
            error!(error = %e, "Failed to append message");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// GET /api/conversations/{id}/export
pub(crate) async fn handle_export_conversation(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Path(id): Path<String>,
) -> Response {
    match state.store.conversation(&id) {
        Ok(Some(conversation)) if conversation.user_id == user_id => {}
        Ok(_) => return json_error(StatusCode::NOT_FOUND, "Conversation not found"),
        Err(e) => {
            error!(error = %e, "Conversation lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    }

    match state.store.export_conversation(&id) {
        Ok(export) => json_response(StatusCode::OK, json!({ "success": true, "data": export })),
        Err(e) => {
            error!(error = %e, "Export failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// POST /api/conversations/import
pub(crate) async fn handle_import_conversation(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Json(export): Json<ConversationExport>,
) -> Response {
    match state.store.import_conversation(&user_id, &export) {
        Ok(conversation) => json_response(
            StatusCode::OK,
            json!({ "success": true, "data": conversation }),
        ),
        Err(e) => {
            error!(error = %e, "Import failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
