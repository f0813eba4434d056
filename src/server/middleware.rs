//! HTTP middleware: bearer-token authentication
//!
//! Routes behind this middleware see the verified user id as an
//! `AuthedUser` request extension; the claim comes from the token
//! signature, never from a client-asserted field.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::auth;

use super::json_error;
use super::state::AppState;

/// Verified user identity, inserted by `auth_middleware`
#[derive(Debug, Clone)]
pub struct AuthedUser(pub String);

pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let token = match token {
        Some(token) => token,
        None => return json_error(StatusCode::UNAUTHORIZED, "authentication required"),
    };

    match auth::verify_user_token(&state.config.auth.token_secret, token) {
        Some(user_id) => {
            request.extensions_mut().insert(AuthedUser(user_id));
            next.run(request).await
        }
        None => json_error(StatusCode::UNAUTHORIZED, "invalid token"),
    }
}
