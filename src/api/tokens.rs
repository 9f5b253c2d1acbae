use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{auth::require_admin_key, state::AppState};
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct RevokeTokenRequest {
    pub jti: String,
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeSubjectRequest {
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeSubjectResponse {
    pub revocation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenStatusResponse {
    pub jti: String,
    pub revoked: bool,
}

/// Revokes a single token (logout / forced invalidation)
///
/// Only acknowledges once the revocation is durable.
async fn revoke_token(
    State(state): State<AppState>,
    Json(request): Json<RevokeTokenRequest>,
) -> Result<StatusCode> {
    if request.subject.trim().is_empty() {
        return Err(AppError::Validation("subject is required".to_string()));
    }

    state
        .registry
        .revoke(&request.jti, &request.subject, request.expires_at)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Revokes every token issued to a subject so far
async fn revoke_subject(
    State(state): State<AppState>,
    Json(request): Json<RevokeSubjectRequest>,
) -> Result<(StatusCode, Json<RevokeSubjectResponse>)> {
    let revocation_id = state
        .registry
        .revoke_all_for_subject(&request.subject, request.expires_at)
        .await?;

    Ok((StatusCode::CREATED, Json(RevokeSubjectResponse { revocation_id })))
}

/// Reports whether a token id is currently revoked
async fn token_status(
    State(state): State<AppState>,
    Path(jti): Path<String>,
) -> Json<TokenStatusResponse> {
    let revoked = state.registry.is_revoked(&jti).await;

    Json(TokenStatusResponse { jti, revoked })
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/tokens/revoke", post(revoke_token))
        .route("/tokens/:jti/revoked", get(token_status))
        .route("/subjects/revoke", post(revoke_subject))
        .route_layer(middleware::from_fn_with_state(state, require_admin_key))
}
