use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;

use super::state::{AppState, ADMIN_KEY_HEADER};
use crate::registry::VerifiedCredential;

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    Revoked,
    Forbidden,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required. Please log in.",
            )
                .into_response(),
            AuthError::Revoked => (
                StatusCode::UNAUTHORIZED,
                "Token has been revoked. Please log in again.",
            )
                .into_response(),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "Invalid admin key.").into_response(),
        }
    }
}

/// Rejects requests whose verified credential has been revoked.
///
/// Expects the signature/claims layer in front of it to have inserted a
/// [`VerifiedCredential`] extension.
pub async fn require_unrevoked(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let credential = request
        .extensions()
        .get::<VerifiedCredential>()
        .cloned()
        .ok_or(AuthError::Unauthorized)?;

    if state.registry.is_credential_revoked(&credential).await {
        tracing::info!(
            jti = %credential.jti,
            subject = %credential.subject,
            "Rejected revoked token"
        );
        return Err(AuthError::Revoked);
    }

    Ok(next.run(request).await)
}

/// Requires the admin key header on revocation endpoints
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let provided = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::Unauthorized)?;

    if provided != state.admin_api_key.expose_secret().as_str() {
        tracing::warn!("Rejected request with invalid admin key");
        return Err(AuthError::Forbidden);
    }

    Ok(next.run(request).await)
}
