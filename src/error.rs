use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Revocation registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_debug = format!("{:?}", self);

        let (status, error_message) = match self {
            AppError::Registry(RegistryError::InvalidId) => {
                (StatusCode::BAD_REQUEST, "Invalid token id".to_string())
            }
            AppError::Registry(RegistryError::InvalidSubject) => {
                (StatusCode::BAD_REQUEST, "Invalid subject".to_string())
            }
            AppError::Registry(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Revocation store unavailable".to_string(),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(json!({
            "error": error_debug,
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
