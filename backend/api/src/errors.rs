//! Application-wide error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use annsetu_core::Error as CoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing or invalid actor: {0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Database(_) | Self::Migrate(_) | Self::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
            Self::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::Core(e) => match e {
                CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
                CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                CoreError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
                CoreError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
                CoreError::AlreadyAssigned(_) => (StatusCode::CONFLICT, "already_assigned"),
                CoreError::ResourceAlreadyReserved(_) => {
                    (StatusCode::CONFLICT, "resource_already_reserved")
                }
                CoreError::InvalidOtp(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_otp"),
                CoreError::Unauthorized(_) => (StatusCode::FORBIDDEN, "unauthorized"),
                CoreError::OtpSpaceExhausted(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "otp_space_exhausted")
                }
                CoreError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                kind,
            }),
        )
            .into_response()
    }
}
