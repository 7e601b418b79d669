//! Application error type and its JSON rendering.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::{auth::jwt::TokenError, db::StoreError, response::ApiResponse, validation::FieldError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("An account with this email already exists")]
    DuplicateAccount,

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Please verify your email before logging in")]
    EmailNotVerified,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A collaborator (mail transport, database) failed; the message is user-facing.
    #[error("{0}")]
    UpstreamFailure(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::BadRequest(_)
            | AppError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AppError::DuplicateAccount | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidCredentials
            | AppError::EmailNotVerified
            | AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamFailure(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(constraint) => {
                AppError::Conflict(format!("Duplicate value violates {constraint}"))
            }
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AppError::Unauthenticated("Malformed token"),
            TokenError::SignatureInvalid => AppError::Unauthenticated("Invalid token"),
            TokenError::Expired => AppError::Unauthenticated("Token expired"),
            TokenError::WrongKind => AppError::Unauthenticated("Invalid token type"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            AppError::Validation(errors) => {
                ApiResponse::failure("Validation failed", Some(errors))
            }
            AppError::Internal(e) => {
                error!(error = ?e, "unhandled error");
                // Detailed messages only in development builds
                let message = if cfg!(debug_assertions) {
                    format!("Internal server error: {e}")
                } else {
                    "Internal server error".to_string()
                };
                ApiResponse::failure(message, None)
            }
            AppError::UpstreamFailure(ref message) => {
                error!(%message, "upstream failure");
                ApiResponse::failure(message.clone(), None)
            }
            other => ApiResponse::failure(other.to_string(), None),
        };
        (status, Json(body)).into_response()
    }
}
