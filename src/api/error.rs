use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::AccountError;
use crate::services::validation::ValidationError;

#[derive(Debug)]
pub enum ApiError {
    Account(AccountError),

    /// No route under `/api` matched the request path.
    NotFound(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(err) => write!(f, "{err}"),
            Self::NotFound(path) => write!(f, "Not found: {path}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn validation(field: &'static str, msg: impl Into<String>) -> Self {
        Self::from(ValidationError::new(field, msg))
    }

    /// Status and stable code for the response.
    #[must_use]
    pub const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Account(err) => match err {
                AccountError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS")
                }
                AccountError::NotVerified => (StatusCode::FORBIDDEN, "NOT_VERIFIED"),
                AccountError::EmailTaken => (StatusCode::CONFLICT, "EMAIL_TAKEN"),
                AccountError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
                AccountError::ExpiredToken => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
                AccountError::AccountNotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                AccountError::Validation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
                AccountError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                AccountError::Database(_) | AccountError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = match &self {
            Self::Account(AccountError::Database(msg)) => {
                tracing::error!("Database error: {}", msg);
                ApiResponse::<()>::error("A database error occurred", code)
            }
            Self::Account(AccountError::Internal(msg)) => {
                tracing::error!("Internal error: {}", msg);
                ApiResponse::<()>::error("An internal error occurred", code)
            }
            Self::Account(AccountError::Validation(v)) => {
                ApiResponse::<()>::error(v.message.clone(), code).with_field(v.field)
            }
            Self::Account(err) => ApiResponse::<()>::error(err.to_string(), code),
            Self::NotFound(path) => {
                ApiResponse::<()>::error(format!("No route for {path}"), code)
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        Self::Account(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Account(AccountError::Validation(err))
    }
}
