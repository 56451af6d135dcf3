use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::credential::CredentialError;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    Conflict(String),
    /// Credential was valid once and has been redeemed. Safe to name
    /// distinctly: the caller already holds the secret.
    AlreadyUsed,
    /// Collapses not-found, expired, superseded and malformed so the
    /// response leaks nothing about which occurred.
    InvalidOrExpired,
    RateLimited {
        retry_after_secs: u64,
    },
    Delivery(String),
    Internal(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not Found: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {msg}"),
            AppError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            AppError::AlreadyUsed => write!(f, "Already Used"),
            AppError::InvalidOrExpired => write!(f, "Invalid or Expired"),
            AppError::RateLimited { retry_after_secs } => {
                write!(f, "Rate Limited: retry after {retry_after_secs}s")
            }
            AppError::Delivery(msg) => write!(f, "Delivery Error: {msg}"),
            AppError::Internal(msg) => write!(f, "Internal Error: {msg}"),
            AppError::Database(err) => write!(f, "Database Error: {err}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::AlreadyUsed => (
                StatusCode::CONFLICT,
                "This code or link has already been used".to_string(),
            ),
            AppError::InvalidOrExpired => (
                StatusCode::BAD_REQUEST,
                "Invalid or expired code".to_string(),
            ),
            AppError::RateLimited { retry_after_secs } => {
                let body = json!({
                    "error": "Too many attempts. Please try again later.",
                    "retry_after_secs": retry_after_secs,
                });
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert("retry-after", value);
                }
                return response;
            }
            AppError::Delivery(msg) => {
                tracing::error!("Delivery error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to deliver message".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::RateLimited { retry_after_secs } => {
                AppError::RateLimited { retry_after_secs }
            }
            CredentialError::AlreadyUsed => AppError::AlreadyUsed,
            CredentialError::Malformed
            | CredentialError::NotFound
            | CredentialError::Expired
            | CredentialError::Superseded => AppError::InvalidOrExpired,
            CredentialError::Hash(msg) => AppError::Internal(msg),
            CredentialError::Database(err) => AppError::Database(err),
        }
    }
}
