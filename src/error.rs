//! Unified application error model and its HTTP mapping.
//! Every failure in the request path resolves to one `AppError` variant, which renders as
//! a JSON body with a human-readable message and a status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    InvalidCredentials { code: String, message: String },
    MissingToken { code: String, message: String },
    InvalidToken { code: String, message: String },
    Forbidden { code: String, message: String },
    DuplicateEmail { code: String, message: String },
    NotFound { code: String, message: String },
    ValidationFailed { code: String, message: String },
    StoreUnavailable { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::InvalidCredentials { code, .. }
            | AppError::MissingToken { code, .. }
            | AppError::InvalidToken { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::DuplicateEmail { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::ValidationFailed { code, .. }
            | AppError::StoreUnavailable { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::InvalidCredentials { message, .. }
            | AppError::MissingToken { message, .. }
            | AppError::InvalidToken { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::DuplicateEmail { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::ValidationFailed { message, .. }
            | AppError::StoreUnavailable { message, .. } => message.as_str(),
        }
    }

    pub fn invalid_credentials() -> Self {
        AppError::InvalidCredentials { code: "invalid_credentials".into(), message: "invalid credentials".into() }
    }
    pub fn missing_token() -> Self {
        AppError::MissingToken { code: "missing_token".into(), message: "token required".into() }
    }
    pub fn invalid_token<S: Into<String>>(msg: S) -> Self {
        AppError::InvalidToken { code: "invalid_token".into(), message: msg.into() }
    }
    pub fn forbidden() -> Self {
        AppError::Forbidden { code: "forbidden".into(), message: "access denied".into() }
    }
    pub fn duplicate_email() -> Self {
        AppError::DuplicateEmail { code: "duplicate_email".into(), message: "this email is already in use".into() }
    }
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        AppError::NotFound { code: "not_found".into(), message: msg.into() }
    }
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        AppError::ValidationFailed { code: "validation_failed".into(), message: msg.into() }
    }
    pub fn store_unavailable<S: Into<String>>(msg: S) -> Self {
        AppError::StoreUnavailable { code: "store_unavailable".into(), message: msg.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::InvalidCredentials { .. } => 401,
            AppError::MissingToken { .. } => 401,
            AppError::InvalidToken { .. } => 403,
            AppError::Forbidden { .. } => 403,
            AppError::DuplicateEmail { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::ValidationFailed { .. } => 400,
            AppError::StoreUnavailable { .. } => 503,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}
