use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Test window opens at {opens_at}")]
    NotYetOpen { opens_at: DateTime<Utc> },

    #[error("Test window closed at {closed_at}")]
    WindowClosed { closed_at: DateTime<Utc> },

    #[error("Only {remaining_minutes} minutes remain before {closes_at}, the test needs {required_minutes}")]
    InsufficientRemainingTime {
        closes_at: DateTime<Utc>,
        remaining_minutes: i64,
        required_minutes: i64,
    },

    #[error("Please log in again")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Test link expired at {expired_at}")]
    AlreadyExpiredLink { expired_at: DateTime<Utc> },

    #[error("Session has already been started")]
    AlreadyStarted,

    #[error("Session has already been submitted")]
    AlreadySubmitted,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request body is too large")]
    PayloadTooLarge,

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Remote error {status}: {message}")]
    Remote {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotYetOpen { .. } => "not_yet_open",
            Error::WindowClosed { .. } => "window_closed",
            Error::InsufficientRemainingTime { .. } => "insufficient_remaining_time",
            Error::Unauthenticated => "unauthenticated",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::AlreadyExpiredLink { .. } => "link_expired",
            Error::AlreadyStarted => "already_started",
            Error::AlreadySubmitted => "already_submitted",
            Error::Conflict(_) => "conflict",
            Error::Invalid(_) => "invalid",
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => "bad_request",
            Error::PayloadTooLarge => "payload_too_large",
            Error::Timeout(_) => "timeout",
            Error::Remote { .. } | Error::Reqwest(_) => "upstream",
            Error::Config(_) | Error::Database(_) | Error::Internal(_) | Error::Io(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotYetOpen { .. }
            | Error::WindowClosed { .. }
            | Error::InsufficientRemainingTime { .. }
            | Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExpiredLink { .. } => StatusCode::GONE,
            Error::AlreadyStarted | Error::AlreadySubmitted | Error::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Error::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Remote { .. } | Error::Reqwest(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Database(_) | Error::Internal(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let code = self.code();
        let message = match &self {
            Error::Database(err) => {
                tracing::error!(error = ?err, "Database failure");
                "An unexpected error occurred".to_string()
            }
            Error::Config(_) | Error::Internal(_) | Error::Io(_) => {
                tracing::error!(error = %self, "Internal failure");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({ "error": code, "message": message });
        match &self {
            Error::NotYetOpen { opens_at } => body["opens_at"] = json!(opens_at),
            Error::WindowClosed { closed_at } => body["closed_at"] = json!(closed_at),
            Error::InsufficientRemainingTime {
                closes_at,
                remaining_minutes,
                required_minutes,
            } => {
                body["closes_at"] = json!(closes_at);
                body["remaining_minutes"] = json!(remaining_minutes);
                body["required_minutes"] = json!(required_minutes);
            }
            Error::AlreadyExpiredLink { expired_at } => body["expired_at"] = json!(expired_at),
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}
