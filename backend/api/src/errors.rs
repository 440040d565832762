//! Application-wide error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use contract_ledger::Error as LedgerError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Business-rule rejection from the contract ledger.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A check-in for this (contract, day, task) slot already exists.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// Optimistic-concurrency failure: the contract changed between read
    /// and write. The caller should re-read and retry.
    #[error("contract was modified concurrently, retry")]
    Conflict,

    /// Missing or unrecognised bearer token.
    #[error("authentication required")]
    Unauthorized,

    /// Unknown contract, or one the caller does not own.
    #[error("resource not found")]
    NotFound,

    /// The payment gateway rejected or failed an outbound call.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// A stored record failed to decode back into ledger types.
    #[error("corrupt stored record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(LedgerError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(LedgerError::InvalidState(_)) => StatusCode::CONFLICT,
            ApiError::Ledger(LedgerError::DuplicateOutcome(_)) => StatusCode::CONFLICT,
            ApiError::Ledger(LedgerError::PaymentFailed(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Ledger(LedgerError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Duplicate(_) => StatusCode::CONFLICT,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Corrupt(_)
            | ApiError::Database(_)
            | ApiError::Migrate(_)
            | ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("internal error: {self}");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
