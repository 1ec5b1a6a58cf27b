use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

/// Domain errors surfaced by the booking and lending modules. Callers get a
/// short human-readable message; diagnostic detail goes to the log.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// Slot unavailable or duplicate booking; the message names the reason
    /// so the caller can show something more specific than a generic error.
    #[error("{0}")]
    Conflict(String),

    /// Operation not permitted in the record's current state.
    #[error("{0}")]
    State(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        AppError::State(msg.into())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::State(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Database(err) = self {
            log::error!("database failure: {err}");
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

pub type AppResult<T> = Result<T, AppError>;
