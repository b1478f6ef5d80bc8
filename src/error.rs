use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures reported by a [`TallyStore`](crate::db::TallyStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Poll option {0} not found")]
    OptionNotFound(i32),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Invalid request")]
    InvalidRequest,
    #[error("Poll option {0} not found")]
    OptionNotFound(i32),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Not found")]
    NotFound,
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            PollError::InvalidRequest => (StatusCode::BAD_REQUEST, "Invalid request"),
            PollError::OptionNotFound(_) => (StatusCode::NOT_FOUND, "Poll option not found"),
            PollError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            PollError::NotFound => (StatusCode::NOT_FOUND, "Not found"),
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for PollError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::OptionNotFound(id) => PollError::OptionNotFound(id),
            StoreError::Database(e) => PollError::DatabaseError(e.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}
