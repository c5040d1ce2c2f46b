//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use casefile_common::types::ErrorBody;
use thiserror::Error;

use crate::ingest::framework::PipelineError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            AppError::Pipeline(e) => match e {
                PipelineError::JobNotFound(_) | PipelineError::DeadLetterNotFound(_) => {
                    (StatusCode::NOT_FOUND, "not_found")
                },
                PipelineError::Invalid(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                e if e.is_superseded() => (StatusCode::CONFLICT, "conflict"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            match self {
                AppError::Internal(message) => message,
                _ => "An internal error occurred".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(ErrorBody {
            error: code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
