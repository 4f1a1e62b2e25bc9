//! REST API routes for Outreach

mod campaigns;
mod ingest;
mod messages;
mod reports;
mod routes;
mod state;
mod storefront;
mod targets;
mod ws;

pub use campaigns::*;
pub use ingest::*;
pub use messages::*;
pub use reports::*;
pub use routes::*;
pub use state::*;
pub use storefront::*;
pub use targets::*;
pub use ws::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::EngineError;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta {
                timestamp: Utc::now(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Precondition(String),
    InvalidTransition(String),
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    DatabaseError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiError::new("VALIDATION_ERROR", &msg),
            ),
            AppError::Precondition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError::new("PRECONDITION_FAILED", &msg),
            ),
            AppError::InvalidTransition(msg) => (
                StatusCode::BAD_REQUEST,
                ApiError::new("INVALID_TRANSITION", &msg),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ApiError::new("NOT_FOUND", &msg),
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ApiError::new("CONFLICT", &msg),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ApiError::new("BAD_REQUEST", &msg),
            ),
            AppError::DatabaseError(msg) => {
                tracing::error!(error = %msg, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("DATABASE_ERROR", "Database error"),
                )
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::DatabaseError(err.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(e) => AppError::Validation(e.to_string()),
            EngineError::Precondition(msg) => AppError::Precondition(msg),
            EngineError::Transition(e) => AppError::InvalidTransition(e.to_string()),
            EngineError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            EngineError::Conflict(msg) => AppError::Conflict(msg),
            EngineError::Database(e) => e.into(),
        }
    }
}
