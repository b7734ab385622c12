//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::jobs::{ChainError, DecisionError};
use crate::queue::ScheduleError;
use crate::service::package::ServiceError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::NotFound(_) => ApiError::NotFound(message),
            ServiceError::Validation(_) | ServiceError::Workflow(_) => ApiError::BadRequest(message),
            ServiceError::Chain(ChainError::Workflow(_)) => ApiError::BadRequest(message),
            ServiceError::Schedule(ScheduleError::PackageActive(_)) => ApiError::Conflict(message),
            ServiceError::Schedule(ScheduleError::QueueFull) => ApiError::Unavailable(message),
            ServiceError::Decision(DecisionError::NotFound(_)) => ApiError::NotFound(message),
            ServiceError::Decision(DecisionError::InvalidChoice { .. }) => {
                ApiError::BadRequest(message)
            }
            ServiceError::Decision(DecisionError::NotAwaiting(_)) => ApiError::Conflict(message),
            ServiceError::Chain(_) | ServiceError::Decision(_) | ServiceError::Repository(_) => {
                ApiError::InternalError(message)
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
