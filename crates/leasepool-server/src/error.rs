//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use leasepool_node::PoolError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Pool(e) => match e {
                PoolError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                PoolError::CapacityExceeded { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "CAPACITY_EXCEEDED")
                }
                PoolError::AllocationBusy(_) => (StatusCode::SERVICE_UNAVAILABLE, "ALLOCATION_BUSY"),
                PoolError::Closed => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
                PoolError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
                PoolError::AlreadyStarted => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;
