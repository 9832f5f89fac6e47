//! API error types and HTTP response conversion (§6 "Wire protocol",
//! §7 "Taxonomy").
//!
//! Every failure response on the wire takes the shape
//! `{ "success": false, "error": "<message>" }` regardless of status
//! code; the status code itself follows the same error-class mapping
//! the teacher's `ApiError::status_code` used for its own domain errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::compiler::{CompileError, ValidationError};
use crate::executor::ExecutionError;
use crate::registry::RegistryError;
use crate::store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Compile(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Execution(e) => execution_status(e),
            ApiError::Registry(e) => registry_status(e),
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::SchemaVersionUnsupported(_)) => StatusCode::CONFLICT,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn registry_status(e: &RegistryError) -> StatusCode {
    match e {
        RegistryError::RouteNotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::RouteAlreadyDeployed(_) => StatusCode::CONFLICT,
        RegistryError::RouteNotDeployed(_) => StatusCode::CONFLICT,
        RegistryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RegistryError::Compile(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RegistryError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        RegistryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RegistryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RegistryError::Execution(e) => execution_status(e),
    }
}

/// `InsufficientBalance`/`AccountNotActive`/`AccountNotFound` are business-
/// rule rejections a caller can act on, not upstream/transport failures —
/// mapped to 409/404 rather than the generic 502 other execution failures get.
fn execution_status(e: &ExecutionError) -> StatusCode {
    use crate::saga::SagaError;
    match e {
        ExecutionError::RouteNotFound(_) => StatusCode::NOT_FOUND,
        ExecutionError::Saga(SagaError::InsufficientBalance { .. }) => StatusCode::CONFLICT,
        ExecutionError::Saga(SagaError::AccountNotActive(_)) => StatusCode::CONFLICT,
        ExecutionError::Saga(SagaError::AccountNotFound(_)) => StatusCode::NOT_FOUND,
        ExecutionError::Saga(_) => StatusCode::BAD_GATEWAY,
        ExecutionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ExecutionError::Transport(_) | ExecutionError::UnresolvableEndpoint(_) => StatusCode::BAD_GATEWAY,
        ExecutionError::Uncaught(_) | ExecutionError::Node { .. } => StatusCode::BAD_GATEWAY,
    }
}

#[derive(Debug, Serialize)]
struct Failure {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Failure { success: false, error: self.to_string() };
        tracing::warn!(status = %status, error = %body.error, "request failed");
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_not_found_maps_to_404() {
        let err = ApiError::Registry(RegistryError::RouteNotFound("t1::r1".to_string()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_error_maps_to_422() {
        let err = ApiError::Validation(ValidationError::MissingFrom);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn bad_request_maps_to_400() {
        let err = ApiError::BadRequest("malformed json".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
