//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use db::DbError;
use engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid or missing API key")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Db(DbError::NotFound) => StatusCode::NOT_FOUND,
            Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Engine(err) => match err {
                EngineError::UnknownFlow { .. } | EngineError::EventNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                EngineError::UnknownStartNode { .. } => StatusCode::BAD_REQUEST,
                EngineError::DuplicateNode { .. }
                | EngineError::DanglingDependency { .. }
                | EngineError::Cycle { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
            "code": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
