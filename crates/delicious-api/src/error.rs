use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", .0.join(" "))]
    Validation(Vec<String>),

    #[error("You need to be logged in!")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Storage is temporarily unavailable")]
    Unavailable,

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::Validation(vec![message.into()])
    }
}

impl From<delicious_core::Error> for ApiError {
    fn from(err: delicious_core::Error) -> Self {
        use delicious_core::Error;

        match err {
            Error::StorageUnavailable(msg) => {
                error!("Storage unavailable: {}", msg);
                ApiError::Unavailable
            }
            Error::DuplicateKey(msg) => {
                warn!("Duplicate key: {}", msg);
                ApiError::Conflict("That value is already taken".to_string())
            }
            Error::NotFound => ApiError::NotFound("Not found"),
            Error::InvalidName(name) => {
                ApiError::invalid(format!("{:?} is not a usable store name", name))
            }
            Error::InvalidRating(r) => ApiError::invalid(format!("Rating {} must be between 1 and 5", r)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            ApiError::Validation(errors) => json!({ "error": self.to_string(), "errors": errors }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
