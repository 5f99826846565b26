use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Contract invalid: {0}")]
    ContractInvalid(String),

    #[error("Entity does not exist: {0}")]
    EntityDoesNotExist(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

/// Coarse error classification shared by every layer of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ContractInvalid,
    EntityDoesNotExist,
    ServerError,
    DatabaseError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ContractInvalid => "CONTRACT_INVALID",
            ErrorKind::EntityDoesNotExist => "ENTITY_DOES_NOT_EXIST",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::DatabaseError => "DATABASE_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::ContractInvalid => StatusCode::BAD_REQUEST,
            ErrorKind::EntityDoesNotExist => StatusCode::NOT_FOUND,
            ErrorKind::ServerError | ErrorKind::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ContractInvalid(_) | AppError::Serialization(_) => ErrorKind::ContractInvalid,
            AppError::EntityDoesNotExist(_) => ErrorKind::EntityDoesNotExist,
            AppError::ServerError(_) | AppError::Request(_) | AppError::Internal(_) => {
                ErrorKind::ServerError
            }
            AppError::Database(_) => ErrorKind::DatabaseError,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: kind.as_str().to_string(),
                message,
            },
        };

        (kind.status_code(), Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
