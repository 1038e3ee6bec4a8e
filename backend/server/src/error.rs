use std::fmt;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use catalog::ValidationError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collaborator {
    Database,
    Storage,
    Auth,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Collaborator::Database => "database",
            Collaborator::Storage => "storage",
            Collaborator::Auth => "auth",
        })
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Apk {0} not found")]
    NotFound(u64),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Admin role required")]
    Unauthorized,

    #[error("{0} timed out")]
    Timeout(Collaborator),

    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: Collaborator,
        message: String,
    },
}

impl AppError {
    pub fn unavailable(collaborator: Collaborator, source: impl fmt::Display) -> Self {
        AppError::Unavailable {
            collaborator,
            message: source.to_string(),
        }
    }

    /// Transport failure of an HTTP collaborator. A request that ran out of time stays a
    /// timeout, whichever deadline fired first.
    pub fn http(collaborator: Collaborator, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(collaborator)
        } else {
            AppError::unavailable(collaborator, e)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NotFound",
            AppError::Validation(_) | AppError::MalformedPayload(_) => "ValidationError",
            AppError::Unauthorized => "Unauthorized",
            AppError::Timeout(_) => "Timeout",
            AppError::Unavailable { .. } => "CollaboratorUnavailable",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownCategory(id) => ValidationError::UnknownCategory(id).into(),
            e => AppError::unavailable(Collaborator::Database, e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::MalformedPayload(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::MalformedPayload(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::MalformedPayload(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };

        if status.is_server_error() {
            error!("{self}");
        } else {
            warn!("{self}");
        }

        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
