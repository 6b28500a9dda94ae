// crates/server/src/error.rs
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use corpadm_core::{ConfError, QueryError};
use corpadm_db::DbError;
use serde::Serialize;
use thiserror::Error;

use crate::jobs::JobsError;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Corpus not found: {0}")]
    CorpusNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Job error: {0}")]
    Jobs(#[from] JobsError),

    #[error("Extraction configuration error: {0}")]
    Conf(#[from] ConfError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unprocessable request: {0}")]
    Unprocessable(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                )
            }
            ApiError::CorpusNotFound(id) => {
                tracing::warn!(corpus_id = %id, "Corpus not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Corpus not found", format!("Corpus ID: {}", id)),
                )
            }
            ApiError::NotFound(msg) => {
                tracing::warn!(message = %msg, "Not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Not found", msg.clone()),
                )
            }
            ApiError::Database(db_err) => match db_err {
                DbError::EmptyResult => (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::new("No data found"),
                ),
                DbError::InvalidIdentifier(name) => {
                    tracing::warn!(name = %name, "Invalid identifier");
                    (
                        StatusCode::BAD_REQUEST,
                        ErrorResponse::with_details("Invalid identifier", name.clone()),
                    )
                }
                _ => {
                    tracing::error!(error = %db_err, "Database error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::with_details("Database error", db_err.to_string()),
                    )
                }
            },
            ApiError::Jobs(job_err) => {
                let (status, error_msg) = match job_err {
                    JobsError::AlreadyRunning { .. } => (StatusCode::CONFLICT, "Job already running"),
                    JobsError::StillRunning(_) => (StatusCode::CONFLICT, "Job still running"),
                    JobsError::RestartLimit { .. } => (StatusCode::CONFLICT, "Restart limit reached"),
                    JobsError::IdAllocation => (StatusCode::UNAUTHORIZED, "Cannot allocate job id"),
                    JobsError::Extraction(_) => {
                        tracing::error!(error = %job_err, "Extraction failed to start");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Extraction failed to start")
                    }
                    JobsError::Persist { .. } | JobsError::Encode(_) => {
                        tracing::error!(error = %job_err, "Job status error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Job status error")
                    }
                };
                (
                    status,
                    ErrorResponse::with_details(error_msg, job_err.to_string()),
                )
            }
            ApiError::Conf(conf_err) => {
                let (status, error_msg) = match conf_err {
                    ConfError::NotFound { .. } => (StatusCode::NOT_FOUND, "Extraction configuration not found"),
                    ConfError::AtomNotInferable
                    | ConfError::UnknownAtom { .. }
                    | ConfError::InvalidMergeAttr(_) => {
                        (StatusCode::BAD_REQUEST, "Invalid extraction configuration request")
                    }
                    ConfError::Io { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "IO error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "IO error accessing extraction configuration")
                    }
                    ConfError::Malformed { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "Malformed JSON");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Malformed extraction configuration")
                    }
                };
                (
                    status,
                    ErrorResponse::with_details(error_msg, conf_err.to_string()),
                )
            }
            ApiError::Query(query_err) => {
                tracing::warn!(error = %query_err, "Invalid query");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid query", query_err.to_string()),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Unprocessable(msg) => {
                tracing::warn!(message = %msg, "Unprocessable request");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorResponse::with_details("Unprocessable request", msg.clone()),
                )
            }
            ApiError::NotImplemented(what) => (
                StatusCode::NOT_IMPLEMENTED,
                ErrorResponse::with_details("Not implemented", what.clone()),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Malformed JSON is a bad request; well-formed JSON of the wrong shape
/// is unprocessable.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => ApiError::Unprocessable(e.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
