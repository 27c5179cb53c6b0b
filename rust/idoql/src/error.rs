use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, QueryError>;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Construction-time failures of the query layer.
///
/// None of these reach the database: they are raised while columns, joins and
/// predicates are resolved, before a statement exists.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Got invalid column: {0}")]
    InvalidColumn(String),

    #[error("Got invalid custom var: {0}")]
    InvalidCustomVar(String),

    #[error("Cannot join \"{table}\", no such table found for query \"{query}\"")]
    MissingJoin { query: String, table: String },

    #[error("union member \"{member}\" of \"{query}\" selects a different column list")]
    UnionMismatch { query: String, member: String },

    #[error("invalid value \"{value}\" for column \"{column}\"")]
    InvalidValue { column: String, value: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("schema version: {0}")]
    SchemaVersion(String),
}

impl QueryError {
    /// Whether the error was caused by the caller rather than by the query
    /// definitions themselves.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidColumn(_)
                | QueryError::InvalidCustomVar(_)
                | QueryError::InvalidValue { .. }
                | QueryError::InvalidFilter(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed")]
    Auth,

    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Auth => StatusCode::UNAUTHORIZED,
            ServiceError::Query(err) if err.is_caller_error() => StatusCode::BAD_REQUEST,
            ServiceError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
