//! Unifies every collaborator's error type into one `IntoResponse` for
//! route handlers, mirroring `nlsql_model::Error`'s own `axum_support`
//! module but at the HTTP-surface level where store, query and broker
//! errors all need to land on the same JSON envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] nlsql_store::Error),

    #[error(transparent)]
    Query(#[from] nlsql_query::Error),

    #[error(transparent)]
    Broker(#[from] nlsql_broker::Error),

    #[error(transparent)]
    Warehouse(#[from] nlsql_warehouse::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("chart {0} not found")]
    ChartNotFound(String),

    #[error("chart rendering failed: {0}")]
    ChartRenderFailed(String),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Auth(err) = self {
            return err.into_response();
        }

        let status = match &self {
            ApiError::Store(err) => store_status(err),
            ApiError::Query(nlsql_query::Error::NoSqlResolved(_)) => StatusCode::NOT_FOUND,
            ApiError::Query(nlsql_query::Error::Store(err)) => store_status(err),
            ApiError::Query(_) => StatusCode::BAD_REQUEST,
            ApiError::Broker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Warehouse(_) => StatusCode::BAD_GATEWAY,
            ApiError::Auth(_) => unreachable!("handled above"),
            ApiError::ChartNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ChartRenderFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn store_status(err: &nlsql_store::Error) -> StatusCode {
    match err {
        nlsql_store::Error::SessionNotFound(_)
        | nlsql_store::Error::RequestNotFound(_)
        | nlsql_store::Error::RequestNotFoundBySeq { .. }
        | nlsql_store::Error::QueryNotFound(_) => StatusCode::NOT_FOUND,
        nlsql_store::Error::Forbidden { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
