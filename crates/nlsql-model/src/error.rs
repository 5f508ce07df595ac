use thiserror::Error;

use crate::ids::{QueryId, RequestId, SessionId};
use crate::request::RequestStatus;

/// Errors raised by the shared model crate: malformed transitions and
/// lookups that every store/flow implementation needs to report the same
/// way.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("request {0} not found")]
    RequestNotFound(RequestId),

    #[error("query {0} not found")]
    QueryNotFound(QueryId),

    #[error("request {request} is in terminal status {status:?} and cannot transition to {attempted:?}")]
    TerminalStatus {
        request: RequestId,
        status: RequestStatus,
        attempted: RequestStatus,
    },

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Crate-local result alias, matching the convention every downstream
/// crate's own `Error` type follows.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(feature = "axum")]
mod axum_support {
    use super::Error;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use serde_json::json;

    impl IntoResponse for Error {
        fn into_response(self) -> Response {
            let status = match &self {
                Error::SessionNotFound(_) | Error::RequestNotFound(_) | Error::QueryNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                Error::TerminalStatus { .. } | Error::InvalidField { .. } => StatusCode::BAD_REQUEST,
                Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let body = Json(json!({ "error": self.to_string() }));
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_message_names_both_states() {
        let err = Error::TerminalStatus {
            request: RequestId::new(),
            status: RequestStatus::Done,
            attempted: RequestStatus::Retry,
        };
        let msg = err.to_string();
        assert!(msg.contains("Done"));
        assert!(msg.contains("Retry"));
    }
}
