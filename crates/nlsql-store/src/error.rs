use nlsql_model::{QueryId, RequestId, SessionId};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("request {0} not found")]
    RequestNotFound(RequestId),

    #[error("no request with sequence number {seq} in session {session}")]
    RequestNotFoundBySeq { session: SessionId, seq: u32 },

    #[error("query {0} not found")]
    QueryNotFound(QueryId),

    #[error("user {user:?} does not own session {session}")]
    Forbidden { user: String, session: SessionId },

    #[error(transparent)]
    Model(#[from] nlsql_model::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Pool(#[from] deadpool_postgres::PoolError),
}

pub type Result<T> = std::result::Result<T, Error>;
