use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Carries the warehouse's raw error text; `DB::Exception` framing and
    /// all. Flows that want the short human-readable slice out of a
    /// ClickHouse stack trace do their own extraction — the warehouse
    /// layer doesn't interpret provider error text, only forwards it.
    #[error("warehouse rejected query: {0}")]
    QueryRejected(String),

    #[error("malformed result row: {0}")]
    MalformedRow(String),

    #[error(transparent)]
    Client(#[from] clickhouse::error::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
