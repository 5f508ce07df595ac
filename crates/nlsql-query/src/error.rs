use nlsql_model::QueryId;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no SQL resolvable for query {0}")]
    NoSqlResolved(QueryId),

    #[error("could not parse SQL for ORDER BY rewrite: {0}")]
    Parse(#[from] sqlparser::parser::ParserError),

    #[error("ORDER BY rewrite requires a single SELECT statement, found {0}")]
    UnsupportedStatement(&'static str),

    #[error(transparent)]
    Store(#[from] nlsql_store::Error),

    #[error(transparent)]
    Warehouse(#[from] nlsql_warehouse::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
