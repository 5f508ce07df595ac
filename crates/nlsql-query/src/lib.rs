//! The paginated `/data/{id}` path: resolves SQL from whichever entity a
//! caller's id actually names, rewrites its `ORDER BY` clause when a sort
//! is requested or remembered, executes against the warehouse, and
//! computes the caching metadata the HTTP layer serializes into headers.

pub mod error;
mod resolve;
mod rewrite;
mod service;

pub use error::{Error, Result};
pub use resolve::{resolve_sql, ResolvedSql, SqlSource};
pub use rewrite::replace_order_by;
pub use service::{PagedData, QueryService, CACHE_CONTROL, VARY};
