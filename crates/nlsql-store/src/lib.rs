//! Session/Request/Query persistence. `RequestStore` is the trait every
//! flow and HTTP handler depends on; `InMemoryRequestStore` backs the
//! default single-process deployment and the test suite, `PostgresRequestStore`
//! (behind the `postgres` feature) backs a durable deployment.

pub mod error;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod trait_def;

pub use error::{Error, Result};
#[cfg(feature = "memory")]
pub use memory::InMemoryRequestStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRequestStore;
pub use trait_def::{HistoryEntry, NewRequestFields, RequestStore};
