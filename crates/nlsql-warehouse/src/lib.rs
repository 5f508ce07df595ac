//! ClickHouse warehouse access: cost preflight via `EXPLAIN ESTIMATE`,
//! row counting, paginated execution with an injected window-function
//! total, and a CSV export path that short-circuits past a row-count
//! threshold rather than materializing an unbounded result.

pub mod error;
mod warehouse;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use error::{Error, Result};
pub use warehouse::ClickHouseWarehouse;

/// `EXPLAIN ESTIMATE`'s first row, which the interactive flow inspects
/// for `rows`/`parts`/`marks` thresholds (observed, not currently acted
/// upon — see the flow crate's preflight handling).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Explanation {
    pub rows: u64,
    pub parts: u64,
    pub marks: u64,
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

#[derive(Clone, Debug)]
pub struct ExecuteResult {
    pub rows: Vec<Map<String, Value>>,
    pub total_count: u64,
}

#[derive(Clone, Debug)]
pub struct CsvResult {
    pub csv: Option<String>,
    pub row_count: u64,
    pub rows: Option<Vec<Map<String, Value>>>,
}

/// Row-count threshold above which `execute_csv` short-circuits instead
/// of materializing the full result.
pub const CSV_ROW_LIMIT: u64 = 1000;

#[async_trait]
pub trait WarehouseClient: Send + Sync {
    async fn preflight(&self, sql: &str) -> Result<Explanation>;

    async fn count(&self, sql: &str) -> Result<u64>;

    async fn execute(&self, sql: &str, limit: u32, offset: u32) -> Result<ExecuteResult>;

    async fn execute_csv(&self, sql: &str) -> Result<CsvResult>;
}
