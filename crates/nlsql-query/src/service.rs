use nlsql_model::{QueryMetadata, SortOrder, UpdateRequestFields, View};
use nlsql_store::RequestStore;
use nlsql_warehouse::WarehouseClient;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::resolve::{resolve_sql, SqlSource};
use crate::rewrite::replace_order_by;

pub const CACHE_CONTROL: &str = "public, max-age=0, s-maxage=600, stale-while-revalidate=1200";
pub const VARY: &str = "Authorization, Accept, Accept-Encoding";

pub struct PagedData {
    pub rows: Vec<Map<String, Value>>,
    pub total_count: u64,
    pub limit: u32,
    pub offset: u32,
    pub etag: String,
}

/// Ties SQL resolution, the `ORDER BY` rewrite and `WarehouseClient::execute`
/// together behind the paginated `/data/{id}` endpoint.
pub struct QueryService {
    store: Arc<dyn RequestStore>,
    warehouse: Arc<dyn WarehouseClient>,
}

impl QueryService {
    pub fn new(store: Arc<dyn RequestStore>, warehouse: Arc<dyn WarehouseClient>) -> Self {
        Self { store, warehouse }
    }

    /// Resolves `id` to SQL, applies any requested (or previously stored)
    /// sort, executes against the warehouse, and persists the sort as a
    /// `View` on whichever entity the SQL came from so a follow-up request
    /// without sort params replays the same order.
    pub async fn get_data(
        &self,
        user: &str,
        id: Uuid,
        limit: u32,
        offset: u32,
        sort_by: Option<String>,
        sort_order: Option<SortOrder>,
    ) -> Result<PagedData> {
        let resolved = resolve_sql(self.store.as_ref(), id).await?;

        let (sql, view_to_persist) = match (&sort_by, &resolved.view) {
            (Some(sort_by), _) => {
                let sort_order = sort_order.unwrap_or(SortOrder::Asc);
                let sql = replace_order_by(&resolved.sql, sort_by, sort_order)?;
                (
                    sql,
                    Some(View {
                        sort_by: sort_by.clone(),
                        sort_order,
                    }),
                )
            }
            (None, Some(view)) => {
                let sql = replace_order_by(&resolved.sql, &view.sort_by, view.sort_order)?;
                (sql, None)
            }
            (None, None) => (resolved.sql.clone(), None),
        };

        if let Some(view) = view_to_persist {
            self.persist_view(user, &resolved.source, &sql, view).await?;
        }

        let result = self.warehouse.execute(&sql, limit, offset).await?;
        let etag = compute_etag(id, limit, offset, result.total_count, &result.rows);

        Ok(PagedData {
            rows: result.rows,
            total_count: result.total_count,
            limit,
            offset,
            etag,
        })
    }

    async fn persist_view(
        &self,
        user: &str,
        source: &SqlSource,
        sql: &str,
        view: View,
    ) -> Result<()> {
        match *source {
            SqlSource::Request(request_id) => {
                let mut fields = UpdateRequestFields::new(request_id);
                fields.sql = Some(sql.to_string());
                fields.view = Some(view);
                self.store.update_request(fields).await?;
            }
            SqlSource::Session(session_id) => {
                let session = self.store.get_session(session_id).await?;
                let mut metadata = session.metadata.unwrap_or_default();
                metadata.sql = Some(sql.to_string());
                self.store
                    .update_query_metadata(session_id, user, metadata)
                    .await?;
            }
            // `Query` rows are immutable once created; no view to persist.
            SqlSource::Query(_) => {}
        }
        Ok(())
    }
}

/// Weak ETag over the page identity and the shape of its edges, per the
/// caching contract: two pages with identical bounds and identical first
/// and last rows are treated as the same representation.
fn compute_etag(id: Uuid, limit: u32, offset: u32, total_count: u64, rows: &[Map<String, Value>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(limit.to_le_bytes());
    hasher.update(offset.to_le_bytes());
    hasher.update(total_count.to_le_bytes());
    if let Some(first) = rows.first() {
        hasher.update(serde_json::to_vec(first).unwrap_or_default());
    }
    if let Some(last) = rows.last() {
        hasher.update(serde_json::to_vec(last).unwrap_or_default());
    }
    format!("W/\"{}\"", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn etag_changes_when_edge_rows_differ() {
        let id = Uuid::new_v4();
        let rows_a = vec![row(&[("a", json!(1))]), row(&[("a", json!(2))])];
        let rows_b = vec![row(&[("a", json!(1))]), row(&[("a", json!(3))])];
        let etag_a = compute_etag(id, 50, 0, 2, &rows_a);
        let etag_b = compute_etag(id, 50, 0, 2, &rows_b);
        assert_ne!(etag_a, etag_b);
    }

    #[test]
    fn etag_is_stable_for_identical_pages() {
        let id = Uuid::new_v4();
        let rows = vec![row(&[("a", json!(1))])];
        let etag_a = compute_etag(id, 50, 0, 1, &rows);
        let etag_b = compute_etag(id, 50, 0, 1, &rows);
        assert_eq!(etag_a, etag_b);
    }
}
