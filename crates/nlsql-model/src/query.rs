use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{QueryId, SessionId};

/// A single output column's shape, as reported by the warehouse or inferred
/// by the LLM.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

/// The structured description of a query: SQL plus the narrative fields a
/// flow produces alongside it. Persisted both as a first-class `Query` row
/// and, most recently, on the owning `Session`. Also the schema
/// `interactive_query`'s structured LLM call is constrained to, so the
/// retry loop in `InteractiveFlow` can tell "gave SQL" from "gave a direct
/// result" from "gave neither" by which optional fields came back set.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct QueryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QueryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Value>,
    #[serde(default)]
    pub parents: Vec<SessionId>,
}

/// An immutable, first-class record of one executed (or attempted) SQL
/// query, created the first time a request successfully produces SQL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Query {
    pub query_id: QueryId,
    pub request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
    pub ai_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_context: Option<String>,
    pub data_source: String,
    pub db_dialect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<QueryId>,
}

/// Fields supplied by a flow when creating a `Query`; the id and any
/// immutability is the store's responsibility.
#[derive(Clone, Debug, Default)]
pub struct CreateQueryFields {
    pub request: String,
    pub intent: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub sql: String,
    pub row_count: Option<i64>,
    pub columns: Vec<ColumnDescriptor>,
    pub ai_generated: bool,
    pub ai_context: Option<String>,
    pub data_source: String,
    pub db_dialect: String,
    pub explanation: Option<Value>,
    pub err: Option<String>,
    pub parent_id: Option<QueryId>,
}

/// A stored sort transform applied to a request's or session's SQL by
/// `QueryService` when paging.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct View {
    pub sort_by: String,
    pub sort_order: SortOrder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}
