use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{QueryId, RequestId, SessionId, TaskId};
use crate::query::View;
use crate::session::SelectionRefs;

/// Request lifecycle. A directed acyclic walk; `Done`, `Error` and
/// `Cancelled` are terminal and accept no further transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RequestStatus {
    New,
    InProgress,
    Intent,
    Sql,
    DataFetch,
    Retry,
    Finalizing,
    Done,
    Error,
    Cancelled,
    Scheduled,
}

impl RequestStatus {
    /// Terminal states are sticky: once reached, no further status write
    /// may change them (last-writer-wins semantics apply only among
    /// non-terminal states).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Done | RequestStatus::Error | RequestStatus::Cancelled
        )
    }
}

/// Which orchestration strategy a request runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FlowType {
    Interactive,
    Simple,
    Multistep,
    DataOnly,
    Flex,
    LangGraph,
    Mcp,
}

/// The model/provider identifier a request is routed to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelType(pub String);

/// The target data source/database a request should query against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbType(pub String);

/// The intent classifier's verdict on what kind of turn this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum InteractiveRequestType {
    LinkedSession,
    InteractiveQuery,
    DataAnalysis,
    GeneralChat,
    Disambiguation,
    /// Not yet classified; used as a placeholder on freshly-spawned
    /// follow-up requests before their own intent step runs.
    Tbd,
    Unknown,
}

/// Output of the `planner` slot's structured LLM call.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct IntentAnalysis {
    pub request_type: InteractiveRequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single request (one user turn) within a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub task_id: TaskId,
    pub sequence_number: u32,
    pub request: String,
    pub request_type: InteractiveRequestType,
    pub flow: FlowType,
    pub model: ModelType,
    pub db: DbType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<SelectionRefs>,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumptions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data_rows: Option<Vec<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<QueryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a client supplies to create a new request.
#[derive(Clone, Debug, Deserialize)]
pub struct AddRequest {
    pub request: String,
    #[serde(default = "default_request_type")]
    pub request_type: InteractiveRequestType,
    pub flow: FlowType,
    pub model: ModelType,
    pub db: DbType,
    #[serde(default)]
    pub refs: Option<SelectionRefs>,
}

fn default_request_type() -> InteractiveRequestType {
    InteractiveRequestType::Tbd
}

/// Body for `POST /session/{session_id}/linked`: creates a child session
/// up front (rather than waiting on `InteractiveFlow`'s own
/// `linked_session` branch) and seeds its first request.
#[derive(Clone, Debug, Deserialize)]
pub struct AddLinkedRequest {
    pub request: String,
    #[serde(default = "default_request_type")]
    pub request_type: InteractiveRequestType,
    pub flow: FlowType,
    pub model: ModelType,
    pub db: DbType,
    #[serde(default)]
    pub refs: Option<SelectionRefs>,
    /// Name for the new child session; defaults to the parent's name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update applied over an existing request. Every field left
/// `None` is preserved as-is by the store.
#[derive(Clone, Debug, Default)]
pub struct UpdateRequestFields {
    pub request_id: RequestId,
    pub status: Option<RequestStatus>,
    pub err: Option<String>,
    pub response: Option<String>,
    pub sql: Option<String>,
    pub intent: Option<String>,
    pub assumptions: Option<String>,
    pub intro: Option<String>,
    pub outro: Option<String>,
    pub raw_data_labels: Option<Vec<String>>,
    pub raw_data_rows: Option<Vec<Vec<Value>>>,
    pub csv: Option<String>,
    pub chart: Option<String>,
    pub chart_url: Option<String>,
    pub query_id: Option<QueryId>,
    pub view: Option<View>,
    pub linked_session_id: Option<SessionId>,
    pub refs: Option<SelectionRefs>,
    pub rating: Option<i32>,
    pub review: Option<String>,
}

impl UpdateRequestFields {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            ..Default::default()
        }
    }
}

/// The narrative/result payload a flow hands back to the worker glue, which
/// flattens it onto the persisted `Request` (see `FlowRunner::run`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StructuredResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumptions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data_rows: Option<Vec<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<crate::query::QueryMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<SelectionRefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_session_id: Option<SessionId>,
}

/// The payload a broker task carries: mirrors `Request` plus resolved
/// context a flow needs but that isn't persisted on the row itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub parent_session_id: Option<SessionId>,
    pub user: String,
    pub request: String,
    pub request_type: InteractiveRequestType,
    pub flow: FlowType,
    pub model: ModelType,
    pub db: DbType,
    pub refs: Option<SelectionRefs>,
    pub status: RequestStatus,
    pub err: Option<String>,
    pub response: Option<String>,
    /// A query seeded via `from_query`/`for_query`, if this request was
    /// spawned that way.
    pub query: Option<crate::query::QueryMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_response: Option<StructuredResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_sticky() {
        assert!(RequestStatus::Done.is_terminal());
        assert!(RequestStatus::Error.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::Retry.is_terminal());
        assert!(!RequestStatus::New.is_terminal());
    }
}
