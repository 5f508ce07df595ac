use async_trait::async_trait;
use nlsql_model::{
    CreateQueryFields, Query, QueryId, QueryMetadata, Request, RequestId, RequestStatus, Session,
    SessionId, TaskId, UpdateRequestFields,
};
use serde_json::Value;

use crate::error::Result;

/// One turn of chat-style history, as consumed by an LLM's message list.
#[derive(Clone, Debug, serde::Serialize)]
pub struct HistoryEntry {
    pub role: &'static str,
    pub content: String,
}

/// Fields a caller supplies to start a new request; store allocates the
/// sequence number, task id, and initial `New` status.
#[derive(Clone, Debug)]
pub struct NewRequestFields {
    pub request: String,
    pub request_type: nlsql_model::InteractiveRequestType,
    pub flow: nlsql_model::FlowType,
    pub model: nlsql_model::ModelType,
    pub db: nlsql_model::DbType,
    pub refs: Option<nlsql_model::SelectionRefs>,
}

/// Persistence contract for sessions, requests and queries. `add_request`
/// is the one operation that must be serializable per `session_id`; every
/// other method can run under weaker isolation since it targets a single
/// row by primary key.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn add_session(
        &self,
        user: &str,
        name: &str,
        tags: Vec<String>,
        parent: Option<SessionId>,
        refs: Option<Value>,
    ) -> Result<Session>;

    async fn get_session(&self, session_id: SessionId) -> Result<Session>;

    async fn add_request(
        &self,
        user: &str,
        session_id: SessionId,
        fields: NewRequestFields,
    ) -> Result<(Request, TaskId)>;

    async fn get_request(&self, user: &str, session_id: SessionId, seq: u32) -> Result<Request>;

    async fn get_request_by_id(&self, request_id: RequestId) -> Result<Request>;

    async fn update_status(
        &self,
        request_id: RequestId,
        status: RequestStatus,
        err: Option<String>,
    ) -> Result<Request>;

    async fn update_request(&self, fields: UpdateRequestFields) -> Result<Request>;

    /// Deletes `request_id` and every request with a higher sequence
    /// number in the same session; returns the owning session id.
    async fn delete_request_revert(&self, request_id: RequestId, user: &str) -> Result<SessionId>;

    async fn update_query_metadata(
        &self,
        session_id: SessionId,
        user: &str,
        metadata: QueryMetadata,
    ) -> Result<Session>;

    async fn update_session_name(
        &self,
        session_id: SessionId,
        user: &str,
        name: String,
    ) -> Result<Session>;

    async fn create_query(&self, fields: CreateQueryFields) -> Result<Query>;

    async fn get_query_by_id(&self, query_id: QueryId) -> Result<Query>;

    async fn get_history(&self, session_id: SessionId, include_responses: bool) -> Result<Vec<HistoryEntry>>;

    /// Sessions owned by `user`, most recently updated first.
    async fn list_sessions(&self, user: &str) -> Result<Vec<Session>>;

    /// Every request in `session_id`, in sequence order.
    async fn list_requests(&self, session_id: SessionId) -> Result<Vec<Request>>;

    /// Admin listing across every user's sessions.
    async fn list_all_sessions(&self) -> Result<Vec<Session>>;

    /// Admin listing across every session's requests.
    async fn list_all_requests(&self) -> Result<Vec<Request>>;

    /// Page through every query (stable id order) alongside the total
    /// count for pagination metadata.
    async fn list_queries(&self, limit: u32, offset: u32) -> Result<(Vec<Query>, u64)>;
}
