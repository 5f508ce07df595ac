use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use nlsql_model::{
    CreateQueryFields, Query, QueryId, QueryMetadata, Request, RequestId, RequestStatus, Session,
    SessionId, TaskId, UpdateRequestFields,
};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::trait_def::{HistoryEntry, NewRequestFields, RequestStore};

/// In-process store backed by `dashmap`. Per-session sequence allocation
/// goes through a `parking_lot::Mutex<u32>` held for the duration of the
/// allocate-and-insert, which is what makes `add_request` serializable
/// per session without a database round-trip.
#[derive(Default)]
pub struct InMemoryRequestStore {
    sessions: DashMap<SessionId, Session>,
    requests: DashMap<RequestId, Request>,
    request_index: DashMap<(SessionId, u32), RequestId>,
    sequence_counters: DashMap<SessionId, Arc<Mutex<u32>>>,
    queries: DashMap<QueryId, Query>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_counter(&self, session_id: SessionId) -> Arc<Mutex<u32>> {
        self.sequence_counters
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(0)))
            .clone()
    }

    fn check_owner(&self, session: &Session, user: &str) -> Result<()> {
        if session.user_owner != user {
            return Err(Error::Forbidden {
                user: user.to_string(),
                session: session.id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn add_session(
        &self,
        user: &str,
        name: &str,
        tags: Vec<String>,
        parent: Option<SessionId>,
        refs: Option<Value>,
    ) -> Result<Session> {
        let session = Session::new(user, name, tags, parent, refs);
        self.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Session> {
        self.sessions
            .get(&session_id)
            .map(|s| s.clone())
            .ok_or(Error::SessionNotFound(session_id))
    }

    async fn add_request(
        &self,
        _user: &str,
        session_id: SessionId,
        fields: NewRequestFields,
    ) -> Result<(Request, TaskId)> {
        if !self.sessions.contains_key(&session_id) {
            return Err(Error::SessionNotFound(session_id));
        }

        let counter = self.session_counter(session_id);
        let mut guard = counter.lock();
        *guard += 1;
        let sequence_number = *guard;

        let now = Utc::now();
        let task_id = TaskId::new();
        let request = Request {
            request_id: RequestId::new(),
            session_id,
            task_id,
            sequence_number,
            request: fields.request,
            request_type: fields.request_type,
            flow: fields.flow,
            model: fields.model,
            db: fields.db,
            refs: fields.refs,
            status: RequestStatus::New,
            err: None,
            response: None,
            sql: None,
            intent: None,
            assumptions: None,
            intro: None,
            outro: None,
            raw_data_labels: None,
            raw_data_rows: None,
            csv: None,
            chart: None,
            chart_url: None,
            query_id: None,
            view: None,
            linked_session_id: None,
            rating: None,
            review: None,
            created_at: now,
            updated_at: now,
        };

        self.requests.insert(request.request_id, request.clone());
        self.request_index
            .insert((session_id, sequence_number), request.request_id);

        // Drop the lock only after both maps are consistent, so a
        // concurrent reader never observes a sequence number whose
        // request isn't yet visible.
        drop(guard);

        Ok((request, task_id))
    }

    async fn get_request(&self, _user: &str, session_id: SessionId, seq: u32) -> Result<Request> {
        let request_id = self
            .request_index
            .get(&(session_id, seq))
            .map(|r| *r)
            .ok_or(Error::RequestNotFoundBySeq { session: session_id, seq })?;
        self.get_request_by_id(request_id).await
    }

    async fn get_request_by_id(&self, request_id: RequestId) -> Result<Request> {
        self.requests
            .get(&request_id)
            .map(|r| r.clone())
            .ok_or(Error::RequestNotFound(request_id))
    }

    async fn update_status(
        &self,
        request_id: RequestId,
        status: RequestStatus,
        err: Option<String>,
    ) -> Result<Request> {
        let mut entry = self
            .requests
            .get_mut(&request_id)
            .ok_or(Error::RequestNotFound(request_id))?;
        if entry.status.is_terminal() {
            return Ok(entry.clone());
        }
        entry.status = status;
        if err.is_some() {
            entry.err = err;
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn update_request(&self, fields: UpdateRequestFields) -> Result<Request> {
        let mut entry = self
            .requests
            .get_mut(&fields.request_id)
            .ok_or(Error::RequestNotFound(fields.request_id))?;

        if let Some(status) = fields.status {
            if !entry.status.is_terminal() {
                entry.status = status;
            }
        }
        macro_rules! set_if_some {
            ($field:ident) => {
                if let Some(value) = fields.$field {
                    entry.$field = Some(value);
                }
            };
        }
        set_if_some!(err);
        set_if_some!(response);
        set_if_some!(sql);
        set_if_some!(intent);
        set_if_some!(assumptions);
        set_if_some!(intro);
        set_if_some!(outro);
        set_if_some!(raw_data_labels);
        set_if_some!(raw_data_rows);
        set_if_some!(csv);
        set_if_some!(chart);
        set_if_some!(chart_url);
        set_if_some!(query_id);
        set_if_some!(view);
        set_if_some!(linked_session_id);
        set_if_some!(refs);
        set_if_some!(rating);
        set_if_some!(review);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn delete_request_revert(&self, request_id: RequestId, user: &str) -> Result<SessionId> {
        let target = self
            .requests
            .get(&request_id)
            .map(|r| r.clone())
            .ok_or(Error::RequestNotFound(request_id))?;

        let session = self.get_session(target.session_id).await?;
        self.check_owner(&session, user)?;

        let to_remove: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|r| {
                r.session_id == target.session_id && r.sequence_number >= target.sequence_number
            })
            .map(|r| r.request_id)
            .collect();

        for id in to_remove {
            if let Some((_, removed)) = self.requests.remove(&id) {
                self.request_index
                    .remove(&(removed.session_id, removed.sequence_number));
            }
        }

        Ok(target.session_id)
    }

    async fn update_query_metadata(
        &self,
        session_id: SessionId,
        user: &str,
        metadata: QueryMetadata,
    ) -> Result<Session> {
        let mut entry = self
            .sessions
            .get_mut(&session_id)
            .ok_or(Error::SessionNotFound(session_id))?;
        self.check_owner(&entry, user)?;
        entry.metadata = Some(metadata);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn update_session_name(
        &self,
        session_id: SessionId,
        user: &str,
        name: String,
    ) -> Result<Session> {
        let mut entry = self
            .sessions
            .get_mut(&session_id)
            .ok_or(Error::SessionNotFound(session_id))?;
        self.check_owner(&entry, user)?;
        entry.name = name;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn create_query(&self, fields: CreateQueryFields) -> Result<Query> {
        let query = Query {
            query_id: QueryId::new(),
            request: fields.request,
            intent: fields.intent,
            summary: fields.summary,
            description: fields.description,
            sql: fields.sql,
            row_count: fields.row_count,
            columns: fields.columns,
            ai_generated: fields.ai_generated,
            ai_context: fields.ai_context,
            data_source: fields.data_source,
            db_dialect: fields.db_dialect,
            explanation: fields.explanation,
            err: fields.err,
            parent_id: fields.parent_id,
        };
        self.queries.insert(query.query_id, query.clone());
        Ok(query)
    }

    async fn get_query_by_id(&self, query_id: QueryId) -> Result<Query> {
        self.queries
            .get(&query_id)
            .map(|q| q.clone())
            .ok_or(Error::QueryNotFound(query_id))
    }

    async fn get_history(
        &self,
        session_id: SessionId,
        include_responses: bool,
    ) -> Result<Vec<HistoryEntry>> {
        let mut requests: Vec<Request> = self
            .requests
            .iter()
            .filter(|r| r.session_id == session_id)
            .map(|r| r.clone())
            .collect();
        requests.sort_by_key(|r| r.sequence_number);

        let mut history = Vec::with_capacity(requests.len() * 2);
        for request in requests {
            history.push(HistoryEntry {
                role: "user",
                content: request.request,
            });
            if include_responses {
                if let Some(response) = request.response {
                    history.push(HistoryEntry {
                        role: "assistant",
                        content: response,
                    });
                }
            }
        }
        Ok(history)
    }

    async fn list_sessions(&self, user: &str) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.user_owner == user)
            .map(|s| s.clone())
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.updated_at));
        Ok(sessions)
    }

    async fn list_requests(&self, session_id: SessionId) -> Result<Vec<Request>> {
        let mut requests: Vec<Request> = self
            .requests
            .iter()
            .filter(|r| r.session_id == session_id)
            .map(|r| r.clone())
            .collect();
        requests.sort_by_key(|r| r.sequence_number);
        Ok(requests)
    }

    async fn list_all_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self.sessions.iter().map(|s| s.clone()).collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.updated_at));
        Ok(sessions)
    }

    async fn list_all_requests(&self) -> Result<Vec<Request>> {
        let mut requests: Vec<Request> = self.requests.iter().map(|r| r.clone()).collect();
        requests.sort_by_key(|r| std::cmp::Reverse(r.updated_at));
        Ok(requests)
    }

    async fn list_queries(&self, limit: u32, offset: u32) -> Result<(Vec<Query>, u64)> {
        let mut queries: Vec<Query> = self.queries.iter().map(|q| q.clone()).collect();
        queries.sort_by_key(|q| q.query_id.as_uuid());
        let total = queries.len() as u64;
        let page = queries
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlsql_model::{DbType, FlowType, InteractiveRequestType, ModelType};

    fn fields(text: &str) -> NewRequestFields {
        NewRequestFields {
            request: text.to_string(),
            request_type: InteractiveRequestType::Tbd,
            flow: FlowType::Interactive,
            model: ModelType("gpt".to_string()),
            db: DbType("warehouse".to_string()),
            refs: None,
        }
    }

    #[tokio::test]
    async fn sequence_numbers_are_dense_and_gapless_under_concurrency() {
        let store = Arc::new(InMemoryRequestStore::new());
        let session = store
            .add_session("alice", "thread", vec![], None, None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..5 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .add_request("alice", session.id, fields(&format!("q{i}")))
                    .await
                    .unwrap()
            }));
        }

        let mut seqs: Vec<u32> = Vec::new();
        for handle in handles {
            let (request, _task_id) = handle.await.unwrap();
            seqs.push(request.sequence_number);
        }
        seqs.sort_unstable();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn terminal_status_is_sticky() {
        let store = InMemoryRequestStore::new();
        let session = store
            .add_session("alice", "thread", vec![], None, None)
            .await
            .unwrap();
        let (request, _) = store
            .add_request("alice", session.id, fields("hi"))
            .await
            .unwrap();

        store
            .update_status(request.request_id, RequestStatus::Done, None)
            .await
            .unwrap();
        let after = store
            .update_status(request.request_id, RequestStatus::Retry, None)
            .await
            .unwrap();
        assert_eq!(after.status, RequestStatus::Done);
    }

    #[tokio::test]
    async fn delete_request_revert_removes_tail() {
        let store = InMemoryRequestStore::new();
        let session = store
            .add_session("alice", "thread", vec![], None, None)
            .await
            .unwrap();
        let (r1, _) = store.add_request("alice", session.id, fields("a")).await.unwrap();
        let (r2, _) = store.add_request("alice", session.id, fields("b")).await.unwrap();
        let (r3, _) = store.add_request("alice", session.id, fields("c")).await.unwrap();

        store
            .delete_request_revert(r2.request_id, "alice")
            .await
            .unwrap();

        assert!(store.get_request_by_id(r1.request_id).await.is_ok());
        assert!(store.get_request_by_id(r2.request_id).await.is_err());
        assert!(store.get_request_by_id(r3.request_id).await.is_err());
    }

    #[tokio::test]
    async fn get_history_filters_responses_when_requested() {
        let store = InMemoryRequestStore::new();
        let session = store
            .add_session("alice", "thread", vec![], None, None)
            .await
            .unwrap();
        let (request, _) = store.add_request("alice", session.id, fields("hi")).await.unwrap();
        store
            .update_request(UpdateRequestFields {
                response: Some("hello back".to_string()),
                ..UpdateRequestFields::new(request.request_id)
            })
            .await
            .unwrap();

        let with_responses = store.get_history(session.id, true).await.unwrap();
        assert_eq!(with_responses.len(), 2);

        let without_responses = store.get_history(session.id, false).await.unwrap();
        assert_eq!(without_responses.len(), 1);
        assert_eq!(without_responses[0].role, "user");
    }
}
