//! Postgres-backed `RequestStore`. Schema is created idempotently on
//! connect, following the same `CREATE TABLE IF NOT EXISTS` pattern used
//! by the checkpointer store this crate's sibling workspace member was
//! grounded on. Sequence allocation takes a row lock on a per-session
//! counter row inside a transaction (`SELECT ... FOR UPDATE`) to get the
//! same serializability guarantee the in-memory store gets from a mutex.

use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::Pool;
use nlsql_model::{
    CreateQueryFields, Query, QueryId, QueryMetadata, Request, RequestId, RequestStatus, Session,
    SessionId, TaskId, UpdateRequestFields,
};
use serde_json::Value;
use tokio_postgres::types::Json;

use crate::error::{Error, Result};
use crate::trait_def::{HistoryEntry, NewRequestFields, RequestStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nlsql_sessions (
    id UUID PRIMARY KEY,
    user_owner TEXT NOT NULL,
    name TEXT NOT NULL,
    tags JSONB NOT NULL,
    parent UUID,
    refs JSONB,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS nlsql_session_sequences (
    session_id UUID PRIMARY KEY REFERENCES nlsql_sessions(id),
    next_sequence INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS nlsql_requests (
    request_id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES nlsql_sessions(id),
    task_id UUID NOT NULL,
    sequence_number INTEGER NOT NULL,
    payload JSONB NOT NULL,
    UNIQUE (session_id, sequence_number)
);

CREATE TABLE IF NOT EXISTS nlsql_queries (
    query_id UUID PRIMARY KEY,
    payload JSONB NOT NULL
);
"#;

/// Postgres-backed store. Row payloads are stored as JSONB for the bulk
/// of each entity's fields; indexed columns exist only where the store
/// itself needs to filter or order (`session_id`, `sequence_number`).
pub struct PostgresRequestStore {
    pool: Pool,
}

impl PostgresRequestStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn initialize_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        Ok(())
    }

    async fn load_session_row(
        client: &deadpool_postgres::Client,
        session_id: SessionId,
    ) -> Result<Session> {
        let row = client
            .query_opt(
                "SELECT user_owner, name, tags, parent, refs, metadata, created_at, updated_at \
                 FROM nlsql_sessions WHERE id = $1",
                &[&session_id.as_uuid()],
            )
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;

        let tags: Value = row.get(2);
        let parent: Option<uuid::Uuid> = row.get(3);
        let metadata: Option<Value> = row.get(5);

        Ok(Session {
            id: session_id,
            user_owner: row.get(0),
            name: row.get(1),
            tags: serde_json::from_value(tags).unwrap_or_default(),
            parent: parent.map(SessionId::from_uuid),
            refs: row.get(4),
            metadata: metadata.and_then(|v| serde_json::from_value(v).ok()),
            created_at: row.get(6),
            updated_at: row.get(7),
        })
    }

    async fn load_request_row(
        client: &deadpool_postgres::Client,
        request_id: RequestId,
    ) -> Result<Request> {
        let row = client
            .query_opt(
                "SELECT payload FROM nlsql_requests WHERE request_id = $1",
                &[&request_id.as_uuid()],
            )
            .await?
            .ok_or(Error::RequestNotFound(request_id))?;
        let payload: Value = row.get(0);
        serde_json::from_value(payload).map_err(nlsql_model::Error::from).map_err(Error::from)
    }
}

#[async_trait]
impl RequestStore for PostgresRequestStore {
    async fn add_session(
        &self,
        user: &str,
        name: &str,
        tags: Vec<String>,
        parent: Option<SessionId>,
        refs: Option<Value>,
    ) -> Result<Session> {
        let session = Session::new(user, name, tags, parent, refs);
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO nlsql_sessions \
                 (id, user_owner, name, tags, parent, refs, metadata, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &session.id.as_uuid(),
                    &session.user_owner,
                    &session.name,
                    &Json(&session.tags),
                    &session.parent.map(|p| p.as_uuid()),
                    &session.refs,
                    &Option::<Value>::None,
                    &session.created_at,
                    &session.updated_at,
                ],
            )
            .await?;
        client
            .execute(
                "INSERT INTO nlsql_session_sequences (session_id, next_sequence) VALUES ($1, 1)",
                &[&session.id.as_uuid()],
            )
            .await?;
        Ok(session)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Session> {
        let client = self.pool.get().await?;
        Self::load_session_row(&client, session_id).await
    }

    async fn add_request(
        &self,
        _user: &str,
        session_id: SessionId,
        fields: NewRequestFields,
    ) -> Result<(Request, TaskId)> {
        let mut client = self.pool.get().await?;
        let txn = client.transaction().await?;

        let row = txn
            .query_opt(
                "SELECT next_sequence FROM nlsql_session_sequences WHERE session_id = $1 FOR UPDATE",
                &[&session_id.as_uuid()],
            )
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;
        let sequence_number: i32 = row.get(0);

        txn.execute(
            "UPDATE nlsql_session_sequences SET next_sequence = next_sequence + 1 WHERE session_id = $1",
            &[&session_id.as_uuid()],
        )
        .await?;

        let now = Utc::now();
        let task_id = TaskId::new();
        let request = Request {
            request_id: RequestId::new(),
            session_id,
            task_id,
            sequence_number: sequence_number as u32,
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

        let payload = serde_json::to_value(&request).map_err(nlsql_model::Error::from)?;
        txn.execute(
            "INSERT INTO nlsql_requests (request_id, session_id, task_id, sequence_number, payload) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &request.request_id.as_uuid(),
                &session_id.as_uuid(),
                &task_id.as_uuid(),
                &(sequence_number),
                &payload,
            ],
        )
        .await?;

        txn.commit().await?;
        Ok((request, task_id))
    }

    async fn get_request(&self, _user: &str, session_id: SessionId, seq: u32) -> Result<Request> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT request_id FROM nlsql_requests WHERE session_id = $1 AND sequence_number = $2",
                &[&session_id.as_uuid(), &(seq as i32)],
            )
            .await?
            .ok_or(Error::RequestNotFoundBySeq { session: session_id, seq })?;
        let request_id: uuid::Uuid = row.get(0);
        Self::load_request_row(&client, RequestId::from_uuid(request_id)).await
    }

    async fn get_request_by_id(&self, request_id: RequestId) -> Result<Request> {
        let client = self.pool.get().await?;
        Self::load_request_row(&client, request_id).await
    }

    async fn update_status(
        &self,
        request_id: RequestId,
        status: RequestStatus,
        err: Option<String>,
    ) -> Result<Request> {
        let client = self.pool.get().await?;
        let mut request = Self::load_request_row(&client, request_id).await?;
        if request.status.is_terminal() {
            return Ok(request);
        }
        request.status = status;
        if err.is_some() {
            request.err = err;
        }
        request.updated_at = Utc::now();
        persist_request(&client, &request).await?;
        Ok(request)
    }

    async fn update_request(&self, fields: UpdateRequestFields) -> Result<Request> {
        let client = self.pool.get().await?;
        let mut request = Self::load_request_row(&client, fields.request_id).await?;

        if let Some(status) = fields.status {
            if !request.status.is_terminal() {
                request.status = status;
            }
        }
        macro_rules! set_if_some {
            ($field:ident) => {
                if let Some(value) = fields.$field {
                    request.$field = Some(value);
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
        request.updated_at = Utc::now();

        persist_request(&client, &request).await?;
        Ok(request)
    }

    async fn delete_request_revert(&self, request_id: RequestId, user: &str) -> Result<SessionId> {
        let client = self.pool.get().await?;
        let target = Self::load_request_row(&client, request_id).await?;
        let session = Self::load_session_row(&client, target.session_id).await?;
        if session.user_owner != user {
            return Err(Error::Forbidden {
                user: user.to_string(),
                session: session.id,
            });
        }

        client
            .execute(
                "DELETE FROM nlsql_requests WHERE session_id = $1 AND sequence_number >= $2",
                &[&target.session_id.as_uuid(), &(target.sequence_number as i32)],
            )
            .await?;

        Ok(target.session_id)
    }

    async fn update_query_metadata(
        &self,
        session_id: SessionId,
        user: &str,
        metadata: QueryMetadata,
    ) -> Result<Session> {
        let client = self.pool.get().await?;
        let session = Self::load_session_row(&client, session_id).await?;
        if session.user_owner != user {
            return Err(Error::Forbidden {
                user: user.to_string(),
                session: session_id,
            });
        }
        let payload = serde_json::to_value(&metadata).map_err(nlsql_model::Error::from)?;
        client
            .execute(
                "UPDATE nlsql_sessions SET metadata = $2, updated_at = now() WHERE id = $1",
                &[&session_id.as_uuid(), &payload],
            )
            .await?;
        Self::load_session_row(&client, session_id).await
    }

    async fn update_session_name(
        &self,
        session_id: SessionId,
        user: &str,
        name: String,
    ) -> Result<Session> {
        let client = self.pool.get().await?;
        let session = Self::load_session_row(&client, session_id).await?;
        if session.user_owner != user {
            return Err(Error::Forbidden {
                user: user.to_string(),
                session: session_id,
            });
        }
        client
            .execute(
                "UPDATE nlsql_sessions SET name = $2, updated_at = now() WHERE id = $1",
                &[&session_id.as_uuid(), &name],
            )
            .await?;
        Self::load_session_row(&client, session_id).await
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
        let client = self.pool.get().await?;
        let payload = serde_json::to_value(&query).map_err(nlsql_model::Error::from)?;
        client
            .execute(
                "INSERT INTO nlsql_queries (query_id, payload) VALUES ($1, $2)",
                &[&query.query_id.as_uuid(), &payload],
            )
            .await?;
        Ok(query)
    }

    async fn get_query_by_id(&self, query_id: QueryId) -> Result<Query> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT payload FROM nlsql_queries WHERE query_id = $1",
                &[&query_id.as_uuid()],
            )
            .await?
            .ok_or(Error::QueryNotFound(query_id))?;
        let payload: Value = row.get(0);
        serde_json::from_value(payload).map_err(nlsql_model::Error::from).map_err(Error::from)
    }

    async fn get_history(
        &self,
        session_id: SessionId,
        include_responses: bool,
    ) -> Result<Vec<HistoryEntry>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT payload FROM nlsql_requests WHERE session_id = $1 ORDER BY sequence_number ASC",
                &[&session_id.as_uuid()],
            )
            .await?;

        let mut history = Vec::with_capacity(rows.len() * 2);
        for row in rows {
            let payload: Value = row.get(0);
            let request: Request =
                serde_json::from_value(payload).map_err(nlsql_model::Error::from)?;
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
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id FROM nlsql_sessions WHERE user_owner = $1 ORDER BY updated_at DESC",
                &[&user],
            )
            .await?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let id: uuid::Uuid = row.get(0);
            sessions.push(Self::load_session_row(&client, SessionId::from_uuid(id)).await?);
        }
        Ok(sessions)
    }

    async fn list_requests(&self, session_id: SessionId) -> Result<Vec<Request>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT payload FROM nlsql_requests WHERE session_id = $1 ORDER BY sequence_number ASC",
                &[&session_id.as_uuid()],
            )
            .await?;
        rows.into_iter()
            .map(|row| {
                let payload: Value = row.get(0);
                serde_json::from_value(payload).map_err(nlsql_model::Error::from).map_err(Error::from)
            })
            .collect()
    }

    async fn list_all_sessions(&self) -> Result<Vec<Session>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT id FROM nlsql_sessions ORDER BY updated_at DESC", &[])
            .await?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let id: uuid::Uuid = row.get(0);
            sessions.push(Self::load_session_row(&client, SessionId::from_uuid(id)).await?);
        }
        Ok(sessions)
    }

    async fn list_all_requests(&self) -> Result<Vec<Request>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT payload FROM nlsql_requests", &[])
            .await?;
        rows.into_iter()
            .map(|row| {
                let payload: Value = row.get(0);
                serde_json::from_value(payload).map_err(nlsql_model::Error::from).map_err(Error::from)
            })
            .collect()
    }

    async fn list_queries(&self, limit: u32, offset: u32) -> Result<(Vec<Query>, u64)> {
        let client = self.pool.get().await?;
        let total: i64 = client
            .query_one("SELECT count(*) FROM nlsql_queries", &[])
            .await?
            .get(0);
        let rows = client
            .query(
                "SELECT payload FROM nlsql_queries ORDER BY query_id ASC LIMIT $1 OFFSET $2",
                &[&(limit as i64), &(offset as i64)],
            )
            .await?;
        let queries = rows
            .into_iter()
            .map(|row| {
                let payload: Value = row.get(0);
                serde_json::from_value(payload).map_err(nlsql_model::Error::from).map_err(Error::from)
            })
            .collect::<Result<Vec<Query>>>()?;
        Ok((queries, total as u64))
    }
}

async fn persist_request(client: &deadpool_postgres::Client, request: &Request) -> Result<()> {
    let payload = serde_json::to_value(request).map_err(nlsql_model::Error::from)?;
    client
        .execute(
            "UPDATE nlsql_requests SET payload = $2 WHERE request_id = $1",
            &[&request.request_id.as_uuid(), &payload],
        )
        .await?;
    Ok(())
}
