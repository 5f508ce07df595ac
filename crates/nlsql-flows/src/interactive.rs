//! `InteractiveFlow`: intent classification followed by one of five
//! dispatch branches, the hardest of which (`interactive_query`) drives a
//! bounded retry loop around SQL generation and warehouse preflight.
//!
//! Grounded in `original_source/apps/fm-app/fm_app/workers/interactive_flow.py`'s
//! `run` method; the state names in `nlsql_model::RequestStatus` mirror its
//! `status=...` assignments one for one.

use async_trait::async_trait;
use nlsql_llm::Message;
use nlsql_model::{
    CreateQueryFields, IntentAnalysis, InteractiveRequestType, QueryId, QueryMetadata,
    RequestStatus, Session, StructuredResponse, UpdateRequestFields, WorkerRequest,
};
use serde_json::{json, Value};

use crate::context::{planner_variables, query_variables};
use crate::{Flow, FlowContext};

/// Maximum number of SQL-generation attempts before the request is given
/// up on and marked `Error`.
const MAX_SQL_ATTEMPTS: u32 = 3;

/// `EXPLAIN ESTIMATE` thresholds the flow observes and logs but does not
/// act on — see SPEC_FULL.md's Open Questions: the original only logs
/// these, it never gates on them, and changing that is out of scope here.
const ROWS_THRESHOLD: u64 = 50_000_000;
const MARKS_THRESHOLD: u64 = 100_000;
const PARTS_THRESHOLD: u64 = 3;

pub struct InteractiveFlow;

#[async_trait]
impl Flow for InteractiveFlow {
    async fn run(&self, mut wr: WorkerRequest, ctx: &FlowContext) -> WorkerRequest {
        wr.status = RequestStatus::InProgress;
        persist_status(ctx, &wr).await;

        let session = match ctx.store.get_session(wr.session_id).await {
            Ok(session) => session,
            Err(err) => return fail(wr, err.to_string()),
        };
        let parent_session = match session.parent {
            Some(parent_id) => ctx.store.get_session(parent_id).await.ok(),
            None => None,
        };

        let intent = match classify_intent(&wr, &session, parent_session.as_ref(), ctx).await {
            Ok(intent) => intent,
            Err(message) => return fail(wr, message),
        };

        if let Err(err) = ctx
            .store
            .update_request(UpdateRequestFields {
                intent: intent.intent.clone(),
                ..UpdateRequestFields::new(wr.request_id)
            })
            .await
        {
            return fail(wr, err.to_string());
        }
        wr.request_type = intent.request_type;
        wr.status = RequestStatus::Intent;
        persist_status(ctx, &wr).await;

        match intent.request_type {
            InteractiveRequestType::LinkedSession => {
                run_linked_session(wr, &session, intent, ctx).await
            }
            InteractiveRequestType::InteractiveQuery => {
                run_interactive_query(wr, &session, parent_session.as_ref(), intent, ctx).await
            }
            InteractiveRequestType::DataAnalysis => {
                run_data_analysis(wr, &session, parent_session.as_ref(), intent, ctx).await
            }
            InteractiveRequestType::GeneralChat | InteractiveRequestType::Disambiguation => {
                wr.response = intent.response.clone();
                wr.structured_response = Some(StructuredResponse {
                    intent: intent.intent,
                    ..Default::default()
                });
                wr.status = RequestStatus::Done;
                wr
            }
            InteractiveRequestType::Tbd | InteractiveRequestType::Unknown => {
                wr.status = RequestStatus::Done;
                wr.err = Some("Unsupported request type".to_string());
                wr
            }
        }
    }
}

async fn classify_intent(
    wr: &WorkerRequest,
    session: &Session,
    parent_session: Option<&Session>,
    ctx: &FlowContext,
) -> Result<IntentAnalysis, String> {
    let variables = planner_variables(wr, session, parent_session);
    let material = ctx
        .assembler
        .render_async("planner", variables, Value::Null, Value::Null)
        .await
        .map_err(|e| e.to_string())?;

    let history = ctx
        .store
        .get_history(session.id, true)
        .await
        .map_err(|e| e.to_string())?;
    let mut messages = vec![Message::system(material.prompt_text)];
    for entry in history {
        messages.push(match entry.role {
            "assistant" => Message::assistant(entry.content),
            _ => Message::user(entry.content),
        });
    }
    messages.push(Message::user(wr.request.clone()));

    let schema = intent_analysis_schema();
    let value = ctx
        .llm
        .complete_structured(&messages, &schema, None)
        .await
        .map_err(|e| e.to_string())?;
    serde_json::from_value(value).map_err(|e| e.to_string())
}

async fn run_linked_session(
    mut wr: WorkerRequest,
    session: &Session,
    intent: IntentAnalysis,
    ctx: &FlowContext,
) -> WorkerRequest {
    let new_session = match ctx
        .store
        .add_session(
            &wr.user,
            &session.name,
            session.tags.clone(),
            Some(session.id),
            session.refs.clone(),
        )
        .await
    {
        Ok(session) => session,
        Err(err) => return fail(wr, err.to_string()),
    };

    wr.response = session.metadata.as_ref().and_then(|m| m.sql.clone());
    wr.structured_response = Some(StructuredResponse {
        intent: intent.intent,
        linked_session_id: Some(new_session.id),
        refs: wr.refs.clone(),
        ..Default::default()
    });
    wr.status = RequestStatus::Finalizing;
    persist_status(ctx, &wr).await;
    wr.status = RequestStatus::Done;
    wr
}

async fn run_data_analysis(
    mut wr: WorkerRequest,
    session: &Session,
    parent_session: Option<&Session>,
    intent: IntentAnalysis,
    ctx: &FlowContext,
) -> WorkerRequest {
    let variables = query_variables(&wr, session, parent_session, &intent);
    let material = match ctx
        .assembler
        .render_async("interactive_query", variables, Value::Null, Value::Null)
        .await
    {
        Ok(material) => material,
        Err(err) => return fail(wr, err.to_string()),
    };
    let messages = vec![
        Message::system(material.prompt_text),
        Message::user(wr.request.clone()),
    ];
    match ctx.llm.complete(&messages).await {
        Ok(text) => {
            wr.response = Some(text);
            wr.structured_response = Some(StructuredResponse {
                intent: intent.intent,
                ..Default::default()
            });
            wr.status = RequestStatus::Finalizing;
            persist_status(ctx, &wr).await;
            wr.status = RequestStatus::Done;
            wr
        }
        Err(err) => fail(wr, err.to_string()),
    }
}

async fn run_interactive_query(
    mut wr: WorkerRequest,
    session: &Session,
    parent_session: Option<&Session>,
    intent: IntentAnalysis,
    ctx: &FlowContext,
) -> WorkerRequest {
    let prior_query_id: Option<QueryId> = session.metadata.as_ref().and_then(|m| m.id);
    let variables = query_variables(&wr, session, parent_session, &intent);
    let schema = query_metadata_schema();

    let history = match ctx.store.get_history(session.id, true).await {
        Ok(history) => history,
        Err(err) => return fail(wr, err.to_string()),
    };

    let material = match ctx
        .assembler
        .render_async("interactive_query", variables, Value::Null, Value::Null)
        .await
    {
        Ok(material) => material,
        Err(err) => return fail(wr, err.to_string()),
    };

    let mut messages = vec![Message::system(material.prompt_text)];
    for entry in &history {
        messages.push(match entry.role {
            "assistant" => Message::assistant(entry.content.clone()),
            _ => Message::user(entry.content.clone()),
        });
    }
    messages.push(Message::user(wr.request.clone()));

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        wr.status = RequestStatus::Sql;
        persist_status(ctx, &wr).await;

        let value = match ctx.llm.complete_structured(&messages, &schema, None).await {
            Ok(value) => value,
            Err(err) => return fail(wr, err.to_string()),
        };
        let mut metadata: QueryMetadata = match serde_json::from_value(value) {
            Ok(metadata) => metadata,
            Err(err) => return fail(wr, format!("malformed QueryMetadata from LLM: {err}")),
        };

        if let Some(summary) = metadata.summary.clone() {
            if let Err(err) = ctx
                .store
                .update_session_name(session.id, &wr.user, summary)
                .await
            {
                tracing::warn!(error = %err, "failed to update session name from query summary");
            }
        }
        if let Some(parent_id) = session.parent {
            if !metadata.parents.contains(&parent_id) {
                metadata.parents.push(parent_id);
            }
        }

        if let Some(sql) = metadata.sql.clone() {
            crate::validate::check_syntax(&sql);

            match ctx.warehouse.preflight(&sql).await {
                Ok(explanation) => {
                    if explanation.rows > ROWS_THRESHOLD
                        || explanation.marks > MARKS_THRESHOLD
                        || explanation.parts > PARTS_THRESHOLD
                    {
                        tracing::info!(
                            rows = explanation.rows,
                            marks = explanation.marks,
                            parts = explanation.parts,
                            "preflight exceeded informational thresholds; proceeding"
                        );
                    }
                    metadata.explanation = serde_json::to_value(&explanation).ok();
                }
                Err(err) if attempt < MAX_SQL_ATTEMPTS => {
                    wr.status = RequestStatus::Retry;
                    persist_status(ctx, &wr).await;
                    messages.push(Message::system(format!(
                        "The previous query failed preflight with: {err}. \
                         Revise the SQL to satisfy the warehouse's constraints and try again."
                    )));
                    continue;
                }
                Err(err) => {
                    return fail(wr, format!("query rejected after {attempt} attempts: {err}"));
                }
            }

            let row_count = match ctx.warehouse.count(&sql).await {
                Ok(count) => Some(count as i64),
                Err(err) => {
                    tracing::warn!(error = %err, "row count failed; continuing without it");
                    None
                }
            };
            metadata.row_count = row_count.or(metadata.row_count);

            if let Err(err) = ctx
                .store
                .update_query_metadata(session.id, &wr.user, metadata.clone())
                .await
            {
                return fail(wr, err.to_string());
            }

            let query = match ctx
                .store
                .create_query(CreateQueryFields {
                    request: wr.request.clone(),
                    intent: intent.intent.clone(),
                    summary: metadata.summary.clone(),
                    description: metadata.description.clone(),
                    sql: sql.clone(),
                    row_count: metadata.row_count,
                    columns: metadata.columns.clone().unwrap_or_default(),
                    ai_generated: true,
                    ai_context: intent.description.clone(),
                    data_source: wr.db.0.clone(),
                    db_dialect: "clickhouse".to_string(),
                    explanation: metadata.explanation.clone(),
                    err: None,
                    parent_id: prior_query_id,
                })
                .await
            {
                Ok(query) => query,
                Err(err) => return fail(wr, err.to_string()),
            };

            metadata.id = Some(query.query_id);
            wr.structured_response = Some(StructuredResponse {
                intent: intent.intent,
                description: metadata.description.clone(),
                sql: Some(sql),
                metadata: Some(metadata),
                ..Default::default()
            });
            wr.status = RequestStatus::Finalizing;
            persist_status(ctx, &wr).await;
            wr.status = RequestStatus::Done;
            return wr;
        }

        if let Some(result) = metadata.result.clone() {
            if let Err(err) = ctx
                .store
                .update_query_metadata(session.id, &wr.user, metadata.clone())
                .await
            {
                return fail(wr, err.to_string());
            }
            wr.response = Some(result);
            wr.structured_response = Some(StructuredResponse {
                intent: intent.intent,
                description: metadata.description.clone(),
                metadata: Some(metadata),
                ..Default::default()
            });
            wr.status = RequestStatus::Finalizing;
            persist_status(ctx, &wr).await;
            wr.status = RequestStatus::Done;
            return wr;
        }

        return fail(wr, "No SQL".to_string());
    }
}

fn fail(mut wr: WorkerRequest, message: String) -> WorkerRequest {
    wr.status = RequestStatus::Error;
    wr.err = Some(message);
    wr
}

/// Writes the request's current in-memory status through to the store
/// immediately, so the lifecycle trail (§8 scenario 4: Intent, SQL,
/// Retry×2, SQL, Finalizing, Done) is actually observable mid-flow
/// rather than collapsed into the single write `FlowRunner` does once
/// the flow returns. Best-effort: a transient store hiccup here doesn't
/// abort the flow, since `FlowRunner` still persists the final state.
async fn persist_status(ctx: &FlowContext, wr: &WorkerRequest) {
    if let Err(err) = ctx
        .store
        .update_status(wr.request_id, wr.status, wr.err.clone())
        .await
    {
        tracing::warn!(error = %err, status = ?wr.status, "failed to persist intermediate status");
    }
}

fn intent_analysis_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(IntentAnalysis)).unwrap_or_else(|_| json!({}))
}

fn query_metadata_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(QueryMetadata)).unwrap_or_else(|_| json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlsql_llm::MockLLMClient;
    use nlsql_model::{DbType, FlowType, ModelType, SelectionRefs};
    use nlsql_packs::{Manifest, PromptAssembler};
    use nlsql_store::{InMemoryRequestStore, NewRequestFields, RequestStore};
    use nlsql_warehouse::{CsvResult, ExecuteResult, Explanation, WarehouseClient};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct StubWarehouse {
        preflight_failures: AtomicU32,
    }

    #[async_trait]
    impl WarehouseClient for StubWarehouse {
        async fn preflight(&self, _sql: &str) -> nlsql_warehouse::Result<Explanation> {
            let n = self.preflight_failures.load(Ordering::SeqCst);
            if n > 0 {
                self.preflight_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(nlsql_warehouse::Error::QueryRejected(
                    "DB::Exception: too broad".to_string(),
                ));
            }
            Ok(Explanation {
                rows: 10,
                parts: 1,
                marks: 1,
                raw: Default::default(),
            })
        }

        async fn count(&self, _sql: &str) -> nlsql_warehouse::Result<u64> {
            Ok(42)
        }

        async fn execute(&self, _sql: &str, _limit: u32, _offset: u32) -> nlsql_warehouse::Result<ExecuteResult> {
            unimplemented!("not exercised by these tests")
        }

        async fn execute_csv(&self, _sql: &str) -> nlsql_warehouse::Result<CsvResult> {
            unimplemented!("not exercised by these tests")
        }
    }

    fn assembler_with_slots(slots: &[(&str, &str)]) -> Arc<PromptAssembler> {
        let mut tree = nlsql_packs::EffectiveTree::new();
        for (slot, text) in slots {
            tree.insert(format!("slots/{slot}.tera"), text.as_bytes().to_vec());
        }
        let manifest = Manifest {
            version: "1".to_string(),
            pack_name: None,
            target_component: None,
            dependencies: vec![],
            slots: HashMap::new(),
            license: None,
            provenance: None,
        };
        Arc::new(PromptAssembler::new("test", tree, manifest, vec![]))
    }

    async fn new_worker_request(store: &InMemoryRequestStore, request_type: InteractiveRequestType) -> WorkerRequest {
        let session = store
            .add_session("alice", "thread", vec![], None, None)
            .await
            .unwrap();
        let (request, _task_id) = store
            .add_request(
                "alice",
                session.id,
                NewRequestFields {
                    request: "how many orders last week?".to_string(),
                    request_type,
                    flow: FlowType::Interactive,
                    model: ModelType("gpt".to_string()),
                    db: DbType("warehouse".to_string()),
                    refs: None::<SelectionRefs>,
                },
            )
            .await
            .unwrap();
        WorkerRequest {
            request_id: request.request_id,
            session_id: session.id,
            parent_session_id: None,
            user: "alice".to_string(),
            request: request.request,
            request_type,
            flow: FlowType::Interactive,
            model: ModelType("gpt".to_string()),
            db: DbType("warehouse".to_string()),
            refs: None,
            status: request.status,
            err: None,
            response: None,
            query: None,
            structured_response: None,
        }
    }

    #[tokio::test]
    async fn retries_sql_twice_then_succeeds_and_creates_one_query() {
        let store = Arc::new(InMemoryRequestStore::new());
        let wr = new_worker_request(&store, InteractiveRequestType::Tbd).await;

        let llm = Arc::new(MockLLMClient::new());
        llm.push_structured(json!({"request_type": "interactive_query"}));
        for sql in ["SELECT bad1", "SELECT bad2", "SELECT count(*) FROM orders"] {
            llm.push_structured(json!({"sql": sql, "summary": "order count"}));
        }

        let ctx = FlowContext {
            store: store.clone(),
            llm: llm.clone(),
            warehouse: Arc::new(StubWarehouse {
                preflight_failures: AtomicU32::new(2),
            }),
            assembler: assembler_with_slots(&[
                ("planner", "plan"),
                ("interactive_query", "query"),
            ]),
            chart: Arc::new(crate::NullChartService),
            max_steps: 5,
        };

        let result = InteractiveFlow.run(wr, &ctx).await;

        assert_eq!(result.status, RequestStatus::Done);
        let structured = result.structured_response.expect("structured response set");
        assert_eq!(
            structured.sql.as_deref(),
            Some("SELECT count(*) FROM orders")
        );

        let session = store.get_session(result.session_id).await.unwrap();
        assert_eq!(
            session.metadata.unwrap().sql.as_deref(),
            Some("SELECT count(*) FROM orders")
        );
    }

    #[tokio::test]
    async fn exhausting_retries_ends_in_error() {
        let store = Arc::new(InMemoryRequestStore::new());
        let wr = new_worker_request(&store, InteractiveRequestType::Tbd).await;

        let llm = Arc::new(MockLLMClient::new());
        llm.push_structured(json!({"request_type": "interactive_query"}));
        for _ in 0..3 {
            llm.push_structured(json!({"sql": "SELECT 1", "summary": "s"}));
        }

        let ctx = FlowContext {
            store: store.clone(),
            llm,
            warehouse: Arc::new(StubWarehouse {
                preflight_failures: AtomicU32::new(3),
            }),
            assembler: assembler_with_slots(&[
                ("planner", "plan"),
                ("interactive_query", "query"),
            ]),
            chart: Arc::new(crate::NullChartService),
            max_steps: 5,
        };

        let result = InteractiveFlow.run(wr, &ctx).await;
        assert_eq!(result.status, RequestStatus::Error);
    }

    #[tokio::test]
    async fn general_chat_uses_planner_response_without_a_second_llm_call() {
        let store = Arc::new(InMemoryRequestStore::new());
        let wr = new_worker_request(&store, InteractiveRequestType::Tbd).await;

        let llm = Arc::new(MockLLMClient::new());
        llm.push_structured(json!({"request_type": "general_chat", "response": "Hi there!"}));

        let ctx = FlowContext {
            store,
            llm,
            warehouse: Arc::new(StubWarehouse {
                preflight_failures: AtomicU32::new(0),
            }),
            assembler: assembler_with_slots(&[("planner", "plan")]),
            chart: Arc::new(crate::NullChartService),
            max_steps: 5,
        };

        let result = InteractiveFlow.run(wr, &ctx).await;
        assert_eq!(result.status, RequestStatus::Done);
        assert_eq!(result.response.as_deref(), Some("Hi there!"));
    }

    /// Records every status the flow writes through the store, in order,
    /// by wrapping the same `InMemoryRequestStore` every other test here
    /// uses and intercepting `update_status`/`update_request`.
    struct TrailRecordingStore {
        inner: InMemoryRequestStore,
        trail: std::sync::Mutex<Vec<RequestStatus>>,
    }

    #[async_trait]
    impl RequestStore for TrailRecordingStore {
        async fn add_session(
            &self,
            user: &str,
            name: &str,
            tags: Vec<String>,
            parent: Option<nlsql_model::SessionId>,
            refs: Option<serde_json::Value>,
        ) -> nlsql_store::Result<nlsql_model::Session> {
            self.inner.add_session(user, name, tags, parent, refs).await
        }
        async fn get_session(&self, session_id: nlsql_model::SessionId) -> nlsql_store::Result<nlsql_model::Session> {
            self.inner.get_session(session_id).await
        }
        async fn add_request(
            &self,
            user: &str,
            session_id: nlsql_model::SessionId,
            fields: NewRequestFields,
        ) -> nlsql_store::Result<(nlsql_model::Request, nlsql_model::TaskId)> {
            self.inner.add_request(user, session_id, fields).await
        }
        async fn get_request(&self, user: &str, session_id: nlsql_model::SessionId, seq: u32) -> nlsql_store::Result<nlsql_model::Request> {
            self.inner.get_request(user, session_id, seq).await
        }
        async fn get_request_by_id(&self, request_id: nlsql_model::RequestId) -> nlsql_store::Result<nlsql_model::Request> {
            self.inner.get_request_by_id(request_id).await
        }
        async fn update_status(
            &self,
            request_id: nlsql_model::RequestId,
            status: RequestStatus,
            err: Option<String>,
        ) -> nlsql_store::Result<nlsql_model::Request> {
            self.trail.lock().unwrap().push(status);
            self.inner.update_status(request_id, status, err).await
        }
        async fn update_request(&self, fields: UpdateRequestFields) -> nlsql_store::Result<nlsql_model::Request> {
            if let Some(status) = fields.status {
                self.trail.lock().unwrap().push(status);
            }
            self.inner.update_request(fields).await
        }
        async fn delete_request_revert(&self, request_id: nlsql_model::RequestId, user: &str) -> nlsql_store::Result<nlsql_model::SessionId> {
            self.inner.delete_request_revert(request_id, user).await
        }
        async fn update_query_metadata(
            &self,
            session_id: nlsql_model::SessionId,
            user: &str,
            metadata: nlsql_model::QueryMetadata,
        ) -> nlsql_store::Result<nlsql_model::Session> {
            self.inner.update_query_metadata(session_id, user, metadata).await
        }
        async fn update_session_name(&self, session_id: nlsql_model::SessionId, user: &str, name: String) -> nlsql_store::Result<nlsql_model::Session> {
            self.inner.update_session_name(session_id, user, name).await
        }
        async fn create_query(&self, fields: nlsql_model::CreateQueryFields) -> nlsql_store::Result<nlsql_model::Query> {
            self.inner.create_query(fields).await
        }
        async fn get_query_by_id(&self, query_id: nlsql_model::QueryId) -> nlsql_store::Result<nlsql_model::Query> {
            self.inner.get_query_by_id(query_id).await
        }
        async fn get_history(&self, session_id: nlsql_model::SessionId, include_responses: bool) -> nlsql_store::Result<Vec<nlsql_store::HistoryEntry>> {
            self.inner.get_history(session_id, include_responses).await
        }
        async fn list_sessions(&self, user: &str) -> nlsql_store::Result<Vec<nlsql_model::Session>> {
            self.inner.list_sessions(user).await
        }
        async fn list_requests(&self, session_id: nlsql_model::SessionId) -> nlsql_store::Result<Vec<nlsql_model::Request>> {
            self.inner.list_requests(session_id).await
        }
        async fn list_all_sessions(&self) -> nlsql_store::Result<Vec<nlsql_model::Session>> {
            self.inner.list_all_sessions().await
        }
        async fn list_all_requests(&self) -> nlsql_store::Result<Vec<nlsql_model::Request>> {
            self.inner.list_all_requests().await
        }
        async fn list_queries(&self, limit: u32, offset: u32) -> nlsql_store::Result<(Vec<nlsql_model::Query>, u64)> {
            self.inner.list_queries(limit, offset).await
        }
    }

    /// Spec §8 scenario 4: SQL rejected twice then accepted on the third
    /// attempt produces an observable status trail of
    /// Intent, SQL, Retry, SQL, Retry, SQL, Finalizing, Done — not just a
    /// single jump straight to the terminal state.
    #[tokio::test]
    async fn status_trail_matches_retry_then_success_scenario() {
        let store = Arc::new(TrailRecordingStore {
            inner: InMemoryRequestStore::new(),
            trail: std::sync::Mutex::new(Vec::new()),
        });
        let wr = new_worker_request(&store.inner, InteractiveRequestType::Tbd).await;

        let llm = Arc::new(MockLLMClient::new());
        llm.push_structured(json!({"request_type": "interactive_query"}));
        for sql in ["SELECT bad1", "SELECT bad2", "SELECT count(*) FROM orders"] {
            llm.push_structured(json!({"sql": sql, "summary": "order count"}));
        }

        let ctx = FlowContext {
            store: store.clone(),
            llm,
            warehouse: Arc::new(StubWarehouse {
                preflight_failures: AtomicU32::new(2),
            }),
            assembler: assembler_with_slots(&[
                ("planner", "plan"),
                ("interactive_query", "query"),
            ]),
            chart: Arc::new(crate::NullChartService),
            max_steps: 5,
        };

        let result = InteractiveFlow.run(wr, &ctx).await;
        assert_eq!(result.status, RequestStatus::Done);

        let trail = store.trail.lock().unwrap().clone();
        assert_eq!(
            trail,
            vec![
                RequestStatus::InProgress,
                RequestStatus::Intent,
                RequestStatus::Sql,
                RequestStatus::Retry,
                RequestStatus::Sql,
                RequestStatus::Retry,
                RequestStatus::Sql,
                RequestStatus::Finalizing,
            ]
        );
    }
}
