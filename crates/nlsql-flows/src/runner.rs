//! Worker glue: dispatches dequeued tasks to the flow named by their
//! `(flow, model, db)` triple and flattens the finished `WorkerRequest`
//! back onto the persisted `Request` row, mirroring the separation
//! between `_wrk_add_request` and the flow functions it calls in
//! `original_source/apps/fm-app/fm_app/workers/worker.py`.

use std::collections::HashMap;
use std::sync::Arc;

use nlsql_broker::TaskBroker;
use nlsql_model::{FlowType, Request, SessionId, UpdateRequestFields, WorkerRequest};
use nlsql_store::{NewRequestFields, RequestStore};

use crate::error::{Error, Result};
use crate::{
    DataOnlyFlow, Flow, FlowContext, FlexFlow, InteractiveFlow, LangGraphFlow, MultistepFlow,
    SimpleFlow,
};

/// Dispatches tasks pulled from a `TaskBroker` to the right `Flow` and
/// persists the outcome. Holds two lookup tables per the spec's "new
/// flows vs legacy flows" split: the unified table is used once a
/// request carries both a `model` and a `db`; requests missing either
/// (pre-unification callers) fall back to the legacy table, which only
/// knows the two flows the spec calls out as having legacy variants.
pub struct FlowRunner {
    ctx: FlowContext,
    broker: Arc<dyn TaskBroker>,
    task_name: String,
    flows: HashMap<FlowType, Arc<dyn Flow>>,
    legacy_flows: HashMap<FlowType, Arc<dyn Flow>>,
}

impl FlowRunner {
    pub fn new(ctx: FlowContext, broker: Arc<dyn TaskBroker>, task_name: impl Into<String>) -> Self {
        let mut flows: HashMap<FlowType, Arc<dyn Flow>> = HashMap::new();
        flows.insert(FlowType::Interactive, Arc::new(InteractiveFlow));
        flows.insert(FlowType::Simple, Arc::new(SimpleFlow));
        flows.insert(FlowType::Multistep, Arc::new(MultistepFlow));
        flows.insert(FlowType::DataOnly, Arc::new(DataOnlyFlow));
        flows.insert(FlowType::Flex, Arc::new(FlexFlow));
        flows.insert(FlowType::LangGraph, Arc::new(LangGraphFlow));

        let mut legacy_flows: HashMap<FlowType, Arc<dyn Flow>> = HashMap::new();
        legacy_flows.insert(FlowType::Simple, Arc::new(SimpleFlow));
        legacy_flows.insert(FlowType::Multistep, Arc::new(MultistepFlow));

        Self {
            ctx,
            broker,
            task_name: task_name.into(),
            flows,
            legacy_flows,
        }
    }

    /// Blocks on the broker, runs one task through its flow, persists the
    /// result, and dispatches a follow-up task for linked sessions.
    pub async fn run_once(&self) -> Result<()> {
        let task = self.broker.consume(&self.task_name).await?;
        let wr: WorkerRequest = serde_json::from_value(task.payload)
            .map_err(|err| Error::MalformedStructuredResponse(err.to_string()))?;
        self.run_request(wr).await
    }

    /// Loops `run_once` forever, logging (rather than propagating) errors
    /// so one bad task never brings the worker loop down.
    pub async fn serve(&self) {
        loop {
            if let Err(err) = self.run_once().await {
                tracing::error!(error = %err, "flow runner iteration failed");
            }
        }
    }

    async fn run_request(&self, wr: WorkerRequest) -> Result<()> {
        let flow = self.select_flow(wr.flow, &wr)?;
        let user = wr.user.clone();
        let finished = flow.run(wr, &self.ctx).await;

        let fields = update_fields_for(&finished);
        self.ctx.store.update_request(fields).await?;

        if let Some(linked_session_id) = finished
            .structured_response
            .as_ref()
            .and_then(|sr| sr.linked_session_id)
        {
            self.dispatch_follow_up(&user, linked_session_id, &finished).await?;
        }

        Ok(())
    }

    fn select_flow(&self, flow: FlowType, wr: &WorkerRequest) -> Result<Arc<dyn Flow>> {
        let table = if !wr.model.0.is_empty() && !wr.db.0.is_empty() {
            &self.flows
        } else {
            &self.legacy_flows
        };
        table
            .get(&flow)
            .cloned()
            .ok_or_else(|| Error::UnknownFlow {
                flow,
                model: wr.model.0.clone(),
                db: wr.db.0.clone(),
            })
    }

    async fn dispatch_follow_up(
        &self,
        user: &str,
        linked_session_id: SessionId,
        finished: &WorkerRequest,
    ) -> Result<()> {
        let (follow_up, task_id) = self
            .ctx
            .store
            .add_request(
                user,
                linked_session_id,
                NewRequestFields {
                    request: finished.request.clone(),
                    request_type: nlsql_model::InteractiveRequestType::Tbd,
                    flow: finished.flow,
                    model: finished.model.clone(),
                    db: finished.db.clone(),
                    refs: finished
                        .structured_response
                        .as_ref()
                        .and_then(|sr| sr.refs.clone()),
                },
            )
            .await?;

        let payload = serde_json::to_value(worker_request_from(&follow_up, user, Some(linked_session_id)))
            .map_err(|err| Error::MalformedStructuredResponse(err.to_string()))?;

        self.broker.enqueue(&self.task_name, payload, task_id).await?;
        Ok(())
    }
}

fn update_fields_for(wr: &WorkerRequest) -> UpdateRequestFields {
    let mut fields = UpdateRequestFields::new(wr.request_id);
    fields.status = Some(wr.status);
    fields.err = wr.err.clone();
    fields.response = wr.response.clone();

    if let Some(sr) = &wr.structured_response {
        fields.sql = sr.sql.clone();
        fields.intent = sr.intent.clone();
        fields.assumptions = sr.assumptions.clone();
        fields.intro = sr.intro.clone();
        fields.outro = sr.outro.clone();
        fields.raw_data_labels = sr.raw_data_labels.clone();
        fields.raw_data_rows = sr.raw_data_rows.clone();
        fields.csv = sr.csv.clone();
        fields.chart = sr.chart.clone();
        fields.chart_url = sr.chart_url.clone();
        fields.query_id = sr.metadata.as_ref().and_then(|m| m.id);
        fields.linked_session_id = sr.linked_session_id;
        fields.refs = sr.refs.clone();
    }
    fields
}

fn worker_request_from(request: &Request, user: &str, parent_session_id: Option<SessionId>) -> WorkerRequest {
    WorkerRequest {
        request_id: request.request_id,
        session_id: request.session_id,
        parent_session_id,
        user: user.to_string(),
        request: request.request.clone(),
        request_type: request.request_type,
        flow: request.flow,
        model: request.model.clone(),
        db: request.db.clone(),
        refs: request.refs.clone(),
        status: request.status,
        err: None,
        response: None,
        query: None,
        structured_response: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlsql_broker::InMemoryBroker;
    use nlsql_llm::MockLLMClient;
    use nlsql_model::{DbType, InteractiveRequestType, ModelType, RequestId, RequestStatus};
    use nlsql_packs::PromptAssembler;
    use nlsql_store::InMemoryRequestStore;
    use nlsql_warehouse::{CsvResult, Explanation, ExecuteResult, WarehouseClient};
    use serde_json::{json, Map};

    struct StubWarehouse;

    #[async_trait::async_trait]
    impl WarehouseClient for StubWarehouse {
        async fn preflight(&self, _sql: &str) -> nlsql_warehouse::Result<Explanation> {
            Ok(Explanation {
                rows: 1,
                parts: 1,
                marks: 1,
                raw: Map::new(),
            })
        }
        async fn count(&self, _sql: &str) -> nlsql_warehouse::Result<u64> {
            Ok(0)
        }
        async fn execute(&self, _sql: &str, _limit: u32, _offset: u32) -> nlsql_warehouse::Result<ExecuteResult> {
            Ok(ExecuteResult {
                rows: vec![],
                total_count: 0,
            })
        }
        async fn execute_csv(&self, _sql: &str) -> nlsql_warehouse::Result<CsvResult> {
            Ok(CsvResult {
                csv: None,
                row_count: 0,
                rows: Some(vec![]),
            })
        }
    }
    fn planner_only_assembler() -> PromptAssembler {
        let mut tree = nlsql_packs::EffectiveTree::new();
        tree.insert(
            "slots/planner.tera".to_string(),
            b"You are the planner. Classify the user's request.".to_vec(),
        );
        PromptAssembler::new(
            "test-pack".to_string(),
            tree,
            nlsql_packs::Manifest {
                version: "1".to_string(),
                pack_name: None,
                target_component: None,
                dependencies: vec![],
                slots: Default::default(),
                license: None,
                provenance: None,
            },
            vec![],
        )
    }

    fn runner_with(store: Arc<dyn RequestStore>, llm: MockLLMClient) -> (FlowRunner, Arc<dyn TaskBroker>) {
        let broker: Arc<dyn TaskBroker> = Arc::new(InMemoryBroker::new());
        let ctx = FlowContext {
            store,
            llm: Arc::new(llm),
            warehouse: Arc::new(StubWarehouse),
            assembler: Arc::new(planner_only_assembler()),
            chart: Arc::new(crate::NullChartService),
            max_steps: 3,
        };
        let runner = FlowRunner::new(ctx, broker.clone(), "interactive");
        (runner, broker)
    }

    #[tokio::test]
    async fn unknown_flow_for_empty_model_and_db_with_no_legacy_entry() {
        let store: Arc<dyn RequestStore> = Arc::new(InMemoryRequestStore::new());
        let (runner, _broker) = runner_with(store, MockLLMClient::new());

        let wr = WorkerRequest {
            request_id: RequestId::new(),
            session_id: SessionId::new(),
            parent_session_id: None,
            user: "alice".to_string(),
            request: "hi".to_string(),
            request_type: InteractiveRequestType::Tbd,
            flow: FlowType::LangGraph,
            model: ModelType(String::new()),
            db: DbType(String::new()),
            refs: None,
            status: RequestStatus::New,
            err: None,
            response: None,
            query: None,
            structured_response: None,
        };

        let err = runner.select_flow(wr.flow, &wr).unwrap_err();
        assert!(matches!(err, Error::UnknownFlow { .. }));
    }

    #[tokio::test]
    async fn general_chat_request_persists_response_and_status() {
        let store: Arc<dyn RequestStore> = Arc::new(InMemoryRequestStore::new());
        let session = store
            .add_session("alice", "s1", vec![], None, None)
            .await
            .unwrap();

        let llm = MockLLMClient::new();
        llm.push_structured(json!({
            "request_type": "general_chat",
            "intent": "chit_chat",
            "response": "Hello there!",
        }));

        let (runner, _broker) = runner_with(store.clone(), llm);

        let (request, _task_id) = store
            .add_request(
                "alice",
                session.id,
                NewRequestFields {
                    request: "hi".to_string(),
                    request_type: InteractiveRequestType::Tbd,
                    flow: FlowType::Interactive,
                    model: ModelType("gpt".to_string()),
                    db: DbType("default".to_string()),
                    refs: None,
                },
            )
            .await
            .unwrap();

        let wr = worker_request_from(&request, "alice", None);
        runner.run_request(wr).await.unwrap();

        let stored = store.get_request_by_id(request.request_id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Done);
        assert_eq!(stored.response.as_deref(), Some("Hello there!"));
    }
}
