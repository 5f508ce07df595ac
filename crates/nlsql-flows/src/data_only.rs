//! `DataOnlyFlow`: produce SQL, execute it, hand back CSV. No narrative —
//! the leanest of the flows, intended for programmatic/API-only callers.
//!
//! Grounded in `original_source/apps/fm-app/fm_app/workers/data_only_flow.py`.

use async_trait::async_trait;
use nlsql_llm::Message;
use nlsql_model::{CreateQueryFields, QueryMetadata, RequestStatus, StructuredResponse, WorkerRequest};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::planner_variables;
use crate::{Flow, FlowContext};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
struct SqlOnly {
    sql: String,
}

pub struct DataOnlyFlow;

#[async_trait]
impl Flow for DataOnlyFlow {
    async fn run(&self, mut wr: WorkerRequest, ctx: &FlowContext) -> WorkerRequest {
        wr.status = RequestStatus::InProgress;

        let session = match ctx.store.get_session(wr.session_id).await {
            Ok(session) => session,
            Err(err) => return fail(wr, err.to_string()),
        };

        let material = match ctx
            .assembler
            .render_async(
                "data_only_request",
                planner_variables(&wr, &session, None),
                Value::Null,
                Value::Null,
            )
            .await
        {
            Ok(material) => material,
            Err(err) => return fail(wr, err.to_string()),
        };

        wr.status = RequestStatus::Sql;
        let messages = vec![
            Message::system(material.prompt_text),
            Message::user(wr.request.clone()),
        ];
        let schema = serde_json::to_value(schemars::schema_for!(SqlOnly)).unwrap_or_else(|_| json!({}));
        let value = match ctx.llm.complete_structured(&messages, &schema, None).await {
            Ok(value) => value,
            Err(err) => return fail(wr, err.to_string()),
        };
        let sql: SqlOnly = match serde_json::from_value(value) {
            Ok(sql) => sql,
            Err(err) => return fail(wr, format!("malformed SQL response from LLM: {err}")),
        };
        crate::validate::check_syntax(&sql.sql);

        wr.status = RequestStatus::DataFetch;
        if let Err(err) = ctx.warehouse.preflight(&sql.sql).await {
            return fail(wr, format!("preflight rejected query: {err}"));
        }
        let csv_result = match ctx.warehouse.execute_csv(&sql.sql).await {
            Ok(result) => result,
            Err(err) => return fail(wr, err.to_string()),
        };

        let query = match ctx
            .store
            .create_query(CreateQueryFields {
                request: wr.request.clone(),
                sql: sql.sql.clone(),
                row_count: Some(csv_result.row_count as i64),
                ai_generated: true,
                data_source: wr.db.0.clone(),
                db_dialect: "clickhouse".to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(query) => query,
            Err(err) => return fail(wr, err.to_string()),
        };

        wr.status = RequestStatus::Finalizing;
        wr.structured_response = Some(StructuredResponse {
            sql: Some(sql.sql),
            csv: csv_result.csv,
            metadata: Some(QueryMetadata {
                id: Some(query.query_id),
                row_count: Some(csv_result.row_count as i64),
                ..Default::default()
            }),
            ..Default::default()
        });
        wr.status = RequestStatus::Done;
        wr
    }
}

fn fail(mut wr: WorkerRequest, message: String) -> WorkerRequest {
    wr.status = RequestStatus::Error;
    wr.err = Some(message);
    wr
}
