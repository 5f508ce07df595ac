//! `FlexFlow`: try a single SQL statement first; if the warehouse rejects
//! it as too broad, ask the LLM to decompose the request into an ordered
//! pipeline of smaller stages and run them in sequence.
//!
//! Grounded in `original_source/apps/fm-app/fm_app/workers/flex_flow.py`.

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

/// One stage of a decomposed pipeline. `name` carries the original's stage
/// markers (`query_initial_data`, `insert_initial_data`, ..., `final`)
/// verbatim; only the literal value `"final"` is treated specially by
/// this flow, as its result is what gets returned to the user.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
struct PipelineStage {
    name: String,
    sql: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
struct FlexPipeline {
    stages: Vec<PipelineStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    commentary: Option<String>,
}

pub struct FlexFlow;

#[async_trait]
impl Flow for FlexFlow {
    async fn run(&self, mut wr: WorkerRequest, ctx: &FlowContext) -> WorkerRequest {
        wr.status = RequestStatus::InProgress;

        let session = match ctx.store.get_session(wr.session_id).await {
            Ok(session) => session,
            Err(err) => return fail(wr, err.to_string()),
        };

        let material = match ctx
            .assembler
            .render_async(
                "flex_request",
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
        let mut messages = vec![
            Message::system(material.prompt_text),
            Message::user(wr.request.clone()),
        ];
        let sql_schema = serde_json::to_value(schemars::schema_for!(SqlOnly)).unwrap_or_else(|_| json!({}));
        let value = match ctx.llm.complete_structured(&messages, &sql_schema, None).await {
            Ok(value) => value,
            Err(err) => return fail(wr, err.to_string()),
        };
        let sql: SqlOnly = match serde_json::from_value(value) {
            Ok(sql) => sql,
            Err(err) => return fail(wr, format!("malformed SQL response from LLM: {err}")),
        };
        crate::validate::check_syntax(&sql.sql);

        wr.status = RequestStatus::DataFetch;
        match ctx.warehouse.preflight(&sql.sql).await {
            Ok(_) => {
                let data_source = wr_db(&wr);
                finish_single_stage(wr, ctx, &sql.sql, &data_source).await
            }
            Err(preflight_err) => {
                messages.push(Message::system(format!(
                    "The query `{}` was rejected as too broad by preflight: {preflight_err}. \
                     Decompose it into an ordered pipeline of smaller stages (each named, with the \
                     final stage named \"final\") that together produce the same answer.",
                    sql.sql
                )));
                let pipeline_schema =
                    serde_json::to_value(schemars::schema_for!(FlexPipeline)).unwrap_or_else(|_| json!({}));
                let value = match ctx
                    .llm
                    .complete_structured(&messages, &pipeline_schema, None)
                    .await
                {
                    Ok(value) => value,
                    Err(err) => return fail(wr, err.to_string()),
                };
                let pipeline: FlexPipeline = match serde_json::from_value(value) {
                    Ok(pipeline) => pipeline,
                    Err(err) => {
                        return fail(wr, format!("malformed pipeline response from LLM: {err}"))
                    }
                };
                run_pipeline(wr, ctx, pipeline).await
            }
        }
    }
}

fn wr_db(wr: &WorkerRequest) -> String {
    wr.db.0.clone()
}

async fn finish_single_stage(
    mut wr: WorkerRequest,
    ctx: &FlowContext,
    sql: &str,
    data_source: &str,
) -> WorkerRequest {
    let csv_result = match ctx.warehouse.execute_csv(sql).await {
        Ok(result) => result,
        Err(err) => return fail(wr, err.to_string()),
    };
    let query = match ctx
        .store
        .create_query(CreateQueryFields {
            request: wr.request.clone(),
            sql: sql.to_string(),
            row_count: Some(csv_result.row_count as i64),
            ai_generated: true,
            data_source: data_source.to_string(),
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
        sql: Some(sql.to_string()),
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

async fn run_pipeline(wr: WorkerRequest, ctx: &FlowContext, pipeline: FlexPipeline) -> WorkerRequest {
    if pipeline.stages.is_empty() {
        return fail(wr, "decomposed pipeline had no stages".to_string());
    }

    let data_source = wr_db(&wr);
    let mut final_sql: Option<String> = None;
    for stage in &pipeline.stages {
        crate::validate::check_syntax(&stage.sql);
        if stage.name == "final" {
            final_sql = Some(stage.sql.clone());
            break;
        }
        if let Err(err) = ctx.warehouse.preflight(&stage.sql).await {
            return fail(
                wr,
                format!("pipeline stage `{}` failed preflight: {err}", stage.name),
            );
        }
        if let Err(err) = ctx.warehouse.execute(&stage.sql, 1, 0).await {
            return fail(
                wr,
                format!("pipeline stage `{}` failed to execute: {err}", stage.name),
            );
        }
    }

    let sql = match final_sql {
        Some(sql) => sql,
        None => return fail(wr, "decomposed pipeline had no stage named \"final\"".to_string()),
    };

    let mut finished = finish_single_stage(wr, ctx, &sql, &data_source).await;
    if finished.status == RequestStatus::Done {
        if let Some(response) = &mut finished.structured_response {
            response.description = pipeline.commentary.clone();
        }
        finished.response = pipeline.commentary;
    }
    finished
}

fn fail(mut wr: WorkerRequest, message: String) -> WorkerRequest {
    wr.status = RequestStatus::Error;
    wr.err = Some(message);
    wr
}
