//! `MultistepFlow`: up to `max_steps` turns of structured investigation,
//! each turn optionally issuing SQL and/or chart code, terminating once
//! the model hands back a `response_to_user`.
//!
//! Grounded in `original_source/apps/fm-app/fm_app/workers/multistep_flow.py`.

use async_trait::async_trait;
use nlsql_llm::Message;
use nlsql_model::{RequestStatus, StructuredResponse, WorkerRequest};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::context::planner_variables;
use crate::{Flow, FlowContext};

/// One turn's structured output: the model reports what it did, optionally
/// asks for SQL to be run or a chart to be rendered, and either hands back
/// a final answer or asks to continue.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
struct InvestigationStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sql_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_to_user: Option<String>,
    #[serde(default)]
    next_step_needed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    self_check_passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    additional_data_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rows: Option<Vec<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chart_code: Option<String>,
}

pub struct MultistepFlow;

#[async_trait]
impl Flow for MultistepFlow {
    async fn run(&self, mut wr: WorkerRequest, ctx: &FlowContext) -> WorkerRequest {
        wr.status = RequestStatus::InProgress;

        let session = match ctx.store.get_session(wr.session_id).await {
            Ok(session) => session,
            Err(err) => return fail(wr, err.to_string()),
        };

        let material = match ctx
            .assembler
            .render_async(
                "multistep_investigation",
                planner_variables(&wr, &session, None),
                Value::Null,
                Value::Null,
            )
            .await
        {
            Ok(material) => material,
            Err(err) => return fail(wr, err.to_string()),
        };

        let mut messages = vec![
            Message::system(material.prompt_text),
            Message::user(wr.request.clone()),
        ];
        let schema = serde_json::to_value(schemars::schema_for!(InvestigationStep))
            .unwrap_or_else(|_| json!({}));

        let mut last_step: Option<InvestigationStep> = None;
        for _ in 0..ctx.max_steps {
            wr.status = RequestStatus::Sql;

            let value = match ctx.llm.complete_structured(&messages, &schema, None).await {
                Ok(value) => value,
                Err(err) => return fail(wr, err.to_string()),
            };
            let step: InvestigationStep = match serde_json::from_value(value) {
                Ok(step) => step,
                Err(err) => return fail(wr, format!("malformed InvestigationStep from LLM: {err}")),
            };

            if let Some(summary) = &step.summary {
                messages.push(Message::assistant(summary.clone()));
            }

            if let Some(sql) = step.sql_request.clone() {
                crate::validate::check_syntax(&sql);
                wr.status = RequestStatus::DataFetch;

                match ctx.warehouse.preflight(&sql).await {
                    Ok(_) => match ctx.warehouse.execute_csv(&sql).await {
                        Ok(result) => {
                            let summary_text = match (&result.rows, result.row_count) {
                                (_, 0) => "The query returned no rows.".to_string(),
                                (Some(rows), n) => {
                                    format!("The query returned {n} row(s): {}", rows_preview(rows))
                                }
                                (None, n) => {
                                    format!("The query returned {n} rows, too many to inline.")
                                }
                            };
                            messages.push(Message::system(format!(
                                "Result of `{sql}`: {summary_text}"
                            )));
                        }
                        Err(err) => {
                            messages.push(Message::system(truncate_at_stack_trace(&format!(
                                "Executing `{sql}` failed: {err}"
                            ))));
                        }
                    },
                    Err(err) => {
                        messages.push(Message::system(truncate_at_stack_trace(&format!(
                            "Preflight for `{sql}` failed: {err}"
                        ))));
                    }
                }
            }

            let mut chart_url = None;
            if let Some(code) = &step.chart_code {
                match ctx.chart.render(code).await {
                    Ok(url) => chart_url = Some(url),
                    Err(err) => tracing::warn!(error = %err, "chart render failed; omitting chart"),
                }
            }

            if step.response_to_user.is_some() {
                wr.status = RequestStatus::Finalizing;
                wr.response = step.response_to_user.clone();
                wr.structured_response = Some(StructuredResponse {
                    intro: step.intro.clone(),
                    outro: step.outro.clone(),
                    raw_data_labels: step.labels.clone(),
                    raw_data_rows: step.rows.clone(),
                    chart_url,
                    ..Default::default()
                });
                wr.status = RequestStatus::Done;
                return wr;
            }

            last_step = Some(step);
        }

        wr.status = RequestStatus::Finalizing;
        wr.response = last_step
            .and_then(|step| step.summary)
            .or_else(|| Some("Investigation stopped after reaching the step limit.".to_string()));
        wr.structured_response = Some(StructuredResponse::default());
        wr.status = RequestStatus::Done;
        wr
    }
}

fn rows_preview(rows: &[Map<String, Value>]) -> String {
    rows.iter()
        .take(5)
        .map(|row| {
            let mut keys: Vec<&String> = row.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|k| format!("{k}={}", row[k]))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn truncate_at_stack_trace(message: &str) -> String {
    match message.find("Stack trace") {
        Some(idx) => message[..idx].trim_end().to_string(),
        None => message.to_string(),
    }
}

fn fail(mut wr: WorkerRequest, message: String) -> WorkerRequest {
    wr.status = RequestStatus::Error;
    wr.err = Some(message);
    wr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_before_stack_trace_marker() {
        let message = "DB::Exception: too broad.\nStack trace:\n  at foo()\n  at bar()";
        assert_eq!(
            truncate_at_stack_trace(message),
            "DB::Exception: too broad."
        );
    }

    #[test]
    fn leaves_message_without_marker_untouched() {
        assert_eq!(truncate_at_stack_trace("plain error"), "plain error");
    }
}
