//! `LangGraphFlow`: the LLM proposes a typed `ExecutionPipeline` of named,
//! dependency-linked steps; this flow assigns each a deterministic id
//! (hashed from its own SQL/summary, not whatever the LLM suggested) and
//! runs the resulting DAG with a small topological executor.
//!
//! Grounded in `original_source/apps/fm-app/fm_app/workers/langgraph_flow.py`.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use nlsql_llm::Message;
use nlsql_model::{CreateQueryFields, QueryMetadata, RequestStatus, StructuredResponse, WorkerRequest};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::context::planner_variables;
use crate::{Flow, FlowContext};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
struct PlannedStep {
    name: String,
    summary: String,
    sql: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
struct ExecutionPlan {
    steps: Vec<PlannedStep>,
}

/// A `PlannedStep` with its name resolved to a content-derived slice id,
/// so the same (sql, summary) pair always yields the same id regardless
/// of what the model happened to call it.
struct ResolvedStep {
    slice_id: String,
    sql: String,
    depends_on: Vec<String>,
}

pub struct LangGraphFlow;

#[async_trait]
impl Flow for LangGraphFlow {
    async fn run(&self, mut wr: WorkerRequest, ctx: &FlowContext) -> WorkerRequest {
        wr.status = RequestStatus::InProgress;

        let session = match ctx.store.get_session(wr.session_id).await {
            Ok(session) => session,
            Err(err) => return fail(wr, err.to_string()),
        };

        let material = match ctx
            .assembler
            .render_async(
                "langgraph_plan",
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
        let schema = serde_json::to_value(schemars::schema_for!(ExecutionPlan)).unwrap_or_else(|_| json!({}));
        let value = match ctx.llm.complete_structured(&messages, &schema, None).await {
            Ok(value) => value,
            Err(err) => return fail(wr, err.to_string()),
        };
        let plan: ExecutionPlan = match serde_json::from_value(value) {
            Ok(plan) => plan,
            Err(err) => return fail(wr, format!("malformed execution plan from LLM: {err}")),
        };
        if plan.steps.is_empty() {
            return fail(wr, "execution plan had no steps".to_string());
        }

        let name_to_id: HashMap<String, String> = plan
            .steps
            .iter()
            .map(|step| (step.name.clone(), slice_id(&step.sql, &step.summary)))
            .collect();
        let steps: Vec<ResolvedStep> = plan
            .steps
            .iter()
            .map(|step| ResolvedStep {
                slice_id: name_to_id[&step.name].clone(),
                sql: step.sql.clone(),
                depends_on: step
                    .depends_on
                    .iter()
                    .filter_map(|dep| name_to_id.get(dep).cloned())
                    .collect(),
            })
            .collect();

        wr.status = RequestStatus::DataFetch;
        let order = match topological_order(&steps) {
            Ok(order) => order,
            Err(cycle_member) => {
                return fail(
                    wr,
                    format!("execution plan has a dependency cycle involving `{cycle_member}`"),
                )
            }
        };

        let depended_on: HashSet<&str> = steps
            .iter()
            .flat_map(|step| step.depends_on.iter().map(String::as_str))
            .collect();
        let sink_ids: Vec<&str> = steps
            .iter()
            .map(|step| step.slice_id.as_str())
            .filter(|id| !depended_on.contains(id))
            .collect();
        if sink_ids.len() > 1 {
            tracing::warn!(
                sinks = sink_ids.len(),
                "execution plan has multiple terminal steps; using the last one in topological order"
            );
        }
        let final_id = match order.iter().rev().find(|id| sink_ids.contains(&id.as_str())) {
            Some(id) => id.clone(),
            None => order.last().cloned().unwrap(),
        };

        let by_id: HashMap<&str, &ResolvedStep> =
            steps.iter().map(|step| (step.slice_id.as_str(), step)).collect();

        for slice_id in &order {
            let step = by_id[slice_id.as_str()];
            crate::validate::check_syntax(&step.sql);
            if *slice_id == final_id {
                continue;
            }
            if let Err(err) = ctx.warehouse.preflight(&step.sql).await {
                return fail(wr, format!("step `{slice_id}` failed preflight: {err}"));
            }
            if let Err(err) = ctx.warehouse.execute(&step.sql, 1, 0).await {
                return fail(wr, format!("step `{slice_id}` failed to execute: {err}"));
            }
        }

        let final_step = by_id[final_id.as_str()];
        let csv_result = match ctx.warehouse.execute_csv(&final_step.sql).await {
            Ok(result) => result,
            Err(err) => return fail(wr, err.to_string()),
        };

        let query = match ctx
            .store
            .create_query(CreateQueryFields {
                request: wr.request.clone(),
                sql: final_step.sql.clone(),
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
            sql: Some(final_step.sql.clone()),
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

fn slice_id(sql: &str, summary: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hasher.update([0u8]);
    hasher.update(summary.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Kahn's algorithm. Returns the cycle member's id as `Err` if the graph
/// isn't a DAG.
fn topological_order(steps: &[ResolvedStep]) -> Result<Vec<String>, String> {
    let mut in_degree: HashMap<&str, usize> =
        steps.iter().map(|s| (s.slice_id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in steps {
        for dep in &step.depends_on {
            *in_degree.entry(step.slice_id.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(step.slice_id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(steps.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        if let Some(children) = dependents.get(id) {
            for child in children {
                let degree = in_degree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if order.len() != steps.len() {
        let stuck = steps
            .iter()
            .map(|s| s.slice_id.as_str())
            .find(|id| !order.contains(&id.to_string()))
            .unwrap_or("unknown");
        return Err(stuck.to_string());
    }
    Ok(order)
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
    fn topological_order_respects_dependencies() {
        let a = ResolvedStep {
            slice_id: "a".to_string(),
            sql: "SELECT 1".to_string(),
            depends_on: vec![],
        };
        let b = ResolvedStep {
            slice_id: "b".to_string(),
            sql: "SELECT 2".to_string(),
            depends_on: vec!["a".to_string()],
        };
        let order = topological_order(&[b, a]).unwrap();
        assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn cycle_is_rejected() {
        let a = ResolvedStep {
            slice_id: "a".to_string(),
            sql: "SELECT 1".to_string(),
            depends_on: vec!["b".to_string()],
        };
        let b = ResolvedStep {
            slice_id: "b".to_string(),
            sql: "SELECT 2".to_string(),
            depends_on: vec!["a".to_string()],
        };
        assert!(topological_order(&[a, b]).is_err());
    }

    #[test]
    fn slice_id_is_deterministic() {
        assert_eq!(slice_id("SELECT 1", "x"), slice_id("SELECT 1", "x"));
        assert_ne!(slice_id("SELECT 1", "x"), slice_id("SELECT 2", "x"));
    }
}
