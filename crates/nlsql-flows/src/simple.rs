//! `SimpleFlow`: the legacy single-shot path. One unstructured LLM call
//! asking for a fenced SQL block, one warehouse round trip, no retry loop.
//!
//! Grounded in `original_source/apps/fm-app/fm_app/workers/simple_flow.py`.

use async_trait::async_trait;
use nlsql_llm::Message;
use nlsql_model::{
    ColumnDescriptor, CreateQueryFields, QueryMetadata, RequestStatus, StructuredResponse,
    WorkerRequest,
};
use regex::Regex;
use serde_json::Value;

use crate::context::planner_variables;
use crate::{Flow, FlowContext};

pub struct SimpleFlow;

#[async_trait]
impl Flow for SimpleFlow {
    async fn run(&self, mut wr: WorkerRequest, ctx: &FlowContext) -> WorkerRequest {
        wr.status = RequestStatus::InProgress;

        let session = match ctx.store.get_session(wr.session_id).await {
            Ok(session) => session,
            Err(err) => return fail(wr, err.to_string()),
        };

        let material = match ctx
            .assembler
            .render_async(
                "legacy_simple_request",
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
        let completion = match ctx.llm.complete(&messages).await {
            Ok(text) => text,
            Err(err) => return fail(wr, err.to_string()),
        };

        let sql = match first_sql_fence(&completion) {
            Some(sql) => sql,
            None => return fail(wr, "LLM response did not contain a ```sql``` block".to_string()),
        };
        crate::validate::check_syntax(&sql);

        wr.status = RequestStatus::DataFetch;
        if let Err(err) = ctx.warehouse.preflight(&sql).await {
            return fail(wr, format!("preflight rejected query: {err}"));
        }

        let csv_result = match ctx.warehouse.execute_csv(&sql).await {
            Ok(result) => result,
            Err(err) => return fail(wr, err.to_string()),
        };

        let row_count = csv_result.row_count as i64;
        let columns: Vec<ColumnDescriptor> = csv_result
            .rows
            .as_ref()
            .and_then(|rows| rows.first())
            .map(|row| {
                let mut names: Vec<&String> = row.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .map(|name| ColumnDescriptor {
                        name: name.clone(),
                        data_type: None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let query = match ctx
            .store
            .create_query(CreateQueryFields {
                request: wr.request.clone(),
                intent: None,
                summary: None,
                description: None,
                sql: sql.clone(),
                row_count: Some(row_count),
                columns: columns.clone(),
                ai_generated: true,
                ai_context: None,
                data_source: wr.db.0.clone(),
                db_dialect: "clickhouse".to_string(),
                explanation: None,
                err: None,
                parent_id: None,
            })
            .await
        {
            Ok(query) => query,
            Err(err) => return fail(wr, err.to_string()),
        };

        let (raw_data_labels, raw_data_rows, csv) = match &csv_result.rows {
            Some(rows) => {
                let labels: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
                let table: Vec<Vec<Value>> = rows
                    .iter()
                    .map(|row| {
                        labels
                            .iter()
                            .map(|name| row.get(name).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect();
                (Some(labels), Some(table), csv_result.csv.clone())
            }
            None => (None, None, None),
        };

        let material = match ctx
            .assembler
            .render_async(
                "legacy_simple_response",
                planner_variables(&wr, &session, None),
                Value::Null,
                Value::Null,
            )
            .await
        {
            Ok(material) => material,
            Err(err) => return fail(wr, err.to_string()),
        };

        wr.status = RequestStatus::Finalizing;
        wr.response = Some(material.prompt_text);
        wr.structured_response = Some(StructuredResponse {
            sql: Some(sql),
            raw_data_labels,
            raw_data_rows,
            csv,
            metadata: Some(QueryMetadata {
                id: Some(query.query_id),
                row_count: Some(row_count),
                columns: Some(columns),
                ..Default::default()
            }),
            ..Default::default()
        });
        wr.status = RequestStatus::Done;
        wr
    }
}

fn first_sql_fence(text: &str) -> Option<String> {
    let re = Regex::new(r"(?is)```sql\s*\n?(.*?)```").ok()?;
    re.captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty())
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
    fn extracts_first_fenced_sql_block() {
        let text = "Sure, here you go:\n```sql\nSELECT 1\n```\nLet me know if you need more.";
        assert_eq!(first_sql_fence(text), Some("SELECT 1".to_string()));
    }

    #[test]
    fn missing_fence_yields_none() {
        assert_eq!(first_sql_fence("no code here"), None);
    }

    #[test]
    fn only_the_first_fence_is_taken() {
        let text = "```sql\nSELECT 1\n```\n```sql\nSELECT 2\n```";
        assert_eq!(first_sql_fence(text), Some("SELECT 1".to_string()));
    }
}
