//! Prompt-variable assembly shared by the flows that render slots through
//! `PromptAssembler`: the pieces of request/session state every template
//! might want, collected once per flow invocation.

use chrono::Utc;
use nlsql_model::{IntentAnalysis, InteractiveRequestType, QueryId, QueryMetadata, Session, WorkerRequest};
use serde_json::{json, Value};

/// Render variables common to every slot `InteractiveFlow` and
/// `DataAnalysis` touch: the session's own (or a freshly allocated)
/// query metadata, the parent session's metadata if linked, the row/column
/// selection carried on the request, a natural-language intent hint
/// derived from the request's classification, and wall-clock time at
/// second resolution so prompts can reason about recency.
pub fn planner_variables(
    request: &WorkerRequest,
    session: &Session,
    parent_session: Option<&Session>,
) -> Value {
    let query_metadata = session.metadata.clone().unwrap_or_else(|| QueryMetadata {
        id: Some(QueryId::new()),
        ..Default::default()
    });
    let parent_query_metadata = parent_session.and_then(|s| s.metadata.clone());

    let (selected_row_data, selected_column_data) = match &request.refs {
        Some(refs) => (refs.rows.clone(), refs.cols.clone()),
        None => (None, None),
    };

    json!({
        "request": request.request,
        "query_metadata": query_metadata,
        "parent_query_metadata": parent_query_metadata,
        "seeded_query": request.query,
        "selected_row_data": selected_row_data,
        "selected_column_data": selected_column_data,
        "intent_hint": intent_hint(request.request_type),
        "now": now_seconds(),
    })
}

/// `planner_variables` plus the now-known intent, for the slots rendered
/// after intent classification (`interactive_query`, and `data_analysis`'s
/// reuse of the same slot).
pub fn query_variables(
    request: &WorkerRequest,
    session: &Session,
    parent_session: Option<&Session>,
    intent: &IntentAnalysis,
) -> Value {
    let mut vars = planner_variables(request, session, parent_session);
    if let Value::Object(ref mut map) = vars {
        map.insert("intent".to_string(), json!(intent.intent));
        map.insert("intent_description".to_string(), json!(intent.description));
    }
    vars
}

fn intent_hint(request_type: InteractiveRequestType) -> &'static str {
    match request_type {
        InteractiveRequestType::LinkedSession => "linked_session",
        InteractiveRequestType::InteractiveQuery => "interactive_query",
        InteractiveRequestType::DataAnalysis => "data_analysis",
        InteractiveRequestType::GeneralChat => "general_chat",
        InteractiveRequestType::Disambiguation => "disambiguation",
        InteractiveRequestType::Tbd | InteractiveRequestType::Unknown => "unknown",
    }
}

fn now_seconds() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
