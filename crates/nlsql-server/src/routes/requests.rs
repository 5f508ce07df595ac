//! `/request/*` handlers: enqueuing new turns onto a session, the two
//! query-seeded creation paths the spec calls out by name, and the
//! read/patch/delete paths over a single request row.

use axum::extract::{Path, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use nlsql_model::{
    AddRequest, QueryId, QueryMetadata, Request, RequestId, RequestStatus, SessionId,
    UpdateRequestFields, WorkerRequest,
};
use nlsql_store::NewRequestFields;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::sessions::ensure_owner;
use crate::state::{AppState, ADD_REQUEST_TASK};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/request/:session_id", post(create_request))
        .route(
            "/request/:session_id/for_query/:query_id",
            post(create_request_for_query),
        )
        .route(
            "/request/:session_id/from_query/:query_id",
            post(create_request_from_query),
        )
        .route("/request/:session_id/:seq", get(get_request_by_seq))
        .route("/session/get_requests/:session_id", get(list_requests))
        .route("/request/:id", patch(patch_request).delete(delete_request))
}

async fn create_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(session_id): Path<Uuid>,
    Json(body): Json<AddRequest>,
) -> ApiResult<Json<Request>> {
    let session_id = SessionId::from_uuid(session_id);
    let session = state.store.get_session(session_id).await?;
    ensure_owner(&claims.user, &session)?;

    let (request, _task_id) = state
        .store
        .add_request(
            &claims.user,
            session_id,
            NewRequestFields {
                request: body.request,
                request_type: body.request_type,
                flow: body.flow,
                model: body.model,
                db: body.db,
                refs: body.refs,
            },
        )
        .await?;

    dispatch(&state, &request, &claims.user, None, None).await?;
    Ok(Json(request))
}

/// Seeds the new request's worker context with `query_id`'s metadata but
/// still runs it through the normal flow queue, so the LLM sees the prior
/// query as a starting point rather than having it echoed back verbatim.
async fn create_request_for_query(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((session_id, query_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<AddRequest>,
) -> ApiResult<Json<Request>> {
    let session_id = SessionId::from_uuid(session_id);
    let session = state.store.get_session(session_id).await?;
    ensure_owner(&claims.user, &session)?;

    let query = state.store.get_query_by_id(QueryId::from_uuid(query_id)).await?;

    let (request, _task_id) = state
        .store
        .add_request(
            &claims.user,
            session_id,
            NewRequestFields {
                request: body.request,
                request_type: body.request_type,
                flow: body.flow,
                model: body.model,
                db: body.db,
                refs: body.refs,
            },
        )
        .await?;

    let seeded = QueryMetadata {
        id: Some(query.query_id),
        sql: Some(query.sql),
        summary: query.summary,
        description: query.description,
        columns: Some(query.columns),
        row_count: query.row_count,
        explanation: query.explanation,
        ..Default::default()
    };
    dispatch(&state, &request, &claims.user, None, Some(seeded)).await?;
    Ok(Json(request))
}

/// Bypasses the flow queue entirely: persists a `Done` request carrying
/// `query_id`'s own SQL synchronously, for clients re-running a stored
/// query verbatim rather than asking the LLM to plan a follow-up. Takes no
/// body — everything this route needs already lives on the stored `Query`.
async fn create_request_from_query(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((session_id, query_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Request>> {
    let session_id = SessionId::from_uuid(session_id);
    let session = state.store.get_session(session_id).await?;
    ensure_owner(&claims.user, &session)?;

    let query = state.store.get_query_by_id(QueryId::from_uuid(query_id)).await?;

    let (request, _task_id) = state
        .store
        .add_request(
            &claims.user,
            session_id,
            NewRequestFields {
                request: query.request.clone(),
                request_type: nlsql_model::InteractiveRequestType::DataAnalysis,
                flow: nlsql_model::FlowType::DataOnly,
                model: nlsql_model::ModelType(String::new()),
                db: nlsql_model::DbType(query.db_dialect.clone()),
                refs: None,
            },
        )
        .await?;

    let mut fields = UpdateRequestFields::new(request.request_id);
    fields.status = Some(RequestStatus::Done);
    fields.sql = Some(query.sql);
    fields.query_id = Some(query.query_id);
    fields.intent = query.intent;
    fields.assumptions = query.description.clone();
    let updated = state.store.update_request(fields).await?;
    Ok(Json(updated))
}

async fn get_request_by_seq(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((session_id, seq)): Path<(Uuid, u32)>,
) -> ApiResult<Json<Request>> {
    let session_id = SessionId::from_uuid(session_id);
    let session = state.store.get_session(session_id).await?;
    ensure_owner(&claims.user, &session)?;
    let request = state.store.get_request(&claims.user, session_id, seq).await?;
    Ok(Json(request))
}

async fn list_requests(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Request>>> {
    let session_id = SessionId::from_uuid(session_id);
    let session = state.store.get_session(session_id).await?;
    ensure_owner(&claims.user, &session)?;
    let requests = state.store.list_requests(session_id).await?;
    Ok(Json(requests))
}

#[derive(Debug, Default, Deserialize)]
struct PatchRequestBody {
    #[serde(default)]
    status: Option<RequestStatus>,
    #[serde(default)]
    rating: Option<i32>,
    #[serde(default)]
    review: Option<String>,
}

async fn patch_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<PatchRequestBody>,
) -> ApiResult<Json<Request>> {
    let request_id = RequestId::from_uuid(id);
    let existing = state.store.get_request_by_id(request_id).await?;
    let session = state.store.get_session(existing.session_id).await?;
    ensure_owner(&claims.user, &session)?;

    let mut fields = UpdateRequestFields::new(request_id);
    fields.status = body.status;
    fields.rating = body.rating;
    fields.review = body.review;
    let updated = state.store.update_request(fields).await?;
    Ok(Json(updated))
}

async fn delete_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let request_id = RequestId::from_uuid(id);
    let session_id = state
        .store
        .delete_request_revert(request_id, &claims.user)
        .await?;
    Ok(Json(serde_json::json!({ "session_id": session_id })))
}

async fn dispatch(
    state: &AppState,
    request: &Request,
    user: &str,
    parent_session_id: Option<SessionId>,
    query: Option<QueryMetadata>,
) -> ApiResult<()> {
    let worker_request = build_worker_request(request, user, parent_session_id, query);
    let payload = enqueue_payload(&worker_request)?;
    state
        .broker
        .enqueue(ADD_REQUEST_TASK, payload, request.task_id)
        .await?;
    Ok(())
}

pub(crate) fn build_worker_request(
    request: &Request,
    user: &str,
    parent_session_id: Option<SessionId>,
    query: Option<QueryMetadata>,
) -> WorkerRequest {
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
        query,
        structured_response: None,
    }
}

pub(crate) fn enqueue_payload(worker_request: &WorkerRequest) -> ApiResult<Value> {
    serde_json::to_value(worker_request)
        .map_err(|err| ApiError::BadRequest(format!("could not serialize worker request: {err}")))
}
