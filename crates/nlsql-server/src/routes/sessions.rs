//! `/session` and `/session/{id}` handlers, plus the `linked` session
//! creation path used by clients that want to start a drill-down without
//! waiting for `InteractiveFlow`'s own `linked_session` branch.

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use nlsql_model::{AddLinkedRequest, Session};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::requests::{build_worker_request, enqueue_payload};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_session).get(list_sessions))
        .route("/session/:id", get(get_session).patch(patch_session))
        .route("/session/:session_id/linked", post(create_linked_request))
}

#[derive(Debug, Deserialize)]
struct CreateSessionBody {
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    parent: Option<Uuid>,
    #[serde(default)]
    refs: Option<Value>,
}

async fn create_session(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(body): Json<CreateSessionBody>,
) -> ApiResult<Json<Session>> {
    let session = state
        .store
        .add_session(
            &claims.user,
            &body.name,
            body.tags,
            body.parent.map(nlsql_model::SessionId::from_uuid),
            body.refs,
        )
        .await?;
    Ok(Json(session))
}

async fn list_sessions(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> ApiResult<Json<Vec<Session>>> {
    let sessions = state.store.list_sessions(&claims.user).await?;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Session>> {
    let session = state
        .store
        .get_session(nlsql_model::SessionId::from_uuid(id))
        .await?;
    ensure_owner(&claims.user, &session)?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
struct PatchSessionBody {
    /// The only session field the persistence layer exposes a targeted
    /// update for today; other partial-update fields in the spec's body
    /// shape are accepted and ignored rather than rejected.
    #[serde(default)]
    name: Option<String>,
}

async fn patch_session(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<PatchSessionBody>,
) -> ApiResult<Json<Session>> {
    let session_id = nlsql_model::SessionId::from_uuid(id);
    let existing = state.store.get_session(session_id).await?;
    ensure_owner(&claims.user, &existing)?;

    let session = match body.name {
        Some(name) => {
            state
                .store
                .update_session_name(session_id, &claims.user, name)
                .await?
        }
        None => existing,
    };
    Ok(Json(session))
}

async fn create_linked_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(parent_session_id): Path<Uuid>,
    Json(body): Json<AddLinkedRequest>,
) -> ApiResult<Json<nlsql_model::Request>> {
    let parent_session_id = nlsql_model::SessionId::from_uuid(parent_session_id);
    let parent = state.store.get_session(parent_session_id).await?;
    ensure_owner(&claims.user, &parent)?;

    let child = state
        .store
        .add_session(
            &claims.user,
            body.name.as_deref().unwrap_or(&parent.name),
            if body.tags.is_empty() {
                parent.tags.clone()
            } else {
                body.tags.clone()
            },
            Some(parent_session_id),
            parent.refs.clone(),
        )
        .await?;

    let (request, task_id) = state
        .store
        .add_request(
            &claims.user,
            child.id,
            nlsql_store::NewRequestFields {
                request: body.request,
                request_type: body.request_type,
                flow: body.flow,
                model: body.model,
                db: body.db,
                refs: body.refs,
            },
        )
        .await?;

    let worker_request = build_worker_request(&request, &claims.user, Some(parent_session_id), None);
    state
        .broker
        .enqueue(crate::state::ADD_REQUEST_TASK, enqueue_payload(&worker_request)?, task_id)
        .await?;

    Ok(Json(request))
}

pub(crate) fn ensure_owner(user: &str, session: &Session) -> ApiResult<()> {
    if session.user_owner != user {
        return Err(ApiError::BadRequest(
            "session is not owned by the authenticated user".to_string(),
        ));
    }
    Ok(())
}
