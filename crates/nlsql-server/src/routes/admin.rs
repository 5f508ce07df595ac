//! Admin-scoped listings across every user's sessions and requests.
//! Gated by the `admin:sessions`/`admin:requests` bearer scopes rather
//! than session ownership.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use nlsql_model::{Request, Session};

use crate::auth::{AdminRequests, AdminSessions, RequireScope};
use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/sessions", get(list_all_sessions))
        .route("/admin/requests", get(list_all_requests))
}

async fn list_all_sessions(
    State(state): State<AppState>,
    _scope: RequireScope<AdminSessions>,
) -> ApiResult<Json<Vec<Session>>> {
    let sessions = state.store.list_all_sessions().await?;
    Ok(Json(sessions))
}

async fn list_all_requests(
    State(state): State<AppState>,
    _scope: RequireScope<AdminRequests>,
) -> ApiResult<Json<Vec<Request>>> {
    let requests = state.store.list_all_requests().await?;
    Ok(Json(requests))
}
