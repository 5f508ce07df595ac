//! `/query` listing, single-`Query` lookup, and the paginated `/data/{id}`
//! path that carries `QueryService`'s caching contract out to HTTP headers.

use axum::extract::{Path, Query as QueryParams, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use nlsql_model::{Query, QueryId, SortOrder};
use nlsql_query::{CACHE_CONTROL, VARY};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/query", get(list_queries))
        .route("/query/:id", get(get_query))
        .route("/data/:query_id", get(get_data))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_limit() -> u32 {
    50
}

async fn list_queries(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    QueryParams(page): QueryParams<PageParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let (queries, total_count) = state.store.list_queries(page.limit, page.offset).await?;
    Ok(Json(json!({
        "queries": queries,
        "limit": page.limit,
        "offset": page.offset,
        "total_count": total_count,
    })))
}

async fn get_query(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Query>> {
    let query = state.store.get_query_by_id(QueryId::from_uuid(id)).await?;
    Ok(Json(query))
}

#[derive(Debug, Deserialize)]
struct DataParams {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default)]
    sort_order: Option<SortOrder>,
}

async fn get_data(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(query_id): Path<Uuid>,
    QueryParams(params): QueryParams<DataParams>,
) -> ApiResult<Response> {
    let page = state
        .query_service
        .get_data(
            &claims.user,
            query_id,
            params.limit,
            params.offset,
            params.sort_by,
            params.sort_order,
        )
        .await?;

    let body = Json(json!({
        "query_id": query_id,
        "limit": page.limit,
        "offset": page.offset,
        "rows": page.rows,
        "total_rows": page.total_count,
    }));

    let mut headers = HeaderMap::new();
    headers.insert(axum::http::header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    headers.insert(axum::http::header::VARY, HeaderValue::from_static(VARY));
    if let Ok(etag) = HeaderValue::from_str(&page.etag) {
        headers.insert(axum::http::header::ETAG, etag);
    }

    Ok((StatusCode::OK, headers, body).into_response())
}
