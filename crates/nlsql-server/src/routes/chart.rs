//! `/chart` upload and `/chart/{file}` retrieval, backed by `LocalChartStore`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chart", post(create_chart))
        .route("/chart/:file", get(get_chart))
}

#[derive(Debug, Deserialize)]
struct CreateChartBody {
    code: String,
}

async fn create_chart(
    State(state): State<AppState>,
    Json(body): Json<CreateChartBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let file_name = state
        .chart
        .store(&body.code)
        .await
        .map_err(|err| ApiError::ChartRenderFailed(err.to_string()))?;
    Ok(Json(json!({ "url": format!("/chart/{file_name}") })))
}

async fn get_chart(State(state): State<AppState>, Path(file): Path<String>) -> ApiResult<Response> {
    let bytes = state
        .chart
        .fetch(&file)
        .await
        .map_err(|err| ApiError::ChartNotFound(err.to_string()))?;
    Ok((StatusCode::OK, Bytes::from(bytes)).into_response())
}
