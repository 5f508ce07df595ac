//! Aggregates every route module into one `Router<AppState>`.

mod admin;
mod chart;
mod health;
mod queries;
mod requests;
mod sessions;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(sessions::routes())
        .merge(requests::routes())
        .merge(queries::routes())
        .merge(admin::routes())
        .merge(chart::routes())
}
