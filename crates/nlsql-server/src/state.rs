//! Shared application state threaded through every handler via axum's
//! `State` extractor. Constructed once in `main` from `Settings` and
//! cloned (cheaply, via `Arc` fields) into the router.

use std::sync::Arc;

use nlsql_broker::TaskBroker;
use nlsql_query::QueryService;
use nlsql_store::RequestStore;
use nlsql_warehouse::WarehouseClient;

use crate::auth::TokenVerifier;
use crate::chart::LocalChartStore;

/// The one task name this service's broker dispatches; worker and HTTP
/// layer must agree on it so `enqueue`/`consume` pair up.
pub const ADD_REQUEST_TASK: &str = "wrk_add_request";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RequestStore>,
    pub broker: Arc<dyn TaskBroker>,
    pub warehouse: Arc<dyn WarehouseClient>,
    pub query_service: Arc<QueryService>,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub chart: Arc<LocalChartStore>,
}
