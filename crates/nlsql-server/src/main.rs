//! HTTP surface and worker bootstrap for the NL-to-SQL analytics service.
//! Wires `Settings` into the store/broker/warehouse/LLM/pack collaborators,
//! spawns the flow worker pool, and serves the axum router until a signal
//! asks it to shut down.

mod auth;
mod chart;
mod config;
mod error;
mod metrics;
mod packs;
mod routes;
mod state;
mod worker;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::Response;
use nlsql_broker::{InMemoryBroker, TaskBroker};
use nlsql_flows::{ChartService, FlowContext};
use nlsql_llm::{HttpLLMClient, LLMClient, MockLLMClient};
use nlsql_query::QueryService;
use nlsql_store::{InMemoryRequestStore, RequestStore};
use nlsql_warehouse::{ClickHouseWarehouse, WarehouseClient};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::auth::{StaticTokenVerifier, TokenVerifier};
use crate::chart::LocalChartStore;
use crate::config::Settings;
use crate::state::AppState;

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("nlsql_server={},tower_http=info", settings.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if settings.json_log {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&settings);
    info!(version = env!("CARGO_PKG_VERSION"), "nlsql-server starting");

    let store: Arc<dyn RequestStore> = build_store(&settings).await;
    let broker: Arc<dyn TaskBroker> = build_broker(&settings);
    let warehouse: Arc<dyn WarehouseClient> = build_warehouse(&settings);
    let llm: Arc<dyn LLMClient> = build_llm(&settings);
    let token_verifier: Arc<dyn TokenVerifier> = build_token_verifier(&settings);
    let chart = match LocalChartStore::new("./data/charts") {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(error = %err, "failed to initialize chart store");
            return ExitCode::FAILURE;
        }
    };
    let chart_service: Arc<dyn ChartService> = chart.clone();

    let assembler = match packs::build_assembler_arc(&settings.packs) {
        Ok(assembler) => assembler,
        Err(err) => {
            error!(error = %err, "failed to assemble prompt pack");
            return ExitCode::FAILURE;
        }
    };

    let query_service = Arc::new(QueryService::new(store.clone(), warehouse.clone()));

    let app_state = AppState {
        store: store.clone(),
        broker: broker.clone(),
        warehouse: warehouse.clone(),
        query_service,
        token_verifier,
        chart,
    };

    let flow_ctx = FlowContext {
        store: store.clone(),
        llm,
        warehouse,
        assembler,
        chart: chart_service,
        max_steps: settings.max_steps,
    };
    let workers = worker::spawn(flow_ctx, broker, settings.worker_concurrency);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let app = routes::router()
        .merge(metrics::routes())
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    let addr: SocketAddr = match settings.listen_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(addr = %settings.listen_addr, error = %err, "invalid LISTEN_ADDR");
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, error = %err, "failed to bind listen address");
            return ExitCode::FAILURE;
        }
    };

    info!(%addr, "listening");
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %err, "server error");
        return ExitCode::FAILURE;
    }

    for handle in workers {
        handle.abort();
    }

    info!("server shutdown complete");
    ExitCode::SUCCESS
}

async fn build_store(settings: &Settings) -> Arc<dyn RequestStore> {
    let Some(database_url) = &settings.database_url else {
        return Arc::new(InMemoryRequestStore::new());
    };
    match build_postgres_store(database_url).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "failed to connect to Postgres store, falling back to in-memory");
            Arc::new(InMemoryRequestStore::new())
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum StoreBootstrapError {
    #[error("invalid database URL: {0}")]
    Config(#[from] tokio_postgres::Error),
    #[error("failed to build connection pool: {0}")]
    Pool(#[from] deadpool_postgres::BuildError),
    #[error(transparent)]
    Schema(#[from] nlsql_store::Error),
}

async fn build_postgres_store(database_url: &str) -> Result<Arc<dyn RequestStore>, StoreBootstrapError> {
    let config = database_url.parse::<tokio_postgres::Config>()?;
    let mgr_config = deadpool_postgres::ManagerConfig {
        recycling_method: deadpool_postgres::RecyclingMethod::Fast,
    };
    let manager = deadpool_postgres::Manager::from_config(config, tokio_postgres::NoTls, mgr_config);
    let pool = deadpool_postgres::Pool::builder(manager).max_size(16).build()?;
    let store = nlsql_store::PostgresRequestStore::new(pool);
    store.initialize_schema().await?;
    Ok(Arc::new(store))
}

fn build_broker(settings: &Settings) -> Arc<dyn TaskBroker> {
    let Some(connection) = &settings.broker_connection else {
        return Arc::new(InMemoryBroker::new());
    };
    match redis::Client::open(connection.as_str()) {
        Ok(client) => Arc::new(nlsql_broker::RedisBroker::new(client)),
        Err(err) => {
            error!(error = %err, "failed to open Redis client, falling back to in-memory broker");
            Arc::new(InMemoryBroker::new())
        }
    }
}

fn build_warehouse(settings: &Settings) -> Arc<dyn WarehouseClient> {
    let url = format!("{}://{}:{}", settings.warehouse.driver, settings.warehouse.server, settings.warehouse.port);
    Arc::new(ClickHouseWarehouse::new(
        &url,
        &settings.warehouse.db,
        &settings.warehouse.user,
        &settings.warehouse.pass,
    ))
}

/// Picks the first configured provider; `HttpLLMClient` is the spec's one
/// illustrative adapter, so multi-provider routing by request `model` is
/// intentionally out of scope here.
fn build_llm(settings: &Settings) -> Arc<dyn LLMClient> {
    match settings.llm_providers.first() {
        Some(provider) => Arc::new(HttpLLMClient::new(
            provider.base_url.clone(),
            provider.api_key.clone(),
            provider.model.clone(),
        )),
        None => {
            info!("no LLM provider configured, using the mock client");
            Arc::new(MockLLMClient::new())
        }
    }
}

fn build_token_verifier(settings: &Settings) -> Arc<dyn TokenVerifier> {
    if settings.auth.oidc_domain.is_some() {
        info!("OIDC_DOMAIN is set but JWKS verification is an external collaborator this crate only contracts against; falling back to the static verifier");
    }
    Arc::new(StaticTokenVerifier)
}

/// Records `nlsql_http_requests_total`/`nlsql_http_request_duration_seconds`
/// by route template (not raw path, to keep cardinality bounded) for every
/// request, mirroring the per-handler `record_request` calls the langserve
/// crate makes but applied once as a router-wide layer.
async fn track_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let start = std::time::Instant::now();
    let response = next.run(req).await;
    metrics::record_request(&route, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
