//! Request and worker metrics exported at `/metrics` in Prometheus text
//! format, mirroring the counter/histogram/registry shape used elsewhere
//! in the stack's observability layer.

use std::sync::OnceLock;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

use crate::state::AppState;

struct ServerMetrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: Histogram,
    flow_tasks_total: IntCounterVec,
}

static METRICS: OnceLock<ServerMetrics> = OnceLock::new();

#[allow(clippy::expect_used)]
fn metrics() -> &'static ServerMetrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("nlsql_http_requests_total", "Total HTTP requests by route and status"),
            &["route", "status"],
        )
        .expect("valid http_requests_total options");

        let http_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("nlsql_http_request_duration_seconds", "HTTP request latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("valid http_request_duration_seconds options");

        let flow_tasks_total = IntCounterVec::new(
            Opts::new("nlsql_flow_tasks_total", "Flow tasks processed by flow type and outcome"),
            &["flow", "outcome"],
        )
        .expect("valid flow_tasks_total options");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("register http_requests_total");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("register http_request_duration_seconds");
        registry
            .register(Box::new(flow_tasks_total.clone()))
            .expect("register flow_tasks_total");

        ServerMetrics {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            flow_tasks_total,
        }
    })
}

pub fn record_request(route: &str, status: u16, duration_seconds: f64) {
    let m = metrics();
    m.http_requests_total
        .with_label_values(&[route, &status.to_string()])
        .inc();
    m.http_request_duration_seconds.observe(duration_seconds);
}

pub fn record_flow_task(flow: &str, outcome: &str) {
    metrics().flow_tasks_total.with_label_values(&[flow, outcome]).inc();
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(export))
}

async fn export(State(_state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = metrics().registry.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
