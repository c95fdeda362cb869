use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use once_cell::sync::Lazy;
use prometheus::{
    opts, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Registry, TextEncoder,
};
use tracing::info;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static RECONCILES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        opts!("minecraft_reconciles_total", "Reconcile pass count"),
        &["outcome"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static CHILD_PODS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(opts!(
        "minecraft_child_pods_created_total",
        "Server pods created by the reconciler"
    ))
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static CHILD_PODS_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(opts!(
        "minecraft_child_pods_deleted_total",
        "Server pods deleted by the reconciler"
    ))
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static RECONCILE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "minecraft_reconcile_duration_seconds",
        "Reconcile pass latency",
    ))
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&metric_families, &mut buf).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([("Content-Type", "text/plain; version=0.0.4")], buf).into_response()
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub fn router() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
}

pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    // Touch the lazy statics so the exposition is complete before the first
    // reconcile pass runs.
    Lazy::force(&RECONCILES);
    Lazy::force(&CHILD_PODS_CREATED);
    Lazy::force(&CHILD_PODS_DELETED);
    Lazy::force(&RECONCILE_DURATION);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "telemetry listening");
    axum::serve(listener, router()).await?;
    Ok(())
}
