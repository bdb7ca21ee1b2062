//! Core shared utilities for the posture inference services.

use anyhow::Result;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub mod config;
pub mod lifecycle;
pub mod metrics;

pub use crate::config::{config_builder, CONFIG_FILE_ENV};
pub use lifecycle::{current_phase, BootstrapPhase, BootstrapState};
pub use metrics::{init_metrics, metrics_handler, record_artifact_bytes, record_prediction, InferenceMetrics, PredictionOutcome};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }

/// Installs the global tracing subscriber once per process.
///
/// `RUST_LOG` drives the filter (default `info`). `POSTURE_JSON_LOG=1` switches
/// the formatter to flattened JSON lines.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("POSTURE_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let fmt_layer = if json {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .boxed()
        };
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;
        Ok(())
    })?;
    info!(target: "posture_core", service, "tracing initialized");
    Ok(())
}

/// Liveness, readiness, bootstrap status and Prometheus exposition routes.
/// Services merge this into their own router so everything shares one port.
pub fn health_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/live", get(|| async { Json(serde_json::json!({"live": NODE_LIVENESS.load(Ordering::SeqCst)})) }))
        .route("/ready", get(ready_handler))
        .route("/status", get(|| async {
            Json(serde_json::json!({
                "live": NODE_LIVENESS.load(Ordering::SeqCst),
                "ready": is_ready(),
                "phase": current_phase(),
            }))
        }))
        .route("/metrics", get(metrics_handler))
}

async fn ready_handler() -> impl IntoResponse {
    let ready = is_ready();
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(serde_json::json!({"ready": ready})))
}
