//! Prometheus metrics for the inference path.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use once_cell::sync::OnceCell;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

static METRICS: OnceCell<InferenceMetrics> = OnceCell::new();

#[derive(Clone, Debug)]
pub struct InferenceMetrics {
    pub predictions_total: IntCounterVec,
    pub inference_latency_seconds: Histogram,
    pub artifact_bytes: IntGauge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionOutcome { Ok, MissingImage, InvalidImage, Failed }

impl PredictionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionOutcome::Ok => "ok",
            PredictionOutcome::MissingImage => "missing_image",
            PredictionOutcome::InvalidImage => "invalid_image",
            PredictionOutcome::Failed => "failed",
        }
    }
}

impl InferenceMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let predictions_total = IntCounterVec::new(
            Opts::new("posture_predictions_total", "Prediction requests by outcome"),
            &["outcome"],
        )?;
        let inference_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("posture_inference_latency_seconds", "Preprocess + score latency in seconds")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;
        let artifact_bytes = IntGauge::new("posture_model_artifact_bytes", "Size of the loaded model artifact")?;
        registry.register(Box::new(predictions_total.clone()))?;
        registry.register(Box::new(inference_latency_seconds.clone()))?;
        registry.register(Box::new(artifact_bytes.clone()))?;
        Ok(Self { predictions_total, inference_latency_seconds, artifact_bytes })
    }
}

/// Registers the metric families in the default registry (idempotent).
pub fn init_metrics() -> prometheus::Result<&'static InferenceMetrics> {
    METRICS.get_or_try_init(|| InferenceMetrics::register(prometheus::default_registry()))
}

/// No-op until `init_metrics` has run, so library code can record
/// unconditionally.
pub fn record_prediction(outcome: PredictionOutcome, latency_secs: Option<f64>) {
    if let Some(m) = METRICS.get() {
        m.predictions_total.with_label_values(&[outcome.as_str()]).inc();
        if let Some(secs) = latency_secs { m.inference_latency_seconds.observe(secs); }
    }
}

pub fn record_artifact_bytes(len: u64) {
    if let Some(m) = METRICS.get() { m.artifact_bytes.set(i64::try_from(len).unwrap_or(i64::MAX)); }
}

pub async fn metrics_handler() -> Response {
    if METRICS.get().is_none() {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response();
    }
    let metric_families = prometheus::default_registry().gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response();
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response()
}
