//! HTTP surface: static front-end, liveness ping and the `/predict` contract.

use crate::error::PredictError;
use crate::model::{Scorer, CLASS_LABELS};
use crate::preprocess::preprocess;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use posture_core::{record_prediction, PredictionOutcome};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    services::{ServeDir, ServeFile},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug, error, instrument, warn};

pub const IMAGE_FIELD: &str = "image";

#[derive(Clone)]
pub struct AppState {
    pub scorer: Arc<dyn Scorer>,
}

impl AppState {
    pub fn new(scorer: Arc<dyn Scorer>) -> Self { Self { scorer } }
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    #[serde(rename = "class")]
    pub class_index: usize,
    pub confidence: f64,
    pub label: String,
}

impl PredictionResult {
    /// argmax / max over the probability vector. Ties go to the lowest index.
    pub fn from_probabilities(probs: &[f32]) -> Result<Self, PredictError> {
        if probs.len() != CLASS_LABELS.len() {
            return Err(PredictError::Scoring(anyhow::anyhow!("scorer returned {} values, expected {}", probs.len(), CLASS_LABELS.len())));
        }
        let mut best = 0;
        for (i, p) in probs.iter().enumerate() {
            if !(0.0..=1.0).contains(p) {
                return Err(PredictError::Scoring(anyhow::anyhow!("scorer returned {p}, outside [0, 1]")));
            }
            if *p > probs[best] { best = i; }
        }
        let confidence = (f64::from(probs[best]) * 10_000.0).round() / 10_000.0;
        Ok(Self { class_index: best, confidence, label: CLASS_LABELS[best].to_string() })
    }
}

pub fn router(state: AppState, opts: &HttpOptions) -> Router {
    let statics = ServeDir::new(&opts.static_dir);
    Router::new()
        .route_service("/", ServeFile::new(opts.static_dir.join("index.html")))
        .route("/ping", get(ping))
        .route("/predict", post(predict).options(preflight))
        .merge(posture_core::health_router())
        .fallback_service(statics)
        .layer(DefaultBodyLimit::max(opts.max_upload_bytes))
        .layer(SetResponseHeaderLayer::if_not_present(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping() -> &'static str { "pong" }

/// Browser preflight. Answered before any body handling.
async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
            (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
}

#[instrument(skip_all)]
async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, PredictError> {
    let outcome = run_prediction(state, multipart).await;
    match &outcome {
        Ok((_, secs)) => record_prediction(PredictionOutcome::Ok, Some(*secs)),
        Err(PredictError::MissingImageField) => record_prediction(PredictionOutcome::MissingImage, None),
        Err(PredictError::InvalidImage(e)) => {
            debug!(reason = %e.reason, "rejected upload");
            record_prediction(PredictionOutcome::InvalidImage, None)
        }
        Err(PredictError::Multipart(e)) => {
            debug!(error = %e, "malformed multipart body");
            record_prediction(PredictionOutcome::InvalidImage, None)
        }
        Err(PredictError::Scoring(e)) => {
            error!(error = %format!("{e:#}"), "inference failed");
            record_prediction(PredictionOutcome::Failed, None)
        }
    }
    outcome.map(|(result, _)| Json(result))
}

async fn run_prediction(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(PredictionResult, f64), PredictError> {
    let bytes = read_image_field(multipart).await?;
    let start = Instant::now();
    let scorer = state.scorer.clone();
    let probs = tokio::task::spawn_blocking(move || -> Result<Vec<f32>, PredictError> {
        let tensor = preprocess(&bytes)?;
        scorer.predict(&tensor).map_err(PredictError::Scoring)
    })
    .await
    .map_err(|e| PredictError::Scoring(anyhow::anyhow!("inference worker failed: {e}")))??;
    let result = PredictionResult::from_probabilities(&probs)?;
    Ok((result, start.elapsed().as_secs_f64()))
}

/// Bodies that are not multipart at all count as "no image".
async fn read_image_field(multipart: Result<Multipart, MultipartRejection>) -> Result<axum::body::Bytes, PredictError> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "predict request without multipart body");
            return Err(PredictError::MissingImageField);
        }
    };
    while let Some(field) = multipart.next_field().await.map_err(PredictError::Multipart)? {
        if field.name() == Some(IMAGE_FIELD) {
            return field.bytes().await.map_err(PredictError::Multipart);
        }
    }
    Err(PredictError::MissingImageField)
}
