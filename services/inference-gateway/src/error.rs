use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::path::PathBuf;
use thiserror::Error;

/// The model artifact could not be made available locally. Always fatal.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no model at {path} and no remote model URL configured")]
    NoSource { path: PathBuf },
    #[error("invalid model URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("fetching {url} failed: {source}")]
    Transport { url: String, #[source] source: reqwest::Error },
    #[error("downloaded model from {url} is empty")]
    Empty { url: String },
    #[error("model digest mismatch at {path}: expected {expected}, got {actual}")]
    DigestMismatch { path: PathBuf, expected: String, actual: String },
    #[error("local storage error at {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("cannot read model artifact {path}: {source}")]
    Unreadable { path: PathBuf, #[source] source: std::io::Error },
    #[error("model artifact {path} is not a usable ONNX graph: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("model {path} outputs {actual} classes, expected {expected}")]
    OutputArity { path: PathBuf, expected: usize, actual: usize },
}

#[derive(Debug, Error)]
#[error("invalid image: {reason}")]
pub struct InvalidImage { pub reason: String }

/// Startup failures, surfaced by `provision`.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("model artifact unavailable: {0}")]
    ArtifactUnavailable(#[from] ArtifactError),
    #[error("model load failed: {0}")]
    ModelLoad(#[from] ModelLoadError),
    #[error("model loader task failed: {0}")]
    LoaderTask(String),
}

/// Per-request failures on `/predict`.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("No image provided")]
    MissingImageField,
    #[error("Malformed multipart body")]
    Multipart(#[source] axum::extract::multipart::MultipartError),
    #[error("Invalid image")]
    InvalidImage(#[from] InvalidImage),
    #[error("Inference failed")]
    Scoring(#[source] anyhow::Error),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::MissingImageField | PredictError::Multipart(_) | PredictError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            PredictError::Scoring(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        (self.status(), Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
