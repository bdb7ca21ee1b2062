//! Posture classification inference service.
//!
//! Startup is two explicit phases: [`provision`] makes sure the model
//! artifact is on disk and loads it, [`serve`] binds the listener and answers
//! requests with the loaded scorer. Nothing is bound until provisioning
//! succeeded.

pub mod artifact;
pub mod error;
pub mod http;
pub mod model;
pub mod preprocess;
pub mod settings;

use anyhow::{Context, Result};
use artifact::{ArtifactStore, ModelArtifact, ModelSource};
use error::ProvisionError;
use http::{AppState, HttpOptions};
use model::{OnnxScorer, Scorer};
use settings::ServiceConfig;
use posture_core::{clear_ready, mark_ready, record_artifact_bytes, BootstrapState};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

pub use error::{ArtifactError, InvalidImage, ModelLoadError, PredictError};
pub use model::CLASS_LABELS;
pub use preprocess::{preprocess, ImageTensor};

/// Result of the provisioning phase.
pub struct Provisioned {
    pub artifact: ModelArtifact,
    pub scorer: Arc<dyn Scorer>,
}

/// Resolves (and if configured, downloads) the model artifact, then loads it.
pub async fn provision(cfg: &ServiceConfig) -> Result<Provisioned, ProvisionError> {
    provision_with(cfg, &mut BootstrapState::new()).await
}

async fn provision_with(cfg: &ServiceConfig, boot: &mut BootstrapState) -> Result<Provisioned, ProvisionError> {
    let source = ModelSource::new(cfg.model_url.as_deref(), &cfg.model_path)?;
    let store = ArtifactStore::new(cfg.download_timeout(), cfg.model_sha256.clone())?;
    let artifact = store.ensure_artifact(&source).await?;
    record_artifact_bytes(artifact.len);
    boot.advance();

    let path = artifact.path.clone();
    let scorer = tokio::task::spawn_blocking(move || OnnxScorer::load(&path))
        .await
        .map_err(|e| ProvisionError::LoaderTask(e.to_string()))??;
    boot.advance();
    Ok(Provisioned { artifact, scorer: Arc::new(scorer) })
}

/// Binds the listener and serves until `shutdown` resolves.
pub async fn serve<F>(cfg: &ServiceConfig, scorer: Arc<dyn Scorer>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = cfg.listen_addr();
    let opts = HttpOptions { static_dir: cfg.static_dir.clone(), max_upload_bytes: cfg.max_upload_bytes };
    let app = http::router(AppState::new(scorer), &opts);
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");
    mark_ready();
    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;
    clear_ready();
    served.context("http server failed")
}

/// Full service lifecycle: provision, then serve until Ctrl-C.
pub async fn run(cfg: ServiceConfig) -> Result<()> {
    let mut boot = BootstrapState::new();
    let provisioned = provision_with(&cfg, &mut boot).await?;
    info!(
        model = %provisioned.artifact.path.display(),
        bytes = provisioned.artifact.len,
        startup_ms = boot.total_elapsed().as_millis() as u64,
        phases = ?boot.durations(),
        "model ready"
    );
    serve(&cfg, provisioned.scorer, async {
        if let Err(e) = tokio::signal::ctrl_c().await { tracing::error!(error = %e, "ctrl-c handler failed"); }
        info!("shutdown");
    })
    .await
}
