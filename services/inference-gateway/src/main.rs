use anyhow::Result;
use inference_gateway::settings::{ServiceConfig, SERVICE_NAME};
use posture_core::{init_metrics, init_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(SERVICE_NAME)?;
    init_metrics()?;

    let cfg = ServiceConfig::load()?;
    info!(?cfg, "config loaded");

    if let Err(e) = inference_gateway::run(cfg).await {
        tracing::error!(error = %format!("{e:#}"), "fatal");
        return Err(e);
    }
    Ok(())
}
