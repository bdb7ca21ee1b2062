use anyhow::{Context, Result};
use config::{builder::DefaultState, ConfigBuilder};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const SERVICE_NAME: &str = "inference-gateway";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Remote model source. Blank values count as unset.
    pub model_url: Option<String>,
    pub model_path: PathBuf,
    pub model_sha256: Option<String>,
    pub download_timeout_secs: u64,
    pub port: u16,
    pub bind_addr: IpAddr,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl ServiceConfig {
    /// Defaults, then `POSTURE_CONFIG_FILE`, then the environment.
    pub fn load() -> Result<Self> {
        Self::from_builder(posture_core::config_builder(SERVICE_NAME))
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let cfg = with_defaults(builder)?.build().context("building configuration")?;
        let mut parsed: ServiceConfig = cfg.try_deserialize().context("invalid configuration")?;
        parsed.model_url = parsed.model_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        parsed.model_sha256 = parsed.model_sha256.map(|h| h.trim().to_ascii_lowercase()).filter(|h| !h.is_empty());
        Ok(parsed)
    }

    pub fn listen_addr(&self) -> SocketAddr { SocketAddr::new(self.bind_addr, self.port) }

    pub fn download_timeout(&self) -> Duration { Duration::from_secs(self.download_timeout_secs) }
}

fn with_defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
    Ok(builder
        .set_default("model_path", "models/posture.onnx")?
        .set_default("download_timeout_secs", 60)?
        .set_default("port", 5000)?
        .set_default("bind_addr", "0.0.0.0")?
        .set_default("static_dir", "docs")?
        .set_default("max_upload_bytes", 10 * 1024 * 1024)?)
}
