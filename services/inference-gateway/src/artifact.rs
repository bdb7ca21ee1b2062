//! Model artifact resolution and download.
//!
//! Downloads are staged next to the destination (`<file>.download`) and
//! renamed into place only after the whole body was written, synced, is
//! non-empty and matches the pinned digest. A failed fetch never clobbers an
//! artifact that was already on disk.

use crate::error::ArtifactError;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ModelSource {
    pub remote: Option<Url>,
    pub local_path: PathBuf,
}

impl ModelSource {
    pub fn new(remote: Option<&str>, local_path: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let remote = remote
            .map(|u| Url::parse(u).map_err(|e| ArtifactError::InvalidUrl { url: u.to_string(), reason: e.to_string() }))
            .transpose()?;
        if let Some(url) = &remote {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ArtifactError::InvalidUrl { url: url.to_string(), reason: "scheme must be http or https".into() });
            }
        }
        Ok(Self { remote, local_path: local_path.into() })
    }
}

/// A model file present on local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub len: u64,
}

pub struct ArtifactStore {
    client: reqwest::Client,
    expected_sha256: Option<String>,
}

impl ArtifactStore {
    pub fn new(timeout: Duration, expected_sha256: Option<String>) -> Result<Self, ArtifactError> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(ArtifactError::Client)?;
        Ok(Self { client, expected_sha256: expected_sha256.map(|h| h.to_ascii_lowercase()) })
    }

    /// Makes sure a model file exists at `source.local_path`.
    ///
    /// With a remote configured the file is always re-fetched and replaces
    /// whatever was there. Without one, an existing file is used as is.
    #[instrument(skip(self), fields(path = %source.local_path.display()))]
    pub async fn ensure_artifact(&self, source: &ModelSource) -> Result<ModelArtifact, ArtifactError> {
        match &source.remote {
            Some(url) => self.fetch(url, &source.local_path).await,
            None => self.resolve_local(&source.local_path).await,
        }
    }

    async fn resolve_local(&self, path: &Path) -> Result<ModelArtifact, ArtifactError> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(ArtifactError::NoSource { path: path.to_path_buf() }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ArtifactError::NoSource { path: path.to_path_buf() }),
            Err(e) => return Err(io_err(path, e)),
        };
        if let Some(expected) = &self.expected_sha256 {
            let bytes = tokio::fs::read(path).await.map_err(|e| io_err(path, e))?;
            verify_digest(path, expected, &hex::encode(Sha256::digest(&bytes)))?;
        }
        info!(len = meta.len(), "using local model artifact");
        Ok(ModelArtifact { path: path.to_path_buf(), len: meta.len() })
    }

    async fn fetch(&self, url: &Url, dest: &Path) -> Result<ModelArtifact, ArtifactError> {
        if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| io_err(dir, e))?;
        }
        let staging = staging_path(dest);
        info!(%url, staging = %staging.display(), "downloading model");
        let outcome = self.download_to(url, &staging).await;
        let (len, digest) = match outcome {
            Ok(v) => v,
            Err(e) => {
                discard(&staging).await;
                return Err(e);
            }
        };
        if len == 0 {
            discard(&staging).await;
            return Err(ArtifactError::Empty { url: url.to_string() });
        }
        if let Some(expected) = &self.expected_sha256 {
            if let Err(e) = verify_digest(dest, expected, &digest) {
                discard(&staging).await;
                return Err(e);
            }
        }
        if let Err(e) = tokio::fs::rename(&staging, dest).await {
            discard(&staging).await;
            return Err(io_err(dest, e));
        }
        info!(len, sha256 = %digest, "model download complete");
        Ok(ModelArtifact { path: dest.to_path_buf(), len })
    }

    async fn download_to(&self, url: &Url, staging: &Path) -> Result<(u64, String), ArtifactError> {
        let transport = |source| ArtifactError::Transport { url: url.to_string(), source };
        let mut resp = self.client.get(url.clone()).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ArtifactError::HttpStatus { url: url.to_string(), status: status.as_u16() });
        }
        let mut file = tokio::fs::File::create(staging).await.map_err(|e| io_err(staging, e))?;
        let mut hasher = Sha256::new();
        let mut len: u64 = 0;
        while let Some(chunk) = resp.chunk().await.map_err(transport)? {
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(|e| io_err(staging, e))?;
            len += chunk.len() as u64;
            debug!(len, "model bytes received");
        }
        file.flush().await.map_err(|e| io_err(staging, e))?;
        file.sync_all().await.map_err(|e| io_err(staging, e))?;
        Ok((len, hex::encode(hasher.finalize())))
    }
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".download");
    dest.with_file_name(name)
}

fn verify_digest(path: &Path, expected: &str, actual: &str) -> Result<(), ArtifactError> {
    if expected.eq_ignore_ascii_case(actual) { return Ok(()); }
    Err(ArtifactError::DigestMismatch { path: path.to_path_buf(), expected: expected.to_string(), actual: actual.to_string() })
}

async fn discard(staging: &Path) {
    if let Err(e) = tokio::fs::remove_file(staging).await {
        if e.kind() != std::io::ErrorKind::NotFound { warn!(error = %e, path = %staging.display(), "could not remove staging file"); }
    }
}

fn io_err(path: &Path, source: std::io::Error) -> ArtifactError { ArtifactError::Io { path: path.to_path_buf(), source } }
