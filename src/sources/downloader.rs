//! Conditional HTTP downloads into the cache directory
//!
//! A download sends `If-None-Match` / `If-Modified-Since` taken from the
//! target's sidecar file, but only while the cached document still exists.
//! Bodies are streamed to a temporary file and renamed into place, and gzip
//! payloads are inflated so the rest of the pipeline only sees plain XML.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header::{HeaderMap, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::cache::DownloadTarget;
use crate::config::IngestionConfig;
use crate::errors::{SourceError, SourceResult};
use crate::utils::compression::{temp_path_for, CompressionService};
use crate::utils::human_format::{format_bytes, format_duration};
use crate::utils::url::obfuscate_credentials;

/// Response validators remembered between downloads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValidators {
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl CacheValidators {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: reqwest::header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            etag: text(ETAG),
            last_modified: text(LAST_MODIFIED),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Reads a sidecar file; a missing or unreadable sidecar means "no validators"
    pub fn load(path: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(validators) => Some(validators),
            Err(e) => {
                warn!("Ignoring unreadable validator file {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn store(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

/// Result of one conditional download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server confirmed the cached copy is current
    NotModified,
    /// A new body was stored at `path`
    Downloaded { path: PathBuf, bytes: u64 },
}

/// HTTP client for playlist and guide downloads
#[derive(Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(config: &IngestionConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self { client })
    }

    /// Download `url` into `target` unless the cached copy is still current
    pub async fn fetch(&self, url: &str, target: &DownloadTarget) -> SourceResult<FetchOutcome> {
        let display_url = obfuscate_credentials(url);
        let started = Instant::now();

        let mut request = self.client.get(url);
        if target.cached.exists() {
            if let Some(validators) = CacheValidators::load(&target.validators) {
                if let Some(etag) = &validators.etag {
                    request = request.header(IF_NONE_MATCH, etag);
                }
                if let Some(last_modified) = &validators.last_modified {
                    request = request.header(IF_MODIFIED_SINCE, last_modified);
                }
                debug!("Conditional request for {}: {:?}", display_url, validators);
            }
        }

        let response = request.send().await.map_err(|source| SourceError::Request {
            url: display_url.clone(),
            source,
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            info!("{} not modified, keeping {}", display_url, target.cached.display());
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(SourceError::Http {
                url: display_url,
                status: status.as_u16(),
            });
        }

        let validators = CacheValidators::from_headers(response.headers());
        let bytes = stream_to_file(response, &target.download, &display_url).await?;

        let compressed = target.is_compressed()
            || CompressionService::is_gzip_file(&target.download)
                .map_err(|e| SourceError::write(&target.download, e))?;
        if compressed {
            inflate(&target.download, &target.cached).await?;
        }

        if !validators.is_empty() {
            if let Err(e) = validators.store(&target.validators) {
                warn!("Failed to store validators {}: {}", target.validators.display(), e);
            }
        }

        info!(
            "Downloaded {} to {} ({}, {})",
            display_url,
            target.cached.display(),
            format_bytes(bytes),
            format_duration(started.elapsed())
        );
        Ok(FetchOutcome::Downloaded {
            path: target.cached.clone(),
            bytes,
        })
    }
}

async fn stream_to_file(response: reqwest::Response, path: &Path, display_url: &str) -> SourceResult<u64> {
    let temp = temp_path_for(path);
    let result = async {
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| SourceError::write(&temp, e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| SourceError::Request {
                url: display_url.to_string(),
                source,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| SourceError::write(&temp, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| SourceError::write(&temp, e))?;
        Ok::<u64, SourceError>(written)
    }
    .await;

    match result {
        Ok(written) => {
            tokio::fs::rename(&temp, path)
                .await
                .map_err(|e| SourceError::write(path, e))?;
            Ok(written)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp).await;
            Err(e)
        }
    }
}

async fn inflate(source: &Path, target: &Path) -> SourceResult<()> {
    let (from, to) = (source.to_path_buf(), target.to_path_buf());
    let inflated = tokio::task::spawn_blocking(move || CompressionService::gunzip_file(&from, &to))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
        .and_then(|result| result)
        .map_err(|source_error| SourceError::Decompress {
            path: source.to_path_buf(),
            source: source_error,
        })?;
    debug!("Inflated {} to {} ({})", source.display(), target.display(), format_bytes(inflated));
    Ok(())
}
