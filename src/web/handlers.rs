use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tracing::{debug, error, info};

use super::AppState;
use crate::assets::StaticAssets;
use crate::errors::{AppError, AppResult};
use crate::sources::gzipped;
use crate::utils::compression::CompressionService;
use crate::utils::datetime::DateTimeParser;

const GUIDE_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
const PLAYLIST_CONTENT_TYPE: &str = "audio/x-mpegurl; charset=utf-8";

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "public_host": state.service.public_host(),
        "last_update": state.service.last_update().await,
        "last_filter": state.service.last_filter().await,
    }))
}

pub async fn update(State(state): State<AppState>) -> Response {
    info!("/update");
    match state.service.update().await {
        Ok(_) => (StatusCode::OK, "Updated").into_response(),
        Err(e) => failure("update", e),
    }
}

/// Runs reconciliation; the guide DOCTYPE points at the host this request
/// was addressed to.
pub async fn epg_filter(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    info!("/epg-filter (host {:?})", host);
    match state.service.filter(host).await {
        Ok(_) => (StatusCode::OK, "Epg-Filter").into_response(),
        Err(e) => failure("epg-filter", e),
    }
}

pub async fn epg(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let path = state.service.layout().guide_output();
    serve_artifact(&path, GUIDE_CONTENT_TYPE, &headers, false).await
}

/// The guide as-is, without conditional handling or compression
pub async fn epg_plain(State(state): State<AppState>) -> Response {
    let path = state.service.layout().guide_output();
    serve_artifact(&path, GUIDE_CONTENT_TYPE, &HeaderMap::new(), false).await
}

pub async fn epg_gz(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let path = state.service.layout().guide_output();
    serve_artifact(&path, GUIDE_CONTENT_TYPE, &headers, true).await
}

pub async fn ttv(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let path = state.service.layout().playlist_output();
    serve_artifact(&path, PLAYLIST_CONTENT_TYPE, &headers, false).await
}

pub async fn ttv_gz(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let path = state.service.layout().playlist_output();
    serve_artifact(&path, PLAYLIST_CONTENT_TYPE, &headers, true).await
}

pub async fn xmltv_dtd() -> Response {
    match StaticAssets::xmltv_dtd() {
        Some(dtd) => (
            [
                (header::CONTENT_TYPE, StaticAssets::get_content_type("xmltv.dtd")),
                (header::CACHE_CONTROL, "public, max-age=86400"),
            ],
            dtd.into_owned(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Asset not found").into_response(),
    }
}

fn failure(operation: &str, e: AppError) -> Response {
    error!("{} failed: {}", operation, e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{} failed: {}", operation, e)).into_response()
}

async fn serve_artifact(path: &Path, content_type: &'static str, headers: &HeaderMap, force_gzip: bool) -> Response {
    match artifact_response(path, content_type, headers, force_gzip).await {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to serve {}: {}", path.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
        }
    }
}

/// Builds the response for one rendered file.
///
/// `If-Modified-Since` at or after the file time gives `304`. The `ETag` is
/// the MD5 of the uncompressed body whether or not the response is gzipped.
async fn artifact_response(
    path: &Path,
    content_type: &'static str,
    headers: &HeaderMap,
    force_gzip: bool,
) -> AppResult<Response> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} has not been rendered yet", path.display());
            return Ok((StatusCode::NOT_FOUND, "Not found").into_response());
        }
        Err(e) => return Err(e.into()),
    };
    let modified = whole_seconds(metadata.modified()?.into());
    let last_modified = DateTimeParser::format_http_date(&modified);

    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTimeParser::parse_http_date(v).ok());
    if let Some(since) = since {
        if since >= modified {
            debug!("{} not modified since {}", path.display(), since);
            return Ok(Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header(header::LAST_MODIFIED, last_modified)
                .body(Body::empty())
                .map_err(|e| AppError::internal(e.to_string()))?);
        }
    }

    let body = tokio::fs::read(path).await?;
    let etag = format!("\"{:x}\"", md5::compute(&body));

    let accepts_gzip = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false);
    let gzip = force_gzip || accepts_gzip;
    let content = if gzip {
        compressed_body(path, modified, body).await?
    } else {
        body
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, content.len())
        .header(header::LAST_MODIFIED, last_modified)
        .header(header::ETAG, etag);
    if gzip {
        builder = builder.header(header::CONTENT_ENCODING, "gzip");
    }
    builder
        .body(Body::from(content))
        .map_err(|e| AppError::internal(e.to_string()))
}

/// The precomputed `.gz` sibling when it is at least as new as the file,
/// otherwise `body` compressed on the fly.
async fn compressed_body(path: &Path, modified: DateTime<Utc>, body: Vec<u8>) -> AppResult<Vec<u8>> {
    let sibling: PathBuf = gzipped(path);
    if let Ok(metadata) = tokio::fs::metadata(&sibling).await {
        let sibling_modified = whole_seconds(metadata.modified()?.into());
        if sibling_modified >= modified {
            return Ok(tokio::fs::read(&sibling).await?);
        }
    }

    let compressed = tokio::task::spawn_blocking(move || CompressionService::gzip_bytes(&body))
        .await
        .map_err(|e| AppError::internal(format!("Compression task failed: {}", e)))??;
    Ok(compressed)
}

fn whole_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(time.timestamp(), 0).single().unwrap_or(time)
}
