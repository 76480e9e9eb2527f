use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use epg_merger::config::IngestionConfig;
use epg_merger::errors::SourceError;
use epg_merger::sources::{CacheLayout, CacheValidators, Downloader, FetchOutcome};
use epg_merger::utils::compression::CompressionService;
use tempfile::TempDir;

const FEED: &str = "<?xml version=\"1.0\"?>\n<tv>\n  <channel id=\"a\"><display-name>A</display-name></channel>\n</tv>\n";
const ETAG: &str = "\"v1\"";

async fn feed(headers: HeaderMap) -> Response {
    let matches = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == ETAG);
    if matches {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    (
        [
            (header::ETAG, ETAG),
            (header::LAST_MODIFIED, "Sun, 10 Mar 2024 10:00:00 GMT"),
        ],
        FEED,
    )
        .into_response()
}

async fn packed_feed() -> Response {
    CompressionService::gzip_bytes(FEED.as_bytes())
        .unwrap()
        .into_response()
}

async fn start_server() -> String {
    let app = Router::new()
        .route("/epg.xml", get(feed))
        .route("/epg.xml.gz", get(packed_feed))
        .route("/unlabelled.xml", get(packed_feed));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_conditional_download() {
    let base = start_server().await;
    let dir = TempDir::new().unwrap();
    let layout = CacheLayout::new(dir.path());
    let downloader = Downloader::new(&IngestionConfig::default()).unwrap();
    let url = format!("{}/epg.xml", base);
    let target = layout.feed_target(1, &url);

    let first = downloader.fetch(&url, &target).await.unwrap();
    assert_eq!(
        first,
        FetchOutcome::Downloaded {
            path: target.cached.clone(),
            bytes: FEED.len() as u64
        }
    );
    assert_eq!(std::fs::read_to_string(&target.cached).unwrap(), FEED);

    let validators = CacheValidators::load(&target.validators).unwrap();
    assert_eq!(validators.etag.as_deref(), Some(ETAG));
    assert_eq!(
        validators.last_modified.as_deref(),
        Some("Sun, 10 Mar 2024 10:00:00 GMT")
    );

    let second = downloader.fetch(&url, &target).await.unwrap();
    assert_eq!(second, FetchOutcome::NotModified);

    // Validators are ignored once the cached copy is gone
    std::fs::remove_file(&target.cached).unwrap();
    let third = downloader.fetch(&url, &target).await.unwrap();
    assert!(matches!(third, FetchOutcome::Downloaded { .. }));
    assert!(target.cached.exists());
}

#[tokio::test]
async fn test_compressed_feeds_are_inflated() {
    let base = start_server().await;
    let dir = TempDir::new().unwrap();
    let layout = CacheLayout::new(dir.path());
    let downloader = Downloader::new(&IngestionConfig::default()).unwrap();

    let url = format!("{}/epg.xml.gz", base);
    let target = layout.feed_target(2, &url);
    assert!(target.is_compressed());
    downloader.fetch(&url, &target).await.unwrap();
    assert_eq!(std::fs::read_to_string(&target.cached).unwrap(), FEED);
    assert!(!target.download.exists());

    // Gzip payload behind a plain name is detected by its magic bytes
    let url = format!("{}/unlabelled.xml", base);
    let target = layout.feed_target(3, &url);
    assert!(!target.is_compressed());
    downloader.fetch(&url, &target).await.unwrap();
    assert_eq!(std::fs::read_to_string(&target.cached).unwrap(), FEED);
}

#[tokio::test]
async fn test_http_errors_are_reported() {
    let base = start_server().await;
    let dir = TempDir::new().unwrap();
    let layout = CacheLayout::new(dir.path());
    let downloader = Downloader::new(&IngestionConfig::default()).unwrap();

    let url = format!("{}/missing.xml", base);
    let result = downloader.fetch(&url, &layout.feed_target(4, &url)).await;
    assert!(matches!(result, Err(SourceError::Http { status: 404, .. })));
    assert!(!layout.feed_target(4, &url).cached.exists());
}
