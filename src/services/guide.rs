use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::ingestor::{reconcile, AliasFixups, M3uParser, ReconciliationOutcome};
use crate::models::{ReconciliationDiagnostics, ReferenceDates};
use crate::proxy::ProxyGenerator;
use crate::sources::{gzipped, CacheLayout, Downloader, FetchOutcome};
use crate::utils::compression::{write_via_temp, CompressionService};
use crate::utils::human_format::format_duration;

/// Result of downloading the playlist and every guide feed
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub playlist_downloaded: bool,
    pub feeds_downloaded: usize,
    pub feeds_not_modified: usize,
    pub feeds_failed: usize,
}

/// Result of one reconciliation run
#[derive(Debug, Clone, Serialize)]
pub struct FilterReport {
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub public_host: String,
    pub reference_date: chrono::NaiveDate,
    pub entries_written: usize,
    pub diagnostics: ReconciliationDiagnostics,
}

/// Downloads sources and renders the merged playlist and guide.
///
/// Cheap to clone; clones share the run lock, so an update triggered over
/// HTTP never overlaps a scheduled one.
#[derive(Clone)]
pub struct GuideService {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    layout: CacheLayout,
    downloader: Downloader,
    fixups: Arc<AliasFixups>,
    run_lock: Arc<Mutex<()>>,
    last_update: RwLock<Option<UpdateReport>>,
    last_filter: RwLock<Option<FilterReport>>,
}

impl GuideService {
    pub fn new(config: Config) -> AppResult<Self> {
        config
            .validate()
            .map_err(|e| AppError::configuration(format!("{:#}", e)))?;
        let downloader = Downloader::new(&config.ingestion)?;
        let layout = CacheLayout::new(config.storage.cache_dir.clone());
        let fixups = AliasFixups::builtin().with_extra(&config.alias_fixups);
        info!(
            "Guide service using cache {} with {} alias fixups",
            layout.root().display(),
            fixups.len()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                layout,
                downloader,
                fixups: Arc::new(fixups),
                run_lock: Arc::new(Mutex::new(())),
                last_update: RwLock::new(None),
                last_filter: RwLock::new(None),
            }),
        })
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.inner.layout
    }

    pub fn public_host(&self) -> String {
        self.inner.config.public_host()
    }

    pub async fn last_update(&self) -> Option<UpdateReport> {
        self.inner.last_update.read().await.clone()
    }

    pub async fn last_filter(&self) -> Option<FilterReport> {
        self.inner.last_filter.read().await.clone()
    }

    /// Download the playlist and all guide feeds into the cache.
    ///
    /// A playlist failure fails the update; a feed failure is logged and the
    /// remaining feeds are still fetched.
    pub async fn update(&self) -> AppResult<UpdateReport> {
        let _guard = self.inner.run_lock.lock().await;
        self.update_locked().await
    }

    /// Reconcile the cached documents and write the rendered artifacts.
    /// `host` is written into the guide DOCTYPE; the configured public host
    /// is used when it is `None`.
    ///
    /// A run that outlives `filter_timeout_secs` fails with a timeout, but
    /// keeps the run lock until its worker has finished writing.
    pub async fn filter(&self, host: Option<String>) -> AppResult<FilterReport> {
        let guard = Arc::clone(&self.inner.run_lock).lock_owned().await;
        self.filter_locked(guard, host).await
    }

    /// Update followed by filter, as one run
    pub async fn refresh(&self, host: Option<String>) -> AppResult<FilterReport> {
        let guard = Arc::clone(&self.inner.run_lock).lock_owned().await;
        self.update_locked().await?;
        self.filter_locked(guard, host).await
    }

    async fn update_locked(&self) -> AppResult<UpdateReport> {
        let started = Instant::now();
        let layout = &self.inner.layout;
        let sources = &self.inner.config.sources;
        layout.ensure_exists()?;

        let playlist = self
            .inner
            .downloader
            .fetch(&sources.playlist_url, &layout.playlist_target())
            .await?;

        let mut report = UpdateReport {
            completed_at: Utc::now(),
            duration_ms: 0,
            playlist_downloaded: matches!(playlist, FetchOutcome::Downloaded { .. }),
            feeds_downloaded: 0,
            feeds_not_modified: 0,
            feeds_failed: 0,
        };

        for (position, url) in sources.epg_urls.iter().enumerate() {
            let index = position + 1;
            let target = layout.feed_target(index, url);
            match self.inner.downloader.fetch(url, &target).await {
                Ok(FetchOutcome::Downloaded { .. }) => report.feeds_downloaded += 1,
                Ok(FetchOutcome::NotModified) => report.feeds_not_modified += 1,
                Err(e) => {
                    error!("Failed to download guide feed {}: {}", index, e);
                    report.feeds_failed += 1;
                }
            }
        }

        let elapsed = started.elapsed();
        report.completed_at = Utc::now();
        report.duration_ms = elapsed.as_millis() as u64;
        info!(
            "Update finished in {}: {} feeds downloaded, {} not modified, {} failed",
            format_duration(elapsed),
            report.feeds_downloaded,
            report.feeds_not_modified,
            report.feeds_failed
        );

        *self.inner.last_update.write().await = Some(report.clone());
        Ok(report)
    }

    async fn filter_locked(&self, guard: OwnedMutexGuard<()>, host: Option<String>) -> AppResult<FilterReport> {
        let host = host.unwrap_or_else(|| self.public_host());
        let today = Local::now().date_naive();
        let dates = ReferenceDates::with_horizon(today, self.inner.config.ingestion.horizon_days);
        let layout = self.inner.layout.clone();
        let fixups = Arc::clone(&self.inner.fixups);
        let limit = Duration::from_secs(self.inner.config.ingestion.filter_timeout_secs);

        let report = run_guarded(guard, limit, "filter", move || {
            render_artifacts(&layout, &fixups, dates, &host)
        })
        .await?;

        *self.inner.last_filter.write().await = Some(report.clone());
        Ok(report)
    }
}

/// Runs `work` on a blocking worker that owns `guard` until `work` returns.
async fn run_guarded<T, F>(
    guard: OwnedMutexGuard<()>,
    limit: Duration,
    operation: &'static str,
    work: F,
) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        work()
    });
    match tokio::time::timeout(limit, task).await {
        Ok(joined) => joined.map_err(|e| AppError::internal(format!("{} task failed: {}", operation, e)))?,
        Err(_) => {
            warn!(
                "{} run exceeded {}s; the run lock is held until its worker finishes",
                operation,
                limit.as_secs()
            );
            Err(AppError::timeout(operation, limit.as_secs()))
        }
    }
}

/// Reconcile the cached playlist against the cached guide documents and
/// write the rendered playlist and guide, each with a gzip copy.
///
/// Runs synchronously; the service calls it on a blocking worker.
pub fn render_artifacts(
    layout: &CacheLayout,
    fixups: &AliasFixups,
    dates: ReferenceDates,
    host: &str,
) -> AppResult<FilterReport> {
    let started = Instant::now();
    let entries = M3uParser::parse_file(&layout.playlist_input())?;
    let feeds = layout.feed_documents()?;
    info!(
        "Reconciling {} playlist entries against {} guide documents (today {}, horizon {})",
        entries.len(),
        feeds.len(),
        dates.today,
        dates.horizon
    );

    let ReconciliationOutcome {
        entries,
        mut diagnostics,
    } = reconcile(entries, &feeds, dates, fixups);

    let generator = ProxyGenerator::new(host);
    let playlist_path = layout.playlist_output();
    let entries_written = write_via_temp(&playlist_path, |out| generator.write_playlist(&entries, out))?;
    let guide_path = layout.guide_output();
    write_via_temp(&guide_path, |out| generator.write_guide(&entries, &mut diagnostics, out))?;

    for path in [&playlist_path, &guide_path] {
        CompressionService::gzip_file(path, &gzipped(path))?;
    }

    diagnostics.log_summary();
    let elapsed = started.elapsed();
    info!("Filter finished in {}", format_duration(elapsed));

    Ok(FilterReport {
        completed_at: Utc::now(),
        duration_ms: elapsed.as_millis() as u64,
        public_host: host.to_string(),
        reference_date: dates.today,
        entries_written,
        diagnostics,
    })
}
