use anyhow::Result;
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::services::GuideService;

/// Runs a full refresh (download, then reconcile) on a cron schedule.
/// Scheduled guides point at the configured public host.
pub struct SchedulerService {
    service: GuideService,
    schedule: Schedule,
}

impl SchedulerService {
    pub fn new(service: GuideService, schedule: Schedule) -> Self {
        Self { service, schedule }
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }

    pub async fn start(self) -> Result<()> {
        info!("Starting scheduler service");

        loop {
            let Some(next) = self.next_run() else {
                warn!("Update schedule has no upcoming runs, scheduler stopping");
                return Ok(());
            };
            info!("Next scheduled refresh at {}", next.to_rfc3339());

            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            debug!("Scheduled refresh starting");
            match self.service.refresh(None).await {
                Ok(report) => info!(
                    "Scheduled refresh wrote {} entries and {} programmes",
                    report.entries_written, report.diagnostics.programmes_written
                ),
                Err(e) => error!("Scheduled refresh failed: {}", e),
            }
        }
    }
}
