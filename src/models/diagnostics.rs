use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::info;

use super::Programme;

/// A parsed programme timestamp together with the text it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateBound {
    pub date: DateTime<FixedOffset>,
    pub raw: String,
}

/// Counters and date ranges collected during one reconciliation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationDiagnostics {
    pub oldest_start: Option<DateBound>,
    pub newest_start: Option<DateBound>,
    pub oldest_stop: Option<DateBound>,
    pub newest_stop: Option<DateBound>,
    pub past_pruned: usize,
    pub horizon_pruned: usize,

    pub feeds_processed: usize,
    pub feeds_failed: usize,
    pub channels_decoded: usize,
    pub channels_matched: usize,
    pub programmes_decoded: usize,
    pub programmes_kept: usize,
    pub programmes_written: usize,
    pub entries_without_channel: usize,
    pub entries_without_programmes: usize,
}

impl ReconciliationDiagnostics {
    /// Widens the observed start/stop ranges with an emitted programme
    pub fn record_programme_window(&mut self, programme: &Programme) {
        if let Some(start) = programme.start_date {
            widen(&mut self.oldest_start, start, &programme.start, |new, old| new < old);
            widen(&mut self.newest_start, start, &programme.start, |new, old| new > old);
        }
        if let Some(stop) = programme.stop_date {
            widen(&mut self.oldest_stop, stop, &programme.stop, |new, old| new < old);
            widen(&mut self.newest_stop, stop, &programme.stop, |new, old| new > old);
        }
    }

    /// Counts a programme left out of the guide
    pub fn record_pruned(&mut self, programme: &Programme) {
        if programme.is_past {
            self.past_pruned += 1;
        } else if programme.is_beyond_horizon {
            self.horizon_pruned += 1;
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Reconciliation: {} feeds processed ({} failed), {} channels decoded, {} matched",
            self.feeds_processed, self.feeds_failed, self.channels_decoded, self.channels_matched
        );
        info!(
            "Programmes: {} decoded, {} kept, {} written, {} past pruned, {} beyond horizon pruned",
            self.programmes_decoded,
            self.programmes_kept,
            self.programmes_written,
            self.past_pruned,
            self.horizon_pruned
        );
        if let (Some(oldest), Some(newest)) = (&self.oldest_start, &self.newest_start) {
            info!("Programme starts range from {} to {}", oldest.raw, newest.raw);
        }
        if let (Some(oldest), Some(newest)) = (&self.oldest_stop, &self.newest_stop) {
            info!("Programme stops range from {} to {}", oldest.raw, newest.raw);
        }
        if self.entries_without_channel > 0 || self.entries_without_programmes > 0 {
            info!(
                "{} playlist entries have no guide channel, {} matched entries have no programmes",
                self.entries_without_channel, self.entries_without_programmes
            );
        }
    }
}

fn widen(
    slot: &mut Option<DateBound>,
    date: DateTime<FixedOffset>,
    raw: &str,
    replaces: impl Fn(&DateTime<FixedOffset>, &DateTime<FixedOffset>) -> bool,
) {
    let replace = match slot {
        Some(current) => replaces(&date, &current.date),
        None => true,
    };
    if replace {
        *slot = Some(DateBound {
            date,
            raw: raw.to_string(),
        });
    }
}
