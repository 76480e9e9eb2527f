//! Channel reconciliation
//!
//! Guide feeds are streamed one after another, in a fixed order. Every
//! decoded channel is compared against every playlist entry; channels nobody
//! matched are dropped immediately, and programmes are only kept when they
//! belong to a channel matched in the same feed.
//!
//! Matching is exact and case-insensitive. An entry named `Foo orig` also
//! matches channels called `Foo`, `Foo FHD` matches `Foo HD` and `Foo UA`
//! matches `Foo`. When one of these derived names matches, the channel learns
//! the full entry name and the entry remembers the channel's names, so later
//! feeds that only know one of those spellings still match. Because of this
//! learning, the order in which feeds are processed changes the result.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::alias_fixups::AliasFixups;
use super::xmltv_parser::{GuideElement, XmltvReader};
use crate::errors::DecodeError;
use crate::models::{
    NameValue, NameVariant, PlaylistEntry, ReconciliationDiagnostics, ReferenceDates,
    SharedChannel,
};
use crate::utils::human_format::format_duration;

/// How a channel came to be attached to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The entry already holds a channel with the same feed and id
    AlreadyMatched,
    /// An alias equals a base name derived from the entry label
    Variant(NameVariant),
    /// An alias equals the entry name or its `tvg-name`
    Name,
    /// An alias equals one learned from an earlier suffix match
    LearnedAlias,
}

/// Tries to attach `channel` to `entry`.
///
/// Derived names are looked for across all aliases, one variant at a time,
/// before plain name matches, so an entry always gets the chance to learn.
pub fn match_channel(entry: &mut PlaylistEntry, channel: &SharedChannel) -> Option<MatchKind> {
    let key = channel.borrow().key();
    if entry.has_channel(&key) {
        entry.attach(Rc::clone(channel));
        return Some(MatchKind::AlreadyMatched);
    }

    let kind = {
        let channel = channel.borrow();
        let derived = entry
            .derived_names()
            .iter()
            .find(|d| channel.aliases.iter().any(|a| a.matches_folded(d.folded())));
        if let Some(derived) = derived {
            Some(MatchKind::Variant(derived.variant))
        } else if channel.aliases.iter().any(|alias| {
            alias.matches_folded(entry.name_folded())
                || entry
                    .tvg_name_folded()
                    .is_some_and(|tvg_name| alias.matches_folded(tvg_name))
        }) {
            Some(MatchKind::Name)
        } else if channel
            .aliases
            .iter()
            .any(|alias| entry.learned_aliases().contains(alias))
        {
            Some(MatchKind::LearnedAlias)
        } else {
            None
        }
    }?;

    if let MatchKind::Variant(_) = kind {
        let learned = channel
            .borrow_mut()
            .add_alias(NameValue::new(entry.name()));
        if learned {
            debug!("Channel '{}' learned alias '{}'", key.id, entry.name());
        }
        entry.learn_aliases(channel.borrow().aliases.iter());
    }

    entry.attach(Rc::clone(channel));
    Some(kind)
}

/// Counts for one processed feed
#[derive(Debug, Clone, Default)]
pub struct FeedSummary {
    pub channels_decoded: usize,
    pub channels_matched: usize,
    pub programmes_decoded: usize,
    pub programmes_kept: usize,
    pub elapsed: Duration,
}

/// Drives feeds, in order, against a set of playlist entries
pub struct Reconciler<'a> {
    entries: &'a mut [PlaylistEntry],
    dates: ReferenceDates,
    fixups: &'a AliasFixups,
    diagnostics: ReconciliationDiagnostics,
    next_feed: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(entries: &'a mut [PlaylistEntry], dates: ReferenceDates, fixups: &'a AliasFixups) -> Self {
        Self {
            entries,
            dates,
            fixups,
            diagnostics: ReconciliationDiagnostics::default(),
            next_feed: 0,
        }
    }

    /// Stream one guide document from a reader
    pub fn process_feed<R: BufRead>(&mut self, label: &str, source: R) -> Result<FeedSummary, DecodeError> {
        let feed = self.allocate_feed();
        let reader = XmltvReader::new(source, feed, self.dates, self.fixups);
        self.run_feed(label, reader)
    }

    /// Stream one guide document from disk
    pub fn process_feed_file(&mut self, path: &Path) -> Result<FeedSummary, DecodeError> {
        let feed = self.allocate_feed();
        let reader = match XmltvReader::from_file(path, feed, self.dates, self.fixups) {
            Ok(reader) => reader,
            Err(e) => {
                self.diagnostics.feeds_failed += 1;
                return Err(e);
            }
        };
        self.run_feed(&path.display().to_string(), reader)
    }

    /// Final counters for the run
    pub fn finish(mut self) -> ReconciliationDiagnostics {
        for entry in self.entries.iter() {
            if entry.channels().is_empty() {
                self.diagnostics.entries_without_channel += 1;
                info!("No guide channel for '{}' ({})", entry.name(), entry.group_title().unwrap_or_default());
            } else if entry
                .channels()
                .values()
                .all(|channel| channel.borrow().programmes.is_empty())
            {
                self.diagnostics.entries_without_programmes += 1;
                debug!("No programmes for '{}'", entry.name());
            }
        }
        self.diagnostics
    }

    fn allocate_feed(&mut self) -> usize {
        let feed = self.next_feed;
        self.next_feed += 1;
        feed
    }

    fn run_feed<R: BufRead>(&mut self, label: &str, mut reader: XmltvReader<'_, R>) -> Result<FeedSummary, DecodeError> {
        info!("Processing guide feed {}", label);
        let started = Instant::now();
        let mut summary = FeedSummary::default();
        // Matched channels of this feed only; dropped when the feed ends
        let mut matched: HashMap<String, SharedChannel> = HashMap::new();

        let result = loop {
            match reader.next_element() {
                Ok(Some(GuideElement::Channel(channel))) => {
                    summary.channels_decoded += 1;
                    let channel = channel.into_shared();
                    if self.match_everywhere(&channel) {
                        summary.channels_matched += 1;
                        let id = channel.borrow().id.clone();
                        matched.insert(id, channel);
                    }
                }
                Ok(Some(GuideElement::Programme(programme))) => {
                    summary.programmes_decoded += 1;
                    if let Some(channel) = matched.get(&programme.channel) {
                        summary.programmes_kept += 1;
                        channel.borrow_mut().programmes.push(programme);
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        summary.elapsed = started.elapsed();
        self.diagnostics.channels_decoded += summary.channels_decoded;
        self.diagnostics.channels_matched += summary.channels_matched;
        self.diagnostics.programmes_decoded += summary.programmes_decoded;
        self.diagnostics.programmes_kept += summary.programmes_kept;

        match result {
            Ok(()) => {
                self.diagnostics.feeds_processed += 1;
                info!(
                    "Feed {}: {} channels ({} matched), {} programmes ({} kept) in {}",
                    label,
                    summary.channels_decoded,
                    summary.channels_matched,
                    summary.programmes_decoded,
                    summary.programmes_kept,
                    format_duration(summary.elapsed)
                );
                Ok(summary)
            }
            Err(e) => {
                self.diagnostics.feeds_failed += 1;
                Err(e)
            }
        }
    }

    /// Offers a channel to every entry. This is the hot spot of a run:
    /// O(entries x channels) alias comparisons per feed.
    fn match_everywhere(&mut self, channel: &SharedChannel) -> bool {
        let mut any = false;
        for entry in self.entries.iter_mut() {
            if match_channel(entry, channel).is_some() {
                any = true;
            }
        }
        any
    }
}

/// Playlist entries enriched with their guide channels, plus run counters
#[derive(Debug)]
pub struct ReconciliationOutcome {
    pub entries: Vec<PlaylistEntry>,
    pub diagnostics: ReconciliationDiagnostics,
}

/// Reconcile `entries` against the guide documents at `feeds`, in order.
///
/// A feed that fails to decode is logged and skipped; whatever it attached
/// before failing stays attached.
pub fn reconcile(
    mut entries: Vec<PlaylistEntry>,
    feeds: &[PathBuf],
    dates: ReferenceDates,
    fixups: &AliasFixups,
) -> ReconciliationOutcome {
    let diagnostics = {
        let mut reconciler = Reconciler::new(&mut entries, dates, fixups);
        for path in feeds {
            if let Err(e) = reconciler.process_feed_file(path) {
                error!("Failed to process guide feed {}: {}", path.display(), e);
            }
        }
        reconciler.finish()
    };

    ReconciliationOutcome {
        entries,
        diagnostics,
    }
}
