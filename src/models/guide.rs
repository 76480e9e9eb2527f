use chrono::{DateTime, Days, FixedOffset, NaiveDate};
use std::cell::RefCell;
use std::rc::Rc;

use super::NameValue;

/// A guide channel shared between every playlist entry it matched.
///
/// Reconciliation is single-threaded; sharing lets aliases learned through
/// one entry, and programmes decoded after the match, show up for all of them.
pub type SharedChannel = Rc<RefCell<GuideChannel>>;

/// Reference dates used to classify programmes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceDates {
    pub today: NaiveDate,
    pub horizon: NaiveDate,
}

impl ReferenceDates {
    pub const DEFAULT_HORIZON_DAYS: u64 = 7;

    pub fn new(today: NaiveDate) -> Self {
        Self::with_horizon(today, Self::DEFAULT_HORIZON_DAYS)
    }

    pub fn with_horizon(today: NaiveDate, horizon_days: u64) -> Self {
        let horizon = today
            .checked_add_days(Days::new(horizon_days))
            .unwrap_or(NaiveDate::MAX);
        Self { today, horizon }
    }
}

/// Identifies a guide channel across feeds.
///
/// Channel ids are only unique inside one feed document, so the feed index is
/// part of the key. Ordering puts earlier feeds first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey {
    pub feed: usize,
    pub id: String,
}

/// One `<channel>` element of a guide feed
#[derive(Debug, Clone)]
pub struct GuideChannel {
    pub id: String,
    /// Index of the feed this channel was decoded from
    pub feed: usize,
    pub icon_url: Option<String>,
    /// Display names in document order, followed by fixups and learned aliases
    pub aliases: Vec<NameValue>,
    pub programmes: Vec<Programme>,
}

impl GuideChannel {
    pub fn new(id: impl Into<String>, feed: usize) -> Self {
        Self {
            id: id.into(),
            feed,
            icon_url: None,
            aliases: Vec::new(),
            programmes: Vec::new(),
        }
    }

    pub fn key(&self) -> ChannelKey {
        ChannelKey {
            feed: self.feed,
            id: self.id.clone(),
        }
    }

    /// First alias, used when a single display name is needed
    pub fn canonical_name(&self) -> Option<&NameValue> {
        self.aliases.first()
    }

    /// Appends an alias unless an equal one is already present.
    /// Returns whether the alias was added.
    pub fn add_alias(&mut self, alias: NameValue) -> bool {
        if self.aliases.contains(&alias) {
            return false;
        }
        self.aliases.push(alias);
        true
    }

    pub fn non_past_programme_count(&self) -> usize {
        self.programmes.iter().filter(|p| !p.is_past).count()
    }

    pub fn into_shared(self) -> SharedChannel {
        Rc::new(RefCell::new(self))
    }
}

/// One `<programme>` element, owned by the channel it references
#[derive(Debug, Clone)]
pub struct Programme {
    /// Id of the channel in the feed this programme came from
    pub channel: String,
    pub start: String,
    pub stop: String,
    pub titles: Vec<NameValue>,
    pub descriptions: Vec<NameValue>,
    pub categories: Vec<NameValue>,
    pub start_date: Option<DateTime<FixedOffset>>,
    pub stop_date: Option<DateTime<FixedOffset>>,
    /// Stopped before the reference day
    pub is_past: bool,
    /// Starts after the forward horizon
    pub is_beyond_horizon: bool,
}

impl Programme {
    pub fn new(channel: impl Into<String>, start: impl Into<String>, stop: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            start: start.into(),
            stop: stop.into(),
            titles: Vec::new(),
            descriptions: Vec::new(),
            categories: Vec::new(),
            start_date: None,
            stop_date: None,
            is_past: false,
            is_beyond_horizon: false,
        }
    }

    /// Computes the pruning flags from the parsed dates.
    ///
    /// A missing date leaves the corresponding flag unset so the programme is
    /// kept rather than silently dropped.
    pub fn classify(&mut self, dates: &ReferenceDates) {
        self.is_past = self
            .stop_date
            .is_some_and(|stop| stop.date_naive() < dates.today);
        self.is_beyond_horizon = self
            .start_date
            .is_some_and(|start| start.date_naive() > dates.horizon);
    }

    pub fn is_pruned(&self) -> bool {
        self.is_past || self.is_beyond_horizon
    }
}
