use std::cell::OnceCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::guide::{ChannelKey, SharedChannel};
use super::{fold_case, NameValue};

/// Trailing tokens that mark a channel as the "original" (untranslated) feed
const ORIGINAL_SUFFIXES: &[&str] = &["orig", "Orig", "original", "Original"];

/// Alternative spellings of a playlist label that guide feeds list under a
/// base name. Tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameVariant {
    /// `Foo orig` is listed as `Foo`
    Original,
    /// `Foo FHD` is listed as `Foo HD`
    FullHd,
    /// `Foo UA` is listed as `Foo`
    Ukrainian,
}

impl NameVariant {
    pub const ALL: [NameVariant; 3] = [NameVariant::Original, NameVariant::FullHd, NameVariant::Ukrainian];

    /// The base name for `name`, or `None` when the rule does not apply
    pub fn derive(self, name: &str) -> Option<String> {
        match self {
            NameVariant::Original => strip_original_suffix(name),
            NameVariant::FullHd => replace_token(name, "FHD", Some("HD")),
            NameVariant::Ukrainian => replace_token(name, "UA", None),
        }
    }
}

/// A base name derived from the entry label
#[derive(Debug, Clone)]
pub struct DerivedName {
    pub variant: NameVariant,
    pub name: String,
    folded: String,
}

impl DerivedName {
    pub(crate) fn folded(&self) -> &str {
        &self.folded
    }
}

/// Optional `#EXTINF` attributes of a playlist entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryAttributes {
    pub tvg_name: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_logo: Option<String>,
    pub group_title: Option<String>,
    pub tvg_rec: Option<String>,
}

/// One channel of the user's playlist, together with every guide channel
/// matched to it so far.
#[derive(Debug)]
pub struct PlaylistEntry {
    name: String,
    url: String,
    attributes: EntryAttributes,
    name_folded: String,
    tvg_name_folded: Option<String>,
    derived_names: Vec<DerivedName>,
    channels: IndexMap<ChannelKey, SharedChannel>,
    learned_aliases: Vec<NameValue>,
    best_channel: OnceCell<Option<SharedChannel>>,
}

impl PlaylistEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>, attributes: EntryAttributes) -> Self {
        let name = name.into();
        let name_folded = fold_case(&name);
        let tvg_name_folded = attributes
            .tvg_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(fold_case);
        let derived_names = NameVariant::ALL
            .into_iter()
            .filter_map(|variant| {
                variant.derive(&name).map(|base| DerivedName {
                    variant,
                    folded: fold_case(&base),
                    name: base,
                })
            })
            .collect();

        Self {
            name,
            url: url.into(),
            attributes,
            name_folded,
            tvg_name_folded,
            derived_names,
            channels: IndexMap::new(),
            learned_aliases: Vec::new(),
            best_channel: OnceCell::new(),
        }
    }

    /// An entry is usable only with a label, a group and a stream URL
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && !self.url.is_empty()
            && self
                .attributes
                .group_title
                .as_deref()
                .is_some_and(|g| !g.is_empty())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn attributes(&self) -> &EntryAttributes {
        &self.attributes
    }

    pub fn group_title(&self) -> Option<&str> {
        self.attributes.group_title.as_deref()
    }

    pub fn name_without_original_suffix(&self) -> Option<&str> {
        self.derived_name(NameVariant::Original)
    }

    pub fn derived_name(&self, variant: NameVariant) -> Option<&str> {
        self.derived_names
            .iter()
            .find(|d| d.variant == variant)
            .map(|d| d.name.as_str())
    }

    /// Base names derived from the label, in the order they are tried
    pub fn derived_names(&self) -> &[DerivedName] {
        &self.derived_names
    }

    pub(crate) fn name_folded(&self) -> &str {
        &self.name_folded
    }

    pub(crate) fn tvg_name_folded(&self) -> Option<&str> {
        self.tvg_name_folded.as_deref()
    }

    pub fn learned_aliases(&self) -> &[NameValue] {
        &self.learned_aliases
    }

    /// Matched channels in the order they were first attached
    pub fn channels(&self) -> &IndexMap<ChannelKey, SharedChannel> {
        &self.channels
    }

    pub fn has_channel(&self, key: &ChannelKey) -> bool {
        self.channels.contains_key(key)
    }

    /// Stores a matched channel. A channel with the same key is replaced and
    /// keeps its original position.
    pub fn attach(&mut self, channel: SharedChannel) {
        let key = channel.borrow().key();
        self.channels.insert(key, channel);
        self.best_channel = OnceCell::new();
    }

    /// Records aliases of a channel matched through a derived name
    pub fn learn_aliases<'a>(&mut self, aliases: impl IntoIterator<Item = &'a NameValue>) {
        for alias in aliases {
            if !self.learned_aliases.contains(alias) {
                self.learned_aliases.push(alias.clone());
            }
        }
    }

    /// The matched channel with the most programmes that have not ended yet.
    ///
    /// Computed once on first use; ties go to the channel attached first.
    pub fn best_channel(&self) -> Option<SharedChannel> {
        self.best_channel
            .get_or_init(|| {
                let mut best: Option<(&SharedChannel, usize)> = None;
                for channel in self.channels.values() {
                    let count = channel.borrow().non_past_programme_count();
                    match best {
                        Some((_, best_count)) if count <= best_count => {}
                        _ => best = Some((channel, count)),
                    }
                }
                best.map(|(channel, _)| Rc::clone(channel))
            })
            .clone()
    }

    /// `tvg-id` from the playlist if set, otherwise the best channel's id
    pub fn effective_id(&self) -> Option<String> {
        match self.attributes.tvg_id.as_deref() {
            Some(id) if !id.is_empty() => Some(id.to_string()),
            _ => self.best_channel().map(|c| c.borrow().id.clone()),
        }
    }

    /// `tvg-logo` from the playlist if set, otherwise the first matched
    /// channel that has an icon
    pub fn effective_logo(&self) -> Option<String> {
        match self.attributes.tvg_logo.as_deref() {
            Some(logo) if !logo.is_empty() => Some(logo.to_string()),
            _ => self
                .channels
                .values()
                .find_map(|c| c.borrow().icon_url.clone().filter(|u| !u.is_empty())),
        }
    }
}

/// Removes trailing "orig"-style tokens from a channel label.
///
/// Returns `None` when nothing was stripped or when stripping would leave an
/// empty name.
fn strip_original_suffix(name: &str) -> Option<String> {
    let mut rest = name.trim_end();
    let mut stripped = false;

    loop {
        let Some((head, last)) = rest.rsplit_once(char::is_whitespace) else {
            break;
        };
        if !ORIGINAL_SUFFIXES.contains(&last) {
            break;
        }
        let head = head.trim_end();
        if head.is_empty() {
            break;
        }
        rest = head;
        stripped = true;
    }

    stripped.then(|| rest.to_string())
}

/// Replaces every whitespace-separated `token` with `replacement`, or drops
/// it when there is none. Whitespace runs collapse to single spaces.
fn replace_token(name: &str, token: &str, replacement: Option<&str>) -> Option<String> {
    let mut found = false;
    let words: Vec<&str> = name
        .split_whitespace()
        .enumerate()
        .filter_map(|(position, word)| {
            if position == 0 || word != token {
                return Some(word);
            }
            found = true;
            replacement
        })
        .collect();
    (found && !words.is_empty()).then(|| words.join(" "))
}
