//! Extra display names for guide channels whose published names never match
//! common playlist naming.
//!
//! The table is keyed by the channel id used in the guide feeds. Ids and
//! names drift as providers rename channels, so the entries need periodic
//! review against the live feeds.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::models::{GuideChannel, NameValue};

/// Built-in fixups, applied to every feed
pub static STATIC_ALIAS_FIXUPS: &[(&str, &[&str])] = &[
    ("rentv-int", &["Рен ТВ", "REN TV"]),
    ("tnt", &["ТНТ", "TNT"]),
    ("tnt4", &["ТНТ4", "TNT4"]),
    ("ntv", &["НТВ", "NTV"]),
    ("ctc", &["СТС", "CTC"]),
    ("perviy-kanal", &["Первый канал", "Channel One"]),
    // Provider spells it with a Cyrillic "С"
    ("paramount-channel-hd", &["Paramount Сhannel HD", "Paramount Channel HD"]),
];

/// Lookup table of extra aliases keyed by channel id
#[derive(Debug, Clone, Default)]
pub struct AliasFixups {
    table: HashMap<String, Vec<String>>,
}

impl AliasFixups {
    /// The built-in table
    pub fn builtin() -> Self {
        let table = STATIC_ALIAS_FIXUPS
            .iter()
            .map(|(id, names)| {
                (
                    id.to_string(),
                    names.iter().map(|n| n.to_string()).collect(),
                )
            })
            .collect();
        Self { table }
    }

    /// Merges configured fixups after the existing ones
    pub fn with_extra(mut self, extra: &BTreeMap<String, Vec<String>>) -> Self {
        for (id, names) in extra {
            let slot = self.table.entry(id.clone()).or_default();
            for name in names {
                if !slot.contains(name) {
                    slot.push(name.clone());
                }
            }
        }
        self
    }

    /// Appends the fixup aliases for `channel`, returning how many were new
    pub fn apply(&self, channel: &mut GuideChannel) -> usize {
        let Some(names) = self.table.get(&channel.id) else {
            return 0;
        };

        let added = names
            .iter()
            .filter(|name| channel.add_alias(NameValue::new(name.as_str())))
            .count();
        if added > 0 {
            debug!("Applied {} alias fixups to channel '{}'", added, channel.id);
        }
        added
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
