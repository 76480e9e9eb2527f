use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::rc::Rc;

use quick_xml::escape::escape;
use tracing::{debug, info, warn};

use crate::models::{
    ChannelKey, GuideChannel, NameValue, PlaylistEntry, Programme, ReconciliationDiagnostics,
    SharedChannel,
};

pub const GENERATOR_NAME: &str = "epg-merger";

/// Renders reconciled playlist entries as an M3U playlist and an XMLTV guide
pub struct ProxyGenerator {
    public_host: String,
}

impl ProxyGenerator {
    /// `public_host` is the `host[:port]` clients use to reach this service;
    /// the guide's DOCTYPE points there for the DTD.
    pub fn new(public_host: impl Into<String>) -> Self {
        Self {
            public_host: public_host.into(),
        }
    }

    /// Writes one block per valid entry, in playlist order.
    ///
    /// ```text
    /// #EXTINF:-1 tvg-id="id" tvg-logo="logo",Name
    /// #EXTGRP:Group
    /// http://stream
    /// ```
    ///
    /// Entries with neither an id nor a logo get `tvg-rec="0"` instead.
    pub fn write_playlist<W: Write>(&self, entries: &[PlaylistEntry], out: &mut W) -> io::Result<usize> {
        let mut written = 0;
        for entry in entries.iter().filter(|e| e.is_valid()) {
            let id = entry.effective_id();
            let logo = entry.effective_logo();

            let mut info = String::from("#EXTINF:-1");
            if let Some(id) = &id {
                info.push_str(&format!(" tvg-id=\"{}\"", id));
            }
            if let Some(logo) = &logo {
                info.push_str(&format!(" tvg-logo=\"{}\"", logo));
            }
            if id.is_none() && logo.is_none() {
                info.push_str(" tvg-rec=\"0\"");
            }

            writeln!(out, "{},{}", info, entry.name())?;
            writeln!(out, "#EXTGRP:{}", entry.group_title().unwrap_or_default())?;
            writeln!(out, "{}", entry.url())?;
            written += 1;
        }
        debug!("Wrote {} playlist entries", written);
        Ok(written)
    }

    /// Writes the guide: every distinct best channel, then their programmes
    /// that fall inside the reference window.
    pub fn write_guide<W: Write>(
        &self,
        entries: &[PlaylistEntry],
        diagnostics: &mut ReconciliationDiagnostics,
        out: &mut W,
    ) -> io::Result<()> {
        let channels = distinct_best_channels(entries);

        writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        writeln!(
            out,
            r#"<!DOCTYPE tv SYSTEM "http://{}/xmltv.dtd">"#,
            escape(self.public_host.as_str())
        )?;
        writeln!(out, r#"<tv generator-info-name="{}">"#, GENERATOR_NAME)?;

        for channel in &channels {
            write_channel_fragment(&channel.borrow(), out)?;
        }

        for channel in &channels {
            let channel = channel.borrow();
            for programme in &channel.programmes {
                if programme.is_pruned() {
                    diagnostics.record_pruned(programme);
                    continue;
                }
                diagnostics.record_programme_window(programme);
                write_programme_fragment(programme, &channel.id, out)?;
                diagnostics.programmes_written += 1;
            }
        }

        writeln!(out, "</tv>")?;
        info!(
            "Wrote guide with {} channels and {} programmes",
            channels.len(),
            diagnostics.programmes_written
        );
        Ok(())
    }
}

/// Best channels of `entries`, first occurrence order, each channel once.
///
/// Channels from different feeds may carry the same id; both are kept and
/// their programmes end up under one `channel` attribute.
fn distinct_best_channels(entries: &[PlaylistEntry]) -> Vec<SharedChannel> {
    let mut seen: HashSet<ChannelKey> = HashSet::new();
    let mut feeds_by_id: HashMap<String, usize> = HashMap::new();
    let mut channels = Vec::new();
    for entry in entries.iter().filter(|e| e.is_valid()) {
        if let Some(channel) = entry.best_channel() {
            let key = channel.borrow().key();
            if !seen.insert(key.clone()) {
                continue;
            }
            match feeds_by_id.get(&key.id) {
                Some(&feed) => warn!(
                    "Channel id '{}' is used by feeds {} and {}; '{}' shares its guide listing",
                    key.id,
                    feed + 1,
                    key.feed + 1,
                    entry.name()
                ),
                None => {
                    feeds_by_id.insert(key.id.clone(), key.feed);
                }
            }
            channels.push(Rc::clone(&channel));
        }
    }
    channels
}

/// Renders one `<channel>` block
pub fn write_channel_fragment<W: Write>(channel: &GuideChannel, out: &mut W) -> io::Result<()> {
    writeln!(out, r#"  <channel id="{}">"#, escape(channel.id.as_str()))?;
    for alias in &channel.aliases {
        write_named_child(out, "display-name", alias)?;
    }
    if let Some(icon) = &channel.icon_url {
        writeln!(out, r#"    <icon src="{}"/>"#, escape(icon.as_str()))?;
    }
    writeln!(out, "  </channel>")
}

/// Renders one `<programme>` block under `channel_id`
pub fn write_programme_fragment<W: Write>(
    programme: &Programme,
    channel_id: &str,
    out: &mut W,
) -> io::Result<()> {
    writeln!(
        out,
        r#"  <programme start="{}" stop="{}" channel="{}">"#,
        escape(programme.start.as_str()),
        escape(programme.stop.as_str()),
        escape(channel_id)
    )?;
    for category in &programme.categories {
        write_named_child(out, "category", category)?;
    }
    for title in &programme.titles {
        write_named_child(out, "title", title)?;
    }
    for desc in &programme.descriptions {
        write_named_child(out, "desc", desc)?;
    }
    writeln!(out, "  </programme>")
}

fn write_named_child<W: Write>(out: &mut W, tag: &str, value: &NameValue) -> io::Result<()> {
    match value.lang() {
        Some(lang) => writeln!(
            out,
            r#"    <{tag} lang="{}">{}</{tag}>"#,
            escape(lang),
            escape(value.text())
        ),
        None => writeln!(out, "    <{tag}>{}</{tag}>", escape(value.text())),
    }
}
