use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::errors::FormatError;
use crate::models::{EntryAttributes, PlaylistEntry};

const HEADER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF:";
const EXTGRP: &str = "#EXTGRP:";
const BOM: char = '\u{feff}';

/// Tokens of one `#EXTINF:` line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoLine {
    pub duration: String,
    /// `key="value"` pairs in line order, keys lower-cased
    pub attributes: Vec<(String, String)>,
    /// Free text after the first comma outside quotes
    pub label: String,
}

impl InfoLine {
    /// First value recorded for `key`
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct PendingEntry {
    info: InfoLine,
    group_override: Option<String>,
}

/// Parser for extended M3U playlists
pub struct M3uParser;

impl M3uParser {
    pub fn parse_file(path: &Path) -> Result<Vec<PlaylistEntry>, FormatError> {
        let file = File::open(path).map_err(|source| FormatError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(BufReader::new(file))
    }

    pub fn parse_str(content: &str) -> Result<Vec<PlaylistEntry>, FormatError> {
        Self::parse(content.as_bytes())
    }

    /// Parse a playlist into its valid entries, in document order.
    ///
    /// Only a missing `#EXTM3U` header is an error. Entries that are
    /// incomplete or invalid are skipped.
    pub fn parse<R: BufRead>(mut reader: R) -> Result<Vec<PlaylistEntry>, FormatError> {
        let mut raw = Vec::new();
        let mut line_number = 0usize;
        let mut entries = Vec::new();
        let mut pending: Option<PendingEntry> = None;
        let mut skipped = 0usize;

        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            line_number += 1;
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim();

            if line_number == 1 {
                let header = line.trim_start_matches(BOM).trim_start();
                if !header.starts_with(HEADER) {
                    return Err(FormatError::MissingHeader {
                        first_line: header.chars().take(80).collect(),
                    });
                }
                continue;
            }

            if line.is_empty() {
                continue;
            }

            if let Some(body) = line.strip_prefix(EXTINF) {
                if pending.is_some() {
                    debug!("Line {}: #EXTINF without a URL, dropping previous entry", line_number);
                    skipped += 1;
                }
                pending = Some(PendingEntry {
                    info: Self::parse_extinf_line(body),
                    group_override: None,
                });
            } else if let Some(group) = line.strip_prefix(EXTGRP) {
                if let Some(entry) = pending.as_mut() {
                    entry.group_override = Some(group.trim().to_string());
                }
            } else if line.starts_with('#') {
                continue;
            } else {
                let entry = Self::build_entry(pending.take().unwrap_or_default(), line);
                if entry.is_valid() {
                    entries.push(entry);
                } else {
                    debug!("Line {}: skipping invalid entry '{}'", line_number, entry.name());
                    skipped += 1;
                }
            }
        }

        if line_number == 0 {
            return Err(FormatError::MissingHeader {
                first_line: String::new(),
            });
        }

        info!(
            "Parsed playlist: {} entries, {} skipped",
            entries.len(),
            skipped
        );
        Ok(entries)
    }

    fn build_entry(pending: PendingEntry, url: &str) -> PlaylistEntry {
        let PendingEntry {
            info,
            group_override,
        } = pending;
        let owned = |key: &str| info.attribute(key).map(str::to_string);

        let attributes = EntryAttributes {
            tvg_name: owned("tvg-name"),
            tvg_id: owned("tvg-id"),
            tvg_logo: owned("tvg-logo"),
            group_title: group_override.or_else(|| owned("group-title")),
            tvg_rec: owned("tvg-rec"),
        };

        PlaylistEntry::new(info.label.clone(), url, attributes)
    }

    /// Tokenize the part of an info line after `#EXTINF:`.
    ///
    /// `-1 tvg-id="x" group-title="News, Local",Channel Name` yields duration
    /// `-1`, two attributes and the label `Channel Name`. Values may be quoted
    /// or bare; an unterminated quote runs to the end of the line.
    pub fn parse_extinf_line(body: &str) -> InfoLine {
        let mut info = InfoLine::default();
        let mut rest = body.trim_start();

        let end = rest
            .find(|c: char| c == ',' || c.is_whitespace())
            .unwrap_or(rest.len());
        info.duration = rest[..end].to_string();
        rest = &rest[end..];

        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            if let Some(label) = rest.strip_prefix(',') {
                info.label = label.trim().to_string();
                break;
            }

            let key_end = rest
                .find(|c: char| c == '=' || c == ',' || c.is_whitespace())
                .unwrap_or(rest.len());
            let key = &rest[..key_end];
            rest = &rest[key_end..];

            // A bare word without '=' carries no attribute
            let Some(after_eq) = rest.strip_prefix('=') else {
                continue;
            };

            let (value, remaining) = match after_eq.strip_prefix('"') {
                Some(quoted) => match quoted.find('"') {
                    Some(close) => (&quoted[..close], &quoted[close + 1..]),
                    None => (quoted, ""),
                },
                None => {
                    let end = after_eq
                        .find(|c: char| c == ',' || c.is_whitespace())
                        .unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };

            if !key.is_empty() {
                info.attributes
                    .push((key.to_ascii_lowercase(), value.to_string()));
            }
            rest = remaining;
        }

        info
    }
}
