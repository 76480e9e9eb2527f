//! On-disk layout of the cache directory
//!
//! ```text
//! .cache/
//!   m3u.m3u            downloaded playlist      m3u.etag
//!   epg-1.xml          downloaded guide feeds   epg-1.etag
//!   epg-2.xml ...
//!   ttv.m3u            rendered playlist        ttv.m3u.gz
//!   epg-all.xml        rendered guide           epg-all.xml.gz
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

pub const PLAYLIST_FILE: &str = "m3u.m3u";
pub const PLAYLIST_OUTPUT_FILE: &str = "ttv.m3u";
pub const GUIDE_OUTPUT_FILE: &str = "epg-all.xml";
const VALIDATOR_EXTENSION: &str = "etag";

fn feed_document_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^epg-(\d+)\.xml$").unwrap_or_else(|e| panic!("invalid feed pattern: {e}"))
    })
}

/// Where one download lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// File the response body is streamed into
    pub download: PathBuf,
    /// Uncompressed file the rest of the pipeline reads
    pub cached: PathBuf,
    /// JSON sidecar with the response's ETag and Last-Modified
    pub validators: PathBuf,
}

impl DownloadTarget {
    pub fn is_compressed(&self) -> bool {
        self.download != self.cached
    }
}

/// Paths inside the cache directory
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_exists(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn playlist_target(&self) -> DownloadTarget {
        let cached = self.root.join(PLAYLIST_FILE);
        DownloadTarget {
            download: cached.clone(),
            validators: cached.with_extension(VALIDATOR_EXTENSION),
            cached,
        }
    }

    /// Target for the `index`-th guide feed (1-based). Feeds published as
    /// `.gz` are downloaded next to their uncompressed name.
    pub fn feed_target(&self, index: usize, url: &str) -> DownloadTarget {
        let cached = self.root.join(format!("epg-{}.xml", index));
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let download = if path.ends_with(".gz") {
            self.root.join(format!("epg-{}.xml.gz", index))
        } else {
            cached.clone()
        };
        DownloadTarget {
            download,
            validators: self.root.join(format!("epg-{}.{}", index, VALIDATOR_EXTENSION)),
            cached,
        }
    }

    pub fn playlist_input(&self) -> PathBuf {
        self.root.join(PLAYLIST_FILE)
    }

    pub fn playlist_output(&self) -> PathBuf {
        self.root.join(PLAYLIST_OUTPUT_FILE)
    }

    pub fn guide_output(&self) -> PathBuf {
        self.root.join(GUIDE_OUTPUT_FILE)
    }

    /// Guide documents present in the cache, ordered by their numeric suffix
    pub fn feed_documents(&self) -> io::Result<Vec<PathBuf>> {
        let mut found: Vec<(u64, PathBuf)> = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(captures) = feed_document_pattern().captures(name) else {
                continue;
            };
            if let Ok(index) = captures[1].parse::<u64>() {
                if dir_entry.file_type()?.is_file() {
                    found.push((index, dir_entry.path()));
                }
            }
        }
        found.sort_by_key(|(index, _)| *index);
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }
}

/// `path` with `.gz` appended
pub fn gzipped(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".gz");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_feed_targets() {
        let layout = CacheLayout::new("/cache");

        let packed = layout.feed_target(3, "https://iptvx.one/epg/epg.xml.gz");
        assert_eq!(packed.download, PathBuf::from("/cache/epg-3.xml.gz"));
        assert_eq!(packed.cached, PathBuf::from("/cache/epg-3.xml"));
        assert_eq!(packed.validators, PathBuf::from("/cache/epg-3.etag"));
        assert!(packed.is_compressed());

        let plain = layout.feed_target(5, "https://example.org/epg.xml?x=guide.gz");
        assert_eq!(plain.download, plain.cached);
        assert!(!plain.is_compressed());

        let playlist = layout.playlist_target();
        assert_eq!(playlist.cached, PathBuf::from("/cache/m3u.m3u"));
        assert_eq!(playlist.validators, PathBuf::from("/cache/m3u.etag"));
    }

    #[test]
    fn test_feed_documents_numeric_order() {
        let dir = TempDir::new().unwrap();
        for name in ["epg-10.xml", "epg-2.xml", "epg-1.xml", "epg-all.xml", "epg-3.xml.gz", "epg-4.etag"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let layout = CacheLayout::new(dir.path());
        let names: Vec<String> = layout
            .feed_documents()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["epg-1.xml", "epg-2.xml", "epg-10.xml"]);
    }

    #[test]
    fn test_gzipped_name() {
        assert_eq!(gzipped(Path::new("/c/epg-all.xml")), PathBuf::from("/c/epg-all.xml.gz"));
        assert_eq!(gzipped(Path::new("/c/ttv.m3u")), PathBuf::from("/c/ttv.m3u.gz"));
    }
}
