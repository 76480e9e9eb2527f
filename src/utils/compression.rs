//! Gzip handling for downloaded feeds and rendered artifacts
//!
//! Files are processed as streams so multi-megabyte guides never have to be
//! held in memory, and every write goes through a sibling temporary file
//! that is renamed into place once complete.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Gzip detection, compression and decompression helpers
pub struct CompressionService;

impl CompressionService {
    /// Detect gzip data by its magic bytes
    pub fn is_gzip(data: &[u8]) -> bool {
        data.len() >= 2 && data[..2] == GZIP_MAGIC
    }

    /// Check whether a file starts with the gzip magic bytes
    pub fn is_gzip_file(path: &Path) -> io::Result<bool> {
        let mut magic = [0u8; 2];
        let mut file = File::open(path)?;
        let mut read = 0;
        while read < magic.len() {
            match file.read(&mut magic[read..])? {
                0 => break,
                n => read += n,
            }
        }
        Ok(Self::is_gzip(&magic[..read]))
    }

    /// Inflate `source` into `target`. `source` and `target` may be the same path.
    pub fn gunzip_file(source: &Path, target: &Path) -> io::Result<u64> {
        let input = BufReader::new(File::open(source)?);
        let mut decoder = GzDecoder::new(input);
        let written = write_via_temp(target, |out| io::copy(&mut decoder, out))?;
        if source != target {
            fs::remove_file(source)?;
        }
        Ok(written)
    }

    /// Write a gzip copy of `source` to `target`
    pub fn gzip_file(source: &Path, target: &Path) -> io::Result<u64> {
        let mut input = BufReader::new(File::open(source)?);
        write_via_temp(target, |out| {
            let mut encoder = GzEncoder::new(out, Compression::best());
            let copied = io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
            Ok(copied)
        })
    }

    /// Compress an in-memory body
    pub fn gzip_bytes(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::best());
        encoder.write_all(data)?;
        encoder.finish()
    }
}

/// Path of the temporary sibling used while `path` is being written
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Runs `write` against a temporary sibling of `path`, then renames it over
/// `path`. The temporary file is removed if `write` fails.
pub fn write_via_temp<T>(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> io::Result<T>,
) -> io::Result<T> {
    let temp = temp_path_for(path);
    let result = (|| -> io::Result<T> {
        let mut out = BufWriter::new(File::create(&temp)?);
        let value = write(&mut out)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(value)
    })();

    match result {
        Ok(value) => {
            fs::rename(&temp, path)?;
            Ok(value)
        }
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_gzip() {
        let compressed = CompressionService::gzip_bytes(b"Hello, world!").unwrap();
        assert!(CompressionService::is_gzip(&compressed));
        assert!(!CompressionService::is_gzip(b"<?xml"));
        assert!(!CompressionService::is_gzip(b""));
    }

    #[test]
    fn test_gzip_then_gunzip_in_place() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("epg-1.xml");
        let packed = dir.path().join("epg-1.xml.gz");
        fs::write(&plain, "<tv></tv>").unwrap();

        CompressionService::gzip_file(&plain, &packed).unwrap();
        assert!(CompressionService::is_gzip_file(&packed).unwrap());

        CompressionService::gunzip_file(&packed, &packed).unwrap();
        assert_eq!(fs::read_to_string(&packed).unwrap(), "<tv></tv>");
        assert!(!temp_path_for(&packed).exists());
    }

    #[test]
    fn test_gunzip_removes_source() {
        let dir = TempDir::new().unwrap();
        let packed = dir.path().join("feed.gz");
        let target = dir.path().join("feed.xml");
        fs::write(&packed, CompressionService::gzip_bytes(b"data").unwrap()).unwrap();

        let written = CompressionService::gunzip_file(&packed, &target).unwrap();
        assert_eq!(written, 4);
        assert!(!packed.exists());
        assert_eq!(fs::read(&target).unwrap(), b"data");
    }

    #[test]
    fn test_failed_write_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("ttv.m3u");
        fs::write(&target, "old").unwrap();

        let result: io::Result<()> = write_via_temp(&target, |out| {
            out.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert!(!temp_path_for(&target).exists());
    }
}
