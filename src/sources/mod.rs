//! Playlist and guide sources: where downloads go and how they are fetched

pub mod cache;
pub mod downloader;

pub use cache::{gzipped, CacheLayout, DownloadTarget};
pub use downloader::{CacheValidators, Downloader, FetchOutcome};
