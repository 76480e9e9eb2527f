//! Error type definitions for the EPG merger

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// The playlist could not be parsed
    #[error("Playlist error: {0}")]
    Format(#[from] FormatError),

    /// A guide document could not be decoded
    #[error("Guide error: {0}")]
    Decode(#[from] DecodeError),

    /// Downloading a source failed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Filesystem errors while reading or writing the cache
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A run exceeded its time budget
    #[error("{operation} timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Playlist format errors
#[derive(Error, Debug)]
pub enum FormatError {
    /// The first line does not carry the `#EXTM3U` marker
    #[error("not an M3U playlist, first line is '{first_line}'")]
    MissingHeader { first_line: String },

    /// The playlist stream failed mid-read
    #[error("failed to read playlist: {0}")]
    Io(#[from] std::io::Error),

    /// The playlist file could not be opened
    #[error("failed to read playlist {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Guide document decode errors
///
/// Any of these aborts the feed being decoded; other feeds of the same run
/// are still processed.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A `<channel>` element has no usable `id`
    #[error("<channel> without an id attribute at byte {position}")]
    MissingChannelId { position: u64 },

    /// A required attribute is missing from an element
    #[error("<{element}> without a '{attribute}' attribute at byte {position}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
        position: u64,
    },

    /// The document ended inside an element
    #[error("document ended inside <{element}>")]
    UnexpectedEof { element: &'static str },

    /// The XML itself is malformed
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    /// The guide document could not be opened
    #[error("failed to open guide document {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source download errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request failed before a response was read completely
    #[error("HTTP request failed for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("HTTP error {status} for {url}")]
    Http { url: String, status: u16 },

    /// Writing the downloaded body failed
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The downloaded body claimed to be gzip but could not be inflated
    #[error("Failed to decompress {path}: {source}")]
    Decompress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }
}

impl SourceError {
    /// Create a write error for the given path
    pub fn write<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
