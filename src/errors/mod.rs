//! Centralized error handling for the EPG merger
//!
//! Each layer has its own error enum so callers can decide how far a failure
//! is allowed to travel:
//!
//! - **FormatError**: the playlist is not an M3U document. Fatal for the run.
//! - **DecodeError**: a guide document is broken. Fatal for that feed only.
//! - **SourceError**: downloading a playlist or feed failed.
//! - **AppError**: top-level type used by the service and web layers.
//!
//! Unparseable programme timestamps are not errors at this level; they are
//! recovered where they are decoded (see [`crate::utils::datetime`]).

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;
