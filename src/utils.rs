//! Utility functions for the EPG merger
//!
//! - `utils::datetime` for XMLTV and HTTP timestamps
//! - `utils::compression` for gzip handling of feeds and artifacts
//! - `utils::human_format` for log-friendly sizes and durations
//! - `utils::url` for logging URLs without credentials

pub mod compression;
pub mod datetime;
pub mod human_format;
pub mod url;
