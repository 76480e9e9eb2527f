//! Datetime parsing and formatting
//!
//! Two families of timestamps show up in this application:
//!
//! - XMLTV programme times (`20240310193000 +0300`), parsed into the offset
//!   they were written in so the calendar date seen by the pruning rules is
//!   the broadcaster's local date.
//! - HTTP dates (`Sun, 10 Mar 2024 16:30:00 GMT`) used for `Last-Modified`
//!   and `If-Modified-Since`.
//!
//! ```rust
//! use epg_merger::utils::datetime::DateTimeParser;
//!
//! let start = DateTimeParser::parse_xmltv("20240310193000 +0300").unwrap();
//! assert_eq!(start.to_rfc3339(), "2024-03-10T19:30:00+03:00");
//! ```

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use thiserror::Error;

const XMLTV_FORMATS: &[&str] = &["%Y%m%d%H%M%S", "%Y%m%d%H%M"];
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Errors that can occur during datetime operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DateTimeError {
    /// The timestamp digits match none of the accepted layouts
    #[error("Invalid datetime format: '{input}'")]
    InvalidFormat { input: String },

    /// The `±hhmm` offset could not be parsed
    #[error("Failed to parse timezone offset from: '{input}'")]
    TimezoneParseError { input: String },
}

/// Datetime parsing and formatting helpers
pub struct DateTimeParser;

impl DateTimeParser {
    /// Parse an XMLTV timestamp.
    ///
    /// Supports:
    /// - `YYYYMMDDhhmmss ±hhmm`
    /// - `YYYYMMDDhhmmss` (UTC)
    /// - `YYYYMMDDhhmm` (UTC)
    pub fn parse_xmltv(raw: &str) -> Result<DateTime<FixedOffset>, DateTimeError> {
        let trimmed = raw.trim();
        let (digits, offset) = match trimmed.split_once(char::is_whitespace) {
            Some((digits, offset)) => (digits, Some(offset.trim())),
            // Some feeds glue the offset straight onto the seconds
            None if trimmed.len() > 14 && trimmed.is_char_boundary(14) => {
                let (digits, offset) = trimmed.split_at(14);
                (digits, Some(offset))
            }
            None => (trimmed, None),
        };

        let naive = XMLTV_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(digits, format).ok())
            .ok_or_else(|| DateTimeError::InvalidFormat {
                input: raw.to_string(),
            })?;

        let offset = match offset {
            Some(offset) if !offset.is_empty() => parse_offset(offset).ok_or_else(|| {
                DateTimeError::TimezoneParseError {
                    input: raw.to_string(),
                }
            })?,
            _ => utc_offset(),
        };

        offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| DateTimeError::InvalidFormat {
                input: raw.to_string(),
            })
    }

    /// Format a timestamp for `Last-Modified` style headers
    pub fn format_http_date(datetime: &DateTime<Utc>) -> String {
        datetime.format(HTTP_DATE_FORMAT).to_string()
    }

    /// Parse an `If-Modified-Since` style header value
    pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>, DateTimeError> {
        let value = value.trim();

        if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
            return Ok(dt.with_timezone(&Utc));
        }

        for format in [HTTP_DATE_FORMAT, "%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(Utc.from_utc_datetime(&naive));
            }
        }

        Err(DateTimeError::InvalidFormat {
            input: value.to_string(),
        })
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parses `+0300`, `-0530` or `Z`
fn parse_offset(offset: &str) -> Option<FixedOffset> {
    if offset.eq_ignore_ascii_case("z") || offset.eq_ignore_ascii_case("utc") {
        return Some(utc_offset());
    }

    let (sign, digits) = match offset.as_bytes().first()? {
        b'+' => (1, &offset[1..]),
        b'-' => (-1, &offset[1..]),
        _ => (1, offset),
    };
    let digits = digits.replace(':', "");
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
