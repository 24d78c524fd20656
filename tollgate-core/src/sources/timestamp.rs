//! Timestamp normalization with ordered fallbacks.
//!
//! Indexers disagree on how they encode time. Each source carries an ordered
//! list of candidate formats; the first one that parses wins.

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// One candidate timestamp encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `2024-05-01T12:34:56.123456` with no offset, interpreted as UTC.
    NaiveUtcSubsecond,
    /// `2024-05-01T12:34:56` with no offset, interpreted as UTC.
    NaiveUtc,
    /// RFC 3339 with an explicit offset.
    Rfc3339,
    /// Integer seconds since the Unix epoch.
    UnixSeconds,
    /// Integer milliseconds since the Unix epoch.
    UnixMillis,
}

impl TimestampFormat {
    fn parse(self, raw: &str) -> Option<i64> {
        let datetime = match self {
            TimestampFormat::NaiveUtcSubsecond => PrimitiveDateTime::parse(
                raw,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
            )
            .ok()?
            .assume_utc(),
            TimestampFormat::NaiveUtc => PrimitiveDateTime::parse(
                raw,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            )
            .ok()?
            .assume_utc(),
            TimestampFormat::Rfc3339 => OffsetDateTime::parse(raw, &Rfc3339).ok()?,
            TimestampFormat::UnixSeconds => {
                return raw.parse::<i64>().ok()?.checked_mul(1000);
            }
            TimestampFormat::UnixMillis => return raw.parse::<i64>().ok(),
        };
        Some((datetime.unix_timestamp_nanos() / 1_000_000) as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("timestamp {raw:?} matched none of {tried} candidate formats")]
pub struct TimestampParseError {
    pub raw: String,
    pub tried: usize,
}

/// Ordered list of candidate formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampParser {
    formats: Vec<TimestampFormat>,
}

impl TimestampParser {
    pub fn new(formats: impl Into<Vec<TimestampFormat>>) -> Self {
        Self {
            formats: formats.into(),
        }
    }

    /// Parse `raw` into UTC milliseconds using the first matching format.
    pub fn parse_millis(&self, raw: &str) -> Result<i64, TimestampParseError> {
        let raw = raw.trim();
        self.formats
            .iter()
            .find_map(|format| format.parse(raw))
            .ok_or_else(|| TimestampParseError {
                raw: raw.to_string(),
                tried: self.formats.len(),
            })
    }
}
