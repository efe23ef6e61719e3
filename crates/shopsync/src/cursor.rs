//! Cursor positions for incremental streams
//!
//! A cursor is the high-water mark used to ask the source for "what's new".
//! Within a session it only moves forward (`max(current, observed)`); the
//! zero value is `Default::default()`.
//!
//! | Cursor | Stream | Persisted as |
//! |--------|--------|--------------|
//! | [`RecordId`] | customers | decimal integer |
//! | [`OrderTime`] | orders | RFC 3339 timestamp, empty when unset |

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Failure to decode a persisted cursor
#[derive(Debug, Error)]
#[error("invalid cursor value '{value}': {reason}")]
pub struct CursorParseError {
    pub value: String,
    pub reason: String,
}

impl CursorParseError {
    fn new(value: &str, reason: impl fmt::Display) -> Self {
        Self {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A totally ordered, persistable stream position.
pub trait Cursor: Clone + Ord + Default + fmt::Debug + Send + Sync + 'static {
    /// Plain-text form written to the checkpoint file
    fn encode(&self) -> String;

    /// Parse the plain-text form; surrounding whitespace is ignored
    fn decode(raw: &str) -> Result<Self, CursorParseError>;

    /// Advance to `observed` if it is ahead of the current position.
    ///
    /// Returns true when the cursor moved.
    fn advance(&mut self, observed: &Self) -> bool {
        if *observed > *self {
            *self = observed.clone();
            true
        } else {
            false
        }
    }
}

/// Strictly monotonic record id (customer stream).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

impl Cursor for RecordId {
    fn encode(&self) -> String {
        self.0.to_string()
    }

    fn decode(raw: &str) -> Result<Self, CursorParseError> {
        raw.trim()
            .parse::<u64>()
            .map(RecordId)
            .map_err(|e| CursorParseError::new(raw, e))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order timestamp (order stream). `None` means "no lower bound".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderTime(pub Option<DateTime<FixedOffset>>);

impl OrderTime {
    pub fn at(time: DateTime<FixedOffset>) -> Self {
        Self(Some(time))
    }

    pub fn is_unset(&self) -> bool {
        self.0.is_none()
    }
}

impl Cursor for OrderTime {
    fn encode(&self) -> String {
        self.0.map(|t| t.to_rfc3339()).unwrap_or_default()
    }

    fn decode(raw: &str) -> Result<Self, CursorParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self(None));
        }
        parse_timestamp(raw)
            .map(|t| Self(Some(t)))
            .ok_or_else(|| CursorParseError::new(raw, "not an ISO-8601 timestamp"))
    }
}

impl fmt::Display for OrderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(t) => write!(f, "{}", t.to_rfc3339()),
            None => write!(f, "<unset>"),
        }
    }
}

/// Parse an ISO-8601 local date-time with an optional offset.
///
/// Accepts `+HH:MM`, `+HHMM`, `+HH` and `Z`; a missing offset is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(t) = DateTime::parse_from_str(raw, fmt) {
            return Some(t);
        }
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Current local time as a fixed-offset timestamp
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_codec() {
        assert_eq!(RecordId::decode(" 42\n").unwrap(), RecordId(42));
        assert_eq!(RecordId(42).encode(), "42");
        assert!(RecordId::decode("forty-two").is_err());
        assert!(RecordId::decode("").is_err());
    }

    #[test]
    fn test_advance_only_moves_forward() {
        let mut cursor = RecordId(7);
        assert!(!cursor.advance(&RecordId(5)));
        assert_eq!(cursor, RecordId(7));
        assert!(cursor.advance(&RecordId(9)));
        assert_eq!(cursor, RecordId(9));
    }

    #[test]
    fn test_order_time_unset_sorts_first() {
        let t = parse_timestamp("2023-05-01T10:00:00+02:00").unwrap();
        let mut cursor = OrderTime::default();
        assert!(cursor.is_unset());
        assert!(cursor.advance(&OrderTime::at(t)));
        assert_eq!(cursor, OrderTime::at(t));
        assert!(!cursor.advance(&OrderTime::default()));
    }

    #[test]
    fn test_order_time_codec() {
        assert_eq!(OrderTime::decode("").unwrap(), OrderTime(None));
        assert_eq!(OrderTime(None).encode(), "");

        let cursor = OrderTime::decode("2023-05-01T10:00:00+02:00").unwrap();
        assert_eq!(cursor.encode(), "2023-05-01T10:00:00+02:00");
        assert!(OrderTime::decode("yesterday").is_err());
    }

    #[test]
    fn test_parse_timestamp_offsets() {
        let expected = parse_timestamp("2023-05-01T10:00:00+02:00").unwrap();
        assert_eq!(parse_timestamp("2023-05-01T10:00:00+0200"), Some(expected));
        assert_eq!(parse_timestamp("2023-05-01T10:00:00+02"), Some(expected));
        assert_eq!(
            parse_timestamp("2023-05-01T08:00:00Z").map(|t| t.timestamp()),
            Some(expected.timestamp())
        );
        assert_eq!(
            parse_timestamp("2023-05-01T08:00:00").map(|t| t.timestamp()),
            Some(expected.timestamp())
        );
        assert_eq!(parse_timestamp("not a date"), None);
    }
}
