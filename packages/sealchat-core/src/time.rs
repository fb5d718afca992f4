//! Time utilities.
//!
//! Envelopes and metric rows carry RFC 3339 timestamps; saved envelope
//! files use a compact `YYYYmmdd_HHMMSS` stamp in their name.

use chrono::{DateTime, SecondsFormat, Utc};

/// Returns the current time in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Formats a timestamp as RFC 3339 with microsecond precision.
pub fn to_rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Returns the current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    to_rfc3339(&now())
}

/// Parses an RFC 3339 string back into UTC.
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compact stamp used in file names.
pub fn file_stamp(at: &DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_timestamp_is_reasonable() {
        let ts = now_timestamp();
        // Should be after 2024-01-01 (1704067200)
        assert!(ts > 1704067200, "Timestamp {} is too old", ts);
        // Should be before 2100-01-01 (4102444800)
        assert!(ts < 4102444800, "Timestamp {} is too far in future", ts);
    }

    #[test]
    fn test_rfc3339_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 14, 3, 9).unwrap();
        let text = to_rfc3339(&at);
        assert_eq!(text, "2024-05-17T14:03:09.000000Z");
        assert_eq!(parse_rfc3339(&text), Some(at));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_rfc3339("yesterday").is_none());
    }

    #[test]
    fn test_file_stamp() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 14, 3, 9).unwrap();
        assert_eq!(file_stamp(&at), "20240517_140309");
    }
}
