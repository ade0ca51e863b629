//! Purchase-date parsing and formatting
//!
//! Receipt dates arrive as free-form strings from the LLM and from GraphQL
//! arguments. Accepted forms:
//! - `YYYY-MM-DD` (midnight UTC)
//! - `YYYY-MM-DDTHH:mm:ss[.fff]` (naive, taken as UTC)
//! - RFC 3339 with an offset or `Z`

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse a date string into a UTC timestamp.
///
/// Returns `None` for empty input and for impossible calendar dates
/// such as `2024-02-30`.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// ISO 8601 in UTC with millisecond precision and a `Z` suffix
pub fn to_iso_string<Tz: TimeZone>(dt: &DateTime<Tz>) -> String {
    dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_only() {
        let dt = parse_date("2024-03-15").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_naive_datetime_is_utc() {
        let dt = parse_date("2024-03-15T14:30:05").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 5).unwrap());
    }

    #[test]
    fn test_offset_is_normalized() {
        let dt = parse_date("2024-03-15T10:00:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_rejects_impossible_dates() {
        assert!(parse_date("2024-02-30").is_none());
        assert!(parse_date("2023-13-01").is_none());
        assert!(parse_date("").is_none());
        assert!(parse_date("   ").is_none());
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_iso_string_format() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(to_iso_string(&dt), "2024-01-15T00:00:00.000Z");
        assert_eq!(parse_date(&to_iso_string(&dt)), Some(dt));

        let shifted = dt.with_timezone(&chrono::FixedOffset::east_opt(3600).unwrap());
        assert_eq!(to_iso_string(&shifted), "2024-01-15T00:00:00.000Z");
    }
}
