use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::timer::SessionType;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

/// Fixed-width UTC timestamps so lexical order in SQLite matches time order.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_session_type(value: &str) -> Result<SessionType> {
    SessionType::parse(value).ok_or_else(|| anyhow!("unknown session type {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_round_trip_in_fixed_width() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let text = format_timestamp(&at);
        assert_eq!(text, "2024-01-02T03:04:05.000Z");
        assert_eq!(parse_datetime(&text, "at").unwrap(), at);
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(to_u64(-1, "duration_sec").is_err());
        assert_eq!(to_u64(7, "duration_sec").unwrap(), 7);
        assert!(to_i64(u64::MAX).is_err());
    }
}
