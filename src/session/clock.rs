//! Timestamp and session-id helpers
//!
//! All persisted timestamps are UTC with fixed microsecond precision so that
//! their RFC-3339 text sorts the same way the instants do. Both backends rely
//! on this for `ORDER BY updated_at`.

use chrono::{DateTime, Duration, SecondsFormat, Timelike, Utc};

/// Current time truncated to whole microseconds
pub fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

/// Returns a timestamp strictly later than `previous`
///
/// Uses the wall clock when it has moved past `previous`, otherwise nudges
/// `previous` forward by one microsecond.
pub fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    let current = now();
    if current > previous {
        current
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Session id derived from a timestamp: `YYYYMMDD_HHMMSS_ffffff`
pub fn session_id_at(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// Formats a timestamp the way it is persisted
pub fn format(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a persisted timestamp
pub fn parse(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|dt| truncate(dt.with_timezone(&Utc)))
}

fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(at.nanosecond() / 1_000 * 1_000)
        .unwrap_or(at)
}

/// Serde adapter for fixed-precision RFC-3339 timestamps
pub mod rfc3339_micros {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format(*at))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::parse(&text).map_err(serde::de::Error::custom)
    }
}
