//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Creates a new timestamp by adding the specified number of minutes.
    ///
    /// Negative values subtract minutes.
    pub fn add_minutes(&self, minutes: i64) -> Self {
        Self(self.0 + Duration::minutes(minutes))
    }

    /// Adds `secs` seconds, or `None` when the result is out of range.
    pub fn checked_plus_secs(&self, secs: i64) -> Option<Self> {
        Duration::try_seconds(secs)
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map(Self)
    }

    /// Returns the earlier of two timestamps.
    pub fn earliest(self, other: Timestamp) -> Self {
        if other.0 < self.0 {
            other
        } else {
            self
        }
    }

    /// RFC 3339 rendering used on the wire.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn at(rfc3339: &str) -> Timestamp {
        Timestamp::from_datetime(
            DateTime::parse_from_rfc3339(rfc3339)
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    #[test]
    fn timestamp_now_creates_current_time() {
        let before = Utc::now();
        let ts = Timestamp::now();
        let after = Utc::now();

        assert!(ts.as_datetime() >= &before);
        assert!(ts.as_datetime() <= &after);
    }

    #[test]
    fn add_minutes_moves_forward_and_back() {
        let ts = at("2024-01-15T10:30:00Z");
        assert_eq!(ts.add_minutes(30), at("2024-01-15T11:00:00Z"));
        assert_eq!(ts.add_minutes(-30), at("2024-01-15T10:00:00Z"));
    }

    #[test]
    fn is_before_and_after_are_strict() {
        let a = at("2024-01-15T10:30:00Z");
        let b = at("2024-01-15T10:31:00Z");
        assert!(a.is_before(&b));
        assert!(b.is_after(&a));
        assert!(!a.is_after(&a));
        assert!(!a.is_before(&a));
    }

    #[test]
    fn checked_plus_secs_adds_in_range_values() {
        let ts = at("2024-01-15T10:30:00Z");
        assert_eq!(ts.checked_plus_secs(1800), Some(at("2024-01-15T11:00:00Z")));
        assert_eq!(ts.checked_plus_secs(-60), Some(at("2024-01-15T10:29:00Z")));
    }

    #[test]
    fn checked_plus_secs_refuses_out_of_range_values() {
        let ts = at("2024-01-15T10:30:00Z");
        assert_eq!(ts.checked_plus_secs(i64::MAX), None);
        assert_eq!(ts.checked_plus_secs(9_000_000_000_000_000), None);
        assert_eq!(ts.checked_plus_secs(400_000 * 365 * 86_400), None);
    }

    #[test]
    fn earliest_picks_smaller_value() {
        let a = at("2024-01-15T10:30:00Z");
        let b = at("2024-01-15T10:00:00Z");
        assert_eq!(a.earliest(b), b);
        assert_eq!(b.earliest(a), b);
    }

    #[test]
    fn timestamp_roundtrips_through_json() {
        let ts = at("2024-01-15T10:30:00Z");
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.contains("2024-01-15"));

        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_datetime().year(), 2024);
        assert_eq!(parsed, ts);
    }
}
