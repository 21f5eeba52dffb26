//! Transport-assigned ordering keys.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{Duration, OffsetDateTime};

const NANOS_PER_TICK: i128 = 100;

/// Monotonic per-channel ordering value, counted in 100 ns ticks since the Unix epoch.
///
/// ```
/// use hdesk_core::Timetoken;
/// use time::macros::datetime;
///
/// let tt = Timetoken::from_datetime(datetime!(2024-01-01 0:00 UTC));
/// assert_eq!(tt.as_u64(), 17_040_672_000_000_000);
/// assert_eq!(tt.to_datetime(), datetime!(2024-01-01 0:00 UTC));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Timetoken(u64);

impl Timetoken {
    pub const ZERO: Timetoken = Timetoken(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn now() -> Self {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    /// Dates before the epoch clamp to zero.
    pub fn from_datetime(at: OffsetDateTime) -> Self {
        let ticks = at.unix_timestamp_nanos() / NANOS_PER_TICK;
        Self(ticks.clamp(0, u64::MAX as i128) as u64)
    }

    pub fn to_datetime(&self) -> OffsetDateTime {
        let nanos = i128::from(self.0) * NANOS_PER_TICK;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// Time elapsed between this token and `now`; negative when the token lies in the future.
    pub fn age(&self, now: OffsetDateTime) -> Duration {
        now - self.to_datetime()
    }

    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for Timetoken {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timetoken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 17-digit tokens do not survive a JavaScript number, so the wire form is a string.
impl Serialize for Timetoken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Timetoken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(Self(value)),
            Raw::Text(text) => text
                .trim()
                .parse::<u64>()
                .map(Self)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_of_old_token() {
        let now = OffsetDateTime::now_utc();
        let tt = Timetoken::from_datetime(now - Duration::days(45));
        let age = tt.age(now);
        assert!(age > Duration::days(44));
        assert!(age < Duration::days(46));
    }

    #[test]
    fn accepts_string_and_number() {
        let a: Timetoken = serde_json::from_str("\"17000000000000001\"").unwrap();
        let b: Timetoken = serde_json::from_str("17000000000000001").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"17000000000000001\"");
        assert!(serde_json::from_str::<Timetoken>("\"abc\"").is_err());
    }

    #[test]
    fn pre_epoch_clamps() {
        let tt = Timetoken::from_datetime(OffsetDateTime::UNIX_EPOCH - Duration::days(1));
        assert_eq!(tt, Timetoken::ZERO);
    }
}
