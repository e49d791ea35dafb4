use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Instant attached to a task (due, start, scheduled, ...).
///
/// The offset is part of the value: the calendar day a timestamp belongs to is
/// computed in the offset it was authored with.
pub type Timestamp = OffsetDateTime;

/// Calendar-day key used by the date indexes, rendered as `YYYY-MM-DD`.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct DayKey(Date);

/// Error returned when a value cannot be interpreted as a calendar day.
#[derive(Debug, thiserror::Error)]
#[error("invalid calendar day `{input}`: expected YYYY-MM-DD or RFC 3339")]
pub struct InvalidDayKey {
    input: String,
}

impl DayKey {
    /// Day key of a timestamp, taken in the timestamp's own offset.
    #[must_use]
    pub const fn of(ts: Timestamp) -> Self {
        Self(ts.date())
    }

    /// Wrap a calendar date.
    #[must_use]
    pub const fn from_date(date: Date) -> Self {
        Self(date)
    }

    /// Day key for a unix timestamp in milliseconds, interpreted in UTC.
    #[must_use]
    pub fn from_unix_millis(ms: i64) -> Option<Self> {
        let nanos = i128::from(ms) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .map(Self::of)
    }

    /// Underlying calendar date.
    #[must_use]
    pub const fn date(self) -> Date {
        self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

impl FromStr for DayKey {
    type Err = InvalidDayKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(date) = Date::parse(trimmed, format_description!("[year]-[month]-[day]")) {
            return Ok(Self(date));
        }
        OffsetDateTime::parse(trimmed, &Rfc3339)
            .map(Self::of)
            .map_err(|_| InvalidDayKey {
                input: trimmed.to_owned(),
            })
    }
}

impl Serialize for DayKey {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
