//! Batch timestamps, normalized to UTC with millisecond precision.
//!
//! Two text forms exist: the storage form always carries three fractional
//! digits so that lexical order in SQLite matches chronological order, and the
//! wire form drops the fraction when it is zero (`2022-02-01T12:00:00Z`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::errors::{DtrError, Result};

/// A point in time as seen by the tree engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Normalize an arbitrary UTC instant, dropping sub-millisecond precision.
    #[must_use]
    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        let truncated = DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or(value);
        Self(truncated)
    }

    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Parse an ISO-8601 / RFC 3339 timestamp supplied by a caller.
    pub fn parse(raw: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|parsed| Self::from_datetime(parsed.with_timezone(&Utc)))
            .map_err(|error| {
                DtrError::malformed(format!(
                    "invalid date {raw:?} (must be ISO 8601 formatted): {error}"
                ))
            })
    }

    /// Parse a value previously produced by [`Timestamp::to_storage`].
    pub fn from_storage(raw: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(raw)
            .map(|parsed| Self::from_datetime(parsed.with_timezone(&Utc)))
            .map_err(|error| DtrError::Serialization {
                context: "stored timestamp",
                details: format!("{raw:?}: {error}"),
            })
    }

    /// Fixed-width form used for persistence and range comparisons.
    #[must_use]
    pub fn to_storage(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Form returned to callers.
    #[must_use]
    pub fn to_wire(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// This instant shifted back by `delta`, saturating at the earliest representable time.
    #[must_use]
    pub fn minus(&self, delta: TimeDelta) -> Self {
        Self(self.0.checked_sub_signed(delta).unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl FromStr for Timestamp {
    type Err = DtrError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
