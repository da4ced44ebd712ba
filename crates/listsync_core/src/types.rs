//! Identifier and timestamp types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Builds a deterministic identifier from a 128-bit value.
            ///
            /// Intended for fixtures and tests.
            #[must_use]
            pub const fn from_u128(value: u128) -> Self {
                Self(Uuid::from_u128(value))
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.as_hyphenated())
            }
        }
    };
}

entity_id!(
    /// Globally unique, immutable identifier of a list.
    ///
    /// Ordering matches the lexicographic order of the lowercase hyphenated
    /// string form, which is what goes over the wire.
    ListId
);

entity_id!(
    /// Globally unique, immutable identifier of an item.
    ItemId
);

/// A UTC instant with millisecond resolution.
///
/// One millisecond is the smallest step ("tick") a last-modified timestamp
/// can advance by. On the wire timestamps are RFC 3339 strings with exactly
/// three fractional digits, so decoding and re-encoding is byte-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Returns the timestamp one tick later.
    #[must_use]
    pub const fn next_tick(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the timestamp a mutation of an entity last modified at
    /// `previous` must carry: `max(now, previous + 1 tick)`.
    #[must_use]
    pub fn bumped(previous: Timestamp, now: Timestamp) -> Self {
        now.max(previous.next_tick())
    }

    /// Converts to a chrono date-time, if representable.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    /// Parses an RFC 3339 string, truncating to milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid RFC 3339.
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        let parsed = DateTime::parse_from_rfc3339(s)?;
        Ok(Self(parsed.with_timezone(&Utc).timestamp_millis()))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => write!(f, "@{}ms", self.0),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let dt = self
            .to_datetime()
            .ok_or_else(|| serde::ser::Error::custom(format!("timestamp out of range: {}", self.0)))?;
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Timestamp::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display_is_lowercase_hyphenated() {
        let id = ListId::from_u128(0xABCD);
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-00000000abcd");
        assert_eq!("00000000-0000-0000-0000-00000000ABCD".parse::<ListId>().unwrap(), id);
    }

    #[test]
    fn id_order_matches_string_order() {
        let ids = [
            ItemId::from_u128(0x0f),
            ItemId::from_u128(0xa0),
            ItemId::from_u128(u128::MAX),
            ItemId::from_u128(1 << 100),
        ];
        for a in &ids {
            for b in &ids {
                assert_eq!(a.cmp(b), a.to_string().cmp(&b.to_string()));
            }
        }
    }

    #[test]
    fn bump_rule() {
        let prev = Timestamp::from_millis(1_000);
        // Clock behind the previous value still advances by one tick.
        assert_eq!(
            Timestamp::bumped(prev, Timestamp::from_millis(500)),
            Timestamp::from_millis(1_001)
        );
        // Clock ahead wins.
        assert_eq!(
            Timestamp::bumped(prev, Timestamp::from_millis(5_000)),
            Timestamp::from_millis(5_000)
        );
    }

    #[test]
    fn wire_format_is_millisecond_rfc3339() {
        let ts = Timestamp::from_millis(1_700_000_000_123);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2023-11-14T22:13:20.123Z\"");
        assert_eq!(serde_json::from_str::<Timestamp>(&json).unwrap(), ts);
    }

    #[test]
    fn parse_accepts_offsets_and_truncates() {
        let ts = Timestamp::parse("2023-11-14T23:13:20.123999+01:00").unwrap();
        assert_eq!(ts, Timestamp::from_millis(1_700_000_000_123));
        assert!(Timestamp::parse("yesterday").is_err());
    }
}
