//! Shared timestamp and event-id helpers.

use chrono::{DateTime, SecondsFormat, Utc};
use ulid::Ulid;

/// Returns the current UTC instant.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Returns the current UTC instant serialized as ISO-8601 (e.g.
/// `2025-01-15T10:30:00+00:00`).
pub fn now_iso() -> String {
    to_iso(&Utc::now())
}

/// Serialize an instant as ISO-8601 with an explicit `+00:00` offset.
pub fn to_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parse an ISO-8601 timestamp, normalized to UTC.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compact timestamp used in artifact filenames (`YYYYMMDDHHMMSS`).
pub fn filename_stamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M%S").to_string()
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Serde adapter serializing `DateTime<Utc>` as ISO-8601 with `+00:00`.
pub mod iso {
    use super::{parse_iso, to_iso};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_iso(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_iso(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp {raw:?}")))
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` in ISO-8601.
pub mod iso_opt {
    use super::{parse_iso, to_iso};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => serializer.serialize_some(&to_iso(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => parse_iso(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp {raw:?}"))),
        }
    }
}
