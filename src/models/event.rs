use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

pub type DetailsMap = Map<String, Value>;

/// Emergency notification published by the stadium simulator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmergencyEvent {
    pub event_id: String,
    pub event_type: String,
    #[serde(deserialize_with = "parse_timestamp")]
    pub timestamp: DateTime<FixedOffset>,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<DetailsMap>,
    // The simulator sends `metadata`; older producers still send `details`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DetailsMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DetailsMap>,
}

/// Which of the two payload fields an event's details came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetailsSource<'a> {
    Metadata(&'a DetailsMap),
    Details(&'a DetailsMap),
    Absent,
}

impl<'a> DetailsSource<'a> {
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        match *self {
            DetailsSource::Metadata(map) | DetailsSource::Details(map) => map.get(key),
            DetailsSource::Absent => None,
        }
    }

    pub fn to_map(&self) -> Cow<'a, DetailsMap> {
        match *self {
            DetailsSource::Metadata(map) | DetailsSource::Details(map) => Cow::Borrowed(map),
            DetailsSource::Absent => Cow::Owned(DetailsMap::new()),
        }
    }
}

impl EmergencyEvent {
    /// `metadata` when present and non-empty, otherwise `details` when
    /// present, otherwise nothing. The two are never merged.
    pub fn details_source(&self) -> DetailsSource<'_> {
        match (&self.metadata, &self.details) {
            (Some(metadata), _) if !metadata.is_empty() => DetailsSource::Metadata(metadata),
            (_, Some(details)) => DetailsSource::Details(details),
            _ => DetailsSource::Absent,
        }
    }

    pub fn get_details(&self) -> Cow<'_, DetailsMap> {
        self.details_source().to_map()
    }
}

/// Accepts RFC 3339 timestamps as well as the offset-less ISO-8601 form the
/// simulator emits. Naive timestamps are taken as UTC.
fn parse_timestamp<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_iso8601(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid ISO-8601 timestamp: '{}'", raw))
    })
}

pub fn parse_iso8601(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|t| t.and_utc().fixed_offset())
}
