//! JSON payloads exchanged with the location backend.
//!
//! Inbound stream events and snapshot entries share one shape:
//! `{ "email", "latitude", "longitude", "timestamp" }`. Snapshot entries may
//! also carry a `role`; live events never do.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::model::{Group, LocationUpdate, Member, Role};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed location payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("location payload has no identity")]
    MissingIdentity,
}

#[derive(Debug, Deserialize)]
struct LocationEvent {
    #[serde(default)]
    email: String,
    #[serde(default = "missing_coordinate", deserialize_with = "coordinate")]
    latitude: f64,
    #[serde(default = "missing_coordinate", deserialize_with = "coordinate")]
    longitude: f64,
    #[serde(default, deserialize_with = "timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    role: Option<Role>,
}

impl TryFrom<LocationEvent> for LocationUpdate {
    type Error = DecodeError;

    fn try_from(event: LocationEvent) -> Result<Self, Self::Error> {
        if event.email.is_empty() {
            return Err(DecodeError::MissingIdentity);
        }
        Ok(LocationUpdate {
            identity: event.email,
            latitude: event.latitude,
            longitude: event.longitude,
            observed_at: event.timestamp,
        })
    }
}

/// Outbound body of `POST /location/update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
struct GroupRecord {
    #[serde(deserialize_with = "group_id")]
    id: String,
    #[serde(default)]
    name: String,
}

/// Decodes one message from the live update stream.
pub fn decode_update(payload: &[u8]) -> Result<LocationUpdate, DecodeError> {
    let event: LocationEvent = serde_json::from_slice(payload)?;
    event.try_into()
}

/// Decodes a snapshot body. Entries that fail to decode are logged and
/// skipped; the rest of the snapshot is still used.
pub fn decode_snapshot(body: &[u8]) -> Result<Vec<Member>, DecodeError> {
    let entries: Vec<Value> = serde_json::from_slice(body)?;

    let mut members = Vec::with_capacity(entries.len());
    for entry in entries {
        match snapshot_member(entry) {
            Ok(member) => members.push(member),
            Err(err) => warn!(error = %err, "skipping malformed snapshot entry"),
        }
    }
    Ok(members)
}

fn snapshot_member(entry: Value) -> Result<Member, DecodeError> {
    let event: LocationEvent = serde_json::from_value(entry)?;
    let role = event.role.unwrap_or_default();
    let update = LocationUpdate::try_from(event)?;
    Ok(Member {
        identity: update.identity,
        role,
        latitude: update.latitude,
        longitude: update.longitude,
        observed_at: update.observed_at,
    })
}

pub fn decode_groups(body: &[u8]) -> Result<Vec<Group>, DecodeError> {
    let records: Vec<GroupRecord> = serde_json::from_slice(body)?;
    Ok(records
        .into_iter()
        .map(|record| Group {
            id: record.id,
            name: record.name,
        })
        .collect())
}

fn missing_coordinate() -> f64 {
    f64::NAN
}

// Anything that is not a JSON number is kept as NaN so the member stays in
// the roster but never reaches the map.
fn coordinate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(f64::NAN))
}

// A timestamp in a shape we do not know is dropped; the position still counts.
fn timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Null => return Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|ms| ms as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    };
    if parsed.is_none() {
        warn!(timestamp = %value, "ignoring unrecognised timestamp");
    }
    Ok(parsed)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Zone-less date-times are taken as UTC.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn group_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected group id, got {}", other))),
    }
}
