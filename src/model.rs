use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Merge key for a member's location record, unique within a group.
pub type Identity = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    #[serde(alias = "member")]
    Member,
    #[serde(alias = "admin")]
    Admin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub identity: Identity,
    pub role: Role,
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn has_valid_position(&self) -> bool {
        is_valid_position(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
}

/// A single pushed position change for one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub identity: Identity,
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Both coordinates must be finite and inside the WGS84 ranges.
pub fn is_valid_position(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}
