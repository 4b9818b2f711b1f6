use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::model::{Identity, Member};

/// Where the map starts before any member has been fitted.
pub const DEFAULT_CENTER: (f64, f64) = (28.61, 77.2);
pub const DEFAULT_ZOOM: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    /// Smallest box containing every `(latitude, longitude)` pair.
    pub fn enclosing(points: &[(f64, f64)]) -> Option<Bounds> {
        let (&(lat, lng), rest) = points.split_first()?;
        let mut bounds = Bounds {
            south: lat,
            west: lng,
            north: lat,
            east: lng,
        };
        for &(lat, lng) in rest {
            bounds.south = bounds.south.min(lat);
            bounds.north = bounds.north.max(lat);
            bounds.west = bounds.west.min(lng);
            bounds.east = bounds.east.max(lng);
        }
        Some(bounds)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

/// Animated "fit these bounds" request for the map surface.
#[derive(Debug, Clone, PartialEq)]
pub struct FitCommand {
    pub bounds: Bounds,
    /// Pixels kept free around the bounds, `[x, y]`.
    pub padding: [u32; 2],
    pub animate: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub identity: Identity,
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: Option<DateTime<Utc>>,
}

impl From<&Member> for Marker {
    fn from(member: &Member) -> Self {
        Marker {
            identity: member.identity.clone(),
            latitude: member.latitude,
            longitude: member.longitude,
            observed_at: member.observed_at,
        }
    }
}

/// Whatever draws the members. Called from the group view's event loop.
pub trait MapSurface: Send {
    fn render_markers(&mut self, markers: &[Marker]);

    fn fly_to_bounds(&mut self, command: &FitCommand);
}

/// Surface for terminal use: reports what a graphical map would show.
pub struct LogSurface {
    center: (f64, f64),
}

impl LogSurface {
    pub fn new() -> Self {
        info!(
            lat = DEFAULT_CENTER.0,
            lng = DEFAULT_CENTER.1,
            zoom = DEFAULT_ZOOM,
            "map ready"
        );
        Self {
            center: DEFAULT_CENTER,
        }
    }
}

impl MapSurface for LogSurface {
    fn render_markers(&mut self, markers: &[Marker]) {
        for marker in markers {
            match marker.observed_at {
                Some(at) => info!(
                    identity = %marker.identity,
                    lat = marker.latitude,
                    lng = marker.longitude,
                    at = %at.to_rfc3339(),
                    "marker"
                ),
                None => info!(
                    identity = %marker.identity,
                    lat = marker.latitude,
                    lng = marker.longitude,
                    "marker"
                ),
            }
        }
    }

    fn fly_to_bounds(&mut self, command: &FitCommand) {
        let from = self.center;
        self.center = command.bounds.center();
        info!(
            from = ?from,
            to = ?self.center,
            bounds = ?command.bounds,
            duration_ms = command.duration.as_millis() as u64,
            "flying to fit members"
        );
    }
}
