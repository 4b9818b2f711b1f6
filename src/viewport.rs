use std::time::Duration;

use crate::map::{Bounds, FitCommand};
use crate::model::Identity;
use crate::roster::RosterStore;

pub const DEFAULT_PADDING: u32 = 50;
pub const DEFAULT_DURATION: Duration = Duration::from_secs(2);

/// Decides when the map should re-fit the members' positions.
///
/// Only positions that pass [`crate::model::is_valid_position`] count. They
/// are compared, ordered by identity, with the ones used for the last fit;
/// the map is only moved when they differ.
#[derive(Debug)]
pub struct ViewportFitter {
    padding: u32,
    duration: Duration,
    last: Vec<(Identity, f64, f64)>,
}

impl ViewportFitter {
    pub fn new(padding: u32, duration: Duration) -> Self {
        Self {
            padding,
            duration,
            last: Vec::new(),
        }
    }

    /// Forgets the last fit, e.g. when another group is opened.
    pub fn reset(&mut self) {
        self.last.clear();
    }

    pub fn evaluate(&mut self, roster: &RosterStore) -> Option<FitCommand> {
        let visible: Vec<(Identity, f64, f64)> = roster
            .sorted()
            .into_iter()
            .filter(|member| member.has_valid_position())
            .map(|member| (member.identity.clone(), member.latitude, member.longitude))
            .collect();

        if visible.is_empty() || visible == self.last {
            return None;
        }

        let points: Vec<(f64, f64)> = visible.iter().map(|(_, lat, lng)| (*lat, *lng)).collect();
        let bounds = Bounds::enclosing(&points)?;
        self.last = visible;

        Some(FitCommand {
            bounds,
            padding: [self.padding, self.padding],
            animate: true,
            duration: self.duration,
        })
    }
}

impl Default for ViewportFitter {
    fn default() -> Self {
        Self::new(DEFAULT_PADDING, DEFAULT_DURATION)
    }
}
