use std::collections::HashMap;

use crate::model::{Identity, LocationUpdate, Member, Role};

/// Last known position of every member of the open group, keyed by identity.
///
/// Updates are applied in arrival order with no check against
/// `observed_at`: whatever arrived last for an identity wins.
#[derive(Debug, Default)]
pub struct RosterStore {
    members: HashMap<Identity, Member>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self {
            members: HashMap::new(),
        }
    }

    /// Replaces the whole roster, discarding anything applied before.
    pub fn initialize(&mut self, members: Vec<Member>) {
        self.members = members
            .into_iter()
            .map(|member| (member.identity.clone(), member))
            .collect();
    }

    /// Upserts one live update. Returns `true` when the identity was new.
    ///
    /// The stream does not carry roles, so a newly seen identity is recorded
    /// as [`Role::Member`] and an existing member keeps the role it had.
    pub fn apply(&mut self, update: LocationUpdate) -> bool {
        if let Some(member) = self.members.get_mut(&update.identity) {
            member.latitude = update.latitude;
            member.longitude = update.longitude;
            member.observed_at = update.observed_at;
            false
        } else {
            let identity = update.identity.clone();
            self.members.insert(
                identity,
                Member {
                    identity: update.identity,
                    role: Role::Member,
                    latitude: update.latitude,
                    longitude: update.longitude,
                    observed_at: update.observed_at,
                },
            );
            true
        }
    }

    pub fn get(&self, identity: &str) -> Option<&Member> {
        self.members.get(identity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members ordered by identity.
    pub fn sorted(&self) -> Vec<&Member> {
        let mut members: Vec<&Member> = self.members.values().collect();
        members.sort_by(|a, b| a.identity.cmp(&b.identity));
        members
    }
}
