//! Filtering events against a mute list.

use crate::social::Mute;
use crate::tags::{find_reply_id, find_root_id};
use nostr_sdk::Event;
use std::collections::HashSet;

/// Muted values (pubkeys or event ids) in a form cheap to test against.
#[derive(Debug, Clone, Default)]
pub struct MuteSet {
    values: HashSet<String>,
}

impl MuteSet {
    pub fn new(mutes: &[Mute]) -> Self {
        Self {
            values: mutes.iter().map(|m| m.value.clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when the event, its author, its parent or its thread root is muted.
    pub fn hides(&self, event: &Event) -> bool {
        if self.values.is_empty() {
            return false;
        }
        self.values.contains(&event.id.to_hex())
            || self.values.contains(&event.pubkey.to_hex())
            || find_reply_id(event).is_some_and(|id| self.values.contains(&id))
            || find_root_id(event).is_some_and(|id| self.values.contains(&id))
    }
}

/// Drop every event hidden by `mutes`.
pub fn apply_mutes(events: Vec<Event>, mutes: &[Mute]) -> Vec<Event> {
    let set = MuteSet::new(mutes);
    events.into_iter().filter(|e| !set.hides(e)).collect()
}
