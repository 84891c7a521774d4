//! Global online/offline state, projected onto chat participant lists.

use std::collections::HashMap;

use tracing::trace;

use crate::types::{Chat, Participant};

/// Presence of one user. Keyed globally by user ID, never per chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresenceEntry {
    pub is_online: bool,
    pub last_seen_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    entries: HashMap<String, PresenceEntry>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user online. Returns whether anything changed.
    pub fn on_online(&mut self, user_id: &str) -> bool {
        let entry = self.entries.entry(user_id.to_owned()).or_default();
        let changed = !entry.is_online;
        entry.is_online = true;
        trace!(%user_id, changed, "presence online");
        changed
    }

    /// Mark a user offline as of `timestamp_ms`. `last_seen` never moves
    /// backwards, so a late, older offline event cannot erase a newer one.
    pub fn on_offline(&mut self, user_id: &str, timestamp_ms: u64) -> bool {
        let entry = self.entries.entry(user_id.to_owned()).or_default();
        let last_seen = entry
            .last_seen_at_ms
            .map_or(timestamp_ms, |seen| seen.max(timestamp_ms));
        let changed = entry.is_online || entry.last_seen_at_ms != Some(last_seen);
        entry.is_online = false;
        entry.last_seen_at_ms = Some(last_seen);
        trace!(%user_id, changed, last_seen, "presence offline");
        changed
    }

    pub fn get(&self, user_id: &str) -> Option<PresenceEntry> {
        self.entries.get(user_id).copied()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.get(user_id).is_some_and(|entry| entry.is_online)
    }

    /// Write current presence into every participant of `chat` that has a
    /// known entry. Returns whether any participant changed.
    pub fn apply_to(&self, chat: &mut Chat) -> bool {
        let mut changed = false;
        for participant in &mut chat.participants {
            changed |= self.apply_to_participant(participant);
        }
        changed
    }

    /// Participant list of `chat` with current presence, leaving `chat` intact.
    pub fn project(&self, chat: &Chat) -> Vec<Participant> {
        let mut participants = chat.participants.clone();
        for participant in &mut participants {
            self.apply_to_participant(participant);
        }
        participants
    }

    fn apply_to_participant(&self, participant: &mut Participant) -> bool {
        let Some(entry) = self.entries.get(&participant.user_id) else {
            return false;
        };
        let next_seen = entry.last_seen_at_ms.or(participant.last_seen_at_ms);
        if participant.is_online == entry.is_online && participant.last_seen_at_ms == next_seen {
            return false;
        }
        participant.is_online = entry.is_online;
        participant.last_seen_at_ms = next_seen;
        true
    }
}
