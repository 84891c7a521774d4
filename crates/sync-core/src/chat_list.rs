//! Ordered chat collection with incremental updates.
//!
//! Chats are held by ID; display order is recomputed on every read, so no
//! mutation ever has to preserve a position.

use std::{cmp::Ordering, collections::HashMap};

use tracing::{debug, warn};

use crate::{
    error::SyncError,
    presence::PresenceTracker,
    types::{Chat, ChatCollection, ChatToggle, Message, Participant},
};

/// Display order: pinned first, then `last_activity` descending, then chat
/// ID ascending so the order is total.
pub fn compare_chats(a: &Chat, b: &Chat) -> Ordering {
    b.is_pinned
        .cmp(&a.is_pinned)
        .then_with(|| b.last_activity_ms.cmp(&a.last_activity_ms))
        .then_with(|| a.chat_id.cmp(&b.chat_id))
}

#[derive(Debug, Clone)]
pub struct ChatList {
    local_user_id: String,
    chats: HashMap<String, Chat>,
    global_unread_count: u64,
}

impl ChatList {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            chats: HashMap::new(),
            global_unread_count: 0,
        }
    }

    /// Load a fetched collection. The snapshot decides membership, but a
    /// held chat whose activity is newer than the snapshot keeps its
    /// `last_activity` and unread count, since live events already moved
    /// past it. Current presence is projected onto every loaded chat.
    /// Chats that break structural invariants are dropped and logged.
    pub fn initialize(&mut self, collection: ChatCollection, presence: &PresenceTracker) {
        let mut held = std::mem::take(&mut self.chats);
        let mut global_unread = collection.global_unread_count;
        for mut chat in collection.chats {
            if let Err(err) = chat.validate() {
                warn!(chat_id = %chat.chat_id, error = %err, "dropping invalid chat");
                continue;
            }
            if let Some(previous) = held.remove(&chat.chat_id)
                && previous.last_activity_ms > chat.last_activity_ms
            {
                debug!(
                    chat_id = %chat.chat_id,
                    held = previous.last_activity_ms,
                    fetched = chat.last_activity_ms,
                    "snapshot older than live state"
                );
                global_unread = global_unread
                    .saturating_sub(chat.unread_count)
                    .saturating_add(previous.unread_count);
                chat.last_activity_ms = previous.last_activity_ms;
                chat.unread_count = previous.unread_count;
            }
            presence.apply_to(&mut chat);
            self.chats.insert(chat.chat_id.clone(), chat);
        }
        self.global_unread_count = global_unread;
        debug!(
            chats = self.chats.len(),
            global_unread = self.global_unread_count,
            "chat list initialized"
        );
    }

    /// Non-archived chats in display order.
    pub fn active(&self) -> Vec<Chat> {
        self.sorted(|chat| !chat.is_archived)
    }

    /// Archived chats in display order.
    pub fn archived(&self) -> Vec<Chat> {
        self.sorted(|chat| chat.is_archived)
    }

    fn sorted(&self, keep: impl Fn(&Chat) -> bool) -> Vec<Chat> {
        let mut chats: Vec<Chat> = self.chats.values().filter(|c| keep(c)).cloned().collect();
        chats.sort_by(compare_chats);
        chats
    }

    pub fn get(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.get(chat_id)
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.chats.contains_key(chat_id)
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn global_unread_count(&self) -> u64 {
        self.global_unread_count
    }

    /// Bump the owning chat's activity and, for messages from other users,
    /// its unread counters. Unknown chats are a logged no-op.
    pub fn on_new_message(&mut self, message: &Message) -> bool {
        let Some(chat) = self.chats.get_mut(&message.chat_id) else {
            debug!(chat_id = %message.chat_id, "message for unknown chat ignored by chat list");
            return false;
        };

        let mut changed = false;
        if message.created_at_ms > chat.last_activity_ms {
            chat.last_activity_ms = message.created_at_ms;
            changed = true;
        }
        if message.sender_id != self.local_user_id {
            chat.unread_count += 1;
            self.global_unread_count += 1;
            changed = true;
        }
        changed
    }

    /// Add a brand-new chat. A chat that is already known is reconciled
    /// instead. Its position comes from the sort order like any other chat.
    pub fn on_chat_created(&mut self, chat: Chat) -> Result<(), SyncError> {
        chat.validate()?;
        if self.chats.contains_key(&chat.chat_id) {
            debug!(chat_id = %chat.chat_id, "chat.created for known chat, reconciling");
            return self.reconcile(chat);
        }
        self.global_unread_count += chat.unread_count;
        self.chats.insert(chat.chat_id.clone(), chat);
        Ok(())
    }

    /// Flip a pin/archive flag. Returns the new value, or `None` for an
    /// unknown chat.
    pub fn on_toggle(&mut self, chat_id: &str, toggle: ChatToggle) -> Option<bool> {
        let current = self.flag(chat_id, toggle)?;
        self.set_flag(chat_id, toggle, !current);
        Some(!current)
    }

    /// Set a pin/archive flag explicitly. Idempotent; returns the previous
    /// value.
    pub fn set_flag(&mut self, chat_id: &str, toggle: ChatToggle, value: bool) -> Option<bool> {
        let chat = self.chats.get_mut(chat_id)?;
        let slot = match toggle {
            ChatToggle::Pin => &mut chat.is_pinned,
            ChatToggle::Archive => &mut chat.is_archived,
        };
        Some(std::mem::replace(slot, value))
    }

    pub fn flag(&self, chat_id: &str, toggle: ChatToggle) -> Option<bool> {
        let chat = self.chats.get(chat_id)?;
        Some(match toggle {
            ChatToggle::Pin => chat.is_pinned,
            ChatToggle::Archive => chat.is_archived,
        })
    }

    /// Replace a chat with the server's authoritative copy. `last_activity`
    /// never moves backwards here; the global unread count follows the
    /// per-chat delta.
    pub fn reconcile(&mut self, mut incoming: Chat) -> Result<(), SyncError> {
        incoming.validate()?;
        let previous_unread = match self.chats.get(&incoming.chat_id) {
            Some(held) => {
                incoming.last_activity_ms = incoming.last_activity_ms.max(held.last_activity_ms);
                held.unread_count
            }
            None => 0,
        };
        self.global_unread_count = self
            .global_unread_count
            .saturating_sub(previous_unread)
            .saturating_add(incoming.unread_count);
        self.chats.insert(incoming.chat_id.clone(), incoming);
        Ok(())
    }

    /// The only path allowed to move `last_activity` backwards.
    pub fn correct_last_activity(&mut self, chat_id: &str, last_activity_ms: u64) -> bool {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return false;
        };
        if chat.last_activity_ms == last_activity_ms {
            return false;
        }
        debug!(
            %chat_id,
            from = chat.last_activity_ms,
            to = last_activity_ms,
            "last activity corrected"
        );
        chat.last_activity_ms = last_activity_ms;
        true
    }

    /// Add or update a participant. Returns `Ok(false)` for unknown chats.
    pub fn on_participant_joined(&mut self, participant: Participant) -> Result<bool, SyncError> {
        let Some(chat) = self.chats.get_mut(&participant.chat_id) else {
            debug!(chat_id = %participant.chat_id, "participant for unknown chat ignored");
            return Ok(false);
        };

        if let Some(held) = chat
            .participants
            .iter_mut()
            .find(|p| p.user_id == participant.user_id)
        {
            if *held == participant {
                return Ok(false);
            }
            *held = participant;
            return Ok(true);
        }

        let mut candidate = chat.clone();
        candidate.participants.push(participant);
        candidate.validate()?;
        *chat = candidate;
        Ok(true)
    }

    /// Remove a participant. Removals that would leave a direct chat with
    /// fewer than two members are rejected.
    pub fn on_participant_left(&mut self, chat_id: &str, user_id: &str) -> Result<bool, SyncError> {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            debug!(%chat_id, "participant.left for unknown chat ignored");
            return Ok(false);
        };
        if !chat.has_participant(user_id) {
            return Ok(false);
        }

        let mut candidate = chat.clone();
        candidate.participants.retain(|p| p.user_id != user_id);
        candidate.validate()?;
        *chat = candidate;
        Ok(true)
    }

    /// Project presence onto every chat containing `user_id`. Returns the
    /// IDs of chats whose participant list changed, sorted.
    pub fn apply_presence(&mut self, presence: &PresenceTracker, user_id: &str) -> Vec<String> {
        let mut changed: Vec<String> = self
            .chats
            .values_mut()
            .filter(|chat| chat.has_participant(user_id))
            .filter_map(|chat| presence.apply_to(chat).then(|| chat.chat_id.clone()))
            .collect();
        changed.sort();
        changed
    }

    /// Clear a chat's unread counter and take it out of the global count.
    pub fn mark_chat_read(&mut self, chat_id: &str) -> bool {
        let Some(chat) = self.chats.get_mut(chat_id) else {
            return false;
        };
        if chat.unread_count == 0 {
            return false;
        }
        self.global_unread_count = self.global_unread_count.saturating_sub(chat.unread_count);
        chat.unread_count = 0;
        true
    }
}
