//! Typing state: outgoing debounce for the local user and TTL-bound remote
//! indicators.
//!
//! The coordinator owns no timers itself; it keeps deadlines and the caller
//! wakes it through [`TypingCoordinator::next_deadline`] and
//! [`TypingCoordinator::poll_expired`].

use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;
use tracing::{debug, trace};

pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_secs(2);
pub const DEFAULT_REMOTE_LIFETIME: Duration = Duration::from_secs(5);

/// Typing signal the local user must send over the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingSignal {
    Start { chat_id: String },
    Stop { chat_id: String },
}

/// Result of sweeping expired deadlines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingExpiry {
    /// Auto-stop signals for chats where the local user went idle.
    pub stop_signals: Vec<TypingSignal>,
    /// Chats whose rendered remote typing set shrank.
    pub changed_chats: Vec<String>,
}

impl TypingExpiry {
    pub fn is_empty(&self) -> bool {
        self.stop_signals.is_empty() && self.changed_chats.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TypingCoordinator {
    local_user_id: String,
    idle_window: Duration,
    remote_lifetime: Duration,
    /// Chat ID → auto-stop deadline of the local user.
    local: HashMap<String, Instant>,
    /// Chat ID → user ID → eviction deadline.
    remote: HashMap<String, HashMap<String, Instant>>,
}

impl TypingCoordinator {
    pub fn new(
        local_user_id: impl Into<String>,
        idle_window: Duration,
        remote_lifetime: Duration,
    ) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            idle_window,
            remote_lifetime,
            local: HashMap::new(),
            remote: HashMap::new(),
        }
    }

    /// Record local keystroke activity. Emits `Start` only when the chat was
    /// not already marked typing; every call pushes the auto-stop deadline.
    pub fn notify_typing_activity(&mut self, chat_id: &str, now: Instant) -> Option<TypingSignal> {
        let deadline = now + self.idle_window;
        match self.local.insert(chat_id.to_owned(), deadline) {
            Some(_) => None,
            None => {
                debug!(%chat_id, "local typing started");
                Some(TypingSignal::Start {
                    chat_id: chat_id.to_owned(),
                })
            }
        }
    }

    /// A send ends local typing immediately and cancels the auto-stop timer.
    pub fn on_message_sent(&mut self, chat_id: &str) -> Option<TypingSignal> {
        self.local.remove(chat_id).map(|_| TypingSignal::Stop {
            chat_id: chat_id.to_owned(),
        })
    }

    pub fn is_locally_typing(&self, chat_id: &str) -> bool {
        self.local.contains_key(chat_id)
    }

    /// Apply an inbound typing event. Returns whether the rendered set for
    /// the chat changed. Events about the local user are ignored.
    pub fn on_typing(&mut self, chat_id: &str, user_id: &str, is_typing: bool, now: Instant) -> bool {
        if user_id == self.local_user_id {
            trace!(%chat_id, "ignoring typing echo for local user");
            return false;
        }

        if is_typing {
            let expires_at = now + self.remote_lifetime;
            let previous = self
                .remote
                .entry(chat_id.to_owned())
                .or_default()
                .insert(user_id.to_owned(), expires_at);
            previous.is_none_or(|prev| prev <= now)
        } else {
            let Some(users) = self.remote.get_mut(chat_id) else {
                return false;
            };
            let removed = users.remove(user_id);
            if users.is_empty() {
                self.remote.remove(chat_id);
            }
            removed.is_some_and(|expires_at| expires_at > now)
        }
    }

    /// Users currently typing in `chat_id`, sorted, excluding expired entries.
    pub fn typing_users(&self, chat_id: &str, now: Instant) -> Vec<String> {
        let mut users: Vec<String> = self
            .remote
            .get(chat_id)
            .map(|users| {
                users
                    .iter()
                    .filter(|(_, expires_at)| **expires_at > now)
                    .map(|(user_id, _)| user_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Drop every deadline at or before `now`.
    pub fn poll_expired(&mut self, now: Instant) -> TypingExpiry {
        let mut expiry = TypingExpiry::default();

        let mut idle: Vec<String> = self
            .local
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(chat_id, _)| chat_id.clone())
            .collect();
        idle.sort();
        for chat_id in idle {
            self.local.remove(&chat_id);
            debug!(%chat_id, "local typing auto-stopped");
            expiry.stop_signals.push(TypingSignal::Stop { chat_id });
        }

        for (chat_id, users) in &mut self.remote {
            let before = users.len();
            users.retain(|_, expires_at| *expires_at > now);
            if users.len() != before {
                trace!(%chat_id, evicted = before - users.len(), "remote typing expired");
                expiry.changed_chats.push(chat_id.clone());
            }
        }
        self.remote.retain(|_, users| !users.is_empty());
        expiry.changed_chats.sort();

        expiry
    }

    /// Earliest pending deadline, local or remote.
    pub fn next_deadline(&self) -> Option<Instant> {
        let local = self.local.values().copied();
        let remote = self.remote.values().flat_map(|users| users.values().copied());
        local.chain(remote).min()
    }

    /// Cancel all typing state of one chat (used when leaving it). Returns a
    /// `Stop` signal when the local user was marked typing there.
    pub fn clear_chat(&mut self, chat_id: &str) -> Option<TypingSignal> {
        self.remote.remove(chat_id);
        self.on_message_sent(chat_id)
    }

    /// Drop every remote indicator, returning the chats that had any.
    /// Local marks are kept.
    pub fn clear_remote(&mut self) -> Vec<String> {
        let mut chats: Vec<String> = self.remote.drain().map(|(chat_id, _)| chat_id).collect();
        chats.sort();
        chats
    }

    /// Drop everything, local and remote.
    pub fn clear_all(&mut self) -> Vec<String> {
        self.local.clear();
        self.clear_remote()
    }
}
