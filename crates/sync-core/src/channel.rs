use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use thiserror::Error;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tracing::warn;

use crate::types::{EventKind, SyncCommand, SyncEvent};

/// Errors returned by channel operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The command receiver side is closed.
    #[error("command channel is closed")]
    CommandChannelClosed,
    /// The chat subscription registry lock was poisoned.
    #[error("subscription registry is poisoned")]
    RegistryPoisoned,
}

/// Which events a subscription yields.
#[derive(Debug, Clone)]
enum EventFilter {
    All,
    Kinds(Vec<EventKind>),
}

impl EventFilter {
    fn matches(&self, event: &SyncEvent) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&event.kind()),
        }
    }
}

/// Handle to one event listener. Dropping it (or calling [`unsubscribe`])
/// releases the listener.
///
/// [`unsubscribe`]: Subscription::unsubscribe
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<SyncEvent>,
    filter: EventFilter,
}

impl Subscription {
    fn new(rx: broadcast::Receiver<SyncEvent>, filter: EventFilter) -> Self {
        Self { rx, filter }
    }

    /// Wait for the next matching event. Returns `None` once the source is
    /// closed (runtime shut down, or the chat was left).
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscription lagged; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        use broadcast::error::TryRecvError;

        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscription lagged; events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Release the listener explicitly.
    pub fn unsubscribe(self) {}
}

/// Registry of chat-scoped event streams. Closing a chat drops its sender,
/// which ends every subscription to it.
#[derive(Debug, Clone)]
pub struct ChatSubscriptions {
    senders: Arc<RwLock<HashMap<String, broadcast::Sender<SyncEvent>>>>,
    buffer: usize,
}

impl ChatSubscriptions {
    pub fn new(buffer: usize) -> Self {
        Self {
            senders: Arc::new(RwLock::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    /// Subscribe to all events scoped to `chat_id`.
    pub fn subscribe(&self, chat_id: &str) -> Result<Subscription, ChannelError> {
        let mut senders = self
            .senders
            .write()
            .map_err(|_| ChannelError::RegistryPoisoned)?;
        let sender = senders
            .entry(chat_id.to_owned())
            .or_insert_with(|| broadcast::channel(self.buffer).0);
        Ok(Subscription::new(sender.subscribe(), EventFilter::All))
    }

    /// Forward a chat-scoped event to that chat's listeners, if any.
    pub fn publish(&self, event: &SyncEvent) {
        let Some(chat_id) = event.chat_id() else {
            return;
        };
        let Ok(senders) = self.senders.read() else {
            warn!("subscription registry poisoned; chat event dropped");
            return;
        };
        if let Some(sender) = senders.get(chat_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop every listener of `chat_id`. Returns whether any stream existed.
    pub fn close(&self, chat_id: &str) -> bool {
        match self.senders.write() {
            Ok(mut senders) => senders.remove(chat_id).is_some(),
            Err(_) => {
                warn!(%chat_id, "subscription registry poisoned; chat listeners not closed");
                false
            }
        }
    }

    /// Number of chats with an open stream.
    pub fn len(&self) -> usize {
        self.senders.read().map(|senders| senders.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Command/event channel set shared by the runtime and its handles.
#[derive(Clone, Debug)]
pub struct SyncChannels {
    command_tx: mpsc::Sender<SyncCommand>,
    event_tx: broadcast::Sender<SyncEvent>,
    chats: ChatSubscriptions,
}

impl SyncChannels {
    /// Create a new channel set and return it with the command receiver.
    pub fn new(command_buffer: usize, event_buffer: usize) -> (Self, mpsc::Receiver<SyncCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                command_tx,
                event_tx,
                chats: ChatSubscriptions::new(event_buffer),
            },
            command_rx,
        )
    }

    /// Subscribe to every emitted event.
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.event_tx.subscribe(), EventFilter::All)
    }

    /// Subscribe to events of the given kinds only.
    pub fn subscribe_kinds(&self, kinds: &[EventKind]) -> Subscription {
        Subscription::new(self.event_tx.subscribe(), EventFilter::Kinds(kinds.to_vec()))
    }

    /// Subscribe to events scoped to one chat.
    pub fn subscribe_chat(&self, chat_id: &str) -> Result<Subscription, ChannelError> {
        self.chats.subscribe(chat_id)
    }

    /// Chat-scoped stream registry.
    pub fn chats(&self) -> &ChatSubscriptions {
        &self.chats
    }

    /// Send one command to the runtime.
    pub async fn send_command(&self, command: SyncCommand) -> Result<(), ChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ChannelError::CommandChannelClosed)
    }

    /// Emit an event to global subscribers and to the owning chat's listeners.
    ///
    /// Emission is best-effort; lagged subscribers are handled by `broadcast`.
    pub fn emit(&self, event: SyncEvent) {
        self.chats.publish(&event);
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionState, SyncEvent};

    fn typing(chat_id: &str) -> SyncEvent {
        SyncEvent::TypingChanged {
            chat_id: chat_id.to_owned(),
            user_ids: vec!["u2".to_owned()],
        }
    }

    #[tokio::test]
    async fn sends_commands_to_receiver() {
        let (channels, mut rx) = SyncChannels::new(8, 8);
        channels
            .send_command(SyncCommand::JoinChat {
                chat_id: "c1".into(),
            })
            .await
            .expect("command send should work");

        let cmd = rx.recv().await.expect("receiver should have a command");
        assert_eq!(
            cmd,
            SyncCommand::JoinChat {
                chat_id: "c1".into()
            }
        );
    }

    #[tokio::test]
    async fn fans_out_events_to_subscribers() {
        let (channels, _) = SyncChannels::new(4, 16);
        let mut a = channels.subscribe();
        let mut b = channels.subscribe();

        channels.emit(SyncEvent::ConnectionChanged {
            state: ConnectionState::Connecting,
        });

        let event_a = a.recv().await.expect("subscriber a should receive event");
        let event_b = b.recv().await.expect("subscriber b should receive event");
        assert_eq!(event_a, event_b);
    }

    #[tokio::test]
    async fn typed_subscription_skips_other_kinds() {
        let (channels, _) = SyncChannels::new(4, 16);
        let mut typing_only = channels.subscribe_kinds(&[EventKind::Typing]);

        channels.emit(SyncEvent::ConnectionChanged {
            state: ConnectionState::Connected,
        });
        channels.emit(typing("c1"));

        let event = typing_only.recv().await.expect("typing event expected");
        assert_eq!(event.kind(), EventKind::Typing);
        assert_eq!(typing_only.try_recv(), None);
    }

    #[tokio::test]
    async fn chat_subscription_ends_when_chat_is_closed() {
        let (channels, _) = SyncChannels::new(4, 16);
        let mut c1 = channels.subscribe_chat("c1").expect("subscribe c1");
        let mut c2 = channels.subscribe_chat("c2").expect("subscribe c2");

        channels.emit(typing("c1"));
        assert_eq!(c1.recv().await, Some(typing("c1")));
        assert_eq!(c2.try_recv(), None);

        assert!(channels.chats().close("c1"));
        assert_eq!(c1.recv().await, None);
        assert_eq!(channels.chats().len(), 1);
    }

    #[tokio::test]
    async fn emit_without_chat_listeners_is_harmless() {
        let (channels, _) = SyncChannels::new(4, 16);
        channels.emit(typing("nobody"));
        assert!(channels.chats().is_empty());
    }
}
