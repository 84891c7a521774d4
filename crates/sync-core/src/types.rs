use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncErrorCategory};

/// Transport session lifecycle reported to subscribers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel is open.
    Disconnected,
    /// A channel is being opened.
    Connecting,
    /// The channel is open but the session has not been accepted yet.
    Connected,
    /// The server accepted the session credentials.
    Authenticated,
}

/// Kind of conversation container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// One-to-one conversation; always exactly two participants.
    Direct,
    /// Free-form group conversation.
    Group,
    /// Conversation attached to an external subject (candidate, interview, ...).
    Subject,
}

/// Role of a participant inside one chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Owner,
    Admin,
    #[default]
    Member,
}

/// Per-chat capacity limits and sharing toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatSettings {
    /// Maximum number of participants, when limited.
    pub max_participants: Option<u32>,
    /// Maximum text length accepted for one message, when limited.
    pub max_message_length: Option<u32>,
    /// Whether file attachments may be shared.
    pub allow_file_sharing: bool,
    /// Whether image attachments may be shared.
    pub allow_image_sharing: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_participants: None,
            max_message_length: None,
            allow_file_sharing: true,
            allow_image_sharing: true,
        }
    }
}

/// A user's membership in one chat, joined with global presence for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub chat_id: String,
    pub user_id: String,
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen_at_ms: Option<u64>,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_pinned: bool,
}

/// Conversation container with its ordered participant list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub chat_id: String,
    pub kind: ChatKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Ordering key for the chat list, in milliseconds since Unix epoch.
    pub last_activity_ms: u64,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default)]
    pub settings: ChatSettings,
}

impl Chat {
    /// Look up a participant by user ID.
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// Whether the user is a member of this chat.
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant(user_id).is_some()
    }

    /// Check structural invariants of the chat.
    ///
    /// A `direct` chat must have exactly two participants.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.kind == ChatKind::Direct && self.participants.len() != 2 {
            return Err(SyncError::new(
                SyncErrorCategory::Protocol,
                "invalid_direct_chat",
                format!(
                    "direct chat '{}' has {} participants, expected 2",
                    self.chat_id,
                    self.participants.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Message payload kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    Image,
    System,
}

/// Attachment reference; the bytes live in external storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

/// Delivery status of a message. Ordinal order is the only allowed direction
/// of travel.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Submitted locally, not yet acknowledged.
    #[default]
    Sent,
    /// Acknowledged by the transport, unread by other participants.
    Delivered,
    /// Seen by at least one participant other than the sender.
    Read,
}

/// One reader's receipt for a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadReceipt {
    pub user_id: String,
    pub read_at_ms: u64,
}

/// Server-assigned unit of communication in one chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Server timestamp in milliseconds since Unix epoch; the sole ordering key.
    pub created_at_ms: u64,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub read_by: Vec<ReadReceipt>,
    /// Weak reference to another message; may dangle.
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub edited_at_ms: Option<u64>,
    /// Echo of the sender's transaction ID when the server knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_txn_id: Option<String>,
}

impl Message {
    /// Total order key: `created_at_ms`, ties broken by message ID.
    pub fn sort_key(&self) -> (u64, &str) {
        (self.created_at_ms, self.message_id.as_str())
    }
}

/// Content of a message the local user wants to send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MessageDraft {
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl MessageDraft {
    /// Plain text draft.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Optimistic local echo of a send that the server has not acknowledged yet.
///
/// Pending echoes are keyed by transaction ID and never carry a message ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingMessage {
    pub client_txn_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub draft: MessageDraft,
    /// Local clock at submission, for display only.
    pub queued_at_ms: u64,
    pub status: MessageStatus,
}

/// Request for one page of history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryRequest {
    pub chat_id: String,
    pub limit: u16,
    /// Oldest message currently held; `None` requests the latest page.
    pub before_message_id: Option<String>,
}

/// One page of history, newest-first as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

/// Full chat collection plus the global unread counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChatCollection {
    pub chats: Vec<Chat>,
    pub global_unread_count: u64,
}

/// Chat flag toggled from the chat list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatToggle {
    Pin,
    Archive,
}

/// Metadata/settings change for an existing chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChatUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ChatSettings>,
}

/// Request body for creating a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewChat {
    pub kind: ChatKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub participant_ids: Vec<String>,
}

/// Command channel input accepted by the sync runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncCommand {
    /// Open the transport and authenticate.
    Connect,
    /// Release the transport, joined rooms and all timers.
    Disconnect,
    /// Join a chat room on the transport.
    JoinChat { chat_id: String },
    /// Leave a chat room and drop its listeners and typing timers.
    LeaveChat { chat_id: String },
    /// Reload the chat collection and global unread count.
    RefreshChats,
    /// Load the latest page of a chat's history.
    LoadInitial { chat_id: String },
    /// Load the page before the oldest message currently held.
    LoadOlder { chat_id: String },
    /// Send a message; `client_txn_id` is echoed in `SendAck`.
    SendMessage {
        chat_id: String,
        client_txn_id: String,
        draft: MessageDraft,
    },
    /// Local typing activity in a chat.
    NotifyTyping { chat_id: String },
    /// Mark a message as read by the local user.
    MarkRead { chat_id: String, message_id: String },
    /// Flip the pin or archive flag of a chat.
    ToggleChat { chat_id: String, toggle: ChatToggle },
    /// Update chat metadata/settings.
    UpdateChat { chat_id: String, update: ChatUpdate },
    /// Create a new chat.
    CreateChat { chat: NewChat },
}

/// Acknowledgement for `SendMessage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendAck {
    /// Original transaction ID.
    pub client_txn_id: String,
    /// Server message ID on success.
    pub message_id: Option<String>,
    /// Stable error code on failure.
    pub error_code: Option<String>,
}

/// Event kind used for typed subscriptions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connection,
    Auth,
    ChatList,
    History,
    Message,
    Typing,
    Presence,
    Participants,
    SendAck,
    Failure,
}

/// Event channel output emitted by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncEvent {
    /// Transport session state transition.
    ConnectionChanged { state: ConnectionState },
    /// Result of the authentication handshake.
    AuthResult {
        success: bool,
        error_code: Option<String>,
    },
    /// A reconnect attempt has been scheduled.
    ReconnectScheduled { attempt: u32, delay_ms: u64 },
    /// Reconnect attempts are exhausted; no further automatic retries.
    ConnectionLost { code: String, message: String },
    /// Active chat list in display order.
    ChatListUpdated {
        chats: Vec<Chat>,
        global_unread_count: u64,
    },
    /// Full ordered message log of a chat after a page merge.
    HistoryLoaded {
        chat_id: String,
        messages: Vec<Message>,
        has_more: bool,
    },
    /// A new message was inserted into a chat's log.
    MessageAppended { message: Message },
    /// An existing message changed (status, receipts, edit).
    MessageUpdated { message: Message },
    /// An optimistic echo was queued.
    MessagePending { pending: PendingMessage },
    /// Current remote typing set of a chat (never includes the local user).
    TypingChanged {
        chat_id: String,
        user_ids: Vec<String>,
    },
    /// Global presence of a user changed.
    PresenceChanged {
        user_id: String,
        is_online: bool,
        last_seen_at_ms: Option<u64>,
    },
    /// A chat's participant list changed.
    ParticipantsChanged {
        chat_id: String,
        participants: Vec<Participant>,
    },
    /// Send acknowledgement.
    SendAck(SendAck),
    /// A request/response call failed; cursors and flags are unchanged.
    RequestFailed {
        chat_id: Option<String>,
        operation: String,
        code: String,
        message: String,
        retryable: bool,
    },
    /// Server-pushed `error` event.
    ServerError { code: String, message: String },
    /// Runtime error not tied to a specific request.
    FatalError {
        code: String,
        message: String,
        recoverable: bool,
    },
}

impl SyncEvent {
    /// Subscription kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionChanged { .. }
            | Self::ReconnectScheduled { .. }
            | Self::ConnectionLost { .. } => EventKind::Connection,
            Self::AuthResult { .. } => EventKind::Auth,
            Self::ChatListUpdated { .. } => EventKind::ChatList,
            Self::HistoryLoaded { .. } => EventKind::History,
            Self::MessageAppended { .. }
            | Self::MessageUpdated { .. }
            | Self::MessagePending { .. } => EventKind::Message,
            Self::TypingChanged { .. } => EventKind::Typing,
            Self::PresenceChanged { .. } => EventKind::Presence,
            Self::ParticipantsChanged { .. } => EventKind::Participants,
            Self::SendAck(_) => EventKind::SendAck,
            Self::RequestFailed { .. } | Self::ServerError { .. } | Self::FatalError { .. } => {
                EventKind::Failure
            }
        }
    }

    /// Chat this event is scoped to; `None` for global events.
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            Self::HistoryLoaded { chat_id, .. }
            | Self::TypingChanged { chat_id, .. }
            | Self::ParticipantsChanged { chat_id, .. } => Some(chat_id),
            Self::MessageAppended { message } | Self::MessageUpdated { message } => {
                Some(&message.chat_id)
            }
            Self::MessagePending { pending } => Some(&pending.chat_id),
            Self::RequestFailed { chat_id, .. } => chat_id.as_deref(),
            _ => None,
        }
    }
}
