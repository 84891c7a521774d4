//! JSON wire events exchanged over the persistent connection.
//!
//! Every frame is an object `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::{
    error::{SyncError, SyncErrorCategory},
    types::{Attachment, Chat, Message, MessageKind, Participant},
};

/// Events sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "auth")]
    Authenticate { user_id: String, user_token: String },
    #[serde(rename = "chat.join")]
    JoinChat { chat_id: String },
    #[serde(rename = "chat.leave")]
    LeaveChat { chat_id: String },
    #[serde(rename = "message.send")]
    SendMessage {
        client_txn_id: String,
        chat_id: String,
        kind: MessageKind,
        content: String,
        attachments: Vec<Attachment>,
        reply_to: Option<String>,
    },
    #[serde(rename = "typing.start")]
    TypingStart { chat_id: String },
    #[serde(rename = "typing.stop")]
    TypingStop { chat_id: String },
    #[serde(rename = "message.read")]
    MarkRead { chat_id: String, message_id: String },
}

impl ClientEvent {
    /// Serialize into one text frame.
    pub fn encode(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|err| {
            SyncError::new(
                SyncErrorCategory::Serialization,
                "event_serialize_error",
                err.to_string(),
            )
        })
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "auth",
            Self::JoinChat { .. } => "chat.join",
            Self::LeaveChat { .. } => "chat.leave",
            Self::SendMessage { .. } => "message.send",
            Self::TypingStart { .. } => "typing.start",
            Self::TypingStop { .. } => "typing.stop",
            Self::MarkRead { .. } => "message.read",
        }
    }
}

/// Events pushed from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "auth.accepted")]
    AuthAccepted { user_id: String },
    #[serde(rename = "auth.rejected")]
    AuthRejected { reason: String },
    #[serde(rename = "message.created")]
    MessageCreated(Message),
    /// Authoritative response to `message.send`.
    #[serde(rename = "message.ack")]
    MessageAck {
        client_txn_id: String,
        message: Message,
    },
    #[serde(rename = "message.read")]
    MessageRead {
        chat_id: String,
        message_id: String,
        user_id: String,
        read_at_ms: u64,
    },
    #[serde(rename = "typing.changed")]
    TypingChanged {
        chat_id: String,
        user_id: String,
        is_typing: bool,
    },
    #[serde(rename = "presence.changed")]
    PresenceChanged {
        user_id: String,
        is_online: bool,
        #[serde(default)]
        last_seen_at_ms: Option<u64>,
    },
    #[serde(rename = "chat.created")]
    ChatCreated(Chat),
    #[serde(rename = "participant.joined")]
    ParticipantJoined(Participant),
    #[serde(rename = "participant.left")]
    ParticipantLeft { chat_id: String, user_id: String },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    /// Parse one inbound text frame.
    pub fn decode(frame: &str) -> Result<Self, SyncError> {
        serde_json::from_str(frame).map_err(|err| {
            SyncError::new(
                SyncErrorCategory::Serialization,
                "malformed_event",
                err.to_string(),
            )
        })
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthAccepted { .. } => "auth.accepted",
            Self::AuthRejected { .. } => "auth.rejected",
            Self::MessageCreated(_) => "message.created",
            Self::MessageAck { .. } => "message.ack",
            Self::MessageRead { .. } => "message.read",
            Self::TypingChanged { .. } => "typing.changed",
            Self::PresenceChanged { .. } => "presence.changed",
            Self::ChatCreated(_) => "chat.created",
            Self::ParticipantJoined(_) => "participant.joined",
            Self::ParticipantLeft { .. } => "participant.left",
            Self::Error { .. } => "error",
        }
    }
}
