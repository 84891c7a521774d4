//! Core chat synchronization contract shared between the runtime and its
//! consumers.
//!
//! This crate defines the data model, wire protocol, command/event types,
//! lifecycle model, and the in-memory state components. It performs no I/O.

/// Async command/event channel primitives and typed subscriptions.
pub mod channel;
/// Ordered chat collection.
pub mod chat_list;
/// Stable error types and HTTP classification helpers.
pub mod error;
/// Per-chat ordered message logs.
pub mod messages;
/// Event normalization helpers (for example send acknowledgements).
pub mod normalization;
/// Global presence map.
pub mod presence;
/// JSON wire events.
pub mod protocol;
/// Read receipts and status derivation.
pub mod receipts;
/// Backoff policy used by reconnect loops.
pub mod retry;
/// Connection session state machine.
pub mod state_machine;
/// Consumer-facing types (data model, commands, events).
pub mod types;
/// Local and remote typing indicators.
pub mod typing;

pub use channel::{ChannelError, ChatSubscriptions, Subscription, SyncChannels};
pub use chat_list::{ChatList, compare_chats};
pub use error::{SyncError, SyncErrorCategory, classify_http_status};
pub use messages::{
    AppendOutcome, FetchKind, MergeSummary, MessageStore, ReconcileOutcome,
    SERVER_PAGINATION_LIMIT_CAP,
};
pub use normalization::{
    SendOutcome, normalize_fatal_error, normalize_request_failure, normalize_send_outcome,
};
pub use presence::{PresenceEntry, PresenceTracker};
pub use protocol::{ClientEvent, ServerEvent};
pub use retry::RetryPolicy;
pub use state_machine::{AuthTransition, SessionStateMachine};
pub use types::{
    Attachment, Chat, ChatCollection, ChatKind, ChatSettings, ChatToggle, ChatUpdate,
    ConnectionState, EventKind, HistoryPage, HistoryRequest, Message, MessageDraft, MessageKind,
    MessageStatus, NewChat, Participant, ParticipantRole, PendingMessage, ReadReceipt, SendAck,
    SyncCommand, SyncEvent,
};
pub use typing::{TypingCoordinator, TypingExpiry, TypingSignal};
