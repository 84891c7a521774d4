use crate::{
    error::{SyncError, SyncErrorCategory},
    types::{SendAck, SyncEvent},
};

/// Internal helper describing send success/failure before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Server acknowledged the send with a message ID.
    Success { message_id: String },
    /// Send failed locally or was refused.
    Failure { error: SyncError },
}

/// Convert a send outcome to a stable `SyncEvent::SendAck`.
pub fn normalize_send_outcome(client_txn_id: impl Into<String>, outcome: SendOutcome) -> SyncEvent {
    let client_txn_id = client_txn_id.into();
    match outcome {
        SendOutcome::Success { message_id } => SyncEvent::SendAck(SendAck {
            client_txn_id,
            message_id: Some(message_id),
            error_code: None,
        }),
        SendOutcome::Failure { error } => SyncEvent::SendAck(SendAck {
            client_txn_id,
            message_id: None,
            error_code: Some(error.code),
        }),
    }
}

/// Convert a failed request/response call to a `RequestFailed` event.
pub fn normalize_request_failure(
    chat_id: Option<&str>,
    operation: &str,
    error: SyncError,
) -> SyncEvent {
    let retryable = error.is_retryable();
    SyncEvent::RequestFailed {
        chat_id: chat_id.map(str::to_owned),
        operation: operation.to_owned(),
        code: error.code,
        message: error.message,
        retryable,
    }
}

/// Convert an error into a `FatalError` event.
pub fn normalize_fatal_error(error: SyncError, recoverable: bool) -> SyncEvent {
    SyncEvent::FatalError {
        code: error.code,
        message: error.message,
        recoverable,
    }
}

/// Error reported for a send issued while the session is not authenticated.
pub fn not_authenticated_send_error() -> SyncError {
    SyncError::new(
        SyncErrorCategory::Network,
        "not_authenticated",
        "session is not authenticated; message was not sent",
    )
}
