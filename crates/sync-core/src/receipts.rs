//! Read receipts and status derivation.
//!
//! Status only moves forward (`sent` → `delivered` → `read`); every update
//! takes the max of the current and the candidate ordinal.

use crate::types::{Message, MessageStatus, ReadReceipt};

/// Insert `(user_id, read_at_ms)` into `message.read_by` unless the user
/// already has an entry, then re-derive status. Returns whether the message
/// changed.
pub fn record_read(message: &mut Message, user_id: &str, read_at_ms: u64) -> bool {
    if message.read_by.iter().any(|r| r.user_id == user_id) {
        return false;
    }
    message.read_by.push(ReadReceipt {
        user_id: user_id.to_owned(),
        read_at_ms,
    });
    refresh_status(message);
    true
}

/// Merge another copy's receipts into `message`, keeping one entry per user.
pub fn merge_receipts(message: &mut Message, receipts: &[ReadReceipt]) -> bool {
    let mut changed = false;
    for receipt in receipts {
        changed |= record_read(message, &receipt.user_id, receipt.read_at_ms);
    }
    changed
}

/// Transport acknowledged the message.
pub fn mark_delivered(message: &mut Message) -> bool {
    advance_status(message, MessageStatus::Delivered)
}

/// Move status to `candidate` if that is further along. Never regresses.
pub fn advance_status(message: &mut Message, candidate: MessageStatus) -> bool {
    let next = message.status.max(candidate);
    if next == message.status {
        return false;
    }
    message.status = next;
    true
}

/// Status implied by the current `read_by` aggregate and the stored status.
pub fn derive_status(message: &Message) -> MessageStatus {
    let read_by_other = message
        .read_by
        .iter()
        .any(|receipt| receipt.user_id != message.sender_id);
    if read_by_other {
        MessageStatus::Read
    } else {
        message.status
    }
}

fn refresh_status(message: &mut Message) {
    let derived = derive_status(message);
    advance_status(message, derived);
}
