use std::{
    collections::{HashMap, HashSet},
    future::Future,
};

use tracing::{debug, trace, warn};

use crate::{
    error::{SyncError, SyncErrorCategory},
    receipts,
    types::{HistoryPage, HistoryRequest, Message, PendingMessage},
};

/// Hard cap applied to every page request.
pub const SERVER_PAGINATION_LIMIT_CAP: u16 = 100;

/// Which kind of page fetch is outstanding for a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Initial,
    Older,
}

/// Result of a live append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Message inserted at `index` of the chat's ordered log.
    Inserted {
        index: usize,
        /// Transaction ID of the optimistic echo this message replaced.
        resolved_pending: Option<String>,
    },
    /// A message with the same ID was already held; nothing changed.
    Duplicate { resolved_pending: Option<String> },
}

/// Result of applying an authoritative copy of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Inserted(Message),
    Updated(Message),
    Unchanged,
}

/// Summary of one page merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default)]
struct ChatLog {
    /// Ascending by `(created_at_ms, message_id)`.
    messages: Vec<Message>,
    ids: HashSet<String>,
    has_more: bool,
    loaded: bool,
    in_flight: Option<FetchKind>,
    pending: Vec<PendingMessage>,
}

impl ChatLog {
    fn insert_sorted(&mut self, message: Message) -> Option<usize> {
        if self.ids.contains(&message.message_id) {
            return None;
        }
        let index = self
            .messages
            .partition_point(|held| held.sort_key() < message.sort_key());
        self.ids.insert(message.message_id.clone());
        self.messages.insert(index, message);
        Some(index)
    }

    fn merge_page(&mut self, page: Vec<Message>) -> usize {
        let mut inserted = 0;
        for message in page {
            let txn = message.client_txn_id.clone();
            if self.insert_sorted(message).is_some() {
                inserted += 1;
            }
            if let Some(txn) = txn {
                self.take_pending(&txn);
            }
        }
        inserted
    }

    fn take_pending(&mut self, client_txn_id: &str) -> Option<PendingMessage> {
        let index = self
            .pending
            .iter()
            .position(|p| p.client_txn_id == client_txn_id)?;
        Some(self.pending.remove(index))
    }

    fn find_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        if !self.ids.contains(message_id) {
            return None;
        }
        self.messages
            .iter_mut()
            .find(|message| message.message_id == message_id)
    }
}

/// Per-chat ordered, deduplicated message log merging backfill pages with
/// live pushes.
#[derive(Debug, Clone)]
pub struct MessageStore {
    logs: HashMap<String, ChatLog>,
    page_limit: u16,
}

impl MessageStore {
    pub fn new(page_limit: u16) -> Self {
        Self {
            logs: HashMap::new(),
            page_limit: Self::bounded_paginate_limit(page_limit, SERVER_PAGINATION_LIMIT_CAP),
        }
    }

    /// Clamp a requested pagination limit against safety and server caps.
    ///
    /// The result is always in `1..=100`.
    pub fn bounded_paginate_limit(requested: u16, server_cap: u16) -> u16 {
        let safe_requested = requested.max(1);
        let safe_cap = server_cap.max(1);
        safe_requested.min(safe_cap).min(100)
    }

    pub fn page_limit(&self) -> u16 {
        self.page_limit
    }

    /// Start a latest-page fetch. Rejects a second fetch while one is
    /// outstanding for the same chat.
    pub fn begin_initial(&mut self, chat_id: &str) -> Result<HistoryRequest, SyncError> {
        let log = self.logs.entry(chat_id.to_owned()).or_default();
        if log.in_flight.is_some() {
            return Err(SyncError::in_flight("fetch_in_flight", chat_id));
        }
        log.in_flight = Some(FetchKind::Initial);
        Ok(HistoryRequest {
            chat_id: chat_id.to_owned(),
            limit: self.page_limit,
            before_message_id: None,
        })
    }

    /// Start an older-page fetch using the oldest held message as cursor.
    ///
    /// Returns `Ok(None)` when the server already reported no more history.
    pub fn begin_older(&mut self, chat_id: &str) -> Result<Option<HistoryRequest>, SyncError> {
        let Some(log) = self.logs.get_mut(chat_id).filter(|log| log.loaded) else {
            return Err(SyncError::new(
                SyncErrorCategory::Config,
                "history_not_loaded",
                format!("chat '{chat_id}' has no initial page; load it first"),
            ));
        };
        if log.in_flight.is_some() {
            return Err(SyncError::in_flight("fetch_in_flight", chat_id));
        }
        if !log.has_more {
            trace!(%chat_id, "older history exhausted");
            return Ok(None);
        }

        log.in_flight = Some(FetchKind::Older);
        Ok(Some(HistoryRequest {
            chat_id: chat_id.to_owned(),
            limit: self.page_limit,
            before_message_id: log.messages.first().map(|m| m.message_id.clone()),
        }))
    }

    /// Merge the latest page (newest-first from the server).
    ///
    /// `has_more` is taken from the page only on the first successful load;
    /// a later latest-page refresh (e.g. after reconnect) leaves the
    /// backfill cursor as it was.
    pub fn apply_initial(&mut self, chat_id: &str, page: HistoryPage) -> MergeSummary {
        let log = self.logs.entry(chat_id.to_owned()).or_default();
        log.in_flight = None;
        if !log.loaded {
            log.has_more = page.has_more;
            log.loaded = true;
        }
        let inserted = log.merge_page(page.messages);
        debug!(%chat_id, inserted, has_more = log.has_more, "initial page merged");
        MergeSummary {
            inserted,
            has_more: log.has_more,
        }
    }

    /// Merge an older page. Messages already held anywhere in the log are
    /// skipped. Messages that sort after the current oldest are dropped:
    /// anything newer than the backfill cursor arrives through the live feed
    /// or a latest-page refresh instead.
    pub fn apply_older(&mut self, chat_id: &str, page: HistoryPage) -> MergeSummary {
        let log = self.logs.entry(chat_id.to_owned()).or_default();
        log.in_flight = None;
        log.has_more = page.has_more;
        let mut messages = page.messages;
        if let Some(oldest) = log.messages.first() {
            let before = messages.len();
            messages.retain(|m| m.sort_key() <= oldest.sort_key());
            let dropped = before - messages.len();
            if dropped > 0 {
                warn!(%chat_id, dropped, "older page carried messages past the backfill cursor");
            }
        }
        let inserted = log.merge_page(messages);
        debug!(%chat_id, inserted, has_more = log.has_more, "older page merged");
        MergeSummary {
            inserted,
            has_more: log.has_more,
        }
    }

    /// Clear the in-flight marker after a failed fetch. `has_more` and the
    /// cursor are untouched, so the fetch can simply be retried.
    pub fn fail_fetch(&mut self, chat_id: &str) {
        if let Some(log) = self.logs.get_mut(chat_id) {
            log.in_flight = None;
        }
    }

    /// Fetch and merge the latest page with `fetch`, returning the full log.
    pub async fn load_initial<F, Fut>(
        &mut self,
        chat_id: &str,
        fetch: F,
    ) -> Result<(Vec<Message>, bool), SyncError>
    where
        F: FnOnce(HistoryRequest) -> Fut,
        Fut: Future<Output = Result<HistoryPage, SyncError>>,
    {
        let request = self.begin_initial(chat_id)?;
        match fetch(request).await {
            Ok(page) => {
                let summary = self.apply_initial(chat_id, page);
                Ok((self.messages(chat_id).to_vec(), summary.has_more))
            }
            Err(err) => {
                self.fail_fetch(chat_id);
                Err(err)
            }
        }
    }

    /// Fetch and merge the page before the oldest held message.
    pub async fn load_older<F, Fut>(
        &mut self,
        chat_id: &str,
        fetch: F,
    ) -> Result<(Vec<Message>, bool), SyncError>
    where
        F: FnOnce(HistoryRequest) -> Fut,
        Fut: Future<Output = Result<HistoryPage, SyncError>>,
    {
        let Some(request) = self.begin_older(chat_id)? else {
            return Ok((self.messages(chat_id).to_vec(), false));
        };
        match fetch(request).await {
            Ok(page) => {
                let summary = self.apply_older(chat_id, page);
                Ok((self.messages(chat_id).to_vec(), summary.has_more))
            }
            Err(err) => {
                self.fail_fetch(chat_id);
                Err(err)
            }
        }
    }

    /// Insert a push-delivered message. A message whose ID is already held
    /// is a no-op; a matching optimistic echo is resolved either way.
    pub fn append_live(&mut self, message: Message) -> AppendOutcome {
        let chat_id = message.chat_id.clone();
        let log = self.logs.entry(chat_id.clone()).or_default();
        let resolved_pending = message
            .client_txn_id
            .as_deref()
            .and_then(|txn| log.take_pending(txn))
            .map(|pending| pending.client_txn_id);

        match log.insert_sorted(message) {
            Some(index) => AppendOutcome::Inserted {
                index,
                resolved_pending,
            },
            None => {
                debug!(%chat_id, "duplicate live message ignored");
                AppendOutcome::Duplicate { resolved_pending }
            }
        }
    }

    /// Apply the server's authoritative copy of a message. Content and flags
    /// are replaced; `created_at` is immutable; status and receipts only grow.
    pub fn reconcile(&mut self, incoming: Message) -> ReconcileOutcome {
        let log = self.logs.entry(incoming.chat_id.clone()).or_default();
        if let Some(txn) = incoming.client_txn_id.as_deref() {
            log.take_pending(txn);
        }

        let Some(held) = log.find_mut(&incoming.message_id) else {
            let copy = incoming.clone();
            log.insert_sorted(incoming);
            return ReconcileOutcome::Inserted(copy);
        };

        if held.created_at_ms != incoming.created_at_ms {
            warn!(
                message_id = %held.message_id,
                held = held.created_at_ms,
                incoming = incoming.created_at_ms,
                "ignoring created_at change on reconcile"
            );
        }

        let before = held.clone();
        held.kind = incoming.kind;
        held.content = incoming.content;
        held.attachments = incoming.attachments;
        held.reply_to = incoming.reply_to;
        held.is_edited = incoming.is_edited;
        held.is_deleted = incoming.is_deleted;
        held.edited_at_ms = incoming.edited_at_ms;
        if held.client_txn_id.is_none() {
            held.client_txn_id = incoming.client_txn_id;
        }
        receipts::merge_receipts(held, &incoming.read_by);
        receipts::advance_status(held, incoming.status);

        if *held == before {
            ReconcileOutcome::Unchanged
        } else {
            ReconcileOutcome::Updated(held.clone())
        }
    }

    /// Resolve an optimistic echo with the server's acknowledgement. The
    /// acknowledged message is at least `delivered`.
    pub fn acknowledge(&mut self, client_txn_id: &str, mut message: Message) -> ReconcileOutcome {
        if let Some(log) = self.logs.get_mut(&message.chat_id) {
            log.take_pending(client_txn_id);
        }
        receipts::mark_delivered(&mut message);
        self.reconcile(message)
    }

    /// Queue an optimistic echo for a local send.
    pub fn queue_pending(&mut self, pending: PendingMessage) {
        self.logs
            .entry(pending.chat_id.clone())
            .or_default()
            .pending
            .push(pending);
    }

    /// Remove an optimistic echo (send failed).
    pub fn drop_pending(&mut self, chat_id: &str, client_txn_id: &str) -> Option<PendingMessage> {
        self.logs.get_mut(chat_id)?.take_pending(client_txn_id)
    }

    pub fn pending(&self, chat_id: &str) -> &[PendingMessage] {
        self.logs
            .get(chat_id)
            .map(|log| log.pending.as_slice())
            .unwrap_or_default()
    }

    /// Record that `reader_id` read a message, via the receipt rules, and
    /// return the updated message when it changed. Unknown messages are a
    /// logged no-op.
    pub fn mark_read(
        &mut self,
        chat_id: &str,
        message_id: &str,
        reader_id: &str,
        read_at_ms: u64,
    ) -> Option<Message> {
        let Some(message) = self
            .logs
            .get_mut(chat_id)
            .and_then(|log| log.find_mut(message_id))
        else {
            debug!(%chat_id, %message_id, "read receipt for unknown message ignored");
            return None;
        };

        receipts::record_read(message, reader_id, read_at_ms).then(|| message.clone())
    }

    /// Ordered message log of a chat.
    pub fn messages(&self, chat_id: &str) -> &[Message] {
        self.logs
            .get(chat_id)
            .map(|log| log.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn get(&self, chat_id: &str, message_id: &str) -> Option<&Message> {
        let log = self.logs.get(chat_id)?;
        if !log.ids.contains(message_id) {
            return None;
        }
        log.messages.iter().find(|m| m.message_id == message_id)
    }

    pub fn newest(&self, chat_id: &str) -> Option<&Message> {
        self.logs.get(chat_id)?.messages.last()
    }

    pub fn oldest_message_id(&self, chat_id: &str) -> Option<&str> {
        self.logs
            .get(chat_id)?
            .messages
            .first()
            .map(|m| m.message_id.as_str())
    }

    pub fn has_more(&self, chat_id: &str) -> bool {
        self.logs.get(chat_id).is_some_and(|log| log.has_more)
    }

    pub fn is_loaded(&self, chat_id: &str) -> bool {
        self.logs.get(chat_id).is_some_and(|log| log.loaded)
    }

    pub fn fetch_in_flight(&self, chat_id: &str) -> Option<FetchKind> {
        self.logs.get(chat_id).and_then(|log| log.in_flight)
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageDraft, MessageKind, MessageStatus};

    fn msg(id: &str, created_at_ms: u64) -> Message {
        Message {
            message_id: id.to_owned(),
            chat_id: "c1".to_owned(),
            sender_id: "alice".to_owned(),
            kind: MessageKind::Text,
            content: format!("body {id}"),
            attachments: Vec::new(),
            created_at_ms,
            status: MessageStatus::Delivered,
            read_by: Vec::new(),
            reply_to: None,
            is_edited: false,
            is_deleted: false,
            edited_at_ms: None,
            client_txn_id: None,
        }
    }

    /// Newest-first page, as the server returns it.
    fn page(ids: &[(&str, u64)], has_more: bool) -> HistoryPage {
        let mut messages: Vec<Message> = ids.iter().map(|(id, ts)| msg(id, *ts)).collect();
        messages.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        HistoryPage { messages, has_more }
    }

    fn ids(store: &MessageStore) -> Vec<&str> {
        store
            .messages("c1")
            .iter()
            .map(|m| m.message_id.as_str())
            .collect()
    }

    fn assert_sorted_unique(store: &MessageStore) {
        let log = store.messages("c1");
        assert!(log.windows(2).all(|w| w[0].sort_key() < w[1].sort_key()));
    }

    #[test]
    fn initial_page_is_reordered_oldest_first() {
        let mut store = MessageStore::new(30);
        let request = store.begin_initial("c1").expect("begin initial");
        assert_eq!(request.before_message_id, None);
        assert_eq!(request.limit, 30);

        let summary = store.apply_initial("c1", page(&[("m3", 30), ("m1", 10), ("m2", 20)], true));
        assert_eq!(summary.inserted, 3);
        assert!(summary.has_more);
        assert_eq!(ids(&store), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn append_live_twice_is_idempotent() {
        let mut store = MessageStore::default();
        let first = store.append_live(msg("m1", 10));
        assert!(matches!(first, AppendOutcome::Inserted { index: 0, .. }));

        let snapshot = store.messages("c1").to_vec();
        let second = store.append_live(msg("m1", 10));
        assert_eq!(
            second,
            AppendOutcome::Duplicate {
                resolved_pending: None
            }
        );
        assert_eq!(store.messages("c1"), snapshot.as_slice());
    }

    #[test]
    fn older_page_prepends_and_dedupes_against_full_log() {
        let mut store = MessageStore::new(2);
        store.begin_initial("c1").expect("begin initial");
        store.apply_initial("c1", page(&[("m3", 30), ("m4", 40)], true));
        store.append_live(msg("m5", 50));

        let request = store
            .begin_older("c1")
            .expect("begin older")
            .expect("has more");
        assert_eq!(request.before_message_id.as_deref(), Some("m3"));

        // Server overlaps by one message.
        let summary = store.apply_older("c1", page(&[("m1", 10), ("m2", 20), ("m3", 30)], false));
        assert_eq!(summary.inserted, 2);
        assert!(!store.has_more("c1"));
        assert_eq!(ids(&store), vec!["m1", "m2", "m3", "m4", "m5"]);
    }

    #[test]
    fn older_page_drops_messages_past_the_cursor() {
        let mut store = MessageStore::new(2);
        store.begin_initial("c1").expect("begin initial");
        store.apply_initial("c1", page(&[("m3", 30), ("m5", 50)], true));
        store.begin_older("c1").expect("begin older");

        let summary = store.apply_older("c1", page(&[("m1", 10), ("m4", 40)], true));
        assert_eq!(summary.inserted, 1);
        assert_eq!(ids(&store), vec!["m1", "m3", "m5"]);
        assert_eq!(
            store
                .begin_older("c1")
                .expect("begin older")
                .and_then(|request| request.before_message_id)
                .as_deref(),
            Some("m1")
        );
    }

    #[test]
    fn merge_order_is_independent_of_arrival_order() {
        let all = [("m1", 10), ("m2", 20), ("m3", 30), ("m4", 40), ("m5", 50)];
        for split in 0..=all.len() {
            let (older, newer) = all.split_at(split);

            let mut a = MessageStore::default();
            a.begin_initial("c1").expect("begin");
            a.apply_initial("c1", page(newer, true));
            a.apply_older("c1", page(older, false));

            let mut b = MessageStore::default();
            for (id, ts) in newer.iter().rev() {
                b.append_live(msg(id, *ts));
            }
            b.begin_initial("c1").expect("begin");
            b.apply_initial("c1", page(older, true));
            b.apply_initial("c1", page(newer, true));

            assert_sorted_unique(&a);
            assert_sorted_unique(&b);
            assert_eq!(ids(&a), vec!["m1", "m2", "m3", "m4", "m5"]);
            assert_eq!(ids(&a), ids(&b));
        }
    }

    #[test]
    fn same_timestamp_orders_by_id() {
        let mut store = MessageStore::default();
        store.append_live(msg("b", 10));
        store.append_live(msg("a", 10));
        assert_eq!(ids(&store), vec!["a", "b"]);
    }

    #[test]
    fn second_fetch_while_outstanding_is_rejected() {
        let mut store = MessageStore::default();
        store.begin_initial("c1").expect("first begin");
        let err = store.begin_initial("c1").expect_err("second begin must fail");
        assert_eq!(err.code, "fetch_in_flight");
        assert_eq!(store.fetch_in_flight("c1"), Some(FetchKind::Initial));
    }

    #[test]
    fn older_before_initial_is_rejected() {
        let mut store = MessageStore::default();
        let err = store.begin_older("c1").expect_err("must fail");
        assert_eq!(err.code, "history_not_loaded");
    }

    #[test]
    fn failed_fetch_keeps_cursor_and_has_more() {
        let mut store = MessageStore::default();
        store.begin_initial("c1").expect("begin");
        store.apply_initial("c1", page(&[("m2", 20)], true));

        store.begin_older("c1").expect("begin older");
        store.fail_fetch("c1");

        assert!(store.has_more("c1"));
        assert_eq!(store.oldest_message_id("c1"), Some("m2"));
        let retry = store
            .begin_older("c1")
            .expect("retry allowed")
            .expect("still has more");
        assert_eq!(retry.before_message_id.as_deref(), Some("m2"));
    }

    #[test]
    fn exhausted_history_skips_older_fetch() {
        let mut store = MessageStore::default();
        store.begin_initial("c1").expect("begin");
        store.apply_initial("c1", page(&[("m1", 10)], false));
        assert_eq!(store.begin_older("c1").expect("no error"), None);
        assert_eq!(store.fetch_in_flight("c1"), None);
    }

    #[test]
    fn refresh_of_latest_page_keeps_backfill_cursor() {
        let mut store = MessageStore::default();
        store.begin_initial("c1").expect("begin");
        store.apply_initial("c1", page(&[("m2", 20)], true));
        store.begin_older("c1").expect("begin older");
        store.apply_older("c1", page(&[("m1", 10)], false));

        store.begin_initial("c1").expect("refresh");
        store.apply_initial("c1", page(&[("m2", 20), ("m3", 30)], true));
        assert!(!store.has_more("c1"));
        assert_eq!(ids(&store), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn live_message_resolves_pending_echo() {
        let mut store = MessageStore::default();
        store.queue_pending(PendingMessage {
            client_txn_id: "tx-1".into(),
            chat_id: "c1".into(),
            sender_id: "alice".into(),
            draft: MessageDraft::text("hi"),
            queued_at_ms: 5,
            status: MessageStatus::Sent,
        });
        assert_eq!(store.pending("c1").len(), 1);

        let mut live = msg("m1", 10);
        live.client_txn_id = Some("tx-1".into());
        let outcome = store.append_live(live);

        assert_eq!(
            outcome,
            AppendOutcome::Inserted {
                index: 0,
                resolved_pending: Some("tx-1".into())
            }
        );
        assert!(store.pending("c1").is_empty());
    }

    #[test]
    fn acknowledge_marks_delivered_and_keeps_single_copy() {
        let mut store = MessageStore::default();
        let mut sent = msg("m1", 10);
        sent.status = MessageStatus::Sent;
        store.append_live(sent.clone());

        match store.acknowledge("tx-9", sent) {
            ReconcileOutcome::Updated(message) => {
                assert_eq!(message.status, MessageStatus::Delivered)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.messages("c1").len(), 1);
    }

    #[test]
    fn reconcile_applies_edit_but_not_status_regression() {
        let mut store = MessageStore::default();
        store.append_live(msg("m1", 10));
        store.mark_read("c1", "m1", "bob", 11);

        let mut edited = msg("m1", 10);
        edited.content = "edited".into();
        edited.is_edited = true;
        edited.edited_at_ms = Some(12);
        edited.status = MessageStatus::Delivered;

        match store.reconcile(edited) {
            ReconcileOutcome::Updated(message) => {
                assert_eq!(message.content, "edited");
                assert_eq!(message.status, MessageStatus::Read);
                assert_eq!(message.read_by.len(), 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.reconcile(store.messages("c1")[0].clone()), ReconcileOutcome::Unchanged);
    }

    #[test]
    fn mark_read_updates_status_and_ignores_unknown_messages() {
        let mut store = MessageStore::default();
        store.append_live(msg("m1", 10));

        let updated = store.mark_read("c1", "m1", "bob", 20).expect("changed");
        assert_eq!(updated.status, MessageStatus::Read);
        assert_eq!(store.mark_read("c1", "m1", "bob", 30), None);
        assert_eq!(store.mark_read("c1", "missing", "bob", 30), None);
        assert_eq!(store.get("c1", "m1").map(|m| m.read_by.len()), Some(1));
    }

    #[tokio::test]
    async fn load_helpers_propagate_failures_without_touching_state() {
        let mut store = MessageStore::default();
        let (messages, has_more) = store
            .load_initial("c1", |_| async { Ok(page(&[("m2", 20), ("m3", 30)], true)) })
            .await
            .expect("initial load");
        assert_eq!(messages.len(), 2);
        assert!(has_more);

        let err = store
            .load_older("c1", |request| async move {
                assert_eq!(request.before_message_id.as_deref(), Some("m2"));
                Err(SyncError::new(SyncErrorCategory::Network, "timeout", "slow"))
            })
            .await
            .expect_err("fetch must fail");
        assert!(err.is_retryable());
        assert!(store.has_more("c1"));
        assert_eq!(store.fetch_in_flight("c1"), None);

        let (messages, has_more) = store
            .load_older("c1", |_| async { Ok(page(&[("m1", 10)], false)) })
            .await
            .expect("retry works");
        assert_eq!(messages.first().map(|m| m.message_id.as_str()), Some("m1"));
        assert!(!has_more);
    }

    #[test]
    fn bounds_paginate_limit_for_safety() {
        assert_eq!(MessageStore::bounded_paginate_limit(0, 200), 1);
        assert_eq!(MessageStore::bounded_paginate_limit(25, 10), 10);
        assert_eq!(MessageStore::bounded_paginate_limit(150, 500), 100);
    }
}
