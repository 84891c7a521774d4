//! In-memory transport and API doubles for runtime tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use sync_core::{
    Chat, ChatCollection, ChatKind, ChatSettings, ChatToggle, ChatUpdate, ClientEvent, HistoryPage,
    HistoryRequest, Message, MessageStatus, NewChat, Participant, ParticipantRole, ServerEvent,
    SyncError, SyncErrorCategory,
};
use tokio::{
    sync::{Notify, mpsc},
    time::timeout,
};

use crate::{
    api::ChatApi,
    transport::{Transport, TransportLink},
};

/// Server side of one in-memory link.
pub struct ServerEnd {
    from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<String>,
}

impl ServerEnd {
    pub async fn next_event(&mut self) -> ClientEvent {
        let frame = timeout(Duration::from_secs(60), self.from_client.recv())
            .await
            .expect("client frame timeout")
            .expect("client link open");
        serde_json::from_str(&frame).expect("client frame decodes")
    }

    pub fn try_next_event(&mut self) -> Option<ClientEvent> {
        let frame = self.from_client.try_recv().ok()?;
        Some(serde_json::from_str(&frame).expect("client frame decodes"))
    }

    /// Resolves once the client dropped its side of the link.
    pub async fn closed_by_client(&mut self) {
        loop {
            let frame = timeout(Duration::from_secs(60), self.from_client.recv())
                .await
                .expect("link close timeout");
            if frame.is_none() {
                return;
            }
        }
    }

    pub async fn push(&self, event: ServerEvent) {
        let frame = serde_json::to_string(&event).expect("server event encodes");
        self.push_raw(&frame).await;
    }

    pub async fn push_raw(&self, frame: &str) {
        self.to_client
            .send(frame.to_owned())
            .await
            .expect("client listening");
    }

    /// Read the authenticate frame and accept it.
    pub async fn accept(&mut self) {
        match self.next_event().await {
            ClientEvent::Authenticate { user_id, .. } => {
                self.push(ServerEvent::AuthAccepted { user_id }).await;
            }
            other => panic!("expected authenticate, got {other:?}"),
        }
    }

    pub async fn reject(&mut self, reason: &str) {
        match self.next_event().await {
            ClientEvent::Authenticate { .. } => {
                self.push(ServerEvent::AuthRejected {
                    reason: reason.to_owned(),
                })
                .await;
            }
            other => panic!("expected authenticate, got {other:?}"),
        }
    }
}

/// Transport whose links are handed to the test as [`ServerEnd`]s.
#[derive(Clone)]
pub struct MemoryTransport {
    links: mpsc::UnboundedSender<ServerEnd>,
    refusals: Arc<AtomicU32>,
}

impl MemoryTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (links, rx) = mpsc::unbounded_channel();
        (
            Self {
                links,
                refusals: Arc::new(AtomicU32::new(0)),
            },
            rx,
        )
    }

    /// Fail the next `count` opens.
    pub fn refuse_next(&self, count: u32) {
        self.refusals.store(count, Ordering::SeqCst);
    }
}

impl Transport for MemoryTransport {
    async fn open(&self) -> Result<TransportLink, SyncError> {
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SyncError::new(
                SyncErrorCategory::Network,
                "transport_connect_failed",
                "connection refused",
            ));
        }

        let (outbound, from_client) = mpsc::channel(64);
        let (to_client, inbound) = mpsc::channel(64);
        self.links
            .send(ServerEnd {
                from_client,
                to_client,
            })
            .map_err(|_| {
                SyncError::new(
                    SyncErrorCategory::Network,
                    "transport_connect_failed",
                    "server gone",
                )
            })?;
        Ok(TransportLink { outbound, inbound })
    }
}

#[derive(Default)]
struct ApiState {
    collection: ChatCollection,
    history: VecDeque<Result<HistoryPage, SyncError>>,
    history_requests: Vec<HistoryRequest>,
    flag_errors: VecDeque<SyncError>,
    history_gate: Option<Arc<Notify>>,
    created: u32,
}

/// Scripted chat API sharing its state with the test.
#[derive(Clone, Default)]
pub struct MemoryApi {
    state: Arc<Mutex<ApiState>>,
}

impl MemoryApi {
    pub fn with_chats(chats: Vec<Chat>) -> Self {
        let api = Self::default();
        api.state.lock().expect("api state").collection = ChatCollection {
            global_unread_count: chats.iter().map(|chat| chat.unread_count).sum(),
            chats,
        };
        api
    }

    pub fn push_history(&self, result: Result<HistoryPage, SyncError>) {
        self.state.lock().expect("api state").history.push_back(result);
    }

    pub fn fail_next_flag(&self, error: SyncError) {
        self.state
            .lock()
            .expect("api state")
            .flag_errors
            .push_back(error);
    }

    /// Hold history responses until the returned gate is notified.
    pub fn gate_history(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().expect("api state").history_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn history_requests(&self) -> Vec<HistoryRequest> {
        self.state.lock().expect("api state").history_requests.clone()
    }

    fn find_chat<R>(&self, chat_id: &str, apply: impl FnOnce(&mut Chat) -> R) -> Result<R, SyncError> {
        let mut state = self.state.lock().expect("api state");
        state
            .collection
            .chats
            .iter_mut()
            .find(|chat| chat.chat_id == chat_id)
            .map(apply)
            .ok_or_else(|| {
                SyncError::new(SyncErrorCategory::Config, "http_status_error", "not found")
            })
    }
}

impl ChatApi for MemoryApi {
    async fn fetch_chats(&self) -> Result<ChatCollection, SyncError> {
        Ok(self.state.lock().expect("api state").collection.clone())
    }

    async fn fetch_history(&self, request: HistoryRequest) -> Result<HistoryPage, SyncError> {
        let gate = {
            let mut state = self.state.lock().expect("api state");
            state.history_requests.push(request);
            state.history_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.state
            .lock()
            .expect("api state")
            .history
            .pop_front()
            .unwrap_or_else(|| Ok(HistoryPage::default()))
    }

    async fn create_chat(&self, chat: NewChat) -> Result<Chat, SyncError> {
        let mut state = self.state.lock().expect("api state");
        state.created += 1;
        let chat_id = format!("new-{}", state.created);
        let mut created = test_chat(&chat_id, 0, &[]);
        created.kind = chat.kind;
        created.name = chat.name;
        created.participants = chat
            .participant_ids
            .iter()
            .map(|user_id| participant(&chat_id, user_id))
            .collect();
        state.collection.chats.push(created.clone());
        Ok(created)
    }

    async fn update_chat(&self, chat_id: String, update: ChatUpdate) -> Result<Chat, SyncError> {
        self.find_chat(&chat_id, |chat| {
            if let Some(name) = update.name {
                chat.name = Some(name);
            }
            if let Some(description) = update.description {
                chat.description = Some(description);
            }
            if let Some(settings) = update.settings {
                chat.settings = settings;
            }
            chat.clone()
        })
    }

    async fn set_chat_flag(
        &self,
        chat_id: String,
        toggle: ChatToggle,
        value: bool,
    ) -> Result<Chat, SyncError> {
        if let Some(err) = self.state.lock().expect("api state").flag_errors.pop_front() {
            return Err(err);
        }
        self.find_chat(&chat_id, |chat| {
            match toggle {
                ChatToggle::Pin => chat.is_pinned = value,
                ChatToggle::Archive => chat.is_archived = value,
            }
            chat.clone()
        })
    }
}

pub fn participant(chat_id: &str, user_id: &str) -> Participant {
    Participant {
        chat_id: chat_id.to_owned(),
        user_id: user_id.to_owned(),
        role: ParticipantRole::Member,
        is_online: false,
        last_seen_at_ms: None,
        is_muted: false,
        is_pinned: false,
    }
}

pub fn test_chat(chat_id: &str, last_activity_ms: u64, members: &[&str]) -> Chat {
    Chat {
        chat_id: chat_id.to_owned(),
        kind: ChatKind::Group,
        name: Some(chat_id.to_owned()),
        description: None,
        participants: members
            .iter()
            .map(|user_id| participant(chat_id, user_id))
            .collect(),
        last_activity_ms,
        is_pinned: false,
        is_archived: false,
        unread_count: 0,
        settings: ChatSettings::default(),
    }
}

pub fn test_message(chat_id: &str, message_id: &str, sender_id: &str, created_at_ms: u64) -> Message {
    Message {
        message_id: message_id.to_owned(),
        chat_id: chat_id.to_owned(),
        sender_id: sender_id.to_owned(),
        kind: Default::default(),
        content: format!("body of {message_id}"),
        attachments: Vec::new(),
        created_at_ms,
        status: MessageStatus::Sent,
        read_by: Vec::new(),
        reply_to: None,
        is_edited: false,
        is_deleted: false,
        edited_at_ms: None,
        client_txn_id: None,
    }
}
