use std::{
    collections::HashSet,
    future::Future,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use sync_core::{
    AppendOutcome, ChannelError, Chat, ChatCollection, ChatList, ChatToggle, ClientEvent,
    EventKind, FetchKind, HistoryPage, HistoryRequest, Message, MessageDraft, MessageStatus,
    MessageStore, PendingMessage, PresenceTracker, ReconcileOutcome, SendOutcome, ServerEvent,
    Subscription, SyncChannels, SyncCommand, SyncError, SyncErrorCategory, SyncEvent,
    TypingCoordinator, TypingSignal, normalization::not_authenticated_send_error,
    normalize_fatal_error, normalize_request_failure, normalize_send_outcome,
};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::{
    api::ChatApi,
    config::RuntimeConfig,
    session::{ConnectOutcome, Inbound, TransportSession},
    transport::Transport,
};

const COMMAND_BUFFER: usize = 128;
const EVENT_BUFFER: usize = 512;
const TASK_BUFFER: usize = 64;

/// Cloneable handle to a running sync runtime.
#[derive(Clone, Debug)]
pub struct SyncHandle {
    channels: SyncChannels,
    shutdown: CancellationToken,
}

impl SyncHandle {
    pub async fn send(&self, command: SyncCommand) -> Result<(), ChannelError> {
        self.channels.send_command(command).await
    }

    /// Send a message under a fresh transaction ID, which is returned and
    /// later echoed in `SendAck`.
    pub async fn send_message(
        &self,
        chat_id: impl Into<String>,
        draft: MessageDraft,
    ) -> Result<String, ChannelError> {
        let client_txn_id = Uuid::new_v4().to_string();
        self.send(SyncCommand::SendMessage {
            chat_id: chat_id.into(),
            client_txn_id: client_txn_id.clone(),
            draft,
        })
        .await?;
        Ok(client_txn_id)
    }

    pub fn subscribe(&self) -> Subscription {
        self.channels.subscribe()
    }

    pub fn subscribe_kinds(&self, kinds: &[EventKind]) -> Subscription {
        self.channels.subscribe_kinds(kinds)
    }

    /// Events scoped to one chat. The stream ends when the chat is left.
    pub fn subscribe_chat(&self, chat_id: &str) -> Result<Subscription, ChannelError> {
        self.channels.subscribe_chat(chat_id)
    }

    /// Stop the runtime, releasing the connection and all timers.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Start a runtime task owning `transport` and `api`.
pub fn spawn_runtime<T, A>(config: RuntimeConfig, transport: T, api: A) -> SyncHandle
where
    T: Transport,
    A: ChatApi,
{
    let (channels, command_rx) = SyncChannels::new(COMMAND_BUFFER, EVENT_BUFFER);
    let shutdown = CancellationToken::new();
    let runtime = SyncRuntime::new(
        config,
        transport,
        Arc::new(api),
        channels.clone(),
        command_rx,
        shutdown.child_token(),
    );
    tokio::spawn(runtime.run());

    SyncHandle { channels, shutdown }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Toggle { toggle: ChatToggle, previous: bool },
    Update,
    Create,
}

impl Mutation {
    fn operation(self) -> &'static str {
        match self {
            Self::Toggle { .. } => "toggle_chat",
            Self::Update => "update_chat",
            Self::Create => "create_chat",
        }
    }
}

/// Completion of a spawned round trip, routed back into the runtime loop.
#[derive(Debug)]
enum TaskResult {
    Chats(Result<ChatCollection, SyncError>),
    History {
        chat_id: String,
        kind: FetchKind,
        joined_at_request: bool,
        result: Result<HistoryPage, SyncError>,
    },
    Mutation {
        chat_id: Option<String>,
        mutation: Mutation,
        result: Result<Chat, SyncError>,
    },
}

struct SyncRuntime<T, A> {
    channels: SyncChannels,
    command_rx: mpsc::Receiver<SyncCommand>,
    shutdown: CancellationToken,
    local_user_id: String,
    session: TransportSession<T>,
    api: Arc<A>,
    chats: ChatList,
    messages: MessageStore,
    presence: PresenceTracker,
    typing: TypingCoordinator,
    task_tx: mpsc::Sender<TaskResult>,
    task_rx: mpsc::Receiver<TaskResult>,
    refresh_in_flight: bool,
    mutations_in_flight: HashSet<String>,
}

impl<T: Transport, A: ChatApi> SyncRuntime<T, A> {
    fn new(
        config: RuntimeConfig,
        transport: T,
        api: Arc<A>,
        channels: SyncChannels,
        command_rx: mpsc::Receiver<SyncCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::channel(TASK_BUFFER);
        let session = TransportSession::new(
            transport,
            config.user_id.clone(),
            config.user_token,
            config.auth_timeout,
            config.reconnect,
            channels.clone(),
        );
        Self {
            channels,
            command_rx,
            shutdown,
            chats: ChatList::new(config.user_id.clone()),
            messages: MessageStore::new(config.history_page_limit),
            presence: PresenceTracker::new(),
            typing: TypingCoordinator::new(
                config.user_id.clone(),
                config.typing_idle,
                config.typing_lifetime,
            ),
            local_user_id: config.user_id,
            session,
            api,
            task_tx,
            task_rx,
            refresh_in_flight: false,
            mutations_in_flight: HashSet::new(),
        }
    }

    async fn run(mut self) {
        loop {
            let typing_deadline = self.typing.next_deadline();
            let reconnect_deadline = self.session.reconnect_deadline();

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(command) = self.command_rx.recv() => {
                    if let Err(err) = self.handle_command(command).await {
                        let recoverable = err.is_retryable();
                        self.channels.emit(normalize_fatal_error(err, recoverable));
                    }
                }
                inbound = self.session.recv() => self.handle_inbound(inbound),
                Some(result) = self.task_rx.recv() => self.handle_task_result(result),
                _ = sleep_until_opt(typing_deadline) => self.handle_typing_deadline().await,
                _ = sleep_until_opt(reconnect_deadline) => self.handle_reconnect_due().await,
            }
        }

        self.session.disconnect();
        debug!(user_id = %self.local_user_id, "sync runtime stopped");
    }

    async fn handle_command(&mut self, command: SyncCommand) -> Result<(), SyncError> {
        match command {
            SyncCommand::Connect => {
                let outcome = self.session.connect().await?;
                if matches!(outcome, ConnectOutcome::Failed(_)) {
                    self.session.schedule_reconnect();
                }
                self.after_connect(outcome);
            }
            SyncCommand::Disconnect => {
                self.session.disconnect();
                for chat_id in self.typing.clear_all() {
                    self.emit_typing(&chat_id);
                }
            }
            SyncCommand::JoinChat { chat_id } => {
                if let Err(err) = self.session.join(&chat_id).await {
                    self.fail_request(Some(chat_id.as_str()), "join_chat", err);
                }
            }
            SyncCommand::LeaveChat { chat_id } => self.handle_leave_chat(chat_id).await,
            SyncCommand::RefreshChats => {
                if !self.start_refresh_chats() {
                    self.fail_request(
                        None,
                        "refresh_chats",
                        SyncError::new(
                            SyncErrorCategory::Conflict,
                            "fetch_in_flight",
                            "chat collection refresh already in flight",
                        ),
                    );
                }
            }
            SyncCommand::LoadInitial { chat_id } => match self.messages.begin_initial(&chat_id) {
                Ok(request) => self.spawn_history(chat_id, FetchKind::Initial, request),
                Err(err) => self.fail_request(Some(chat_id.as_str()), "load_initial", err),
            },
            SyncCommand::LoadOlder { chat_id } => match self.messages.begin_older(&chat_id) {
                Ok(Some(request)) => self.spawn_history(chat_id, FetchKind::Older, request),
                Ok(None) => self.emit_history(&chat_id, false),
                Err(err) => self.fail_request(Some(chat_id.as_str()), "load_older", err),
            },
            SyncCommand::SendMessage {
                chat_id,
                client_txn_id,
                draft,
            } => {
                self.handle_send_message(chat_id, client_txn_id, draft)
                    .await
            }
            SyncCommand::NotifyTyping { chat_id } => {
                if !self.session.is_authenticated() {
                    debug!(%chat_id, "typing activity ignored while not authenticated");
                    return Ok(());
                }
                if let Some(signal) = self.typing.notify_typing_activity(&chat_id, Instant::now()) {
                    self.send_typing_signal(signal).await;
                }
            }
            SyncCommand::MarkRead {
                chat_id,
                message_id,
            } => self.handle_mark_read(chat_id, message_id).await,
            SyncCommand::ToggleChat { chat_id, toggle } => self.handle_toggle_chat(chat_id, toggle),
            SyncCommand::UpdateChat { chat_id, update } => {
                if !self.begin_mutation(&chat_id, "update_chat") {
                    return Ok(());
                }
                let api = Arc::clone(&self.api);
                self.spawn_task(async move {
                    let result = api.update_chat(chat_id.clone(), update).await;
                    TaskResult::Mutation {
                        chat_id: Some(chat_id),
                        mutation: Mutation::Update,
                        result,
                    }
                });
            }
            SyncCommand::CreateChat { chat } => {
                let api = Arc::clone(&self.api);
                self.spawn_task(async move {
                    TaskResult::Mutation {
                        chat_id: None,
                        mutation: Mutation::Create,
                        result: api.create_chat(chat).await,
                    }
                });
            }
        }
        Ok(())
    }

    fn after_connect(&mut self, outcome: ConnectOutcome) {
        if matches!(outcome, ConnectOutcome::Authenticated { is_reconnect: true }) {
            self.resync();
        }
    }

    /// Best-effort recovery after a reconnect: remote typing is rebuilt from
    /// scratch, the chat list and the latest page of every loaded room are
    /// refetched and merged.
    fn resync(&mut self) {
        for chat_id in self.typing.clear_remote() {
            self.emit_typing(&chat_id);
        }
        self.start_refresh_chats();

        let rooms: Vec<String> = self.session.joined_rooms().map(str::to_owned).collect();
        for chat_id in rooms {
            if !self.messages.is_loaded(&chat_id) {
                continue;
            }
            match self.messages.begin_initial(&chat_id) {
                Ok(request) => self.spawn_history(chat_id, FetchKind::Initial, request),
                Err(err) => debug!(%chat_id, error = %err, "resync page skipped"),
            }
        }
    }

    async fn handle_reconnect_due(&mut self) {
        match self.session.on_reconnect_due().await {
            Ok(outcome) => self.after_connect(outcome),
            Err(err) => {
                let recoverable = err.is_retryable();
                self.channels.emit(normalize_fatal_error(err, recoverable));
            }
        }
    }

    async fn handle_leave_chat(&mut self, chat_id: String) {
        if let Some(stop) = self.typing.clear_chat(&chat_id) {
            self.send_typing_signal(stop).await;
        }
        self.emit_typing(&chat_id);
        if let Err(err) = self.session.leave(&chat_id).await {
            debug!(%chat_id, error = %err, "leave not delivered");
        }
        self.channels.chats().close(&chat_id);
    }

    async fn handle_send_message(
        &mut self,
        chat_id: String,
        client_txn_id: String,
        draft: MessageDraft,
    ) {
        if !self.session.is_authenticated() {
            self.channels.emit(normalize_send_outcome(
                client_txn_id,
                SendOutcome::Failure {
                    error: not_authenticated_send_error(),
                },
            ));
            return;
        }

        if let Some(stop) = self.typing.on_message_sent(&chat_id) {
            self.send_typing_signal(stop).await;
        }

        let pending = PendingMessage {
            client_txn_id: client_txn_id.clone(),
            chat_id: chat_id.clone(),
            sender_id: self.local_user_id.clone(),
            draft: draft.clone(),
            queued_at_ms: unix_now_ms(),
            status: MessageStatus::Sent,
        };
        self.messages.queue_pending(pending.clone());
        self.channels.emit(SyncEvent::MessagePending { pending });

        let event = ClientEvent::SendMessage {
            client_txn_id: client_txn_id.clone(),
            chat_id: chat_id.clone(),
            kind: draft.kind,
            content: draft.content,
            attachments: draft.attachments,
            reply_to: draft.reply_to,
        };
        if let Err(error) = self.session.send(&event).await {
            warn!(%chat_id, %client_txn_id, error = %error, "send failed");
            self.messages.drop_pending(&chat_id, &client_txn_id);
            self.channels
                .emit(normalize_send_outcome(client_txn_id, SendOutcome::Failure { error }));
        }
    }

    async fn handle_mark_read(&mut self, chat_id: String, message_id: String) {
        let is_newest = self
            .messages
            .newest(&chat_id)
            .is_some_and(|newest| newest.message_id == message_id);

        if let Some(message) =
            self.messages
                .mark_read(&chat_id, &message_id, &self.local_user_id, unix_now_ms())
        {
            self.channels.emit(SyncEvent::MessageUpdated { message });
        }
        if is_newest && self.chats.mark_chat_read(&chat_id) {
            self.emit_chat_list();
        }

        if self.session.is_authenticated() {
            let event = ClientEvent::MarkRead {
                chat_id,
                message_id,
            };
            if let Err(err) = self.session.send(&event).await {
                debug!(error = %err, "read receipt not delivered");
            }
        }
    }

    fn handle_toggle_chat(&mut self, chat_id: String, toggle: ChatToggle) {
        if !self.begin_mutation(&chat_id, "toggle_chat") {
            return;
        }
        let Some(value) = self.chats.on_toggle(&chat_id, toggle) else {
            self.mutations_in_flight.remove(&chat_id);
            self.fail_request(Some(chat_id.as_str()), "toggle_chat", unknown_chat(&chat_id));
            return;
        };
        self.emit_chat_list();

        let api = Arc::clone(&self.api);
        self.spawn_task(async move {
            let result = api.set_chat_flag(chat_id.clone(), toggle, value).await;
            TaskResult::Mutation {
                chat_id: Some(chat_id),
                mutation: Mutation::Toggle {
                    toggle,
                    previous: !value,
                },
                result,
            }
        });
    }

    /// Reserve the per-chat mutation slot. Fails for unknown chats and
    /// while another mutation of the same chat is outstanding.
    fn begin_mutation(&mut self, chat_id: &str, operation: &str) -> bool {
        if !self.chats.contains(chat_id) {
            self.fail_request(Some(chat_id), operation, unknown_chat(chat_id));
            return false;
        }
        if !self.mutations_in_flight.insert(chat_id.to_owned()) {
            self.fail_request(
                Some(chat_id),
                operation,
                SyncError::in_flight("mutation_in_flight", chat_id),
            );
            return false;
        }
        true
    }

    fn start_refresh_chats(&mut self) -> bool {
        if self.refresh_in_flight {
            return false;
        }
        self.refresh_in_flight = true;
        let api = Arc::clone(&self.api);
        self.spawn_task(async move { TaskResult::Chats(api.fetch_chats().await) });
        true
    }

    fn spawn_history(&self, chat_id: String, kind: FetchKind, request: HistoryRequest) {
        let api = Arc::clone(&self.api);
        let joined_at_request = self.session.is_joined(&chat_id);
        self.spawn_task(async move {
            let result = api.fetch_history(request).await;
            TaskResult::History {
                chat_id,
                kind,
                joined_at_request,
                result,
            }
        });
    }

    /// Run one round trip off the loop; its result comes back through
    /// `task_rx`. Abandoned when the runtime closes.
    fn spawn_task<F>(&self, task: F)
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        let tx = self.task_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = task => {
                    let _ = tx.send(result).await;
                }
            }
        });
    }

    fn handle_task_result(&mut self, result: TaskResult) {
        match result {
            TaskResult::Chats(result) => {
                self.refresh_in_flight = false;
                match result {
                    Ok(collection) => {
                        self.chats.initialize(collection, &self.presence);
                        self.emit_chat_list();
                    }
                    Err(err) => self.fail_request(None, "refresh_chats", err),
                }
            }
            TaskResult::History {
                chat_id,
                kind,
                joined_at_request,
                result,
            } => self.handle_history_result(chat_id, kind, joined_at_request, result),
            TaskResult::Mutation {
                chat_id,
                mutation,
                result,
            } => self.handle_mutation_result(chat_id, mutation, result),
        }
    }

    fn handle_history_result(
        &mut self,
        chat_id: String,
        kind: FetchKind,
        joined_at_request: bool,
        result: Result<HistoryPage, SyncError>,
    ) {
        let operation = match kind {
            FetchKind::Initial => "load_initial",
            FetchKind::Older => "load_older",
        };
        if joined_at_request && !self.session.is_joined(&chat_id) {
            debug!(%chat_id, operation, "discarding page for chat that was left");
            self.messages.fail_fetch(&chat_id);
            return;
        }

        match result {
            Ok(page) => {
                let summary = match kind {
                    FetchKind::Initial => self.messages.apply_initial(&chat_id, page),
                    FetchKind::Older => self.messages.apply_older(&chat_id, page),
                };
                self.emit_history(&chat_id, summary.has_more);
            }
            Err(err) => {
                self.messages.fail_fetch(&chat_id);
                self.fail_request(Some(chat_id.as_str()), operation, err);
            }
        }
    }

    fn handle_mutation_result(
        &mut self,
        chat_id: Option<String>,
        mutation: Mutation,
        result: Result<Chat, SyncError>,
    ) {
        if let Some(chat_id) = &chat_id {
            self.mutations_in_flight.remove(chat_id);
        }

        match result {
            Ok(mut chat) => {
                self.presence.apply_to(&mut chat);
                let applied = match mutation {
                    Mutation::Create => self.chats.on_chat_created(chat),
                    Mutation::Toggle { .. } | Mutation::Update => self.chats.reconcile(chat),
                };
                match applied {
                    Ok(()) => self.emit_chat_list(),
                    Err(err) => self.fail_request(chat_id.as_deref(), mutation.operation(), err),
                }
            }
            Err(err) => {
                if let (Mutation::Toggle { toggle, previous }, Some(chat_id)) =
                    (mutation, chat_id.as_deref())
                {
                    self.chats.set_flag(chat_id, toggle, previous);
                    self.emit_chat_list();
                }
                self.fail_request(chat_id.as_deref(), mutation.operation(), err);
            }
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        let event = match inbound {
            Inbound::Closed => {
                self.session.on_link_closed();
                for chat_id in self.typing.clear_remote() {
                    self.emit_typing(&chat_id);
                }
                return;
            }
            Inbound::Event(event) => event,
        };
        trace!(event = event.name(), "inbound event");

        match event {
            ServerEvent::AuthAccepted { .. } | ServerEvent::AuthRejected { .. } => {
                debug!("ignoring auth event outside handshake");
            }
            ServerEvent::MessageCreated(message) => self.on_message_created(message),
            ServerEvent::MessageAck {
                client_txn_id,
                message,
            } => self.on_message_ack(client_txn_id, message),
            ServerEvent::MessageRead {
                chat_id,
                message_id,
                user_id,
                read_at_ms,
            } => {
                if let Some(message) =
                    self.messages
                        .mark_read(&chat_id, &message_id, &user_id, read_at_ms)
                {
                    self.channels.emit(SyncEvent::MessageUpdated { message });
                }
            }
            ServerEvent::TypingChanged {
                chat_id,
                user_id,
                is_typing,
            } => {
                if !self.session.is_joined(&chat_id) {
                    debug!(%chat_id, %user_id, "typing event for chat not joined");
                    return;
                }
                if self
                    .typing
                    .on_typing(&chat_id, &user_id, is_typing, Instant::now())
                {
                    self.emit_typing(&chat_id);
                }
            }
            ServerEvent::PresenceChanged {
                user_id,
                is_online,
                last_seen_at_ms,
            } => self.on_presence_changed(user_id, is_online, last_seen_at_ms),
            ServerEvent::ChatCreated(mut chat) => {
                self.presence.apply_to(&mut chat);
                let chat_id = chat.chat_id.clone();
                match self.chats.on_chat_created(chat) {
                    Ok(()) => self.emit_chat_list(),
                    Err(err) => warn!(%chat_id, error = %err, "rejecting chat.created"),
                }
            }
            ServerEvent::ParticipantJoined(participant) => {
                let chat_id = participant.chat_id.clone();
                let user_id = participant.user_id.clone();
                match self.chats.on_participant_joined(participant) {
                    Ok(true) => {
                        self.chats.apply_presence(&self.presence, &user_id);
                        self.emit_participants(&chat_id);
                    }
                    Ok(false) => {}
                    Err(err) => warn!(%chat_id, %user_id, error = %err, "rejecting membership change"),
                }
            }
            ServerEvent::ParticipantLeft { chat_id, user_id } => {
                match self.chats.on_participant_left(&chat_id, &user_id) {
                    Ok(true) => self.emit_participants(&chat_id),
                    Ok(false) => {}
                    Err(err) => warn!(%chat_id, %user_id, error = %err, "rejecting membership change"),
                }
            }
            ServerEvent::Error { code, message } => {
                warn!(%code, %message, "server error event");
                self.channels.emit(SyncEvent::ServerError { code, message });
            }
        }
    }

    fn on_message_created(&mut self, message: Message) {
        let chat_id = message.chat_id.clone();
        let sender_id = message.sender_id.clone();

        match self.messages.append_live(message.clone()) {
            AppendOutcome::Inserted {
                resolved_pending, ..
            } => {
                if let Some(client_txn_id) = resolved_pending {
                    self.emit_send_success(client_txn_id, &message.message_id);
                }
                let bumped = self.chats.on_new_message(&message);
                self.channels.emit(SyncEvent::MessageAppended { message });
                if bumped {
                    self.emit_chat_list();
                }
            }
            AppendOutcome::Duplicate { resolved_pending } => {
                debug!(%chat_id, message_id = %message.message_id, "duplicate message.created");
                if let Some(client_txn_id) = resolved_pending {
                    self.emit_send_success(client_txn_id, &message.message_id);
                }
            }
        }

        if self
            .typing
            .on_typing(&chat_id, &sender_id, false, Instant::now())
        {
            self.emit_typing(&chat_id);
        }
    }

    fn on_message_ack(&mut self, client_txn_id: String, message: Message) {
        let had_pending = self
            .messages
            .pending(&message.chat_id)
            .iter()
            .any(|pending| pending.client_txn_id == client_txn_id);
        let message_id = message.message_id.clone();

        match self.messages.acknowledge(&client_txn_id, message) {
            ReconcileOutcome::Inserted(message) => {
                let bumped = self.chats.on_new_message(&message);
                self.channels.emit(SyncEvent::MessageAppended { message });
                if bumped {
                    self.emit_chat_list();
                }
            }
            ReconcileOutcome::Updated(message) => {
                self.channels.emit(SyncEvent::MessageUpdated { message });
            }
            ReconcileOutcome::Unchanged => {}
        }

        if had_pending {
            self.emit_send_success(client_txn_id, &message_id);
        } else {
            debug!(%client_txn_id, "ack for transaction that is no longer pending");
        }
    }

    fn on_presence_changed(&mut self, user_id: String, is_online: bool, last_seen: Option<u64>) {
        let changed = if is_online {
            self.presence.on_online(&user_id)
        } else {
            self.presence
                .on_offline(&user_id, last_seen.unwrap_or_else(unix_now_ms))
        };
        if !changed {
            return;
        }

        let entry = self.presence.get(&user_id).unwrap_or_default();
        self.channels.emit(SyncEvent::PresenceChanged {
            user_id: user_id.clone(),
            is_online: entry.is_online,
            last_seen_at_ms: entry.last_seen_at_ms,
        });
        for chat_id in self.chats.apply_presence(&self.presence, &user_id) {
            self.emit_participants(&chat_id);
        }
    }

    async fn handle_typing_deadline(&mut self) {
        let expiry = self.typing.poll_expired(Instant::now());
        for signal in expiry.stop_signals {
            self.send_typing_signal(signal).await;
        }
        for chat_id in expiry.changed_chats {
            self.emit_typing(&chat_id);
        }
    }

    async fn send_typing_signal(&mut self, signal: TypingSignal) {
        let event = match signal {
            TypingSignal::Start { chat_id } => ClientEvent::TypingStart { chat_id },
            TypingSignal::Stop { chat_id } => ClientEvent::TypingStop { chat_id },
        };
        if let Err(err) = self.session.send(&event).await {
            debug!(event = event.name(), error = %err, "typing signal not delivered");
        }
    }

    fn emit_send_success(&self, client_txn_id: String, message_id: &str) {
        self.channels.emit(normalize_send_outcome(
            client_txn_id,
            SendOutcome::Success {
                message_id: message_id.to_owned(),
            },
        ));
    }

    fn emit_chat_list(&self) {
        self.channels.emit(SyncEvent::ChatListUpdated {
            chats: self.chats.active(),
            global_unread_count: self.chats.global_unread_count(),
        });
    }

    fn emit_history(&self, chat_id: &str, has_more: bool) {
        self.channels.emit(SyncEvent::HistoryLoaded {
            chat_id: chat_id.to_owned(),
            messages: self.messages.messages(chat_id).to_vec(),
            has_more,
        });
    }

    fn emit_typing(&self, chat_id: &str) {
        self.channels.emit(SyncEvent::TypingChanged {
            chat_id: chat_id.to_owned(),
            user_ids: self.typing.typing_users(chat_id, Instant::now()),
        });
    }

    fn emit_participants(&self, chat_id: &str) {
        if let Some(chat) = self.chats.get(chat_id) {
            self.channels.emit(SyncEvent::ParticipantsChanged {
                chat_id: chat_id.to_owned(),
                participants: chat.participants.clone(),
            });
        }
    }

    fn fail_request(&self, chat_id: Option<&str>, operation: &str, err: SyncError) {
        debug!(?chat_id, operation, error = %err, "request failed");
        self.channels
            .emit(normalize_request_failure(chat_id, operation, err));
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn unknown_chat(chat_id: &str) -> SyncError {
    SyncError::new(
        SyncErrorCategory::Config,
        "unknown_chat",
        format!("chat '{chat_id}' is not in the chat list"),
    )
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
