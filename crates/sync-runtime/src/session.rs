//! Transport session: owns the single link, the handshake, the joined-room
//! set and the reconnect schedule.

use std::{collections::BTreeSet, time::Duration};

use sync_core::{
    ClientEvent, ConnectionState, RetryPolicy, ServerEvent, SessionStateMachine, SyncChannels,
    SyncError, SyncErrorCategory, SyncEvent,
};
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::transport::{Transport, TransportLink};

/// Result of one connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Session accepted. `is_reconnect` is set when an earlier session of
    /// this instance had been authenticated.
    Authenticated { is_reconnect: bool },
    /// Credentials refused; terminal.
    Rejected { reason: String },
    /// Link could not be opened or the handshake did not finish; retryable.
    Failed(SyncError),
}

/// One inbound item from the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Event(ServerEvent),
    Closed,
}

pub struct TransportSession<T> {
    transport: T,
    user_id: String,
    user_token: String,
    auth_timeout: Duration,
    retry: RetryPolicy,
    channels: SyncChannels,
    state: SessionStateMachine,
    link: Option<TransportLink>,
    joined: BTreeSet<String>,
    attempt: u32,
    reconnect_at: Option<Instant>,
}

impl<T: Transport> TransportSession<T> {
    pub fn new(
        transport: T,
        user_id: impl Into<String>,
        user_token: impl Into<String>,
        auth_timeout: Duration,
        retry: RetryPolicy,
        channels: SyncChannels,
    ) -> Self {
        Self {
            transport,
            user_id: user_id.into(),
            user_token: user_token.into(),
            auth_timeout,
            retry,
            channels,
            state: SessionStateMachine::default(),
            link: None,
            joined: BTreeSet::new(),
            attempt: 0,
            reconnect_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn is_joined(&self, chat_id: &str) -> bool {
        self.joined.contains(chat_id)
    }

    /// Rooms the client has open, in a stable order.
    pub fn joined_rooms(&self) -> impl Iterator<Item = &str> {
        self.joined.iter().map(String::as_str)
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Open the link and run the authentication handshake.
    ///
    /// Errors only for invalid lifecycle use (already connecting/connected);
    /// transport problems come back as [`ConnectOutcome::Failed`].
    pub async fn connect(&mut self) -> Result<ConnectOutcome, SyncError> {
        let event = self.state.begin_connect()?;
        self.reconnect_at = None;
        self.channels.emit(event);

        let link = match self.transport.open().await {
            Ok(link) => link,
            Err(err) => {
                warn!(error = %err, "transport open failed");
                self.mark_disconnected();
                return Ok(ConnectOutcome::Failed(err));
            }
        };
        self.link = Some(link);
        let event = self.state.on_connected()?;
        self.channels.emit(event);

        let handshake = timeout(self.auth_timeout, self.authenticate()).await;
        let accepted = match handshake {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(err)) => return Ok(self.fail_handshake(err)),
            Err(_) => {
                return Ok(self.fail_handshake(SyncError::new(
                    SyncErrorCategory::Network,
                    "auth_timeout",
                    format!("no auth response within {:?}", self.auth_timeout),
                )));
            }
        };

        match accepted {
            Ok(()) => {
                let transition = self.state.on_auth_result(true)?;
                self.attempt = 0;
                self.channels.emit(transition.event);
                self.channels.emit(SyncEvent::AuthResult {
                    success: true,
                    error_code: None,
                });
                info!(
                    user_id = %self.user_id,
                    is_reconnect = transition.is_reconnect,
                    "session authenticated"
                );
                self.rejoin_rooms().await;
                Ok(ConnectOutcome::Authenticated {
                    is_reconnect: transition.is_reconnect,
                })
            }
            Err(reason) => {
                let transition = self.state.on_auth_result(false)?;
                self.link = None;
                self.attempt = 0;
                error!(user_id = %self.user_id, %reason, "authentication rejected");
                self.channels.emit(SyncEvent::AuthResult {
                    success: false,
                    error_code: Some("auth_rejected".to_owned()),
                });
                self.channels.emit(transition.event);
                Ok(ConnectOutcome::Rejected { reason })
            }
        }
    }

    /// Send credentials and wait for the verdict. Inner `Err` carries the
    /// rejection reason.
    async fn authenticate(&mut self) -> Result<Result<(), String>, SyncError> {
        self.send_raw(&ClientEvent::Authenticate {
            user_id: self.user_id.clone(),
            user_token: self.user_token.clone(),
        })
        .await?;

        loop {
            match self.recv().await {
                Inbound::Event(ServerEvent::AuthAccepted { .. }) => return Ok(Ok(())),
                Inbound::Event(ServerEvent::AuthRejected { reason }) => return Ok(Err(reason)),
                Inbound::Event(other) => {
                    debug!(event = other.name(), "dropping event received before auth");
                }
                Inbound::Closed => {
                    return Err(SyncError::new(
                        SyncErrorCategory::Network,
                        "connection_closed",
                        "link closed during authentication",
                    ));
                }
            }
        }
    }

    fn fail_handshake(&mut self, err: SyncError) -> ConnectOutcome {
        warn!(error = %err, "authentication handshake failed");
        self.link = None;
        self.mark_disconnected();
        ConnectOutcome::Failed(err)
    }

    async fn rejoin_rooms(&mut self) {
        let rooms: Vec<String> = self.joined.iter().cloned().collect();
        for chat_id in rooms {
            debug!(%chat_id, "re-issuing join");
            if let Err(err) = self.send_raw(&ClientEvent::JoinChat { chat_id }).await {
                warn!(error = %err, "rejoin failed; link is going away");
                break;
            }
        }
    }

    /// Next decoded inbound event. Malformed frames are logged and skipped.
    /// Stays pending while there is no link.
    pub async fn recv(&mut self) -> Inbound {
        let Some(link) = self.link.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            let Some(frame) = link.inbound.recv().await else {
                return Inbound::Closed;
            };
            match ServerEvent::decode(&frame) {
                Ok(event) => return Inbound::Event(event),
                Err(err) => warn!(error = %err, "dropping malformed inbound frame"),
            }
        }
    }

    /// Fire-and-forget send. Only allowed on an authenticated session.
    pub async fn send(&mut self, event: &ClientEvent) -> Result<(), SyncError> {
        if !self.is_authenticated() {
            return Err(SyncError::new(
                SyncErrorCategory::Network,
                "not_authenticated",
                format!("cannot send {} while {:?}", event.name(), self.state()),
            ));
        }
        self.send_raw(event).await
    }

    async fn send_raw(&mut self, event: &ClientEvent) -> Result<(), SyncError> {
        let Some(link) = self.link.as_ref() else {
            return Err(SyncError::new(
                SyncErrorCategory::Network,
                "not_connected",
                format!("cannot send {} without a link", event.name()),
            ));
        };
        let frame = event.encode()?;
        link.outbound.send(frame).await.map_err(|_| {
            SyncError::new(
                SyncErrorCategory::Network,
                "connection_closed",
                format!("link closed while sending {}", event.name()),
            )
        })
    }

    /// Record a room and join it now when authenticated; otherwise it is
    /// joined on the next authentication. Returns whether a join was sent.
    pub async fn join(&mut self, chat_id: &str) -> Result<bool, SyncError> {
        self.joined.insert(chat_id.to_owned());
        if !self.is_authenticated() {
            debug!(%chat_id, "join recorded; will be issued after authentication");
            return Ok(false);
        }
        self.send_raw(&ClientEvent::JoinChat {
            chat_id: chat_id.to_owned(),
        })
        .await?;
        Ok(true)
    }

    /// Forget a room and leave it on the server when authenticated.
    pub async fn leave(&mut self, chat_id: &str) -> Result<bool, SyncError> {
        if !self.joined.remove(chat_id) {
            debug!(%chat_id, "leave for chat that was not joined");
            return Ok(false);
        }
        if !self.is_authenticated() {
            return Ok(false);
        }
        self.send_raw(&ClientEvent::LeaveChat {
            chat_id: chat_id.to_owned(),
        })
        .await?;
        Ok(true)
    }

    /// The peer dropped the link: go to `Disconnected` and schedule a retry.
    pub fn on_link_closed(&mut self) {
        warn!(state = ?self.state(), "connection dropped");
        self.link = None;
        self.mark_disconnected();
        self.schedule_reconnect();
    }

    /// Arm the reconnect timer, or surface `ConnectionLost` when attempts are
    /// exhausted.
    pub fn schedule_reconnect(&mut self) {
        if !self.retry.allows_attempt(self.attempt) {
            warn!(attempts = self.attempt, "reconnect attempts exhausted");
            self.reconnect_at = None;
            self.channels.emit(SyncEvent::ConnectionLost {
                code: "reconnect_exhausted".to_owned(),
                message: format!("gave up after {} reconnect attempts", self.attempt),
            });
            return;
        }

        let delay = self.retry.delay_for_attempt(self.attempt, None);
        self.attempt = self.attempt.saturating_add(1);
        self.reconnect_at = Some(Instant::now() + delay);
        let delay_ms = delay.as_millis() as u64;
        info!(attempt = self.attempt, delay_ms, "reconnect scheduled");
        self.channels.emit(SyncEvent::ReconnectScheduled {
            attempt: self.attempt,
            delay_ms,
        });
    }

    /// Reconnect timer fired.
    pub async fn on_reconnect_due(&mut self) -> Result<ConnectOutcome, SyncError> {
        self.reconnect_at = None;
        let outcome = self.connect().await?;
        if matches!(outcome, ConnectOutcome::Failed(_)) {
            self.schedule_reconnect();
        }
        Ok(outcome)
    }

    /// Release the link, the joined rooms and the reconnect timer. The next
    /// connect counts as a first connect.
    pub fn disconnect(&mut self) {
        self.link = None;
        self.joined.clear();
        self.attempt = 0;
        self.reconnect_at = None;
        if let Some(event) = self.state.reset() {
            info!("session disconnected");
            self.channels.emit(event);
        }
    }

    fn mark_disconnected(&mut self) {
        if let Some(event) = self.state.on_disconnected() {
            self.channels.emit(event);
        }
    }
}
