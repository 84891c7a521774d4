use crate::{
    error::SyncError,
    types::{ConnectionState, SyncEvent},
};

/// Outcome of a successful authentication transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTransition {
    pub event: SyncEvent,
    /// `true` when an earlier session had already been authenticated, i.e.
    /// this is a reconnect and joined rooms must be re-issued.
    pub is_reconnect: bool,
}

/// Connection session lifecycle:
/// disconnected → connecting → connected → authenticated → disconnected.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: ConnectionState,
    authenticated_once: bool,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            authenticated_once: false,
        }
    }
}

impl SessionStateMachine {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    pub fn has_authenticated_before(&self) -> bool {
        self.authenticated_once
    }

    pub fn begin_connect(&mut self) -> Result<SyncEvent, SyncError> {
        self.transition_from_state(
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            "connect",
        )
    }

    pub fn on_connected(&mut self) -> Result<SyncEvent, SyncError> {
        self.transition_from_state(
            ConnectionState::Connecting,
            ConnectionState::Connected,
            "on_connected",
        )
    }

    /// Apply the server's accept/reject. Rejection drops back to
    /// `Disconnected`; the caller must not retry it.
    pub fn on_auth_result(&mut self, success: bool) -> Result<AuthTransition, SyncError> {
        if self.state != ConnectionState::Connected {
            return Err(SyncError::invalid_state(self.state, "on_auth_result"));
        }

        if success {
            let is_reconnect = self.authenticated_once;
            self.authenticated_once = true;
            self.state = ConnectionState::Authenticated;
            Ok(AuthTransition {
                event: SyncEvent::ConnectionChanged {
                    state: ConnectionState::Authenticated,
                },
                is_reconnect,
            })
        } else {
            self.state = ConnectionState::Disconnected;
            Ok(AuthTransition {
                event: SyncEvent::ConnectionChanged {
                    state: ConnectionState::Disconnected,
                },
                is_reconnect: false,
            })
        }
    }

    /// Channel dropped or failed to open. Returns `None` when already
    /// disconnected.
    pub fn on_disconnected(&mut self) -> Option<SyncEvent> {
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        self.state = ConnectionState::Disconnected;
        Some(SyncEvent::ConnectionChanged {
            state: ConnectionState::Disconnected,
        })
    }

    /// Forget prior sessions after an explicit disconnect so the next
    /// connect is treated as a first connect.
    pub fn reset(&mut self) -> Option<SyncEvent> {
        self.authenticated_once = false;
        self.on_disconnected()
    }

    fn transition_from_state(
        &mut self,
        expected: ConnectionState,
        next: ConnectionState,
        action: &str,
    ) -> Result<SyncEvent, SyncError> {
        if self.state != expected {
            return Err(SyncError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(SyncEvent::ConnectionChanged { state: next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticate(sm: &mut SessionStateMachine) -> AuthTransition {
        sm.begin_connect().expect("connect must work");
        sm.on_connected().expect("connected must work");
        sm.on_auth_result(true).expect("auth should resolve")
    }

    #[test]
    fn runs_happy_path_state_transitions() {
        let mut sm = SessionStateMachine::default();
        assert_eq!(sm.state(), ConnectionState::Disconnected);

        sm.begin_connect().expect("connect must work");
        assert_eq!(sm.state(), ConnectionState::Connecting);

        sm.on_connected().expect("connected must work");
        assert_eq!(sm.state(), ConnectionState::Connected);

        let transition = sm.on_auth_result(true).expect("auth should resolve");
        assert_eq!(sm.state(), ConnectionState::Authenticated);
        assert!(!transition.is_reconnect);

        assert!(sm.on_disconnected().is_some());
        assert_eq!(sm.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn second_authentication_is_a_reconnect() {
        let mut sm = SessionStateMachine::default();
        assert!(!authenticate(&mut sm).is_reconnect);
        sm.on_disconnected();
        assert!(authenticate(&mut sm).is_reconnect);
    }

    #[test]
    fn reset_makes_next_session_a_first_connect() {
        let mut sm = SessionStateMachine::default();
        authenticate(&mut sm);
        sm.reset();
        assert!(!sm.has_authenticated_before());
        assert!(!authenticate(&mut sm).is_reconnect);
    }

    #[test]
    fn auth_rejection_returns_to_disconnected() {
        let mut sm = SessionStateMachine::default();
        sm.begin_connect().expect("connect must work");
        sm.on_connected().expect("connected must work");
        sm.on_auth_result(false).expect("rejection should resolve");
        assert_eq!(sm.state(), ConnectionState::Disconnected);
        assert!(!sm.has_authenticated_before());
    }

    #[test]
    fn rejects_out_of_order_transitions() {
        let mut sm = SessionStateMachine::default();
        let err = sm
            .on_auth_result(true)
            .expect_err("auth without connection must fail");
        assert_eq!(err.code, "invalid_state_transition");

        sm.begin_connect().expect("connect must work");
        let err = sm.begin_connect().expect_err("double connect must fail");
        assert_eq!(err.code, "invalid_state_transition");
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut sm = SessionStateMachine::default();
        assert_eq!(sm.on_disconnected(), None);
    }
}
