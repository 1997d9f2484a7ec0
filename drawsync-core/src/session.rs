//! # Session
//!
//! Connection lifecycle. Decides when local edits may go out and when inbound commands are trusted.
//!
//! ```text
//! Disconnected -> Connecting         connect request
//! Connecting   -> AwaitingPassword   server demands a password
//! Connecting   -> SessionListPending server offers several sessions
//! Connecting   -> Joining            server offers exactly one session, joined automatically
//! Connecting   -> Joined             server joined us to its default session
//! AwaitingPassword   -> Joining      password sent
//! SessionListPending -> Joining      session selected
//! Joining      -> AwaitingPassword   the selected session wants a password
//! Joining      -> Joined             server confirms
//! Joined       -> Disconnected       parted
//! any          -> Disconnected       network failure, local leave, protocol error
//! ```

use crate::{commands::ProtocolError, id::UserID};

#[derive(strum::IntoStaticStr, strum::AsRefStr, Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingPassword,
    SessionListPending,
    Joining,
    Joined,
}
impl SessionState {
    /// Whether local edits may be sent.
    #[must_use]
    pub fn is_joined(self) -> bool {
        self == Self::Joined
    }
    #[must_use]
    pub fn is_connected(self) -> bool {
        self != Self::Disconnected
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("not connected to a session")]
    NotConnected,
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}

/// One joinable session offered by a server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub title: String,
    pub users: u32,
    pub needs_password: bool,
}

/// Lifecycle events from the transport.
#[derive(strum::IntoStaticStr, Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport reached the server, login is underway.
    Connected,
    LoginOk(UserID),
    PasswordRequired,
    SessionList(Vec<SessionInfo>),
    Joined {
        title: String,
        width: u32,
        height: u32,
    },
    Parted,
    Disconnected(String),
    /// Initial canvas download progress, in percent.
    RasterProgress(u8),
}

/// Settings for a session this client creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostParams {
    pub title: String,
    pub password: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// Lifecycle requests to the transport.
#[derive(strum::IntoStaticStr, Clone, Debug, PartialEq, Eq)]
pub enum SessionRequest {
    Connect {
        address: String,
        username: String,
        /// Create a new session instead of joining one.
        host: Option<HostParams>,
    },
    Join(String),
    SendPassword(String),
    Disconnect,
}

#[derive(Default, Debug)]
pub struct Session {
    state: SessionState,
    user: Option<UserID>,
    title: Option<String>,
}
impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }
    /// Our id, once logged in.
    #[must_use]
    pub fn user(&self) -> Option<UserID> {
        self.user
    }
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
    /// Gate for outbound edits.
    pub fn check_joined(&self) -> Result<(), SessionError> {
        if self.state.is_joined() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }
    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            log::debug!("Session {} -> {}", self.state.as_ref(), to.as_ref());
            self.state = to;
        }
    }
    fn require_state(&self, action: &'static str, state: SessionState) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                action,
                state: self.state.into(),
            })
        }
    }
    pub fn connect(&mut self) -> Result<(), SessionError> {
        self.require_state("connect", SessionState::Disconnected)?;
        self.transition(SessionState::Connecting);
        Ok(())
    }
    pub fn send_password(&mut self) -> Result<(), SessionError> {
        self.require_state("send a password", SessionState::AwaitingPassword)?;
        self.transition(SessionState::Joining);
        Ok(())
    }
    pub fn select_session(&mut self) -> Result<(), SessionError> {
        self.require_state("select a session", SessionState::SessionListPending)?;
        self.transition(SessionState::Joining);
        Ok(())
    }
    /// Drop to `Disconnected` from wherever we are. Returns whether anything changed.
    pub fn reset(&mut self) -> bool {
        let was_connected = self.state.is_connected();
        self.user = None;
        self.title = None;
        self.transition(SessionState::Disconnected);
        was_connected
    }
    /// Advance by a transport event.
    ///
    /// An event that makes no sense in the current state is a protocol error. The state is left
    /// as-is, the caller is expected to disconnect.
    pub fn handle(&mut self, event: &SessionEvent) -> Result<SessionState, ProtocolError> {
        use SessionState as S;
        let next = match (self.state, event) {
            (_, SessionEvent::Disconnected(_)) => {
                self.reset();
                return Ok(S::Disconnected);
            }
            (S::Connecting, SessionEvent::Connected) => S::Connecting,
            (S::Connecting | S::Joining, SessionEvent::LoginOk(user)) => {
                self.user = Some(*user);
                self.state
            }
            (S::Connecting | S::Joining, SessionEvent::PasswordRequired) => S::AwaitingPassword,
            (S::Connecting, SessionEvent::SessionList(list)) => match list.len() {
                0 => S::Disconnected,
                1 => S::Joining,
                _ => S::SessionListPending,
            },
            (S::Connecting | S::Joining, SessionEvent::Joined { title, .. }) => {
                self.title = Some(title.clone());
                S::Joined
            }
            (S::Connecting | S::Joining | S::Joined, SessionEvent::RasterProgress(_)) => self.state,
            (S::Joined, SessionEvent::Parted) => {
                self.reset();
                return Ok(S::Disconnected);
            }
            (state, event) => {
                return Err(ProtocolError::UnexpectedEvent {
                    event: event.into(),
                    state: state.into(),
                })
            }
        };
        if next == S::Disconnected {
            self.reset();
        } else {
            self.transition(next);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn info(id: &str) -> SessionInfo {
        SessionInfo {
            id: id.to_owned(),
            title: format!("Session {id}"),
            users: 1,
            needs_password: false,
        }
    }
    fn joined() -> SessionEvent {
        SessionEvent::Joined {
            title: "Sketch".into(),
            width: 64,
            height: 64,
        }
    }

    #[test]
    fn password_flow() {
        let mut session = Session::new();
        let mut visited = vec![session.state()];
        assert_eq!(session.check_joined(), Err(SessionError::NotConnected));

        session.connect().unwrap();
        visited.push(session.state());
        assert!(session.check_joined().is_err());

        session.handle(&SessionEvent::Connected).unwrap();
        session.handle(&SessionEvent::PasswordRequired).unwrap();
        visited.push(session.state());
        assert!(session.check_joined().is_err());

        session.send_password().unwrap();
        visited.push(session.state());
        assert!(session.check_joined().is_err());

        session.handle(&SessionEvent::LoginOk(UserID(3))).unwrap();
        session.handle(&joined()).unwrap();
        visited.push(session.state());
        assert!(session.check_joined().is_ok());

        assert_eq!(
            visited,
            [
                SessionState::Disconnected,
                SessionState::Connecting,
                SessionState::AwaitingPassword,
                SessionState::Joining,
                SessionState::Joined,
            ]
        );
        assert_eq!(session.user(), Some(UserID(3)));
        assert_eq!(session.title(), Some("Sketch"));
    }
    #[test]
    fn session_lists() {
        let mut session = Session::new();
        session.connect().unwrap();
        assert_eq!(
            session.handle(&SessionEvent::SessionList(vec![info("a"), info("b")])),
            Ok(SessionState::SessionListPending)
        );
        session.select_session().unwrap();
        assert_eq!(session.state(), SessionState::Joining);

        let mut session = Session::new();
        session.connect().unwrap();
        assert_eq!(
            session.handle(&SessionEvent::SessionList(vec![info("a")])),
            Ok(SessionState::Joining)
        );

        let mut session = Session::new();
        session.connect().unwrap();
        assert_eq!(
            session.handle(&SessionEvent::SessionList(Vec::new())),
            Ok(SessionState::Disconnected)
        );
    }
    #[test]
    fn selected_session_wants_password() {
        let mut session = Session::new();
        session.connect().unwrap();
        session
            .handle(&SessionEvent::SessionList(vec![info("a"), info("b")]))
            .unwrap();
        session.select_session().unwrap();
        assert_eq!(
            session.handle(&SessionEvent::PasswordRequired),
            Ok(SessionState::AwaitingPassword)
        );
        assert!(session.check_joined().is_err());
        session.send_password().unwrap();
        assert_eq!(session.state(), SessionState::Joining);
        assert_eq!(session.handle(&joined()), Ok(SessionState::Joined));
    }
    #[test]
    fn default_session() {
        let mut session = Session::new();
        session.connect().unwrap();
        assert_eq!(session.handle(&joined()), Ok(SessionState::Joined));
        assert_eq!(session.handle(&SessionEvent::Parted), Ok(SessionState::Disconnected));
        assert_eq!(session.title(), None);
    }
    #[test]
    fn unexpected_events() {
        let mut session = Session::new();
        assert_eq!(
            session.handle(&joined()),
            Err(ProtocolError::UnexpectedEvent {
                event: "Joined",
                state: "Disconnected"
            })
        );
        session.connect().unwrap();
        session.handle(&joined()).unwrap();
        assert!(session.handle(&SessionEvent::PasswordRequired).is_err());
        assert_eq!(session.state(), SessionState::Joined);
    }
    #[test]
    fn local_requests_checked() {
        let mut session = Session::new();
        assert!(matches!(
            session.send_password(),
            Err(SessionError::InvalidState { .. })
        ));
        session.connect().unwrap();
        assert!(session.connect().is_err());
    }
    #[test]
    fn disconnect_from_anywhere() {
        for reach in 0..4 {
            let mut session = Session::new();
            session.connect().unwrap();
            if reach >= 1 {
                session.handle(&SessionEvent::PasswordRequired).unwrap();
            }
            if reach >= 2 {
                session.send_password().unwrap();
            }
            if reach >= 3 {
                session.handle(&joined()).unwrap();
            }
            assert_eq!(
                session.handle(&SessionEvent::Disconnected("gone".into())),
                Ok(SessionState::Disconnected)
            );
            assert_eq!(session.user(), None);
        }
    }
}
