//! An in-process authoritative peer, standing in for a real server.
//!
//! Assigns sequence numbers to everything the client sends and echoes it straight back, tokens
//! included. Serves exactly one session.

use drawsync_core::{
    commands::SequencedCommand,
    controller::{Inbound, Outbound},
    id::{SeqNum, UserID},
    session::{SessionEvent, SessionInfo, SessionRequest},
};
use tokio::sync::{mpsc, oneshot};

#[derive(Clone, Debug)]
pub struct LoopbackConfig {
    pub title: String,
    /// Demanded from joining clients, if set.
    pub password: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// Tells a running [`Loopback`] to hang up.
pub struct Hangup(oneshot::Sender<String>);
impl Hangup {
    /// Drop the connection, telling the client why. No-op if already gone.
    pub fn hang_up(self, reason: &str) {
        let _ = self.0.send(reason.to_owned());
    }
}

enum Phase {
    Idle,
    AwaitingPassword,
    AwaitingJoin,
    Joined,
}

pub struct Loopback {
    config: LoopbackConfig,
    requests: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<Inbound>,
    hangup: Option<oneshot::Receiver<String>>,
    user: UserID,
    last_seq: u64,
    phase: Phase,
}

/// The client went away.
struct Closed;

/// Resolves once told to hang up. Pends forever if the [`Hangup`] was dropped unused.
async fn hung_up(hangup: &mut Option<oneshot::Receiver<String>>) -> String {
    if let Some(rx) = hangup.as_mut() {
        if let Ok(reason) = rx.await {
            return reason;
        }
        *hangup = None;
    }
    std::future::pending().await
}

impl Loopback {
    #[must_use]
    pub fn new(
        config: LoopbackConfig,
        requests: mpsc::UnboundedReceiver<Outbound>,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> (Self, Hangup) {
        let (tx, hangup) = oneshot::channel();
        (
            Self {
                config,
                requests,
                inbound,
                hangup: Some(hangup),
                user: UserID(1),
                last_seq: 0,
                phase: Phase::Idle,
            },
            Hangup(tx),
        )
    }
    fn event(&self, event: SessionEvent) -> Result<(), Closed> {
        self.inbound.send(Inbound::Event(event)).map_err(|_| Closed)
    }
    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: String::from("loopback"),
            title: self.config.title.clone(),
            users: 1,
            needs_password: self.config.password.is_some(),
        }
    }
    fn login(&mut self) -> Result<(), Closed> {
        self.event(SessionEvent::LoginOk(self.user))?;
        self.phase = Phase::AwaitingJoin;
        self.event(SessionEvent::SessionList(vec![self.info()]))
    }
    fn join(&mut self) -> Result<(), Closed> {
        self.phase = Phase::Joined;
        self.event(SessionEvent::RasterProgress(100))?;
        self.event(SessionEvent::Joined {
            title: self.config.title.clone(),
            width: self.config.width,
            height: self.config.height,
        })
    }
    /// Serve until the client disconnects or goes away, or we're told to hang up.
    pub async fn run(mut self) {
        loop {
            let request = tokio::select! {
                request = self.requests.recv() => request,
                reason = hung_up(&mut self.hangup) => {
                    log::info!("Loopback hanging up: {reason}");
                    let _ = self.event(SessionEvent::Disconnected(reason));
                    return;
                }
            };
            let Some(request) = request else {
                log::debug!("Loopback client gone");
                return;
            };
            match self.handle(request) {
                Ok(true) => (),
                Ok(false) | Err(Closed) => return,
            }
        }
    }
    /// Returns whether to keep serving.
    fn handle(&mut self, request: Outbound) -> Result<bool, Closed> {
        match request {
            Outbound::Command(envelope) => {
                if !matches!(self.phase, Phase::Joined) {
                    log::warn!("Loopback dropping {} sent before joining", envelope.command.as_ref());
                    return Ok(true);
                }
                self.last_seq += 1;
                let sequenced =
                    SequencedCommand::from_envelope(SeqNum(self.last_seq), self.user, envelope);
                self.inbound
                    .send(Inbound::Command(sequenced))
                    .map_err(|_| Closed)?;
            }
            Outbound::Request(SessionRequest::Connect {
                username, host, ..
            }) => {
                log::info!("Loopback: {username} connected");
                self.event(SessionEvent::Connected)?;
                if let Some(host) = host {
                    self.config.title = host.title;
                    self.config.password = host.password;
                    self.config.width = host.width;
                    self.config.height = host.height;
                    self.event(SessionEvent::LoginOk(self.user))?;
                    self.join()?;
                } else if self.config.password.is_some() {
                    self.phase = Phase::AwaitingPassword;
                    self.event(SessionEvent::PasswordRequired)?;
                } else {
                    self.login()?;
                }
            }
            Outbound::Request(SessionRequest::SendPassword(password)) => {
                if !matches!(self.phase, Phase::AwaitingPassword) {
                    log::warn!("Loopback: unexpected password");
                    return Ok(true);
                }
                if self.config.password.as_deref() == Some(password.as_str()) {
                    // Password doubles as the session selection, straight in.
                    self.event(SessionEvent::LoginOk(self.user))?;
                    self.join()?;
                } else {
                    self.event(SessionEvent::Disconnected("wrong password".into()))?;
                    return Ok(false);
                }
            }
            Outbound::Request(SessionRequest::Join(id)) => {
                if !matches!(self.phase, Phase::AwaitingJoin) || id != self.info().id {
                    self.event(SessionEvent::Disconnected(format!("no session {id:?}")))?;
                    return Ok(false);
                }
                self.join()?;
            }
            Outbound::Request(SessionRequest::Disconnect) => {
                let _ = self.event(SessionEvent::Disconnected("bye".into()));
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use drawsync_core::{
        commands::{Command, Envelope},
        id::TokenAllocator,
    };

    fn config(password: Option<&str>) -> LoopbackConfig {
        LoopbackConfig {
            title: "Test".into(),
            password: password.map(str::to_owned),
            width: 16,
            height: 16,
        }
    }
    fn connect() -> Outbound {
        Outbound::Request(SessionRequest::Connect {
            address: "loopback".into(),
            username: "tester".into(),
            host: None,
        })
    }

    #[tokio::test]
    async fn sequences_and_echoes() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, mut in_rx) = mpsc::unbounded_channel();
        let (loopback, _hangup) = Loopback::new(config(None), out_rx, in_tx);
        let server = tokio::spawn(loopback.run());

        out_tx.send(connect()).unwrap();
        out_tx
            .send(Outbound::Request(SessionRequest::Join("loopback".into())))
            .unwrap();
        let token = TokenAllocator::new().allocate();
        for _ in 0..3 {
            out_tx
                .send(Outbound::Command(Envelope {
                    token: Some(token),
                    command: Command::UndoPoint,
                }))
                .unwrap();
        }
        out_tx
            .send(Outbound::Request(SessionRequest::Disconnect))
            .unwrap();
        server.await.unwrap();

        let mut seqs = Vec::new();
        let mut events = Vec::new();
        while let Ok(inbound) = in_rx.try_recv() {
            match inbound {
                Inbound::Command(command) => {
                    assert_eq!(command.token, Some(token));
                    seqs.push(command.seq);
                }
                Inbound::Event(event) => events.push(event),
            }
        }
        assert_eq!(seqs, [SeqNum(1), SeqNum(2), SeqNum(3)]);
        assert_eq!(events[0], SessionEvent::Connected);
        assert!(matches!(events[2], SessionEvent::SessionList(ref list) if list.len() == 1));
        assert!(events.contains(&SessionEvent::Joined {
            title: "Test".into(),
            width: 16,
            height: 16
        }));
    }
    #[tokio::test]
    async fn wrong_password() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, mut in_rx) = mpsc::unbounded_channel();
        let (loopback, _hangup) = Loopback::new(config(Some("secret")), out_rx, in_tx);
        let server = tokio::spawn(loopback.run());
        out_tx.send(connect()).unwrap();
        out_tx
            .send(Outbound::Request(SessionRequest::SendPassword("guess".into())))
            .unwrap();
        server.await.unwrap();

        let events: Vec<_> = std::iter::from_fn(|| in_rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            [
                Inbound::Event(SessionEvent::Connected),
                Inbound::Event(SessionEvent::PasswordRequired),
                Inbound::Event(SessionEvent::Disconnected("wrong password".into())),
            ]
        );
    }
    #[tokio::test]
    async fn hang_up() {
        let (_out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, mut in_rx) = mpsc::unbounded_channel();
        let (loopback, hangup) = Loopback::new(config(None), out_rx, in_tx);
        let server = tokio::spawn(loopback.run());
        hangup.hang_up("maintenance");
        server.await.unwrap();
        assert_eq!(
            in_rx.recv().await,
            Some(Inbound::Event(SessionEvent::Disconnected("maintenance".into())))
        );
    }
}
