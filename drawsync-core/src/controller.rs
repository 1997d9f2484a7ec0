//! # Controller
//!
//! Glues pointer input, the session, and the board editor together. Local edits are previewed and
//! handed to the outbound channel, inbound traffic is applied in order, and the UI hears about
//! lifecycle changes through [`Notice`]s.
//!
//! Everything here is synchronous. The transport lives on the other end of the channels.

use tokio::sync::mpsc::UnboundedSender;

use crate::{
    blend::{Opacity, PatchMode},
    color::Rgba8,
    commands::{Command, Envelope, ProtocolError, SequencedCommand},
    editor::BoardEditor,
    id::{LayerID, PreviewToken, UserID},
    raster::{Patch, Raster},
    render,
    session::{
        HostParams, Session, SessionError, SessionEvent, SessionInfo, SessionRequest, SessionState,
    },
    state::{LayerStack, StackError, StackEvent},
    stroke::Point,
    tools::{Tool, ToolAction, ToolContext, ToolSettings},
};

/// Initial values, handed in by whoever owns persistence.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub username: String,
    pub tools: ToolSettings,
    /// Canvas size before any session is joined.
    pub width: u32,
    pub height: u32,
    /// How far a stack listener may lag before notifications are dropped.
    pub notify_capacity: usize,
}
impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            username: String::from("guest"),
            tools: ToolSettings::default(),
            width: 800,
            height: 600,
            notify_capacity: crate::state::layers::DEFAULT_NOTIFY_CAPACITY,
        }
    }
}

/// Traffic to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Command(Envelope),
    Request(SessionRequest),
}

/// Traffic from the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Event(SessionEvent),
    Command(SequencedCommand),
}

/// Lifecycle news for the UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Connected(String),
    LoggedIn(UserID),
    RasterProgress(u8),
    Disconnected(String),
    Joined(String),
    Parted,
    /// The server had nothing to join.
    NoSessions,
    /// Several sessions are on offer, one must be picked with [`Controller::join`].
    SelectSession(Vec<SessionInfo>),
    /// Answer with [`Controller::send_password`].
    NeedPassword,
    ColorPicked { color: Rgba8, background: bool },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("transport channel closed")]
    ChannelClosed,
}
/// An active pen-down.
#[derive(Copy, Clone, Debug)]
struct PointerSession {
    token: PreviewToken,
    tool: Tool,
    alt: bool,
}

pub struct Controller {
    config: ControllerConfig,
    session: Session,
    editor: BoardEditor,
    outbound: UnboundedSender<Outbound>,
    notices: UnboundedSender<Notice>,
    tool: Tool,
    layer: LayerID,
    pointer: Option<PointerSession>,
    address: Option<String>,
    /// Uploaded once a hosted session is joined.
    host_image: Option<Raster>,
}
impl Controller {
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        outbound: UnboundedSender<Outbound>,
        notices: UnboundedSender<Notice>,
    ) -> Self {
        let stack = LayerStack::with_capacity(config.width, config.height, config.notify_capacity);
        let layer = stack.top().unwrap_or(LayerID(1));
        Self {
            config,
            session: Session::new(),
            editor: BoardEditor::new(stack),
            outbound,
            notices,
            tool: Tool::default(),
            layer,
            pointer: None,
            address: None,
            host_image: None,
        }
    }
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }
    #[must_use]
    pub fn editor(&self) -> &BoardEditor {
        &self.editor
    }
    /// Subscribe to repaint notifications.
    pub fn listen(&mut self) -> bus::BusReader<StackEvent> {
        self.editor.listen()
    }
    /// The canvas as the local user sees it.
    #[must_use]
    pub fn flatten(&self) -> Raster {
        render::flatten(self.editor.stack(), self.editor.preview())
    }
    #[must_use]
    pub fn tool(&self) -> Tool {
        self.tool
    }
    /// Switch tools, ending any active pen-down first.
    pub fn set_tool(&mut self, tool: Tool) -> Result<(), ControllerError> {
        if self.pointer.is_some() {
            self.pen_up()?;
        }
        log::debug!("Tool {}", tool.as_ref());
        self.tool = tool;
        Ok(())
    }
    #[must_use]
    pub fn settings(&self) -> &ToolSettings {
        &self.config.tools
    }
    pub fn settings_mut(&mut self) -> &mut ToolSettings {
        &mut self.config.tools
    }
    /// The layer edits go to.
    #[must_use]
    pub fn layer(&self) -> LayerID {
        self.layer
    }
    /// Choose the layer edits go to. It must exist in the current document.
    pub fn set_layer(&mut self, layer: LayerID) -> Result<(), ControllerError> {
        if self.editor.stack().index_of(layer).is_none() {
            return Err(StackError::NotFound(layer).into());
        }
        self.layer = layer;
        Ok(())
    }
    /// Keep the edit target pointing at a live layer after someone deleted it.
    fn retarget(&mut self) {
        if self.editor.stack().index_of(self.layer).is_some() {
            return;
        }
        if let Some(top) = self.editor.stack().top() {
            log::info!("{} is gone, now editing {top}", self.layer);
            self.layer = top;
        }
    }

    fn send(&mut self, message: Outbound) -> Result<(), ControllerError> {
        if self.outbound.send(message).is_err() {
            log::error!("Transport went away");
            self.drop_session("transport closed".to_owned());
            return Err(ControllerError::ChannelClosed);
        }
        Ok(())
    }
    fn notify(&self, notice: Notice) {
        // Nobody listening is fine, the UI might just not care.
        if self.notices.send(notice).is_err() {
            log::trace!("Notice dropped, no listener");
        }
    }

    /// Connect to a server to join an existing session.
    pub fn connect(&mut self, address: &str) -> Result<(), ControllerError> {
        self.start(address, None, None)
    }
    /// Connect to a server and create a new session on it. `image`, if any, becomes the
    /// initial contents of the background layer once joined.
    pub fn host(
        &mut self,
        address: &str,
        params: HostParams,
        image: Option<Raster>,
    ) -> Result<(), ControllerError> {
        self.start(address, Some(params), image)
    }
    fn start(
        &mut self,
        address: &str,
        host: Option<HostParams>,
        image: Option<Raster>,
    ) -> Result<(), ControllerError> {
        self.session.connect()?;
        log::info!("Connecting to {address} as {}", self.config.username);
        self.address = Some(address.to_owned());
        self.host_image = image;
        self.send(Outbound::Request(SessionRequest::Connect {
            address: address.to_owned(),
            username: self.config.username.clone(),
            host,
        }))
    }
    /// Pick one of the sessions offered through [`Notice::SelectSession`].
    pub fn join(&mut self, session: &str) -> Result<(), ControllerError> {
        self.session.select_session()?;
        self.send(Outbound::Request(SessionRequest::Join(session.to_owned())))
    }
    pub fn send_password(&mut self, password: &str) -> Result<(), ControllerError> {
        self.session.send_password()?;
        self.send(Outbound::Request(SessionRequest::SendPassword(
            password.to_owned(),
        )))
    }
    /// Leave the session. All unacknowledged local work is discarded.
    pub fn disconnect(&mut self) {
        if !self.session.state().is_connected() {
            return;
        }
        // The transport may already be gone, nothing to do about it.
        let _ = self.outbound.send(Outbound::Request(SessionRequest::Disconnect));
        self.drop_session("left session".to_owned());
    }
    fn teardown(&mut self) {
        self.pointer = None;
        self.host_image = None;
        self.editor.disconnect();
        self.editor.set_local_user(None);
    }
    /// Tear down everything session-bound and tell the UI.
    fn drop_session(&mut self, reason: String) {
        self.teardown();
        if self.session.reset() {
            log::info!("Disconnected: {reason}");
            self.notify(Notice::Disconnected(reason));
        }
    }
    /// A protocol violation: log, hang up, report.
    fn fail(&mut self, err: ProtocolError) -> ControllerError {
        log::error!("Protocol error: {err}");
        let _ = self.outbound.send(Outbound::Request(SessionRequest::Disconnect));
        self.drop_session(err.to_string());
        err.into()
    }

    /// Process one message from the transport.
    pub fn handle(&mut self, inbound: Inbound) -> Result<(), ControllerError> {
        match inbound {
            Inbound::Event(event) => self.handle_event(event),
            Inbound::Command(command) => self.handle_command(&command),
        }
    }
    fn handle_event(&mut self, event: SessionEvent) -> Result<(), ControllerError> {
        let was_connected = self.session.state().is_connected();
        let state = match self.session.handle(&event) {
            Ok(state) => state,
            Err(err) => return Err(self.fail(err)),
        };
        match event {
            SessionEvent::Connected => {
                self.notify(Notice::Connected(self.address.clone().unwrap_or_default()));
            }
            SessionEvent::LoginOk(user) => {
                self.editor.set_local_user(Some(user));
                self.notify(Notice::LoggedIn(user));
            }
            SessionEvent::PasswordRequired => self.notify(Notice::NeedPassword),
            SessionEvent::SessionList(list) => match state {
                SessionState::Disconnected => {
                    let _ = self.outbound.send(Outbound::Request(SessionRequest::Disconnect));
                    self.notify(Notice::NoSessions);
                    self.drop_session("no sessions available".to_owned());
                }
                SessionState::Joining => {
                    if let Some(only) = list.into_iter().next() {
                        log::info!("Joining the only session, {:?}", only.title);
                        self.send(Outbound::Request(SessionRequest::Join(only.id)))?;
                    }
                }
                _ => self.notify(Notice::SelectSession(list)),
            },
            SessionEvent::Joined {
                title,
                width,
                height,
            } => {
                log::info!("Joined {title:?}, {width}x{height}");
                self.editor.reset_document(width, height);
                self.layer = self.editor.stack().top().unwrap_or(LayerID(1));
                self.notify(Notice::Joined(title));
                if let Some(image) = self.host_image.take() {
                    self.upload(image)?;
                }
            }
            SessionEvent::Parted => {
                self.drop_session("parted".to_owned());
                self.notify(Notice::Parted);
            }
            SessionEvent::Disconnected(reason) => {
                self.teardown();
                if was_connected {
                    log::info!("Disconnected: {reason}");
                    self.notify(Notice::Disconnected(reason));
                }
            }
            SessionEvent::RasterProgress(percent) => self.notify(Notice::RasterProgress(percent)),
        }
        Ok(())
    }
    /// Seed a freshly hosted session with an image, through the ordinary authoritative path.
    fn upload(&mut self, image: Raster) -> Result<(), ControllerError> {
        let layer = self.editor.stack().bottom().unwrap_or(self.layer);
        let token = self.editor.new_token();
        self.submit(
            token,
            Command::PutImage {
                layer,
                patch: Patch::image(0, 0, image, PatchMode::Replace),
            },
        )
    }
    fn handle_command(&mut self, command: &SequencedCommand) -> Result<(), ControllerError> {
        if !self.session.state().is_joined() {
            return Err(self.fail(ProtocolError::UnexpectedEvent {
                event: "Command",
                state: self.session.state().into(),
            }));
        }
        match self.editor.apply_authoritative(command) {
            Ok(_) => {
                self.retarget();
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Preview a local command and send it out.
    fn submit(&mut self, token: PreviewToken, command: Command) -> Result<(), ControllerError> {
        self.session.check_joined()?;
        self.editor.apply_local(token, &command)?;
        self.send(Outbound::Command(Envelope {
            token: Some(token),
            command,
        }))
    }
    /// Carry out a tool's actions. Either all of its commands go out, or none do.
    fn run(&mut self, token: PreviewToken, actions: crate::tools::Actions) -> Result<(), ControllerError> {
        let mut commands = actions.iter().filter_map(|action| match action {
            ToolAction::Send(command) => Some(command),
            ToolAction::PickColor { .. } => None,
        });
        if let Some(first) = commands.next() {
            self.session.check_joined()?;
            for command in std::iter::once(first).chain(commands) {
                self.editor.validate_local(command)?;
            }
        }
        for action in actions {
            match action {
                ToolAction::Send(command) => self.submit(token, command)?,
                ToolAction::PickColor { color, background } => {
                    if background {
                        self.config.tools.background = color;
                    } else {
                        self.config.tools.foreground = color;
                    }
                    self.notify(Notice::ColorPicked { color, background });
                }
            }
        }
        Ok(())
    }

    /// The pen touched down. `alt` selects the alternate mode, e.g. the background color.
    pub fn pen_down(&mut self, point: Point, alt: bool) -> Result<(), ControllerError> {
        if self.pointer.is_some() {
            self.pen_up()?;
        }
        if self.tool.needs_session() {
            self.session.check_joined()?;
        }
        let pointer = PointerSession {
            token: self.editor.new_token(),
            tool: self.tool,
            alt,
        };
        let actions = pointer.tool.begin(
            &ToolContext {
                source: self.editor.stack(),
                layer: self.layer,
                settings: &self.config.tools,
                alt,
            },
            &point,
        )?;
        self.run(pointer.token, actions)?;
        self.pointer = Some(pointer);
        Ok(())
    }
    /// The pen moved. Ignored unless the pen is down.
    pub fn pen_move(&mut self, point: Point) -> Result<(), ControllerError> {
        let Some(pointer) = self.pointer else {
            return Ok(());
        };
        let actions = pointer.tool.motion(
            &ToolContext {
                source: self.editor.stack(),
                layer: self.layer,
                settings: &self.config.tools,
                alt: pointer.alt,
            },
            &point,
        );
        self.run(pointer.token, actions)
    }
    /// The pen lifted. Already sent commands stay sent, their echo still reconciles the preview.
    pub fn pen_up(&mut self) -> Result<(), ControllerError> {
        let Some(pointer) = self.pointer.take() else {
            return Ok(());
        };
        let result = self.run(pointer.token, pointer.tool.end());
        self.editor.close_local(pointer.token);
        result
    }

    fn submit_fresh(&mut self, command: Command) -> Result<(), ControllerError> {
        let token = self.editor.new_token();
        self.submit(token, command)
    }
    pub fn create_layer(&mut self, name: &str) -> Result<(), ControllerError> {
        self.submit_fresh(Command::LayerCreate {
            name: name.to_owned(),
        })
    }
    pub fn delete_layer(&mut self, layer: LayerID, merge_down: bool) -> Result<(), ControllerError> {
        self.submit_fresh(Command::LayerDelete { layer, merge_down })
    }
    pub fn move_layer(&mut self, layer: LayerID, index: usize) -> Result<(), ControllerError> {
        self.submit_fresh(Command::LayerMove { layer, index })
    }
    pub fn set_opacity(&mut self, layer: LayerID, opacity: Opacity) -> Result<(), ControllerError> {
        self.submit_fresh(Command::LayerOpacity { layer, opacity })
    }
    pub fn rename_layer(&mut self, layer: LayerID, name: &str) -> Result<(), ControllerError> {
        self.submit_fresh(Command::LayerRename {
            layer,
            name: name.to_owned(),
        })
    }
    /// Show or hide a layer. Local only, never shared.
    pub fn set_visible(&mut self, layer: LayerID, visible: bool) -> Result<(), ControllerError> {
        Ok(self.editor.set_visible(layer, visible)?)
    }
}
