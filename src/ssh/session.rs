//! Remote shell session
//!
//! One task per session drives `Connecting -> Authenticating -> Ready ->
//! ShellOpen -> Closed`. Callers talk to it through [`RemoteSession`], which
//! only enqueues commands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{self, ClientHandler, TransportFault, X11Forward};
use super::config::SshConfig;
use super::error::SshError;
use super::exec::SshTransport;
use super::handle_owner::{spawn_handle_owner_task, HandleController};
use super::x11::{self, X11Target};
use crate::channels::SubChannelRegistry;
use crate::config::SshSettings;
use crate::session::diagnostics;
use crate::session::{CreateOptions, EventSink, ExitStatus, LifecycleState, SessionId};

/// Commands that can be sent to the shell task
#[derive(Debug)]
pub enum ShellCommand {
    /// Data to send to the shell's stdin
    Data(Vec<u8>),
    /// Resize the remote PTY (cols, rows)
    Resize(u16, u16),
    /// Close the shell channel, then the transport
    Close,
}

/// Everything a remote session needs besides its own options
#[derive(Clone)]
pub struct RemoteContext {
    pub settings: SshSettings,
    /// Configured X11 display, consulted before `$DISPLAY`
    pub x11_display: Option<String>,
    pub registry: Arc<SubChannelRegistry>,
}

pub struct RemoteSession {
    id: SessionId,
    state: Arc<RwLock<LifecycleState>>,
    cmd_tx: mpsc::UnboundedSender<ShellCommand>,
    cancel: CancellationToken,
    killed: AtomicBool,
}

impl RemoteSession {
    /// Spawn the session task. Failures are reported through `sink`.
    pub fn start(
        id: SessionId,
        options: CreateOptions,
        context: RemoteContext,
        sink: EventSink,
    ) -> Self {
        let state = Arc::new(RwLock::new(LifecycleState::Connecting));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = ShellTask {
            id: id.clone(),
            state: state.clone(),
            cancel: cancel.clone(),
            sink,
            context,
        };
        tokio::spawn(task.run(options, cmd_rx));

        Self {
            id,
            state,
            cmd_tx,
            cancel,
            killed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Input before the shell is open is dropped
    pub fn write(&self, data: &[u8]) {
        if self.state() != LifecycleState::ShellOpen {
            debug!(session_id = %self.id, "Dropping {} bytes written before shell open", data.len());
            return;
        }
        let _ = self.cmd_tx.send(ShellCommand::Data(data.to_vec()));
    }

    /// Before the shell opens this only updates the size used for the PTY
    /// request.
    pub fn resize(&self, cols: u16, rows: u16) {
        let _ = self.cmd_tx.send(ShellCommand::Resize(cols, rows));
    }

    /// Fire-and-forget; the exit event confirms completion
    pub fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session_id = %self.id, "Killing remote session");
        let _ = self.cmd_tx.send(ShellCommand::Close);
        self.cancel.cancel();
    }
}

struct ShellTask {
    id: SessionId,
    state: Arc<RwLock<LifecycleState>>,
    cancel: CancellationToken,
    sink: EventSink,
    context: RemoteContext,
}

/// Why the session ended without a remote exit status
enum Failure {
    /// Missing host or credentials; nothing was dialed
    Config(SshError),
    /// Connect, handshake or authentication failed
    Transport(SshError),
    /// Shell channel could not be opened
    Shell(SshError),
}

impl ShellTask {
    fn set_state(&self, state: LifecycleState) {
        debug!(session_id = %self.id, "Remote session -> {}", state);
        *self.state.write() = state;
    }

    async fn run(self, options: CreateOptions, mut cmd_rx: mpsc::UnboundedReceiver<ShellCommand>) {
        let status = match self.drive(options, &mut cmd_rx).await {
            Ok(status) => status,
            Err(failure) => {
                self.report(failure).await;
                ExitStatus::error()
            }
        };

        self.set_state(LifecycleState::Closed);
        info!(session_id = %self.id, "Remote session closed with {:?}", status);
        self.sink.exit(status).await;
    }

    async fn report(&self, failure: Failure) {
        let text = match failure {
            Failure::Config(e) => {
                warn!(session_id = %self.id, "Remote session rejected: {}", e);
                let mut text = diagnostics::error_line(&e.to_string());
                if let Some(hint) = e.hint() {
                    text.push_str(&diagnostics::hint(hint));
                }
                text
            }
            Failure::Transport(e) => {
                error!(session_id = %self.id, "SSH connection failed: {}", e);
                diagnostics::error_banner("SSH CONNECTION ERROR", &e.to_string(), e.hint())
            }
            Failure::Shell(e) => {
                error!(session_id = %self.id, "Failed to open shell: {}", e);
                diagnostics::failure("Failed to open shell", &e.to_string())
            }
        };
        self.sink.text(&text).await;
    }

    async fn drive(
        &self,
        options: CreateOptions,
        cmd_rx: &mut mpsc::UnboundedReceiver<ShellCommand>,
    ) -> Result<ExitStatus, Failure> {
        let (config, notices) = SshConfig::from_options(
            &options,
            &self.context.settings,
            self.context.x11_display.as_deref(),
        )
        .map_err(Failure::Config)?;

        for notice in &notices {
            warn!(session_id = %self.id, "{}", notice);
            self.sink.text(&diagnostics::warning(notice)).await;
        }

        let key = config.auth.load_key().await.map_err(|e| {
            if e.is_configuration() {
                Failure::Config(e)
            } else {
                Failure::Transport(e)
            }
        })?;

        // An unparsable display is reported once the transport is ready
        let x11_target = config.x11_display.as_deref().map(|d| (d, X11Target::parse(d)));

        let mut handler = ClientHandler::new(config.host.clone(), config.port);
        if let Some((_, Some(target))) = &x11_target {
            handler = handler.with_x11(X11Forward {
                target: target.clone(),
                sink: self.sink.clone(),
            });
        }
        let fault = handler.fault();

        self.sink
            .text(&diagnostics::connecting(&config.username, &config.host, config.port))
            .await;

        self.set_state(LifecycleState::Connecting);
        let mut handle = tokio::select! {
            result = client::connect(&config, handler) => result.map_err(Failure::Transport)?,
            _ = self.cancel.cancelled() => {
                info!(session_id = %self.id, "Killed while connecting");
                return Ok(ExitStatus::code(0));
            }
        };

        self.set_state(LifecycleState::Authenticating);
        tokio::select! {
            result = client::authenticate(&mut handle, &config, key) => result.map_err(Failure::Transport)?,
            _ = self.cancel.cancelled() => {
                info!(session_id = %self.id, "Killed while authenticating");
                return Ok(ExitStatus::code(0));
            }
        }

        self.set_state(LifecycleState::Ready);
        let controller = spawn_handle_owner_task(handle, self.id.to_string());
        self.context.registry.register(
            self.id.clone(),
            Arc::new(SshTransport::new(controller.clone(), self.id.clone())),
        );

        match &x11_target {
            Some((_, Some(_))) => self.sink.text("\r\nEnabling X11 forwarding...\r\n").await,
            Some((bad_display, None)) => {
                warn!(session_id = %self.id, "Invalid X11 display format: {}", bad_display);
                self.sink
                    .text(&format!("\r\nX11 connection error: Invalid X11 display format: {}\r\n", bad_display))
                    .await
            }
            None => true,
        };

        let x11_screen = x11_target.and_then(|(_, target)| target).map(|t| t.screen);
        let result = self
            .open_and_pump(&config, &controller, x11_screen, &fault, cmd_rx)
            .await;
        controller.disconnect().await;
        result
    }

    async fn open_and_pump(
        &self,
        config: &SshConfig,
        controller: &HandleController,
        x11_screen: Option<u32>,
        fault: &TransportFault,
        cmd_rx: &mut mpsc::UnboundedReceiver<ShellCommand>,
    ) -> Result<ExitStatus, Failure> {
        let (mut cols, mut rows) = (config.cols, config.rows);
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                ShellCommand::Resize(c, r) => (cols, rows) = (c, r),
                ShellCommand::Close => return Ok(ExitStatus::code(0)),
                ShellCommand::Data(_) => {}
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(ExitStatus::code(0));
        }

        let channel = tokio::select! {
            result = open_shell(controller, &config.term, cols, rows, x11_screen) => result.map_err(Failure::Shell)?,
            _ = self.cancel.cancelled() => return Ok(ExitStatus::code(0)),
        };

        self.set_state(LifecycleState::ShellOpen);
        info!(session_id = %self.id, "Interactive shell started ({}x{})", cols, rows);

        let (exit, ended) = self.pump(channel, cmd_rx).await;
        shell_exit(exit, ended, fault).map_err(Failure::Transport)
    }

    async fn pump(
        &self,
        mut channel: Channel<Msg>,
        cmd_rx: &mut mpsc::UnboundedReceiver<ShellCommand>,
    ) -> (RemoteExit, Option<ChannelEnd>) {
        let mut exit = RemoteExit::default();
        let mut ended = None;

        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        ShellCommand::Data(data) => {
                            if let Err(e) = channel.data(&data[..]).await {
                                error!(session_id = %self.id, "Failed to send data to SSH channel: {}", e);
                                ended = Some(ChannelEnd::Lost);
                                break;
                            }
                        }
                        ShellCommand::Resize(cols, rows) => {
                            if let Err(e) = channel.window_change(cols as u32, rows as u32, 0, 0).await {
                                warn!(session_id = %self.id, "Failed to resize PTY: {}", e);
                            } else {
                                debug!(session_id = %self.id, "PTY resized to {}x{}", cols, rows);
                            }
                        }
                        ShellCommand::Close => {
                            info!(session_id = %self.id, "Close command received");
                            let _ = channel.eof().await;
                            let _ = channel.close().await;
                            break;
                        }
                    }
                }

                msg = channel.wait() => {
                    match msg {
                        Some(ChannelMsg::Data { data }) => {
                            if !self.sink.data(data.to_vec()).await {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExtendedData { data, ext }) => {
                            if ext == 1 && !self.sink.data(data.to_vec()).await {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExitStatus { exit_status }) => {
                            debug!(session_id = %self.id, "Remote exit status {}", exit_status);
                            exit.code = Some(exit_status);
                        }
                        Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                            debug!(session_id = %self.id, "Remote exit signal {:?}", signal_name);
                            exit.signal = Some(signal_name_text(&signal_name));
                        }
                        Some(ChannelMsg::Eof) => {
                            debug!(session_id = %self.id, "SSH channel EOF");
                        }
                        Some(ChannelMsg::Close) => {
                            info!(session_id = %self.id, "SSH channel closed");
                            ended = Some(ChannelEnd::Closed);
                            break;
                        }
                        None => {
                            warn!(session_id = %self.id, "SSH channel dropped by transport");
                            ended = Some(ChannelEnd::Lost);
                            break;
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        (exit, ended)
    }
}

/// Exit information sent by the server on the shell channel
#[derive(Debug, Default)]
struct RemoteExit {
    code: Option<u32>,
    signal: Option<String>,
}

/// How the shell channel ended when the server ended it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelEnd {
    /// Close message received
    Closed,
    /// Channel dropped without a close: the transport is gone
    Lost,
}

/// Final status of a shell. `ended` is `None` when the session stopped the
/// channel itself. A channel the server ended without an exit status is a
/// transport failure if the handler recorded one, and always when the
/// channel was dropped without a close.
fn shell_exit(
    exit: RemoteExit,
    ended: Option<ChannelEnd>,
    fault: &TransportFault,
) -> Result<ExitStatus, SshError> {
    if exit.code.is_none() && exit.signal.is_none() {
        let recorded = fault.lock().take();
        match (ended, recorded) {
            (Some(_), Some(e)) => return Err(e),
            (Some(ChannelEnd::Lost), None) => return Err(SshError::Disconnected),
            _ => {}
        }
    }

    let code = exit.code.map(|c| c as i32).unwrap_or(0);
    Ok(match exit.signal {
        Some(signal) => ExitStatus::signaled(code, signal),
        None => ExitStatus::code(code),
    })
}

/// Open a session channel, request a PTY (and X11 on `x11_screen` when
/// set), then a shell
async fn open_shell(
    controller: &HandleController,
    term: &str,
    cols: u16,
    rows: u16,
    x11_screen: Option<u32>,
) -> Result<Channel<Msg>, SshError> {
    let channel = controller.open_session_channel().await?;

    channel
        .request_pty(false, term, cols as u32, rows as u32, 0, 0, &[])
        .await
        .map_err(|e| SshError::ChannelError(format!("PTY request failed: {}", e)))?;

    if let Some(screen) = x11_screen {
        channel
            .request_x11(false, false, x11::X11_AUTH_PROTOCOL, x11::generate_cookie(), screen)
            .await
            .map_err(|e| SshError::ChannelError(format!("X11 request failed: {}", e)))?;
    }

    channel
        .request_shell(false)
        .await
        .map_err(|e| SshError::ChannelError(format!("Shell request failed: {}", e)))?;

    Ok(channel)
}

fn signal_name_text(signal: &russh::Sig) -> String {
    match signal {
        russh::Sig::Custom(name) => name.clone(),
        other => format!("{:?}", other),
    }
}
