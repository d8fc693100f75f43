//! Local-process session
//!
//! One PTY, a blocking write pump, a blocking read pump and an
//! [`OutputPipe`] between the read pump and the session's event sink.

use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc;

use crate::config::FlowSettings;
use crate::flow::{FlowGate, OutputPipe};
use crate::local::pty::{PtyConfig, PtyError, PtyHandle};
use crate::local::shell::{fallback_shell, resolve_shell, ShellInfo};
use crate::session::diagnostics;
use crate::session::events::EventSink;
use crate::session::types::{ExitStatus, SessionId};

const READ_BUFFER_SIZE: usize = 8192;

/// What a local session needs from `CreateOptions`
#[derive(Debug, Clone, Default)]
pub struct LocalOptions {
    pub cols: u16,
    pub rows: u16,
    pub cwd: Option<PathBuf>,
    pub shell: Option<String>,
}

/// Blocks the PTY read pump while output is paused
#[derive(Debug, Default)]
pub struct ReadGate {
    paused: Mutex<bool>,
    released: AtomicBool,
    cond: Condvar,
}

impl ReadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the calling (blocking) thread until the gate is open
    pub fn wait_open(&self) {
        let mut paused = self.paused.lock();
        while *paused && !self.released.load(Ordering::SeqCst) {
            self.cond.wait(&mut paused);
        }
    }

    /// Open the gate for good; later pauses are ignored
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.resume();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }
}

impl FlowGate for ReadGate {
    fn pause(&self) {
        if !self.released.load(Ordering::SeqCst) {
            *self.paused.lock() = true;
        }
    }

    fn resume(&self) {
        let mut paused = self.paused.lock();
        *paused = false;
        self.cond.notify_all();
    }
}

pub struct LocalSession {
    id: SessionId,
    shell: ShellInfo,
    pty: Arc<PtyHandle>,
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    pipe: OutputPipe,
    gate: Arc<ReadGate>,
    killed: AtomicBool,
}

impl LocalSession {
    /// Spawn the shell. On failure the error is rendered into the terminal,
    /// the exit is delivered and `None` is returned.
    pub async fn start(
        id: SessionId,
        options: LocalOptions,
        flow: &FlowSettings,
        sink: EventSink,
    ) -> Option<Self> {
        match Self::spawn(id.clone(), options, flow, sink.clone()) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!(session_id = %id, "Local session failed to start: {}", e);
                sink.text(&diagnostics::failure("Failed to start shell", &e.to_string()))
                    .await;
                sink.exit(ExitStatus::error()).await;
                None
            }
        }
    }

    fn spawn(
        id: SessionId,
        options: LocalOptions,
        flow: &FlowSettings,
        sink: EventSink,
    ) -> Result<Self, PtyError> {
        let shell = resolve_shell(options.shell.as_deref());
        let mut config = PtyConfig {
            cols: options.cols,
            rows: options.rows,
            shell,
            cwd: options.cwd,
        };

        let pty = match PtyHandle::new(&config) {
            Ok(pty) => pty,
            Err(e @ PtyError::SpawnFailed(_)) => {
                let fallback = fallback_shell();
                if fallback.path == config.shell.path {
                    return Err(e);
                }
                tracing::warn!(
                    "Shell {:?} failed to spawn ({}), falling back to {:?}",
                    config.shell.path,
                    e,
                    fallback.path
                );
                config.shell = fallback;
                PtyHandle::new(&config)?
            }
            Err(e) => return Err(e),
        };
        let pty = Arc::new(pty);

        let gate = Arc::new(ReadGate::new());
        let pipe = OutputPipe::spawn(flow, gate.clone(), sink);

        // Write pump (caller -> PTY)
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer_pty = pty.clone();
        let writer_id = id.clone();
        tokio::task::spawn_blocking(move || {
            while let Some(data) = input_rx.blocking_recv() {
                if let Err(e) = writer_pty.write(&data) {
                    tracing::error!(session_id = %writer_id, "Failed to write to PTY: {}", e);
                    break;
                }
            }
            tracing::debug!(session_id = %writer_id, "Write pump terminated");
        });

        // Read pump (PTY -> pipe)
        let reader = pty.clone_reader();
        let reader_pty = pty.clone();
        let reader_gate = gate.clone();
        let reader_pipe = pipe.clone();
        let reader_id = id.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                reader_gate.wait_open();

                let n = {
                    let mut r = match reader.lock() {
                        Ok(r) => r,
                        Err(_) => {
                            tracing::error!("Read pump: failed to acquire reader lock");
                            break;
                        }
                    };
                    match r.read(&mut buf) {
                        Ok(0) => {
                            tracing::debug!(session_id = %reader_id, "Read pump: PTY EOF");
                            break;
                        }
                        Ok(n) => n,
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            // Linux reports EIO on the master once the child is gone
                            tracing::debug!(session_id = %reader_id, "Read pump stopped: {}", e);
                            break;
                        }
                    }
                };

                if !reader_pipe.push(buf[..n].to_vec()) {
                    break;
                }
            }

            let status = reader_pty.wait().unwrap_or_else(|e| {
                tracing::warn!(session_id = %reader_id, "Failed to reap shell: {}", e);
                ExitStatus::error()
            });
            tracing::info!(
                session_id = %reader_id,
                "Local shell exited (code {}, signal {:?})",
                status.exit_code,
                status.signal
            );
            reader_pipe.finish(status);
        });

        tracing::info!(
            session_id = %id,
            "Local session started with shell: {}",
            config.shell.label
        );

        Ok(Self {
            id,
            shell: config.shell,
            pty,
            input_tx,
            pipe,
            gate,
            killed: AtomicBool::new(false),
        })
    }

    /// Forward input to the shell unmodified
    pub fn write(&self, data: &[u8]) {
        if self.input_tx.send(data.to_vec()).is_err() {
            tracing::debug!(session_id = %self.id, "Write after PTY writer stopped");
        }
    }

    /// Resize failures are expected once the shell has exited
    pub fn resize(&self, cols: u16, rows: u16) {
        if let Err(e) = self.pty.resize(cols, rows) {
            tracing::warn!(session_id = %self.id, "Failed to resize PTY: {}", e);
        }
    }

    pub fn ack(&self, len: usize) {
        self.pipe.ack(len);
    }

    /// Terminate the shell's process group. Idempotent; the exit event
    /// arrives through the read pump.
    pub fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(session_id = %self.id, "Killing local session");
        // A paused reader must be able to reach EOF
        self.gate.release();
        let pty = self.pty.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = pty.kill_process_group() {
                tracing::debug!("Kill on exited PTY: {}", e);
            }
        });
    }

    pub fn shell(&self) -> &ShellInfo {
        &self.shell
    }

    pub fn is_alive(&self) -> bool {
        !self.pipe.is_closed() && self.pty.is_alive()
    }
}
