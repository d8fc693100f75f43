//! PTY (Pseudo-Terminal) abstraction
//!
//! Wraps portable-pty. `MasterPty` is not `Sync`, so every piece lives
//! behind its own std mutex and blocking reads never hold the master lock.

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use crate::local::shell::ShellInfo;
use crate::session::types::ExitStatus;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("Failed to create PTY: {0}")]
    CreateFailed(String),

    #[error("Failed to spawn shell: {0}")]
    SpawnFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("PTY system error: {0}")]
    PtySystemError(String),

    #[error("Lock error")]
    LockError,
}

#[derive(Clone, Debug)]
pub struct PtyConfig {
    pub cols: u16,
    pub rows: u16,
    pub shell: ShellInfo,
    pub cwd: Option<PathBuf>,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            shell: crate::local::shell::default_shell(),
            cwd: None,
        }
    }
}

type SharedReader = Arc<StdMutex<Box<dyn Read + Send>>>;
type SharedWriter = Arc<StdMutex<Box<dyn Write + Send>>>;

pub struct PtyHandle {
    master: StdMutex<Box<dyn MasterPty + Send>>,
    child: StdMutex<Box<dyn portable_pty::Child + Send + Sync>>,
    reader: SharedReader,
    writer: SharedWriter,
}

impl PtyHandle {
    pub fn new(config: &PtyConfig) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::CreateFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&config.shell.path);
        for arg in &config.shell.args {
            cmd.arg(arg);
        }

        if let Some(cwd) = &config.cwd {
            cmd.cwd(cwd);
        } else if let Some(home) = dirs::home_dir() {
            cmd.cwd(home);
        }

        for (key, value) in std::env::vars() {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        // Launched from a desktop session PATH can miss the usual prefixes
        #[cfg(unix)]
        {
            if let Ok(mut path) = std::env::var("PATH") {
                for p in ["/usr/local/bin", "/usr/local/sbin", "/opt/homebrew/bin"] {
                    if !path.contains(p) && Path::new(p).exists() {
                        path.push(':');
                        path.push_str(p);
                    }
                }
                cmd.env("PATH", path);
            }
        }

        tracing::info!(
            "Spawning PTY shell: {:?} (cwd: {:?}, {}x{})",
            config.shell.path,
            config.cwd,
            config.cols,
            config.rows
        );

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            tracing::error!("Failed to spawn PTY shell {:?}: {}", config.shell.path, e);
            PtyError::SpawnFailed(e.to_string())
        })?;

        tracing::info!("PTY shell spawned, PID: {:?}", child.process_id());

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::PtySystemError(format!("Failed to clone reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::PtySystemError(format!("Failed to take writer: {}", e)))?;

        Ok(Self {
            master: StdMutex::new(pair.master),
            child: StdMutex::new(child),
            reader: Arc::new(StdMutex::new(reader)),
            writer: Arc::new(StdMutex::new(writer)),
        })
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        let master = self.master.lock().map_err(|_| PtyError::LockError)?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::PtySystemError(e.to_string()))
    }

    /// Write all of `data` and flush
    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        let mut writer = self.writer.lock().map_err(|_| PtyError::LockError)?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    pub fn clone_reader(&self) -> SharedReader {
        self.reader.clone()
    }

    /// Block until the child exits
    pub fn wait(&self) -> Result<ExitStatus, PtyError> {
        let mut child = self.child.lock().map_err(|_| PtyError::LockError)?;
        let status = child
            .wait()
            .map_err(|e| PtyError::PtySystemError(e.to_string()))?;
        Ok(convert_exit_status(&status))
    }

    pub fn is_alive(&self) -> bool {
        match self.child.lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            Err(_) => false,
        }
    }

    pub fn kill(&self) -> Result<(), PtyError> {
        tracing::info!("Killing PTY child process (PID: {:?})", self.pid());
        let mut child = self.child.lock().map_err(|_| PtyError::LockError)?;
        child
            .kill()
            .map_err(|e| PtyError::PtySystemError(e.to_string()))
    }

    /// Kill the whole process group so editors and pagers go with the shell
    #[cfg(unix)]
    pub fn kill_process_group(&self) -> Result<(), PtyError> {
        let Some(pid) = self.pid() else {
            return self.kill();
        };
        tracing::debug!("Killing process group for PID {}", pid);

        // The child is its own session leader, so PID == PGID
        let pgid = Pid::from_raw(pid as i32);

        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            tracing::warn!("Failed to send SIGTERM to process group {}: {}", pid, e);
        }

        std::thread::sleep(std::time::Duration::from_millis(50));

        if let Err(e) = killpg(pgid, Signal::SIGKILL) {
            tracing::debug!("SIGKILL to process group {} (may have already exited): {}", pid, e);
        }

        Ok(())
    }

    #[cfg(windows)]
    pub fn kill_process_group(&self) -> Result<(), PtyError> {
        if let Some(pid) = self.pid() {
            tracing::debug!("Killing process tree for PID {} (Windows)", pid);
            let _ = std::process::Command::new("taskkill")
                .args(["/F", "/T", "/PID", &pid.to_string()])
                .output();
        }
        self.kill()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.lock().ok().and_then(|child| child.process_id())
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            tracing::debug!("Dropping live PTY, killing process group");
            let _ = self.kill_process_group();
        }
    }
}

fn convert_exit_status(status: &portable_pty::ExitStatus) -> ExitStatus {
    ExitStatus {
        exit_code: status.exit_code() as i32,
        signal: status.to_string().strip_prefix("Terminated by ").map(str::to_string),
    }
}
