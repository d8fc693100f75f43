//! Session Types and Data Structures

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque session identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Backend kind of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Local,
    #[serde(rename = "ssh", alias = "remote")]
    Remote,
}

/// Lifecycle state reported by `list_sessions`.
///
/// Local sessions only ever report `ShellOpen` and `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Connecting,
    Authenticating,
    Ready,
    ShellOpen,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Connecting => "connecting",
            LifecycleState::Authenticating => "authenticating",
            LifecycleState::Ready => "ready",
            LifecycleState::ShellOpen => "shell_open",
            LifecycleState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How a backend finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitStatus {
    pub exit_code: i32,
    pub signal: Option<String>,
}

impl ExitStatus {
    pub fn code(exit_code: i32) -> Self {
        Self {
            exit_code,
            signal: None,
        }
    }

    pub fn signaled(exit_code: i32, signal: impl Into<String>) -> Self {
        Self {
            exit_code,
            signal: Some(signal.into()),
        }
    }

    /// Generic fatal exit used for configuration and transport failures.
    pub fn error() -> Self {
        Self::signaled(1, "ERROR")
    }

    pub fn is_error(&self) -> bool {
        self.exit_code != 0 || self.signal.is_some()
    }
}

/// Event pushed by a session backend onto its per-session channel
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Data(Bytes),
    Exit(ExitStatus),
}

/// Event fanned out by the manager, tagged with its session
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Data {
        session_id: SessionId,
        data: Bytes,
    },
    Exit {
        session_id: SessionId,
        status: ExitStatus,
    },
}

impl Notification {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Notification::Data { session_id, .. } | Notification::Exit { session_id, .. } => {
                session_id
            }
        }
    }
}

/// Authentication mode requested for a remote session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "privateKey", alias = "private_key", alias = "key")]
    PrivateKey,
}

/// Options accepted by `SessionManager::create`.
///
/// Only consulted while the session is being constructed; nothing here is
/// retained afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOptions {
    #[serde(rename = "type")]
    pub kind: SessionKind,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub auth_type: Option<AuthType>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub private_key_content: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub x11_forwarding: bool,
    #[serde(default)]
    pub x11_display: Option<String>,
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

impl CreateOptions {
    pub fn local(cols: u16, rows: u16) -> Self {
        Self {
            kind: SessionKind::Local,
            cols,
            rows,
            cwd: None,
            shell: None,
            host: None,
            port: None,
            username: None,
            auth_type: None,
            password: None,
            private_key_path: None,
            private_key_content: None,
            passphrase: None,
            x11_forwarding: false,
            x11_display: None,
        }
    }

    pub fn ssh(host: impl Into<String>) -> Self {
        Self {
            kind: SessionKind::Remote,
            host: Some(host.into()),
            ..Self::local(80, 24)
        }
    }
}

/// Row returned by `SessionManager::list_sessions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub kind: SessionKind,
    pub state: LifecycleState,
}
