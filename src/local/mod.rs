//! Local terminal support
//!
//! PTY-backed local shell sessions with flow-controlled output.

pub mod pty;
pub mod session;
pub mod shell;

pub use pty::{PtyConfig, PtyError, PtyHandle};
pub use session::{LocalOptions, LocalSession, ReadGate};
pub use shell::{default_shell, fallback_shell, resolve_shell, ShellInfo};
