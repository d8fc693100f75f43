//! SSH module - remote shell sessions over russh
//!
//! # Features
//! - Password and private key authentication
//! - Interactive shell with PTY
//! - X11 forwarding to a local X server
//! - Single-owner handle task shared with SFTP and exec sub-channels

mod client;
mod config;
mod error;
mod exec;
mod handle_owner;
mod session;
pub mod x11;

pub use client::{fingerprint, ClientHandler, TransportFault, X11Forward};
pub use config::{AuthMethod, KeySource, SshConfig};
pub use error::SshError;
pub use exec::{exec_command, SshTransport};
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController};
pub use session::{RemoteContext, RemoteSession, ShellCommand};
