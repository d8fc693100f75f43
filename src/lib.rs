//! Shellmux - session multiplexer for local PTY and remote SSH shells
//!
//! Sessions are created through [`session::SessionManager`]; output is
//! delivered as notifications, local output through a flow-controlled pipe.

pub mod channels;
pub mod config;
pub mod flow;
pub mod ipc;
#[cfg(feature = "local-terminal")]
pub mod local;
pub mod session;
pub mod sftp;
pub mod ssh;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
/// Logs go to stderr; stdout carries the JSON-RPC stream.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
