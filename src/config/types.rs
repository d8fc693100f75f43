//! Configuration Types
//!
//! Every field has a default so that a partial (or empty) `config.json`
//! still loads.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current config file version
pub const CONFIG_VERSION: u32 = 1;

/// Root of `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub version: u32,
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_level: String,
    pub flow: FlowSettings,
    pub readiness: ReadinessSettings,
    pub ssh: SshSettings,
    /// X11 display for forwarded connections (`host:display[.screen]`)
    pub x11_display: Option<String>,
    /// Destination directory for downloads without an explicit target
    pub download_dir: Option<std::path::PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            log_level: "info".to_string(),
            flow: FlowSettings::default(),
            readiness: ReadinessSettings::default(),
            ssh: SshSettings::default(),
            x11_display: None,
            download_dir: None,
        }
    }
}

/// Local PTY output pipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// Upper bound on raw bytes per emission. `max_delta` is five times this.
    pub max_chunk: usize,
    /// Quiet period after which a held partial sequence is flushed
    pub idle_flush_ms: u64,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            max_chunk: 100 * 1024,
            idle_flush_ms: 500,
        }
    }
}

/// File-transfer readiness retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub connect_timeout_secs: u64,
    pub keepalive_interval_secs: u64,
    pub default_username: String,
    pub term: String,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            keepalive_interval_secs: 30,
            default_username: "root".to_string(),
            term: "xterm-256color".to_string(),
        }
    }
}

impl SshSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// `None` disables keepalives
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_secs > 0).then(|| Duration::from_secs(self.keepalive_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.flow.max_chunk, 102_400);
        assert_eq!(config.flow.idle_flush_ms, 500);
        assert_eq!(config.readiness.attempts, 5);
        assert_eq!(config.readiness.delay_ms, 200);
        assert_eq!(config.ssh.default_username, "root");
        assert_eq!(config.ssh.connect_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: CoreConfig =
            serde_json::from_str(r#"{"flow":{"max_chunk":4096},"log_level":"debug"}"#).unwrap();
        assert_eq!(config.flow.max_chunk, 4096);
        assert_eq!(config.flow.idle_flush_ms, 500);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.ssh, SshSettings::default());
    }

    #[test]
    fn test_keepalive_disabled_with_zero() {
        let ssh = SshSettings {
            keepalive_interval_secs: 0,
            ..Default::default()
        };
        assert!(ssh.keepalive_interval().is_none());
    }
}
