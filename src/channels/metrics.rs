//! Remote system metrics
//!
//! A fixed battery of one-shot commands run over exec channels. Each query
//! degrades to a placeholder on failure so the aggregate always succeeds.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::transport::Transport;

pub const CPU_COMMAND: &str = "top -bn1 | grep 'Cpu(s)' | awk '{print $2}' | cut -d'%' -f1";
pub const RAM_COMMAND: &str = "free -m | awk 'NR==2{printf \"%.2f,%.2f\", $3/1024, $2/1024}'";
pub const UPTIME_COMMAND: &str = "uptime -p";
pub const DISK_COMMAND: &str = "df -h / | awk 'NR==2{print $5}' | sed 's/%//'";
pub const USERNAME_COMMAND: &str = "whoami";

const UPTIME_PLACEHOLDER: &str = "N/A";
const USERNAME_PLACEHOLDER: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    /// CPU usage percent
    pub cpu: f64,
    /// GiB
    pub ram_used: f64,
    /// GiB
    pub ram_total: f64,
    pub network_up: f64,
    pub network_down: f64,
    pub uptime: String,
    /// Root filesystem usage percent
    pub disk_usage: i64,
    pub username: String,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self {
            cpu: 0.0,
            ram_used: 0.0,
            ram_total: 0.0,
            network_up: 0.0,
            network_down: 0.0,
            uptime: UPTIME_PLACEHOLDER.to_string(),
            disk_usage: 0,
            username: USERNAME_PLACEHOLDER.to_string(),
        }
    }
}

/// Run every query concurrently and aggregate.
///
/// `transport` is `None` when the session has no registered transport; every
/// field then takes its placeholder.
pub async fn collect(transport: Option<&dyn Transport>) -> SystemMetrics {
    let Some(transport) = transport else {
        return SystemMetrics::default();
    };

    let (cpu, ram, uptime, disk, username) = tokio::join!(
        query(transport, CPU_COMMAND),
        query(transport, RAM_COMMAND),
        query(transport, UPTIME_COMMAND),
        query(transport, DISK_COMMAND),
        query(transport, USERNAME_COMMAND),
    );

    let (ram_used, ram_total) = ram.as_deref().map(parse_ram).unwrap_or((0.0, 0.0));

    // Network throughput needs interval sampling; reported as zero
    SystemMetrics {
        cpu: cpu.as_deref().map(parse_float_prefix).unwrap_or(0.0),
        ram_used,
        ram_total,
        network_up: 0.0,
        network_down: 0.0,
        uptime: uptime
            .as_deref()
            .map(parse_uptime)
            .unwrap_or_else(|| UPTIME_PLACEHOLDER.to_string()),
        disk_usage: disk.as_deref().map(parse_int_prefix).unwrap_or(0),
        username: username
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| USERNAME_PLACEHOLDER.to_string()),
    }
}

async fn query(transport: &dyn Transport, command: &str) -> Option<String> {
    match transport.exec(command).await {
        Ok(output) => Some(output),
        Err(e) => {
            debug!("Metrics query `{}` failed: {}", command, e);
            None
        }
    }
}

/// Leading decimal number of `text`, or 0
pub fn parse_float_prefix(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '+' | '-' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
    }
    text[..end].parse().unwrap_or(0.0)
}

/// Leading integer of `text`, or 0
pub fn parse_int_prefix(text: &str) -> i64 {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    text[..end].parse().unwrap_or(0)
}

/// `"<used>,<total>"` in GiB
pub fn parse_ram(text: &str) -> (f64, f64) {
    let mut parts = text.split(',');
    let used = parts.next().map(parse_float_prefix).unwrap_or(0.0);
    let total = parts.next().map(parse_float_prefix).unwrap_or(0.0);
    (used, total)
}

pub fn parse_uptime(text: &str) -> String {
    let uptime = text.replacen("up ", "", 1);
    if uptime.is_empty() {
        UPTIME_PLACEHOLDER.to_string()
    } else {
        uptime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::channels::FileTransfer;
    use crate::sftp::SftpError;
    use crate::ssh::SshError;

    struct ScriptedTransport {
        outputs: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open_file_transfer(&self) -> Result<Arc<dyn FileTransfer>, SftpError> {
            Err(SftpError::ChannelError("unsupported".into()))
        }

        async fn exec(&self, command: &str) -> Result<String, SshError> {
            self.outputs
                .get(command)
                .map(|s| s.to_string())
                .ok_or_else(|| SshError::ChannelError("exec failed".into()))
        }
    }

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(parse_float_prefix("12.5"), 12.5);
        assert_eq!(parse_float_prefix("3.2 us"), 3.2);
        assert_eq!(parse_float_prefix("abc"), 0.0);
        assert_eq!(parse_float_prefix(""), 0.0);
        assert_eq!(parse_int_prefix("42"), 42);
        assert_eq!(parse_int_prefix("17%"), 17);
        assert_eq!(parse_int_prefix("x"), 0);
    }

    #[test]
    fn test_parse_ram_and_uptime() {
        assert_eq!(parse_ram("1.50,7.75"), (1.5, 7.75));
        assert_eq!(parse_ram("garbage"), (0.0, 0.0));
        assert_eq!(parse_uptime("up 3 days, 2 hours"), "3 days, 2 hours");
        assert_eq!(parse_uptime(""), "N/A");
    }

    #[tokio::test]
    async fn test_collect_aggregates() {
        let transport = ScriptedTransport {
            outputs: HashMap::from([
                (CPU_COMMAND, "7.3"),
                (RAM_COMMAND, "2.00,8.00"),
                (UPTIME_COMMAND, "up 5 minutes"),
                (DISK_COMMAND, "61"),
                (USERNAME_COMMAND, "deploy"),
            ]),
        };

        let metrics = collect(Some(&transport)).await;
        assert_eq!(metrics.cpu, 7.3);
        assert_eq!(metrics.ram_used, 2.0);
        assert_eq!(metrics.ram_total, 8.0);
        assert_eq!(metrics.uptime, "5 minutes");
        assert_eq!(metrics.disk_usage, 61);
        assert_eq!(metrics.username, "deploy");
        assert_eq!(metrics.network_up, 0.0);
    }

    #[tokio::test]
    async fn test_failed_queries_use_placeholders() {
        let transport = ScriptedTransport {
            outputs: HashMap::from([(USERNAME_COMMAND, "ops")]),
        };

        let metrics = collect(Some(&transport)).await;
        assert_eq!(metrics.cpu, 0.0);
        assert_eq!(metrics.ram_total, 0.0);
        assert_eq!(metrics.uptime, "N/A");
        assert_eq!(metrics.disk_usage, 0);
        assert_eq!(metrics.username, "ops");

        assert_eq!(collect(None).await, SystemMetrics::default());
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(SystemMetrics::default()).unwrap();
        assert_eq!(value["ramUsed"], 0.0);
        assert_eq!(value["diskUsage"], 0);
        assert_eq!(value["username"], "unknown");
    }
}
