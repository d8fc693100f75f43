//! Transport shared with the sub-channel registry
//!
//! Wraps a [`HandleController`]; every operation opens its own channel on
//! the session's connection.

use std::sync::Arc;

use async_trait::async_trait;
use russh::ChannelMsg;
use tracing::{debug, warn};

use super::error::SshError;
use super::handle_owner::HandleController;
use crate::channels::{FileTransfer, Transport};
use crate::session::SessionId;
use crate::sftp::{SftpError, SftpSession};

pub struct SshTransport {
    controller: HandleController,
    session_id: SessionId,
}

impl SshTransport {
    pub fn new(controller: HandleController, session_id: SessionId) -> Self {
        Self {
            controller,
            session_id,
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open_file_transfer(&self) -> Result<Arc<dyn FileTransfer>, SftpError> {
        if !self.controller.is_connected() {
            return Err(SftpError::NotReady);
        }
        let sftp = SftpSession::open(&self.controller, self.session_id.clone()).await?;
        Ok(sftp.into_shared())
    }

    async fn exec(&self, command: &str) -> Result<String, SshError> {
        exec_command(&self.controller, command).await
    }
}

/// Run `command` to completion and return its trimmed stdout
pub async fn exec_command(controller: &HandleController, command: &str) -> Result<String, SshError> {
    if !controller.is_connected() {
        return Err(SshError::Disconnected);
    }
    let mut channel = controller.open_session_channel().await?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| SshError::ChannelError(format!("Exec request failed: {}", e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => {
                debug!("`{}` exited with {}", command, exit_status);
            }
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    if !stderr.is_empty() {
        warn!(
            "Command `{}` wrote to stderr: {}",
            command,
            String::from_utf8_lossy(&stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_closed_connection_fails_fast() {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        drop(cmd_rx);
        let transport = SshTransport::new(HandleController::new(cmd_tx), SessionId::from("s"));

        assert!(matches!(transport.exec("whoami").await, Err(SshError::Disconnected)));
        assert!(matches!(
            transport.open_file_transfer().await,
            Err(SftpError::NotReady)
        ));
    }
}
