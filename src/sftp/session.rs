//! SFTP Session
//!
//! File operations over an `sftp` subsystem channel of an existing SSH
//! connection.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::SftpSession as RusshSftpSession;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::error::SftpError;
use super::types::FileEntry;
use crate::channels::FileTransfer;
use crate::session::SessionId;
use crate::ssh::HandleController;

pub struct SftpSession {
    sftp: RusshSftpSession,
    session_id: SessionId,
}

impl SftpSession {
    /// Open the `sftp` subsystem on a new channel
    pub async fn open(
        controller: &HandleController,
        session_id: SessionId,
    ) -> Result<Self, SftpError> {
        info!("Opening SFTP subsystem for session {}", session_id);

        let channel = controller
            .open_session_channel()
            .await
            .map_err(|e| SftpError::ChannelError(e.to_string()))?;

        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            SftpError::SubsystemNotAvailable(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SftpError::SubsystemNotAvailable(e.to_string()))?;

        info!("SFTP subsystem opened for session {}", session_id);
        Ok(Self { sftp, session_id })
    }

    pub fn into_shared(self) -> Arc<dyn FileTransfer> {
        Arc::new(self)
    }

    fn map_sftp_error(&self, err: SftpErrorInner, path: &str) -> SftpError {
        let err_str = err.to_string();
        if err_str.contains("No such file") || err_str.contains("not found") {
            SftpError::FileNotFound(path.to_string())
        } else if err_str.contains("Permission denied") {
            SftpError::PermissionDenied(path.to_string())
        } else {
            SftpError::ProtocolError(err_str)
        }
    }
}

#[async_trait]
impl FileTransfer for SftpSession {
    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        debug!("Listing directory: {}", path);
        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))?;

        Ok(read_dir
            .map(|entry| {
                let metadata = entry.metadata();
                FileEntry {
                    filename: entry.file_name(),
                    is_directory: metadata.is_dir(),
                    size: metadata.size.unwrap_or(0),
                    modify_time: metadata.mtime.map(u64::from).unwrap_or(0),
                }
            })
            .collect())
    }

    async fn is_dir(&self, path: &str) -> Result<bool, SftpError> {
        let metadata = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))?;
        Ok(metadata.is_dir())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<u64, SftpError> {
        info!("Downloading {} to {:?}", remote, local);
        let mut remote_file = self
            .sftp
            .open(remote)
            .await
            .map_err(|e| self.map_sftp_error(e, remote))?;
        let mut local_file = tokio::fs::File::create(local).await?;

        let copied = tokio::io::copy(&mut remote_file, &mut local_file).await?;
        local_file.flush().await?;
        debug!("Downloaded {} bytes from {}", copied, remote);
        Ok(copied)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64, SftpError> {
        info!("Uploading {:?} to {}", local, remote);
        let mut local_file = tokio::fs::File::open(local).await?;
        let mut remote_file = self
            .sftp
            .create(remote)
            .await
            .map_err(|e| self.map_sftp_error(e, remote))?;

        let copied = tokio::io::copy(&mut local_file, &mut remote_file)
            .await
            .map_err(|e| SftpError::WriteError(e.to_string()))?;
        remote_file
            .shutdown()
            .await
            .map_err(|e| SftpError::WriteError(e.to_string()))?;
        debug!("Uploaded {} bytes to {}", copied, remote);
        Ok(copied)
    }

    async fn mkdir(&self, path: &str) -> Result<(), SftpError> {
        info!("Creating directory: {}", path);
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        info!("Removing directory: {}", path);
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        info!("Removing file: {}", path);
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
        info!("Renaming {} to {}", from, to);
        self.sftp
            .rename(from, to)
            .await
            .map_err(|e| self.map_sftp_error(e, from))
    }

    async fn close(&self) -> Result<(), SftpError> {
        debug!("Closing SFTP subsystem for session {}", self.session_id);
        self.sftp.close().await.map_err(SftpError::from)
    }
}
