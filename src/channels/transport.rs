//! Seams between the sub-channel registry and the SSH transport.
//!
//! A remote session registers an `Arc<dyn Transport>` once its transport is
//! authenticated; everything the registry does goes through these traits.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::sftp::{FileEntry, SftpError};
use crate::ssh::SshError;

/// Authenticated transport a session shares with the registry
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new file-transfer sub-channel
    async fn open_file_transfer(&self) -> Result<Arc<dyn FileTransfer>, SftpError>;

    /// Run `command` on a fresh exec channel and return its trimmed stdout.
    /// Stderr is logged, not returned.
    async fn exec(&self, command: &str) -> Result<String, SshError>;
}

/// Raw file-transfer primitives. Listing filters and ordering are applied
/// by the registry.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>, SftpError>;

    async fn is_dir(&self, path: &str) -> Result<bool, SftpError>;

    /// Copy `remote` to `local`, returning bytes written
    async fn download(&self, remote: &str, local: &Path) -> Result<u64, SftpError>;

    /// Copy `local` to `remote`, returning bytes written
    async fn upload(&self, local: &Path, remote: &str) -> Result<u64, SftpError>;

    async fn mkdir(&self, path: &str) -> Result<(), SftpError>;

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError>;

    async fn remove_file(&self, path: &str) -> Result<(), SftpError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError>;

    async fn close(&self) -> Result<(), SftpError>;
}
