//! In-memory transport and file-transfer fakes for sub-channel tests

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;

use super::transport::{FileTransfer, Transport};
use crate::sftp::{FileEntry, SftpError};
use crate::ssh::SshError;

#[derive(Default)]
pub struct FakeFiles {
    pub entries: Vec<FileEntry>,
    pub dirs: Vec<String>,
    pub(crate) calls: SyncMutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl FakeFiles {
    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FileTransfer for FakeFiles {
    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        self.record(format!("read_dir {}", path));
        Ok(self.entries.clone())
    }

    async fn is_dir(&self, path: &str) -> Result<bool, SftpError> {
        Ok(self.dirs.iter().any(|d| d == path))
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<u64, SftpError> {
        self.record(format!("download {}", remote));
        tokio::fs::write(local, b"payload").await?;
        Ok(7)
    }

    async fn upload(&self, _local: &Path, remote: &str) -> Result<u64, SftpError> {
        self.record(format!("upload {}", remote));
        Ok(0)
    }

    async fn mkdir(&self, path: &str) -> Result<(), SftpError> {
        self.record(format!("mkdir {}", path));
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.record(format!("rmdir {}", path));
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.record(format!("unlink {}", path));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
        self.record(format!("rename {} {}", from, to));
        Ok(())
    }

    async fn close(&self) -> Result<(), SftpError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeTransport {
    pub files: Arc<FakeFiles>,
    pub opens: AtomicUsize,
}

impl FakeTransport {
    pub fn new(files: FakeFiles) -> Arc<Self> {
        Arc::new(Self {
            files: Arc::new(files),
            opens: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_file_transfer(&self) -> Result<Arc<dyn FileTransfer>, SftpError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.clone())
    }

    async fn exec(&self, command: &str) -> Result<String, SshError> {
        Ok(format!("ran {}", command))
    }
}
