//! Sub-Channel Registry
//!
//! Maps a session id to the transport its remote session registered, and
//! caches one file-transfer sub-channel per session. Entries are dropped on
//! [`SubChannelRegistry::teardown`] when the owning session exits.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::metrics::{self, SystemMetrics};
use super::readiness::ReadinessPolicy;
use super::transport::{FileTransfer, Transport};
use crate::session::SessionId;
use crate::sftp::path_utils::{join_remote_path, local_basename, local_destination};
use crate::sftp::{sort_entries, FileEntry, SftpError};
use crate::ssh::SshError;

struct Entry {
    transport: Arc<dyn Transport>,
    sftp: Mutex<Option<Arc<dyn FileTransfer>>>,
    closed: AtomicBool,
}

pub struct SubChannelRegistry {
    entries: DashMap<SessionId, Arc<Entry>>,
    policy: ReadinessPolicy,
    download_dir: Option<PathBuf>,
}

impl SubChannelRegistry {
    pub fn new(policy: ReadinessPolicy, download_dir: Option<PathBuf>) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            download_dir,
        }
    }

    /// Expose a session's transport. Replaces any previous registration.
    pub fn register(&self, session_id: SessionId, transport: Arc<dyn Transport>) {
        info!("Registered transport for session {}", session_id);
        let entry = Arc::new(Entry {
            transport,
            sftp: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        if let Some(previous) = self.entries.insert(session_id.clone(), entry) {
            tokio::spawn(close_entry(session_id, previous));
        }
    }

    pub fn is_registered(&self, session_id: &SessionId) -> bool {
        self.entries.contains_key(session_id)
    }

    fn entry(&self, session_id: &SessionId) -> Option<Arc<Entry>> {
        self.entries.get(session_id).map(|r| r.value().clone())
    }

    /// Wait for the session's transport per the readiness policy
    async fn ready_entry(&self, session_id: &SessionId) -> Result<Arc<Entry>, SftpError> {
        self.policy
            .wait_for(|| std::future::ready(self.entry(session_id)))
            .await
            .ok_or(SftpError::NotReady)
    }

    /// Cached file-transfer sub-channel, opened on first use
    pub async fn file_transfer(
        &self,
        session_id: &SessionId,
    ) -> Result<Arc<dyn FileTransfer>, SftpError> {
        let entry = self.ready_entry(session_id).await?;

        let mut slot = entry.sftp.lock().await;
        if let Some(sftp) = slot.as_ref() {
            return Ok(sftp.clone());
        }

        debug!("Opening file-transfer sub-channel for session {}", session_id);
        let sftp = entry.transport.open_file_transfer().await?;

        if entry.closed.load(Ordering::SeqCst) {
            // Session went away while the channel was opening
            if let Err(e) = sftp.close().await {
                warn!("Failed to close orphaned SFTP channel for {}: {}", session_id, e);
            }
            return Err(SftpError::NotReady);
        }

        *slot = Some(sftp.clone());
        Ok(sftp)
    }

    /// Directory listing without `.`/`..`, directories first
    pub async fn list(&self, session_id: &SessionId, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        let sftp = self.file_transfer(session_id).await?;
        let mut entries: Vec<FileEntry> = sftp
            .read_dir(path)
            .await?
            .into_iter()
            .filter(|e| !e.is_dot_entry())
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Download `remote` to `local`, or to `<download dir>/<basename>` when
    /// no destination is given. Returns the path written.
    pub async fn download(
        &self,
        session_id: &SessionId,
        remote: &str,
        local: Option<PathBuf>,
    ) -> Result<PathBuf, SftpError> {
        let destination = match local {
            Some(path) => path,
            None => {
                let dir = self
                    .download_dir
                    .as_deref()
                    .ok_or_else(|| SftpError::InvalidPath("No download directory".to_string()))?;
                local_destination(dir, remote)
                    .ok_or_else(|| SftpError::InvalidPath(remote.to_string()))?
            }
        };

        let sftp = self.file_transfer(session_id).await?;
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = sftp.download(remote, &destination).await?;
        info!("Downloaded {} ({} bytes) to {:?}", remote, bytes, destination);
        Ok(destination)
    }

    /// Upload `local` into `remote_dir`, keeping its file name. Returns the
    /// remote path written.
    pub async fn upload(
        &self,
        session_id: &SessionId,
        local: &Path,
        remote_dir: &str,
    ) -> Result<String, SftpError> {
        let name = local_basename(local)
            .ok_or_else(|| SftpError::InvalidPath(local.display().to_string()))?;
        let remote = join_remote_path(remote_dir, &name);

        let sftp = self.file_transfer(session_id).await?;
        let bytes = sftp.upload(local, &remote).await?;
        info!("Uploaded {:?} ({} bytes) to {}", local, bytes, remote);
        Ok(remote)
    }

    pub async fn mkdir(&self, session_id: &SessionId, path: &str) -> Result<(), SftpError> {
        self.file_transfer(session_id).await?.mkdir(path).await
    }

    /// Stat first; directories are removed with rmdir, anything else unlinked
    pub async fn delete(&self, session_id: &SessionId, path: &str) -> Result<(), SftpError> {
        let sftp = self.file_transfer(session_id).await?;
        if sftp.is_dir(path).await? {
            sftp.remove_dir(path).await
        } else {
            sftp.remove_file(path).await
        }
    }

    pub async fn rename(&self, session_id: &SessionId, from: &str, to: &str) -> Result<(), SftpError> {
        self.file_transfer(session_id).await?.rename(from, to).await
    }

    /// One-shot command on a fresh exec channel. No readiness wait.
    pub async fn exec(&self, session_id: &SessionId, command: &str) -> Result<String, SshError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| SshError::SessionNotFound(session_id.to_string()))?;
        entry.transport.exec(command).await
    }

    pub async fn metrics(&self, session_id: &SessionId) -> SystemMetrics {
        let entry = self.entry(session_id);
        metrics::collect(entry.as_ref().map(|e| e.transport.as_ref())).await
    }

    /// Drop the session's entry and close its file-transfer sub-channel.
    /// Close errors are logged, never returned.
    pub async fn teardown(&self, session_id: &SessionId) {
        let Some((_, entry)) = self.entries.remove(session_id) else {
            return;
        };
        close_entry(session_id.clone(), entry).await;
        info!("Sub-channels torn down for session {}", session_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mark `entry` closed and close its cached file-transfer channel
async fn close_entry(session_id: SessionId, entry: Arc<Entry>) {
    entry.closed.store(true, Ordering::SeqCst);

    let sftp = entry.sftp.lock().await.take();
    if let Some(sftp) = sftp {
        if let Err(e) = sftp.close().await {
            warn!("Failed to close SFTP channel for session {}: {}", session_id, e);
        }
    }
}

impl Default for SubChannelRegistry {
    fn default() -> Self {
        Self::new(ReadinessPolicy::default(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::channels::test_support::{FakeFiles, FakeTransport};

    fn policy() -> ReadinessPolicy {
        ReadinessPolicy::new(5, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let registry = SubChannelRegistry::new(policy(), None);
        let id = SessionId::new();
        let transport = FakeTransport::new(FakeFiles {
            entries: vec![
                FileEntry::dir("."),
                FileEntry::file("notes.txt", 10),
                FileEntry::dir(".."),
                FileEntry::dir("src"),
                FileEntry::file("a.out", 20),
            ],
            ..Default::default()
        });
        registry.register(id.clone(), transport.clone());

        let names: Vec<_> = registry
            .list(&id, "/home")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        assert_eq!(names, vec!["src", "a.out", "notes.txt"]);

        registry.list(&id, "/home").await.unwrap();
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_waits_for_late_registration() {
        let registry = Arc::new(SubChannelRegistry::new(policy(), None));
        let id = SessionId::new();
        let transport = FakeTransport::new(FakeFiles::default());

        let late = registry.clone();
        let late_id = id.clone();
        let late_transport = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            late.register(late_id, late_transport);
        });

        let entries = registry.list(&id, "/").await;
        assert!(entries.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_after_retries() {
        let registry = SubChannelRegistry::new(policy(), None);
        let result = registry.list(&SessionId::new(), "/").await;
        assert!(matches!(result, Err(SftpError::NotReady)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_closes_cached_channel() {
        let registry = SubChannelRegistry::new(policy(), None);
        let id = SessionId::new();
        let transport = FakeTransport::new(FakeFiles::default());
        registry.register(id.clone(), transport.clone());

        registry.list(&id, "/").await.unwrap();
        registry.teardown(&id).await;

        assert!(transport.files.closed.load(Ordering::SeqCst));
        assert!(registry.is_empty());
        let result = registry.list(&id, "/").await;
        assert!(matches!(result, Err(SftpError::NotReady)));
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregister_closes_replaced_channel() {
        let registry = SubChannelRegistry::new(policy(), None);
        let id = SessionId::new();
        let first = FakeTransport::new(FakeFiles::default());
        let second = FakeTransport::new(FakeFiles::default());

        registry.register(id.clone(), first.clone());
        registry.list(&id, "/").await.unwrap();
        registry.register(id.clone(), second.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(first.files.closed.load(Ordering::SeqCst));
        registry.list(&id, "/").await.unwrap();
        assert_eq!(second.opens.load(Ordering::SeqCst), 1);
        assert!(!second.files.closed.load(Ordering::SeqCst));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_stats_first() {
        let registry = SubChannelRegistry::new(ReadinessPolicy::immediate(), None);
        let id = SessionId::new();
        let transport = FakeTransport::new(FakeFiles {
            dirs: vec!["/tmp/build".to_string()],
            ..Default::default()
        });
        registry.register(id.clone(), transport.clone());

        registry.delete(&id, "/tmp/build").await.unwrap();
        registry.delete(&id, "/tmp/build.log").await.unwrap();
        assert_eq!(
            transport.files.calls(),
            vec!["rmdir /tmp/build", "unlink /tmp/build.log"]
        );
    }

    #[tokio::test]
    async fn test_upload_joins_basename() {
        let registry = SubChannelRegistry::new(ReadinessPolicy::immediate(), None);
        let id = SessionId::new();
        let transport = FakeTransport::new(FakeFiles::default());
        registry.register(id.clone(), transport.clone());

        let remote = registry
            .upload(&id, Path::new("/tmp/report.pdf"), "/srv/docs")
            .await
            .unwrap();
        assert_eq!(remote, "/srv/docs/report.pdf");
        assert_eq!(transport.files.calls(), vec!["upload /srv/docs/report.pdf"]);
    }

    #[tokio::test]
    async fn test_download_defaults_to_download_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SubChannelRegistry::new(
            ReadinessPolicy::immediate(),
            Some(dir.path().join("incoming")),
        );
        let id = SessionId::new();
        registry.register(id.clone(), FakeTransport::new(FakeFiles::default()));

        let written = registry.download(&id, "/var/log/syslog", None).await.unwrap();
        assert_eq!(written, dir.path().join("incoming").join("syslog"));
        assert_eq!(std::fs::read(&written).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_exec_and_metrics_without_transport() {
        let registry = SubChannelRegistry::new(ReadinessPolicy::immediate(), None);
        let id = SessionId::new();

        let result = registry.exec(&id, "whoami").await;
        assert!(matches!(result, Err(SshError::SessionNotFound(_))));
        assert_eq!(registry.metrics(&id).await, SystemMetrics::default());

        registry.register(id.clone(), FakeTransport::new(FakeFiles::default()));
        assert_eq!(registry.exec(&id, "whoami").await.unwrap(), "ran whoami");
    }
}
