//! Session Manager
//!
//! Owns the id -> session table. Each session gets one dispatch task that
//! drains its event channel, fans notifications out to subscribers and, on
//! exit, tears down the session's sub-channels before dropping the entry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::events::EventSink;
use super::types::{
    CreateOptions, LifecycleState, Notification, SessionEvent, SessionId, SessionInfo,
    SessionKind,
};
use crate::channels::{ReadinessPolicy, SubChannelRegistry, SystemMetrics};
use crate::config::{download_dir, CoreConfig};
use crate::sftp::{FileEntry, SftpError};
use crate::ssh::{RemoteContext, RemoteSession};

#[cfg(feature = "local-terminal")]
use crate::local::{LocalOptions, LocalSession};

pub type NotificationSender = mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// A live session of either kind
pub enum Session {
    #[cfg(feature = "local-terminal")]
    Local(LocalSession),
    Remote(RemoteSession),
}

impl Session {
    pub fn kind(&self) -> SessionKind {
        match self {
            #[cfg(feature = "local-terminal")]
            Session::Local(_) => SessionKind::Local,
            Session::Remote(_) => SessionKind::Remote,
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self {
            #[cfg(feature = "local-terminal")]
            Session::Local(s) => {
                if s.is_alive() {
                    LifecycleState::ShellOpen
                } else {
                    LifecycleState::Closed
                }
            }
            Session::Remote(s) => s.state(),
        }
    }

    pub fn write(&self, data: &[u8]) {
        match self {
            #[cfg(feature = "local-terminal")]
            Session::Local(s) => s.write(data),
            Session::Remote(s) => s.write(data),
        }
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        match self {
            #[cfg(feature = "local-terminal")]
            Session::Local(s) => s.resize(cols, rows),
            Session::Remote(s) => s.resize(cols, rows),
        }
    }

    pub fn kill(&self) {
        match self {
            #[cfg(feature = "local-terminal")]
            Session::Local(s) => s.kill(),
            Session::Remote(s) => s.kill(),
        }
    }

    /// Remote output is paced by SSH channel windows; acks only apply to
    /// local sessions
    #[cfg_attr(not(feature = "local-terminal"), allow(unused_variables))]
    pub fn ack(&self, len: usize) {
        match self {
            #[cfg(feature = "local-terminal")]
            Session::Local(s) => s.ack(len),
            Session::Remote(_) => {}
        }
    }
}

struct Slot {
    kind: SessionKind,
    /// `None` when the backend failed to start; the slot lives until its
    /// exit has been dispatched
    session: Option<Session>,
    subscribers: Mutex<Vec<NotificationSender>>,
}

struct Inner {
    config: CoreConfig,
    sessions: DashMap<SessionId, Arc<Slot>>,
    observers: Mutex<Vec<NotificationSender>>,
    subchannels: Arc<SubChannelRegistry>,
}

/// Cheap to clone; all clones share one session table
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(config: CoreConfig) -> Self {
        let registry = SubChannelRegistry::new(
            ReadinessPolicy::from(&config.readiness),
            download_dir(&config),
        );
        Self::with_registry(config, Arc::new(registry))
    }

    pub fn with_registry(config: CoreConfig, subchannels: Arc<SubChannelRegistry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sessions: DashMap::new(),
                observers: Mutex::new(Vec::new()),
                subchannels,
            }),
        }
    }

    /// Start a session. Startup failures are delivered as notifications,
    /// never returned.
    pub async fn create(&self, options: CreateOptions) -> SessionId {
        self.start(options, None).await
    }

    /// Start a session with a subscriber attached before it can emit, so
    /// startup diagnostics and an immediate exit are never missed.
    pub async fn create_subscribed(&self, options: CreateOptions) -> (SessionId, NotificationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.start(options, Some(tx)).await;
        (id, rx)
    }

    async fn start(&self, options: CreateOptions, subscriber: Option<NotificationSender>) -> SessionId {
        let id = SessionId::new();
        let kind = options.kind;
        let (sink, events) = EventSink::channel();

        info!(session_id = %id, "Creating {:?} session", kind);
        let session = match kind {
            SessionKind::Local => self.start_local(id.clone(), options, sink).await,
            SessionKind::Remote => {
                let context = RemoteContext {
                    settings: self.inner.config.ssh.clone(),
                    x11_display: self.inner.config.x11_display.clone(),
                    registry: self.inner.subchannels.clone(),
                };
                Some(Session::Remote(RemoteSession::start(
                    id.clone(),
                    options,
                    context,
                    sink,
                )))
            }
        };

        self.inner.sessions.insert(
            id.clone(),
            Arc::new(Slot {
                kind,
                session,
                subscribers: Mutex::new(subscriber.into_iter().collect()),
            }),
        );
        tokio::spawn(dispatch(self.inner.clone(), id.clone(), events));
        id
    }

    #[cfg(feature = "local-terminal")]
    async fn start_local(
        &self,
        id: SessionId,
        options: CreateOptions,
        sink: EventSink,
    ) -> Option<Session> {
        let local = LocalOptions {
            cols: options.cols,
            rows: options.rows,
            cwd: options.cwd,
            shell: options.shell,
        };
        LocalSession::start(id, local, &self.inner.config.flow, sink)
            .await
            .map(Session::Local)
    }

    #[cfg(not(feature = "local-terminal"))]
    async fn start_local(
        &self,
        id: SessionId,
        _options: CreateOptions,
        sink: EventSink,
    ) -> Option<Session> {
        tracing::warn!(session_id = %id, "Local terminal support is not compiled in");
        sink.text(&super::diagnostics::failure(
            "Failed to start shell",
            "local terminal support is disabled",
        ))
        .await;
        sink.exit(super::types::ExitStatus::error()).await;
        None
    }

    fn session(&self, id: &SessionId) -> Option<Arc<Slot>> {
        self.inner.sessions.get(id).map(|r| r.value().clone())
    }

    fn with_session(&self, id: &SessionId, op: &str, f: impl FnOnce(&Session)) {
        match self.session(id) {
            Some(slot) => {
                if let Some(session) = slot.session.as_ref() {
                    f(session);
                }
            }
            None => debug!(session_id = %id, "Ignoring {} for unknown session", op),
        }
    }

    pub fn write(&self, id: &SessionId, data: &[u8]) {
        self.with_session(id, "write", |s| s.write(data));
    }

    pub fn resize(&self, id: &SessionId, cols: u16, rows: u16) {
        self.with_session(id, "resize", |s| s.resize(cols, rows));
    }

    pub fn kill(&self, id: &SessionId) {
        self.with_session(id, "kill", |s| s.kill());
    }

    pub fn ack(&self, id: &SessionId, len: usize) {
        self.with_session(id, "ack", |s| s.ack(len));
    }

    /// Notifications for one session from now on. The receiver closes after
    /// its exit. `None` if the session is unknown, which includes a session
    /// that already exited; use [`create_subscribed`](Self::create_subscribed)
    /// to observe a session from its start.
    pub fn subscribe(&self, id: &SessionId) -> Option<NotificationReceiver> {
        let slot = self.session(id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        slot.subscribers.lock().push(tx);
        Some(rx)
    }

    /// Notifications for every session, including ones created later
    pub fn observe(&self) -> NotificationReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.observers.lock().push(tx);
        rx
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.inner
            .sessions
            .iter()
            .map(|r| SessionInfo {
                id: r.key().clone(),
                kind: r.value().kind,
                state: r
                    .value()
                    .session
                    .as_ref()
                    .map(Session::state)
                    .unwrap_or(LifecycleState::Closed),
            })
            .collect()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.inner.sessions.contains_key(id)
    }

    /// Kill every live session
    pub fn shutdown(&self) {
        let slots: Vec<Arc<Slot>> = self
            .inner
            .sessions
            .iter()
            .map(|r| r.value().clone())
            .collect();
        info!("Shutting down {} sessions", slots.len());
        for slot in slots {
            if let Some(session) = slot.session.as_ref() {
                session.kill();
            }
        }
    }

    pub fn subchannels(&self) -> &Arc<SubChannelRegistry> {
        &self.inner.subchannels
    }

    pub async fn list_dir(&self, id: &SessionId, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        self.inner.subchannels.list(id, path).await
    }

    pub async fn download(
        &self,
        id: &SessionId,
        remote: &str,
        local: Option<PathBuf>,
    ) -> Result<PathBuf, SftpError> {
        self.inner.subchannels.download(id, remote, local).await
    }

    pub async fn upload(&self, id: &SessionId, local: &Path, remote_dir: &str) -> Result<String, SftpError> {
        self.inner.subchannels.upload(id, local, remote_dir).await
    }

    pub async fn mkdir(&self, id: &SessionId, path: &str) -> Result<(), SftpError> {
        self.inner.subchannels.mkdir(id, path).await
    }

    pub async fn delete(&self, id: &SessionId, path: &str) -> Result<(), SftpError> {
        self.inner.subchannels.delete(id, path).await
    }

    pub async fn rename(&self, id: &SessionId, from: &str, to: &str) -> Result<(), SftpError> {
        self.inner.subchannels.rename(id, from, to).await
    }

    pub async fn metrics(&self, id: &SessionId) -> SystemMetrics {
        self.inner.subchannels.metrics(id).await
    }
}

fn fan_out(inner: &Inner, slot: Option<&Slot>, notification: Notification) {
    if let Some(slot) = slot {
        slot.subscribers
            .lock()
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }
    inner
        .observers
        .lock()
        .retain(|tx| tx.send(notification.clone()).is_ok());
}

async fn dispatch(inner: Arc<Inner>, id: SessionId, mut events: mpsc::Receiver<SessionEvent>) {
    debug!(session_id = %id, "Dispatch task started");

    while let Some(event) = events.recv().await {
        let slot = inner.sessions.get(&id).map(|r| r.value().clone());
        match event {
            SessionEvent::Data(data) => {
                fan_out(
                    &inner,
                    slot.as_deref(),
                    Notification::Data {
                        session_id: id.clone(),
                        data,
                    },
                );
            }
            SessionEvent::Exit(status) => {
                inner.subchannels.teardown(&id).await;
                inner.sessions.remove(&id);
                info!(session_id = %id, "Session exited with {:?}", status);
                fan_out(
                    &inner,
                    slot.as_deref(),
                    Notification::Exit {
                        session_id: id.clone(),
                        status,
                    },
                );
                break;
            }
        }
    }

    debug!(session_id = %id, "Dispatch task finished");
}
