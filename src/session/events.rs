//! Per-session event channel
//!
//! Every backend talks to the manager through an [`EventSink`]. The sink is
//! the single place that enforces "exactly one exit, nothing after it".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::types::{ExitStatus, SessionEvent};

/// Capacity of the backend -> dispatch channel. A full channel suspends the
/// producer, which for remote sessions stops reading the SSH channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<SessionEvent>,
    exited: Arc<AtomicBool>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            Self {
                tx,
                exited: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Forward output. Returns `false` once the session has exited or the
    /// receiving side is gone.
    pub async fn data(&self, data: impl Into<Bytes>) -> bool {
        if self.has_exited() {
            return false;
        }
        let data = data.into();
        if data.is_empty() {
            return true;
        }
        self.tx.send(SessionEvent::Data(data)).await.is_ok()
    }

    /// Terminal text (diagnostics, banners). `\n` is expanded to `\r\n`.
    pub async fn text(&self, text: &str) -> bool {
        self.data(terminal_text(text)).await
    }

    /// Deliver the exit event. Only the first call has any effect.
    pub async fn exit(&self, status: ExitStatus) -> bool {
        if self.exited.swap(true, Ordering::SeqCst) {
            tracing::debug!("Dropping duplicate exit {:?}", status);
            return false;
        }
        self.tx.send(SessionEvent::Exit(status)).await.is_ok()
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Normalize bare `\n` to `\r\n` so diagnostics render on a raw terminal.
pub fn terminal_text(text: &str) -> Bytes {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev = '\0';
    for c in text.chars() {
        if c == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(c);
        prev = c;
    }
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_delivered_once() {
        let (sink, mut rx) = EventSink::channel();
        assert!(sink.exit(ExitStatus::code(0)).await);
        assert!(!sink.exit(ExitStatus::error()).await);
        assert!(!sink.data(&b"late"[..]).await);
        drop(sink);

        assert_eq!(rx.recv().await, Some(SessionEvent::Exit(ExitStatus::code(0))));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_empty_data_is_not_sent() {
        let (sink, mut rx) = EventSink::channel();
        assert!(sink.data(Bytes::new()).await);
        assert!(sink.data(&b"x"[..]).await);
        drop(sink);
        assert_eq!(rx.recv().await, Some(SessionEvent::Data(Bytes::from_static(b"x"))));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_terminal_text_line_endings() {
        assert_eq!(terminal_text("a\nb\r\nc"), Bytes::from("a\r\nb\r\nc"));
    }
}
