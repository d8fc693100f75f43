//! Flow-controlled output pipe
//!
//! Sits between a local PTY reader and the session's event sink. Output is
//! released in chunks of at most `max_chunk` raw bytes; once more than
//! `max_delta` bytes are out without an acknowledgement the backend is
//! paused until the consumer catches up.
//!
//! [`FlowState`] is the pure state machine. [`OutputPipe`] owns one inside a
//! single tokio task, so the queue and `delta` are never shared.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::decoder::Utf8Decoder;
use crate::config::FlowSettings;
use crate::session::events::EventSink;
use crate::session::types::ExitStatus;

/// `max_delta = DELTA_FACTOR * max_chunk`
pub const DELTA_FACTOR: usize = 5;

/// Something the pipe can stop and restart pulling from.
///
/// Both calls must be idempotent.
pub trait FlowGate: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    Pause,
    Resume,
    /// `data` is the decoder output for `raw_len` drained bytes
    Emit { data: Vec<u8>, raw_len: usize },
}

#[derive(Debug)]
pub struct FlowState {
    queue: VecDeque<Vec<u8>>,
    queued_bytes: usize,
    delta: usize,
    paused: bool,
    max_chunk: usize,
    max_delta: usize,
    decoder: Utf8Decoder,
}

impl FlowState {
    pub fn new(max_chunk: usize) -> Self {
        let max_chunk = max_chunk.max(1);
        Self {
            queue: VecDeque::new(),
            queued_bytes: 0,
            delta: 0,
            paused: false,
            max_chunk,
            max_delta: max_chunk * DELTA_FACTOR,
            decoder: Utf8Decoder::new(),
        }
    }

    pub fn push(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        self.queued_bytes += bytes.len();
        self.queue.push_back(bytes);
    }

    /// Consumer confirms `len` previously emitted bytes. Clamped at zero.
    pub fn ack(&mut self, len: usize) {
        self.delta = self.delta.saturating_sub(len);
    }

    /// Next thing to do, or `None` when idle (nothing queued, or paused).
    ///
    /// Callers loop until `None`. Between two `Emit`s the caller should let
    /// other work run instead of draining synchronously.
    pub fn next_action(&mut self) -> Option<FlowAction> {
        if self.paused && self.delta <= self.max_delta {
            self.paused = false;
            return Some(FlowAction::Resume);
        }
        if !self.paused && self.delta > self.max_delta {
            self.paused = true;
            return Some(FlowAction::Pause);
        }
        if self.paused || self.queue.is_empty() {
            return None;
        }

        let raw = self.drain(self.max_chunk);
        let raw_len = raw.len();
        self.delta += raw_len;
        Some(FlowAction::Emit {
            data: self.decoder.feed(&raw),
            raw_len,
        })
    }

    /// Everything still queued plus the decoder carry, ignoring limits.
    /// Used once the backend has exited.
    pub fn drain_all(&mut self) -> Vec<u8> {
        let raw = self.drain(usize::MAX);
        self.delta += raw.len();
        let mut out = self.decoder.feed(&raw);
        out.extend(self.decoder.flush());
        out
    }

    /// Release a partial sequence held by the decoder.
    pub fn flush(&mut self) -> Vec<u8> {
        self.decoder.flush()
    }

    fn drain(&mut self, limit: usize) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.queued_bytes.min(limit));
        while raw.len() < limit {
            let Some(mut front) = self.queue.pop_front() else {
                break;
            };
            let room = limit - raw.len();
            if front.len() > room {
                let rest = front.split_off(room);
                self.queue.push_front(rest);
            }
            raw.extend_from_slice(&front);
        }
        self.queued_bytes -= raw.len();
        raw
    }

    pub fn delta(&self) -> usize {
        self.delta
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    pub fn max_delta(&self) -> usize {
        self.max_delta
    }
}

#[derive(Debug)]
enum PipeInput {
    Chunk(Vec<u8>),
    Ack(usize),
    Finish(ExitStatus),
}

/// Handle to a running pipe task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OutputPipe {
    tx: mpsc::UnboundedSender<PipeInput>,
}

impl OutputPipe {
    /// Spawn the owner task. Requires a tokio runtime.
    pub fn spawn(settings: &FlowSettings, gate: Arc<dyn FlowGate>, sink: EventSink) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = FlowState::new(settings.max_chunk);
        let idle = Duration::from_millis(settings.idle_flush_ms);
        tokio::spawn(run_pipe(state, rx, gate, sink, idle));
        Self { tx }
    }

    /// Queue raw backend output.
    pub fn push(&self, bytes: Vec<u8>) -> bool {
        self.tx.send(PipeInput::Chunk(bytes)).is_ok()
    }

    pub fn ack(&self, len: usize) {
        let _ = self.tx.send(PipeInput::Ack(len));
    }

    /// Backend is done: drain, flush and deliver `status` as the exit event.
    pub fn finish(&self, status: ExitStatus) {
        let _ = self.tx.send(PipeInput::Finish(status));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn run_pipe(
    mut state: FlowState,
    mut rx: mpsc::UnboundedReceiver<PipeInput>,
    gate: Arc<dyn FlowGate>,
    sink: EventSink,
    idle: Duration,
) {
    let idle_timer = tokio::time::sleep(idle);
    tokio::pin!(idle_timer);
    let mut idle_armed = false;

    loop {
        while let Some(action) = state.next_action() {
            match action {
                FlowAction::Pause => {
                    tracing::debug!(delta = state.delta(), "Pausing backend");
                    gate.pause();
                }
                FlowAction::Resume => {
                    tracing::debug!(delta = state.delta(), "Resuming backend");
                    gate.resume();
                }
                FlowAction::Emit { data, raw_len } => {
                    tracing::trace!(raw_len, decoded = data.len(), "Emitting chunk");
                    if !sink.data(data).await {
                        return;
                    }
                    idle_timer.as_mut().reset(Instant::now() + idle);
                    idle_armed = true;
                    if state.queued_bytes() > 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }
        }

        tokio::select! {
            input = rx.recv() => match input {
                Some(PipeInput::Chunk(bytes)) => state.push(bytes),
                Some(PipeInput::Ack(len)) => state.ack(len),
                Some(PipeInput::Finish(status)) => {
                    let rest = state.drain_all();
                    sink.data(rest).await;
                    sink.exit(status).await;
                    // The backend is gone; a paused reader must not stay parked.
                    gate.resume();
                    break;
                }
                None => {
                    let rest = state.drain_all();
                    sink.data(rest).await;
                    break;
                }
            },
            _ = &mut idle_timer, if idle_armed => {
                idle_armed = false;
                let rest = state.flush();
                if !rest.is_empty() {
                    tracing::trace!(len = rest.len(), "Idle flush");
                    sink.data(rest).await;
                }
            }
        }
    }
    tracing::debug!("Output pipe stopped");
}
