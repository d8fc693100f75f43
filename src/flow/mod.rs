//! Output flow control
//!
//! - [`decoder`]: never release half a UTF-8 sequence
//! - [`pipe`]: chunking and ack-based backpressure for local PTY output

pub mod decoder;
pub mod pipe;

pub use decoder::{find_utf8_safe_boundary, Utf8Decoder};
pub use pipe::{FlowAction, FlowGate, FlowState, OutputPipe, DELTA_FACTOR};
