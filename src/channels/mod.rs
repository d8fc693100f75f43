//! Sub-channels derived from a remote session's transport
//!
//! File transfer and one-shot command execution, keyed by session id and
//! torn down with the session.

pub mod metrics;
pub mod readiness;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use metrics::SystemMetrics;
pub use readiness::ReadinessPolicy;
pub use registry::SubChannelRegistry;
pub use transport::{FileTransfer, Transport};
