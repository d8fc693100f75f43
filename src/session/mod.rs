//! Session Management Module
//!
//! Session identity, the backend -> manager event channel, terminal
//! diagnostics and the [`SessionManager`] that owns every live session.

pub mod diagnostics;
pub mod events;
pub mod manager;
pub mod types;

pub use events::{terminal_text, EventSink};
pub use manager::{NotificationReceiver, Session, SessionManager};
pub use types::{
    AuthType, CreateOptions, ExitStatus, LifecycleState, Notification, SessionEvent, SessionId,
    SessionInfo, SessionKind,
};
