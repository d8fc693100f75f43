//! SFTP file-transfer sub-channel
//!
//! Remote file browsing and transfer over an authenticated SSH connection.

pub mod error;
pub mod path_utils;
pub mod session;
pub mod types;

pub use error::SftpError;
pub use session::SftpSession;
pub use types::{sort_entries, FileEntry};
