//! SSH Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Host is required")]
    MissingHost,

    #[error("Private key path or content is required for key authentication")]
    MissingKey,

    #[error("Error reading private key: {0}")]
    KeyRead(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Disconnected")]
    Disconnected,
}

impl SshError {
    /// Operator hint rendered under the terminal diagnostic
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            SshError::ConnectionRefused(_) => Some("Check if SSH service is running on the remote host"),
            SshError::HostNotFound(_) => Some("Check the hostname/IP address"),
            SshError::Timeout(_) => Some("Check network connectivity and firewall settings"),
            SshError::AuthenticationFailed(_) | SshError::KeyError(_) => {
                Some("Verify your username, password, or SSH key")
            }
            SshError::KeyRead(_) => Some("Check if the key file exists and has correct permissions"),
            _ => None,
        }
    }

    /// Configuration errors are reported before any connection attempt
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SshError::MissingHost | SshError::MissingKey | SshError::KeyRead(_)
        )
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        match err {
            russh::Error::ConnectionTimeout | russh::Error::KeepaliveTimeout => {
                SshError::Timeout(err.to_string())
            }
            russh::Error::NotAuthenticated => SshError::AuthenticationFailed(err.to_string()),
            russh::Error::Disconnect => SshError::Disconnected,
            russh::Error::IO(io) => classify_io_error(io),
            other => SshError::ProtocolError(other.to_string()),
        }
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(err: russh::keys::Error) -> Self {
        SshError::KeyError(err.to_string())
    }
}

/// Map a socket error to the transport error class it represents
pub fn classify_io_error(err: std::io::Error) -> SshError {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::ConnectionRefused => SshError::ConnectionRefused(err.to_string()),
        ErrorKind::TimedOut => SshError::Timeout(err.to_string()),
        ErrorKind::NotFound => SshError::HostNotFound(err.to_string()),
        _ => SshError::IoError(err),
    }
}

impl serde::Serialize for SshError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
