//! SSH Client implementation using russh

use std::sync::Arc;

use base64::Engine;
use parking_lot::Mutex;
use russh::client::{self, DisconnectReason, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PrivateKey, PublicKey, PublicKeyBase64};
use russh::Channel;
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::config::{AuthMethod, SshConfig};
use super::error::{classify_io_error, SshError};
use super::x11::{self, X11Target};
use crate::session::EventSink;

/// Forwarded X11 channels are bridged to `target`; errors surface on `sink`
pub struct X11Forward {
    pub target: X11Target,
    pub sink: EventSink,
}

/// Why the transport went away, written by the handler once the russh
/// session ends. Read by the shell task when its channel ends without an
/// exit status.
pub type TransportFault = Arc<Mutex<Option<SshError>>>;

/// Client handler for russh callbacks
pub struct ClientHandler {
    host: String,
    port: u16,
    x11: Option<X11Forward>,
    fault: TransportFault,
}

impl ClientHandler {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            x11: None,
            fault: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_x11(mut self, forward: X11Forward) -> Self {
        self.x11 = Some(forward);
        self
    }

    pub fn fault(&self) -> TransportFault {
        self.fault.clone()
    }
}

/// `SHA256:<base64>` as printed by OpenSSH
pub fn fingerprint(key: &PublicKey) -> String {
    let digest = Sha256::digest(key.public_key_bytes());
    format!(
        "SHA256:{}",
        base64::engine::general_purpose::STANDARD
            .encode(digest)
            .trim_end_matches('=')
    )
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        info!(
            "Accepting host key for {}:{} (fingerprint: {})",
            self.host,
            self.port,
            fingerprint(server_public_key)
        );
        Ok(true)
    }

    async fn server_channel_open_x11(
        &mut self,
        channel: Channel<client::Msg>,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        let Some(forward) = &self.x11 else {
            debug!("Rejecting unrequested X11 channel from {}", originator_address);
            let _ = channel.close().await;
            return Ok(());
        };

        info!(
            "Server opened X11 channel from {}:{}",
            originator_address, originator_port
        );

        // Must not block the SSH event loop
        tokio::spawn(x11::bridge_connection(
            channel,
            forward.target.clone(),
            forward.sink.clone(),
        ));
        Ok(())
    }

    async fn disconnected(
        &mut self,
        reason: DisconnectReason<Self::Error>,
    ) -> Result<(), Self::Error> {
        let error = match reason {
            DisconnectReason::ReceivedDisconnect(remote) => {
                info!(
                    "Server {}:{} disconnected: {:?}",
                    self.host, self.port, remote.reason_code
                );
                SshError::ConnectionFailed(format!("Server closed the connection: {}", remote.message))
            }
            DisconnectReason::Error(e) => {
                warn!("Connection to {}:{} lost: {}", self.host, self.port, e);
                e
            }
        };
        *self.fault.lock() = Some(error);
        Ok(())
    }
}

/// Resolve, dial and handshake, all bounded by the connect timeout
pub async fn connect(
    config: &SshConfig,
    handler: ClientHandler,
) -> Result<Handle<ClientHandler>, SshError> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Connecting to SSH server at {}", addr);

    let ssh_config = client::Config {
        inactivity_timeout: None,
        keepalive_interval: config.keepalive_interval,
        keepalive_max: 3,
        ..Default::default()
    };

    let attempt = async {
        let socket_addr = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| SshError::HostNotFound(format!("{}: {}", config.host, e)))?
            .next()
            .ok_or_else(|| SshError::HostNotFound(config.host.clone()))?;

        let stream = TcpStream::connect(socket_addr)
            .await
            .map_err(classify_io_error)?;
        let _ = stream.set_nodelay(true);

        client::connect_stream(Arc::new(ssh_config), stream, handler).await
    };

    let handle = tokio::time::timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| SshError::Timeout(format!("Connection to {} timed out", addr)))??;

    debug!("SSH handshake completed");
    Ok(handle)
}

/// Authenticate using the configured method; `key` is the decoded private
/// key for key auth.
pub async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    config: &SshConfig,
    key: Option<PrivateKey>,
) -> Result<(), SshError> {
    let result = match (&config.auth, key) {
        (AuthMethod::Key { .. }, Some(key)) => {
            let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);
            handle
                .authenticate_publickey(&config.username, key_with_hash)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
        }
        (AuthMethod::Key { .. }, None) => return Err(SshError::MissingKey),
        (AuthMethod::Password { password }, _) => handle
            .authenticate_password(&config.username, password.clone().unwrap_or_default())
            .await
            .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?,
    };

    if !result.success() {
        return Err(SshError::AuthenticationFailed(
            "Authentication rejected by server".to_string(),
        ));
    }

    info!("SSH authentication successful for {}@{}", config.username, config.host);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::client::Handler;

    #[tokio::test]
    async fn test_disconnect_error_is_recorded() {
        let mut handler = ClientHandler::new("example.com".into(), 22);
        let fault = handler.fault();
        assert!(fault.lock().is_none());

        handler
            .disconnected(DisconnectReason::Error(SshError::Timeout(
                "Keepalive timeout".into(),
            )))
            .await
            .unwrap();

        assert!(matches!(*fault.lock(), Some(SshError::Timeout(_))));
    }
}
