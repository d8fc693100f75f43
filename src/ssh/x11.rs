//! X11 forwarding
//!
//! Parses `host:display[.screen]` descriptors and bridges server-opened
//! `x11` channels to the local X server.

use russh::client::Msg;
use russh::Channel;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::session::EventSink;

/// X servers listen on TCP port `6000 + display`
pub const X11_BASE_PORT: u16 = 6000;
pub const X11_AUTH_PROTOCOL: &str = "MIT-MAGIC-COOKIE-1";

/// Local X server a forwarded connection is bridged to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X11Target {
    pub host: String,
    pub display: u16,
    pub screen: u32,
}

impl X11Target {
    /// Parse `host:display[.screen]`. An empty host means `localhost`.
    pub fn parse(descriptor: &str) -> Option<Self> {
        let (host, rest) = descriptor.rsplit_once(':')?;
        let (display, screen) = match rest.split_once('.') {
            Some((display, screen)) => (display, Some(screen)),
            None => (rest, None),
        };

        if display.is_empty() || !display.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let display: u16 = display.parse().ok()?;
        if display > u16::MAX - X11_BASE_PORT {
            return None;
        }

        let screen = match screen {
            Some(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok()?,
            Some(_) => return None,
            None => 0,
        };

        let host = if host.is_empty() {
            "localhost".to_string()
        } else {
            host.to_string()
        };

        Some(Self {
            host,
            display,
            screen,
        })
    }

    pub fn port(&self) -> u16 {
        X11_BASE_PORT + self.display
    }
}

/// Fresh hex cookie for the `x11-req` channel request
pub fn generate_cookie() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Pipe one forwarded X11 channel to the local X server until either side
/// closes. Connection errors are reported on the session's terminal.
pub async fn bridge_connection(channel: Channel<Msg>, target: X11Target, sink: EventSink) {
    let addr = format!("{}:{}", target.host, target.port());
    debug!("Bridging X11 channel to {}", addr);

    let mut local = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("X11 connection to {} failed: {}", addr, e);
            sink.text(&format!("\r\nX11 connection error: {}\r\n", e)).await;
            let _ = channel.close().await;
            return;
        }
    };

    let mut remote = channel.into_stream();
    match tokio::io::copy_bidirectional(&mut remote, &mut local).await {
        Ok((up, down)) => info!("X11 channel closed ({} bytes up, {} bytes down)", up, down),
        Err(e) => {
            warn!("X11 channel error: {}", e);
            sink.text(&format!("\r\nX11 connection error: {}\r\n", e)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_display() {
        let target = X11Target::parse(":0").unwrap();
        assert_eq!(target.host, "localhost");
        assert_eq!(target.display, 0);
        assert_eq!(target.screen, 0);
        assert_eq!(target.port(), 6000);
    }

    #[test]
    fn test_parse_host_display_screen() {
        let target = X11Target::parse("10.0.0.5:12.1").unwrap();
        assert_eq!(target.host, "10.0.0.5");
        assert_eq!(target.display, 12);
        assert_eq!(target.screen, 1);
        assert_eq!(target.port(), 6012);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(X11Target::parse("localhost").is_none());
        assert!(X11Target::parse("localhost:").is_none());
        assert!(X11Target::parse("localhost:x").is_none());
        assert!(X11Target::parse("localhost:1.").is_none());
        assert!(X11Target::parse("localhost:99999").is_none());
    }

    #[test]
    fn test_cookie_is_hex() {
        let cookie = generate_cookie();
        assert_eq!(cookie.len(), 32);
        assert!(cookie.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
