//! Transport stack between the client and the appliance.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Handshake / Request Dispatcher     │
//! └──────────────────┬──────────────────────┘
//!                    │  Packet (JSON)
//!          ┌─────────┴─────────┐
//!          │  PacketChannel    │  text frames only
//!          └─────────┬─────────┘
//!          ┌─────────┴─────────┐
//!          │  WebSocket        │  GET /homeconnect upgrade
//!          └─────────┬─────────┘
//!          ┌─────────┴─────────┐
//!          │  TLS 1.2 PSK      │  no encrypt-then-MAC
//!          └─────────┬─────────┘
//!                  TCP :443
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use homeconnect::transport::{ExtensionPolicy, PskConnector, PskCredentials, PskTransport};
//!
//! let connector = PskConnector::new(credentials, ExtensionPolicy::default(), None)?;
//! let transport = PskTransport::new(connector, "192.168.1.50", 443);
//! let stream = transport.open().await?;
//! ```

mod channel;
mod extensions;
mod tls;
mod upgrade;

pub use channel::{packet_channel, CloseInfo, Inbound, PacketReceiver, PacketSender};
pub use extensions::{
    library_defaults, strip_encrypt_then_mac, ClientExtensions, ExtensionPolicy,
    EXT_ENCRYPT_THEN_MAC, EXT_EXTENDED_MASTER_SECRET, EXT_SERVER_NAME, EXT_SESSION_TICKET,
};
pub use tls::{ssl_options_for, PskConnector, PskCredentials};
pub use upgrade::{upgrade, upgrade_request, UPGRADE_PATH};

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use crate::error::Result;

/// Default appliance port
pub const DEFAULT_PORT: u16 = 443;

/// Byte-stream provider underneath the WebSocket.
///
/// Implementations establish the secured stream; the client stays agnostic of
/// how it was set up.
pub trait Transport: Send + Sync {
    /// Established duplex stream
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new stream to the appliance.
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Self::Stream>> + Send + '_>>;

    /// Host name used for the upgrade request.
    fn host(&self) -> &str;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

/// TCP + TLS-PSK transport
#[derive(Debug)]
pub struct PskTransport {
    connector: PskConnector,
    host: String,
    port: u16,
}

impl PskTransport {
    /// Create a transport to `host:port`
    pub fn new(connector: PskConnector, host: impl Into<String>, port: u16) -> Self {
        Self {
            connector,
            host: host.into(),
            port,
        }
    }

    /// Target port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Transport for PskTransport {
    type Stream = SslStream<TcpStream>;

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Self::Stream>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!("Connecting to {}:{}", self.host, self.port);
            self.connector.connect(&self.host, self.port).await
        })
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn name(&self) -> &'static str {
        "TLS-PSK"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> PskConnector {
        PskConnector::new(
            PskCredentials::new("Client_identity", vec![1; 32]),
            ExtensionPolicy::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_psk_transport() {
        let transport = PskTransport::new(connector(), "192.168.1.50", DEFAULT_PORT);
        assert_eq!(transport.host(), "192.168.1.50");
        assert_eq!(transport.port(), 443);
        assert_eq!(transport.name(), "TLS-PSK");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = PskTransport::new(connector(), "127.0.0.1", port);
        assert!(matches!(
            transport.open().await,
            Err(crate::error::HomeConnectError::Transport(_))
        ));
    }
}
