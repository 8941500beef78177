//! Client connection to a Home Connect appliance.
//!
//! A [`Connection`] owns the background receive loop. The loop completes the
//! bootstrap handshake on its own; callers wait for it through
//! [`Connection::ready`] and then send through the returned [`Dispatcher`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use homeconnect::client::connect;
//! use homeconnect::config::Config;
//! use homeconnect::protocol::Action;
//!
//! let config = Config::from_file("config.toml")?.with_env();
//! let connection = connect(&config).await?;
//! let dispatcher = connection.ready(config.client.ready_timeout()).await?;
//!
//! let mut inbound = connection.subscribe();
//! dispatcher.submit(Action::Get, "/ro/allMandatoryValues", 1, None).await?;
//! let reply = inbound.recv().await?;
//! ```

mod dispatcher;
mod receive_loop;

pub use dispatcher::Dispatcher;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;

use crate::config::Config;
use crate::error::{HomeConnectError, Result};
use crate::protocol::{ready_channel, DeviceIdentity, Handshake, Packet, ReadyHandle};
use crate::transport::{
    packet_channel, upgrade, ExtensionPolicy, PacketSender, PskConnector, PskTransport, Transport,
};

use receive_loop::ReceiveLoop;

/// Capacity of the inbound packet fan-out
pub const INBOUND_CAPACITY: usize = 64;

/// Connect to the appliance described by `config`
pub async fn connect(config: &Config) -> Result<Connection> {
    config.validate()?;

    let connector = PskConnector::new(
        config.device.credentials()?,
        ExtensionPolicy::default(),
        config.client.key_log_file.clone(),
    )?;
    let transport = PskTransport::new(connector, config.device.host.clone(), config.device.port);

    Connection::open(&transport, config.client.identity()).await
}

/// A live session with an appliance
#[derive(Debug)]
pub struct Connection {
    sender: PacketSender,
    ready: ReadyHandle,
    /// Never read; kept so new subscribers can be created
    inbound: broadcast::Receiver<Packet>,
    task: JoinHandle<Result<()>>,
}

impl Connection {
    /// Open a stream over `transport`, upgrade it and start the handshake
    pub async fn open<T: Transport>(transport: &T, identity: DeviceIdentity) -> Result<Self> {
        let stream = transport.open().await?;
        tracing::info!("{} stream open to {}", transport.name(), transport.host());

        let ws = upgrade(stream, transport.host()).await?;
        Ok(Self::from_websocket(ws, identity))
    }

    /// Start the receive loop on an already upgraded WebSocket
    pub fn from_websocket<S>(ws: WebSocketStream<S>, identity: DeviceIdentity) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = packet_channel(ws);
        let (signal, ready) = ready_channel();
        let (fan_out, inbound) = broadcast::channel(INBOUND_CAPACITY);

        let receive_loop = ReceiveLoop::new(
            receiver,
            sender.clone(),
            Handshake::new(identity),
            signal,
            fan_out,
        );
        let task = tokio::spawn(receive_loop.run());

        Self {
            sender,
            ready,
            inbound,
            task,
        }
    }

    /// Wait for the handshake and return a dispatcher for the session
    pub async fn ready(&self, timeout: Duration) -> Result<Dispatcher> {
        let session = self.ready.wait(timeout).await?;
        let catalog = self.ready.catalog().unwrap_or_default();
        Ok(Dispatcher::new(self.sender.clone(), session, catalog))
    }

    /// Handle for tasks that only need to observe readiness
    pub fn ready_handle(&self) -> ReadyHandle {
        self.ready.clone()
    }

    /// Receive every packet decoded from now on.
    ///
    /// Packets that arrived before subscribing are not replayed; subscribe
    /// before submitting a request whose reply matters. The receiver reports
    /// `Closed` once the receive loop has ended.
    pub fn subscribe(&self) -> broadcast::Receiver<Packet> {
        self.inbound.resubscribe()
    }

    /// Check if the receive loop has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the receive loop and close the channel.
    ///
    /// Waiters still pending on readiness observe a channel error.
    pub async fn shutdown(self) -> Result<()> {
        self.task.abort();
        match self.task.await {
            Ok(Err(error)) => tracing::debug!("Receive loop had failed: {}", error),
            Ok(Ok(())) => {},
            Err(e) if e.is_cancelled() => {},
            Err(e) => tracing::warn!("Receive loop panicked: {}", e),
        }
        self.sender.close().await
    }

    /// Wait for the receive loop to end and return its outcome
    pub async fn join(self) -> Result<()> {
        self.task.await.map_err(|e| {
            HomeConnectError::Channel(format!("Receive loop did not complete: {e}"))
        })?
    }
}
