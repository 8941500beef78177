//! Packet channel over a WebSocket.
//!
//! The WebSocket is split in two. The [`PacketReceiver`] is owned by the single
//! receive loop. The [`PacketSender`] is cloned freely; one mutex guards both the
//! write half and the message-id counter, so an ID is only ever allocated in
//! the same critical section that writes it.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::error::{HomeConnectError, Result};
use crate::protocol::{Packet, Request};

type MessageSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
type MessageStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// Close indication from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code, if a close frame was received
    pub code: Option<u16>,
    /// Close reason supplied by the peer
    pub reason: String,
}

impl CloseInfo {
    fn from_frame(frame: Option<CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self {
                code: Some(frame.code.into()),
                reason: frame.reason.into_owned(),
            },
            None => Self {
                code: None,
                reason: String::new(),
            },
        }
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code}/{}", self.reason),
            None => f.write_str("connection closed without close frame"),
        }
    }
}

/// Result of waiting for the next inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A decoded packet
    Packet(Packet),
    /// The peer closed the channel
    Closed(CloseInfo),
}

/// Split a WebSocket into its packet halves
pub fn packet_channel<S>(ws: WebSocketStream<S>) -> (PacketSender, PacketReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    let sender = PacketSender {
        inner: Arc::new(Mutex::new(Outbound {
            sink: Box::pin(sink),
            last_message_id: 0,
            closed: false,
        })),
    };
    let receiver = PacketReceiver {
        stream: Box::pin(stream),
    };
    (sender, receiver)
}

struct Outbound {
    sink: MessageSink,
    /// Last message ID put on the wire
    last_message_id: i64,
    closed: bool,
}

impl Outbound {
    async fn write(&mut self, packet: &Packet) -> Result<()> {
        if self.closed {
            return Err(HomeConnectError::Channel("Channel is closed".to_string()));
        }

        let json = packet.to_json()?;
        tracing::debug!("TX: {}", packet);
        self.sink
            .send(Message::Text(json))
            .await
            .map_err(|e| HomeConnectError::Channel(format!("Send failed: {e}")))
    }
}

/// Write half of the channel, shared by every sender
#[derive(Clone)]
pub struct PacketSender {
    inner: Arc<Mutex<Outbound>>,
}

impl PacketSender {
    /// Send a fully stamped packet as one text frame.
    ///
    /// The message counter is not touched; session traffic goes through
    /// [`send_request`](Self::send_request).
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        self.inner.lock().await.write(packet).await
    }

    /// Reset the message counter; the next allocated ID is `last_message_id + 1`
    pub async fn seed(&self, last_message_id: i64) {
        self.inner.lock().await.last_message_id = last_message_id;
    }

    /// Allocate the next message ID, stamp it and send.
    ///
    /// Returns the ID used. The counter only advances if the write succeeds.
    pub async fn send_request(&self, session_id: u32, request: Request) -> Result<i64> {
        let mut outbound = self.inner.lock().await;
        let message_id = next_id(outbound.last_message_id)?;
        let packet = request.into_packet(session_id, message_id);

        outbound.write(&packet).await?;
        outbound.last_message_id = message_id;
        Ok(message_id)
    }

    /// Next message ID that would be allocated, saturating at `i64::MAX`
    pub async fn next_message_id(&self) -> i64 {
        self.inner.lock().await.last_message_id.saturating_add(1)
    }

    /// Send a close frame and refuse further writes
    pub async fn close(&self) -> Result<()> {
        let mut outbound = self.inner.lock().await;
        if outbound.closed {
            return Ok(());
        }
        outbound.closed = true;
        match outbound.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(HomeConnectError::Channel(format!("Close failed: {e}"))),
        }
    }
}

fn next_id(last_message_id: i64) -> Result<i64> {
    last_message_id.checked_add(1).ok_or_else(|| {
        HomeConnectError::ProtocolViolation("Message ID space exhausted".to_string())
    })
}

impl fmt::Debug for PacketSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketSender").finish_non_exhaustive()
    }
}

/// Read half of the channel, owned by the receive loop
pub struct PacketReceiver {
    stream: MessageStream,
}

impl PacketReceiver {
    /// Wait for the next packet or the peer's close.
    ///
    /// Control frames are skipped. A binary frame is a protocol violation and
    /// an undecodable text frame a decode error; both are fatal. A peer that
    /// drops the stream without a close frame is reported as
    /// [`Inbound::Closed`] with no code.
    pub async fn receive_next(&mut self) -> Result<Inbound> {
        loop {
            let message = match self.stream.next().await {
                None => return Ok(Inbound::Closed(CloseInfo::from_frame(None))),
                Some(Err(
                    WsError::ConnectionClosed
                    | WsError::AlreadyClosed
                    | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
                )) => {
                    return Ok(Inbound::Closed(CloseInfo::from_frame(None)));
                },
                Some(Err(e)) => {
                    return Err(HomeConnectError::Channel(format!("Receive failed: {e}")));
                },
                Some(Ok(message)) => message,
            };

            match message {
                Message::Text(text) => {
                    let packet = Packet::from_json(&text).map_err(|e| {
                        HomeConnectError::Decode(format!("Invalid packet '{text}': {e}"))
                    })?;
                    tracing::debug!("RX: {}", packet);
                    return Ok(Inbound::Packet(packet));
                },
                Message::Close(frame) => {
                    let close = CloseInfo::from_frame(frame);
                    tracing::info!("Connection closing with reason {}", close);
                    return Ok(Inbound::Closed(close));
                },
                Message::Ping(_) | Message::Pong(_) => {},
                Message::Binary(data) => {
                    return Err(HomeConnectError::ProtocolViolation(format!(
                        "Unexpected binary frame ({} bytes)",
                        data.len()
                    )));
                },
                Message::Frame(_) => {
                    return Err(HomeConnectError::ProtocolViolation(
                        "Unexpected raw frame".to_string(),
                    ));
                },
            }
        }
    }
}

impl fmt::Debug for PacketReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketReceiver").finish_non_exhaustive()
    }
}
