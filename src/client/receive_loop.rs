//! Single-reader receive loop.
//!
//! Owns the read half of the channel and the handshake. Until the session is
//! ready every packet goes through [`Handshake::process`]; afterwards packets
//! are fanned out to subscribers. The loop ends when the peer closes or on the
//! first fatal error.

use tokio::sync::broadcast;

use crate::error::{HomeConnectError, Result};
use crate::protocol::{Handshake, HandshakeStep, Packet, ReadySignal, Session};
use crate::transport::{Inbound, PacketReceiver, PacketSender};

pub(crate) struct ReceiveLoop {
    receiver: PacketReceiver,
    sender: PacketSender,
    handshake: Handshake,
    ready: Option<ReadySignal>,
    inbound: broadcast::Sender<Packet>,
}

impl ReceiveLoop {
    pub(crate) fn new(
        receiver: PacketReceiver,
        sender: PacketSender,
        handshake: Handshake,
        ready: ReadySignal,
        inbound: broadcast::Sender<Packet>,
    ) -> Self {
        Self {
            receiver,
            sender,
            handshake,
            ready: Some(ready),
            inbound,
        }
    }

    /// Run until the peer closes or a fatal error occurs.
    ///
    /// The write half is closed on every exit, so dispatchers fail with a
    /// channel error once the loop has ended.
    pub(crate) async fn run(mut self) -> Result<()> {
        let result = self.pump().await;

        if let Err(e) = self.sender.close().await {
            tracing::debug!("Closing channel after receive loop: {}", e);
        }

        if let Err(error) = &result {
            tracing::error!("Receive loop failed: {}", error);
            if let Some(signal) = self.ready.take() {
                signal.fail(error.clone());
            }
        }
        result
    }

    async fn pump(&mut self) -> Result<()> {
        let result = self.receive_all().await;
        if result.is_err() {
            self.handshake.fail();
        }
        result
    }

    async fn receive_all(&mut self) -> Result<()> {
        loop {
            match self.receiver.receive_next().await? {
                Inbound::Closed(close) => {
                    if self.handshake.is_ready() {
                        tracing::info!("Session closed by peer: {}", close);
                        return Ok(());
                    }
                    self.handshake.close();
                    return Err(HomeConnectError::ProtocolViolation(format!(
                        "Peer closed before session ready: {close}"
                    )));
                },
                Inbound::Packet(packet) => {
                    if !self.handshake.is_ready() {
                        let step = self.handshake.process(&packet)?;
                        self.apply(step).await?;
                    }
                    // No subscribers is not an error
                    let _ = self.inbound.send(packet);
                },
            }
        }
    }

    async fn apply(&mut self, step: HandshakeStep) -> Result<()> {
        if step.is_empty() {
            return Ok(());
        }

        let session_id = self.handshake.session_id().ok_or_else(|| {
            HomeConnectError::ProtocolViolation("Handshake step without session ID".to_string())
        })?;

        if let Some(seed) = step.seed_message_id {
            tracing::debug!(session_id, seed, "Message counter seeded");
            self.sender.seed(seed).await;
        }

        for request in step.requests {
            self.sender.send_request(session_id, request).await?;
        }

        if step.ready {
            let session = Session {
                session_id,
                next_message_id: self.sender.next_message_id().await,
            };
            let catalog = self.handshake.catalog().cloned().unwrap_or_default();
            if let Some(signal) = self.ready.take() {
                signal.publish(session, catalog);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{initial_values_packet, ready_channel, Action, HandshakeState, Request};
    use crate::transport::packet_channel;
    use futures::SinkExt;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::WebSocketStream;

    async fn receive_loop() -> (ReceiveLoop, PacketSender, WebSocketStream<DuplexStream>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        let appliance = WebSocketStream::from_raw_socket(server, Role::Server, None).await;

        let (sender, receiver) = packet_channel(client);
        let (signal, _ready) = ready_channel();
        let (fan_out, _) = broadcast::channel(8);
        let receive_loop = ReceiveLoop::new(
            receiver,
            sender.clone(),
            Handshake::default(),
            signal,
            fan_out,
        );
        (receive_loop, sender, appliance)
    }

    #[tokio::test]
    async fn test_receive_error_fails_handshake() {
        let (mut receive_loop, _sender, mut appliance) = receive_loop().await;
        appliance
            .send(Message::Text(initial_values_packet(7, 1, 100).to_json().unwrap()))
            .await
            .unwrap();
        appliance.send(Message::Binary(vec![1, 2])).await.unwrap();

        assert!(matches!(
            receive_loop.pump().await,
            Err(HomeConnectError::ProtocolViolation(_))
        ));
        assert_eq!(receive_loop.handshake.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn test_peer_drop_before_ready_is_closed() {
        let (mut receive_loop, _sender, appliance) = receive_loop().await;
        drop(appliance);

        assert!(matches!(
            receive_loop.pump().await,
            Err(HomeConnectError::ProtocolViolation(_))
        ));
        assert_eq!(receive_loop.handshake.state(), HandshakeState::Closed);
    }

    #[tokio::test]
    async fn test_run_closes_channel_on_failure() {
        let (receive_loop, sender, mut appliance) = receive_loop().await;
        appliance
            .send(Message::Text("garbage".to_string()))
            .await
            .unwrap();

        assert!(matches!(
            receive_loop.run().await,
            Err(HomeConnectError::Decode(_))
        ));
        assert!(matches!(
            sender
                .send_request(7, Request::new(Action::Get, "/iz/info", 1))
                .await,
            Err(HomeConnectError::Channel(_))
        ));
    }
}
