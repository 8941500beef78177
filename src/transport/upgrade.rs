//! WebSocket upgrade over the TLS stream.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{client_async, WebSocketStream};

use crate::error::{HomeConnectError, Result};

/// Path the appliance serves its WebSocket on
pub const UPGRADE_PATH: &str = "/homeconnect";

/// Build the upgrade request with a fresh random `Sec-WebSocket-Key`
pub fn upgrade_request(host: &str) -> Result<Request> {
    let key: [u8; 16] = rand::random();

    Request::builder()
        .method("GET")
        .uri(format!("ws://{host}{UPGRADE_PATH}"))
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", STANDARD.encode(key))
        .body(())
        .map_err(|e| HomeConnectError::Transport(format!("Invalid upgrade request: {e}")))
}

/// Upgrade an established byte stream to WebSocket framing
pub async fn upgrade<S>(stream: S, host: &str) -> Result<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = upgrade_request(host)?;

    let (ws, response) = client_async(request, stream)
        .await
        .map_err(|e| HomeConnectError::Transport(format!("WebSocket upgrade failed: {e}")))?;

    tracing::debug!(
        status = %response.status(),
        headers = ?response.headers(),
        "WebSocket upgrade response"
    );

    Ok(ws)
}
