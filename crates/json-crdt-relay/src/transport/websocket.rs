//! WebSocket transport using tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{Transport, TransportError, TransportResult};

pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    pub async fn connect(url: &Url) -> TransportResult<Self> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("WebSocket connect failed: {e}")))?;
        tracing::debug!(url = %url, status = %response.status(), "relay connected");
        Ok(Self { stream })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, text: String) -> TransportResult<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("WebSocket send failed: {e}")))
    }

    async fn recv(&mut self) -> Option<TransportResult<String>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    return Some(Err(TransportError::ConnectionFailed(format!(
                        "WebSocket receive failed: {e}"
                    ))))
                }
            };
            match message {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(data) => {
                    return Some(String::from_utf8(data).map_err(|_| {
                        TransportError::Protocol("binary frame is not UTF-8".to_string())
                    }))
                }
                Message::Close(_) => return None,
                // Pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("WebSocket close failed: {e}")))
    }
}
