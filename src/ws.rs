//! WebSocket transport to the gateway.
//!
//! Thin wrapper around `tokio-tungstenite` providing split reader/writer
//! halves. The rest of the crate goes through this module rather than
//! using `tokio-tungstenite` directly.
//!
//! A single [`connect`] function owns URL normalization, the handshake,
//! and TLS negotiation, and returns a ([`WsWriter`], [`WsReader`]) pair
//! ready for use in `tokio::select!` loops.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received WebSocket message.
///
/// The gateway protocol is text-only; binary and raw frames are skipped
/// at this layer.
#[derive(Debug)]
pub enum WsMessage {
    /// UTF-8 text frame (one JSON event).
    Text(String),
    /// Protocol-level ping frame with payload.
    Ping(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Write half of the gateway connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send one encoded JSON event as a text frame.
    ///
    /// # Errors
    ///
    /// Fails when the connection is gone or the socket write errors.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("gateway text send failed")
    }

    /// Answer a protocol-level ping frame with its payload echoed back.
    ///
    /// # Errors
    ///
    /// Fails when the connection is gone or the socket write errors.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .context("gateway pong failed")
    }

    /// Flush anything still queued and run the close handshake.
    ///
    /// # Errors
    ///
    /// Fails when the close frame cannot be written.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("gateway close failed")
    }
}

/// Read half of the gateway connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Receive the next message, returning `None` when the stream ends.
    ///
    /// Binary, pong, and raw frames are skipped internally.
    pub async fn recv(&mut self) -> Option<Result<WsMessage>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(WsMessage::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    return Some(Ok(WsMessage::Ping(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(WsMessage::Close { code, reason }));
                }
                Some(Ok(tungstenite::Message::Binary(_)))
                | Some(Ok(tungstenite::Message::Pong(_)))
                | Some(Ok(tungstenite::Message::Frame(_))) => {
                    continue;
                }
                Some(Err(e)) => {
                    return Some(Err(anyhow::anyhow!("WebSocket read error: {e}")));
                }
                None => return None,
            }
        }
    }
}

/// Connect to the gateway.
///
/// Normalizes `http(s)://` URLs to `ws(s)://`, performs the WebSocket
/// handshake, and returns split (writer, reader) halves for independent
/// use in `tokio::select!` loops.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the handshake fails
/// (refused connection, TLS failure).
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let url = http_to_ws_scheme(url);
    let (ws_stream, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .with_context(|| format!("cannot connect to {url}"))?;

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Normalize a gateway URL to a WebSocket scheme.
///
/// `http://` becomes `ws://` and `https://` becomes `wss://`; URLs that
/// already carry a WebSocket scheme are left alone.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_normalization_rewrites_http_variants() {
        assert_eq!(
            http_to_ws_scheme("https://gateway.example.com"),
            "wss://gateway.example.com"
        );
        assert_eq!(
            http_to_ws_scheme("http://localhost:9500/byoa/ws"),
            "ws://localhost:9500/byoa/ws"
        );
    }

    #[test]
    fn test_scheme_normalization_keeps_ws_urls_as_is() {
        for url in ["ws://localhost:9500/byoa/ws", "wss://gateway.example.com/byoa/ws"] {
            assert_eq!(http_to_ws_scheme(url), url);
        }
    }

    #[test]
    fn test_scheme_normalization_only_touches_the_prefix() {
        // A scheme-like substring later in the URL must survive.
        assert_eq!(
            http_to_ws_scheme("http://proxy.example.com/fwd?to=http://inner"),
            "ws://proxy.example.com/fwd?to=http://inner"
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_a_malformed_url() {
        assert!(connect("byoa gateway").await.is_err());
    }

    #[tokio::test]
    async fn test_connect_surfaces_a_refused_connection() {
        assert!(connect("ws://127.0.0.1:1/byoa/ws").await.is_err());
    }
}
