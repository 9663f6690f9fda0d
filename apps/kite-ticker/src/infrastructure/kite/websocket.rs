//! WebSocket Transport
//!
//! [`FeedTransport`] adapter over `tokio-tungstenite`. Binary and text
//! messages are both surfaced as raw bytes; ping and pong are handled by
//! tungstenite and never reach the connection manager.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};

use crate::application::ports::{
    CloseCode, FeedLink, FeedSink, FeedStream, FeedTransport, TransportError, TransportEvent,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens feed links with `tokio-tungstenite` (rustls for `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport {
    _private: (),
}

impl WebSocketTransport {
    /// Create a transport.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<FeedLink, TransportError> {
        let (ws_stream, response) = tokio_tungstenite::connect_async_with_config(url, None, true)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        Ok(FeedLink::new(
            Box::new(WsSink { write }),
            Box::new(WsEvents { read }),
        ))
    }
}

struct WsSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FeedSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.write
            .send(Message::Text(text.into()))
            .await
            .map_err(send_error)
    }

    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: code.as_u16().into(),
            reason: reason.to_owned().into(),
        };
        self.write
            .send(Message::Close(Some(frame)))
            .await
            .map_err(send_error)
    }
}

fn send_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::AlreadyClosed | tungstenite::Error::ConnectionClosed => {
            TransportError::Closed
        }
        other => TransportError::SendFailed(other.to_string()),
    }
}

struct WsEvents {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FeedStream for WsEvents {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Binary(data))) => return TransportEvent::Message(data),
                Some(Ok(Message::Text(text))) => {
                    return TransportEvent::Message(Bytes::copy_from_slice(text.as_str().as_bytes()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((None, String::new()), |f| {
                        (Some(CloseCode(u16::from(f.code))), f.reason.as_str().to_owned())
                    });
                    return TransportEvent::Closed { code, reason };
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    return TransportEvent::Closed {
                        code: Some(CloseCode::ABNORMAL),
                        reason: e.to_string(),
                    };
                }
                None => {
                    return TransportEvent::Closed {
                        code: Some(CloseCode::ABNORMAL),
                        reason: "stream ended".to_string(),
                    };
                }
            }
        }
    }
}
