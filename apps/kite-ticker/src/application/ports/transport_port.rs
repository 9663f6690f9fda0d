//! Feed Transport Port (Driven Port)
//!
//! Interface for the persistent streaming socket the feed is delivered on.
//! An open link is split into a write half and a read half so the connection
//! manager can wait on inbound events while still sending commands.

use async_trait::async_trait;
use bytes::Bytes;

/// WebSocket close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: Self = Self(1000);
    /// Endpoint going away; used for deliberate client shutdown.
    pub const GOING_AWAY: Self = Self(1001);
    /// Connection dropped without a close frame.
    pub const ABNORMAL: Self = Self(1006);

    /// Numeric status code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inbound event from an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A data message, binary or text, as raw bytes.
    Message(Bytes),
    /// The link closed. No further events follow.
    Closed {
        /// Status code from the close frame, if one was received.
        code: Option<CloseCode>,
        /// Close reason or error description.
        reason: String,
    },
}

/// Transport error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection attempt did not complete in time.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// Writing to the link failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The link is already closed.
    #[error("connection closed")]
    Closed,
}

/// Write half of an open link.
#[async_trait]
pub trait FeedSink: Send {
    /// Send a text message.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a close frame with the given status code.
    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError>;
}

/// Read half of an open link.
#[async_trait]
pub trait FeedStream: Send {
    /// Wait for the next inbound event.
    ///
    /// Must be cancel safe: dropping the future before it completes loses
    /// no message. After [`TransportEvent::Closed`] the link is finished.
    async fn next_event(&mut self) -> TransportEvent;
}

/// An open link, split into halves.
pub struct FeedLink {
    /// Write half.
    pub sink: Box<dyn FeedSink>,
    /// Read half.
    pub stream: Box<dyn FeedStream>,
}

impl FeedLink {
    /// Bundle two halves.
    #[must_use]
    pub fn new(sink: Box<dyn FeedSink>, stream: Box<dyn FeedStream>) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for FeedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedLink").finish_non_exhaustive()
    }
}

/// Opens links to the feed endpoint.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Open a link to `url`.
    async fn connect(&self, url: &str) -> Result<FeedLink, TransportError>;
}
