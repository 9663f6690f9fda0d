//! Connection State
//!
//! Lifecycle states of the feed connection. Only the connection manager
//! transitions between them.
//!
//! ```text
//! Disconnected --start--> Connecting --open--> Connected
//!      ^                      ^                   |
//!      |                      |               close (unintentional)
//!   stop / deliberate close   |                   v
//!      |                      +--delay------ Reconnecting --retries exhausted--> GivenUp
//! ```

/// Current state of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    #[default]
    Disconnected,
    /// An open attempt is in progress.
    Connecting,
    /// Open and streaming.
    Connected,
    /// Waiting out the delay before the next open attempt.
    Reconnecting,
    /// Retries exhausted; a new start is required.
    GivenUp,
}

impl ConnectionState {
    /// Check if the connection is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a start request should begin a new session.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Disconnected | Self::GivenUp)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::GivenUp => "given_up",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
