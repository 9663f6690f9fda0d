//! Kite Ticker Adapters
//!
//! Client side of the binary market-data feed:
//!
//! - **Client**: connection manager state machine and consumer handle
//! - **Frames**: FIFO queue between the manager and consumer threads
//! - **Watchdog**: idle-connection detector
//! - **Reconnect**: fixed-delay, bounded retry policy
//! - **WebSocket**: `tokio-tungstenite` transport

pub mod client;
pub mod frames;
pub mod reconnect;
pub mod watchdog;
pub mod websocket;

pub use client::{FeedEvent, TickerClient, TickerClientConfig, TickerClientError};
pub use frames::{FrameQueue, PushOutcome};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use watchdog::{Watchdog, WatchdogConfig};
pub use websocket::WebSocketTransport;
