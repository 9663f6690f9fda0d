#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Kite Ticker - Binary Market Data Feed Client
//!
//! Keeps a persistent WebSocket connection to the Kite ticker feed, decodes
//! its binary frames into typed ticks, replays subscriptions after every
//! reconnect and detects connections that have gone silent.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Wire data and state with no I/O
//!   - `ticks`: Tick records, modes and the frame codec
//!   - `subscription`: Subscribe/mode commands and the replay log
//!   - `connection`: Connection lifecycle states
//!
//! - **Application**: Port definitions and consumer-side services
//!   - `ports`: Transport traits, frame source and tick handler
//!   - `services`: Tick dispatch loop
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `kite`: Connection manager, frame queue, watchdog, WebSocket transport
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus metrics
//!   - `telemetry`: Tracing subscriber
//!
//! # Data Flow
//!
//! ```text
//! WebSocket ──> ConnectionManager ──> FrameQueue ──> TickDispatcher ──> TickHandler
//!                 │    ^                                   │
//!          replay │    │ reset                             └─ FrameDecoder
//!                 v    │
//!          SubscriptionLog   Watchdog
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core feed types with no external dependencies.
pub mod domain;

/// Application layer - Port definitions and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::subscription::{FeedCommand, SubscriptionLog};
pub use domain::ticks::codec::{CodecError, FrameDecoder, decode, encode_frame};
pub use domain::ticks::{DepthLevel, FullTick, InstrumentToken, LtpTick, Mode, QuoteTick, Tick};

// Application
pub use application::ports::{
    CloseCode, FeedLink, FeedSink, FeedStream, FeedTransport, FrameSource, TickHandler,
    TransportError, TransportEvent,
};
pub use application::services::{DispatchStats, TickDispatcher};

// Ticker client
pub use infrastructure::kite::{
    FeedEvent, FrameQueue, TickerClient, TickerClientConfig, TickerClientError,
    WebSocketTransport,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, TickerConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
