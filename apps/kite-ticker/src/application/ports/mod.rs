//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedTransport`: Opens a streaming socket to the feed
//! - `FeedSink` / `FeedStream`: The write and read halves of an open link
//!
//! ## Driver Ports (Inbound)
//!
//! - `FrameSource`: Blocking pull of raw frames for consumers
//! - `TickHandler`: Receives decoded ticks from the dispatch loop

mod tick_handler_port;
mod transport_port;

pub use tick_handler_port::{FrameSource, TickHandler};
pub use transport_port::{
    CloseCode, FeedLink, FeedSink, FeedStream, FeedTransport, TransportError, TransportEvent,
};
