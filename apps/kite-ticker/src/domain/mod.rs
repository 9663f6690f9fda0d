//! Domain Layer - Core feed types and business logic.
//!
//! Tick records, the binary frame codec, the subscription log and the
//! connection states. Nothing here performs I/O.

/// Tick records and the binary frame codec.
pub mod ticks;

/// Subscription log and feed commands.
pub mod subscription;

/// Connection lifecycle states.
pub mod connection;
