//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `TickDispatcher`: Pulls frames, decodes them and hands ticks to a handler

mod tick_dispatcher;

pub use tick_dispatcher::{DispatchStats, TickDispatcher};
