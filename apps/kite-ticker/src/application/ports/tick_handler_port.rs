//! Tick Consumer Ports (Driver Ports)
//!
//! How the consuming application plugs into the dispatch loop.

use bytes::Bytes;

use crate::domain::ticks::Tick;
use crate::domain::ticks::codec::CodecError;

/// Blocking source of raw frames.
pub trait FrameSource {
    /// Block until the next frame is available.
    ///
    /// Returns `None` once the source is closed and drained.
    fn next_frame(&self) -> Option<Bytes>;
}

/// Receives the ticks decoded from each frame.
pub trait TickHandler {
    /// Called with the ticks of one frame, in wire order.
    fn on_ticks(&mut self, ticks: Vec<Tick>);

    /// Called when a frame is discarded as malformed.
    fn on_decode_error(&mut self, error: &CodecError) {
        let _ = error;
    }
}
