//! Tick Dispatch Loop
//!
//! Consumer-side loop: pull a frame, decode it, hand the ticks on. A frame
//! that fails to decode is reported and skipped; it never ends the loop.

use crate::application::ports::{FrameSource, TickHandler};
use crate::domain::ticks::codec::FrameDecoder;

/// Counters collected over one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames pulled from the source.
    pub frames: u64,
    /// Ticks handed to the handler.
    pub ticks: u64,
    /// Frames discarded as malformed.
    pub decode_errors: u64,
}

/// Drives frames from a source through the decoder into a handler.
#[derive(Debug)]
pub struct TickDispatcher<S, H> {
    source: S,
    decoder: FrameDecoder,
    handler: H,
}

impl<S, H> TickDispatcher<S, H>
where
    S: FrameSource,
    H: TickHandler,
{
    /// Create a dispatcher.
    #[must_use]
    pub const fn new(source: S, decoder: FrameDecoder, handler: H) -> Self {
        Self {
            source,
            decoder,
            handler,
        }
    }

    /// Run until the source closes, blocking the calling thread.
    ///
    /// Returns the handler together with run statistics.
    pub fn run(mut self) -> (H, DispatchStats) {
        let mut stats = DispatchStats::default();

        while let Some(frame) = self.source.next_frame() {
            stats.frames += 1;
            match self.decoder.decode(&frame) {
                Ok(ticks) => {
                    stats.ticks += ticks.len() as u64;
                    self.handler.on_ticks(ticks);
                }
                Err(e) => {
                    stats.decode_errors += 1;
                    tracing::debug!(error = %e, frame_len = frame.len(), "Discarding malformed frame");
                    self.handler.on_decode_error(&e);
                }
            }
        }

        tracing::info!(
            frames = stats.frames,
            ticks = stats.ticks,
            decode_errors = stats.decode_errors,
            "Frame source closed, dispatch loop finished"
        );
        (self.handler, stats)
    }
}
