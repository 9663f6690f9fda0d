//! Binary Frame Codec
//!
//! Decodes one feed frame into typed ticks, and builds frames in the same
//! layout for simulators and tests.
//!
//! # Frame layout
//!
//! ```text
//! +---------+---------+-----------+---------+-----------+-----
//! | count N | len L1  | payload 1 | len L2  | payload 2 | ...
//! | u16 BE  | u16 BE  | L1 bytes  | u16 BE  | L2 bytes  |
//! +---------+---------+-----------+---------+-----------+-----
//! ```
//!
//! Payloads are sequences of big-endian `u32` fields. The payload length
//! selects the layout (8 = ltp, 44 = quote, 164 = full). Payloads of any other
//! length are skipped without producing a tick, so the packets that follow
//! stay aligned.
//!
//! A frame decodes all-or-nothing: if any sub-packet is short, the whole
//! frame is rejected and none of its ticks are returned.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{DepthLevel, FullTick, LtpTick, Mode, QuoteTick, Tick};

/// Length of the corrupt frame the feed is known to emit now and then.
///
/// Observed behaviour, not a documented protocol constant; see
/// [`FrameDecoder::with_corrupt_frame_len`].
pub const DEFAULT_CORRUPT_FRAME_LEN: usize = 15;

/// Size of the packet-count header and of each length prefix.
const PREFIX_LEN: usize = 2;

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Frame matched the corrupt-frame length and was discarded.
    #[error("corrupt {0}-byte frame discarded")]
    CorruptFrame(usize),

    /// Frame ended before a declared header or payload.
    #[error("frame truncated at offset {offset}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Byte offset of the read that failed.
        offset: usize,
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the frame.
        remaining: usize,
    },

    /// Payload does not fit a `u16` length prefix.
    #[error("packet of {0} bytes exceeds the u16 length prefix")]
    PacketTooLarge(usize),

    /// Packet count does not fit the `u16` frame header.
    #[error("{0} packets exceed the u16 frame header")]
    TooManyPackets(usize),
}

impl CodecError {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CorruptFrame(_) => "corrupt_frame",
            Self::Truncated { .. } => "truncated",
            Self::PacketTooLarge(_) => "packet_too_large",
            Self::TooManyPackets(_) => "too_many_packets",
        }
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Stateless frame decoder.
///
/// The only setting is the corrupt-frame length: frames of exactly that
/// many bytes are rejected without being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDecoder {
    corrupt_frame_len: Option<usize>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder that rejects 15-byte frames.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            corrupt_frame_len: Some(DEFAULT_CORRUPT_FRAME_LEN),
        }
    }

    /// Create a decoder with a custom corrupt-frame length (`None` disables the check).
    #[must_use]
    pub const fn with_corrupt_frame_len(corrupt_frame_len: Option<usize>) -> Self {
        Self { corrupt_frame_len }
    }

    /// The corrupt-frame length in effect.
    #[must_use]
    pub const fn corrupt_frame_len(&self) -> Option<usize> {
        self.corrupt_frame_len
    }

    /// Decode one frame into ticks, preserving wire order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptFrame`] for a frame of the corrupt-frame
    /// length and [`CodecError::Truncated`] when a header or payload runs
    /// past the end of the frame. No ticks are returned in either case.
    pub fn decode(&self, frame: &[u8]) -> Result<Vec<Tick>, CodecError> {
        if self.corrupt_frame_len == Some(frame.len()) {
            return Err(CodecError::CorruptFrame(frame.len()));
        }

        let mut cursor = frame;
        ensure_remaining(frame, cursor, PREFIX_LEN)?;
        let count = usize::from(cursor.get_u16());

        // The count is untrusted, so size the buffer from what the frame can hold.
        let mut ticks = Vec::with_capacity(count.min(cursor.len() / (PREFIX_LEN + LtpTick::PACKET_LEN)));

        for _ in 0..count {
            ensure_remaining(frame, cursor, PREFIX_LEN)?;
            let len = usize::from(cursor.get_u16());
            ensure_remaining(frame, cursor, len)?;

            let (mut payload, rest) = cursor.split_at(len);
            cursor = rest;

            match Mode::from_packet_len(len) {
                Some(Mode::Ltp) => ticks.push(Tick::Ltp(read_ltp(&mut payload))),
                Some(Mode::Quote) => ticks.push(Tick::Quote(read_quote(&mut payload))),
                Some(Mode::Full) => ticks.push(Tick::Full(read_full(&mut payload))),
                None => tracing::trace!(len, "Skipping sub-packet of unknown length"),
            }
        }

        Ok(ticks)
    }
}

/// Decode a frame with the default decoder.
///
/// # Errors
///
/// See [`FrameDecoder::decode`].
pub fn decode(frame: &[u8]) -> Result<Vec<Tick>, CodecError> {
    FrameDecoder::new().decode(frame)
}

fn ensure_remaining(frame: &[u8], cursor: &[u8], needed: usize) -> Result<(), CodecError> {
    if cursor.len() < needed {
        return Err(CodecError::Truncated {
            offset: frame.len() - cursor.len(),
            needed,
            remaining: cursor.len(),
        });
    }
    Ok(())
}

// Callers hand in payloads whose length matches the layout, so the reads
// below never run past the slice.

fn read_ltp(buf: &mut &[u8]) -> LtpTick {
    LtpTick {
        instrument_token: buf.get_u32(),
        last_price: buf.get_u32(),
    }
}

fn read_quote(buf: &mut &[u8]) -> QuoteTick {
    QuoteTick {
        instrument_token: buf.get_u32(),
        last_price: buf.get_u32(),
        last_quantity: buf.get_u32(),
        average_price: buf.get_u32(),
        volume: buf.get_u32(),
        buy_quantity: buf.get_u32(),
        sell_quantity: buf.get_u32(),
        open: buf.get_u32(),
        high: buf.get_u32(),
        low: buf.get_u32(),
        close: buf.get_u32(),
    }
}

fn read_level(buf: &mut &[u8]) -> DepthLevel {
    DepthLevel {
        quantity: buf.get_u32(),
        price: buf.get_u32(),
        orders: buf.get_u32(),
    }
}

fn read_full(buf: &mut &[u8]) -> FullTick {
    let quote = read_quote(buf);
    let bids = std::array::from_fn(|_| read_level(buf));
    let asks = std::array::from_fn(|_| read_level(buf));
    FullTick { quote, bids, asks }
}

// =============================================================================
// Encoder
// =============================================================================

impl Tick {
    /// Write this tick's payload (without length prefix) in wire order.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            Self::Ltp(t) => {
                buf.put_u32(t.instrument_token);
                buf.put_u32(t.last_price);
            }
            Self::Quote(t) => put_quote(buf, t),
            Self::Full(t) => {
                put_quote(buf, &t.quote);
                for level in t.bids.iter().chain(t.asks.iter()) {
                    buf.put_u32(level.quantity);
                    buf.put_u32(level.price);
                    buf.put_u32(level.orders);
                }
            }
        }
    }
}

fn put_quote<B: BufMut>(buf: &mut B, q: &QuoteTick) {
    for field in [
        q.instrument_token,
        q.last_price,
        q.last_quantity,
        q.average_price,
        q.volume,
        q.buy_quantity,
        q.sell_quantity,
        q.open,
        q.high,
        q.low,
        q.close,
    ] {
        buf.put_u32(field);
    }
}

/// Builds frames in the feed's wire layout.
///
/// Accepts raw payloads as well as ticks, so frames with unknown packet
/// lengths can be produced.
#[derive(Debug, Default, Clone)]
pub struct FrameBuilder {
    packets: Vec<Bytes>,
}

impl FrameBuilder {
    /// Create an empty builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            packets: Vec::new(),
        }
    }

    /// Append a tick as a sub-packet.
    #[must_use]
    pub fn tick(mut self, tick: &Tick) -> Self {
        let mut payload = BytesMut::with_capacity(tick.mode().packet_len());
        tick.encode(&mut payload);
        self.packets.push(payload.freeze());
        self
    }

    /// Append an arbitrary payload as a sub-packet.
    #[must_use]
    pub fn raw(mut self, payload: &[u8]) -> Self {
        self.packets.push(Bytes::copy_from_slice(payload));
        self
    }

    /// Serialize the frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet count or a payload length does not fit
    /// in a `u16`.
    pub fn build(&self) -> Result<Bytes, CodecError> {
        let count = u16::try_from(self.packets.len())
            .map_err(|_| CodecError::TooManyPackets(self.packets.len()))?;
        let body: usize = self.packets.iter().map(|p| PREFIX_LEN + p.len()).sum();

        let mut frame = BytesMut::with_capacity(PREFIX_LEN + body);
        frame.put_u16(count);
        for packet in &self.packets {
            let len =
                u16::try_from(packet.len()).map_err(|_| CodecError::PacketTooLarge(packet.len()))?;
            frame.put_u16(len);
            frame.put_slice(packet);
        }
        Ok(frame.freeze())
    }
}

/// Encode ticks into a single frame.
///
/// # Errors
///
/// See [`FrameBuilder::build`].
pub fn encode_frame(ticks: &[Tick]) -> Result<Bytes, CodecError> {
    ticks
        .iter()
        .fold(FrameBuilder::new(), |builder, tick| builder.tick(tick))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ltp(token: u32, price: u32) -> Tick {
        Tick::Ltp(LtpTick {
            instrument_token: token,
            last_price: price,
        })
    }

    fn quote_from(words: &[u32]) -> QuoteTick {
        QuoteTick {
            instrument_token: words[0],
            last_price: words[1],
            last_quantity: words[2],
            average_price: words[3],
            volume: words[4],
            buy_quantity: words[5],
            sell_quantity: words[6],
            open: words[7],
            high: words[8],
            low: words[9],
            close: words[10],
        }
    }

    fn full_from(words: &[u32]) -> FullTick {
        let level = |i: usize| DepthLevel {
            quantity: words[11 + i * 3],
            price: words[12 + i * 3],
            orders: words[13 + i * 3],
        };
        FullTick {
            quote: quote_from(words),
            bids: std::array::from_fn(level),
            asks: std::array::from_fn(|i| level(i + 5)),
        }
    }

    fn sequential_words() -> Vec<u32> {
        (1..=41).map(|i| 0x0100_0000 * i + i).collect()
    }

    #[test]
    fn decodes_single_ltp_frame() {
        let frame = [0, 1, 0, 8, 0, 0, 0, 101, 0, 0, 0x3a, 0x98];
        let ticks = decode(&frame).unwrap();
        assert_eq!(ticks, vec![ltp(101, 15_000)]);
    }

    #[test]
    fn fields_are_read_big_endian() {
        let frame = [0, 1, 0, 8, 0x01, 0x02, 0x03, 0x04, 0xaa, 0xbb, 0xcc, 0xdd];
        let ticks = decode(&frame).unwrap();
        assert_eq!(ticks, vec![ltp(0x0102_0304, 0xaabb_ccdd)]);
    }

    #[test]
    fn full_packet_maps_all_41_fields_in_order() {
        let words = sequential_words();
        let mut payload = BytesMut::new();
        for w in &words {
            payload.put_u32(*w);
        }
        let frame = FrameBuilder::new().raw(&payload).build().unwrap();

        let ticks = decode(&frame).unwrap();
        assert_eq!(ticks, vec![Tick::Full(full_from(&words))]);

        let Tick::Full(full) = ticks[0] else {
            panic!("expected full tick");
        };
        assert_eq!(full.quote.close, words[10]);
        assert_eq!(full.bids[0].quantity, words[11]);
        assert_eq!(full.asks[4].orders, words[40]);
    }

    #[test]
    fn encoded_quote_decodes_to_same_fields() {
        let words = sequential_words();
        let tick = Tick::Quote(quote_from(&words));
        let frame = encode_frame(&[tick]).unwrap();

        assert_eq!(frame.len(), 2 + 2 + QuoteTick::PACKET_LEN);
        assert_eq!(&frame[4..8], &words[0].to_be_bytes());
        assert_eq!(decode(&frame).unwrap(), vec![tick]);
    }

    #[test]
    fn corrupt_length_frame_is_rejected_regardless_of_content() {
        // A valid ltp frame padded to 15 bytes.
        let mut frame = vec![0, 1, 0, 8, 0, 0, 0, 101, 0, 0, 0x3a, 0x98];
        frame.extend_from_slice(&[0, 0, 0]);
        assert_eq!(frame.len(), 15);

        assert_eq!(decode(&frame), Err(CodecError::CorruptFrame(15)));
        assert_eq!(decode(&[0xff; 15]), Err(CodecError::CorruptFrame(15)));
    }

    #[test]
    fn corrupt_length_is_configurable() {
        let mut frame = vec![0, 1, 0, 8, 0, 0, 0, 101, 0, 0, 0x3a, 0x98];
        frame.extend_from_slice(&[0, 0, 0]);

        let disabled = FrameDecoder::with_corrupt_frame_len(None);
        assert_eq!(disabled.decode(&frame).unwrap(), vec![ltp(101, 15_000)]);

        let twelve = FrameDecoder::with_corrupt_frame_len(Some(12));
        assert_eq!(twelve.decode(&frame[..12]), Err(CodecError::CorruptFrame(12)));
    }

    #[test]
    fn truncated_payload_discards_whole_frame() {
        let good = ltp(101, 15_000);
        let frame = FrameBuilder::new().tick(&good).build().unwrap();

        // Second header claims a 44-byte quote but only 10 bytes follow.
        let mut bytes = frame.to_vec();
        bytes[1] = 2;
        bytes.extend_from_slice(&[0, 44]);
        bytes.extend_from_slice(&[0; 10]);

        let err = decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                offset: 14,
                needed: 44,
                remaining: 10,
            }
        );
    }

    #[test]
    fn missing_length_prefix_is_truncation() {
        // Count says two packets, only one present.
        let mut bytes = encode_frame(&[ltp(1, 2)]).unwrap().to_vec();
        bytes[1] = 2;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { needed: 2, remaining: 0, .. }));
    }

    #[test]
    fn frame_shorter_than_count_header_is_truncation() {
        assert!(matches!(decode(&[]), Err(CodecError::Truncated { offset: 0, .. })));
        assert!(matches!(decode(&[7]), Err(CodecError::Truncated { offset: 0, .. })));
    }

    #[test]
    fn empty_frame_yields_no_ticks() {
        assert_eq!(decode(&[0, 0]).unwrap(), Vec::<Tick>::new());
    }

    // Unknown lengths are skipped silently, not treated as errors: the
    // cursor still advances past them and later packets decode normally.
    #[test]
    fn unknown_packet_length_is_skipped_and_alignment_kept() {
        let quote = Tick::Quote(quote_from(&sequential_words()));
        let frame = FrameBuilder::new()
            .tick(&ltp(101, 15_000))
            .raw(&[0xee; 12])
            .tick(&quote)
            .build()
            .unwrap();

        assert_eq!(decode(&frame).unwrap(), vec![ltp(101, 15_000), quote]);
    }

    #[test]
    fn trailing_bytes_after_declared_packets_are_ignored() {
        let mut bytes = encode_frame(&[ltp(5, 6)]).unwrap().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert_eq!(decode(&bytes).unwrap(), vec![ltp(5, 6)]);
    }

    #[test]
    fn builder_rejects_oversized_payload() {
        let payload = vec![0u8; usize::from(u16::MAX) + 1];
        let err = FrameBuilder::new().raw(&payload).build().unwrap_err();
        assert_eq!(err, CodecError::PacketTooLarge(payload.len()));
    }

    #[test]
    fn error_kinds() {
        assert_eq!(CodecError::CorruptFrame(15).kind(), "corrupt_frame");
        assert_eq!(
            CodecError::Truncated {
                offset: 0,
                needed: 2,
                remaining: 0
            }
            .kind(),
            "truncated"
        );
    }

    fn arb_tick() -> impl Strategy<Value = Tick> {
        (0..3u8, prop::collection::vec(any::<u32>(), 41)).prop_map(|(mode, words)| match mode {
            0 => Tick::Ltp(LtpTick {
                instrument_token: words[0],
                last_price: words[1],
            }),
            1 => Tick::Quote(quote_from(&words)),
            _ => Tick::Full(full_from(&words)),
        })
    }

    proptest! {
        #[test]
        fn well_formed_frame_yields_one_tick_per_packet(ticks in prop::collection::vec(arb_tick(), 0..16)) {
            let frame = encode_frame(&ticks).unwrap();
            prop_assume!(frame.len() != DEFAULT_CORRUPT_FRAME_LEN);
            let decoded = decode(&frame).unwrap();
            prop_assert_eq!(decoded, ticks);
        }

        #[test]
        fn cutting_a_frame_short_never_yields_partial_ticks(
            ticks in prop::collection::vec(arb_tick(), 1..8),
            cut in 1usize..64,
        ) {
            let frame = encode_frame(&ticks).unwrap();
            let end = frame.len().saturating_sub(cut);
            prop_assume!(end != DEFAULT_CORRUPT_FRAME_LEN);
            let result = decode(&frame[..end]);
            prop_assert!(result.is_err());
        }
    }
}
