//! Market Data Tick Types
//!
//! Typed records decoded from the binary ticker feed. Every numeric field is
//! the raw unscaled 32-bit value exactly as transmitted; price scaling is
//! left to the consumer.
//!
//! | Mode    | Packet bytes | Fields                                     |
//! |---------|--------------|--------------------------------------------|
//! | `ltp`   | 8            | token, last price                          |
//! | `quote` | 44           | ltp fields + quantity, OHLC and volume     |
//! | `full`  | 164          | quote fields + five bid and five ask levels |

pub mod codec;

use serde::{Deserialize, Serialize};

/// Numeric instrument identifier used by the feed.
pub type InstrumentToken = u32;

/// Number of price levels per side in a full-mode packet.
pub const DEPTH_LEVELS: usize = 5;

// =============================================================================
// Mode
// =============================================================================

/// Verbosity mode of a subscription, which decides the packet layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Last traded price only.
    Ltp,
    /// Quote without market depth.
    Quote,
    /// Quote with five levels of market depth.
    Full,
}

impl Mode {
    /// Get all modes.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Ltp, Self::Quote, Self::Full]
    }

    /// Wire name used in `mode` commands.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }

    /// Declared sub-packet length for this mode.
    #[must_use]
    pub const fn packet_len(&self) -> usize {
        match self {
            Self::Ltp => LtpTick::PACKET_LEN,
            Self::Quote => QuoteTick::PACKET_LEN,
            Self::Full => FullTick::PACKET_LEN,
        }
    }

    /// Map a declared sub-packet length back to its mode.
    #[must_use]
    pub const fn from_packet_len(len: usize) -> Option<Self> {
        match len {
            LtpTick::PACKET_LEN => Some(Self::Ltp),
            QuoteTick::PACKET_LEN => Some(Self::Quote),
            FullTick::PACKET_LEN => Some(Self::Full),
            _ => None,
        }
    }

    /// Parse a mode name, ignoring case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ltp" => Some(Self::Ltp),
            "quote" => Some(Self::Quote),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tick Records
// =============================================================================

/// Last-traded-price packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LtpTick {
    /// Instrument token.
    pub instrument_token: InstrumentToken,
    /// Last traded price.
    pub last_price: u32,
}

impl LtpTick {
    /// Sub-packet length in bytes.
    pub const PACKET_LEN: usize = 8;
}

/// Quote packet (no market depth).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuoteTick {
    /// Instrument token.
    pub instrument_token: InstrumentToken,
    /// Last traded price.
    pub last_price: u32,
    /// Last traded quantity.
    pub last_quantity: u32,
    /// Average traded price.
    pub average_price: u32,
    /// Volume traded for the day.
    pub volume: u32,
    /// Total pending buy quantity.
    pub buy_quantity: u32,
    /// Total pending sell quantity.
    pub sell_quantity: u32,
    /// Day open.
    pub open: u32,
    /// Day high.
    pub high: u32,
    /// Day low.
    pub low: u32,
    /// Previous close.
    pub close: u32,
}

impl QuoteTick {
    /// Sub-packet length in bytes.
    pub const PACKET_LEN: usize = 44;
}

/// One price level of market depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Quantity at this level.
    pub quantity: u32,
    /// Price of this level.
    pub price: u32,
    /// Number of orders at this level.
    pub orders: u32,
}

/// Full packet: quote plus five bid and five ask levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FullTick {
    /// Quote section, identical in layout to a quote packet.
    pub quote: QuoteTick,
    /// Bid levels, best first.
    pub bids: [DepthLevel; DEPTH_LEVELS],
    /// Ask levels, best first.
    pub asks: [DepthLevel; DEPTH_LEVELS],
}

impl FullTick {
    /// Sub-packet length in bytes.
    pub const PACKET_LEN: usize = 164;
}

/// A decoded tick for one instrument at one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Tick {
    /// Last traded price.
    Ltp(LtpTick),
    /// Quote.
    Quote(QuoteTick),
    /// Quote with depth.
    Full(FullTick),
}

impl Tick {
    /// Mode this tick was transmitted in.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        match self {
            Self::Ltp(_) => Mode::Ltp,
            Self::Quote(_) => Mode::Quote,
            Self::Full(_) => Mode::Full,
        }
    }

    /// Instrument the tick belongs to.
    #[must_use]
    pub const fn instrument_token(&self) -> InstrumentToken {
        match self {
            Self::Ltp(t) => t.instrument_token,
            Self::Quote(t) => t.instrument_token,
            Self::Full(t) => t.quote.instrument_token,
        }
    }

    /// Last traded price, present in every mode.
    #[must_use]
    pub const fn last_price(&self) -> u32 {
        match self {
            Self::Ltp(t) => t.last_price,
            Self::Quote(t) => t.last_price,
            Self::Full(t) => t.quote.last_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Mode::Ltp, 8, "ltp")]
    #[test_case(Mode::Quote, 44, "quote")]
    #[test_case(Mode::Full, 164, "full")]
    fn mode_layout(mode: Mode, len: usize, name: &str) {
        assert_eq!(mode.packet_len(), len);
        assert_eq!(mode.as_str(), name);
        assert_eq!(Mode::from_packet_len(len), Some(mode));
        assert_eq!(Mode::parse(&name.to_uppercase()), Some(mode));
    }

    #[test]
    fn unknown_packet_len_has_no_mode() {
        assert_eq!(Mode::from_packet_len(0), None);
        assert_eq!(Mode::from_packet_len(32), None);
        assert_eq!(Mode::parse("depth"), None);
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Full).unwrap(), r#""full""#);
    }

    #[test]
    fn tick_accessors() {
        let full = Tick::Full(FullTick {
            quote: QuoteTick {
                instrument_token: 408_065,
                last_price: 150_000,
                ..QuoteTick::default()
            },
            ..FullTick::default()
        });
        assert_eq!(full.mode(), Mode::Full);
        assert_eq!(full.instrument_token(), 408_065);
        assert_eq!(full.last_price(), 150_000);
    }
}
