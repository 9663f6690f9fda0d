//! Subscription Log
//!
//! Ordered record of the commands sent to the feed so they can be replayed
//! verbatim after every reconnect.
//!
//! # Design
//!
//! Each subscribe call appends exactly two commands: a `subscribe` command
//! listing the tokens and a `mode` command binding a mode to the same
//! tokens. Entries are never removed or merged, so if a token's mode was set
//! twice both `mode` commands replay, in their original order.
//!
//! ```text
//! {"a":"subscribe","v":[101]}
//! {"a":"mode","v":["ltp",[101]]}
//! ```

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::domain::ticks::{InstrumentToken, Mode};

// =============================================================================
// Feed Commands
// =============================================================================

/// A text command sent to the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    /// Start streaming the given instruments.
    Subscribe {
        /// Instrument tokens.
        tokens: Vec<InstrumentToken>,
    },
    /// Set the packet mode for the given instruments.
    SetMode {
        /// Requested mode.
        mode: Mode,
        /// Instrument tokens.
        tokens: Vec<InstrumentToken>,
    },
}

impl FeedCommand {
    /// Wire action name.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::SetMode { .. } => "mode",
        }
    }

    /// Tokens the command applies to.
    #[must_use]
    pub fn tokens(&self) -> &[InstrumentToken] {
        match self {
            Self::Subscribe { tokens } | Self::SetMode { tokens, .. } => tokens,
        }
    }

    /// Serialize to the JSON text sent over the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for FeedCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FeedCommand", 2)?;
        state.serialize_field("a", self.action())?;
        match self {
            Self::Subscribe { tokens } => state.serialize_field("v", tokens)?,
            Self::SetMode { mode, tokens } => state.serialize_field("v", &(mode, tokens))?,
        }
        state.end()
    }
}

// =============================================================================
// Subscription Log
// =============================================================================

/// Append-only log of issued commands, in issue order.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionLog {
    entries: Vec<FeedCommand>,
}

impl SubscriptionLog {
    /// Create an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record a subscribe call and return the two commands it produced.
    pub fn record(&mut self, tokens: &[InstrumentToken], mode: Mode) -> [FeedCommand; 2] {
        let commands = [
            FeedCommand::Subscribe {
                tokens: tokens.to_vec(),
            },
            FeedCommand::SetMode {
                mode,
                tokens: tokens.to_vec(),
            },
        ];
        self.entries.extend(commands.iter().cloned());
        commands
    }

    /// Commands in replay order.
    pub fn iter(&self) -> impl Iterator<Item = &FeedCommand> {
        self.entries.iter()
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_json() {
        let cmd = FeedCommand::Subscribe {
            tokens: vec![101, 202],
        };
        assert_eq!(cmd.to_json().unwrap(), r#"{"a":"subscribe","v":[101,202]}"#);
    }

    #[test]
    fn mode_command_json() {
        let cmd = FeedCommand::SetMode {
            mode: Mode::Quote,
            tokens: vec![101],
        };
        assert_eq!(cmd.to_json().unwrap(), r#"{"a":"mode","v":["quote",[101]]}"#);
    }

    #[test]
    fn record_appends_subscribe_then_mode() {
        let mut log = SubscriptionLog::new();
        let [subscribe, mode] = log.record(&[101], Mode::Ltp);

        assert_eq!(subscribe.action(), "subscribe");
        assert_eq!(mode.action(), "mode");
        assert_eq!(log.len(), 2);
        assert_eq!(log.iter().cloned().collect::<Vec<_>>(), vec![subscribe, mode]);
    }

    #[test]
    fn repeated_mode_changes_are_not_merged() {
        let mut log = SubscriptionLog::new();
        log.record(&[101], Mode::Ltp);
        log.record(&[101], Mode::Full);

        let json: Vec<String> = log.iter().map(|c| c.to_json().unwrap()).collect();
        assert_eq!(
            json,
            vec![
                r#"{"a":"subscribe","v":[101]}"#,
                r#"{"a":"mode","v":["ltp",[101]]}"#,
                r#"{"a":"subscribe","v":[101]}"#,
                r#"{"a":"mode","v":["full",[101]]}"#,
            ]
        );
    }

    #[test]
    fn new_log_is_empty() {
        let log = SubscriptionLog::default();
        assert!(log.is_empty());
        assert_eq!(log.iter().count(), 0);
    }

    #[test]
    fn tokens_accessor() {
        let cmd = FeedCommand::SetMode {
            mode: Mode::Full,
            tokens: vec![7, 8],
        };
        assert_eq!(cmd.tokens(), &[7, 8]);
    }
}
