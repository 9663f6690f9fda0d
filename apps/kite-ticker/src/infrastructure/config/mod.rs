//! Configuration Module
//!
//! Configuration loading for the feed client.

mod settings;

pub use settings::{
    ConfigError, ConnectionSettings, Credentials, DEFAULT_STREAM_URL, SubscriptionSettings,
    TickerConfig,
};
