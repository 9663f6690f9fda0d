//! Ticker Configuration Settings
//!
//! Configuration types for the feed client, loaded from environment variables.

use std::num::NonZeroU64;
use std::time::Duration;

use crate::application::ports::CloseCode;
use crate::domain::ticks::codec::DEFAULT_CORRUPT_FRAME_LEN;
use crate::domain::ticks::{InstrumentToken, Mode};

/// Default feed endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://websocket.kite.trade/";

/// Session credentials embedded in the stream URL.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    user_id: String,
    public_token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, user_id: String, public_token: String) -> Self {
        Self {
            api_key,
            user_id,
            public_token,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get the public session token.
    #[must_use]
    pub fn public_token(&self) -> &str {
        &self.public_token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("public_token", &"[REDACTED]")
            .finish()
    }
}

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Base endpoint, without query string.
    pub stream_url: String,
    /// Silence allowed before the watchdog forces a reconnect.
    pub idle_timeout: Duration,
    /// Fixed delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Time allowed for one open attempt.
    pub connect_timeout: Duration,
    /// Close status code that marks a deliberate shutdown.
    pub intentional_close_code: CloseCode,
    /// Length of the corrupt-frame sentinel, `None` to decode every length.
    pub corrupt_frame_len: Option<usize>,
    /// Frame queue capacity (0 = unbounded).
    pub frame_queue_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            stream_url: DEFAULT_STREAM_URL.to_string(),
            idle_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 10,
            connect_timeout: Duration::from_secs(10),
            intentional_close_code: CloseCode::GOING_AWAY,
            corrupt_frame_len: Some(DEFAULT_CORRUPT_FRAME_LEN),
            frame_queue_capacity: 0,
        }
    }
}

/// What the binary subscribes to at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSettings {
    /// Instruments to subscribe.
    pub tokens: Vec<InstrumentToken>,
    /// Mode to request for them.
    pub mode: Mode,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            mode: Mode::Quote,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Session credentials.
    pub credentials: Credentials,
    /// Connection settings.
    pub connection: ConnectionSettings,
    /// Startup subscription.
    pub subscription: SubscriptionSettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl TickerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// empty, or if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`TickerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let credentials = Credentials::new(
            env.required("KITE_API_KEY")?,
            env.required("KITE_USER_ID")?,
            env.required("KITE_PUBLIC_TOKEN")?,
        );

        let defaults = ConnectionSettings::default();
        let connection = ConnectionSettings {
            stream_url: env
                .get("KITE_STREAM_URL")
                .unwrap_or(defaults.stream_url),
            idle_timeout: env
                .parsed::<NonZeroU64>("KITE_IDLE_TIMEOUT_SECS")?
                .map_or(defaults.idle_timeout, |secs| Duration::from_secs(secs.get())),
            reconnect_delay: env
                .parsed::<u64>("KITE_RECONNECT_DELAY_MS")?
                .map_or(defaults.reconnect_delay, Duration::from_millis),
            max_reconnect_attempts: env
                .parsed("KITE_MAX_RECONNECT_ATTEMPTS")?
                .unwrap_or(defaults.max_reconnect_attempts),
            connect_timeout: env
                .parsed::<NonZeroU64>("KITE_CONNECT_TIMEOUT_SECS")?
                .map_or(defaults.connect_timeout, |secs| Duration::from_secs(secs.get())),
            intentional_close_code: defaults.intentional_close_code,
            corrupt_frame_len: match env.parsed::<usize>("KITE_CORRUPT_FRAME_LEN")? {
                Some(0) => None,
                Some(len) => Some(len),
                None => defaults.corrupt_frame_len,
            },
            frame_queue_capacity: env
                .parsed("KITE_FRAME_QUEUE_CAPACITY")?
                .unwrap_or(defaults.frame_queue_capacity),
        };

        let subscription = SubscriptionSettings {
            tokens: env
                .get("KITE_TOKENS")
                .map(|raw| parse_tokens(&raw))
                .transpose()?
                .unwrap_or_default(),
            mode: env
                .get("KITE_MODE")
                .map(|raw| {
                    Mode::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                        key: "KITE_MODE".to_string(),
                        value: raw,
                    })
                })
                .transpose()?
                .unwrap_or(Mode::Quote),
        };

        Ok(Self {
            credentials,
            connection,
            subscription,
            metrics_port: env.parsed("KITE_METRICS_PORT")?.unwrap_or(0),
        })
    }

    /// Full stream URL with the session credentials as query parameters.
    #[must_use]
    pub fn stream_url(&self) -> String {
        let base = &self.connection.stream_url;
        let separator = if base.contains('?') { '&' } else { '?' };
        format!(
            "{base}{separator}api_key={}&user_id={}&public_token={}",
            self.credentials.api_key(),
            self.credentials.user_id(),
            self.credentials.public_token(),
        )
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable is set but cannot be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank value.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|value| {
                value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                })
            })
            .transpose()
    }
}

fn parse_tokens(raw: &str) -> Result<Vec<InstrumentToken>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::InvalidValue {
                key: "KITE_TOKENS".to_string(),
                value: s.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("KITE_API_KEY", "key123"),
        ("KITE_USER_ID", "AB1234"),
        ("KITE_PUBLIC_TOKEN", "token456"),
    ];

    #[test]
    fn defaults_when_only_credentials_set() {
        let config = TickerConfig::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.connection.stream_url, DEFAULT_STREAM_URL);
        assert_eq!(config.connection.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.connection.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.connection.max_reconnect_attempts, 10);
        assert_eq!(config.connection.intentional_close_code, CloseCode::GOING_AWAY);
        assert_eq!(config.connection.corrupt_frame_len, Some(15));
        assert_eq!(config.connection.frame_queue_capacity, 0);
        assert_eq!(config.subscription, SubscriptionSettings::default());
        assert_eq!(config.metrics_port, 0);
    }

    #[test]
    fn missing_credential_is_reported() {
        let err = TickerConfig::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "KITE_PUBLIC_TOKEN"));
    }

    #[test]
    fn empty_credential_is_reported() {
        let err = TickerConfig::from_lookup(lookup(&[
            ("KITE_API_KEY", "  "),
            ("KITE_USER_ID", "AB1234"),
            ("KITE_PUBLIC_TOKEN", "token456"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "KITE_API_KEY"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("KITE_STREAM_URL", "ws://127.0.0.1:9000/"),
            ("KITE_IDLE_TIMEOUT_SECS", "30"),
            ("KITE_RECONNECT_DELAY_MS", "2500"),
            ("KITE_MAX_RECONNECT_ATTEMPTS", "0"),
            ("KITE_CORRUPT_FRAME_LEN", "0"),
            ("KITE_FRAME_QUEUE_CAPACITY", "1024"),
            ("KITE_TOKENS", "408065, 884737,"),
            ("KITE_MODE", "FULL"),
            ("KITE_METRICS_PORT", "9100"),
        ]);

        let config = TickerConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.connection.stream_url, "ws://127.0.0.1:9000/");
        assert_eq!(config.connection.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.connection.reconnect_delay, Duration::from_millis(2500));
        assert_eq!(config.connection.max_reconnect_attempts, 0);
        assert_eq!(config.connection.corrupt_frame_len, None);
        assert_eq!(config.connection.frame_queue_capacity, 1024);
        assert_eq!(config.subscription.tokens, vec![408_065, 884_737]);
        assert_eq!(config.subscription.mode, Mode::Full);
        assert_eq!(config.metrics_port, 9100);
    }

    #[test]
    fn unparsable_values_are_rejected() {
        for (key, value) in [
            ("KITE_IDLE_TIMEOUT_SECS", "five"),
            ("KITE_IDLE_TIMEOUT_SECS", "0"),
            ("KITE_CONNECT_TIMEOUT_SECS", "0"),
            ("KITE_TOKENS", "101,abc"),
            ("KITE_MODE", "depth"),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value));
            let err = TickerConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { key: k, .. } if k == key),
                "{key}: {err}"
            );
        }
    }

    #[test]
    fn stream_url_carries_credentials() {
        let config = TickerConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(
            config.stream_url(),
            "wss://websocket.kite.trade/?api_key=key123&user_id=AB1234&public_token=token456"
        );
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new(
            "key123".to_string(),
            "AB1234".to_string(),
            "token456".to_string(),
        );
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("token456"));
        assert!(debug.contains("[REDACTED]"));
    }
}
