//! Shared test harness: an in-memory feed transport driven by the test.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kite_ticker::infrastructure::kite::ReconnectConfig;
use kite_ticker::{
    CloseCode, FeedEvent, FeedLink, FeedSink, FeedStream, FeedTransport, TickerClient,
    TickerClientConfig, TransportError, TransportEvent,
};

/// Transport whose links are controlled from the test.
///
/// Connects succeed until `accept_limit` is reached, then fail. Each
/// connect first waits `connect_delay`, if set.
#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    connects: usize,
    accept_limit: Option<usize>,
    connect_delay: Option<Duration>,
    links: Vec<ScriptedLink>,
}

impl ScriptedTransport {
    /// Transport that accepts every connect.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport that accepts the first `n` connects and refuses the rest.
    pub fn accepting_first(n: usize) -> Arc<Self> {
        let transport = Self::default();
        transport.state.lock().accept_limit = Some(n);
        Arc::new(transport)
    }

    /// Transport that accepts every connect after `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        let transport = Self::default();
        transport.state.lock().connect_delay = Some(delay);
        Arc::new(transport)
    }

    /// Connect attempts that ran to completion, successful or not.
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    /// Links opened so far.
    pub fn link_count(&self) -> usize {
        self.state.lock().links.len()
    }

    /// The `index`-th opened link.
    pub fn link(&self, index: usize) -> ScriptedLink {
        self.state.lock().links[index].clone()
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&self, _url: &str) -> Result<FeedLink, TransportError> {
        let delay = self.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.connects += 1;
        if state.accept_limit.is_some_and(|limit| state.links.len() >= limit) {
            return Err(TransportError::ConnectionFailed("refused".to_string()));
        }

        let (events, rx) = mpsc::unbounded_channel();
        let link = ScriptedLink {
            sent: Arc::default(),
            close_code: Arc::default(),
            events,
        };
        let sink = ScriptedSink {
            sent: Arc::clone(&link.sent),
            close_code: Arc::clone(&link.close_code),
        };
        state.links.push(link);

        Ok(FeedLink::new(Box::new(sink), Box::new(ScriptedStream { rx })))
    }
}

/// Test-side view of one opened link.
#[derive(Clone)]
pub struct ScriptedLink {
    sent: Arc<Mutex<Vec<String>>>,
    close_code: Arc<Mutex<Option<CloseCode>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ScriptedLink {
    /// Text messages the client sent on this link, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Status code of the close frame the client sent, if any.
    pub fn close_code(&self) -> Option<CloseCode> {
        *self.close_code.lock()
    }

    /// Deliver a message from the server.
    pub fn push(&self, payload: impl Into<Bytes>) {
        let _ = self.events.send(TransportEvent::Message(payload.into()));
    }

    /// Close the link from the server side.
    pub fn close(&self, code: Option<CloseCode>) {
        let _ = self.events.send(TransportEvent::Closed {
            code,
            reason: "server close".to_string(),
        });
    }
}

struct ScriptedSink {
    sent: Arc<Mutex<Vec<String>>>,
    close_code: Arc<Mutex<Option<CloseCode>>>,
}

#[async_trait]
impl FeedSink for ScriptedSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.close_code.lock().is_some() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&mut self, code: CloseCode, _reason: &str) -> Result<(), TransportError> {
        *self.close_code.lock() = Some(code);
        Ok(())
    }
}

struct ScriptedStream {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl FeedStream for ScriptedStream {
    async fn next_event(&mut self) -> TransportEvent {
        self.rx.recv().await.unwrap_or(TransportEvent::Closed {
            code: Some(CloseCode::ABNORMAL),
            reason: "transport dropped".to_string(),
        })
    }
}

/// Client wired to `transport` with a 1s fixed delay and ten retries.
pub fn spawn_client(
    transport: &Arc<ScriptedTransport>,
) -> (TickerClient, mpsc::UnboundedReceiver<FeedEvent>, CancellationToken) {
    let mut config = TickerClientConfig::new("ws://feed.test/");
    config.reconnect = ReconnectConfig::new(Duration::from_secs(1), 10);
    spawn_with_config(transport, config)
}

/// Client wired to `transport` with the given configuration.
pub fn spawn_with_config(
    transport: &Arc<ScriptedTransport>,
    config: TickerClientConfig,
) -> (TickerClient, mpsc::UnboundedReceiver<FeedEvent>, CancellationToken) {
    let (event_tx, events) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let client = TickerClient::spawn(config, Arc::clone(transport) as Arc<dyn FeedTransport>, event_tx, cancel.clone());
    (client, events, cancel)
}

/// Next lifecycle event, failing the test if none arrives.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<FeedEvent>) -> FeedEvent {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for feed event")
        .expect("event channel closed")
}

/// Let the manager task process what is already queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// JSON for a subscribe command.
pub fn subscribe_json(tokens: &[u32]) -> String {
    format!(r#"{{"a":"subscribe","v":{}}}"#, token_list(tokens))
}

/// JSON for a mode command.
pub fn mode_json(mode: &str, tokens: &[u32]) -> String {
    format!(r#"{{"a":"mode","v":["{mode}",{}]}}"#, token_list(tokens))
}

fn token_list(tokens: &[u32]) -> String {
    let joined: Vec<String> = tokens.iter().map(ToString::to_string).collect();
    format!("[{}]", joined.join(","))
}
