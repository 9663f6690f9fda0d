//! Ticker Client
//!
//! Connection manager for the binary ticker feed, plus the handle consumers
//! use to drive it and pull frames.
//!
//! # Architecture
//!
//! ```text
//!  TickerClient ──commands──┐
//!  Watchdog ──idle timeout──┤
//!                           v
//!              ConnectionManager task ──frames──> FrameQueue ──> consumers
//!                 │        ^
//!            sink │        │ TransportEvent
//!                 v        │
//!                FeedTransport link
//! ```
//!
//! A single task owns the state, the retry counter, the subscription log
//! and the live link, so every transition is serialised. Handles only
//! enqueue commands.
//!
//! # Reconnection
//!
//! Any close other than the deliberate-closure status code schedules a
//! reconnect after a fixed delay. A successful open resets the retry
//! counter and replays the subscription log; once the attempt budget is
//! spent the client reports [`FeedEvent::GivenUp`] and waits for a new
//! [`TickerClient::start`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::frames::{FrameQueue, FrameTx, PushOutcome, frame_queue};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::watchdog::{Watchdog, WatchdogConfig};
use crate::application::ports::{
    CloseCode, FeedLink, FeedSink, FeedTransport, TransportError, TransportEvent,
};
use crate::domain::connection::ConnectionState;
use crate::domain::subscription::{FeedCommand, SubscriptionLog};
use crate::domain::ticks::codec::{CodecError, FrameDecoder};
use crate::domain::ticks::{InstrumentToken, Mode, Tick};
use crate::infrastructure::config::TickerConfig;
use crate::infrastructure::metrics;

/// Upper bound on waiting for a close frame to be written.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by [`TickerClient`] handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickerClientError {
    /// The connection manager task has exited.
    #[error("connection manager has stopped")]
    ManagerStopped,

    /// A subscription listed no instruments.
    #[error("subscription requires at least one instrument token")]
    EmptySubscription,
}

// =============================================================================
// Events
// =============================================================================

/// Lifecycle notifications emitted by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// Link opened and subscriptions replayed.
    Connected,
    /// An open link was lost or closed.
    Disconnected,
    /// A reconnection attempt has been scheduled.
    Reconnecting {
        /// Attempt number since the last successful open, starting at 1.
        attempt: u32,
    },
    /// Reconnection attempts exhausted. Nothing further happens until the
    /// next start.
    GivenUp {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the ticker client.
#[derive(Debug, Clone)]
pub struct TickerClientConfig {
    /// Full stream URL, credentials included. Treated as opaque.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Idle watchdog configuration.
    pub watchdog: WatchdogConfig,
    /// Time allowed for one open attempt.
    pub connect_timeout: Duration,
    /// Close status code that marks a deliberate shutdown.
    pub intentional_close: CloseCode,
    /// Frame queue capacity (0 = unbounded).
    pub frame_queue_capacity: usize,
    /// Decoder used by [`TickerClient::next_ticks`].
    pub decoder: FrameDecoder,
}

impl TickerClientConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            watchdog: WatchdogConfig::default(),
            connect_timeout: Duration::from_secs(10),
            intentional_close: CloseCode::GOING_AWAY,
            frame_queue_capacity: 0,
            decoder: FrameDecoder::new(),
        }
    }

    /// Create a configuration from loaded settings.
    #[must_use]
    pub fn from_config(config: &TickerConfig) -> Self {
        let connection = &config.connection;
        Self {
            url: config.stream_url(),
            reconnect: ReconnectConfig::new(
                connection.reconnect_delay,
                connection.max_reconnect_attempts,
            ),
            watchdog: WatchdogConfig::new(connection.idle_timeout),
            connect_timeout: connection.connect_timeout,
            intentional_close: connection.intentional_close_code,
            frame_queue_capacity: connection.frame_queue_capacity,
            decoder: FrameDecoder::with_corrupt_frame_len(connection.corrupt_frame_len),
        }
    }
}

// =============================================================================
// Client Handle
// =============================================================================

#[derive(Debug)]
enum Command {
    Start,
    Stop,
    Subscribe {
        tokens: Vec<InstrumentToken>,
        mode: Mode,
    },
    IdleTimeout,
}

/// Handle to a running connection manager.
///
/// Cheap to clone and safe to use from any thread. Every method except the
/// frame pulls returns immediately; the work happens on the manager task.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use kite_ticker::domain::ticks::Mode;
/// use kite_ticker::infrastructure::kite::{TickerClient, TickerClientConfig, WebSocketTransport};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (event_tx, _events) = mpsc::unbounded_channel();
/// let client = TickerClient::spawn(
///     TickerClientConfig::new("wss://websocket.kite.trade/?api_key=..."),
///     Arc::new(WebSocketTransport::new()),
///     event_tx,
///     CancellationToken::new(),
/// );
///
/// client.subscribe(&[408_065], Mode::Full)?;
/// client.enable_idle_timeout();
/// client.start()?;
///
/// while let Some(frame) = client.recv_frame().await {
///     println!("{} bytes", frame.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TickerClient {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<ConnectionState>>,
    frames: FrameQueue,
    decoder: FrameDecoder,
    watchdog: Watchdog,
}

impl TickerClient {
    /// Spawn the connection manager. It starts `Disconnected`; call
    /// [`TickerClient::start`] to connect.
    ///
    /// The manager exits when `cancel` fires or every handle is dropped,
    /// which also closes the frame queue.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(
        config: TickerClientConfig,
        transport: Arc<dyn FeedTransport>,
        events: mpsc::UnboundedSender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (frame_tx, frames) = frame_queue(config.frame_queue_capacity);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let idle_tx = commands.downgrade();
        let watchdog = Watchdog::spawn(
            config.watchdog.clone(),
            move || {
                if let Some(tx) = idle_tx.upgrade() {
                    let _ = tx.send(Command::IdleTimeout);
                }
            },
            cancel.child_token(),
        );

        let manager = ConnectionManager {
            url: config.url,
            connect_timeout: config.connect_timeout,
            intentional_close: config.intentional_close,
            idle_window: config.watchdog.idle_window,
            transport,
            commands: command_rx,
            events,
            frames: frame_tx,
            watchdog: watchdog.clone(),
            state: Arc::clone(&state),
            policy: ReconnectPolicy::new(config.reconnect),
            log: SubscriptionLog::new(),
            link: None,
            retry_at: None,
            last_activity: Instant::now(),
            cancel,
        };
        tokio::spawn(manager.run());

        Self {
            commands,
            state,
            frames,
            decoder: config.decoder,
            watchdog,
        }
    }

    /// Begin connecting. Ignored unless the client is `Disconnected` or
    /// `GivenUp`.
    ///
    /// # Errors
    ///
    /// Returns [`TickerClientError::ManagerStopped`] if the manager has exited.
    pub fn start(&self) -> Result<(), TickerClientError> {
        self.send(Command::Start)
    }

    /// Close the link deliberately and cancel any pending reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`TickerClientError::ManagerStopped`] if the manager has exited.
    pub fn stop(&self) -> Result<(), TickerClientError> {
        self.send(Command::Stop)
    }

    /// Subscribe `tokens` in `mode`.
    ///
    /// Sent immediately when connected, and replayed after every reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`TickerClientError::EmptySubscription`] for an empty token
    /// list, or [`TickerClientError::ManagerStopped`] if the manager has
    /// exited.
    pub fn subscribe(&self, tokens: &[InstrumentToken], mode: Mode) -> Result<(), TickerClientError> {
        if tokens.is_empty() {
            return Err(TickerClientError::EmptySubscription);
        }
        self.send(Command::Subscribe {
            tokens: tokens.to_vec(),
            mode,
        })
    }

    /// Arm the idle watchdog. Idempotent.
    pub fn enable_idle_timeout(&self) {
        self.watchdog.enable();
    }

    /// Disarm the idle watchdog.
    pub fn disable_idle_timeout(&self) {
        self.watchdog.disable();
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Block until the next frame is available.
    ///
    /// Returns `None` once the manager has exited and the queue is drained.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; use
    /// [`TickerClient::recv_frame`] there.
    #[must_use]
    pub fn next_frame(&self) -> Option<Bytes> {
        self.frames.next_frame()
    }

    /// Wait for the next frame without blocking the thread.
    pub async fn recv_frame(&self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Block until the next frame is available and decode it.
    ///
    /// # Panics
    ///
    /// Same as [`TickerClient::next_frame`].
    #[must_use]
    pub fn next_ticks(&self) -> Option<Result<Vec<Tick>, CodecError>> {
        let frame = self.next_frame()?;
        Some(self.decode(&frame))
    }

    /// Wait for the next frame and decode it.
    pub async fn recv_ticks(&self) -> Option<Result<Vec<Tick>, CodecError>> {
        let frame = self.recv_frame().await?;
        Some(self.decode(&frame))
    }

    /// Consumer handle to the frame queue, for a dispatch loop.
    #[must_use]
    pub fn frames(&self) -> FrameQueue {
        self.frames.clone()
    }

    /// Decoder configured for this client.
    #[must_use]
    pub const fn decoder(&self) -> FrameDecoder {
        self.decoder
    }

    fn decode(&self, frame: &[u8]) -> Result<Vec<Tick>, CodecError> {
        let result = self.decoder.decode(frame);
        match &result {
            Ok(ticks) => metrics::record_ticks(ticks),
            Err(e) => metrics::record_decode_error(e.kind()),
        }
        result
    }

    fn send(&self, command: Command) -> Result<(), TickerClientError> {
        self.commands
            .send(command)
            .map_err(|_| TickerClientError::ManagerStopped)
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

enum Step {
    Command(Command),
    Transport(TransportEvent),
    Retry,
    Shutdown,
}

struct ConnectionManager {
    url: String,
    connect_timeout: Duration,
    intentional_close: CloseCode,
    idle_window: Duration,
    transport: Arc<dyn FeedTransport>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<FeedEvent>,
    frames: FrameTx,
    watchdog: Watchdog,
    state: Arc<RwLock<ConnectionState>>,
    policy: ReconnectPolicy,
    log: SubscriptionLog,
    link: Option<FeedLink>,
    retry_at: Option<Instant>,
    /// Last open or inbound message on the current link.
    last_activity: Instant,
    cancel: CancellationToken,
}

impl ConnectionManager {
    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                () = self.cancel.cancelled() => Step::Shutdown,
                command = self.commands.recv() => command.map_or(Step::Shutdown, Step::Command),
                event = next_event(self.link.as_mut()) => Step::Transport(event),
                () = retry_due(self.retry_at) => Step::Retry,
            };

            match step {
                Step::Command(Command::Start) => self.start().await,
                Step::Command(Command::Stop) => self.stop().await,
                Step::Command(Command::Subscribe { tokens, mode }) => {
                    self.subscribe(&tokens, mode).await;
                }
                Step::Command(Command::IdleTimeout) => self.idle_timeout().await,
                Step::Transport(TransportEvent::Message(payload)) => self.on_message(payload),
                Step::Transport(TransportEvent::Closed { code, reason }) => {
                    self.link = None;
                    self.on_closed(code, &reason);
                }
                Step::Retry => {
                    self.retry_at = None;
                    self.open().await;
                }
                Step::Shutdown => {
                    self.shutdown().await;
                    break;
                }
            }
        }
    }

    async fn start(&mut self) {
        let state = self.current_state();
        if !state.is_idle() {
            tracing::debug!(%state, "Start ignored, session already active");
            return;
        }
        self.policy.reset();
        self.open().await;
    }

    async fn open(&mut self) {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(attempt = self.policy.attempt_count(), "Connecting to ticker feed");

        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let connect = tokio::time::timeout(self.connect_timeout, async move {
            transport.connect(&url).await
        });
        tokio::pin!(connect);

        // Commands keep flowing while the open is in flight so a stop can
        // abandon it.
        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => return,
                result = &mut connect => {
                    break result.unwrap_or(Err(TransportError::ConnectTimeout(self.connect_timeout)));
                }
                command = self.commands.recv() => match command {
                    Some(Command::Stop) => {
                        tracing::info!("Connection attempt abandoned, ticker feed stopped");
                        self.set_state(ConnectionState::Disconnected);
                        return;
                    }
                    Some(Command::Subscribe { tokens, mode }) => {
                        self.log.record(&tokens, mode);
                        tracing::debug!(?tokens, %mode, logged = self.log.len(), "Subscription recorded");
                    }
                    Some(Command::Start) => tracing::debug!("Start ignored, connection attempt in flight"),
                    Some(Command::IdleTimeout) => tracing::debug!("Idle timeout ignored while connecting"),
                    // Every handle is gone; the main loop shuts down next.
                    None => return,
                },
            }
        };

        match result {
            Ok(link) => self.on_open(link).await,
            Err(e) => {
                tracing::warn!(error = %e, "Ticker feed connection attempt failed");
                self.schedule_retry();
            }
        }
    }

    async fn on_open(&mut self, link: FeedLink) {
        self.policy.reset();
        self.last_activity = Instant::now();
        self.set_state(ConnectionState::Connected);
        tracing::info!("Ticker feed connected");
        self.emit(FeedEvent::Connected);
        self.watchdog.reset();

        let mut link = link;
        match replay(link.sink.as_mut(), &self.log).await {
            Ok(sent) => {
                tracing::debug!(commands = sent, "Subscriptions replayed");
                self.link = Some(link);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Subscription replay failed");
                drop(link);
                self.connection_lost();
            }
        }
    }

    async fn stop(&mut self) {
        self.retry_at = None;
        if let Some(link) = self.link.take() {
            close_link(link, self.intentional_close, "client stop").await;
            self.emit(FeedEvent::Disconnected);
        }
        if self.current_state() != ConnectionState::Disconnected {
            tracing::info!("Ticker feed stopped");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn subscribe(&mut self, tokens: &[InstrumentToken], mode: Mode) {
        let commands = self.log.record(tokens, mode);
        tracing::debug!(?tokens, %mode, logged = self.log.len(), "Subscription recorded");

        let Some(link) = self.link.as_mut() else {
            return;
        };

        let mut result = Ok(());
        for command in &commands {
            result = send_command(link.sink.as_mut(), command).await;
            if result.is_err() {
                break;
            }
        }

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to send subscription");
            self.link = None;
            self.connection_lost();
        }
    }

    async fn idle_timeout(&mut self) {
        if !self.current_state().is_connected() {
            tracing::debug!(state = %self.current_state(), "Idle timeout ignored");
            return;
        }
        // An expiry queued before the latest open or message is stale.
        let idle_for = self.last_activity.elapsed();
        if idle_for < self.idle_window {
            tracing::debug!(idle_ms = idle_for.as_millis(), "Stale idle timeout ignored");
            return;
        }
        let Some(link) = self.link.take() else {
            return;
        };

        tracing::warn!(
            idle_ms = self.idle_window.as_millis(),
            "No feed data within idle window, forcing reconnect"
        );
        metrics::record_watchdog_expiry();
        close_link(link, CloseCode::NORMAL, "idle timeout").await;
        self.connection_lost();
    }

    fn on_message(&mut self, payload: Bytes) {
        self.last_activity = Instant::now();
        self.watchdog.reset();

        if payload.len() <= 1 {
            metrics::record_heartbeat();
            return;
        }

        match self.frames.push(payload) {
            PushOutcome::Queued => metrics::record_frame_received(),
            PushOutcome::Dropped => {
                metrics::record_frame_dropped();
                tracing::debug!("Frame queue full, frame dropped");
            }
            PushOutcome::Closed => tracing::trace!("No frame consumers, frame discarded"),
        }
    }

    fn on_closed(&mut self, code: Option<CloseCode>, reason: &str) {
        if code == Some(self.intentional_close) {
            tracing::info!(code = self.intentional_close.as_u16(), reason, "Ticker feed closed deliberately");
            self.emit(FeedEvent::Disconnected);
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        tracing::warn!(code = ?code.map(CloseCode::as_u16), reason, "Ticker feed connection lost");
        self.connection_lost();
    }

    fn connection_lost(&mut self) {
        self.emit(FeedEvent::Disconnected);
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        if let Some(delay) = self.policy.next_delay() {
            let attempt = self.policy.attempt_count();
            tracing::info!(attempt, delay_ms = delay.as_millis(), "Reconnecting to ticker feed");
            metrics::record_reconnect();
            self.set_state(ConnectionState::Reconnecting);
            self.emit(FeedEvent::Reconnecting { attempt });
            self.retry_at = Some(Instant::now() + delay);
        } else {
            let attempts = self.policy.attempt_count();
            tracing::error!(attempts, "Reconnection attempts exhausted, giving up");
            self.set_state(ConnectionState::GivenUp);
            self.emit(FeedEvent::GivenUp { attempts });
        }
    }

    async fn shutdown(&mut self) {
        self.retry_at = None;
        if let Some(link) = self.link.take() {
            close_link(link, self.intentional_close, "client shutdown").await;
            self.emit(FeedEvent::Disconnected);
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Connection manager stopped");
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Connection state changed");
            metrics::set_connection_state(next);
        }
    }

    fn emit(&self, event: FeedEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!(?event, "No event listener");
        }
    }
}

async fn next_event(link: Option<&mut FeedLink>) -> TransportEvent {
    match link {
        Some(link) => link.stream.next_event().await,
        None => std::future::pending().await,
    }
}

async fn retry_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn send_command(sink: &mut dyn FeedSink, command: &FeedCommand) -> Result<(), TransportError> {
    let json = command
        .to_json()
        .map_err(|e| TransportError::SendFailed(format!("failed to serialize {}: {e}", command.action())))?;
    sink.send_text(json).await
}

async fn replay(sink: &mut dyn FeedSink, log: &SubscriptionLog) -> Result<usize, TransportError> {
    for command in log.iter() {
        send_command(sink, command).await?;
    }
    Ok(log.len())
}

async fn close_link(mut link: FeedLink, code: CloseCode, reason: &str) {
    match tokio::time::timeout(CLOSE_TIMEOUT, link.sink.close(code, reason)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Close frame not sent"),
        Err(_) => tracing::debug!("Close frame timed out"),
    }
}
