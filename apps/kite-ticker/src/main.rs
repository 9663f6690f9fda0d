//! Kite Ticker Binary
//!
//! Connects to the ticker feed, subscribes the configured instruments and
//! logs the decoded ticks until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin kite-ticker
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `KITE_API_KEY`: API key
//! - `KITE_USER_ID`: User id
//! - `KITE_PUBLIC_TOKEN`: Public session token
//!
//! ## Optional
//! - `KITE_TOKENS`: Comma-separated instrument tokens to subscribe
//! - `KITE_MODE`: ltp | quote | full (default: quote)
//! - `KITE_STREAM_URL`: Feed endpoint (default: <wss://websocket.kite.trade/>)
//! - `KITE_IDLE_TIMEOUT_SECS`: Watchdog idle window, at least 1 (default: 5)
//! - `KITE_RECONNECT_DELAY_MS`: Delay before each reconnect (default: 1000)
//! - `KITE_MAX_RECONNECT_ATTEMPTS`: Attempts before giving up, 0 = unlimited (default: 10)
//! - `KITE_CONNECT_TIMEOUT_SECS`: Open attempt timeout, at least 1 (default: 10)
//! - `KITE_CORRUPT_FRAME_LEN`: Corrupt-frame length, 0 disables (default: 15)
//! - `KITE_FRAME_QUEUE_CAPACITY`: Frame queue bound, 0 = unbounded (default: 0)
//! - `KITE_METRICS_PORT`: Prometheus metrics port, 0 = disabled (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log level (default: `kite_ticker=info`)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kite_ticker::infrastructure::config::TickerConfig;
use kite_ticker::infrastructure::kite::{
    FeedEvent, TickerClient, TickerClientConfig, WebSocketTransport,
};
use kite_ticker::infrastructure::{metrics, telemetry};
use kite_ticker::{CodecError, Tick, TickDispatcher, TickHandler};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Time allowed for the dispatch loop to drain after shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Kite ticker");

    let config = TickerConfig::from_env()?;
    log_config(&config);

    if config.metrics_port != 0 {
        metrics::init_metrics(Some(SocketAddr::from(([0, 0, 0, 0], config.metrics_port))))?;
    }

    let shutdown_token = CancellationToken::new();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let events = tokio::spawn(handle_feed_events(event_rx, shutdown_token.clone()));

    let client = TickerClient::spawn(
        TickerClientConfig::from_config(&config),
        Arc::new(WebSocketTransport::new()),
        event_tx,
        shutdown_token.clone(),
    );

    if config.subscription.tokens.is_empty() {
        tracing::warn!("KITE_TOKENS is empty, connecting without subscriptions");
    } else {
        client.subscribe(&config.subscription.tokens, config.subscription.mode)?;
    }
    client.enable_idle_timeout();
    client.start()?;

    // The dispatch loop blocks on the frame queue, so it gets its own thread.
    let dispatcher = TickDispatcher::new(client.frames(), client.decoder(), LoggingHandler);
    let dispatch = tokio::task::spawn_blocking(move || dispatcher.run());

    tokio::select! {
        () = await_signal() => {
            client.stop()?;
        }
        () = shutdown_token.cancelled() => {}
    }
    shutdown_token.cancel();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, dispatch).await {
        Ok(Ok((_, stats))) => tracing::info!(
            frames = stats.frames,
            ticks = stats.ticks,
            decode_errors = stats.decode_errors,
            "Dispatch loop finished"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "Dispatch loop panicked"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Dispatch loop did not finish in time"
        ),
    }

    if events.await.unwrap_or(false) {
        anyhow::bail!("ticker feed gave up reconnecting");
    }

    tracing::info!("Kite ticker stopped");
    Ok(())
}

/// Logs ticks and records tick metrics.
struct LoggingHandler;

impl TickHandler for LoggingHandler {
    fn on_ticks(&mut self, ticks: Vec<Tick>) {
        metrics::record_ticks(&ticks);
        for tick in &ticks {
            tracing::debug!(
                token = tick.instrument_token(),
                mode = %tick.mode(),
                last_price = tick.last_price(),
                "Tick"
            );
        }
    }

    fn on_decode_error(&mut self, error: &CodecError) {
        metrics::record_decode_error(error.kind());
    }
}

/// Log lifecycle events. Returns `true` if the client gave up.
async fn handle_feed_events(
    mut rx: mpsc::UnboundedReceiver<FeedEvent>,
    shutdown_token: CancellationToken,
) -> bool {
    let mut given_up = false;
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Connected => tracing::info!("Ticker feed connected"),
            FeedEvent::Disconnected => tracing::warn!("Ticker feed disconnected"),
            FeedEvent::Reconnecting { attempt } => {
                tracing::info!(attempt, "Ticker feed reconnecting");
            }
            FeedEvent::GivenUp { attempts } => {
                tracing::error!(attempts, "Ticker feed gave up, shutting down");
                given_up = true;
                shutdown_token.cancel();
            }
        }
    }
    given_up
}

/// Log the parsed configuration.
fn log_config(config: &TickerConfig) {
    let connection = &config.connection;
    tracing::info!(
        endpoint = %connection.stream_url,
        tokens = config.subscription.tokens.len(),
        mode = %config.subscription.mode,
        idle_timeout_secs = connection.idle_timeout.as_secs(),
        reconnect_delay_ms = connection.reconnect_delay.as_millis(),
        max_reconnect_attempts = connection.max_reconnect_attempts,
        frame_queue_capacity = connection.frame_queue_capacity,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn await_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping feed");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping feed");
        }
    }
}
