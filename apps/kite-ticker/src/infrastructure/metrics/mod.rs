//! Prometheus Metrics Module
//!
//! Exposes feed client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: frames received, heartbeats dropped, frames dropped on a
//!   full queue, frame queue depth
//! - **Ticks**: ticks decoded by mode, decode errors by kind
//! - **Connection**: connection state, reconnect attempts, watchdog expiries
//!
//! Recording functions are no-ops until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;
use crate::domain::ticks::{Mode, Tick};

// =============================================================================
// Installation
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Error type for metrics installation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install the Prometheus exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Install the Prometheus recorder.
///
/// With a listen address, an HTTP listener serving `/metrics` is started on
/// the current tokio runtime. Without one, the recorder is installed and the
/// handle kept for [`render_metrics`].
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot bind.
pub fn init_metrics(listen_addr: Option<SocketAddr>) -> Result<(), MetricsError> {
    let builder = PrometheusBuilder::new();

    match listen_addr {
        Some(addr) => {
            builder
                .with_http_listener(addr)
                .install()
                .map_err(|e| MetricsError::Installation(e.to_string()))?;
            tracing::info!(%addr, "Prometheus metrics exporter started");
        }
        None => {
            let handle = builder
                .install_recorder()
                .map_err(|e| MetricsError::Installation(e.to_string()))?;
            let _ = PROMETHEUS_HANDLE.set(handle);
            tracing::debug!("Prometheus recorder installed without listener");
        }
    }

    register_metrics();
    Ok(())
}

/// Render the current metrics in Prometheus text format.
///
/// Returns `None` unless the recorder was installed without a listener.
#[must_use]
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metrics() {
    describe_counter!(
        "kite_ticker_frames_received_total",
        "Total binary frames enqueued for consumers"
    );
    describe_counter!(
        "kite_ticker_heartbeats_total",
        "Total keepalive messages of one byte or less"
    );
    describe_counter!(
        "kite_ticker_frames_dropped_total",
        "Total frames dropped because the bounded frame queue was full"
    );
    describe_gauge!(
        "kite_ticker_frame_queue_depth",
        "Frames waiting in the queue for a consumer"
    );

    describe_counter!(
        "kite_ticker_ticks_decoded_total",
        "Total ticks decoded by mode"
    );
    describe_counter!(
        "kite_ticker_decode_errors_total",
        "Total frames discarded as malformed, by error kind"
    );

    describe_gauge!(
        "kite_ticker_connection_state",
        "Current connection state (0 disconnected, 1 connecting, 2 connected, 3 reconnecting, 4 given up)"
    );
    describe_counter!(
        "kite_ticker_reconnects_total",
        "Total reconnection attempts scheduled"
    );
    describe_counter!(
        "kite_ticker_watchdog_expiries_total",
        "Total idle timeouts that forced a reconnect"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame handed to the queue.
pub fn record_frame_received() {
    counter!("kite_ticker_frames_received_total").increment(1);
}

/// Record a dropped keepalive message.
pub fn record_heartbeat() {
    counter!("kite_ticker_heartbeats_total").increment(1);
}

/// Record a frame dropped on a full queue.
pub fn record_frame_dropped() {
    counter!("kite_ticker_frames_dropped_total").increment(1);
}

/// Update the frame queue depth.
#[allow(clippy::cast_precision_loss)]
pub fn set_frame_queue_depth(depth: usize) {
    gauge!("kite_ticker_frame_queue_depth").set(depth as f64);
}

/// Record decoded ticks.
pub fn record_ticks_decoded(mode: Mode, count: u64) {
    counter!(
        "kite_ticker_ticks_decoded_total",
        "mode" => mode.as_str()
    )
    .increment(count);
}

/// Record one decoded frame's ticks, counted per mode.
pub fn record_ticks(ticks: &[Tick]) {
    for mode in Mode::all() {
        let count = ticks.iter().filter(|t| t.mode() == *mode).count();
        if count > 0 {
            record_ticks_decoded(*mode, count as u64);
        }
    }
}

/// Record a discarded frame.
pub fn record_decode_error(kind: &'static str) {
    counter!(
        "kite_ticker_decode_errors_total",
        "kind" => kind
    )
    .increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("kite_ticker_connection_state").set(state_value(state));
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("kite_ticker_reconnects_total").increment(1);
}

/// Record a watchdog expiry.
pub fn record_watchdog_expiry() {
    counter!("kite_ticker_watchdog_expiries_total").increment(1);
}

const fn state_value(state: ConnectionState) -> f64 {
    match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
        ConnectionState::Reconnecting => 3.0,
        ConnectionState::GivenUp => 4.0,
    }
}

// =============================================================================
// Tests
// =============================================================================
