//! Idle Watchdog
//!
//! Detects a connection that has gone silent. Every inbound message resets
//! the countdown; if the idle window passes without a reset, the expiry
//! callback runs once and the countdown stays stopped until the next reset
//! or enable.
//!
//! The watchdog never reconnects by itself. The connection manager's
//! callback force-closes the link, which takes the normal reconnect path.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for the idle watchdog.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Maximum silence before the watchdog fires.
    pub idle_window: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            idle_window: Duration::from_secs(5),
        }
    }
}

impl WatchdogConfig {
    /// Create a new configuration with a custom idle window.
    #[must_use]
    pub const fn new(idle_window: Duration) -> Self {
        Self { idle_window }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchdogCommand {
    Enable,
    Reset,
    Disable,
}

/// Handle to a running watchdog task.
///
/// Cheap to clone and usable from any thread, inside or outside the tokio
/// runtime. The task stops when every handle is dropped or the cancellation
/// token fires.
///
/// # Example
///
/// ```rust,no_run
/// use kite_ticker::infrastructure::kite::watchdog::{Watchdog, WatchdogConfig};
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let watchdog = Watchdog::spawn(
///         WatchdogConfig::default(),
///         || tracing::warn!("feed went silent"),
///         CancellationToken::new(),
///     );
///
///     watchdog.enable();
///     // On every inbound message:
///     watchdog.reset();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Watchdog {
    commands: mpsc::UnboundedSender<WatchdogCommand>,
}

impl Watchdog {
    /// Spawn the watchdog task. It starts disabled.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F>(config: WatchdogConfig, on_expire: F, cancel: CancellationToken) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = WatchdogTask {
            idle_window: config.idle_window,
            commands: rx,
            on_expire,
            cancel,
            armed: false,
            deadline: None,
        };
        tokio::spawn(task.run());
        Self { commands }
    }

    /// Arm the expiry callback and start the countdown.
    ///
    /// Idempotent: while a countdown is running this changes nothing.
    pub fn enable(&self) {
        self.send(WatchdogCommand::Enable);
    }

    /// Restart the countdown without firing. Ignored while disabled.
    pub fn reset(&self) {
        self.send(WatchdogCommand::Reset);
    }

    /// Stop the countdown and disarm the callback.
    pub fn disable(&self) {
        self.send(WatchdogCommand::Disable);
    }

    fn send(&self, command: WatchdogCommand) {
        if self.commands.send(command).is_err() {
            tracing::trace!(?command, "Watchdog task stopped, command ignored");
        }
    }
}

struct WatchdogTask<F> {
    idle_window: Duration,
    commands: mpsc::UnboundedReceiver<WatchdogCommand>,
    on_expire: F,
    cancel: CancellationToken,
    armed: bool,
    deadline: Option<Instant>,
}

impl<F> WatchdogTask<F>
where
    F: Fn() + Send + 'static,
{
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Watchdog cancelled");
                    break;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("Watchdog handles dropped, stopping");
                        break;
                    };
                    self.apply(command);
                }
                () = sleep_until(deadline) => {
                    self.deadline = None;
                    tracing::debug!(
                        idle_ms = self.idle_window.as_millis(),
                        "Watchdog expired"
                    );
                    (self.on_expire)();
                }
            }
        }
    }

    fn apply(&mut self, command: WatchdogCommand) {
        match command {
            WatchdogCommand::Enable => {
                self.armed = true;
                if self.deadline.is_none() {
                    self.restart();
                }
            }
            WatchdogCommand::Reset => {
                if self.armed {
                    self.restart();
                }
            }
            WatchdogCommand::Disable => {
                self.armed = false;
                self.deadline = None;
            }
        }
    }

    fn restart(&mut self) {
        self.deadline = Some(Instant::now() + self.idle_window);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn spawn_recording(window: Duration) -> (Watchdog, Arc<Mutex<Vec<Instant>>>, CancellationToken) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let cancel = CancellationToken::new();
        let watchdog = Watchdog::spawn(
            WatchdogConfig::new(window),
            move || sink.lock().push(Instant::now()),
            cancel.clone(),
        );
        (watchdog, fired, cancel)
    }

    #[test]
    fn default_config_values() {
        assert_eq!(WatchdogConfig::default().idle_window, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn regular_resets_keep_it_quiet_then_it_fires_once() {
        let window = Duration::from_millis(200);
        let (watchdog, fired, cancel) = spawn_recording(window);

        watchdog.enable();
        let mut last_reset = Instant::now();
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            watchdog.reset();
            last_reset = Instant::now();
        }
        assert!(fired.lock().is_empty(), "must not fire while reset every 100ms");

        tokio::time::sleep(Duration::from_secs(2)).await;

        let fired = fired.lock().clone();
        assert_eq!(fired.len(), 1, "fires exactly once after resets stop");
        let elapsed = fired[0] - last_reset;
        assert!(elapsed >= window, "fired too early: {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(250), "fired too late: {elapsed:?}");

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn not_started_until_enabled() {
        let (watchdog, fired, cancel) = spawn_recording(Duration::from_millis(50));

        watchdog.reset();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().is_empty());

        watchdog.enable();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.lock().len(), 1);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn double_enable_does_not_double_fire() {
        let (watchdog, fired, cancel) = spawn_recording(Duration::from_millis(50));

        watchdog.enable();
        watchdog.enable();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.lock().len(), 1);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn reset_after_expiry_restarts_countdown() {
        let (watchdog, fired, cancel) = spawn_recording(Duration::from_millis(50));

        watchdog.enable();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.lock().len(), 1);

        watchdog.reset();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.lock().len(), 2);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn disable_stops_countdown_and_disarms() {
        let (watchdog, fired, cancel) = spawn_recording(Duration::from_millis(50));

        watchdog.enable();
        tokio::time::sleep(Duration::from_millis(20)).await;
        watchdog.disable();
        watchdog.reset();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().is_empty());

        cancel.cancel();
    }

    #[tokio::test]
    async fn usable_after_task_stops() {
        let (watchdog, _fired, cancel) = spawn_recording(Duration::from_millis(50));
        cancel.cancel();
        tokio::task::yield_now().await;

        // Commands to a stopped task are dropped quietly.
        watchdog.enable();
        watchdog.reset();
        watchdog.disable();
    }
}
