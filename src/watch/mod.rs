//! Poll loop and daemon control for the watchers.
//!
//! One cooperative loop per watcher: evaluate, dispatch each actionable
//! task sequentially, sleep, repeat. Cancellation flows through an explicit
//! token checked at loop, per-task, and per-sleep-second granularity, so a
//! stop signal is honored within about a second. Tick errors are logged and
//! the loop continues; nothing past startup is allowed to kill the daemon.

pub mod sos;
pub mod trips;

pub use sos::SosWatcher;
pub use trips::TripWatcher;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;

/// Delay between consecutive dispatches within one cycle, so a burst of
/// actionable tasks does not hammer downstream services.
pub const DISPATCH_DELAY: Duration = Duration::from_secs(2);

/// Print a timestamped log line to stdout.
pub fn logline(message: &str) {
    println!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
}

/// Print a timestamped warning/error line to stderr.
pub fn logwarn(message: &str) {
    eprintln!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
}

/// Cooperative cancellation handle passed into the loop and checked at
/// every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Arrange for SIGINT/SIGTERM to cancel this token.
    #[cfg(unix)]
    pub fn install_signal_handlers(&self) -> Result<()> {
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&self.flag))?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&self.flag))?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn install_signal_handlers(&self) -> Result<()> {
        Ok(())
    }
}

/// Sleep in one-second increments so cancellation is honored quickly.
pub fn sleep_interruptible(token: &CancelToken, duration: Duration) {
    let mut remaining = duration;
    while remaining > Duration::ZERO && !token.is_cancelled() {
        let step = remaining.min(Duration::from_secs(1));
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

/// A polling watcher: one `tick` is a full evaluate/dispatch cycle.
pub trait Watcher {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Sleep between cycles.
    fn interval(&self) -> Duration;

    /// Run one evaluate/dispatch cycle. Errors are transient: the driver
    /// logs them and keeps polling.
    fn tick(&mut self, token: &CancelToken) -> Result<()>;
}

/// Drive a watcher until the token is cancelled.
pub fn run_loop(watcher: &mut dyn Watcher, token: &CancelToken) {
    logline(&format!(
        "{} watcher started (interval: {}s)",
        watcher.name(),
        watcher.interval().as_secs()
    ));

    while !token.is_cancelled() {
        if let Err(e) = watcher.tick(token) {
            logwarn(&format!("{} cycle error: {:#}", watcher.name(), e));
        }

        if token.is_cancelled() {
            break;
        }

        sleep_interruptible(token, watcher.interval());
    }

    logline(&format!("{} watcher stopped", watcher.name()));
}

/// Run exactly one evaluate/dispatch cycle, bypassing the loop.
///
/// Always returns Ok: a completed cycle is success whether or not anything
/// fired, and transient cycle errors are logged the same way the loop logs
/// them. Startup configuration errors are caught before a watcher is ever
/// constructed.
pub fn run_once(watcher: &mut dyn Watcher) -> Result<()> {
    logline(&format!("Running single {} check...", watcher.name()));
    let token = CancelToken::new();
    if let Err(e) = watcher.tick(&token) {
        logwarn(&format!("{} cycle error: {:#}", watcher.name(), e));
    }
    logline("Check complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct CountingWatcher {
        ticks: usize,
        cancel_after: usize,
        token: CancelToken,
    }

    impl Watcher for CountingWatcher {
        fn name(&self) -> &str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn tick(&mut self, _token: &CancelToken) -> Result<()> {
            self.ticks += 1;
            if self.ticks >= self.cancel_after {
                self.token.cancel();
            }
            Ok(())
        }
    }

    #[test]
    fn test_cancel_token_roundtrip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());

        // Clones observe the same flag
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_sleep_interruptible_returns_early_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        sleep_interruptible(&token, Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_run_loop_stops_on_cancel() {
        let token = CancelToken::new();
        let mut watcher = CountingWatcher {
            ticks: 0,
            cancel_after: 3,
            token: token.clone(),
        };
        run_loop(&mut watcher, &token);
        assert_eq!(watcher.ticks, 3);
    }

    #[test]
    fn test_run_once_is_single_cycle() {
        let token = CancelToken::new();
        let mut watcher = CountingWatcher {
            ticks: 0,
            cancel_after: usize::MAX,
            token,
        };
        run_once(&mut watcher).unwrap();
        assert_eq!(watcher.ticks, 1);
    }

    struct FailingWatcher;

    impl Watcher for FailingWatcher {
        fn name(&self) -> &str {
            "failing"
        }

        fn interval(&self) -> Duration {
            Duration::ZERO
        }

        fn tick(&mut self, _token: &CancelToken) -> Result<()> {
            anyhow::bail!("transient trouble")
        }
    }

    #[test]
    fn test_run_once_swallows_transient_errors() {
        // A cycle error is logged, not propagated: exit code stays zero.
        assert!(run_once(&mut FailingWatcher).is_ok());
    }
}
