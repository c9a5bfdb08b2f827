//! Shutdown on SIGINT, SIGTERM and SIGHUP
//!
//! The mount command runs the FUSE session in the background and parks the
//! main thread in [`ShutdownSignal::wait`]. A signal flips the flag, `wait`
//! returns, and dropping the session unmounts.
//!
//! ```text
//!   SIGINT / SIGTERM / SIGHUP
//!              │ signal-hook (handler touches atomics only)
//!              ▼
//!        ShutdownSignal ──► wait() returns ──► drop(BackgroundSession)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use lockerfs::signal::{install_signal_handlers, ShutdownSignal};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let shutdown = Arc::new(ShutdownSignal::new());
//! install_signal_handlers(shutdown.clone()).expect("signal handlers");
//! shutdown.wait(Duration::from_millis(200));
//! println!("got {}", shutdown.signal_name());
//! ```

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

/// Polling interval used by the mount command
pub const DEFAULT_POLL: Duration = Duration::from_millis(200);

/// Set once a shutdown has been requested
#[derive(Debug)]
pub struct ShutdownSignal {
    signaled: AtomicBool,
    /// The signal that triggered shutdown (0 if none, or programmatic)
    signal_num: AtomicI32,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            signaled: AtomicBool::new(false),
            signal_num: AtomicI32::new(0),
        }
    }

    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    pub fn signal_number(&self) -> i32 {
        self.signal_num.load(Ordering::Acquire)
    }

    /// Request shutdown; `signal_num` 0 means "not from a signal"
    pub fn trigger(&self, signal_num: i32) {
        self.signal_num.store(signal_num, Ordering::Release);
        self.signaled.store(true, Ordering::Release);
    }

    pub fn signal_name(&self) -> &'static str {
        match self.signal_number() {
            SIGINT => "SIGINT",
            SIGTERM => "SIGTERM",
            SIGHUP => "SIGHUP",
            0 => "none",
            _ => "unknown",
        }
    }

    /// Block until shutdown is requested, checking every `poll`
    pub fn wait(&self, poll: Duration) {
        while !self.is_signaled() {
            thread::sleep(poll);
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Route SIGINT, SIGTERM and SIGHUP to `shutdown`
pub fn install_signal_handlers(shutdown: Arc<ShutdownSignal>) -> std::io::Result<()> {
    for signal in [SIGINT, SIGTERM, SIGHUP] {
        let shutdown = shutdown.clone();
        // SAFETY: the handler only stores to atomics, which is async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, move || shutdown.trigger(signal))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_initial_state() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_signaled());
        assert_eq!(signal.signal_number(), 0);
        assert_eq!(signal.signal_name(), "none");
    }

    #[test]
    fn test_trigger_records_signal() {
        let signal = ShutdownSignal::new();
        signal.trigger(SIGTERM);
        assert!(signal.is_signaled());
        assert_eq!(signal.signal_name(), "SIGTERM");
    }

    #[test]
    fn test_wait_returns_after_trigger() {
        let signal = Arc::new(ShutdownSignal::new());
        let trigger = signal.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.trigger(SIGHUP);
        });
        signal.wait(Duration::from_millis(5));
        handle.join().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(signal.signal_name(), "SIGHUP");
    }

    #[test]
    fn test_wait_when_already_signaled() {
        let signal = ShutdownSignal::new();
        signal.trigger(0);
        signal.wait(Duration::from_secs(60));
        assert_eq!(signal.signal_name(), "none");
    }
}
