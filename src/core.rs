//! Core server functionality
//!
//! This module provides:
//! - Tick cadence constants shared by the scheduler and the systems
//! - Shutdown signalling between the accept loop, the scheduler and sessions
//! - The termination callback run once on shutdown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

/// World tick length in milliseconds.
pub const TICK_MS: u64 = 200;

/// World tick as a Duration for convenience
pub const TICK: Duration = Duration::from_millis(TICK_MS);

/// Ticks per second of game time.
pub const TICKS_PER_SEC: u32 = (1000 / TICK_MS) as u32;

/// The visibility diff runs every this many ticks (400 ms).
pub const VISIBILITY_TICKS: u64 = 2;

/// How long the scheduler may keep running after shutdown is requested.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

/// Converts seconds of game time into scheduler ticks.
pub fn secs_to_ticks(secs: u32) -> u32 {
    secs.saturating_mul(TICKS_PER_SEC)
}

/// Type alias for termination callback functions
/// These are called when the server receives SIGTERM/SIGINT
pub type TermFunc = Box<dyn Fn() + Send + Sync + 'static>;

/// Process-wide run state. Cloning shares the same flag.
#[derive(Clone)]
pub struct ServerState {
    shutdown: Arc<AtomicBool>,
    tx: Arc<watch::Sender<bool>>,
    term_func: Arc<Mutex<Option<TermFunc>>>,
}

impl ServerState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        ServerState {
            shutdown: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
            term_func: Arc::new(Mutex::new(None)),
        }
    }

    /// Request server shutdown. The first caller also runs the term func.
    pub fn request_shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.tx.send_replace(true);
        self.call_term_func();
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn set_term_func<F>(&self, func: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.term_func.lock() {
            *slot = Some(Box::new(func));
        }
    }

    fn call_term_func(&self) {
        if let Ok(slot) = self.term_func.lock() {
            if let Some(ref func) = *slot {
                func();
            }
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Signals that can trigger server shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM (graceful shutdown)
    Terminate,
}

/// Resolves on the first Ctrl+C or SIGTERM.
pub async fn wait_for_signal() -> Signal {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => Signal::Interrupt,
                    _ = term.recv() => Signal::Terminate,
                }
            }
            Err(e) => {
                tracing::warn!("[core] [signal] SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                Signal::Interrupt
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        Signal::Interrupt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_state_creation() {
        let state = ServerState::new();
        assert!(!state.should_shutdown());
    }

    #[test]
    fn test_server_state_shutdown_shared() {
        let state = ServerState::new();
        let clone = state.clone();
        state.request_shutdown();
        assert!(clone.should_shutdown());
        assert!(*clone.subscribe().borrow());
    }

    #[test]
    fn test_term_func_runs_once() {
        use std::sync::atomic::AtomicUsize;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let state = ServerState::new();
        state.set_term_func(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        state.request_shutdown();
        state.request_shutdown();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_constants() {
        assert_eq!(TICK, Duration::from_millis(200));
        assert_eq!(TICKS_PER_SEC, 5);
        assert_eq!(secs_to_ticks(1800), 9000);
        assert_eq!(VISIBILITY_TICKS * TICK_MS, 400);
    }
}
