//! Per-connection session state and the egress handle.
//!
//! A `Session` is shared between the reader task, the dispatcher task and the
//! writer task of one connection. The world never owns it: a `Player` keeps a
//! cloned [`Outbox`] plus the session id and resolves everything else through
//! the world maps.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique session id.
pub fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} closed")]
    Closed(u64),

    #[error("session {id} egress overflow ({queued} queued)")]
    EgressOverflow { id: u64, queued: usize },

    #[error("frame error: {0}")]
    Frame(#[from] crate::network::FrameError),
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Handshake = 0,
    VersionOk = 1,
    Authenticated = 2,
    InWorld = 3,
    ReturningToSelect = 4,
    Disconnecting = 5,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Handshake,
            1 => Self::VersionOk,
            2 => Self::Authenticated,
            3 => Self::InWorld,
            4 => Self::ReturningToSelect,
            _ => Self::Disconnecting,
        }
    }
}

#[derive(Debug)]
struct CloseSignal {
    closed: AtomicBool,
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(false);
        Arc::new(Self { closed: AtomicBool::new(false), tx })
    }

    /// Returns true only for the call that actually closed.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.tx.send_replace(true);
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Cloneable, lock-free egress handle. Packets are plaintext payloads; the
/// writer task enciphers and frames them.
#[derive(Debug, Clone)]
pub struct Outbox {
    session_id: u64,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    queued: Arc<AtomicUsize>,
    limit: usize,
    signal: Arc<CloseSignal>,
}

pub struct OutboxReceiver {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    queued: Arc<AtomicUsize>,
}

impl Outbox {
    fn with_signal(session_id: u64, limit: usize, signal: Arc<CloseSignal>) -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        (
            Self { session_id, tx, queued: Arc::clone(&queued), limit, signal },
            OutboxReceiver { rx, queued },
        )
    }

    /// Standalone outbox not tied to a socket. Used by world-level tests and
    /// tooling that drive handlers without a connection.
    pub fn detached(session_id: u64) -> (Self, OutboxReceiver) {
        Self::with_signal(session_id, usize::MAX, CloseSignal::new())
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Queues a packet. A client that stops draining its socket gets
    /// disconnected once `limit` packets are pending.
    pub fn send(&self, pkt: Vec<u8>) {
        if self.signal.is_closed() {
            return;
        }
        let queued = self.queued.fetch_add(1, Ordering::AcqRel) + 1;
        if queued > self.limit {
            let err = SessionError::EgressOverflow { id: self.session_id, queued };
            tracing::warn!("[session] [egress_overflow] {}", err);
            self.signal.close();
            return;
        }
        if self.tx.send(pkt).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.signal.is_closed()
    }
}

impl OutboxReceiver {
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let pkt = self.rx.recv().await?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Some(pkt)
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        let pkt = self.rx.try_recv().ok()?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Some(pkt)
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(pkt) = self.try_recv() {
            out.push(pkt);
        }
        out
    }
}

pub struct Session {
    pub id: u64,
    pub peer: String,
    state: AtomicU8,
    account: Mutex<Option<String>>,
    outbox: Outbox,
    signal: Arc<CloseSignal>,
}

impl Session {
    pub fn new(id: u64, peer: String, out_limit: usize) -> (Arc<Self>, OutboxReceiver) {
        let signal = CloseSignal::new();
        let (outbox, rx) = Outbox::with_signal(id, out_limit, Arc::clone(&signal));
        let sess = Arc::new(Self {
            id,
            peer,
            state: AtomicU8::new(SessionState::Handshake as u8),
            account: Mutex::new(None),
            outbox,
            signal,
        });
        (sess, rx)
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn account(&self) -> Option<String> {
        self.account.lock().map(|a| a.clone()).unwrap_or(None)
    }

    pub fn set_account(&self, name: Option<String>) {
        if let Ok(mut a) = self.account.lock() {
            *a = name;
        }
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    pub fn send(&self, pkt: Vec<u8>) {
        self.outbox.send(pkt);
    }

    /// Idempotent. Returns true for the first caller only, who owns cleanup.
    pub fn close(&self) -> bool {
        let first = self.signal.close();
        if first {
            self.set_state(SessionState::Disconnecting);
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.signal.is_closed()
    }

    /// Resolves when the session is closed from any side.
    pub fn closed_watch(&self) -> watch::Receiver<bool> {
        self.signal.tx.subscribe()
    }
}

/// Waits until `rx` observes the close flag.
pub async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let (sess, _rx) = Session::new(next_session_id(), "127.0.0.1:1".into(), 16);
        assert_eq!(sess.state(), SessionState::Handshake);
        sess.set_state(SessionState::InWorld);
        assert_eq!(sess.state(), SessionState::InWorld);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (sess, _rx) = Session::new(next_session_id(), "peer".into(), 16);
        assert!(sess.close());
        assert!(!sess.close());
        assert!(sess.is_closed());
        assert_eq!(sess.state(), SessionState::Disconnecting);
    }

    #[test]
    fn test_outbox_overflow_closes() {
        let (sess, mut rx) = Session::new(next_session_id(), "peer".into(), 2);
        sess.send(vec![1]);
        sess.send(vec![2]);
        assert!(!sess.is_closed());
        sess.send(vec![3]);
        assert!(sess.is_closed());
        assert_eq!(rx.drain().len(), 2);
    }

    #[test]
    fn test_send_after_close_dropped() {
        let (outbox, mut rx) = Outbox::detached(9);
        outbox.send(vec![8]);
        outbox.signal.close();
        outbox.send(vec![9]);
        assert_eq!(rx.drain(), vec![vec![8]]);
    }

    #[tokio::test]
    async fn test_closed_watch_wakes() {
        let (sess, _rx) = Session::new(next_session_id(), "peer".into(), 4);
        let mut w = sess.closed_watch();
        let s2 = Arc::clone(&sess);
        tokio::spawn(async move { s2.close() });
        wait_closed(&mut w).await;
        assert!(sess.is_closed());
    }
}
