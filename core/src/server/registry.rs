// Client registry — the shared directory mapping registered names to sessions

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Process-unique identity of one accepted connection.
///
/// Disconnect cleanup is identity-guarded with this: a session that already
/// lost its name to a later registrant must not evict that registrant on the
/// way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Routing handle for one live session.
///
/// Holds the session's identity and the sending end of its outbound queue,
/// never the session itself. A handle cannot keep a finished session's
/// socket or tasks alive; enqueueing to a dead session simply fails.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl SessionHandle {
    pub fn new(id: SessionId, outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Hand one complete frame to the session's outbound writer.
    ///
    /// Returns `false` when the writer is already gone. Frames are drained
    /// one at a time on the receiving side, so concurrent callers can never
    /// interleave bytes on the target's connection.
    pub fn forward(&self, frame: Vec<u8>) -> bool {
        self.outbound.send(frame).is_ok()
    }
}

/// Name-to-session directory shared by every session on the relay.
///
/// One mutex guards the whole map. Every critical section is a handful of
/// map operations and nothing here ever suspends, so the lock is never held
/// across an await point.
#[derive(Debug, Default)]
pub struct Registry {
    clients: Mutex<HashMap<String, SessionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the mapping for `name`. Last write wins; an
    /// earlier holder of the name is not notified.
    pub fn register(&self, name: String, handle: SessionHandle) {
        self.clients.lock().insert(name, handle);
    }

    /// Remove the mapping for `name` if present. No-op otherwise.
    pub fn unregister(&self, name: &str) {
        self.clients.lock().remove(name);
    }

    /// Current mapping for `name`. A miss is a normal outcome (receiver
    /// offline), not an error.
    pub fn lookup(&self, name: &str) -> Option<SessionHandle> {
        self.clients.lock().get(name).cloned()
    }

    /// Drop every entry still pointing at session `id`.
    ///
    /// Called on session teardown. Names the session once held but has since
    /// lost to another registrant no longer point at `id` and stay put.
    pub fn remove_session(&self, id: SessionId) {
        self.clients.lock().retain(|_, handle| handle.id() != id);
    }

    /// Number of currently registered names.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
