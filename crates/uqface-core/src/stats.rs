//! Connection and request counters, reported to stderr on `SIGHUP`.
//!
//! The five counters are plain `u64`s behind one lock so a report always
//! reflects a single consistent instant rather than five independently-read
//! values. `snapshot()` copies them out before any formatting happens, so
//! the report is never built while holding the lock.
//!
//! Invariant: at any quiescent moment, `current_clients + completed_clients`
//! equals the number of connections ever accepted. `current_clients` only
//! decrements when a worker terminates.

use std::sync::Mutex;

/// The five counters, copied out of the lock for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub current_clients: u64,
    pub completed_clients: u64,
    pub face_detect_ok: u64,
    pub face_replace_ok: u64,
    pub malformed_requests: u64,
}

#[derive(Debug, Default)]
struct StatsInner {
    current_clients: u64,
    completed_clients: u64,
    face_detect_ok: u64,
    face_replace_ok: u64,
    malformed_requests: u64,
}

/// Process-wide counters, shared via `Arc` across every connection task.
#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<StatsInner>,
}

impl Stats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted connection.
    pub fn client_connected(&self) {
        self.with_inner(|s| s.current_clients += 1);
    }

    /// Record a worker terminating: moves one client from current to
    /// completed, preserving `current_clients + completed_clients`.
    pub fn client_completed(&self) {
        self.with_inner(|s| {
            s.current_clients = s.current_clients.saturating_sub(1);
            s.completed_clients += 1;
        });
    }

    /// Record a detect (or replace) request that found at least one face.
    pub fn face_detect_ok(&self) {
        self.with_inner(|s| s.face_detect_ok += 1);
    }

    /// Record a replace request that composited at least one face.
    pub fn face_replace_ok(&self) {
        self.with_inner(|s| s.face_replace_ok += 1);
    }

    /// Record a request rejected for protocol or image-format reasons.
    pub fn malformed_request(&self) {
        self.with_inner(|s| s.malformed_requests += 1);
    }

    /// Copy out the current counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        StatsSnapshot {
            current_clients: inner.current_clients,
            completed_clients: inner.completed_clients,
            face_detect_ok: inner.face_detect_ok,
            face_replace_ok: inner.face_replace_ok,
            malformed_requests: inner.malformed_requests,
        }
    }

    fn with_inner(&self, f: impl FnOnce(&mut StatsInner)) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut inner);
    }
}

impl StatsSnapshot {
    /// Render the five report lines, in the fixed order and wording the
    /// protocol requires. Each line is `\n`-terminated; the caller writes
    /// the joined string directly to stderr, bypassing the tracing
    /// formatter, since this exact text is a contract scripts may scrape.
    #[must_use]
    pub fn report_lines(&self) -> String {
        format!(
            "Num clients connected: {}\nClients completed: {}\nFace detect requests: {}\nFace replace requests: {}\nMalformed requests: {}\n",
            self.current_clients,
            self.completed_clients,
            self.face_detect_ok,
            self.face_replace_ok,
            self.malformed_requests,
        )
    }
}
