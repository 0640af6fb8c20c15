use std::sync::{Arc, RwLock};

/// Counters for the sync worker's traffic with the message store.
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    pub polls: u64,
    pub poll_failures: u64,
    pub records_received: u64,
    pub sends: u64,
    pub send_failures: u64,
    pub deletes: u64,
    /// Millisecond timestamp of the last successful poll cycle.
    pub last_success_ms: Option<u64>,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll(&mut self, fetched: usize, now_ms: u64) {
        self.polls += 1;
        self.records_received += fetched as u64;
        self.last_success_ms = Some(now_ms);
    }

    pub fn record_poll_failure(&mut self) {
        self.poll_failures += 1;
    }

    pub fn record_send(&mut self, ok: bool) {
        if ok {
            self.sends += 1;
        } else {
            self.send_failures += 1;
        }
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }
}

/// Thread-safe wrapper for sync stats, shared between the worker and
/// whoever renders diagnostics.
#[derive(Debug, Clone)]
pub struct SharedSyncStats {
    inner: Arc<RwLock<SyncStats>>,
}

impl Default for SharedSyncStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSyncStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SyncStats::new())),
        }
    }

    pub fn record_poll(&self, fetched: usize, now_ms: u64) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_poll(fetched, now_ms);
        }
    }

    pub fn record_poll_failure(&self) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_poll_failure();
        }
    }

    pub fn record_send(&self, ok: bool) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_send(ok);
        }
    }

    pub fn record_delete(&self) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_delete();
        }
    }

    pub fn snapshot(&self) -> SyncStats {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }
}
