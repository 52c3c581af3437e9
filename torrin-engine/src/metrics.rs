use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracking service activity since process start.
///
/// All counters are monotonically increasing and updated with relaxed
/// ordering; readers take a point-in-time [`MetricsSnapshot`].
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    sessions_created: AtomicU64,
    chunks_received: AtomicU64,
    bytes_received: AtomicU64,
    uploads_completed: AtomicU64,
    uploads_canceled: AtomicU64,
    sessions_cleaned: AtomicU64,
}

impl ServiceMetrics {
    pub(crate) fn record_session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_chunk(&self, bytes: u64) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.uploads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_canceled(&self) {
        self.uploads_canceled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cleaned(&self, count: u64) {
        self.sessions_cleaned.fetch_add(count, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            uploads_completed: self.uploads_completed.load(Ordering::Relaxed),
            uploads_canceled: self.uploads_canceled.load(Ordering::Relaxed),
            sessions_cleaned: self.sessions_cleaned.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the service counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sessions_created: u64,
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub uploads_completed: u64,
    pub uploads_canceled: u64,
    pub sessions_cleaned: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = ServiceMetrics::default();
        metrics.record_session_created();
        metrics.record_chunk(1000);
        metrics.record_chunk(500);
        metrics.record_completed();

        let snap = metrics.snapshot();
        assert_eq!(snap.sessions_created, 1);
        assert_eq!(snap.chunks_received, 2);
        assert_eq!(snap.bytes_received, 1500);
        assert_eq!(snap.uploads_completed, 1);
        assert_eq!(snap.uploads_canceled, 0);
    }
}
