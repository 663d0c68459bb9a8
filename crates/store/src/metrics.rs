/// Store metrics.
///
/// Counters only, monotonically increasing for the lifetime of a `Store`.
/// Every `Reader` and `Writer` shares the store's [`MetricsRecorder`] and
/// updates it with relaxed atomics; [`Metrics`] is the plain snapshot handed
/// to callers.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Immutable snapshot of a store's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub write: WriteMetrics,
    pub read: ReadMetrics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteMetrics {
    /// Writers opened.
    pub writer_calls: u64,
    /// Bytes accepted by writers, including aborted ones.
    pub total_bytes_written: u64,
    /// Versions made visible.
    pub commits: u64,
    /// Writers aborted explicitly, on drop, or after an error.
    pub aborts: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadMetrics {
    /// Readers opened.
    pub reader_calls: u64,
    /// Bytes delivered to callers.
    pub total_bytes_read: u64,
    /// Wall time spent inside `read` and `close`.
    pub total_time: Duration,
    /// Checksum mismatches detected.
    pub verification_failures: u64,
}

/// Shared, thread-safe counters behind [`Metrics`].
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    writer_calls: AtomicU64,
    bytes_written: AtomicU64,
    commits: AtomicU64,
    aborts: AtomicU64,
    reader_calls: AtomicU64,
    bytes_read: AtomicU64,
    read_nanos: AtomicU64,
    verification_failures: AtomicU64,
}

impl MetricsRecorder {
    pub fn writer_opened(&self) {
        self.writer_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn committed(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn aborted(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reader_opened(&self) {
        self.reader_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_read_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.read_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn verification_failed(&self) {
        self.verification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Metrics {
        Metrics {
            write: WriteMetrics {
                writer_calls: self.writer_calls.load(Ordering::Relaxed),
                total_bytes_written: self.bytes_written.load(Ordering::Relaxed),
                commits: self.commits.load(Ordering::Relaxed),
                aborts: self.aborts.load(Ordering::Relaxed),
            },
            read: ReadMetrics {
                reader_calls: self.reader_calls.load(Ordering::Relaxed),
                total_bytes_read: self.bytes_read.load(Ordering::Relaxed),
                total_time: Duration::from_nanos(self.read_nanos.load(Ordering::Relaxed)),
                verification_failures: self.verification_failures.load(Ordering::Relaxed),
            },
        }
    }
}
