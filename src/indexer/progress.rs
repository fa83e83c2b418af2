use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Shared view of a running analysis. Cloning hands out another handle to
/// the same counters; workers update them without locking.
#[derive(Clone, Default)]
pub struct IndexingProgress {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    files_total: AtomicUsize,
    files_processed: AtomicUsize,
    files_failed: AtomicUsize,
    functions_extracted: AtomicUsize,
    is_active: AtomicBool,
    started_at_ms: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub is_active: bool,
    pub files_total: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub functions_extracted: usize,
    pub elapsed_ms: u64,
    pub progress_pct: f64,
}

impl IndexingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, total_files: usize) {
        self.inner.files_total.store(total_files, Ordering::Release);
        self.inner.files_processed.store(0, Ordering::Release);
        self.inner.files_failed.store(0, Ordering::Release);
        self.inner.functions_extracted.store(0, Ordering::Release);
        self.inner.started_at_ms.store(now_ms(), Ordering::Release);
        self.inner.is_active.store(true, Ordering::Release);
    }

    pub fn inc(&self, functions: usize) {
        self.inner.files_processed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .functions_extracted
            .fetch_add(functions, Ordering::Relaxed);
    }

    pub fn inc_error(&self) {
        self.inner.files_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.inner.is_active.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let is_active = self.inner.is_active.load(Ordering::Acquire);
        let files_total = self.inner.files_total.load(Ordering::Acquire);
        let files_processed = self.inner.files_processed.load(Ordering::Acquire);

        let started = self.inner.started_at_ms.load(Ordering::Acquire);
        let elapsed_ms = if started == 0 {
            0
        } else {
            now_ms().saturating_sub(started)
        };

        let progress_pct = if files_total > 0 {
            (files_processed as f64 / files_total as f64) * 100.0
        } else {
            0.0
        };

        ProgressSnapshot {
            is_active,
            files_total,
            files_processed,
            files_failed: self.inner.files_failed.load(Ordering::Acquire),
            functions_extracted: self.inner.functions_extracted.load(Ordering::Acquire),
            elapsed_ms,
            progress_pct,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_snapshot() {
        let progress = IndexingProgress::new();
        let snapshot = progress.snapshot();
        assert!(!snapshot.is_active);
        assert_eq!(snapshot.files_total, 0);
        assert_eq!(snapshot.elapsed_ms, 0);
        assert_eq!(snapshot.progress_pct, 0.0);
    }

    #[test]
    fn test_counts_shared_between_clones() {
        let progress = IndexingProgress::new();
        let worker = progress.clone();

        progress.start(4);
        worker.inc(3);
        worker.inc(2);
        worker.inc_error();

        let snapshot = progress.snapshot();
        assert!(snapshot.is_active);
        assert_eq!(snapshot.files_processed, 3);
        assert_eq!(snapshot.files_failed, 1);
        assert_eq!(snapshot.functions_extracted, 5);
        assert_eq!(snapshot.progress_pct, 75.0);

        progress.finish();
        assert!(!worker.snapshot().is_active);
    }

    #[test]
    fn test_start_resets_counters() {
        let progress = IndexingProgress::new();
        progress.start(1);
        progress.inc(10);
        progress.start(2);

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.files_total, 2);
        assert_eq!(snapshot.files_processed, 0);
        assert_eq!(snapshot.functions_extracted, 0);
    }
}
