use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

use index::EmitReport;
use ontology::ValidationReport;

/// Run counters. Workers and the coordinator record into the same instance.
pub struct RunStats {
    started: Instant,

    chunks_total: AtomicUsize,
    chunks_skipped: AtomicUsize,
    chunks_processed: AtomicUsize,
    chunks_failed: AtomicUsize,
    batches: AtomicUsize,

    entities_accepted: AtomicUsize,
    entities_new: AtomicUsize,
    relationships_accepted: AtomicUsize,
    entities_rejected: AtomicUsize,
    relationships_rejected: AtomicUsize,
    persistence_errors: AtomicUsize,
    cancelled: AtomicBool,

    // Timing (in microseconds)
    total_extract_time_us: AtomicU64,
    extract_calls: AtomicUsize,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            chunks_total: AtomicUsize::new(0),
            chunks_skipped: AtomicUsize::new(0),
            chunks_processed: AtomicUsize::new(0),
            chunks_failed: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            entities_accepted: AtomicUsize::new(0),
            entities_new: AtomicUsize::new(0),
            relationships_accepted: AtomicUsize::new(0),
            entities_rejected: AtomicUsize::new(0),
            relationships_rejected: AtomicUsize::new(0),
            persistence_errors: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            total_extract_time_us: AtomicU64::new(0),
            extract_calls: AtomicUsize::new(0),
        }
    }

    pub fn record_plan(&self, total: usize, skipped: usize) {
        self.chunks_total.store(total, Ordering::Relaxed);
        self.chunks_skipped.store(skipped, Ordering::Relaxed);
    }

    pub fn record_extract(&self, duration: Duration) {
        self.total_extract_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.extract_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation(&self, report: &ValidationReport) {
        self.entities_rejected
            .fetch_add(report.entities_rejected, Ordering::Relaxed);
        self.relationships_rejected
            .fetch_add(report.relationships_rejected, Ordering::Relaxed);
    }

    /// A batch whose output reached the graph store.
    pub fn record_batch(&self, chunks: usize, failed: usize, entities: usize, relationships: usize, emit: &EmitReport) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.chunks_processed.fetch_add(chunks, Ordering::Relaxed);
        self.chunks_failed.fetch_add(failed, Ordering::Relaxed);
        self.entities_accepted.fetch_add(entities, Ordering::Relaxed);
        self.entities_new.fetch_add(emit.entities_new, Ordering::Relaxed);
        self.relationships_accepted
            .fetch_add(relationships, Ordering::Relaxed);
    }

    pub fn record_persistence_error(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn chunks_processed(&self) -> usize {
        self.chunks_processed.load(Ordering::Relaxed)
    }

    pub fn entities_accepted(&self) -> usize {
        self.entities_accepted.load(Ordering::Relaxed)
    }

    pub fn relationships_accepted(&self) -> usize {
        self.relationships_accepted.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn summary(&self, run_id: Uuid) -> RunSummary {
        let calls = self.extract_calls.load(Ordering::Relaxed);
        let avg_extract_ms = if calls > 0 {
            self.total_extract_time_us.load(Ordering::Relaxed) as f64 / calls as f64 / 1000.0
        } else {
            0.0
        };

        RunSummary {
            run_id,
            chunks_total: self.chunks_total.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            entities_accepted: self.entities_accepted.load(Ordering::Relaxed),
            entities_new: self.entities_new.load(Ordering::Relaxed),
            relationships_accepted: self.relationships_accepted.load(Ordering::Relaxed),
            entities_rejected: self.entities_rejected.load(Ordering::Relaxed),
            relationships_rejected: self.relationships_rejected.load(Ordering::Relaxed),
            persistence_errors: self.persistence_errors.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            avg_extract_ms,
            elapsed_secs: self.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub chunks_total: usize,
    pub chunks_skipped: usize,
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub batches: usize,
    pub entities_accepted: usize,
    pub entities_new: usize,
    pub relationships_accepted: usize,
    pub entities_rejected: usize,
    pub relationships_rejected: usize,
    pub persistence_errors: usize,
    pub cancelled: bool,
    pub avg_extract_ms: f64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_accumulates() {
        let stats = RunStats::new();
        stats.record_plan(10, 4);
        stats.record_extract(Duration::from_millis(20));
        stats.record_extract(Duration::from_millis(40));

        let emit = EmitReport {
            entities_new: 2,
            entities_known: 1,
            relationships: 1,
            statements: 3,
        };
        stats.record_batch(3, 0, 3, 1, &emit);
        stats.record_batch(3, 3, 0, 0, &EmitReport::default());
        stats.record_persistence_error();

        let summary = stats.summary(Uuid::nil());
        assert_eq!(summary.chunks_total, 10);
        assert_eq!(summary.chunks_skipped, 4);
        assert_eq!(summary.chunks_processed, 6);
        assert_eq!(summary.chunks_failed, 3);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.entities_new, 2);
        assert_eq!(summary.persistence_errors, 1);
        assert!((summary.avg_extract_ms - 30.0).abs() < 1.0);
        assert!(!summary.cancelled);
    }
}
