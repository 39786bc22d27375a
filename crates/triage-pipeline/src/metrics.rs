//! In-process scheduler counters (SPEC_FULL §11): the spec's Non-goals
//! exclude a metrics exporter as an external surface, but the scheduler
//! still needs somewhere to accumulate what it observed.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub ticks_run: AtomicU64,
    pub ticks_skipped: AtomicU64,
    pub alerts_processed: AtomicU64,
    pub alerts_failed: AtomicU64,
    pub alerts_unprocessable: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks_run: u64,
    pub ticks_skipped: u64,
    pub alerts_processed: u64,
    pub alerts_failed: u64,
    pub alerts_unprocessable: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_run: self.ticks_run.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            alerts_processed: self.alerts_processed.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
            alerts_unprocessable: self.alerts_unprocessable.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_starts_at_zero() {
        let metrics = Metrics::default();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
