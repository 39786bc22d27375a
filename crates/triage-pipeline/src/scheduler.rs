//! Scheduler (C11, §4.11): a fixed-interval tick loop that lists unprocessed
//! alerts and dispatches them to the Alert Processor with bounded concurrency.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use triage_core::ProcessingStage;

use crate::metrics::Metrics;
use crate::processor::{self, ProcessorDeps};

pub struct SchedulerConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub alert_concurrency: usize,
}

/// Runs the tick loop until `shutdown` is cancelled. §4.11's "tick
/// coalescing": `MissedTickBehavior::Skip` means an overrun tick is dropped
/// rather than queued, so a slow batch never causes a burst of catch-up ticks
/// (scenario S6).
pub async fn run(deps: Arc<ProcessorDeps>, config: SchedulerConfig, metrics: Arc<Metrics>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("scheduler shutting down");
                return;
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                record_tick_gap(&metrics, config.interval, now.duration_since(last_tick));
                last_tick = now;

                metrics.ticks_run.fetch_add(1, Ordering::Relaxed);
                run_tick(&deps, &config, &metrics).await;
            }
        }
    }
}

/// If more than one interval elapsed since the previous tick, the skipped
/// interim ticks were coalesced away by `MissedTickBehavior::Skip`; count
/// them so the metric reflects what the scheduler actually dropped.
fn record_tick_gap(metrics: &Metrics, interval: Duration, gap: Duration) {
    let interval_secs = interval.as_secs_f64().max(f64::EPSILON);
    let periods_elapsed = (gap.as_secs_f64() / interval_secs).floor() as u64;
    let skipped = periods_elapsed.saturating_sub(1);
    if skipped > 0 {
        metrics.ticks_skipped.fetch_add(skipped, Ordering::Relaxed);
    }
}

async fn run_tick(deps: &Arc<ProcessorDeps>, config: &SchedulerConfig, metrics: &Arc<Metrics>) {
    let alerts = match deps.vector_store.list_unprocessed(config.batch_size).await {
        Ok(alerts) => alerts,
        Err(err) => {
            warn!(error = %err, "failed to list unprocessed alerts this tick");
            return;
        }
    };

    if alerts.is_empty() {
        return;
    }

    info!(count = alerts.len(), "dispatching alerts from tick");

    let concurrency = config.alert_concurrency.max(1);
    let stages = stream::iter(alerts.into_iter())
        .map(|alert| {
            let deps = Arc::clone(deps);
            async move {
                let alert_id = alert.id.clone();
                match tokio::time::timeout(processor::HARD_TIMEOUT, processor::process_alert(&deps, alert)).await {
                    Ok(stage) => Some(stage),
                    Err(_) => {
                        warn!(alert_id, "alert processing exceeded the hard timeout");
                        None
                    }
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect::<Vec<_>>()
        .await;

    for stage in stages.into_iter().flatten() {
        metrics.alerts_processed.fetch_add(1, Ordering::Relaxed);
        match stage {
            ProcessingStage::Unprocessable => {
                metrics.alerts_unprocessable.fetch_add(1, Ordering::Relaxed);
            }
            ProcessingStage::AnalysisFailed => {
                metrics.alerts_failed.fetch_add(1, Ordering::Relaxed);
            }
            ProcessingStage::Complete | ProcessingStage::GraphNotPersisted => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_missed_period_counts_as_one_skipped_tick() {
        let metrics = Metrics::default();
        record_tick_gap(&metrics, Duration::from_secs(10), Duration::from_secs(25));
        assert_eq!(metrics.ticks_skipped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn on_time_tick_records_no_skip() {
        let metrics = Metrics::default();
        record_tick_gap(&metrics, Duration::from_secs(10), Duration::from_secs(10));
        assert_eq!(metrics.ticks_skipped.load(Ordering::Relaxed), 0);
    }
}
