//! Reconciliation poller.
//!
//! Periodically sweeps for symptom reports that were never marked processed
//! and retries them. Immediate dispatch only shortens latency; this loop is
//! what eventually matches every report once a water reading exists.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::pipeline::{Pipeline, ProcessOutcome};

pub const POLL_BATCH_SIZE: usize = 200;
pub const DEDUP_WINDOW_CAPACITY: usize = 10_000;

/// Ids that already produced a prediction in this process. Cleared wholesale
/// once it grows past its capacity.
#[derive(Debug)]
pub struct DedupWindow {
    seen: HashSet<Uuid>,
    capacity: usize,
    resets: u64,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            capacity,
            resets: 0,
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }

    pub fn insert(&mut self, id: Uuid) {
        self.seen.insert(id);
        if self.seen.len() > self.capacity {
            self.seen.clear();
            self.resets += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEDUP_WINDOW_CAPACITY)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub fetched: usize,
    pub skipped: usize,
    pub predicted: usize,
    pub unmatched: usize,
    pub failed: usize,
}

pub struct Poller {
    pipeline: Pipeline,
    interval: Duration,
    batch_size: usize,
    window: DedupWindow,
}

impl Poller {
    pub fn new(pipeline: Pipeline, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            batch_size: POLL_BATCH_SIZE,
            window: DedupWindow::default(),
        }
    }

    pub fn with_window(mut self, window: DedupWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn window(&self) -> &DedupWindow {
        &self.window
    }

    /// Runs until the process exits. A failed sweep is logged and retried on
    /// the next tick.
    pub async fn run(mut self) {
        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs_f64(),
            batch_size = self.batch_size,
            "Reconciliation poller started"
        );

        loop {
            timer.tick().await;
            match self.sweep().await {
                Ok(stats) if stats.fetched > 0 => {
                    debug!(
                        fetched = stats.fetched,
                        predicted = stats.predicted,
                        unmatched = stats.unmatched,
                        failed = stats.failed,
                        skipped = stats.skipped,
                        "Poller sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Poller sweep failed"),
            }
        }
    }

    /// One pass over unprocessed reports. Only ids that produced a prediction
    /// enter the window; unmatched and failed reports stay eligible next tick.
    pub async fn sweep(&mut self) -> anyhow::Result<SweepStats> {
        let reports = self
            .pipeline
            .store()
            .unprocessed_symptom_reports(None, self.batch_size)
            .await?;

        let mut stats = SweepStats {
            fetched: reports.len(),
            ..SweepStats::default()
        };

        for report in reports {
            if self.window.contains(&report.id) {
                stats.skipped += 1;
                continue;
            }
            match self.pipeline.process_logged(&report).await {
                Some(ProcessOutcome::NoCounterpart) => stats.unmatched += 1,
                Some(ProcessOutcome::Predicted(_)) | Some(ProcessOutcome::Duplicate(_)) => {
                    stats.predicted += 1;
                    self.window.insert(report.id);
                }
                None => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}
