//! Periodic export of metric snapshots
//!
//! The bridge gathers, translates and writes one snapshot per tick on a
//! background task. When the run context finishes it writes one final
//! snapshot and exits. Failures are logged and the next tick proceeds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use ceremony_core::{Clock, RunContext, RunRecorder};

use crate::error::Result;
use crate::gather::Gatherer;
use crate::point::ExportedPoint;
use crate::sink::PointSink;
use crate::translate::Translator;

/// Default export interval
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Counters describing a bridge's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Snapshot cycles attempted
    pub cycles: u64,
    /// Points handed to the sink successfully
    pub points_written: u64,
    /// Cycles aborted by a gather error
    pub gather_failures: u64,
    /// Batches lost to a sink error
    pub write_failures: u64,
}

/// Gathers metrics on a fixed interval and writes them to a sink
pub struct ExportBridge {
    interval: Duration,
    gatherer: Arc<dyn Gatherer>,
    translator: Translator,
    sink: Arc<dyn PointSink>,
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn RunRecorder>,
    stats: BridgeStats,
}

impl ExportBridge {
    /// Create a new bridge
    pub fn new(
        gatherer: Arc<dyn Gatherer>,
        sink: Arc<dyn PointSink>,
        clock: Arc<dyn Clock>,
        recorder: Arc<dyn RunRecorder>,
    ) -> Self {
        Self {
            interval: DEFAULT_EXPORT_INTERVAL,
            gatherer,
            translator: Translator::default(),
            sink,
            clock,
            recorder,
            stats: BridgeStats::default(),
        }
    }

    /// Override the export interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Tag every exported point with `labels` (plan, case, run, group)
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.translator = Translator::new(labels);
        self
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Record one snapshot; returns the number of points written
    ///
    /// A gather error aborts the cycle before anything is written.
    pub async fn save(&self) -> Result<usize> {
        let points = self.snapshot()?;
        if !points.is_empty() {
            self.sink.write_points(&points).await?;
        }
        Ok(points.len())
    }

    /// Gather and translate one snapshot sharing a single timestamp
    fn snapshot(&self) -> Result<Vec<ExportedPoint>> {
        let families = self.gatherer.gather()?;
        let timestamp: DateTime<Utc> = self.clock.now().into();
        Ok(self.translator.translate(&families, timestamp))
    }

    /// Start exporting on a background task until `ctx` finishes
    pub fn start(self, ctx: RunContext) -> BridgeHandle {
        BridgeHandle {
            handle: tokio::spawn(self.background(ctx)),
        }
    }

    async fn background(mut self, ctx: RunContext) -> BridgeStats {
        info!("Metrics export started (interval {:?})", self.interval);

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                reason = ctx.done() => {
                    debug!("Metrics export stopping: {}", reason);
                    self.cycle().await;
                    break;
                }
                _ = ticker.tick() => {
                    self.cycle().await;
                }
            }
        }

        info!(
            "Metrics export stopped after {} cycles ({} points)",
            self.stats.cycles, self.stats.points_written
        );
        self.stats
    }

    async fn cycle(&mut self) {
        self.stats.cycles += 1;

        let points = match self.snapshot() {
            Ok(points) => points,
            Err(e) => {
                self.stats.gather_failures += 1;
                warn!("Metrics gather failed: {}", e);
                self.recorder
                    .record_message(&format!("metrics gather failed: {}", e));
                return;
            }
        };
        if points.is_empty() {
            return;
        }

        match self.sink.write_points(&points).await {
            Ok(()) => self.stats.points_written += points.len() as u64,
            Err(e) => {
                self.stats.write_failures += 1;
                warn!("Metrics sink write failed: {}", e);
            }
        }
    }
}

/// Handle to a running bridge
pub struct BridgeHandle {
    handle: JoinHandle<BridgeStats>,
}

impl BridgeHandle {
    /// Wait for the bridge to finish its final flush
    pub async fn join(self) -> BridgeStats {
        match self.handle.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Metrics export task failed: {}", e);
                BridgeStats::default()
            }
        }
    }
}
