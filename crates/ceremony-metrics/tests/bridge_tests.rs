//! Integration tests for the periodic export bridge

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ceremony_core::{RunContext, RunRecorder, SystemClock, TracingRecorder};
use ceremony_metrics::{
    ExportBridge, ExportedPoint, Gatherer, MetricFamilySnapshot, MetricsError, PointSink,
};
use prometheus::{IntCounterVec, Opts, Registry};

#[derive(Default)]
struct CollectingSink {
    batches: Mutex<Vec<Vec<ExportedPoint>>>,
}

impl CollectingSink {
    fn batches(&self) -> Vec<Vec<ExportedPoint>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PointSink for CollectingSink {
    async fn write_points(&self, points: &[ExportedPoint]) -> ceremony_metrics::Result<()> {
        self.batches.lock().unwrap().push(points.to_vec());
        Ok(())
    }
}

struct RejectingSink;

#[async_trait]
impl PointSink for RejectingSink {
    async fn write_points(&self, _points: &[ExportedPoint]) -> ceremony_metrics::Result<()> {
        Err(MetricsError::Sink("disk full".to_string()))
    }
}

/// Keeps every recorded message
#[derive(Default)]
struct CapturingRecorder {
    messages: Mutex<Vec<String>>,
}

impl CapturingRecorder {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl RunRecorder for CapturingRecorder {
    fn record_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn record_point(&self, _name: &str, _value: f64) {}

    fn record_failure(&self, _error: &str) {}

    fn record_crash(&self, _error: &str) {}

    fn record_success(&self) {}
}

/// Fails every other gather
struct FlakyGatherer {
    inner: Registry,
    calls: AtomicU64,
}

impl Gatherer for FlakyGatherer {
    fn gather(&self) -> ceremony_metrics::Result<Vec<MetricFamilySnapshot>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call % 2 == 0 {
            return Err(MetricsError::Gather("collector poisoned".to_string()));
        }
        Gatherer::gather(&self.inner)
    }
}

fn registry_with_counter() -> (Registry, IntCounterVec) {
    let registry = Registry::new();
    let counter = IntCounterVec::new(
        Opts::new("beacons_total", "Beacons observed"),
        &["region", "shard"],
    )
    .unwrap();
    registry.register(Box::new(counter.clone())).unwrap();
    counter.with_label_values(&["a", "1"]).inc();
    counter.with_label_values(&["a", "2"]).inc_by(4);
    (registry, counter)
}

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("plan".to_string(), "drand".to_string()),
        ("case".to_string(), "ceremony".to_string()),
    ])
}

#[tokio::test(start_paused = true)]
async fn test_bridge_ticks_and_flushes_on_cancel() {
    let (registry, _counter) = registry_with_counter();
    let sink = Arc::new(CollectingSink::default());
    let ctx = RunContext::with_timeout(Duration::from_secs(3600));

    let handle = ExportBridge::new(
        Arc::new(registry),
        sink.clone(),
        Arc::new(SystemClock),
        Arc::new(TracingRecorder::new()),
    )
    .with_labels(labels())
    .start(ctx.clone());

    tokio::time::sleep(Duration::from_millis(3500)).await;
    ctx.cancel();
    let stats = handle.join().await;

    assert_eq!(stats.cycles, 4);
    assert_eq!(stats.gather_failures, 0);

    let batches = sink.batches();
    assert_eq!(batches.len(), 4);

    let point = &batches[3][0];
    assert_eq!(point.measurement, "beacons_total");
    assert_eq!(point.tags["region"], "a");
    assert_eq!(point.tags["plan"], "drand");
    assert_eq!(point.fields["shard_1"], 1.0);
    assert_eq!(point.fields["shard_2"], 4.0);
}

#[tokio::test(start_paused = true)]
async fn test_bridge_final_flush_on_deadline() {
    let (registry, counter) = registry_with_counter();
    let sink = Arc::new(CollectingSink::default());
    let ctx = RunContext::with_timeout(Duration::from_millis(1500));

    let handle = ExportBridge::new(
        Arc::new(registry),
        sink.clone(),
        Arc::new(SystemClock),
        Arc::new(TracingRecorder::new()),
    )
    .start(ctx);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    counter.with_label_values(&["a", "1"]).inc_by(10);

    let stats = handle.join().await;
    assert_eq!(stats.cycles, 2);

    let last = sink.batches().pop().unwrap();
    assert_eq!(last[0].fields["shard_1"], 11.0);
}

#[tokio::test(start_paused = true)]
async fn test_gather_failure_skips_cycle_only() {
    let (registry, _counter) = registry_with_counter();
    let sink = Arc::new(CollectingSink::default());
    let recorder = Arc::new(CapturingRecorder::default());
    let ctx = RunContext::with_timeout(Duration::from_secs(3600));

    let gatherer = FlakyGatherer {
        inner: registry,
        calls: AtomicU64::new(0),
    };

    let handle = ExportBridge::new(
        Arc::new(gatherer),
        sink.clone(),
        Arc::new(SystemClock),
        recorder.clone(),
    )
    .with_interval(Duration::from_millis(100))
    .start(ctx.clone());

    tokio::time::sleep(Duration::from_millis(450)).await;
    ctx.cancel();
    let stats = handle.join().await;

    // Four ticks plus the final flush; calls 0, 2 and 4 fail
    assert_eq!(stats.cycles, 5);
    assert_eq!(stats.gather_failures, 3);
    assert_eq!(sink.batches().len(), 2);
    for batch in sink.batches() {
        assert_eq!(batch.len(), 1);
    }

    let messages = recorder.messages();
    assert_eq!(messages.len(), 3);
    for message in &messages {
        assert!(message.starts_with("metrics gather failed"));
        assert!(message.contains("collector poisoned"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_does_not_stop_bridge() {
    let (registry, _counter) = registry_with_counter();
    let ctx = RunContext::with_timeout(Duration::from_secs(3600));

    let handle = ExportBridge::new(
        Arc::new(registry),
        Arc::new(RejectingSink),
        Arc::new(SystemClock),
        Arc::new(TracingRecorder::new()),
    )
    .start(ctx.clone());

    tokio::time::sleep(Duration::from_millis(2500)).await;
    ctx.cancel();
    let stats = handle.join().await;

    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.write_failures, 3);
    assert_eq!(stats.points_written, 0);
}

#[tokio::test]
async fn test_save_writes_single_snapshot() {
    let (registry, _counter) = registry_with_counter();
    let sink = Arc::new(CollectingSink::default());

    let bridge = ExportBridge::new(
        Arc::new(registry),
        sink.clone(),
        Arc::new(SystemClock),
        Arc::new(TracingRecorder::new()),
    );

    assert_eq!(bridge.save().await.unwrap(), 1);
    assert_eq!(sink.batches().len(), 1);
}
