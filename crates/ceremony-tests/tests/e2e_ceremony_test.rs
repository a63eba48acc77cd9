//! End-to-end tests for the ceremony harness
//!
//! These tests run whole ceremonies in one process under paused time, from
//! identity allocation through key generation, genesis alignment, output
//! verification and metrics export.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use ceremony_cli::HarnessRunner;
use ceremony_core::{
    current_round, threshold_for, unix_seconds, Clock, GroupDescriptor, HarnessConfig, RunContext,
};
use ceremony_metrics::ExportedPoint;
use ceremony_orchestrator::{CeremonyError, CeremonyOrchestrator, Collaborators, Phase};
use ceremony_sim::{MemoryRecorder, MemorySync, SimCluster, SimNetwork, TokioClock};

fn config(instances: usize, dir: &std::path::Path) -> HarnessConfig {
    HarnessConfig {
        instances,
        period_secs: 10,
        workdir: dir.to_path_buf(),
        ..HarnessConfig::default()
    }
}

/// Simulates a complete four-instance ceremony
#[tokio::test(start_paused = true)]
async fn test_full_ceremony_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(TokioClock::new());

    // ==========================================
    // STEP 1: Run every instance
    // ==========================================
    let summary = HarnessRunner::new(config(4, dir.path()))
        .with_clock(clock.clone())
        .run(RunContext::with_timeout(Duration::from_secs(300)))
        .await
        .unwrap();
    assert!(summary.is_success(), "{}", summary.render());

    // ==========================================
    // STEP 2: Exactly one leader, dense sequences
    // ==========================================
    let leaders: Vec<_> = summary
        .reports
        .iter()
        .filter(|(_, report)| report.identity.unwrap().is_leader())
        .collect();
    assert_eq!(leaders.len(), 1);
    assert_eq!(leaders[0].1.sequence(), Some(1));

    let sequences: BTreeSet<u64> = summary
        .reports
        .iter()
        .map(|(_, report)| report.sequence().unwrap())
        .collect();
    assert_eq!(sequences, (1..=4).collect::<BTreeSet<u64>>());

    // ==========================================
    // STEP 3: Every instance holds the same group
    // ==========================================
    let groups: Vec<GroupDescriptor> = (0..4)
        .map(|i| {
            GroupDescriptor::load(&dir.path().join(format!("instance-{}/group.toml", i))).unwrap()
        })
        .collect();
    assert!(groups.windows(2).all(|pair| pair[0] == pair[1]));
    let group = &groups[0];
    assert_eq!(group.threshold, threshold_for(4));
    assert_eq!(group.period, Duration::from_secs(10));

    // ==========================================
    // STEP 4: The verified output is the first safe round
    // ==========================================
    let genesis = group.genesis_time;
    for (_, report) in &summary.reports {
        let output = report.output.as_ref().unwrap();
        assert_eq!(
            output.round,
            current_round(genesis + 13, group.period, genesis)
        );
        assert_eq!(report.last_phase, Phase::BeaconVerified);
        assert!(report.reached_end);
    }
    assert!(unix_seconds(clock.now()) >= genesis + 13);

    // ==========================================
    // STEP 5: Metrics were exported with run tags
    // ==========================================
    let exported = std::fs::read_to_string(&summary.metrics_file).unwrap();
    let points: Vec<ExportedPoint> = exported
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(!points.is_empty());
    for point in &points {
        assert_eq!(point.tags["plan"], "drand");
        assert_eq!(point.tags["case"], "ceremony");
        assert_eq!(point.tags["run"], "local");
        assert_eq!(point.tags["group_id"], "single");
    }

    let last_phase = points
        .iter()
        .rev()
        .find(|point| point.measurement == "ceremony_current_phase")
        .unwrap();
    for i in 0..4 {
        assert_eq!(
            last_phase.fields[&format!("instance_instance-{}", i)],
            Phase::Teardown.ordinal() as f64
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_line_protocol_export() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(2, dir.path());
    config.metrics_file = "points.lp".into();

    let summary = HarnessRunner::new(config)
        .with_clock(Arc::new(TokioClock::new()))
        .run(RunContext::with_timeout(Duration::from_secs(300)))
        .await
        .unwrap();
    assert!(summary.is_success(), "{}", summary.render());

    let exported = std::fs::read_to_string(dir.path().join("points.lp")).unwrap();
    let served = exported
        .lines()
        .rev()
        .find(|line| line.starts_with("engine_outputs_served_total,"))
        .unwrap();
    // Final snapshot: both nodes served, so the node label becomes the field name
    assert!(served.contains("plan=drand"));
    assert!(served.contains("node_1=1"));
    assert!(served.contains("node_2=1"));
}

#[tokio::test(start_paused = true)]
async fn test_group_sizes_use_majority_threshold() {
    for instances in [1usize, 2, 3, 5, 7] {
        let dir = tempfile::tempdir().unwrap();
        let summary = HarnessRunner::new(config(instances, dir.path()))
            .with_clock(Arc::new(TokioClock::new()))
            .run(RunContext::with_timeout(Duration::from_secs(300)))
            .await
            .unwrap();

        assert!(summary.is_success(), "{}", summary.render());
        let group = summary.reports[0].1.group.as_ref().unwrap();
        assert_eq!(group.threshold, (instances + 1) / 2);
        assert_eq!(group.participants.len(), instances);
    }
}

/// Five planned instances, three show up; the deadline ends everything
#[tokio::test(start_paused = true)]
async fn test_deadline_with_missing_instances() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(TokioClock::new());
    let config = config(5, dir.path());
    let sync = Arc::new(MemorySync::new());
    let cluster = SimCluster::new(clock.clone(), Default::default()).unwrap();
    let ctx = RunContext::with_timeout(Duration::from_secs(45));

    let mut handles = Vec::new();
    for i in 0..3 {
        let recorder = Arc::new(MemoryRecorder::new());
        let orchestrator = CeremonyOrchestrator::new(
            config.run_env(dir.path().join(format!("instance-{}", i))),
            config.ceremony_config().unwrap(),
            ctx.clone(),
            Collaborators {
                sync: sync.clone(),
                network: Arc::new(SimNetwork::new()),
                engine: Arc::new(cluster.engine()),
                recorder: recorder.clone(),
                clock: clock.clone(),
            },
        );
        handles.push((tokio::spawn(orchestrator.run()), recorder));
    }

    for (handle, recorder) in handles {
        let report = handle.await.unwrap();
        assert!(matches!(
            report.error,
            Some(CeremonyError::Interrupted {
                phase: Phase::IpAllocated,
                ..
            })
        ));
        assert!(!report.reached_end);
        assert_eq!(recorder.outcomes(), 1);
        assert!(recorder.point("first_ping").is_none());
    }
    assert_eq!(sync.arrivals("ip-allocation"), 3);
    assert_eq!(sync.arrivals("end"), 0);
    assert!(cluster.formed_group().is_none());
}
