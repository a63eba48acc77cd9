//! Runs every instance of a ceremony inside one process

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use tracing::{info, warn};

use ceremony_core::{Clock, HarnessConfig, RunContext, SystemClock, TracingRecorder};
use ceremony_metrics::{BridgeStats, ExportBridge, FileSink, SinkFormat};
use ceremony_orchestrator::{CeremonyMetrics, CeremonyOrchestrator, CeremonyReport, Collaborators};
use ceremony_sim::{ClusterSettings, MemorySync, SimCluster, SimNetwork};

/// Outcome of a whole run
#[derive(Debug)]
pub struct RunSummary {
    /// One report per instance, in spawn order
    pub reports: Vec<(String, CeremonyReport)>,
    /// Instance tasks that ended without a report
    pub lost: usize,
    pub export: BridgeStats,
    pub metrics_file: PathBuf,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.reports
            .iter()
            .filter(|(_, report)| !report.is_success())
            .count()
            + self.lost
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    /// Human-readable per-instance table
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("instance     seq  leader  phase                round  outcome\n");
        for (name, report) in &self.reports {
            let sequence = report
                .sequence()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let leader = report.identity.map(|id| id.is_leader()).unwrap_or(false);
            let round = report
                .output
                .as_ref()
                .map(|o| o.round.to_string())
                .unwrap_or_else(|| "-".to_string());
            let outcome = match &report.error {
                None => "ok".to_string(),
                Some(e) => format!("FAILED: {}", e),
            };
            out.push_str(&format!(
                "{:<12} {:<4} {:<7} {:<20} {:<6} {}\n",
                name,
                sequence,
                if leader { "yes" } else { "no" },
                report.last_phase.as_str(),
                round,
                outcome
            ));
        }
        out.push_str(&format!(
            "\n{} of {} instances succeeded; {} metric points written to {}\n",
            self.reports.len() + self.lost - self.failures(),
            self.reports.len() + self.lost,
            self.export.points_written,
            self.metrics_file.display()
        ));
        out
    }
}

/// Wires simulators, orchestrators and the metrics bridge for one run
pub struct HarnessRunner {
    config: HarnessConfig,
    clock: Arc<dyn Clock>,
    cluster: ClusterSettings,
}

impl HarnessRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            cluster: ClusterSettings::default(),
        }
    }

    /// Use `clock` for genesis and round computations
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cluster_settings(mut self, settings: ClusterSettings) -> Self {
        self.cluster = settings;
        self
    }

    /// Metrics file, resolved against the workdir when relative
    pub fn metrics_path(&self) -> PathBuf {
        if self.config.metrics_file.is_absolute() {
            self.config.metrics_file.clone()
        } else {
            self.config.workdir.join(&self.config.metrics_file)
        }
    }

    /// Run until every instance finishes or `ctx` ends
    pub async fn run(self, ctx: RunContext) -> Result<RunSummary> {
        let config = &self.config;
        config.validate()?;
        let ceremony = config.ceremony_config()?;
        std::fs::create_dir_all(&config.workdir)
            .with_context(|| format!("Failed to create workdir {:?}", config.workdir))?;

        let registry = Registry::new();
        let phase_metrics = CeremonyMetrics::register(&registry)?;
        let cluster = SimCluster::new(self.clock.clone(), self.cluster)?;
        cluster.register_metrics(&registry)?;

        let metrics_file = self.metrics_path();
        let sink = FileSink::create(&metrics_file, SinkFormat::from_path(&metrics_file))
            .await
            .with_context(|| format!("Failed to open metrics file {:?}", metrics_file))?;

        // Stopped once all instances finish so the last snapshot includes teardown
        let export_ctx = RunContext::with_deadline(ctx.deadline());
        let bridge = ExportBridge::new(
            Arc::new(registry),
            Arc::new(sink),
            self.clock.clone(),
            Arc::new(TracingRecorder::for_instance("metrics")),
        )
        .with_interval(config.export_interval())
        .with_labels(config.labels.to_map())
        .start(export_ctx.clone());

        let sync = Arc::new(MemorySync::new());
        info!(
            "Starting {} instances (period {:?}, threshold {})",
            config.instances, ceremony.period, ceremony.threshold
        );

        let mut handles = Vec::with_capacity(config.instances);
        for index in 0..config.instances {
            let name = format!("instance-{}", index);
            let env = config.run_env(config.workdir.join(&name));
            let services = Collaborators {
                sync: sync.clone(),
                network: Arc::new(SimNetwork::new()),
                engine: Arc::new(cluster.engine()),
                recorder: Arc::new(TracingRecorder::for_instance(name.clone())),
                clock: self.clock.clone(),
            };
            let orchestrator = CeremonyOrchestrator::new(env, ceremony, ctx.clone(), services)
                .with_metrics(phase_metrics.instance(name.clone()));
            handles.push((name, tokio::spawn(orchestrator.run())));
        }

        let mut reports = Vec::with_capacity(handles.len());
        let mut lost = 0;
        for (name, handle) in handles {
            match handle.await {
                Ok(report) => reports.push((name, report)),
                Err(e) => {
                    warn!("{} task failed: {}", name, e);
                    lost += 1;
                }
            }
        }
        sync.close();

        export_ctx.cancel();
        let export = bridge.join().await;

        Ok(RunSummary {
            reports,
            lost,
            export,
            metrics_file,
        })
    }
}
