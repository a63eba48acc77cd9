//! Phase progress metrics

use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::phase::Phase;

/// Buckets for phase durations, in seconds
const DURATION_BUCKETS: &[f64] = &[0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0];

/// Metric families shared by every orchestrator in a process
#[derive(Clone)]
pub struct CeremonyMetrics {
    transitions: IntCounterVec,
    durations: HistogramVec,
    current: IntGaugeVec,
}

impl CeremonyMetrics {
    /// Create the families and register them with `registry`
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let transitions = IntCounterVec::new(
            Opts::new(
                "ceremony_phase_transitions_total",
                "Phases entered by each instance",
            ),
            &["instance", "phase"],
        )?;
        let durations = HistogramVec::new(
            HistogramOpts::new(
                "ceremony_phase_duration_seconds",
                "Time spent in each phase before moving on",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["instance", "phase"],
        )?;
        let current = IntGaugeVec::new(
            Opts::new(
                "ceremony_current_phase",
                "Ordinal of the phase each instance is in",
            ),
            &["instance"],
        )?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(durations.clone()))?;
        registry.register(Box::new(current.clone()))?;

        Ok(Self {
            transitions,
            durations,
            current,
        })
    }

    /// Metrics for one instance, labelled `instance`
    pub fn instance(&self, instance: impl Into<String>) -> PhaseMetrics {
        PhaseMetrics {
            families: self.clone(),
            instance: instance.into(),
        }
    }
}

/// Phase metrics bound to one instance label
#[derive(Clone)]
pub struct PhaseMetrics {
    families: CeremonyMetrics,
    instance: String,
}

impl PhaseMetrics {
    /// Record leaving `from` after `elapsed` and entering `to`
    pub fn transition(&self, from: Phase, elapsed: Duration, to: Phase) {
        let instance = self.instance.as_str();
        self.families
            .durations
            .with_label_values(&[instance, from.as_str()])
            .observe(elapsed.as_secs_f64());
        self.families
            .transitions
            .with_label_values(&[instance, to.as_str()])
            .inc();
        self.families
            .current
            .with_label_values(&[instance])
            .set(to.ordinal() as i64);
    }
}
