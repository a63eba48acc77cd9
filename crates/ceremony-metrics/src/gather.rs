//! Snapshot sources

use crate::error::Result;
use crate::sample::MetricFamilySnapshot;

/// Produces one snapshot of metric families
///
/// Implementations must tolerate concurrent callers; the bridge gathers
/// while instrumented code keeps updating.
pub trait Gatherer: Send + Sync {
    fn gather(&self) -> Result<Vec<MetricFamilySnapshot>>;
}

impl Gatherer for prometheus::Registry {
    fn gather(&self) -> Result<Vec<MetricFamilySnapshot>> {
        Ok(prometheus::Registry::gather(self)
            .iter()
            .map(MetricFamilySnapshot::from)
            .collect())
    }
}
