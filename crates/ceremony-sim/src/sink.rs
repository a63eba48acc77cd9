//! Point sink that keeps every batch in memory

use std::sync::Mutex;

use async_trait::async_trait;

use ceremony_metrics::{ExportedPoint, PointSink};

/// Collects exported batches for assertions
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<ExportedPoint>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<ExportedPoint>> {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Every point of every batch, in write order
    pub fn points(&self) -> Vec<ExportedPoint> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl PointSink for MemorySink {
    async fn write_points(&self, points: &[ExportedPoint]) -> ceremony_metrics::Result<()> {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(points.to_vec());
        Ok(())
    }
}
