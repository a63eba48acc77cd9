//! Ceremony Metrics - Snapshot translation and periodic export
//!
//! Gathered metric families are converted into tagged time-series points and
//! written to a sink on a fixed interval:
//!
//! ```text
//! prometheus::Registry ──gather──► MetricFamilySnapshot ──Translator──► ExportedPoint ──► PointSink
//!                                        (every tick of ExportBridge, plus a final flush)
//! ```

pub mod bridge;
pub mod error;
pub mod gather;
pub mod point;
pub mod sample;
pub mod sink;
pub mod translate;

pub use bridge::{BridgeHandle, BridgeStats, ExportBridge, DEFAULT_EXPORT_INTERVAL};
pub use error::{MetricsError, Result};
pub use gather::Gatherer;
pub use point::ExportedPoint;
pub use sample::{Bucket, MetricFamilySnapshot, MetricKind, MetricSample, Quantile, SampleValue};
pub use sink::{FileSink, PointSink, SinkFormat};
pub use translate::{partition_labels, series_field_name, LabelPartition, Translator, VALUE_FIELD};
