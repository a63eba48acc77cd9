//! Snapshot of gathered metric families
//!
//! Samples are rebuilt from the registry on every export cycle and dropped
//! once translated.

use std::collections::BTreeMap;

use prometheus::proto;

/// Kind of a metric family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

/// One cumulative histogram bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub upper_bound: f64,
    pub cumulative_count: u64,
}

/// One summary quantile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantile {
    pub quantile: f64,
    pub value: f64,
}

/// Value carried by a single series
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Counter(f64),
    Gauge(f64),
    Untyped(f64),
    Histogram {
        buckets: Vec<Bucket>,
        sum: f64,
        count: u64,
    },
    Summary {
        quantiles: Vec<Quantile>,
        sum: f64,
        count: u64,
    },
}

impl SampleValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            SampleValue::Counter(_) => MetricKind::Counter,
            SampleValue::Gauge(_) => MetricKind::Gauge,
            SampleValue::Untyped(_) => MetricKind::Untyped,
            SampleValue::Histogram { .. } => MetricKind::Histogram,
            SampleValue::Summary { .. } => MetricKind::Summary,
        }
    }
}

/// A single labelled series within a family
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub labels: BTreeMap<String, String>,
    pub value: SampleValue,
}

impl MetricSample {
    pub fn new<I, K, V>(labels: I, value: SampleValue) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            value,
        }
    }
}

/// All series sharing a family name
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamilySnapshot {
    pub name: String,
    pub kind: MetricKind,
    pub samples: Vec<MetricSample>,
}

impl From<&proto::MetricFamily> for MetricFamilySnapshot {
    fn from(family: &proto::MetricFamily) -> Self {
        let kind = match family.get_field_type() {
            proto::MetricType::COUNTER => MetricKind::Counter,
            proto::MetricType::GAUGE => MetricKind::Gauge,
            proto::MetricType::HISTOGRAM => MetricKind::Histogram,
            proto::MetricType::SUMMARY => MetricKind::Summary,
            proto::MetricType::UNTYPED => MetricKind::Untyped,
        };

        let samples = family
            .get_metric()
            .iter()
            .map(|metric| {
                let labels = metric
                    .get_label()
                    .iter()
                    .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                    .collect();
                MetricSample {
                    labels,
                    value: sample_value(kind, metric),
                }
            })
            .collect();

        Self {
            name: family.get_name().to_string(),
            kind,
            samples,
        }
    }
}

fn sample_value(kind: MetricKind, metric: &proto::Metric) -> SampleValue {
    match kind {
        MetricKind::Counter => SampleValue::Counter(metric.get_counter().get_value()),
        MetricKind::Gauge => SampleValue::Gauge(metric.get_gauge().get_value()),
        MetricKind::Untyped => SampleValue::Untyped(metric.get_untyped().get_value()),
        MetricKind::Histogram => {
            let histogram = metric.get_histogram();
            SampleValue::Histogram {
                buckets: histogram
                    .get_bucket()
                    .iter()
                    .map(|b| Bucket {
                        upper_bound: b.get_upper_bound(),
                        cumulative_count: b.get_cumulative_count(),
                    })
                    .collect(),
                sum: histogram.get_sample_sum(),
                count: histogram.get_sample_count(),
            }
        }
        MetricKind::Summary => {
            let summary = metric.get_summary();
            SampleValue::Summary {
                quantiles: summary
                    .get_quantile()
                    .iter()
                    .map(|q| Quantile {
                        quantile: q.get_quantile(),
                        value: q.get_value(),
                    })
                    .collect(),
                sum: summary.get_sample_sum(),
                count: summary.get_sample_count(),
            }
        }
    }
}
