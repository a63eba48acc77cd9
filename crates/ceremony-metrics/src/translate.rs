//! Translation of a metric snapshot into time-series points
//!
//! A family may hold several series that differ only in some labels. Labels
//! whose value is the same in every series of the family become tags of the
//! family's point. Labels that vary are folded into the field name of each
//! series, so two series never write the same field.
//!
//! ```text
//! requests_total{region="a",shard="1"} 3     tags:   region=a
//! requests_total{region="a",shard="2"} 5 ──► fields: shard_1=3, shard_2=5
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::point::ExportedPoint;
use crate::sample::{MetricFamilySnapshot, MetricSample, SampleValue};

/// Field name used when no label varies within a family
pub const VALUE_FIELD: &str = "value";

/// Field suffix holding a histogram or summary sample sum
pub const SUM_FIELD: &str = "sum";

/// Field suffix holding a histogram or summary sample count
pub const COUNT_FIELD: &str = "count";

/// Label partition of one family
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LabelPartition {
    /// Labels with a single value across every series
    pub constant: BTreeMap<String, String>,

    /// Labels whose value differs between at least two series
    pub varying: BTreeSet<String>,
}

/// Split label names of `samples` into constant and varying sets
///
/// A label missing from some series counts as varying.
pub fn partition_labels(samples: &[MetricSample]) -> LabelPartition {
    let mut first_seen: BTreeMap<&str, &str> = BTreeMap::new();
    let mut varying: BTreeSet<String> = BTreeSet::new();

    for sample in samples {
        for (name, value) in &sample.labels {
            match first_seen.get(name.as_str()) {
                None => {
                    first_seen.insert(name.as_str(), value.as_str());
                }
                Some(seen) if *seen != value.as_str() => {
                    varying.insert(name.clone());
                }
                Some(_) => {}
            }
        }
    }

    for name in first_seen.keys() {
        if samples.iter().any(|s| !s.labels.contains_key(*name)) {
            varying.insert(name.to_string());
        }
    }

    let constant = first_seen
        .into_iter()
        .filter(|(name, _)| !varying.contains(*name))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    LabelPartition { constant, varying }
}

/// Field prefix of one series. `None` when the family has no varying label.
///
/// Every varying label contributes one comma-separated part, in name order:
/// `name_value` when the series carries it, the bare `name` when it does not.
/// Backslashes and commas inside values are escaped, so distinct series of a
/// family always get distinct prefixes.
pub fn series_field_name(sample: &MetricSample, varying: &BTreeSet<String>) -> Option<String> {
    if varying.is_empty() {
        return None;
    }

    let parts: Vec<String> = varying
        .iter()
        .map(|name| match sample.labels.get(name) {
            Some(value) => format!("{}_{}", name, escape_value(value)),
            None => name.clone(),
        })
        .collect();

    Some(parts.join(","))
}

fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace(',', "\\,")
}

/// Fixed-precision key for a bucket bound or quantile
pub fn format_bound(bound: f64) -> String {
    if bound == f64::INFINITY {
        "+Inf".to_string()
    } else if bound == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{:.6}", bound)
    }
}

/// Converts gathered families into points tagged with run labels
#[derive(Debug, Clone, Default)]
pub struct Translator {
    constant_tags: BTreeMap<String, String>,
}

impl Translator {
    /// Create a translator adding `constant_tags` to every point
    pub fn new(constant_tags: BTreeMap<String, String>) -> Self {
        Self { constant_tags }
    }

    pub fn constant_tags(&self) -> &BTreeMap<String, String> {
        &self.constant_tags
    }

    /// Translate a whole snapshot; every point shares `timestamp`
    pub fn translate(
        &self,
        families: &[MetricFamilySnapshot],
        timestamp: DateTime<Utc>,
    ) -> Vec<ExportedPoint> {
        families
            .iter()
            .filter_map(|family| self.translate_family(family, timestamp))
            .collect()
    }

    /// Translate one family; `None` for a family without series
    pub fn translate_family(
        &self,
        family: &MetricFamilySnapshot,
        timestamp: DateTime<Utc>,
    ) -> Option<ExportedPoint> {
        if family.samples.is_empty() {
            return None;
        }

        let partition = partition_labels(&family.samples);

        let mut tags = partition.constant;
        tags.extend(
            self.constant_tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let mut fields = BTreeMap::new();
        for sample in &family.samples {
            let prefix = series_field_name(sample, &partition.varying);
            emit_fields(prefix.as_deref(), &sample.value, &mut fields);
        }

        Some(ExportedPoint {
            measurement: family.name.clone(),
            tags,
            fields,
            timestamp,
        })
    }
}

fn field_key(prefix: Option<&str>, suffix: &str) -> String {
    match prefix {
        Some(prefix) => format!("{},{}", prefix, suffix),
        None => suffix.to_string(),
    }
}

fn emit_fields(prefix: Option<&str>, value: &SampleValue, fields: &mut BTreeMap<String, f64>) {
    match value {
        SampleValue::Counter(v) | SampleValue::Gauge(v) | SampleValue::Untyped(v) => {
            fields.insert(prefix.unwrap_or(VALUE_FIELD).to_string(), *v);
        }
        SampleValue::Histogram {
            buckets,
            sum,
            count,
        } => {
            for bucket in buckets {
                fields.insert(
                    field_key(prefix, &format_bound(bucket.upper_bound)),
                    bucket.cumulative_count as f64,
                );
            }
            fields.insert(field_key(prefix, SUM_FIELD), *sum);
            fields.insert(field_key(prefix, COUNT_FIELD), *count as f64);
        }
        SampleValue::Summary {
            quantiles,
            sum,
            count,
        } => {
            for quantile in quantiles {
                fields.insert(
                    field_key(prefix, &format_bound(quantile.quantile)),
                    quantile.value,
                );
            }
            fields.insert(field_key(prefix, SUM_FIELD), *sum);
            fields.insert(field_key(prefix, COUNT_FIELD), *count as f64);
        }
    }
}
