//! Property-based tests for ceremony-metrics using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use std::collections::{BTreeMap, BTreeSet};

use ceremony_metrics::{
    Bucket, MetricFamilySnapshot, MetricKind, MetricSample, Quantile, SampleValue, Translator,
};
use chrono::Utc;
use proptest::prelude::*;

// ============================================
// Arbitrary Implementations
// ============================================

fn arb_label_name() -> impl Strategy<Value = String> {
    prop_oneof![Just("a"), Just("b"), Just("node_id")].prop_map(|name| name.to_string())
}

/// Values deliberately include the characters used to build field names
fn arb_label_value() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z0-9,_=\\\\]{0,4}").unwrap()
}

fn arb_label_sets() -> impl Strategy<Value = LabelSets> {
    prop::collection::btree_set(
        prop::collection::btree_map(arb_label_name(), arb_label_value(), 0..=3),
        1..8,
    )
}

fn arb_kind() -> impl Strategy<Value = MetricKind> {
    prop_oneof![
        Just(MetricKind::Counter),
        Just(MetricKind::Gauge),
        Just(MetricKind::Untyped),
        Just(MetricKind::Histogram),
        Just(MetricKind::Summary),
    ]
}

fn value_for(kind: MetricKind, v: f64) -> SampleValue {
    match kind {
        MetricKind::Counter => SampleValue::Counter(v),
        MetricKind::Gauge => SampleValue::Gauge(v),
        MetricKind::Untyped => SampleValue::Untyped(v),
        MetricKind::Histogram => SampleValue::Histogram {
            buckets: vec![
                Bucket { upper_bound: 0.5, cumulative_count: 1 },
                Bucket { upper_bound: 1.0, cumulative_count: 2 },
                Bucket { upper_bound: f64::INFINITY, cumulative_count: 3 },
            ],
            sum: v,
            count: 3,
        },
        MetricKind::Summary => SampleValue::Summary {
            quantiles: vec![
                Quantile { quantile: 0.5, value: v },
                Quantile { quantile: 0.99, value: v },
            ],
            sum: v,
            count: 2,
        },
    }
}

/// Fields written for one series of `kind`
fn fields_per_series(kind: MetricKind) -> usize {
    match kind {
        MetricKind::Counter | MetricKind::Gauge | MetricKind::Untyped => 1,
        MetricKind::Histogram => 5,
        MetricKind::Summary => 4,
    }
}

type LabelSets = BTreeSet<BTreeMap<String, String>>;

fn family(kind: MetricKind, label_sets: &LabelSets) -> MetricFamilySnapshot {
    MetricFamilySnapshot {
        name: "series_total".to_string(),
        kind,
        samples: label_sets
            .iter()
            .enumerate()
            .map(|(i, labels)| MetricSample::new(labels.clone(), value_for(kind, i as f64)))
            .collect(),
    }
}

// ============================================
// Translator Properties
// ============================================

proptest! {
    /// Every series keeps all of its fields
    #[test]
    fn prop_field_names_never_collide(kind in arb_kind(), label_sets in arb_label_sets()) {
        let point = Translator::default()
            .translate_family(&family(kind, &label_sets), Utc::now())
            .unwrap();

        prop_assert_eq!(point.fields.len(), label_sets.len() * fields_per_series(kind));
        prop_assert!(point.fields.keys().all(|key| !key.is_empty()));
    }

    /// Scalar series values all survive translation
    #[test]
    fn prop_scalar_values_preserved(label_sets in arb_label_sets()) {
        let point = Translator::default()
            .translate_family(&family(MetricKind::Gauge, &label_sets), Utc::now())
            .unwrap();

        let values: BTreeSet<u64> = point.fields.values().map(|v| *v as u64).collect();
        let expected: BTreeSet<u64> = (0..label_sets.len() as u64).collect();
        prop_assert_eq!(values, expected);
    }

    /// Tags only carry labels shared by every series
    #[test]
    fn prop_tags_are_constant_labels(label_sets in arb_label_sets()) {
        let point = Translator::default()
            .translate_family(&family(MetricKind::Counter, &label_sets), Utc::now())
            .unwrap();

        for (name, value) in &point.tags {
            prop_assert!(label_sets.iter().all(|labels| labels.get(name) == Some(value)));
        }
    }

    /// Every point with a finite field encodes to a record with a field set
    #[test]
    fn prop_line_protocol_has_named_fields(kind in arb_kind(), label_sets in arb_label_sets()) {
        let point = Translator::default()
            .translate_family(&family(kind, &label_sets), Utc::now())
            .unwrap();

        let line = point.to_line_protocol().unwrap();
        prop_assert!(line.starts_with("series_total"));
        prop_assert!(!line.contains(" ="));
    }
}
