//! Time-series points written to the sink

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One measurement with its tags and fields at a timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPoint {
    /// Measurement (metric family) name
    pub measurement: String,

    /// Labels constant across the family plus run labels
    pub tags: BTreeMap<String, String>,

    /// Per-series values keyed by synthesized field names
    pub fields: BTreeMap<String, f64>,

    /// Shared snapshot timestamp
    pub timestamp: DateTime<Utc>,
}

impl ExportedPoint {
    /// Encode as a time-series line protocol record
    ///
    /// Non-finite fields are dropped since the protocol cannot carry them.
    /// Returns `None` when no field survives.
    pub fn to_line_protocol(&self) -> Option<String> {
        let fields: Vec<String> = self
            .fields
            .iter()
            .filter(|(_, value)| value.is_finite())
            .map(|(key, value)| format!("{}={}", escape_key(key), value))
            .collect();

        if fields.is_empty() {
            return None;
        }

        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
        }
        line.push(' ');
        line.push_str(&fields.join(","));
        if let Some(nanos) = self.timestamp.timestamp_nanos_opt() {
            let _ = write!(line, " {}", nanos);
        }
        Some(line)
    }
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point() -> ExportedPoint {
        ExportedPoint {
            measurement: "engine_pings_total".to_string(),
            tags: BTreeMap::from([
                ("plan".to_string(), "drand".to_string()),
                ("region".to_string(), "eu west".to_string()),
            ]),
            fields: BTreeMap::from([
                ("shard_1".to_string(), 3.0),
                ("shard_2".to_string(), 4.5),
            ]),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_line_protocol_encoding() {
        assert_eq!(
            point().to_line_protocol().unwrap(),
            "engine_pings_total,plan=drand,region=eu\\ west shard_1=3,shard_2=4.5 1700000000000000000"
        );
    }

    #[test]
    fn test_line_protocol_escapes_composite_field_names() {
        let mut p = point();
        p.fields = BTreeMap::from([("region_a,shard_1".to_string(), 1.0)]);
        let line = p.to_line_protocol().unwrap();
        assert!(line.contains(" region_a\\,shard_1=1 "));
    }

    #[test]
    fn test_line_protocol_escapes_trailing_backslash() {
        let mut p = point();
        p.tags = BTreeMap::from([("dir".to_string(), "c:\\".to_string())]);
        p.fields = BTreeMap::from([("a_x\\".to_string(), 1.0)]);
        let line = p.to_line_protocol().unwrap();
        assert!(line.starts_with("engine_pings_total,dir=c:\\\\ a_x\\\\=1 "));
    }

    #[test]
    fn test_line_protocol_skips_non_finite() {
        let mut p = point();
        p.fields = BTreeMap::from([("value".to_string(), f64::NAN)]);
        assert!(p.to_line_protocol().is_none());
    }
}
