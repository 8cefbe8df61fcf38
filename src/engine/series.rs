//! Time bucketing and series building
//!
//! Converts raw per-event records into an ordered sequence of time buckets,
//! hourly for windows of up to seven days and daily beyond that, with both
//! aggregate and per-event count/success/fail fields.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::engine::models::{AggregatedPoint, DateRange, EventCatalog, EventKeyInfo, EventRecord};

/// Result of one bucketing pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesBuild {
    /// Buckets sorted ascending by timestamp; only buckets with at least one
    /// contributing record exist (no synthetic zero buckets)
    pub points: Vec<AggregatedPoint>,
    /// Every event seen in the input, deduplicated, in first-seen order
    pub event_keys: Vec<EventKeyInfo>,
}

/// Label for the bucket containing `ts`. Two records mapping to the same
/// label land in the same bucket regardless of sub-label timestamp
/// differences.
pub fn bucket_label(ts: DateTime<Utc>, hourly: bool) -> String {
    if hourly {
        ts.format("%b %-d, %-I %p").to_string()
    } else {
        ts.format("%b %-d").to_string()
    }
}

/// Build the chart series for one panel from raw records.
///
/// Pure and total: unknown event ids contribute under a synthesized name,
/// empty input yields empty output, and calling twice on the same input
/// produces identical results.
pub fn build_series(
    records: &[EventRecord],
    range: &DateRange,
    catalog: &EventCatalog,
) -> SeriesBuild {
    let hourly = range.is_hourly();

    let mut buckets: HashMap<String, AggregatedPoint> = HashMap::new();
    let mut event_keys: Vec<EventKeyInfo> = Vec::new();

    for record in records {
        if !event_keys.iter().any(|k| k.event_id == record.event_id) {
            event_keys.push(EventKeyInfo::resolve(record.event_id, catalog));
        }

        let label = bucket_label(record.timestamp, hourly);
        let point = buckets
            .entry(label.clone())
            .or_insert_with(|| AggregatedPoint::new(label, record.timestamp.timestamp()));

        point.count += record.count;
        point.success_count += record.success_count;
        point.fail_count += record.fail_count;

        let per_event = point.events.entry(record.event_id).or_default();
        per_event.count += record.count;
        per_event.success_count += record.success_count;
        per_event.fail_count += record.fail_count;
    }

    let mut points: Vec<AggregatedPoint> = buckets.into_values().collect();
    points.sort_by_key(|p| p.timestamp);

    SeriesBuild { points, event_keys }
}

/// Flatten a built series into chart rows with `{event_key}_*` fields
pub fn chart_rows(build: &SeriesBuild) -> Vec<serde_json::Value> {
    build
        .points
        .iter()
        .map(|p| p.to_chart_row(&build.event_keys))
        .collect()
}
