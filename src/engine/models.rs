//! Data models for panel analytics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier for a telemetry event type
pub type EventId = i64;

/// Identifier for a dashboard panel
pub type PanelId = String;

/// Catalog mapping event ids to their display names
pub type EventCatalog = BTreeMap<EventId, String>;

/// Raw per-event time-series record as returned by the fetch collaborator.
///
/// One record per (event, time slot) pair. Numeric fields default to zero on
/// deserialization so a malformed record contributes nothing instead of
/// failing the batch. `extra` captures loosely-keyed fields such as the
/// per-event user-metric conventions (`{name}_total_users`, `{id}_total_users`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event type this record belongs to
    pub event_id: EventId,

    /// Start of the time slot this record covers
    pub timestamp: DateTime<Utc>,

    /// Total occurrences in the slot
    #[serde(default)]
    pub count: u64,

    /// Occurrences that succeeded
    #[serde(default)]
    pub success_count: u64,

    /// Occurrences that failed
    #[serde(default)]
    pub fail_count: u64,

    /// Average delay in the slot, when the collaborator measured one
    #[serde(default)]
    pub avg_delay: Option<f64>,

    /// Per-HTTP-status sub-counts (e.g. "200" -> 95)
    #[serde(default)]
    pub status_counts: BTreeMap<String, u64>,

    /// Per-cache-status sub-counts (e.g. "HIT" -> 40)
    #[serde(default)]
    pub cache_counts: BTreeMap<String, u64>,

    /// Remaining fields, including the user-metric naming conventions
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EventRecord {
    /// Read a numeric field from `extra`, trying each candidate key in order.
    /// Absent or non-numeric values read as zero.
    pub fn extra_numeric(&self, candidates: &[String]) -> u64 {
        for key in candidates {
            if let Some(value) = self.extra.get(key) {
                if let Some(n) = value.as_u64() {
                    return n;
                }
                if let Some(f) = value.as_f64() {
                    if f >= 0.0 {
                        return f as u64;
                    }
                }
            }
        }
        0
    }
}

/// Per-event key info derived during aggregation, used by chart consumers to
/// locate the `{event_key}_*` fields in flattened rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKeyInfo {
    pub event_id: EventId,
    pub event_name: String,
    pub event_key: String,
}

impl EventKeyInfo {
    /// Resolve an event id against the catalog, synthesizing a name for
    /// unknown ids rather than failing.
    pub fn resolve(event_id: EventId, catalog: &EventCatalog) -> Self {
        let event_name = catalog
            .get(&event_id)
            .cloned()
            .unwrap_or_else(|| format!("Event {event_id}"));
        let event_key = sanitize_event_key(&event_name);
        Self {
            event_id,
            event_name,
            event_key,
        }
    }
}

/// Derive a field-name-safe key from an event display name by replacing every
/// non-alphanumeric character with `_`. Display/labeling only: aggregation is
/// keyed by `event_id`, so two names that sanitize identically cannot merge
/// their counts.
pub fn sanitize_event_key(event_name: &str) -> String {
    event_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Count/success/fail triple for one event within one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub count: u64,
    pub success_count: u64,
    pub fail_count: u64,
}

/// One time-aligned aggregation slot (an hour or a day) in a series.
///
/// Invariant: the overall fields equal the sum of the per-event fields across
/// every event present in the bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPoint {
    /// Display label ("Jan 3, 10 AM" hourly, "Jan 3" daily)
    pub date: String,

    /// Bucket start (Unix seconds), used for sort order
    pub timestamp: i64,

    pub count: u64,
    pub success_count: u64,
    pub fail_count: u64,

    /// Per-event breakdown, keyed by event id
    pub events: BTreeMap<EventId, EventCounts>,
}

impl AggregatedPoint {
    pub fn new(date: String, timestamp: i64) -> Self {
        Self {
            date,
            timestamp,
            count: 0,
            success_count: 0,
            fail_count: 0,
            events: BTreeMap::new(),
        }
    }

    /// Flatten to a chart row with `{event_key}_count` / `_success` / `_fail`
    /// fields, the shape chart consumers bind series to.
    pub fn to_chart_row(&self, keys: &[EventKeyInfo]) -> serde_json::Value {
        let mut row = serde_json::Map::new();
        row.insert("date".into(), self.date.clone().into());
        row.insert("timestamp".into(), self.timestamp.into());
        row.insert("count".into(), self.count.into());
        row.insert("success_count".into(), self.success_count.into());
        row.insert("fail_count".into(), self.fail_count.into());
        for key in keys {
            if let Some(counts) = self.events.get(&key.event_id) {
                row.insert(format!("{}_count", key.event_key), counts.count.into());
                row.insert(
                    format!("{}_success", key.event_key),
                    counts.success_count.into(),
                );
                row.insert(format!("{}_fail", key.event_key), counts.fail_count.into());
            }
        }
        serde_json::Value::Object(row)
    }
}

/// Filter selection for one panel. An empty set is the "all" sentinel: no
/// restriction on that dimension, not "nothing selected".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub events: BTreeSet<EventId>,
    #[serde(default)]
    pub platforms: BTreeSet<i64>,
    #[serde(default)]
    pub pos: BTreeSet<i64>,
    #[serde(default)]
    pub sources: BTreeSet<i64>,
}

/// Inclusive query window. Bucket granularity is a single policy shared by
/// every consumer: hourly when the window spans at most seven days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Number of days the range spans, rounded up
    pub fn span_days(&self) -> i64 {
        let secs = (self.to - self.from).num_seconds().max(0);
        (secs + 86_399) / 86_400
    }

    pub fn is_hourly(&self) -> bool {
        self.span_days() <= 7
    }
}

/// Pre-aggregated name/value slice for pie-style breakdowns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: u64,
}

/// Distribution response from the fetch collaborator: one slice list per
/// breakdown dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    #[serde(default)]
    pub platform: Vec<NameValue>,
    #[serde(default)]
    pub pos: Vec<NameValue>,
    #[serde(default)]
    pub source: Vec<NameValue>,
}

/// Everything one panel needs to render. Replaced wholesale on every refresh
/// so readers always observe a consistent snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelData {
    pub graph_data: Vec<AggregatedPoint>,
    pub event_keys: Vec<EventKeyInfo>,
    pub pie_chart_data: Distribution,
    pub loading: bool,
    pub error: Option<String>,
    /// Filter snapshot that produced `graph_data`
    pub filters: FilterState,
    /// Date range snapshot that produced `graph_data`
    pub date_range: DateRange,
    pub show_legend: bool,
}

impl PanelData {
    /// Placeholder for a panel that has not loaded yet
    pub fn empty(filters: FilterState, date_range: DateRange, show_legend: bool) -> Self {
        Self {
            graph_data: Vec::new(),
            event_keys: Vec::new(),
            pie_chart_data: Distribution::default(),
            loading: false,
            error: None,
            filters,
            date_range,
            show_legend,
        }
    }
}

/// One computed funnel stage. `percentage` and `dropoff_percentage` are
/// derived from `count` in the same pass that assembles the stage, never
/// stored independently of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStageData {
    /// `None` only for the synthetic combined final stage, which aggregates
    /// multiple child events and has no catalog identity of its own
    pub event_id: Option<EventId>,
    pub event_name: String,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_delay: Option<f64>,
    pub total_users: u64,
    pub new_users: u64,
    pub unique_users: u64,
    /// Of the first stage's count; raw and unclamped so noisy data is visible
    pub percentage: f64,
    /// Vs the previous stage; positive means the count decreased
    pub dropoff_percentage: f64,
    pub is_multiple: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FunnelStageData>>,
}

impl FunnelStageData {
    /// Percentage clamped to [0, 100] for bar rendering
    pub fn display_percentage(&self) -> f64 {
        self.percentage.clamp(0.0, 100.0)
    }
}

/// One declared funnel stage (input to the calculator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelStage {
    pub event_id: EventId,
    pub event_name: String,
}

/// Sub-filter dimension for funnel counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubFilterDimension {
    Status,
    Cache,
}

/// Restricts funnel counting to records matching one of the listed sub-values.
/// The filtered total replaces the unfiltered one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubFilter {
    pub dimension: SubFilterDimension,
    pub values: Vec<String>,
}

/// What the funnel measures per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricMode {
    #[default]
    Count,
    AvgDelay,
}

/// One day's 24-hour series for the day-over-day overlay. A `None` hour means
/// "no data" (including not-yet-elapsed hours of today), distinct from a
/// measured zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayComparisonSeries {
    /// Stable key, "YYYY-MM-DD"
    pub day_key: String,
    /// Display label, "Jan 3"
    pub label: String,
    /// Line color assigned oldest-first from a fixed palette
    pub color: String,
    pub hourly_values: [Option<u64>; 24],
}
