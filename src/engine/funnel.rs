//! Multi-stage conversion funnel calculator
//!
//! Sums matching records per declared stage, derives percentage-of-first-stage
//! and stage-to-stage drop-off in the same pass (never stored independently of
//! the counts), and fans the final stage out into a per-child breakdown when
//! multiple events share it.

use crate::engine::models::{
    EventCatalog, EventId, EventRecord, FunnelStage, FunnelStageData, MetricMode, SubFilter,
    SubFilterDimension, sanitize_event_key,
};

/// Raw sums for one stage before percentages are derived
#[derive(Debug, Default, Clone, Copy)]
struct StageMeasure {
    count: u64,
    delay_weighted_sum: f64,
    delay_weight: u64,
    total_users: u64,
    new_users: u64,
    unique_users: u64,
}

impl StageMeasure {
    fn avg_delay(&self) -> f64 {
        if self.delay_weight == 0 {
            0.0
        } else {
            self.delay_weighted_sum / self.delay_weight as f64
        }
    }
}

/// Count contributed by one record, honoring the sub-filter. A sub-filter
/// replaces the unfiltered total: only the listed sub-values are summed.
fn record_count(record: &EventRecord, sub_filter: Option<&SubFilter>) -> u64 {
    match sub_filter {
        None => record.count,
        Some(sf) => {
            let counts = match sf.dimension {
                SubFilterDimension::Status => &record.status_counts,
                SubFilterDimension::Cache => &record.cache_counts,
            };
            sf.values
                .iter()
                .map(|v| counts.get(v).copied().unwrap_or(0))
                .sum()
        }
    }
}

fn measure_stage(
    records: &[EventRecord],
    event_id: EventId,
    event_name: &str,
    sub_filter: Option<&SubFilter>,
) -> StageMeasure {
    let event_key = sanitize_event_key(event_name);
    let total_keys = [
        format!("{event_key}_total_users"),
        format!("{event_id}_total_users"),
        "total_users".to_string(),
    ];
    let new_keys = [
        format!("{event_key}_new_users"),
        format!("{event_id}_new_users"),
        "new_users".to_string(),
    ];
    let unique_keys = [
        format!("{event_key}_unique_users"),
        format!("{event_id}_unique_users"),
        "unique_users".to_string(),
    ];

    let mut measure = StageMeasure::default();
    for record in records.iter().filter(|r| r.event_id == event_id) {
        measure.count += record_count(record, sub_filter);
        if let Some(delay) = record.avg_delay {
            // Weighted by sample count so busier slots dominate the average
            measure.delay_weighted_sum += delay * record.count as f64;
            measure.delay_weight += record.count;
        }
        measure.total_users += record.extra_numeric(&total_keys);
        measure.new_users += record.extra_numeric(&new_keys);
        measure.unique_users += record.extra_numeric(&unique_keys);
    }
    measure
}

/// Percentage of `count` against `denominator`, with zero denominators
/// yielding 0 rather than NaN since these values feed displays directly.
fn percentage_of(count: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        count as f64 / denominator as f64 * 100.0
    }
}

fn dropoff_from(previous: u64, current: u64) -> f64 {
    if previous == 0 {
        0.0
    } else {
        (previous as f64 - current as f64) / previous as f64 * 100.0
    }
}

fn stage_data(
    event_id: Option<EventId>,
    event_name: String,
    measure: &StageMeasure,
    first_count: u64,
    previous_count: Option<u64>,
    metric_mode: MetricMode,
) -> FunnelStageData {
    FunnelStageData {
        event_id,
        event_name,
        count: measure.count,
        avg_delay: match metric_mode {
            MetricMode::Count => None,
            MetricMode::AvgDelay => Some(measure.avg_delay()),
        },
        total_users: measure.total_users,
        new_users: measure.new_users,
        unique_users: measure.unique_users,
        percentage: percentage_of(measure.count, first_count),
        dropoff_percentage: previous_count
            .map(|prev| dropoff_from(prev, measure.count))
            .unwrap_or(0.0),
        is_multiple: false,
        children: None,
    }
}

/// Compute the funnel over raw records.
///
/// Stages are evaluated in declaration order. When `final_children` is
/// non-empty, a synthetic final stage is appended whose count is the sum of
/// all children; child percentages use the first stage's denominator so they
/// are directly comparable to stage percentages. Stages (and children) whose
/// final count is exactly zero are dropped from the output.
pub fn compute_funnel(
    records: &[EventRecord],
    stages: &[FunnelStage],
    final_children: &[EventId],
    sub_filter: Option<&SubFilter>,
    metric_mode: MetricMode,
    catalog: &EventCatalog,
) -> Vec<FunnelStageData> {
    let measures: Vec<StageMeasure> = stages
        .iter()
        .map(|s| measure_stage(records, s.event_id, &s.event_name, sub_filter))
        .collect();

    let first_count = measures.first().map(|m| m.count).unwrap_or(0);

    let mut out: Vec<FunnelStageData> = Vec::with_capacity(stages.len() + 1);
    for (i, (stage, measure)) in stages.iter().zip(&measures).enumerate() {
        let previous = if i == 0 {
            None
        } else {
            Some(measures[i - 1].count)
        };
        out.push(stage_data(
            Some(stage.event_id),
            stage.event_name.clone(),
            measure,
            first_count,
            previous,
            metric_mode,
        ));
    }

    if !final_children.is_empty() {
        let children: Vec<FunnelStageData> = final_children
            .iter()
            .map(|&child_id| {
                let name = catalog
                    .get(&child_id)
                    .cloned()
                    .unwrap_or_else(|| format!("Event {child_id}"));
                let measure = measure_stage(records, child_id, &name, sub_filter);
                stage_data(Some(child_id), name, &measure, first_count, None, metric_mode)
            })
            .filter(|c| c.count > 0)
            .collect();

        let combined_count: u64 = children.iter().map(|c| c.count).sum();
        let combined_measure = StageMeasure {
            count: combined_count,
            ..Default::default()
        };
        let previous_count = measures.last().map(|m| m.count);
        let (event_id, event_name) = if children.len() == 1 {
            (children[0].event_id, children[0].event_name.clone())
        } else {
            let joined = children
                .iter()
                .map(|c| c.event_name.as_str())
                .collect::<Vec<_>>()
                .join(" + ");
            (None, joined)
        };
        let mut combined = stage_data(
            event_id,
            event_name,
            &combined_measure,
            first_count,
            previous_count,
            metric_mode,
        );
        combined.avg_delay = None;
        combined.is_multiple = final_children.len() > 1;
        combined.children = Some(children);
        out.push(combined);
    }

    out.retain(|stage| stage.count > 0);
    out
}
