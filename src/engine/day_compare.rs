//! Day-over-day overlay comparison
//!
//! Regroups raw records into per-day, per-hour series (at most the seven most
//! recent calendar days) so multiple days can be overlaid on one 24-hour axis.
//!
//! NOTE: unlike every other filter in the engine, an empty event filter here
//! means "nothing selected", not "all events". Unifying the two conventions
//! would change displayed totals, so the inversion is deliberate.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::engine::models::{DayComparisonSeries, EventId, EventRecord};

/// Fixed overlay palette, assigned oldest day first
const DAY_PALETTE: [&str; 7] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc949", "#b07aa1",
];

/// Maximum number of days overlaid at once
pub const MAX_COMPARISON_DAYS: usize = 7;

/// Build aligned 24-hour series for the most recent days present in
/// `records`, oldest first.
///
/// A cell is `None` whenever no filtered record contributed to it, so "no
/// data" is never collapsed into a measured zero. For the current day
/// (relative to the caller-supplied `now`), hours past the current hour are
/// forced to `None` so a live series stops at the present moment.
pub fn build_day_comparison(
    records: &[EventRecord],
    event_filter: &BTreeSet<EventId>,
    now: DateTime<Utc>,
) -> Vec<DayComparisonSeries> {
    // Days come from every record, so a day with nothing selected still
    // appears (as an all-null series) rather than vanishing from the legend.
    let mut cells: BTreeMap<NaiveDate, [Option<u64>; 24]> = BTreeMap::new();
    for record in records {
        cells.entry(record.timestamp.date_naive()).or_insert([None; 24]);
    }

    for record in records {
        if !event_filter.contains(&record.event_id) {
            continue;
        }
        let day = record.timestamp.date_naive();
        let hour = record.timestamp.hour() as usize;
        if let Some(hours) = cells.get_mut(&day) {
            hours[hour] = Some(hours[hour].unwrap_or(0) + record.count);
        }
    }

    let today = now.date_naive();
    let current_hour = now.hour() as usize;

    let days: Vec<NaiveDate> = cells.keys().copied().collect();
    let keep = days.len().saturating_sub(MAX_COMPARISON_DAYS);

    days[keep..]
        .iter()
        .enumerate()
        .map(|(i, day)| {
            let mut hourly_values = cells[day];
            if *day == today {
                // Not-yet-elapsed hours must not render as zero activity
                for hour in (current_hour + 1)..24 {
                    hourly_values[hour] = None;
                }
            }
            DayComparisonSeries {
                day_key: format!("{:04}-{:02}-{:02}", day.year(), day.month(), day.day()),
                label: day.format("%b %-d").to_string(),
                color: DAY_PALETTE[i % DAY_PALETTE.len()].to_string(),
                hourly_values,
            }
        })
        .collect()
}
