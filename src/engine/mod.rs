//! Panel analytics aggregation engine
//!
//! Pure, synchronous transformations over already-fetched telemetry: time
//! bucketing into chart series, layered filter resolution, conversion funnels,
//! and day-over-day overlay comparison. Nothing here suspends or fails for
//! valid-shaped input; fetch errors are handled at the panel-refresh boundary
//! in the store.

pub mod day_compare;
pub mod filters;
pub mod funnel;
pub mod models;
pub mod series;

pub use day_compare::build_day_comparison;
pub use funnel::compute_funnel;
pub use models::{
    AggregatedPoint, DateRange, DayComparisonSeries, Distribution, EventCatalog, EventCounts,
    EventId, EventKeyInfo, EventRecord, FilterState, FunnelStage, FunnelStageData, MetricMode,
    NameValue, PanelData, PanelId, SubFilter, SubFilterDimension,
};
pub use series::{build_series, SeriesBuild};
