//! Integration tests for the panel data store
//!
//! Drives the full refresh cycle (resolve filters -> fetch -> bucket ->
//! replace snapshot) against an in-process mock fetch collaborator.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pulseboard::engine::models::{
    DateRange, Distribution, EventCatalog, EventRecord, FilterState, NameValue,
};
use pulseboard::fetch::{FetchError, FetchQuery, FetchResult, Fetcher};
use pulseboard::store::{PanelConfig, PanelStore};

/// Serves records only for the event ids the query asked for, so filter
/// resolution is observable end to end.
struct RecordingFetcher {
    rows: Vec<EventRecord>,
    fail: AtomicBool,
    queries: Mutex<Vec<FetchQuery>>,
}

impl RecordingFetcher {
    fn new(rows: Vec<EventRecord>) -> Self {
        Self {
            rows,
            fail: AtomicBool::new(false),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch_series(&self, query: &FetchQuery) -> FetchResult<Vec<EventRecord>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Transport("connection refused".to_string()));
        }
        // Empty id list means no filter on the dimension
        let rows = self
            .rows
            .iter()
            .filter(|r| query.event_ids.is_empty() || query.event_ids.contains(&r.event_id))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn fetch_distribution(&self, _query: &FetchQuery) -> FetchResult<Distribution> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Transport("connection refused".to_string()));
        }
        Ok(Distribution {
            platform: vec![NameValue {
                name: "web".to_string(),
                value: 100,
            }],
            ..Default::default()
        })
    }
}

fn record(event_id: i64, ts: &str, count: u64, success: u64, fail: u64) -> EventRecord {
    serde_json::from_value(serde_json::json!({
        "event_id": event_id,
        "timestamp": ts,
        "count": count,
        "success_count": success,
        "fail_count": fail,
    }))
    .unwrap()
}

fn rows() -> Vec<EventRecord> {
    vec![
        record(1, "2024-01-01T10:00:00Z", 10, 8, 2),
        record(2, "2024-01-01T10:00:00Z", 4, 4, 0),
        record(1, "2024-01-01T11:00:00Z", 6, 5, 1),
    ]
}

fn panel(id: &str, event_ids: &[i64]) -> PanelConfig {
    PanelConfig {
        id: id.to_string(),
        name: id.to_string(),
        default_filters: FilterState {
            events: event_ids.iter().copied().collect(),
            ..Default::default()
        },
        default_range: None,
        show_legend: true,
    }
}

fn catalog() -> EventCatalog {
    let mut catalog = EventCatalog::new();
    catalog.insert(1, "Login".to_string());
    catalog.insert(2, "Checkout".to_string());
    catalog
}

fn hourly_range() -> DateRange {
    DateRange::new(
        "2024-01-01T00:00:00Z".parse().unwrap(),
        "2024-01-02T00:00:00Z".parse().unwrap(),
    )
}

fn store(fetcher: Arc<RecordingFetcher>, panels: Vec<PanelConfig>) -> PanelStore {
    PanelStore::new(fetcher, panels, catalog(), hourly_range())
}

#[tokio::test]
async fn refresh_all_aggregates_each_panel_independently() {
    let fetcher = Arc::new(RecordingFetcher::new(rows()));
    let store = store(
        fetcher.clone(),
        vec![panel("all-events", &[]), panel("logins", &[1])],
    );

    store.refresh_all().await;

    // First panel sees both events, two hourly buckets
    let all = store.panel_data("all-events").unwrap();
    assert_eq!(all.graph_data.len(), 2);
    assert_eq!(all.graph_data[0].count, 14);
    assert_eq!(all.graph_data[0].date, "Jan 1, 10 AM");
    assert_eq!(all.event_keys.len(), 2);
    assert_eq!(all.pie_chart_data.platform[0].name, "web");

    // Second panel's saved default restricts it to event 1
    let logins = store.panel_data("logins").unwrap();
    assert_eq!(logins.event_keys.len(), 1);
    assert_eq!(logins.event_keys[0].event_key, "Login");
    assert_eq!(logins.graph_data[0].count, 10);

    // Sum invariant holds on every aggregated point
    for data in [&all, &logins] {
        for point in &data.graph_data {
            let per_event: u64 = point.events.values().map(|c| c.count).sum();
            assert_eq!(point.count, per_event);
        }
    }

    // The primary panel is mirrored into the main view slot
    let main = store.main_view().await.unwrap();
    assert_eq!(main.graph_data, all.graph_data);
}

#[tokio::test]
async fn global_filters_apply_to_untouched_panels_only() {
    let fetcher = Arc::new(RecordingFetcher::new(rows()));
    let store = store(
        fetcher.clone(),
        vec![panel("first", &[]), panel("second", &[])],
    );
    store.refresh_all().await;

    let mut global = FilterState::default();
    global.events.insert(2);
    store.set_global_filters(global).await;

    let mut touched = FilterState::default();
    touched.events.insert(1);
    store.set_panel_filters("second", touched);

    store.refresh_all().await;

    let first = store.panel_data("first").unwrap();
    assert_eq!(first.event_keys[0].event_name, "Checkout");
    let second = store.panel_data("second").unwrap();
    assert_eq!(second.event_keys[0].event_name, "Login");
}

#[tokio::test]
async fn fetch_failure_is_contained_to_the_failing_refresh() {
    let fetcher = Arc::new(RecordingFetcher::new(rows()));
    let store = store(fetcher.clone(), vec![panel("p1", &[]), panel("p2", &[])]);

    store.refresh_all().await;
    let before = store.panel_data("p1").unwrap().graph_data.clone();

    fetcher.fail.store(true, Ordering::SeqCst);
    store.refresh_all().await;

    // Both panels were still attempted
    assert_eq!(fetcher.queries.lock().unwrap().len(), 4);

    // Error recorded, last-good chart retained
    let after = store.panel_data("p1").unwrap();
    assert!(after.error.is_some());
    assert_eq!(after.graph_data, before);

    // Recovery clears the error and replaces the snapshot
    fetcher.fail.store(false, Ordering::SeqCst);
    store.refresh_panel("p1").await.unwrap();
    assert!(store.panel_data("p1").unwrap().error.is_none());
}

#[tokio::test]
async fn edits_mark_pending_and_never_refetch_on_their_own() {
    let fetcher = Arc::new(RecordingFetcher::new(rows()));
    let store = store(fetcher.clone(), vec![panel("p1", &[])]);
    store.refresh_all().await;
    let fetches_after_load = fetcher.queries.lock().unwrap().len();

    store
        .set_global_range(DateRange::new(
            "2024-02-01T00:00:00Z".parse().unwrap(),
            "2024-02-02T00:00:00Z".parse().unwrap(),
        ))
        .await;

    assert!(store.pending_refresh());
    // No refetch was triggered by the edit itself
    assert_eq!(fetcher.queries.lock().unwrap().len(), fetches_after_load);

    store.refresh_panel("p1").await.unwrap();
    assert!(!store.pending_refresh());
    let data = store.panel_data("p1").unwrap();
    assert_eq!(
        data.date_range.from,
        "2024-02-01T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap()
    );
}

#[tokio::test]
async fn resolved_range_switches_bucket_granularity() {
    let fetcher = Arc::new(RecordingFetcher::new(rows()));
    let store = store(fetcher.clone(), vec![panel("p1", &[])]);

    // 30-day window: daily buckets, both hours of Jan 1 merge
    store
        .set_global_range(DateRange::new(
            "2024-01-01T00:00:00Z".parse().unwrap(),
            "2024-01-31T00:00:00Z".parse().unwrap(),
        ))
        .await;
    store.refresh_panel("p1").await.unwrap();

    let data = store.panel_data("p1").unwrap();
    assert_eq!(data.graph_data.len(), 1);
    assert_eq!(data.graph_data[0].date, "Jan 1");
    assert_eq!(data.graph_data[0].count, 20);
}
