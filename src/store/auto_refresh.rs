//! Auto-refresh timer
//!
//! One optional periodic refresh per dashboard session, re-invoking the
//! primary panel's refresh on a fixed interval. The timer is an owned handle
//! with an explicit lifecycle: changing the interval cancels the previous
//! timer before starting a new one, so duplicate concurrent auto-refreshes
//! cannot exist.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time;
use tracing::{info, warn};

use super::PanelStore;

struct TimerHandle {
    shutdown_tx: watch::Sender<bool>,
}

pub struct AutoRefresh {
    store: Arc<PanelStore>,
    active: Mutex<Option<TimerHandle>>,
}

impl AutoRefresh {
    pub fn new(store: Arc<PanelStore>) -> Self {
        Self {
            store,
            active: Mutex::new(None),
        }
    }

    /// Restart the timer with a new interval. Zero disables auto-refresh.
    /// The previous timer is always stopped first, while the handle lock is
    /// held, so two timers never tick concurrently.
    pub async fn set_interval(&self, secs: u64) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            let _ = previous.shutdown_tx.send(true);
        }
        if secs == 0 {
            info!("auto-refresh disabled");
            return;
        }

        let Some(primary) = self.store.primary_panel_id().cloned() else {
            warn!("auto-refresh requested but no panels are configured");
            return;
        };

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        info!(interval_secs = secs, panel = %primary, "auto-refresh enabled");

        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(secs));
            // Skip the first tick which fires immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = store.refresh_panel(&primary).await {
                            warn!(panel = %primary, error = %e, "auto-refresh failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!(panel = %primary, "auto-refresh timer stopped");
                            break;
                        }
                    }
                }
            }
        });

        *active = Some(TimerHandle { shutdown_tx });
    }

    /// Stop the timer, e.g. when the owning dashboard session ends
    pub async fn stop(&self) {
        self.set_interval(0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::models::{
        DateRange, Distribution, EventCatalog, EventRecord, FilterState,
    };
    use crate::fetch::{FetchQuery, FetchResult, Fetcher};
    use crate::store::PanelConfig;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct CountingFetcher {
        queries: StdMutex<Vec<FetchQuery>>,
    }

    impl CountingFetcher {
        fn new() -> Self {
            Self {
                queries: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.queries.lock().unwrap().len()
        }

        fn event_ids_seen(&self) -> Vec<Vec<i64>> {
            self.queries
                .lock()
                .unwrap()
                .iter()
                .map(|q| q.event_ids.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch_series(&self, query: &FetchQuery) -> FetchResult<Vec<EventRecord>> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(Vec::new())
        }

        async fn fetch_distribution(&self, _query: &FetchQuery) -> FetchResult<Distribution> {
            Ok(Distribution::default())
        }
    }

    fn panel(id: &str, event: i64) -> PanelConfig {
        PanelConfig {
            id: id.to_string(),
            name: id.to_string(),
            default_filters: FilterState {
                events: [event].into_iter().collect(),
                ..Default::default()
            },
            default_range: None,
            show_legend: true,
        }
    }

    fn dashboard() -> (Arc<CountingFetcher>, AutoRefresh) {
        let fetcher = Arc::new(CountingFetcher::new());
        let store = Arc::new(PanelStore::new(
            fetcher.clone(),
            vec![panel("primary", 1), panel("secondary", 2)],
            EventCatalog::new(),
            DateRange::new(
                "2024-01-01T00:00:00Z".parse().unwrap(),
                "2024-01-02T00:00:00Z".parse().unwrap(),
            ),
        ));
        (fetcher, AutoRefresh::new(store))
    }

    /// Let the spawned timer task reach its select loop. Only yields, so the
    /// paused test clock never moves here.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_refreshes_only_the_primary_panel() {
        let (fetcher, auto_refresh) = dashboard();
        auto_refresh.set_interval(30).await;
        settle().await;

        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(fetcher.calls(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(fetcher.calls(), 2);

        // Only the first configured panel is ever auto-refreshed
        assert!(fetcher.event_ids_seen().iter().all(|ids| ids == &vec![1]));
    }

    #[tokio::test(start_paused = true)]
    async fn changing_the_interval_stops_the_old_cadence() {
        let (fetcher, auto_refresh) = dashboard();
        auto_refresh.set_interval(30).await;
        settle().await;

        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(fetcher.calls(), 1);

        auto_refresh.set_interval(120).await;
        settle().await;

        // The old 30s cadence would have fired twice in this window
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(fetcher.calls(), 1);

        // The replacement timer ticks on its own schedule
        tokio::time::advance(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_the_timer() {
        let (fetcher, auto_refresh) = dashboard();
        auto_refresh.set_interval(30).await;
        settle().await;

        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(fetcher.calls(), 1);

        auto_refresh.stop().await;
        settle().await;

        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(fetcher.calls(), 1);
    }
}
