//! Panel-keyed data store
//!
//! Holds the latest aggregated series per panel and drives the
//! fetch-then-aggregate refresh cycle. Entries in the panel map are replaced
//! wholesale on every refresh, never field-mutated in place, so readers always
//! observe a consistent snapshot.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::engine::filters::{resolve, resolve_date_range};
use crate::engine::models::{
    DateRange, Distribution, EventCatalog, EventRecord, FilterState, PanelData, PanelId,
};
use crate::engine::series::build_series;
use crate::fetch::{FetchQuery, FetchResult, Fetcher};

fn default_true() -> bool {
    true
}

/// Static definition of one dashboard panel
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PanelConfig {
    pub id: PanelId,
    pub name: String,
    /// Saved default filters for the panel; empty sets mean "all"
    #[serde(default)]
    pub default_filters: FilterState,
    /// Saved default date range; None means the panel follows the global range
    #[serde(default)]
    pub default_range: Option<DateRange>,
    #[serde(default = "default_true")]
    pub show_legend: bool,
}

pub struct PanelStore {
    fetcher: Arc<dyn Fetcher>,
    /// Panels in definition order; the first one is the primary panel
    panels: Vec<PanelConfig>,
    catalog: RwLock<EventCatalog>,

    /// Latest data per panel, replaced wholesale on refresh
    data: DashMap<PanelId, PanelData>,
    /// Mirror of the first configured panel for single-panel consumers
    main_view: RwLock<Option<PanelData>>,

    global_filters: RwLock<FilterState>,
    global_range: RwLock<DateRange>,
    /// Per-panel user overrides, present once a user has touched that panel
    filter_overrides: DashMap<PanelId, FilterState>,
    range_overrides: DashMap<PanelId, DateRange>,

    /// Latest issued request token per panel; completions carrying an older
    /// token are discarded so a slow refresh cannot clobber a newer one
    tokens: DashMap<PanelId, u64>,
    /// Panels with a fetch currently in flight
    in_flight: DashMap<PanelId, ()>,
    /// Panels whose displayed data no longer matches the edited filters/range
    dirty: DashMap<PanelId, ()>,
}

impl PanelStore {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        panels: Vec<PanelConfig>,
        catalog: EventCatalog,
        global_range: DateRange,
    ) -> Self {
        Self {
            fetcher,
            panels,
            catalog: RwLock::new(catalog),
            data: DashMap::new(),
            main_view: RwLock::new(None),
            global_filters: RwLock::new(FilterState::default()),
            global_range: RwLock::new(global_range),
            filter_overrides: DashMap::new(),
            range_overrides: DashMap::new(),
            tokens: DashMap::new(),
            in_flight: DashMap::new(),
            dirty: DashMap::new(),
        }
    }

    pub fn panels(&self) -> &[PanelConfig] {
        &self.panels
    }

    pub fn primary_panel_id(&self) -> Option<&PanelId> {
        self.panels.first().map(|p| &p.id)
    }

    fn is_primary(&self, panel_id: &str) -> bool {
        self.primary_panel_id().map(|p| p.as_str()) == Some(panel_id)
    }

    fn config(&self, panel_id: &str) -> Option<&PanelConfig> {
        self.panels.iter().find(|p| p.id == panel_id)
    }

    /// Latest snapshot for one panel
    pub fn panel_data(&self, panel_id: &str) -> Option<PanelData> {
        self.data.get(panel_id).map(|entry| entry.clone())
    }

    /// Read-only snapshot of every panel's latest data
    pub fn panels_data(&self) -> Vec<(PanelId, PanelData)> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Snapshot of the main (first-panel) view slot
    pub async fn main_view(&self) -> Option<PanelData> {
        self.main_view.read().await.clone()
    }

    pub async fn event_catalog(&self) -> EventCatalog {
        self.catalog.read().await.clone()
    }

    pub async fn set_event_catalog(&self, catalog: EventCatalog) {
        *self.catalog.write().await = catalog;
    }

    /// Effective filters for one panel: user override, else global, else the
    /// panel's saved defaults, per dimension independently
    pub async fn resolved_filters(&self, panel_id: &str) -> FilterState {
        let defaults = self
            .config(panel_id)
            .map(|c| c.default_filters.clone())
            .unwrap_or_default();
        let user_override = self.filter_overrides.get(panel_id).map(|e| e.clone());
        let global = self.global_filters.read().await;
        resolve(&defaults, user_override.as_ref(), &global)
    }

    /// Effective date range for one panel: user override, else the panel's
    /// saved default, else the global range
    pub async fn resolved_date_range(&self, panel_id: &str) -> DateRange {
        let panel_override = self
            .range_overrides
            .get(panel_id)
            .map(|e| *e)
            .or_else(|| self.config(panel_id).and_then(|c| c.default_range));
        resolve_date_range(panel_override, *self.global_range.read().await)
    }

    /// Edits never trigger a refetch; they only mark the dashboard pending.
    /// Refetch is always an explicit action or the auto-refresh timer.
    pub async fn set_global_filters(&self, filters: FilterState) {
        *self.global_filters.write().await = filters;
        self.mark_pending();
    }

    pub async fn set_global_range(&self, range: DateRange) {
        *self.global_range.write().await = range;
        self.mark_pending();
    }

    pub fn set_panel_filters(&self, panel_id: &str, filters: FilterState) {
        self.filter_overrides.insert(panel_id.to_string(), filters);
        self.mark_pending();
    }

    pub fn set_panel_range(&self, panel_id: &str, range: DateRange) {
        self.range_overrides.insert(panel_id.to_string(), range);
        self.mark_pending();
    }

    /// True while any panel's displayed data predates a filter or range edit
    pub fn pending_refresh(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn mark_pending(&self) {
        // Before the initial load there is nothing on screen to go stale
        if self.data.is_empty() {
            return;
        }
        for panel in &self.panels {
            self.dirty.insert(panel.id.clone(), ());
        }
    }

    fn issue_token(&self, panel_id: &str) -> u64 {
        let mut entry = self.tokens.entry(panel_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    fn is_current_token(&self, panel_id: &str, token: u64) -> bool {
        self.tokens.get(panel_id).map(|e| *e) == Some(token)
    }

    /// Replace the panel entry with a loading snapshot (previous data intact)
    fn mark_loading(&self, config: &PanelConfig, filters: &FilterState, range: DateRange) {
        let mut snapshot = self
            .data
            .get(&config.id)
            .map(|entry| entry.clone())
            .unwrap_or_else(|| PanelData::empty(filters.clone(), range, config.show_legend));
        snapshot.loading = true;
        self.data.insert(config.id.clone(), snapshot);
    }

    async fn fetch_panel(
        &self,
        query: &FetchQuery,
    ) -> FetchResult<(Vec<EventRecord>, Distribution)> {
        let records = self.fetcher.fetch_series(query).await?;
        let distribution = self.fetcher.fetch_distribution(query).await?;
        Ok((records, distribution))
    }

    /// Apply a completed fetch for `token`. Returns false when the result is
    /// stale (a newer refresh was issued for the panel meanwhile).
    async fn apply_outcome(
        &self,
        config: &PanelConfig,
        token: u64,
        filters: FilterState,
        range: DateRange,
        outcome: FetchResult<(Vec<EventRecord>, Distribution)>,
    ) -> bool {
        if !self.is_current_token(&config.id, token) {
            debug!(panel = %config.id, token, "discarding stale refresh result");
            return false;
        }

        let data = match outcome {
            Ok((records, pie_chart_data)) => {
                let catalog = self.catalog.read().await;
                let built = build_series(&records, &range, &catalog);
                info!(
                    panel = %config.id,
                    records = records.len(),
                    points = built.points.len(),
                    "panel refreshed"
                );
                self.dirty.remove(&config.id);
                PanelData {
                    graph_data: built.points,
                    event_keys: built.event_keys,
                    pie_chart_data,
                    loading: false,
                    error: None,
                    filters,
                    date_range: range,
                    show_legend: config.show_legend,
                }
            }
            Err(e) => {
                warn!(panel = %config.id, error = %e, "panel refresh failed, keeping last-good data");
                match self.data.get(&config.id).map(|entry| entry.clone()) {
                    // Last-good chart stays up; only the error field changes.
                    // The filter snapshot keeps describing the data on screen.
                    Some(mut previous) => {
                        previous.loading = false;
                        previous.error = Some(e.to_string());
                        previous
                    }
                    None => {
                        let mut empty = PanelData::empty(filters, range, config.show_legend);
                        empty.error = Some(e.to_string());
                        empty
                    }
                }
            }
        };

        self.data.insert(config.id.clone(), data.clone());
        if self.is_primary(&config.id) {
            *self.main_view.write().await = Some(data);
        }
        true
    }

    /// Fetch and re-aggregate one panel. A no-op when the panel is already
    /// loading. Fetch failures are captured on the panel's error field and
    /// never propagate past this boundary.
    pub async fn refresh_panel(&self, panel_id: &str) -> anyhow::Result<()> {
        let config = self
            .config(panel_id)
            .ok_or_else(|| anyhow::anyhow!("unknown panel '{panel_id}'"))?
            .clone();

        if self.in_flight.insert(config.id.clone(), ()).is_some() {
            debug!(panel = %config.id, "refresh ignored, panel already loading");
            return Ok(());
        }

        let token = self.issue_token(&config.id);
        let filters = self.resolved_filters(&config.id).await;
        let range = self.resolved_date_range(&config.id).await;
        self.mark_loading(&config, &filters, range);

        debug!(panel = %config.id, ?range, "refreshing panel");
        let outcome = self.fetch_panel(&FetchQuery::new(&filters, &range)).await;
        self.in_flight.remove(&config.id);

        self.apply_outcome(&config, token, filters, range, outcome)
            .await;
        Ok(())
    }

    /// Refresh every configured panel sequentially, in definition order, so
    /// the fetch collaborator never sees a burst of concurrent requests. One
    /// panel's failure never aborts the iteration.
    pub async fn refresh_all(&self) {
        info!(panels = self.panels.len(), "refreshing all panels");
        for panel in &self.panels {
            if let Err(e) = self.refresh_panel(&panel.id).await {
                warn!(panel = %panel.id, error = %e, "skipping panel refresh");
            }
        }
    }
}
