//! Dashboard API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::engine::models::{
    DateRange, DayComparisonSeries, EventId, FilterState, FunnelStage, FunnelStageData,
    MetricMode, PanelData, SubFilter,
};
use crate::engine::{build_day_comparison, compute_funnel, series};
use crate::fetch::{FetchQuery, Fetcher};
use crate::store::{AutoRefresh, PanelStore};

pub struct AppState {
    pub store: Arc<PanelStore>,
    pub auto_refresh: Arc<AutoRefresh>,
    pub fetcher: Arc<dyn Fetcher>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("{what} not found"),
        }),
    )
}

fn bad_gateway(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: format!("fetch collaborator failed: {e}"),
        }),
    )
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Serialize)]
pub struct PanelSummary {
    pub id: String,
    pub name: String,
    pub loading: bool,
    pub has_data: bool,
    pub error: Option<String>,
}

/// List configured panels with their load status
pub async fn list_panels(State(state): State<Arc<AppState>>) -> Json<Vec<PanelSummary>> {
    let summaries = state
        .store
        .panels()
        .iter()
        .map(|panel| {
            let data = state.store.panel_data(&panel.id);
            PanelSummary {
                id: panel.id.clone(),
                name: panel.name.clone(),
                loading: data.as_ref().map(|d| d.loading).unwrap_or(false),
                has_data: data
                    .as_ref()
                    .map(|d| !d.graph_data.is_empty())
                    .unwrap_or(false),
                error: data.and_then(|d| d.error),
            }
        })
        .collect();
    Json(summaries)
}

/// Latest snapshot for one panel
pub async fn get_panel(
    State(state): State<Arc<AppState>>,
    Path(panel_id): Path<String>,
) -> Result<Json<PanelData>, ApiError> {
    state
        .store
        .panel_data(&panel_id)
        .map(Json)
        .ok_or_else(|| not_found("panel data"))
}

/// Flattened chart rows for one panel, with `{event_key}_*` fields
pub async fn get_panel_chart(
    State(state): State<Arc<AppState>>,
    Path(panel_id): Path<String>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let data = state
        .store
        .panel_data(&panel_id)
        .ok_or_else(|| not_found("panel data"))?;
    let rows = data
        .graph_data
        .iter()
        .map(|p| p.to_chart_row(&data.event_keys))
        .collect();
    Ok(Json(rows))
}

/// Main view slot (mirror of the first configured panel)
pub async fn get_main(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PanelData>, ApiError> {
    state
        .store
        .main_view()
        .await
        .map(Json)
        .ok_or_else(|| not_found("main view"))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub pending_refresh: bool,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        pending_refresh: state.store.pending_refresh(),
    })
}

#[derive(Serialize)]
pub struct PanelSettings {
    pub filters: FilterState,
    pub date_range: DateRange,
}

/// Effective (resolved) filters and date range for one panel
pub async fn get_panel_settings(
    State(state): State<Arc<AppState>>,
    Path(panel_id): Path<String>,
) -> Result<Json<PanelSettings>, ApiError> {
    if !state.store.panels().iter().any(|p| p.id == panel_id) {
        return Err(not_found("panel"));
    }
    Ok(Json(PanelSettings {
        filters: state.store.resolved_filters(&panel_id).await,
        date_range: state.store.resolved_date_range(&panel_id).await,
    }))
}

pub async fn refresh_panel(
    State(state): State<Arc<AppState>>,
    Path(panel_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if !state.store.panels().iter().any(|p| p.id == panel_id) {
        return Err(not_found("panel"));
    }
    if let Err(e) = state.store.refresh_panel(&panel_id).await {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("failed to refresh panel '{panel_id}': {e}"),
            }),
        ));
    }
    Ok(Json(SuccessResponse {
        message: format!("panel '{panel_id}' refreshed"),
    }))
}

pub async fn refresh_all(State(state): State<Arc<AppState>>) -> Json<SuccessResponse> {
    state.store.refresh_all().await;
    Json(SuccessResponse {
        message: "all panels refreshed".to_string(),
    })
}

pub async fn put_global_filters(
    State(state): State<Arc<AppState>>,
    Json(filters): Json<FilterState>,
) -> Json<SuccessResponse> {
    state.store.set_global_filters(filters).await;
    Json(SuccessResponse {
        message: "global filters updated".to_string(),
    })
}

pub async fn put_panel_filters(
    State(state): State<Arc<AppState>>,
    Path(panel_id): Path<String>,
    Json(filters): Json<FilterState>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if !state.store.panels().iter().any(|p| p.id == panel_id) {
        return Err(not_found("panel"));
    }
    state.store.set_panel_filters(&panel_id, filters);
    Ok(Json(SuccessResponse {
        message: format!("panel '{panel_id}' filters updated"),
    }))
}

pub async fn put_global_range(
    State(state): State<Arc<AppState>>,
    Json(range): Json<DateRange>,
) -> Json<SuccessResponse> {
    state.store.set_global_range(range).await;
    Json(SuccessResponse {
        message: "global date range updated".to_string(),
    })
}

pub async fn put_panel_range(
    State(state): State<Arc<AppState>>,
    Path(panel_id): Path<String>,
    Json(range): Json<DateRange>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if !state.store.panels().iter().any(|p| p.id == panel_id) {
        return Err(not_found("panel"));
    }
    state.store.set_panel_range(&panel_id, range);
    Ok(Json(SuccessResponse {
        message: format!("panel '{panel_id}' date range updated"),
    }))
}

#[derive(Deserialize)]
pub struct AutoRefreshRequest {
    /// Interval in seconds; 0 disables the timer
    pub secs: u64,
}

pub async fn put_auto_refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AutoRefreshRequest>,
) -> Json<SuccessResponse> {
    state.auto_refresh.set_interval(req.secs).await;
    Json(SuccessResponse {
        message: if req.secs == 0 {
            "auto-refresh disabled".to_string()
        } else {
            format!("auto-refresh every {}s", req.secs)
        },
    })
}

#[derive(Deserialize)]
pub struct FunnelRequest {
    pub stages: Vec<FunnelStage>,
    #[serde(default)]
    pub final_children: Vec<EventId>,
    #[serde(default)]
    pub sub_filter: Option<SubFilter>,
    #[serde(default)]
    pub metric_mode: MetricMode,
    #[serde(default)]
    pub filters: FilterState,
    pub range: DateRange,
}

/// Fetch raw rows for the request window and compute the funnel directly,
/// bypassing the panel store (used by report/export consumers too)
pub async fn post_funnel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FunnelRequest>,
) -> Result<Json<Vec<FunnelStageData>>, ApiError> {
    let query = FetchQuery::new(&req.filters, &req.range);
    let records = state
        .fetcher
        .fetch_series(&query)
        .await
        .map_err(bad_gateway)?;
    let catalog = state.store.event_catalog().await;
    let funnel = compute_funnel(
        &records,
        &req.stages,
        &req.final_children,
        req.sub_filter.as_ref(),
        req.metric_mode,
        &catalog,
    );
    Ok(Json(funnel))
}

#[derive(Deserialize)]
pub struct DayComparisonRequest {
    /// Events to sum per hour. Empty means nothing selected (all cells null),
    /// deliberately unlike the "all" sentinel used by the other filters.
    #[serde(default)]
    pub event_ids: BTreeSet<EventId>,
    #[serde(default)]
    pub filters: FilterState,
    pub range: DateRange,
}

pub async fn post_day_comparison(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DayComparisonRequest>,
) -> Result<Json<Vec<DayComparisonSeries>>, ApiError> {
    let query = FetchQuery::new(&req.filters, &req.range);
    let records = state
        .fetcher
        .fetch_series(&query)
        .await
        .map_err(bad_gateway)?;
    let comparison = build_day_comparison(&records, &req.event_ids, Utc::now());
    Ok(Json(comparison))
}

#[derive(Deserialize)]
pub struct SeriesRequest {
    #[serde(default)]
    pub filters: FilterState,
    pub range: DateRange,
}

/// Fetch and bucket a series without touching any panel state (direct use of
/// the pure builder for export consumers)
pub async fn post_series(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SeriesRequest>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let query = FetchQuery::new(&req.filters, &req.range);
    let records = state
        .fetcher
        .fetch_series(&query)
        .await
        .map_err(bad_gateway)?;
    let catalog = state.store.event_catalog().await;
    let built = series::build_series(&records, &req.range, &catalog);
    Ok(Json(series::chart_rows(&built)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::models::{Distribution, EventCatalog, EventRecord};
    use crate::fetch::FetchResult;
    use crate::store::PanelConfig;
    use async_trait::async_trait;

    struct StubFetcher;

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch_series(&self, _query: &FetchQuery) -> FetchResult<Vec<EventRecord>> {
            Ok(Vec::new())
        }

        async fn fetch_distribution(&self, _query: &FetchQuery) -> FetchResult<Distribution> {
            Ok(Distribution::default())
        }
    }

    fn state() -> Arc<AppState> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher);
        let store = Arc::new(PanelStore::new(
            Arc::clone(&fetcher),
            vec![PanelConfig {
                id: "main".to_string(),
                name: "Main".to_string(),
                default_filters: Default::default(),
                default_range: None,
                show_legend: true,
            }],
            EventCatalog::new(),
            DateRange::new(
                "2024-01-01T00:00:00Z".parse().unwrap(),
                "2024-01-02T00:00:00Z".parse().unwrap(),
            ),
        ));
        let auto_refresh = Arc::new(AutoRefresh::new(Arc::clone(&store)));
        Arc::new(AppState {
            store,
            auto_refresh,
            fetcher,
        })
    }

    #[tokio::test]
    async fn refresh_unknown_panel_is_not_found() {
        let result = refresh_panel(State(state()), Path("nope".to_string())).await;
        let (status, _) = result.err().unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn refresh_known_panel_succeeds() {
        let state = state();
        refresh_panel(State(Arc::clone(&state)), Path("main".to_string()))
            .await
            .unwrap();
        assert!(state.store.panel_data("main").is_some());
    }
}
