use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::fetch::Fetcher;
use crate::store::{AutoRefresh, PanelStore};

use super::handlers::{
    get_main, get_panel, get_panel_chart, get_panel_settings, get_status, health_check,
    list_panels, post_day_comparison, post_funnel, post_series, put_auto_refresh,
    put_global_filters, put_global_range, put_panel_filters, put_panel_range, refresh_all,
    refresh_panel, AppState,
};

pub fn create_api_router(
    store: Arc<PanelStore>,
    auto_refresh: Arc<AutoRefresh>,
    fetcher: Arc<dyn Fetcher>,
) -> Router {
    let state = Arc::new(AppState {
        store,
        auto_refresh,
        fetcher,
    });

    Router::new()
        .route("/health", get(health_check))
        .route("/panels", get(list_panels))
        .route("/panels/{id}", get(get_panel))
        .route("/panels/{id}/chart", get(get_panel_chart))
        .route("/panels/{id}/settings", get(get_panel_settings))
        .route("/panels/{id}/refresh", post(refresh_panel))
        .route("/panels/{id}/filters", put(put_panel_filters))
        .route("/panels/{id}/date-range", put(put_panel_range))
        .route("/main", get(get_main))
        .route("/status", get(get_status))
        .route("/refresh-all", post(refresh_all))
        .route("/filters", put(put_global_filters))
        .route("/date-range", put(put_global_range))
        .route("/auto-refresh", put(put_auto_refresh))
        .route("/series", post(post_series))
        .route("/funnel", post(post_funnel))
        .route("/day-comparison", post(post_day_comparison))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
