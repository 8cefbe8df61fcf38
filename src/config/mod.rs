use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::models::{EventCatalog, EventId};
use crate::store::PanelConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub fetch_base_url: String,
    /// 0 disables the auto-refresh timer
    pub auto_refresh_secs: u64,
    /// Initial global window, counted back from startup
    pub default_range_days: i64,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Panel layout and event catalog, loaded from a JSON profile file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub panels: Vec<PanelConfig>,
    #[serde(default)]
    pub events: BTreeMap<EventId, String>,
}

impl DashboardConfig {
    /// One unconfigured primary panel, for running without a profile file
    fn single_panel() -> Self {
        Self {
            panels: vec![PanelConfig {
                id: "main".to_string(),
                name: "Main".to_string(),
                default_filters: Default::default(),
                default_range: None,
                show_legend: true,
            }],
            events: BTreeMap::new(),
        }
    }

    pub fn event_catalog(&self) -> EventCatalog {
        self.events.clone()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("PULSEBOARD_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PULSEBOARD_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let fetch_base_url = std::env::var("FETCH_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string());

        let auto_refresh_secs = std::env::var("AUTO_REFRESH_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        let default_range_days = std::env::var("DEFAULT_RANGE_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(7);

        let dashboard = match std::env::var("DASHBOARD_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read dashboard config '{path}'"))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse dashboard config '{path}'"))?
            }
            Err(_) => DashboardConfig::single_panel(),
        };

        if dashboard.panels.is_empty() {
            anyhow::bail!("dashboard config defines no panels");
        }

        Ok(Config {
            server: ServerConfig { host, port },
            fetch_base_url,
            auto_refresh_secs,
            default_range_days,
            dashboard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_config_parses_panels_and_events() {
        let raw = serde_json::json!({
            "panels": [
                {"id": "traffic", "name": "Traffic", "default_filters": {"events": [1, 2]}},
                {"id": "errors", "name": "Errors", "show_legend": false}
            ],
            "events": {"1": "Login", "2": "Checkout"}
        });
        let dashboard: DashboardConfig = serde_json::from_value(raw).unwrap();

        assert_eq!(dashboard.panels.len(), 2);
        assert_eq!(dashboard.panels[0].id, "traffic");
        assert!(dashboard.panels[0].show_legend);
        assert!(!dashboard.panels[1].show_legend);
        assert_eq!(dashboard.event_catalog()[&1], "Login");
    }
}
