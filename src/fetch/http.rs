//! reqwest-based fetch collaborator client

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::{FetchError, FetchQuery, FetchResult, Fetcher, SeriesResponse};
use crate::engine::models::{Distribution, EventRecord};

/// HTTP client for the telemetry fetch service.
///
/// Expects two endpoints under the configured base URL:
/// `GET /timeseries` returning `{"data": [...]}` and `GET /distribution`
/// returning `{"platform": [...], "pos": [...], "source": [...]}`.
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn join_ids(ids: &[i64]) -> String {
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &FetchQuery) -> FetchResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("event_ids", Self::join_ids(&query.event_ids)),
                ("platform_ids", Self::join_ids(&query.platform_ids)),
                ("pos_ids", Self::join_ids(&query.pos_ids)),
                ("source_ids", Self::join_ids(&query.source_ids)),
                ("from", query.from.to_rfc3339()),
                ("to", query.to.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_series(&self, query: &FetchQuery) -> FetchResult<Vec<EventRecord>> {
        let response: SeriesResponse = self.get_json("timeseries", query).await?;
        Ok(response.data)
    }

    async fn fetch_distribution(&self, query: &FetchQuery) -> FetchResult<Distribution> {
        self.get_json("distribution", query).await
    }
}
