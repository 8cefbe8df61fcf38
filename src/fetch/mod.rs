//! Fetch collaborator boundary
//!
//! The engine never aggregates server-side: it asks an external telemetry
//! service for raw rows covering a resolved filter/date query and does all
//! bucketing locally. This module defines that boundary and the reqwest-based
//! implementation used by the server binary.

mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::models::{DateRange, Distribution, EventRecord, FilterState};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch request failed: {0}")]
    Transport(String),
    #[error("fetch collaborator returned status {0}")]
    Status(u16),
    #[error("invalid fetch response payload: {0}")]
    Decode(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Resolved query passed to the collaborator. Empty id vectors mean "no
/// filter on this dimension" and are passed through unmodified; the "all"
/// sentinel is resolved before this point, never by the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchQuery {
    pub event_ids: Vec<i64>,
    pub platform_ids: Vec<i64>,
    pub pos_ids: Vec<i64>,
    pub source_ids: Vec<i64>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl FetchQuery {
    pub fn new(filters: &FilterState, range: &DateRange) -> Self {
        Self {
            event_ids: filters.events.iter().copied().collect(),
            platform_ids: filters.platforms.iter().copied().collect(),
            pos_ids: filters.pos.iter().copied().collect(),
            source_ids: filters.sources.iter().copied().collect(),
            from: range.from,
            to: range.to,
        }
    }
}

/// Raw time-series response shape: `{ "data": [record, ...] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesResponse {
    #[serde(default)]
    pub data: Vec<EventRecord>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch raw per-event time-series rows for the query window
    async fn fetch_series(&self, query: &FetchQuery) -> FetchResult<Vec<EventRecord>>;

    /// Fetch pre-aggregated platform/POS/source distributions for pie-style
    /// breakdowns
    async fn fetch_distribution(&self, query: &FetchQuery) -> FetchResult<Distribution>;
}
