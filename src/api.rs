//! HTTP surface
//!
//! Every price route answers `200` with whatever the fallback policy produced;
//! degraded answers are flagged through `source` and `error`, never through
//! the status code. Only a malformed request (missing `query` on `/search`,
//! bad JSON on `/mandi`) is rejected by the extractor.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::aggregate::{Aggregate, Aggregator, Mode, SourcePlan, SourceSummary};
use crate::cache::{CacheStatus, CacheStore, FallbackPolicy};
use crate::config::{AppConfig, ConfigError};
use crate::data::sample::Location;
use crate::data::{FeedClient, Geography, GovApiClient, Record, SourceFetcher};
use crate::filter::filter;
use crate::geo::{nearby, Coordinates};
use crate::refresh::Refresher;

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    aggregator: Aggregator,
    store: Arc<CacheStore>,
    geography: Arc<Geography>,
    radius_km: f64,
}

impl AppState {
    /// Wires the cache, policy, refresher and aggregator around `fetchers`
    pub fn new(
        fetchers: Vec<Arc<dyn SourceFetcher>>,
        plan: Vec<SourcePlan>,
        fetch_timeout: Duration,
        geography: Geography,
        radius_km: f64,
    ) -> Self {
        let store = Arc::new(CacheStore::new());
        let policy = Arc::new(FallbackPolicy::new(Arc::clone(&store), fetchers, fetch_timeout));
        let refresher = Refresher::new(Arc::clone(&policy));
        Self {
            aggregator: Aggregator::new(policy, refresher, plan),
            store,
            geography: Arc::new(geography),
            radius_km,
        }
    }

    /// Builds the production state: one shared HTTP client, one fetcher per configured source
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.fetch.user_agent.clone())
            .timeout(config.fetch_timeout())
            .build()?;

        let mut fetchers: Vec<Arc<dyn SourceFetcher>> = Vec::new();
        if config.gov_api.enabled {
            if config.gov_api.api_key.is_empty() {
                tracing::warn!("gov_api has no api key; expect sample data for it");
            }
            fetchers.push(Arc::new(GovApiClient::new(http_client.clone(), &config.gov_api)));
        }
        for feed in &config.feeds {
            fetchers.push(Arc::new(FeedClient::new(http_client.clone(), feed)));
        }

        let geography = match &config.geography_file {
            Some(path) => Geography::from_file(path)?,
            None => Geography::builtin(),
        };

        Ok(Self::new(
            fetchers,
            config.source_plan(),
            config.fetch_timeout(),
            geography,
            config.geo.radius_km,
        ))
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn refresher(&self) -> Refresher {
        self.aggregator.refresher().clone()
    }
}

/// Builds the router with CORS and request tracing
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape-all", get(scrape_all))
        .route("/search", get(search))
        .route("/filter", post(filter_form))
        .route("/geography", get(geography))
        .route("/mandi", post(mandi_nearby))
        .route("/sources/:key", get(source))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct OptionalQuery {
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequiredQuery {
    pub query: String,
}

/// Parameters of `/sources/:key`; `state` and `district` pick the sample served on failure
#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    pub query: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
}

/// Body of every price route
#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub data: Vec<Record>,
    pub count: usize,
    pub query: String,
    pub source: String,
    pub sources: Vec<SourceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<i64>,
}

impl PriceResponse {
    /// Filters `aggregate` by `query`; a missing or blank query echoes `"none"`
    fn new(aggregate: Aggregate, query: Option<String>) -> Self {
        let query = query.filter(|query| !query.trim().is_empty());
        let source = aggregate.provenance_label();
        let error = aggregate.error();
        let data = match &query {
            Some(query) => filter(aggregate.records, query),
            None => aggregate.records,
        };
        Self {
            count: data.len(),
            data,
            query: query.unwrap_or_else(|| "none".to_string()),
            source,
            sources: aggregate.sources,
            error,
            age_seconds: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GeographyResponse {
    pub success: bool,
    #[serde(flatten)]
    pub geography: Geography,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    pub nearby_mandis: Vec<Record>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub checked_at: DateTime<Utc>,
    pub caches: Vec<CacheStatus>,
}

/// Cached answer for every source; stale sources refresh in the background
async fn scrape_all(
    State(state): State<AppState>,
    Query(params): Query<OptionalQuery>,
) -> Json<PriceResponse> {
    let aggregate = state.aggregator.collect(Mode::Immediate).await;
    Json(PriceResponse::new(aggregate, params.query))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<RequiredQuery>,
) -> Json<PriceResponse> {
    let aggregate = state.aggregator.collect(Mode::Blocking).await;
    Json(PriceResponse::new(aggregate, Some(params.query)))
}

async fn filter_form(
    State(state): State<AppState>,
    Form(params): Form<OptionalQuery>,
) -> Json<PriceResponse> {
    let aggregate = state.aggregator.collect(Mode::Immediate).await;
    Json(PriceResponse::new(aggregate, params.query))
}

async fn geography(State(state): State<AppState>) -> Json<GeographyResponse> {
    Json(GeographyResponse {
        success: true,
        geography: state.geography.as_ref().clone(),
    })
}

async fn mandi_nearby(
    State(state): State<AppState>,
    Json(user): Json<Coordinates>,
) -> Json<NearbyResponse> {
    let aggregate = state.aggregator.collect(Mode::Immediate).await;
    let nearby_mandis = nearby(&aggregate.records, user, state.radius_km);
    tracing::debug!(
        latitude = user.latitude,
        longitude = user.longitude,
        found = nearby_mandis.len(),
        "nearby search"
    );
    Json(NearbyResponse {
        count: nearby_mandis.len(),
        nearby_mandis,
    })
}

/// One source in blocking mode, with the age of the records served
async fn source(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<SourceQuery>,
) -> Json<PriceResponse> {
    let location = Location::new(params.state.as_deref(), params.district.as_deref());
    let aggregate = state.aggregator.collect_one(&key, &location).await;
    let age_seconds = aggregate.sources.first().and_then(|s| s.age_seconds);
    let mut response = PriceResponse::new(aggregate, params.query);
    response.age_seconds = age_seconds;
    Json(response)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        checked_at: now,
        caches: state.store.status(now),
    })
}
