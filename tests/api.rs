//! End-to-end tests for the HTTP routes
//!
//! Drives the router in-process with `oneshot`; upstreams are replaced by
//! scripted fetchers so no test touches the network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use mandi::aggregate::SourcePlan;
use mandi::api::{router, AppState};
use mandi::data::{Batch, FetchError, Field, Geography, Record, SourceFetcher};

/// Fetcher returning fixed rows, or failing when told to
struct StaticFetcher {
    key: &'static str,
    rows: Vec<Record>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StaticFetcher {
    fn new(key: &'static str, rows: Vec<Record>) -> Arc<Self> {
        Arc::new(Self {
            key,
            rows,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(key: &'static str) -> Arc<Self> {
        let fetcher = Self::new(key, Vec::new());
        fetcher.failing.store(true, Ordering::SeqCst);
        fetcher
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    fn key(&self) -> &str {
        self.key
    }

    async fn fetch(&self) -> Result<Batch, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Status(503));
        }
        Ok(Batch {
            records: self.rows.clone(),
            dropped: 0,
        })
    }
}

fn row(commodity: &str, market: &str, state: &str) -> Record {
    Record::builder()
        .set(Field::Commodity, commodity)
        .set(Field::State, state)
        .set(Field::District, market)
        .set(Field::Market, market)
        .set(Field::ModalPrice, "2400")
        .set(Field::Source, "Test feed")
        .build()
}

fn app(fetchers: Vec<Arc<StaticFetcher>>) -> Router {
    let plan = fetchers
        .iter()
        .map(|fetcher| SourcePlan::new(fetcher.key, Duration::from_secs(300)))
        .collect();
    let fetchers = fetchers
        .into_iter()
        .map(|f| f as Arc<dyn SourceFetcher>)
        .collect();
    router(AppState::new(
        fetchers,
        plan,
        Duration::from_secs(5),
        Geography::builtin(),
        100.0,
    ))
}

fn two_row_app() -> Router {
    app(vec![StaticFetcher::new(
        "agmarknet",
        vec![
            row("Paddy", "Karimnagar", "Telangana"),
            row("Cotton", "Hyderabad", "Telangana"),
        ],
    )])
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn test_search_or_filter_returns_only_matching_record() {
    let (status, body) = get(two_row_app(), "/search?query=Karimnagar,Paddy").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["Commodity"], "Paddy");
    assert_eq!(body["query"], "Karimnagar,Paddy");
    assert_eq!(body["source"], "live");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_search_keywords_are_ored() {
    let (_, body) = get(two_row_app(), "/search?query=Karimnagar,Cotton").await;
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_search_without_query_is_rejected() {
    let (status, _) = get(two_row_app(), "/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_failure_serves_sample_with_error() {
    let app = app(vec![StaticFetcher::failing("agmarknet")]);

    let (status, body) = get(app, "/search?query=Paddy").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "sample_fallback");
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["Source"], "Agmarknet (sample)");
    assert_eq!(body["error"], "agmarknet: Upstream returned HTTP 503");
}

#[tokio::test]
async fn test_scrape_all_answers_immediately_and_echoes_none() {
    let fetcher = StaticFetcher::new("agmarknet", vec![row("Paddy", "Karimnagar", "Telangana")]);
    let app = app(vec![fetcher.clone()]);

    let (status, body) = get(app.clone(), "/scrape-all").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "none");
    assert_eq!(body["source"], "sample_fallback");
    assert_eq!(body["sources"][0]["provenance"], "sample_fallback");

    // The background refresh lands in the cache shortly after
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (_, body) = get(app.clone(), "/scrape-all").await;
        if body["source"] == "cache" {
            assert_eq!(body["count"], 1);
            assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
            return;
        }
    }
    panic!("background refresh never populated the cache");
}

#[tokio::test]
async fn test_filter_form() {
    let app = two_row_app();
    // Warm the cache so the form is answered from live data
    get(app.clone(), "/search?query=x").await;

    let request = Request::post("/filter")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("query=cotton"))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["Commodity"], "Cotton");
    assert_eq!(body["source"], "cache");
}

#[tokio::test]
async fn test_geography() {
    let (status, body) = get(two_row_app(), "/geography").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["states"]
        .as_array()
        .unwrap()
        .contains(&json!("Telangana")));
    assert!(body["stateDistricts"]["Telangana"]
        .as_array()
        .unwrap()
        .contains(&json!("Karimnagar")));
}

#[tokio::test]
async fn test_mandi_nearby_sorted_with_distance() {
    let app = app(vec![StaticFetcher::new(
        "agmarknet",
        vec![
            row("Cotton", "Warangal", "Telangana"),
            row("Onion", "Pune", "Maharashtra"),
            row("Paddy", "Karimnagar", "Telangana"),
        ],
    )]);
    get(app.clone(), "/search?query=x").await;

    let request = Request::post("/mandi")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "latitude": 18.4386, "longitude": 79.1288 }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["nearby_mandis"][0]["Market"], "Karimnagar");
    assert_eq!(body["nearby_mandis"][0]["DistanceKm"], 0.0);
    assert_eq!(body["nearby_mandis"][1]["Market"], "Warangal");
}

#[tokio::test]
async fn test_mandi_rejects_bad_body() {
    let request = Request::post("/mandi")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"latitude": "north"}"#))
        .unwrap();
    let (status, _) = send(two_row_app(), request).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_single_source_route_reports_age() {
    let app = two_row_app();

    let (_, first) = get(app.clone(), "/sources/agmarknet").await;
    let (_, second) = get(app, "/sources/agmarknet?query=paddy").await;

    assert_eq!(first["source"], "live");
    assert_eq!(second["source"], "cache");
    assert_eq!(second["count"], 1);
    assert!(second["age_seconds"].as_i64().is_some());
}

#[tokio::test]
async fn test_empty_query_parameter_echoes_none() {
    let (status, body) = get(two_row_app(), "/scrape-all?query=").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "none");
}

#[tokio::test]
async fn test_single_source_sample_follows_location() {
    let app = app(vec![StaticFetcher::failing("agmarknet")]);

    let (status, body) = get(
        app,
        "/sources/agmarknet?state=Andhra%20Pradesh&district=Vijayawada&query=chilli",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "sample_fallback");
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["District"], "Vijayawada");
    assert_eq!(body["data"][0]["AvgPrice"], "11000");
    assert_eq!(body["sources"][0]["dropped"], 0);
}

#[tokio::test]
async fn test_single_source_unknown_location_serves_karimnagar() {
    let app = app(vec![StaticFetcher::failing("agmarknet")]);

    let (_, body) = get(app, "/sources/agmarknet?district=Atlantis").await;

    assert_eq!(body["count"], 10);
    assert_eq!(body["data"][0]["District"], "Karimnagar");
}

#[tokio::test]
async fn test_unknown_source_route() {
    let (status, body) = get(two_row_app(), "/sources/nowhere").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
    assert_eq!(body["source"], "sample_fallback");
    assert_eq!(body["error"], "nowhere: unknown source 'nowhere'");
}

#[tokio::test]
async fn test_health() {
    let app = two_row_app();
    get(app.clone(), "/search?query=x").await;

    let (status, body) = get(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "mandi");
    assert_eq!(body["caches"][0]["source_key"], "agmarknet");
    assert_eq!(body["caches"][0]["records"], 2);
}
