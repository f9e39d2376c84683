//! Fetch-or-fallback resolution
//!
//! Decides per request whether a source is answered from cache, from a live
//! fetch bounded by a timeout, from the last good (stale) entry, or from the
//! static sample. Upstream failures never escape as errors; they become the
//! `error` string on a degraded [`Resolution`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::store::{CacheEntry, CacheStore};
use crate::data::sample::sample_for;
use crate::data::{FetchError, Record, SourceFetcher};

/// Where the records of a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Fresh cache entry, no network call
    Cache,
    /// Fetched during this request
    Live,
    /// Fetch failed; last good entry served
    StaleCache,
    /// Fetch failed and nothing cached; static sample served
    SampleFallback,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Cache => "cache",
            Provenance::Live => "live",
            Provenance::StaleCache => "stale_cache",
            Provenance::SampleFallback => "sample_fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The answer for one source key
#[derive(Debug, Clone)]
pub struct Resolution {
    pub source_key: String,
    pub records: Arc<Vec<Record>>,
    pub provenance: Provenance,
    /// Why the answer is degraded, when it is
    pub error: Option<String>,
    /// Fetch time of the served records; `None` for samples
    pub fetched_at: Option<DateTime<Utc>>,
    /// Upstream rows dropped during normalization (live fetches only)
    pub dropped: usize,
}

impl Resolution {
    fn from_entry(entry: CacheEntry, provenance: Provenance, error: Option<String>) -> Self {
        Self {
            records: entry.data().cloned().unwrap_or_default(),
            fetched_at: entry.fetched_at(),
            source_key: entry.source_key,
            provenance,
            error,
            dropped: 0,
        }
    }

    fn sample(source_key: &str, error: Option<String>) -> Self {
        Self {
            source_key: source_key.to_string(),
            records: Arc::new(sample_for(source_key)),
            provenance: Provenance::SampleFallback,
            error,
            fetched_at: None,
            dropped: 0,
        }
    }

    /// Seconds since the served records were fetched
    pub fn age_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.fetched_at
            .map(|fetched_at| (now - fetched_at).num_seconds())
    }
}

/// Resolves source keys against the cache and the registered fetchers
pub struct FallbackPolicy {
    store: Arc<CacheStore>,
    fetchers: HashMap<String, Arc<dyn SourceFetcher>>,
    fetch_timeout: Duration,
}

impl FallbackPolicy {
    /// Creates a policy; fetchers are registered under their own [`SourceFetcher::key`]
    pub fn new(
        store: Arc<CacheStore>,
        fetchers: Vec<Arc<dyn SourceFetcher>>,
        fetch_timeout: Duration,
    ) -> Self {
        let fetchers = fetchers
            .into_iter()
            .map(|fetcher| (fetcher.key().to_string(), fetcher))
            .collect();
        Self {
            store,
            fetchers,
            fetch_timeout,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Resolves `source_key`, blocking on a fetch when the cache is not fresh
    pub async fn resolve(&self, source_key: &str, ttl: Duration) -> Resolution {
        self.resolve_at(source_key, ttl, Utc::now()).await
    }

    /// [`FallbackPolicy::resolve`] with an explicit clock reading
    pub async fn resolve_at(&self, source_key: &str, ttl: Duration, now: DateTime<Utc>) -> Resolution {
        let entry = self.store.get(source_key);
        if entry.is_fresh(now, ttl) {
            tracing::debug!(source = source_key, "serving fresh cache");
            return Resolution::from_entry(entry, Provenance::Cache, None);
        }
        self.fetch_or_fallback(source_key, now).await
    }

    /// Answers immediately from whatever is stored, without any fetch
    ///
    /// Fresh entries are tagged `cache`, expired ones `stale_cache`, and
    /// missing ones fall back to the sample.
    pub fn peek(&self, source_key: &str, ttl: Duration, now: DateTime<Utc>) -> Resolution {
        let entry = self.store.get(source_key);
        if entry.is_empty() {
            return Resolution::sample(source_key, Some("cache is warming up".to_string()));
        }
        let provenance = if entry.is_fresh(now, ttl) {
            Provenance::Cache
        } else {
            Provenance::StaleCache
        };
        Resolution::from_entry(entry, provenance, None)
    }

    /// Fetches `source_key` now, storing a non-empty result or falling back
    ///
    /// `started_at` is the clock reading when the fetch begins; the stored
    /// fetch time adds the time the fetch actually took.
    pub async fn fetch_or_fallback(&self, source_key: &str, started_at: DateTime<Utc>) -> Resolution {
        let Some(fetcher) = self.fetchers.get(source_key) else {
            tracing::warn!(source = source_key, "no fetcher registered");
            return Resolution::sample(source_key, Some(format!("unknown source '{}'", source_key)));
        };

        let clock = Instant::now();
        let outcome = match tokio::time::timeout(self.fetch_timeout, fetcher.fetch()).await {
            Ok(Ok(batch)) if batch.records.is_empty() => Err(FetchError::Empty),
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        };
        let elapsed = chrono::Duration::from_std(clock.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        let fetched_at = started_at + elapsed;

        match outcome {
            Ok(batch) => {
                tracing::info!(
                    source = source_key,
                    records = batch.records.len(),
                    dropped = batch.dropped,
                    elapsed_ms = elapsed.num_milliseconds(),
                    "live fetch succeeded"
                );
                let dropped = batch.dropped;
                let records = batch.records;
                self.store.put(source_key, records.clone(), fetched_at);
                Resolution {
                    source_key: source_key.to_string(),
                    records: Arc::new(records),
                    provenance: Provenance::Live,
                    error: None,
                    fetched_at: Some(fetched_at),
                    dropped,
                }
            }
            Err(err) => self.fall_back(source_key, err),
        }
    }

    fn fall_back(&self, source_key: &str, err: FetchError) -> Resolution {
        let reason = err.to_string();
        let previous = self.store.get(source_key);
        if previous.is_empty() {
            tracing::warn!(source = source_key, error = %reason, "fetch failed, serving sample data");
            Resolution::sample(source_key, Some(reason))
        } else {
            tracing::warn!(source = source_key, error = %reason, "fetch failed, serving stale cache");
            Resolution::from_entry(previous, Provenance::StaleCache, Some(reason))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{Batch, Field};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What a [`FakeFetcher`] does on its next call
    #[derive(Debug, Clone)]
    pub(crate) enum Script {
        Records(Vec<&'static str>),
        /// Records plus a count of rows normalization dropped
        Partial(Vec<&'static str>, usize),
        Empty,
        Fail,
        Hang,
        Panic,
    }

    /// Scripted fetcher that counts calls
    pub(crate) struct FakeFetcher {
        key: String,
        script: Mutex<Script>,
        pub(crate) calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeFetcher {
        pub(crate) fn new(key: &str, script: Script) -> Arc<Self> {
            Self::with_delay(key, script, Duration::ZERO)
        }

        pub(crate) fn with_delay(key: &str, script: Script, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                key: key.to_string(),
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        pub(crate) fn set(&self, script: Script) {
            *self.script.lock().unwrap() = script;
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        fn key(&self) -> &str {
            &self.key
        }

        async fn fetch(&self) -> Result<Batch, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let script = self.script.lock().unwrap().clone();
            match script {
                Script::Records(names) => Ok(fake_batch(names, 0)),
                Script::Partial(names, dropped) => Ok(fake_batch(names, dropped)),
                Script::Empty => Ok(Batch::default()),
                Script::Fail => Err(FetchError::Status(502)),
                Script::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Script::Panic => panic!("upstream client bug"),
            }
        }
    }

    fn fake_batch(names: Vec<&'static str>, dropped: usize) -> Batch {
        Batch {
            records: names
                .into_iter()
                .map(|name| {
                    Record::builder()
                        .set(Field::Commodity, name)
                        .set(Field::Source, "Fake upstream")
                        .build()
                })
                .collect(),
            dropped,
        }
    }

    fn policy_with(fetcher: Arc<FakeFetcher>) -> FallbackPolicy {
        FallbackPolicy::new(
            Arc::new(CacheStore::new()),
            vec![fetcher as Arc<dyn SourceFetcher>],
            Duration::from_secs(15),
        )
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_720_000_000 + seconds, 0).expect("valid timestamp")
    }

    const TTL: Duration = Duration::from_secs(300);

    fn commodities(resolution: &Resolution) -> Vec<String> {
        resolution
            .records
            .iter()
            .map(|record| record.text(Field::Commodity))
            .collect()
    }

    #[tokio::test]
    async fn test_first_request_fetches_live() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Records(vec!["Paddy", "Cotton"]));
        let policy = policy_with(fetcher.clone());

        let resolution = policy.resolve_at("agmarknet", TTL, at(0)).await;

        assert_eq!(resolution.provenance, Provenance::Live);
        assert_eq!(commodities(&resolution), vec!["Paddy", "Cotton"]);
        assert!(resolution.error.is_none());
        assert_eq!(fetcher.calls(), 1);
        assert!(!policy.store().get("agmarknet").is_empty());
    }

    #[tokio::test]
    async fn test_read_just_inside_ttl_is_served_from_cache() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Records(vec!["Paddy"]));
        let policy = policy_with(fetcher.clone());
        policy.resolve_at("agmarknet", TTL, at(0)).await;

        let resolution = policy.resolve_at("agmarknet", TTL, at(299)).await;

        assert_eq!(resolution.provenance, Provenance::Cache);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_read_past_ttl_triggers_fetch() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Records(vec!["Paddy"]));
        let policy = policy_with(fetcher.clone());
        policy.resolve_at("agmarknet", TTL, at(0)).await;

        let resolution = policy.resolve_at("agmarknet", TTL, at(301)).await;

        assert_eq!(resolution.provenance, Provenance::Live);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_with_previous_entry_serves_stale_cache() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Records(vec!["Paddy"]));
        let policy = policy_with(fetcher.clone());
        policy.resolve_at("agmarknet", TTL, at(0)).await;

        fetcher.set(Script::Fail);
        let resolution = policy.resolve_at("agmarknet", TTL, at(1_000)).await;

        assert_eq!(resolution.provenance, Provenance::StaleCache);
        assert_eq!(commodities(&resolution), vec!["Paddy"]);
        assert_eq!(resolution.error.as_deref(), Some("Upstream returned HTTP 502"));
        assert!(matches!(resolution.age_seconds(at(1_000)), Some(999..=1_000)));
    }

    #[tokio::test]
    async fn test_failure_without_previous_entry_serves_sample() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Fail);
        let policy = policy_with(fetcher);

        let resolution = policy.resolve_at("agmarknet", TTL, at(0)).await;

        assert_eq!(resolution.provenance, Provenance::SampleFallback);
        assert_eq!(*resolution.records, sample_for("agmarknet"));
        assert!(resolution.error.is_some());
        assert!(policy.store().get("agmarknet").is_empty());
    }

    #[tokio::test]
    async fn test_empty_success_is_treated_as_failure() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Records(vec!["Paddy"]));
        let policy = policy_with(fetcher.clone());
        policy.resolve_at("agmarknet", TTL, at(0)).await;

        fetcher.set(Script::Empty);
        let resolution = policy.resolve_at("agmarknet", TTL, at(400)).await;

        assert_eq!(resolution.provenance, Provenance::StaleCache);
        assert_eq!(commodities(&resolution), vec!["Paddy"]);
        assert_eq!(resolution.error.as_deref(), Some("Upstream returned no records"));
        // The failed fetch left the earlier entry in place
        assert_eq!(policy.store().get("agmarknet").fetched_at().map(|t| t <= at(1)), Some(true));
    }

    #[tokio::test]
    async fn test_stale_entry_is_served_indefinitely() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Records(vec!["Paddy"]));
        let policy = policy_with(fetcher.clone());
        policy.resolve_at("agmarknet", TTL, at(0)).await;
        fetcher.set(Script::Fail);

        let much_later = at(60 * 60 * 24 * 365);
        let resolution = policy.resolve_at("agmarknet", TTL, much_later).await;

        assert_eq!(resolution.provenance, Provenance::StaleCache);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_fetch_times_out_to_sample() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Hang);
        let policy = FallbackPolicy::new(
            Arc::new(CacheStore::new()),
            vec![fetcher as Arc<dyn SourceFetcher>],
            Duration::from_secs(10),
        );

        let resolution = policy.resolve_at("agmarknet", TTL, at(0)).await;

        assert_eq!(resolution.provenance, Provenance::SampleFallback);
        assert_eq!(resolution.error.as_deref(), Some("Fetch timed out after 10s"));
    }

    #[tokio::test]
    async fn test_unknown_source_is_empty_sample() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Records(vec!["Paddy"]));
        let policy = policy_with(fetcher);

        let resolution = policy.resolve_at("nowhere", TTL, at(0)).await;

        assert_eq!(resolution.provenance, Provenance::SampleFallback);
        assert!(resolution.records.is_empty());
        assert_eq!(resolution.error.as_deref(), Some("unknown source 'nowhere'"));
    }

    #[tokio::test]
    async fn test_peek_never_fetches() {
        let fetcher = FakeFetcher::new("agmarknet", Script::Records(vec!["Paddy"]));
        let policy = policy_with(fetcher.clone());

        let cold = policy.peek("agmarknet", TTL, at(0));
        assert_eq!(cold.provenance, Provenance::SampleFallback);

        policy.resolve_at("agmarknet", TTL, at(0)).await;
        assert_eq!(policy.peek("agmarknet", TTL, at(10)).provenance, Provenance::Cache);
        assert_eq!(policy.peek("agmarknet", TTL, at(900)).provenance, Provenance::StaleCache);
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_provenance_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Provenance::SampleFallback).unwrap(),
            "\"sample_fallback\""
        );
        assert_eq!(Provenance::StaleCache.to_string(), "stale_cache");
    }
}
