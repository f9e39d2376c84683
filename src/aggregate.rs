//! Multi-source aggregation
//!
//! Resolves every planned source and concatenates their records in plan
//! order. No deduplication is done: the same commodity reported by two
//! sources appears twice, each row tagged with its own `Source`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;

use crate::cache::{FallbackPolicy, Provenance, Resolution};
use crate::data::sample::{sample_for_location, Location};
use crate::data::Record;
use crate::refresh::Refresher;

/// One source to aggregate and how long its cache stays fresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePlan {
    pub key: String,
    pub ttl: Duration,
}

impl SourcePlan {
    pub fn new(key: &str, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            ttl,
        }
    }
}

/// How stale sources are handled during aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fetch stale sources inline, waiting up to the fetch timeout
    Blocking,
    /// Answer from the store right away and refresh stale sources in the background
    Immediate,
}

/// Per-source provenance in an aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub key: String,
    pub provenance: Provenance,
    pub count: usize,
    /// Upstream rows rejected by normalization on a live fetch
    pub dropped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<i64>,
}

/// Merged records from every planned source
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub records: Vec<Record>,
    pub sources: Vec<SourceSummary>,
}

impl Aggregate {
    fn from_resolutions(resolutions: Vec<Resolution>) -> Self {
        let now = Utc::now();
        let mut aggregate = Aggregate::default();
        for resolution in resolutions {
            aggregate.sources.push(SourceSummary {
                key: resolution.source_key.clone(),
                provenance: resolution.provenance,
                count: resolution.records.len(),
                dropped: resolution.dropped,
                error: resolution.error.clone(),
                age_seconds: resolution.age_seconds(now),
            });
            aggregate.records.extend(resolution.records.iter().cloned());
        }
        aggregate
    }

    /// Overall provenance: the shared one, `"mixed"`, or `"none"` for an empty plan
    pub fn provenance_label(&self) -> String {
        let mut provenances = self.sources.iter().map(|source| source.provenance);
        match provenances.next() {
            None => "none".to_string(),
            Some(first) if provenances.all(|p| p == first) => first.to_string(),
            Some(_) => "mixed".to_string(),
        }
    }

    /// Every source error, prefixed with its key
    pub fn error(&self) -> Option<String> {
        let errors: Vec<String> = self
            .sources
            .iter()
            .filter_map(|source| {
                source
                    .error
                    .as_ref()
                    .map(|error| format!("{}: {}", source.key, error))
            })
            .collect();
        (!errors.is_empty()).then(|| errors.join("; "))
    }
}

/// Resolves and merges the configured sources
#[derive(Clone)]
pub struct Aggregator {
    policy: Arc<FallbackPolicy>,
    refresher: Refresher,
    plan: Vec<SourcePlan>,
}

impl Aggregator {
    pub fn new(policy: Arc<FallbackPolicy>, refresher: Refresher, plan: Vec<SourcePlan>) -> Self {
        Self {
            policy,
            refresher,
            plan,
        }
    }

    pub fn plan(&self) -> &[SourcePlan] {
        &self.plan
    }

    pub fn refresher(&self) -> &Refresher {
        &self.refresher
    }

    /// Resolves every planned source and merges the results in plan order
    pub async fn collect(&self, mode: Mode) -> Aggregate {
        let resolutions = match mode {
            Mode::Blocking => {
                join_all(
                    self.plan
                        .iter()
                        .map(|source| self.policy.resolve(&source.key, source.ttl)),
                )
                .await
            }
            Mode::Immediate => {
                let now = Utc::now();
                let resolutions = self
                    .plan
                    .iter()
                    .map(|source| self.policy.peek(&source.key, source.ttl, now))
                    .collect();
                let started = self.refresher.refresh_stale(&self.plan, now);
                if !started.is_empty() {
                    tracing::debug!(sources = ?started, "scheduled background refresh");
                }
                resolutions
            }
        };
        Aggregate::from_resolutions(resolutions)
    }

    /// Resolves one source in blocking mode; unknown keys fall back to an empty sample
    ///
    /// When the answer is sample data, the sample follows `location`.
    pub async fn collect_one(&self, source_key: &str, location: &Location) -> Aggregate {
        let ttl = self
            .plan
            .iter()
            .find(|source| source.key == source_key)
            .map(|source| source.ttl)
            .unwrap_or(Duration::ZERO);
        let mut resolution = self.policy.resolve(source_key, ttl).await;
        if resolution.provenance == Provenance::SampleFallback && !location.is_empty() {
            resolution.records = Arc::new(sample_for_location(source_key, location));
        }
        Aggregate::from_resolutions(vec![resolution])
    }
}
