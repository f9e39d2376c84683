//! Scraped market-data feeds
//!
//! Scraping of individual websites happens outside this crate; a scraper
//! publishes rows already in record shape as JSON, either a bare array or an
//! object with a `data` array. This client fetches and normalizes them.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{Batch, FetchError, SourceFetcher};
use crate::config::FeedConfig;

/// Client for one JSON feed of scraped price rows
#[derive(Debug, Clone)]
pub struct FeedClient {
    http_client: Client,
    key: String,
    label: String,
    url: String,
}

impl FeedClient {
    pub fn new(http_client: Client, config: &FeedConfig) -> Self {
        Self {
            http_client,
            key: config.key.clone(),
            label: config.label.clone(),
            url: config.url.clone(),
        }
    }

    /// `Source` label applied to rows that do not carry their own
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Extracts the row array from either accepted payload shape
fn rows_of(payload: &Value) -> Result<&Vec<Value>, FetchError> {
    match payload {
        Value::Array(rows) => Ok(rows),
        Value::Object(object) => match object.get("data") {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(FetchError::Malformed("expected a 'data' array".to_string())),
        },
        _ => Err(FetchError::Malformed(
            "expected an array of rows".to_string(),
        )),
    }
}

fn parse_feed(body: &str, label: &str) -> Result<Batch, FetchError> {
    let payload: Value = serde_json::from_str(body)?;
    Ok(Batch::from_rows(rows_of(&payload)?, label))
}

#[async_trait]
impl SourceFetcher for FeedClient {
    fn key(&self) -> &str {
        &self.key
    }

    async fn fetch(&self) -> Result<Batch, FetchError> {
        tracing::info!(source = %self.key, url = %self.url, "fetching scraped feed");

        let response = self.http_client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let batch = parse_feed(&text, &self.label)?;
        if batch.dropped > 0 {
            tracing::warn!(
                source = %self.key,
                dropped = batch.dropped,
                kept = batch.records.len(),
                "dropped malformed feed rows"
            );
        }
        Ok(batch)
    }
}
