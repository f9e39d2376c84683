//! data.gov.in APMC price client
//!
//! Fetches daily mandi prices from the Government of India open-data API and
//! normalizes each upstream record into a [`Record`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::sample::SOURCE_GOV_API;
use super::{Batch, FetchError, Field, FieldValue, NormalizeError, Record, SourceFetcher};
use crate::config::GovApiConfig;

/// `Source` label stamped on every record from this API
pub const GOV_API_LABEL: &str = "Government (data.gov.in)";

/// Upstream column → canonical field
const COLUMN_MAP: [(&str, Field); 9] = [
    ("commodity", Field::Commodity),
    ("state", Field::State),
    ("district", Field::District),
    ("market", Field::Market),
    ("min_price", Field::MinPrice),
    ("max_price", Field::MaxPrice),
    ("modal_price", Field::ModalPrice),
    ("arrival_price", Field::AvgPrice),
    ("arrival_date", Field::Date),
];

/// Response envelope from data.gov.in
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    records: Option<Vec<Value>>,
}

/// Client for the data.gov.in commodity price resource
#[derive(Debug, Clone)]
pub struct GovApiClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Resource URL (allows override for testing)
    base_url: String,
    api_key: String,
    limit: u32,
}

impl GovApiClient {
    /// Creates a client from configuration, sharing the given HTTP client
    pub fn new(http_client: Client, config: &GovApiConfig) -> Self {
        Self {
            http_client,
            base_url: config.url.clone(),
            api_key: config.api_key.clone(),
            limit: config.limit,
        }
    }

    /// Creates a client pointed at a custom base URL (for testing)
    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into(),
            api_key: String::new(),
            limit: 10,
        }
    }

    /// Fetches prices directly from the API
    async fn fetch_from_api(&self) -> Result<Batch, FetchError> {
        let limit = self.limit.to_string();
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("api-key", self.api_key.as_str()),
                ("format", "json"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        parse_response(&text)
    }
}

/// Parses a raw API body into a batch of normalized records
fn parse_response(body: &str) -> Result<Batch, FetchError> {
    let response: ApiResponse = serde_json::from_str(body)?;
    let rows = response
        .records
        .ok_or_else(|| FetchError::Malformed("missing 'records' array".to_string()))?;

    let batch = Batch::from_rows_with(&rows, normalize_record);
    if batch.dropped > 0 {
        tracing::warn!(
            source = SOURCE_GOV_API,
            dropped = batch.dropped,
            kept = batch.records.len(),
            "dropped malformed government records"
        );
    }
    Ok(batch)
}

/// Maps one data.gov.in record onto the canonical fields
fn normalize_record(row: &Value) -> Result<Record, NormalizeError> {
    let object = row.as_object().ok_or(NormalizeError::NotAnObject)?;

    let mut builder = Record::builder().set(Field::Source, GOV_API_LABEL);
    for (column, field) in COLUMN_MAP {
        let value = match object.get(column) {
            None | Some(Value::Null) => continue,
            Some(Value::String(text)) if text.trim().is_empty() => continue,
            Some(Value::String(text)) => FieldValue::Text(text.trim().to_string()),
            Some(Value::Number(number)) => FieldValue::Text(number.to_string()),
            Some(_) => return Err(NormalizeError::UnsupportedValue(field.name())),
        };
        builder = builder.set(field, value);
    }
    Ok(builder.build())
}

#[async_trait]
impl SourceFetcher for GovApiClient {
    fn key(&self) -> &str {
        SOURCE_GOV_API
    }

    async fn fetch(&self) -> Result<Batch, FetchError> {
        tracing::info!(source = SOURCE_GOV_API, limit = self.limit, "fetching from data.gov.in");
        self.fetch_from_api().await
    }
}
