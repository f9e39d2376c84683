//! Core data models for the mandi price aggregator
//!
//! This module contains the row-oriented commodity price [`Record`], the
//! normalization rules that turn loosely-shaped upstream rows into uniform
//! records, and the [`SourceFetcher`] seam every upstream client implements.

pub mod feed;
pub mod geography;
pub mod gov_api;
pub mod markets;
pub mod sample;

pub use feed::FeedClient;
pub use geography::Geography;
pub use gov_api::GovApiClient;
pub use markets::{find_market, Market};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Placeholder for prices a source did not supply
pub const SENTINEL_PRICE: &str = "—";

/// Placeholder for names and dates a source did not supply
pub const SENTINEL_TEXT: &str = "N/A";

/// Canonical record fields, in the order they are stored and serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Commodity,
    State,
    District,
    Market,
    MinPrice,
    MaxPrice,
    ModalPrice,
    AvgPrice,
    Date,
    Source,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Commodity,
        Field::State,
        Field::District,
        Field::Market,
        Field::MinPrice,
        Field::MaxPrice,
        Field::ModalPrice,
        Field::AvgPrice,
        Field::Date,
        Field::Source,
    ];

    /// The serialized field name
    pub fn name(self) -> &'static str {
        match self {
            Field::Commodity => "Commodity",
            Field::State => "State",
            Field::District => "District",
            Field::Market => "Market",
            Field::MinPrice => "MinPrice",
            Field::MaxPrice => "MaxPrice",
            Field::ModalPrice => "ModalPrice",
            Field::AvgPrice => "AvgPrice",
            Field::Date => "Date",
            Field::Source => "Source",
        }
    }

    /// Value used when an upstream row leaves the field out
    pub fn sentinel(self) -> &'static str {
        match self {
            Field::MinPrice | Field::MaxPrice | Field::ModalPrice | Field::AvgPrice => {
                SENTINEL_PRICE
            }
            _ => SENTINEL_TEXT,
        }
    }

    /// Matches a loosely written column name ("Min Price", "min_price", "MinPrice")
    pub fn from_column(column: &str) -> Option<Field> {
        let folded: String = column
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        Field::ALL
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(&folded))
    }
}

/// A single cell of a record: upstreams mix quoted and bare numbers
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Number(number) => write!(f, "{}", number),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(text) => serializer.serialize_str(text),
            FieldValue::Number(number) => serializer.serialize_f64(*number),
        }
    }
}

/// Errors raised while normalizing one upstream row
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    /// The row was not a JSON object
    #[error("Row is not an object")]
    NotAnObject,

    /// A canonical field held a nested array or object
    #[error("Field '{0}' has an unsupported value type")]
    UnsupportedValue(&'static str),
}

impl FieldValue {
    /// Converts a JSON cell; `null` becomes `None` so the caller can apply the sentinel
    fn from_json(field: Field, value: &Value) -> Result<Option<FieldValue>, NormalizeError> {
        match value {
            Value::Null => Ok(None),
            Value::String(text) if text.trim().is_empty() => Ok(None),
            Value::String(text) => Ok(Some(FieldValue::Text(text.trim().to_string()))),
            Value::Number(number) => Ok(number.as_f64().map(FieldValue::Number)),
            Value::Bool(flag) => Ok(Some(FieldValue::Text(flag.to_string()))),
            Value::Array(_) | Value::Object(_) => Err(NormalizeError::UnsupportedValue(field.name())),
        }
    }
}

/// One commodity price row
///
/// Records always carry every canonical [`Field`] in canonical order, followed
/// by any enrichment fields (such as `DistanceKm`). They are never mutated
/// after construction; [`Record::with_field`] returns a new record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    /// Starts a record with every canonical field set to its sentinel
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// Normalizes a loosely-shaped JSON row into a record
    ///
    /// Column names are matched with [`Field::from_column`]; unknown columns are
    /// ignored. When the row has no `Source` the given label is used.
    pub fn from_json_row(row: &Value, source_label: &str) -> Result<Record, NormalizeError> {
        let object = row.as_object().ok_or(NormalizeError::NotAnObject)?;

        let mut builder = Record::builder().set(Field::Source, source_label);
        for (column, value) in object {
            let Some(field) = Field::from_column(column) else {
                continue;
            };
            if let Some(value) = FieldValue::from_json(field, value)? {
                builder = builder.set(field, value);
            }
        }
        Ok(builder.build())
    }

    /// Looks up a field by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// String form of a canonical field
    pub fn text(&self, field: Field) -> String {
        self.get(field.name())
            .map(ToString::to_string)
            .unwrap_or_else(|| field.sentinel().to_string())
    }

    /// Iterates over `(name, value)` pairs in field order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns a copy of this record with `name` set to `value`
    ///
    /// An existing field keeps its position; a new one is appended.
    pub fn with_field(&self, name: &str, value: impl Into<FieldValue>) -> Record {
        let value = value.into();
        let mut fields = self.fields.clone();
        match fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => *slot = value,
            None => fields.push((name.to_string(), value)),
        }
        Record { fields }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Builder for [`Record`] that fills omitted canonical fields with sentinels
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    values: [Option<FieldValue>; 10],
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self {
            values: Default::default(),
        }
    }
}

impl RecordBuilder {
    pub fn set(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        let index = Field::ALL
            .iter()
            .position(|candidate| *candidate == field)
            .unwrap_or_default();
        self.values[index] = Some(value.into());
        self
    }

    pub fn build(self) -> Record {
        let fields = Field::ALL
            .into_iter()
            .zip(self.values)
            .map(|(field, value)| {
                let value = value.unwrap_or_else(|| FieldValue::from(field.sentinel()));
                (field.name().to_string(), value)
            })
            .collect();
        Record { fields }
    }
}

/// Records returned by one upstream call, plus the rows normalization dropped
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub records: Vec<Record>,
    pub dropped: usize,
}

impl Batch {
    /// Normalizes every row, dropping (and counting) the ones that fail
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a Value>, source_label: &str) -> Self {
        Self::from_rows_with(rows, |row| Record::from_json_row(row, source_label))
    }

    /// Like [`Batch::from_rows`] with a custom per-row transform
    pub fn from_rows_with<'a>(
        rows: impl IntoIterator<Item = &'a Value>,
        transform: impl Fn(&Value) -> Result<Record, NormalizeError>,
    ) -> Self {
        let mut batch = Batch::default();
        for row in rows {
            match transform(row) {
                Ok(record) => batch.records.push(record),
                Err(err) => {
                    tracing::debug!(error = %err, "dropping upstream row");
                    batch.dropped += 1;
                }
            }
        }
        batch
    }
}

/// Errors that can occur when fetching from an upstream source
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {0}")]
    Status(u16),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Payload parsed but did not have the expected shape
    #[error("Unexpected payload: {0}")]
    Malformed(String),

    /// Upstream answered successfully with zero usable records
    #[error("Upstream returned no records")]
    Empty,

    /// The fetch did not finish within the configured timeout
    #[error("Fetch timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// One upstream source of price records
///
/// Implementations do no caching of their own; freshness and fallback are
/// decided by [`crate::cache::FallbackPolicy`].
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Cache key for this source (e.g. `"gov_api"`)
    fn key(&self) -> &str;

    /// Fetches the current records from the upstream
    async fn fetch(&self) -> Result<Batch, FetchError>;
}
