//! Core data models used throughout Comms Harness.
//!
//! [`NewItem`] is what adapters produce; [`Item`] is what the store returns
//! once a row exists. Timestamps are persisted as Unix milliseconds.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::DecodeError;

/// Build the natural key for a provider record: `"{provider}:{external_id}"`.
pub fn source_key(provider: &str, external_id: &str) -> String {
    format!("{}:{}", provider, external_id)
}

/// A normalized item ready to be upserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewItem {
    /// Natural idempotency key, unique across the store.
    pub source_key: String,
    /// Label of the adapter instance that produced the item (`"chat:team"`).
    pub source: String,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub author: Option<String>,
    /// When the provider says the record happened (sent, updated, starts).
    pub occurred_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl NewItem {
    /// Create an item whose `source` defaults to the key's provider prefix.
    pub fn new(
        source_key: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let source_key = source_key.into();
        let source = source_key
            .split_once(':')
            .map(|(provider, _)| provider.to_string())
            .unwrap_or_else(|| source_key.clone());
        Self {
            source_key,
            source,
            title: title.into(),
            content: content.into(),
            url: None,
            author: None,
            occurred_at: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn with_occurred_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.occurred_at = at;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// SHA-256 over title and content; changes whenever searchable text does.
    pub fn content_hash(&self) -> String {
        content_hash(&self.title, &self.content)
    }
}

pub(crate) fn content_hash(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// A stored item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: i64,
    pub source_key: String,
    pub source: String,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub content_hash: String,
    /// Fixed at first insert.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every upsert; never moves backwards.
    pub updated_at: DateTime<Utc>,
}

/// A vector attached to an item for one embedding model version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedding {
    pub id: i64,
    pub item_id: i64,
    /// Opaque blob; [`crate::embedding::blob_to_vec`] decodes f32 vectors.
    pub vector: Vec<u8>,
    pub model_version: String,
    /// Item content hash at the time the vector was attached.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A key/value settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigVersion {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// One full-text search match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub item_id: i64,
    pub source_key: String,
    pub title: String,
    pub snippet: String,
    /// bm25 score; higher is better.
    pub score: f64,
}

/// One vector similarity match.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarItem {
    pub item_id: i64,
    pub source_key: String,
    pub title: String,
    pub similarity: f32,
}

/// What a batch upsert did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Row ids in input order.
    pub item_ids: Vec<i64>,
}

impl UpsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Read filter for [`crate::store::Store::query`]. All fields are optional
/// and combined with AND.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Exact adapter label (`"chat:team"`).
    pub source: Option<String>,
    /// Prefix of `source_key` (`"chat:"`).
    pub key_prefix: Option<String>,
    pub updated_since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl ItemFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn updated_since(mut self, since: DateTime<Utc>) -> Self {
        self.updated_since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

/// Parse an RFC 3339 provider timestamp.
pub(crate) fn parse_rfc3339(field: &'static str, raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DecodeError::InvalidField {
            field,
            value: raw.to_string(),
        })
}

/// Fractional Unix seconds (`"1700000000.000200"`) to a timestamp.
pub(crate) fn from_unix_seconds(field: &'static str, secs: f64) -> Result<DateTime<Utc>, DecodeError> {
    if !secs.is_finite() {
        return Err(DecodeError::InvalidField {
            field,
            value: secs.to_string(),
        });
    }
    Utc.timestamp_millis_opt((secs * 1000.0).round() as i64)
        .single()
        .ok_or_else(|| DecodeError::InvalidField {
            field,
            value: secs.to_string(),
        })
}

/// `None` for missing or whitespace-only strings.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
