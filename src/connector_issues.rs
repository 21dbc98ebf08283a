//! Issue tracker connector.
//!
//! Runs a saved query against an issue tracker's search endpoint.
//!
//! # Configuration
//!
//! ```toml
//! [sources.issues.core]
//! base_url = "https://issues.example.com"
//! jql = "project = CORE AND updated >= -7d"
//! max_results = 100
//! headers = { Authorization = "Basic ${ISSUES_AUTH}" }
//! ```
//!
//! # Wire format
//!
//! `POST {base_url}/rest/api/search` with body `{"jql": …, "maxResults": …}`
//! returns
//! `{"issues":[{"key","fields":{"summary","description","status":{"name"},"assignee":{"displayName"},"updated"}}]}`.
//! `updated` may be RFC 3339 or the tracker's `+0000` offset form.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::IssuesSourceConfig;
use crate::error::{DecodeError, FetchError};
use crate::models::{non_empty, parse_rfc3339, source_key, NewItem};
use crate::traits::SourceAdapter;
use crate::transport::{endpoint_url, expand_headers, Headers, HttpTransport};

#[derive(Debug, Deserialize)]
struct SearchPage {
    issues: Vec<Issue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub key: Option<String>,
    pub fields: Option<IssueFields>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueFields {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub status: Option<Named>,
    pub assignee: Option<Person>,
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Named {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Person {
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

pub struct IssuesConnector {
    name: String,
    config: IssuesSourceConfig,
    headers: Headers,
    http: Arc<dyn HttpTransport>,
}

impl IssuesConnector {
    pub fn new(name: &str, config: IssuesSourceConfig, http: Arc<dyn HttpTransport>) -> Self {
        let mut headers = expand_headers(&config.headers);
        headers
            .entry("Accept".to_string())
            .or_insert_with(|| "application/json".to_string());
        Self {
            name: name.to_string(),
            config,
            headers,
            http,
        }
    }

    fn browse_url(&self, key: &str) -> Option<String> {
        endpoint_url(&self.config.base_url, &["browse", key], &[]).ok()
    }
}

#[async_trait]
impl SourceAdapter for IssuesConnector {
    type Record = Issue;

    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "issues"
    }

    fn description(&self) -> &str {
        "Issue tracker search results"
    }

    async fn fetch(&self) -> Result<Vec<Issue>, FetchError> {
        let url = endpoint_url(&self.config.base_url, &["rest", "api", "search"], &[])?;
        let request = json!({
            "jql": self.config.jql,
            "maxResults": self.config.max_results,
        })
        .to_string();
        let body = self.http.post(&url, Some(&request), &self.headers).await?;
        let page: SearchPage = serde_json::from_str(&body).map_err(DecodeError::from)?;
        Ok(page.issues)
    }

    fn normalize(&self, issue: Issue) -> Result<NewItem, DecodeError> {
        let key = non_empty(issue.key).ok_or(DecodeError::MissingField { field: "key" })?;
        let fields = issue
            .fields
            .ok_or(DecodeError::MissingField { field: "fields" })?;

        let occurred_at = fields
            .updated
            .as_deref()
            .map(parse_tracker_time)
            .transpose()?;
        let status = fields.status.and_then(|s| non_empty(s.name));
        let assignee = fields.assignee.and_then(|a| non_empty(a.display_name));
        let title = non_empty(fields.summary).unwrap_or_else(|| key.clone());

        Ok(
            NewItem::new(source_key("issues", &key), title, fields.description.unwrap_or_default())
                .with_url(self.browse_url(&key))
                .with_author(assignee.clone())
                .with_occurred_at(occurred_at)
                .with_metadata(json!({
                    "key": key,
                    "status": status,
                    "assignee": assignee,
                })),
        )
    }
}

fn parse_tracker_time(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    parse_rfc3339("updated", raw).or_else(|err| {
        DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| err)
    })
}
