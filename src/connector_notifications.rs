//! Notifications connector.
//!
//! Reads a code-hosting notification inbox.
//!
//! # Configuration
//!
//! ```toml
//! [sources.notifications.gh]
//! base_url = "https://api.example.com"
//! include_read = false
//! headers = { Authorization = "token ${GH_TOKEN}" }
//! ```
//!
//! # Wire format
//!
//! `GET {base_url}/notifications` returns a JSON array of
//! `{"id","reason","unread","updated_at","subject":{"title","type","url"},"repository":{"full_name"}}`.
//! Read notifications are dropped unless `include_read` is set.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::NotificationsSourceConfig;
use crate::error::{DecodeError, FetchError};
use crate::models::{non_empty, parse_rfc3339, source_key, NewItem};
use crate::traits::SourceAdapter;
use crate::transport::{endpoint_url, expand_headers, Headers, HttpTransport};

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub id: Option<String>,
    pub reason: Option<String>,
    #[serde(default)]
    pub unread: bool,
    pub updated_at: Option<String>,
    pub subject: Option<Subject>,
    pub repository: Option<Repository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subject {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: Option<String>,
}

pub struct NotificationsConnector {
    name: String,
    config: NotificationsSourceConfig,
    headers: Headers,
    http: Arc<dyn HttpTransport>,
}

impl NotificationsConnector {
    pub fn new(
        name: &str,
        config: NotificationsSourceConfig,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        let headers = expand_headers(&config.headers);
        Self {
            name: name.to_string(),
            config,
            headers,
            http,
        }
    }
}

#[async_trait]
impl SourceAdapter for NotificationsConnector {
    type Record = Notification;

    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "notifications"
    }

    fn description(&self) -> &str {
        "Repository notifications"
    }

    async fn fetch(&self) -> Result<Vec<Notification>, FetchError> {
        let url = endpoint_url(&self.config.base_url, &["notifications"], &[])?;
        let body = self.http.get(&url, &self.headers).await?;
        let mut records: Vec<Notification> =
            serde_json::from_str(&body).map_err(DecodeError::from)?;
        if !self.config.include_read {
            records.retain(|n| n.unread);
        }
        Ok(records)
    }

    fn normalize(&self, n: Notification) -> Result<NewItem, DecodeError> {
        let id = non_empty(n.id).ok_or(DecodeError::MissingField { field: "id" })?;
        let subject = n
            .subject
            .ok_or(DecodeError::MissingField { field: "subject" })?;
        let occurred_at = n
            .updated_at
            .as_deref()
            .map(|t| parse_rfc3339("updated_at", t))
            .transpose()?;

        let title = non_empty(subject.title).unwrap_or_else(|| "Notification".to_string());
        let kind = non_empty(subject.kind);
        let reason = non_empty(n.reason);
        let repository = n.repository.and_then(|r| non_empty(r.full_name));

        let mut content = title.clone();
        if let Some(repo) = &repository {
            content.push_str(&format!("\nrepository: {}", repo));
        }
        if let Some(reason) = &reason {
            content.push_str(&format!("\nreason: {}", reason));
        }

        Ok(NewItem::new(source_key("notifications", &id), title, content)
            .with_url(non_empty(subject.url))
            .with_occurred_at(occurred_at)
            .with_metadata(json!({
                "reason": reason,
                "type": kind,
                "repository": repository,
                "unread": n.unread,
            })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Connector;
    use crate::transport::{Method, MockHttpTransport, MockRoute};

    const PAYLOAD: &str = r#"[
        {"id":"100","reason":"review_requested","unread":true,"updated_at":"2024-06-01T12:00:00Z",
         "subject":{"title":"Add retry to uploader","type":"PullRequest","url":"https://api.test/pulls/5"},
         "repository":{"full_name":"acme/uploader"}},
        {"id":"101","reason":"mention","unread":false,"updated_at":"2024-06-01T13:00:00Z",
         "subject":{"title":"Flaky test","type":"Issue"},
         "repository":{"full_name":"acme/core"}}
    ]"#;

    fn connector(include_read: bool, http: Arc<MockHttpTransport>) -> NotificationsConnector {
        let config = NotificationsSourceConfig {
            base_url: "https://api.test".into(),
            include_read,
            headers: Headers::new(),
        };
        NotificationsConnector::new("gh", config, http)
    }

    fn http() -> Arc<MockHttpTransport> {
        let http = Arc::new(MockHttpTransport::new());
        http.register(
            Method::Get,
            "https://api.test/notifications",
            MockRoute::success(PAYLOAD),
        );
        http
    }

    #[tokio::test]
    async fn unread_only_by_default() {
        let items = connector(false, http()).scan().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_key, "notifications:100");
        assert_eq!(items[0].url.as_deref(), Some("https://api.test/pulls/5"));
        assert!(items[0].content.contains("acme/uploader"));
        assert_eq!(items[0].metadata["type"], "PullRequest");
    }

    #[tokio::test]
    async fn include_read_keeps_everything() {
        let items = connector(true, http()).scan().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].metadata["unread"], false);
    }

    #[tokio::test]
    async fn object_instead_of_array_is_decode_error() {
        let http = Arc::new(MockHttpTransport::new());
        http.register(
            Method::Get,
            "https://api.test/notifications",
            MockRoute::success(r#"{"message":"Bad credentials"}"#),
        );
        let err = connector(false, http).scan().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(DecodeError::Json(_))));
    }
}
