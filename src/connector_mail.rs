//! Mail connector.
//!
//! Reads one mailbox through a mail service's REST API.
//!
//! # Configuration
//!
//! ```toml
//! [sources.mail.work]
//! base_url = "https://mail.example.com"
//! mailbox = "INBOX"
//! headers = { Authorization = "Bearer ${MAIL_TOKEN}" }
//! ```
//!
//! # Wire format
//!
//! `GET {base_url}/api/mailboxes/{mailbox}/messages` returns
//! `{"messages":[{"id","subject","from","snippet","body","date"}]}`.
//! The full `body` is preferred over `snippet`; at least one is required.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::MailSourceConfig;
use crate::error::{DecodeError, FetchError};
use crate::models::{non_empty, parse_rfc3339, source_key, NewItem};
use crate::traits::SourceAdapter;
use crate::transport::{endpoint_url, expand_headers, Headers, HttpTransport};

const NO_SUBJECT: &str = "(no subject)";

#[derive(Debug, Deserialize)]
struct MailboxPage {
    messages: Vec<MailMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailMessage {
    pub id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub date: Option<String>,
}

pub struct MailConnector {
    name: String,
    config: MailSourceConfig,
    headers: Headers,
    http: Arc<dyn HttpTransport>,
}

impl MailConnector {
    pub fn new(name: &str, config: MailSourceConfig, http: Arc<dyn HttpTransport>) -> Self {
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
impl SourceAdapter for MailConnector {
    type Record = MailMessage;

    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "mail"
    }

    fn description(&self) -> &str {
        "Mailbox messages"
    }

    async fn fetch(&self) -> Result<Vec<MailMessage>, FetchError> {
        let url = endpoint_url(
            &self.config.base_url,
            &["api", "mailboxes", self.config.mailbox.as_str(), "messages"],
            &[],
        )?;
        let body = self.http.get(&url, &self.headers).await?;
        let page: MailboxPage = serde_json::from_str(&body).map_err(DecodeError::from)?;
        Ok(page.messages)
    }

    fn normalize(&self, msg: MailMessage) -> Result<NewItem, DecodeError> {
        let id = non_empty(msg.id).ok_or(DecodeError::MissingField { field: "id" })?;
        let content = msg
            .body
            .or(msg.snippet)
            .ok_or(DecodeError::MissingField { field: "body" })?;
        let occurred_at = msg
            .date
            .as_deref()
            .map(|d| parse_rfc3339("date", d))
            .transpose()?;
        let title = non_empty(msg.subject).unwrap_or_else(|| NO_SUBJECT.to_string());

        Ok(NewItem::new(source_key("mail", &id), title, content)
            .with_author(non_empty(msg.from))
            .with_occurred_at(occurred_at)
            .with_metadata(json!({ "mailbox": self.config.mailbox })))
    }
}
