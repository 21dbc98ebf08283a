//! Chat connector.
//!
//! Pulls recent messages from a chat service's REST API, one request per
//! configured channel (or a single unfiltered request when no channels are
//! listed).
//!
//! # Configuration
//!
//! ```toml
//! [sources.chat.team]
//! base_url = "https://chat.example.com"
//! channels = ["general", "ops"]
//! headers = { Authorization = "Bearer ${CHAT_TOKEN}" }
//! ```
//!
//! # Wire format
//!
//! `GET {base_url}/api/messages?channel=<c>` returns
//! `{"messages":[{"id","channel","user","text","ts"}]}` where `ts` is Unix
//! seconds (number or numeric string) or an RFC 3339 string.
//!
//! Messages have no subject, so the title is `"<user> in #<channel>"`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::ChatSourceConfig;
use crate::error::{DecodeError, FetchError};
use crate::models::{from_unix_seconds, non_empty, parse_rfc3339, source_key, NewItem};
use crate::traits::SourceAdapter;
use crate::transport::{endpoint_url, expand_headers, Headers, HttpTransport};

#[derive(Debug, Deserialize)]
struct MessagesPage {
    messages: Vec<ChatMessage>,
}

/// One message as returned by the chat API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub id: Option<String>,
    pub channel: Option<String>,
    pub user: Option<String>,
    pub text: Option<String>,
    pub ts: Option<Value>,
}

pub struct ChatConnector {
    name: String,
    config: ChatSourceConfig,
    headers: Headers,
    http: Arc<dyn HttpTransport>,
}

impl ChatConnector {
    pub fn new(name: &str, config: ChatSourceConfig, http: Arc<dyn HttpTransport>) -> Self {
        let headers = expand_headers(&config.headers);
        Self {
            name: name.to_string(),
            config,
            headers,
            http,
        }
    }

    async fn fetch_page(&self, channel: Option<&str>) -> Result<Vec<ChatMessage>, FetchError> {
        let query: Vec<(&str, &str)> = channel.map(|c| ("channel", c)).into_iter().collect();
        let url = endpoint_url(&self.config.base_url, &["api", "messages"], &query)?;
        let body = self.http.get(&url, &self.headers).await?;
        let page: MessagesPage = serde_json::from_str(&body).map_err(DecodeError::from)?;
        Ok(page.messages)
    }
}

#[async_trait]
impl SourceAdapter for ChatConnector {
    type Record = ChatMessage;

    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "chat"
    }

    fn description(&self) -> &str {
        "Chat messages"
    }

    async fn fetch(&self) -> Result<Vec<ChatMessage>, FetchError> {
        if self.config.channels.is_empty() {
            return self.fetch_page(None).await;
        }

        let mut messages = Vec::new();
        for channel in &self.config.channels {
            messages.extend(self.fetch_page(Some(channel)).await?);
        }
        Ok(messages)
    }

    fn normalize(&self, msg: ChatMessage) -> Result<NewItem, DecodeError> {
        let id = non_empty(msg.id).ok_or(DecodeError::MissingField { field: "id" })?;
        let text = msg.text.ok_or(DecodeError::MissingField { field: "text" })?;
        let occurred_at = match &msg.ts {
            None | Some(Value::Null) => None,
            Some(ts) => Some(parse_ts(ts)?),
        };

        let user = non_empty(msg.user);
        let channel = non_empty(msg.channel);
        let title = match (&user, &channel) {
            (Some(u), Some(c)) => format!("{} in #{}", u, c),
            (Some(u), None) => u.clone(),
            (None, Some(c)) => format!("#{}", c),
            (None, None) => "Chat message".to_string(),
        };

        Ok(NewItem::new(source_key("chat", &id), title, text)
            .with_author(user)
            .with_occurred_at(occurred_at)
            .with_metadata(json!({ "channel": channel, "ts": msg.ts })))
    }
}

fn parse_ts(ts: &Value) -> Result<chrono::DateTime<chrono::Utc>, DecodeError> {
    match ts {
        Value::Number(n) => match n.as_f64() {
            Some(secs) => from_unix_seconds("ts", secs),
            None => Err(DecodeError::InvalidField {
                field: "ts",
                value: n.to_string(),
            }),
        },
        Value::String(s) => match s.parse::<f64>() {
            Ok(secs) => from_unix_seconds("ts", secs),
            Err(_) => parse_rfc3339("ts", s),
        },
        other => Err(DecodeError::InvalidField {
            field: "ts",
            value: other.to_string(),
        }),
    }
}
