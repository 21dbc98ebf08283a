//! Calendar connector.
//!
//! Runs a configured shell command (an export script, a CLI for a calendar
//! service) and reads events from its stdout. The command runs through the
//! injected [`CommandExecutor`], with an optional working directory and
//! environment overrides.
//!
//! # Configuration
//!
//! ```toml
//! [sources.calendar.personal]
//! command = "./export-events.sh --days 14"
//! working_dir = "/home/me/calendar"
//! env = { TZ = "UTC", CAL_TOKEN = "${CAL_TOKEN}" }
//! ```
//!
//! # Output format
//!
//! A JSON array of `{"uid","title","notes","location","start","end","calendar"}`
//! with RFC 3339 `start`/`end`. `uid` and `start` are required.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::CalendarSourceConfig;
use crate::error::{DecodeError, FetchError};
use crate::models::{non_empty, parse_rfc3339, source_key, NewItem};
use crate::traits::SourceAdapter;
use crate::transport::{expand_env_vars, CommandExecutor, Environment};

const UNTITLED: &str = "Untitled event";

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarEvent {
    pub uid: Option<String>,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub calendar: Option<String>,
}

pub struct CalendarConnector {
    name: String,
    config: CalendarSourceConfig,
    env: Environment,
    exec: Arc<dyn CommandExecutor>,
}

impl CalendarConnector {
    pub fn new(name: &str, config: CalendarSourceConfig, exec: Arc<dyn CommandExecutor>) -> Self {
        let env = config
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_vars(v)))
            .collect();
        Self {
            name: name.to_string(),
            config,
            env,
            exec,
        }
    }
}

#[async_trait]
impl SourceAdapter for CalendarConnector {
    type Record = CalendarEvent;

    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Calendar events from a command"
    }

    async fn fetch(&self) -> Result<Vec<CalendarEvent>, FetchError> {
        let stdout = self
            .exec
            .execute(
                &self.config.command,
                self.config.working_dir.as_deref(),
                &self.env,
            )
            .await?;
        let events: Vec<CalendarEvent> =
            serde_json::from_str(stdout.trim()).map_err(DecodeError::from)?;
        Ok(events)
    }

    fn normalize(&self, event: CalendarEvent) -> Result<NewItem, DecodeError> {
        let uid = non_empty(event.uid).ok_or(DecodeError::MissingField { field: "uid" })?;
        let raw_start = event
            .start
            .ok_or(DecodeError::MissingField { field: "start" })?;
        let start = parse_rfc3339("start", &raw_start)?;
        let end = event
            .end
            .as_deref()
            .map(|e| parse_rfc3339("end", e))
            .transpose()?;

        let title = non_empty(event.title).unwrap_or_else(|| UNTITLED.to_string());
        let location = non_empty(event.location);

        let mut content = format!("{}\nstarts: {}", title, start.to_rfc3339());
        if let Some(end) = end {
            content.push_str(&format!("\nends: {}", end.to_rfc3339()));
        }
        if let Some(location) = &location {
            content.push_str(&format!("\nlocation: {}", location));
        }
        if let Some(notes) = non_empty(event.notes) {
            content.push_str("\n\n");
            content.push_str(&notes);
        }

        Ok(NewItem::new(source_key("calendar", &uid), title, content)
            .with_occurred_at(Some(start))
            .with_metadata(json!({
                "calendar": non_empty(event.calendar),
                "location": location,
                "end": end.map(|e| e.to_rfc3339()),
            })))
    }
}
