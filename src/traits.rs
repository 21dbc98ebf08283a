//! Connector traits and the connector registry.
//!
//! Provider adapters implement [`SourceAdapter`]: a fetch step that talks to
//! an injected transport and returns provider-shaped records, and a pure
//! normalize step that turns one record into a [`NewItem`]. Every adapter is
//! automatically a [`Connector`], the object-safe view the sync
//! orchestrator works with.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   ConnectorRegistry                      │
//! │  ┌──────┐ ┌──────┐ ┌────────┐ ┌───────────────┐ ┌──────┐ │
//! │  │ chat │ │ mail │ │ issues │ │ notifications │ │ cal  │ │
//! │  └──┬───┘ └──┬───┘ └───┬────┘ └───────┬───────┘ └──┬───┘ │
//! └─────┼────────┼─────────┼──────────────┼────────────┼─────┘
//!       │   HttpTransport (Arc<dyn>)      │   CommandExecutor
//!       ▼                                 ▼
//!                run_refresh() → Store::apply_refresh
//! ```
//!
//! # Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use comms_harness::error::{DecodeError, FetchError};
//! use comms_harness::models::NewItem;
//! use comms_harness::traits::{ConnectorRegistry, SourceAdapter};
//! use std::sync::Arc;
//!
//! struct Static;
//!
//! #[async_trait]
//! impl SourceAdapter for Static {
//!     type Record = (String, String);
//!     fn name(&self) -> &str { "fixed" }
//!     fn connector_type(&self) -> &str { "static" }
//!     async fn fetch(&self) -> Result<Vec<Self::Record>, FetchError> {
//!         Ok(vec![("1".into(), "hello".into())])
//!     }
//!     fn normalize(&self, (id, text): Self::Record) -> Result<NewItem, DecodeError> {
//!         Ok(NewItem::new(format!("static:{}", id), "note", text))
//!     }
//! }
//!
//! let mut registry = ConnectorRegistry::new();
//! registry.register(Arc::new(Static));
//! assert_eq!(registry.len(), 1);
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::connector_calendar::CalendarConnector;
use crate::connector_chat::ChatConnector;
use crate::connector_issues::IssuesConnector;
use crate::connector_mail::MailConnector;
use crate::connector_notifications::NotificationsConnector;
use crate::error::{DecodeError, FetchError};
use crate::models::NewItem;
use crate::transport::{CommandExecutor, HttpTransport};

// ═══════════════════════════════════════════════════════════════════════
// SourceAdapter
// ═══════════════════════════════════════════════════════════════════════

/// A provider adapter bound to its transport.
///
/// `fetch` returns transport and payload errors unchanged, wrapped in
/// [`FetchError`]. `normalize` is pure and total on well-formed records;
/// a record it rejects fails the whole source for the cycle.
#[async_trait]
pub trait SourceAdapter: Send + Sync + 'static {
    /// One provider record as decoded from the wire.
    type Record: Send;

    /// Instance name from config (`[sources.chat.<name>]`).
    fn name(&self) -> &str;

    /// Provider kind (`"chat"`, `"mail"`, ...). Prefixes every source key.
    fn connector_type(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn fetch(&self) -> Result<Vec<Self::Record>, FetchError>;

    fn normalize(&self, record: Self::Record) -> Result<NewItem, DecodeError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Connector
// ═══════════════════════════════════════════════════════════════════════

/// Object-safe view of an adapter: fetch and normalize in one step.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    fn connector_type(&self) -> &str;

    fn description(&self) -> &str;

    /// `"{connector_type}:{name}"`; stored as each item's `source`.
    fn source_label(&self) -> String {
        format!("{}:{}", self.connector_type(), self.name())
    }

    /// Fetch and normalize every record. Items are tagged with
    /// [`source_label`](Connector::source_label).
    async fn scan(&self) -> Result<Vec<NewItem>, FetchError>;
}

#[async_trait]
impl<A: SourceAdapter> Connector for A {
    fn name(&self) -> &str {
        SourceAdapter::name(self)
    }

    fn connector_type(&self) -> &str {
        SourceAdapter::connector_type(self)
    }

    fn description(&self) -> &str {
        SourceAdapter::description(self)
    }

    async fn scan(&self) -> Result<Vec<NewItem>, FetchError> {
        let label = Connector::source_label(self);
        let records = self.fetch().await?;
        tracing::debug!(source = %label, records = records.len(), "fetched");

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            items.push(self.normalize(record)?.with_source(label.clone()));
        }
        Ok(items)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ConnectorRegistry
// ═══════════════════════════════════════════════════════════════════════

/// The set of connectors a refresh cycle runs.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one connector per `[sources.<kind>.<name>]` entry, bound to the
    /// given transports.
    pub fn from_config(
        config: &Config,
        http: Arc<dyn HttpTransport>,
        exec: Arc<dyn CommandExecutor>,
    ) -> Self {
        let mut registry = Self::new();
        let sources = &config.sources;

        for (name, cfg) in &sources.chat {
            registry.register(Arc::new(ChatConnector::new(name, cfg.clone(), http.clone())));
        }
        for (name, cfg) in &sources.mail {
            registry.register(Arc::new(MailConnector::new(name, cfg.clone(), http.clone())));
        }
        for (name, cfg) in &sources.issues {
            registry.register(Arc::new(IssuesConnector::new(name, cfg.clone(), http.clone())));
        }
        for (name, cfg) in &sources.notifications {
            registry.register(Arc::new(NotificationsConnector::new(
                name,
                cfg.clone(),
                http.clone(),
            )));
        }
        for (name, cfg) in &sources.calendar {
            registry.register(Arc::new(CalendarConnector::new(name, cfg.clone(), exec.clone())));
        }

        registry
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.push(connector);
    }

    pub fn connectors(&self) -> &[Arc<dyn Connector>] {
        &self.connectors
    }

    pub fn connectors_by_type(&self, connector_type: &str) -> Vec<&Arc<dyn Connector>> {
        self.connectors
            .iter()
            .filter(|c| c.connector_type() == connector_type)
            .collect()
    }

    pub fn find(&self, connector_type: &str, name: &str) -> Option<&Arc<dyn Connector>> {
        self.connectors
            .iter()
            .find(|c| c.connector_type() == connector_type && c.name() == name)
    }

    /// Narrow the registry by `"all"`, `"<kind>"`, or `"<kind>:<name>"`.
    pub fn select(&self, filter: &str) -> Result<ConnectorRegistry> {
        let selected: Vec<Arc<dyn Connector>> = match filter.split_once(':') {
            _ if filter == "all" => self.connectors.clone(),
            Some((kind, name)) => match self.find(kind, name) {
                Some(c) => vec![c.clone()],
                None => bail!("No source '{}' is configured", filter),
            },
            None => {
                let matches: Vec<_> = self
                    .connectors_by_type(filter)
                    .into_iter()
                    .cloned()
                    .collect();
                if matches.is_empty() {
                    bail!("No '{}' sources are configured", filter);
                }
                matches
            }
        };
        Ok(ConnectorRegistry {
            connectors: selected,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}
