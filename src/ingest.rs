//! Refresh cycle orchestration.
//!
//! One cycle runs every registered connector concurrently (one task each),
//! waits for all of them, and then persists every successful source's items
//! in a single [`Store::apply_refresh`] transaction. A failing, timed-out, or
//! panicking connector only marks its own source as failed; the cycle itself
//! fails only when persistence does, or when the caller cancels before
//! persistence begins.
//!
//! Once persistence starts it runs in its own task, so dropping or
//! cancelling the caller cannot interrupt a transaction halfway.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::embed_cmd;
use crate::error::{FetchError, StoreError};
use crate::models::{NewItem, UpsertSummary};
use crate::store::{RefreshBatch, Store};
use crate::traits::{Connector, ConnectorRegistry};
use crate::transport::{ProcessExecutor, ReqwestTransport};

/// Tuning for one refresh cycle.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Upper bound on each connector's fetch. `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Why a source contributed nothing this cycle.
#[derive(Debug, Clone, Error)]
pub enum SourceFailure {
    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone)]
pub enum SourceStatus {
    Succeeded { fetched: usize },
    Failed(SourceFailure),
}

/// Outcome for one connector.
#[derive(Debug, Clone)]
pub struct SourceReport {
    /// `"{kind}:{name}"`.
    pub label: String,
    pub kind: String,
    pub status: SourceStatus,
}

impl SourceReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, SourceStatus::Succeeded { .. })
    }
}

/// Result of one completed cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub cycle_id: Uuid,
    /// In registry order.
    pub sources: Vec<SourceReport>,
    pub upserted: UpsertSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| !s.is_success())
    }

    pub fn fetched(&self) -> usize {
        self.sources
            .iter()
            .map(|s| match s.status {
                SourceStatus::Succeeded { fetched } => fetched,
                SourceStatus::Failed(_) => 0,
            })
            .sum()
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("refresh cancelled before persistence")]
    Cancelled,

    #[error("persistence task aborted: {0}")]
    Aborted(String),
}

type FetchOutcome = Result<Vec<NewItem>, SourceFailure>;

/// Aborts any still-running fetch task when the cycle is dropped or
/// cancelled.
struct AbortOnDrop(Vec<JoinHandle<FetchOutcome>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Run one refresh cycle with no external cancellation.
pub async fn run_refresh(
    store: &Store,
    registry: &ConnectorRegistry,
    options: &RefreshOptions,
) -> Result<SyncReport, RefreshError> {
    run_refresh_with_cancel(store, registry, options, &CancellationToken::new()).await
}

/// Run one refresh cycle. Cancelling `cancel` while connectors are still
/// fetching aborts them and returns [`RefreshError::Cancelled`] without
/// touching the store.
pub async fn run_refresh_with_cancel(
    store: &Store,
    registry: &ConnectorRegistry,
    options: &RefreshOptions,
    cancel: &CancellationToken,
) -> Result<SyncReport, RefreshError> {
    let cycle_id = Uuid::new_v4();
    let started_at = Utc::now();
    tracing::info!(%cycle_id, sources = registry.len(), "refresh started");

    let mut tasks = AbortOnDrop(Vec::with_capacity(registry.len()));
    for connector in registry.connectors() {
        let connector = Arc::clone(connector);
        let timeout = options.fetch_timeout;
        tasks
            .0
            .push(tokio::spawn(async move { fetch_one(connector, timeout).await }));
    }

    let outcomes = {
        let gather = async {
            let mut outcomes = Vec::with_capacity(tasks.0.len());
            for handle in tasks.0.iter_mut() {
                outcomes.push(handle.await);
            }
            outcomes
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(%cycle_id, "refresh cancelled while fetching");
                return Err(RefreshError::Cancelled);
            }
            outcomes = gather => outcomes,
        }
    };

    let mut sources = Vec::with_capacity(outcomes.len());
    let mut items = Vec::new();
    let mut succeeded_sources = Vec::new();
    for (connector, outcome) in registry.connectors().iter().zip(outcomes) {
        let label = connector.source_label();
        let result = outcome.unwrap_or_else(|e| Err(SourceFailure::Aborted(describe_join_error(e))));
        let status = match result {
            Ok(fetched) => {
                tracing::info!(source = %label, items = fetched.len(), "source fetched");
                let count = fetched.len();
                items.extend(fetched);
                succeeded_sources.push(label.clone());
                SourceStatus::Succeeded { fetched: count }
            }
            Err(failure) => {
                tracing::warn!(source = %label, error = %failure, "source failed");
                SourceStatus::Failed(failure)
            }
        };
        sources.push(SourceReport {
            label,
            kind: connector.connector_type().to_string(),
            status,
        });
    }

    if cancel.is_cancelled() {
        tracing::warn!(%cycle_id, "refresh cancelled before persistence");
        return Err(RefreshError::Cancelled);
    }

    let batch = RefreshBatch {
        items,
        succeeded_sources,
        completed_at: Utc::now(),
    };
    let persist_store = store.clone();
    let persist = tokio::spawn(async move { persist_store.apply_refresh(&batch).await });
    let upserted = persist
        .await
        .map_err(|e| RefreshError::Aborted(describe_join_error(e)))??;

    let finished_at = Utc::now();
    tracing::info!(
        %cycle_id,
        inserted = upserted.inserted,
        updated = upserted.updated,
        failed = sources.iter().filter(|s| !s.is_success()).count(),
        "refresh finished"
    );

    Ok(SyncReport {
        cycle_id,
        sources,
        upserted,
        started_at,
        finished_at,
    })
}

async fn fetch_one(connector: Arc<dyn Connector>, timeout: Option<Duration>) -> FetchOutcome {
    let scan = connector.scan();
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, scan)
            .await
            .map_err(|_| SourceFailure::TimedOut(limit))?,
        None => scan.await,
    };
    result.map_err(SourceFailure::Fetch)
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(msg) = payload.downcast_ref::<&str>() {
                format!("panicked: {}", msg)
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                format!("panicked: {}", msg)
            } else {
                "panicked".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}

/// Build connectors from config, run one cycle, embed new items if an
/// embedder is configured, and print a summary.
///
/// `filter` is `"all"`, a kind (`"chat"`), or a label (`"chat:team"`).
/// Ctrl-C while sources are fetching cancels the cycle.
pub async fn run_sync_from_config(config: &Config, filter: &str) -> Result<SyncReport> {
    let http = ReqwestTransport::new(
        Duration::from_secs(config.http.timeout_secs),
        &config.http.user_agent,
    )?;
    let exec = ProcessExecutor::new(
        config
            .sync
            .fetch_timeout()
            .unwrap_or(Duration::from_secs(300)),
    );
    let registry =
        ConnectorRegistry::from_config(config, Arc::new(http), Arc::new(exec)).select(filter)?;

    let store = Store::open(&config.db).await?;
    store.initialize().await?;

    let options = RefreshOptions {
        fetch_timeout: config.sync.fetch_timeout(),
    };
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = run_refresh_with_cancel(&store, &registry, &options, &cancel).await;
    interrupt.abort();
    let report = result?;

    print_report(filter, &report);

    if let Some(embedded) = embed_cmd::embed_after_sync(config, &store).await {
        println!("  embeddings written: {}", embedded.embedded);
        if embedded.failed > 0 {
            println!("  embeddings pending: {}", embedded.failed);
        }
    }
    println!("ok");

    store.close().await;
    Ok(report)
}

fn print_report(filter: &str, report: &SyncReport) {
    println!("sync {} (cycle {})", filter, report.cycle_id);
    if report.sources.is_empty() {
        println!("  no sources configured");
    }
    for source in &report.sources {
        match &source.status {
            SourceStatus::Succeeded { fetched } => {
                println!("  {:<28} ok      {} items", source.label, fetched)
            }
            SourceStatus::Failed(failure) => {
                println!("  {:<28} failed  {}", source.label, failure)
            }
        }
    }
    println!(
        "  upserted: {} inserted, {} updated",
        report.upserted.inserted, report.upserted.updated
    );
    let elapsed = report.finished_at - report.started_at;
    println!("  elapsed: {} ms", elapsed.num_milliseconds());
}
