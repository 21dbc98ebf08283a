//! TOML configuration parsing and validation.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/chx.sqlite"
//!
//! [sync]
//! timeout_secs = 30
//!
//! [embedding]
//! provider = "hash"
//! model_version = "hash-v1"
//! dims = 256
//!
//! [sources.chat.team]
//! base_url = "https://chat.example.com"
//! channels = ["general", "ops"]
//! headers = { Authorization = "Bearer ${CHAT_TOKEN}" }
//!
//! [sources.calendar.personal]
//! command = "./scripts/events.sh --days 14"
//! working_dir = "/home/me/cal"
//! env = { TZ = "UTC" }
//! ```
//!
//! Header and environment values expand `${VAR}` from the process
//! environment when the adapter is built, not when the file is parsed.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::{Environment, Headers};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// SQLite file path, or `":memory:"`.
    pub path: PathBuf,
}

impl DbConfig {
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Per-adapter fetch bound in seconds. `0` disables the bound.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl SyncConfig {
    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_fetch_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout() -> u64 {
    20
}
fn default_user_agent() -> String {
    format!("comms-harness/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_version")]
    pub model_version: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_version: default_model_version(),
            dims: default_dims(),
            batch_size: default_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model_version() -> String {
    "hash-v1".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_batch_size() -> usize {
    64
}

/// Named instances per provider kind: `[sources.<kind>.<name>]`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub chat: BTreeMap<String, ChatSourceConfig>,
    #[serde(default)]
    pub mail: BTreeMap<String, MailSourceConfig>,
    #[serde(default)]
    pub issues: BTreeMap<String, IssuesSourceConfig>,
    #[serde(default)]
    pub notifications: BTreeMap<String, NotificationsSourceConfig>,
    #[serde(default)]
    pub calendar: BTreeMap<String, CalendarSourceConfig>,
}

impl SourcesConfig {
    pub fn len(&self) -> usize {
        self.chat.len()
            + self.mail.len()
            + self.issues.len()
            + self.notifications.len()
            + self.calendar.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatSourceConfig {
    pub base_url: String,
    /// Channels to pull; empty means one unfiltered request.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub headers: Headers,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailSourceConfig {
    pub base_url: String,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    #[serde(default)]
    pub headers: Headers,
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IssuesSourceConfig {
    pub base_url: String,
    #[serde(default = "default_jql")]
    pub jql: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default)]
    pub headers: Headers,
}

fn default_jql() -> String {
    "assignee = currentUser() ORDER BY updated DESC".to_string()
}
fn default_max_results() -> u32 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsSourceConfig {
    pub base_url: String,
    /// Include notifications already marked read.
    #[serde(default)]
    pub include_read: bool,
    #[serde(default)]
    pub headers: Headers,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CalendarSourceConfig {
    /// Shell command whose stdout is a JSON array of events.
    pub command: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: Environment,
}

impl Config {
    /// A config with an in-memory database and no sources.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig::in_memory(),
            sync: SyncConfig::default(),
            http: HttpConfig::default(),
            embedding: EmbeddingConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

/// Read and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.path.as_os_str().is_empty() {
        bail!("db.path must not be empty");
    }

    if config.http.timeout_secs == 0 {
        bail!("http.timeout_secs must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hash" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or hash.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            bail!("embedding.dims must be > 0 when provider is enabled");
        }
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if config.embedding.model_version.trim().is_empty() {
            bail!("embedding.model_version must not be empty");
        }
    }

    let sources = &config.sources;
    for (name, cfg) in &sources.chat {
        require_url("chat", name, &cfg.base_url)?;
    }
    for (name, cfg) in &sources.mail {
        require_url("mail", name, &cfg.base_url)?;
        if cfg.mailbox.trim().is_empty() {
            bail!("sources.mail.{}.mailbox must not be empty", name);
        }
    }
    for (name, cfg) in &sources.issues {
        require_url("issues", name, &cfg.base_url)?;
        if cfg.max_results == 0 {
            bail!("sources.issues.{}.max_results must be >= 1", name);
        }
    }
    for (name, cfg) in &sources.notifications {
        require_url("notifications", name, &cfg.base_url)?;
    }
    for (name, cfg) in &sources.calendar {
        if cfg.command.trim().is_empty() {
            bail!("sources.calendar.{}.command must not be empty", name);
        }
    }

    Ok(())
}

fn require_url(kind: &str, name: &str, url: &str) -> Result<()> {
    if url.trim().is_empty() {
        bail!("sources.{}.{}.base_url must not be empty", kind, name);
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!(
            "sources.{}.{}.base_url must start with http:// or https:// (got '{}')",
            kind,
            name,
            url
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_gets_defaults() {
        let cfg = parse_config("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(cfg.sync.fetch_timeout(), Some(Duration::from_secs(30)));
        assert!(!cfg.embedding.is_enabled());
        assert!(cfg.sources.is_empty());
    }

    #[test]
    fn parses_named_sources() {
        let cfg = parse_config(
            r#"
[db]
path = ":memory:"

[sources.chat.team]
base_url = "https://chat.test"
channels = ["general"]
headers = { Authorization = "Bearer ${TOKEN}" }

[sources.issues.core]
base_url = "https://issues.test"

[sources.calendar.me]
command = "cat events.json"
env = { TZ = "UTC" }
"#,
        )
        .unwrap();
        assert!(cfg.db.is_in_memory());
        assert_eq!(cfg.sources.len(), 3);
        assert_eq!(cfg.sources.chat["team"].channels, vec!["general"]);
        assert_eq!(
            cfg.sources.chat["team"].headers["Authorization"],
            "Bearer ${TOKEN}"
        );
        assert_eq!(cfg.sources.issues["core"].max_results, 50);
        assert_eq!(cfg.sources.calendar["me"].env["TZ"], "UTC");
    }

    #[test]
    fn zero_timeout_disables_bound() {
        let cfg = parse_config("[db]\npath = \"x\"\n[sync]\ntimeout_secs = 0\n").unwrap();
        assert_eq!(cfg.sync.fetch_timeout(), None);
    }

    #[test]
    fn rejects_bad_base_url() {
        let err = parse_config(
            "[db]\npath = \"x\"\n[sources.mail.work]\nbase_url = \"ftp://mail\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("http://"));
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let err =
            parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn rejects_empty_calendar_command() {
        let err = parse_config("[db]\npath = \"x\"\n[sources.calendar.me]\ncommand = \"  \"\n")
            .unwrap_err();
        assert!(err.to_string().contains("command must not be empty"));
    }
}
