//! # Comms Harness
//!
//! A local-first sync engine for communication data.
//!
//! Comms Harness pulls items from chat, mail, issue tracker, notification,
//! and calendar providers, normalizes them into one item model, and stores
//! them in SQLite with a full-text index and optional embeddings. One sync
//! cycle runs every configured source concurrently; a failing source is
//! reported without stopping the others.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Adapters    │──▶│ Orchestrator │──▶│   SQLite     │
//! │ chat/mail/…  │   │ (ingest)     │   │ items + FTS5 │
//! └──────┬───────┘   └──────────────┘   └──────┬───────┘
//!        │                                     │
//!        ▼                                     ▼
//! ┌──────────────┐                      ┌──────────────┐
//! │  Transport   │                      │ Search/Embed │
//! │ HTTP / exec  │                      │  CLI (chx)   │
//! └──────────────┘                      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chx init                      # create database
//! chx sources                   # list configured sources
//! chx sync                      # refresh every source
//! chx sync chat:team            # refresh one source
//! chx search "release freeze"
//! chx embed pending             # backfill embeddings
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed library errors |
//! | [`transport`] | HTTP and command capabilities, plus test doubles |
//! | [`traits`] | Source adapter traits and registry |
//! | [`connector_chat`] | Chat provider adapter |
//! | [`connector_mail`] | Mail provider adapter |
//! | [`connector_issues`] | Issue tracker adapter |
//! | [`connector_notifications`] | Notification inbox adapter |
//! | [`connector_calendar`] | Command-driven calendar adapter |
//! | [`ingest`] | Sync orchestrator |
//! | [`store`] | Item store: upserts, queries, full-text search |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`search`] | Keyword and semantic search |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod connector_calendar;
pub mod connector_chat;
pub mod connector_issues;
pub mod connector_mail;
pub mod connector_notifications;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod error;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod search;
pub mod sources;
pub mod stats;
pub mod store;
pub mod traits;
pub mod transport;
