//! # rss-chat
//!
//! An RSS ingestion and retrieval-augmented chat service.
//!
//! rss-chat discovers, parses, and deduplicates RSS/Atom feeds into a
//! searchable SQLite article store, keeps chat sessions split between a
//! relational metadata row and a durable transcript blob, and assembles a
//! bounded context window for a text-generation backend from recency- and
//! relevance-ranked article retrieval (or an explicit article pin).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────┐   ┌───────────────┐
//! │ Discovery │──▶│ Parser  │──▶│ Article Store │
//! │  (sites)  │   │(feed-rs)│   │ SQLite + FTS5 │
//! └───────────┘   └─────────┘   └──────┬────────┘
//!                                      │
//!            ┌─────────────┐   ┌───────▼────────┐   ┌────────────┐
//!            │ Session     │◀──│     Chat       │──▶│ Generation │
//!            │ SQLite + S3 │   │  Orchestrator  │   │  backend   │
//!            └─────────────┘   └────────────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rss-chat init                               # create database
//! rss-chat discover example.com               # find feed candidates
//! rss-chat ingest https://example.com/feed    # parse and store a feed
//! rss-chat feeds                              # list registered feeds
//! rss-chat search "kernel"                    # ranked article search
//! rss-chat serve                              # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`discover`] | Best-effort feed discovery |
//! | [`feed`] | Feed fetching and normalization |
//! | [`store`] | Article store with FTS index |
//! | [`blob`] | Key-addressed blob store (S3 / in-memory) |
//! | [`session`] | Dual-store chat sessions |
//! | [`context`] | Bounded context assembly |
//! | [`generate`] | Generation backend client |
//! | [`chat`] | Chat turn orchestration |
//! | [`ratelimit`] | Per-route token buckets |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod blob;
pub mod chat;
pub mod config;
pub mod context;
pub mod db;
pub mod discover;
pub mod error;
pub mod feed;
pub mod generate;
pub mod migrate;
pub mod models;
pub mod ratelimit;
pub mod server;
pub mod session;
pub mod store;
