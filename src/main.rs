//! # rss-chat CLI
//!
//! The `rss-chat` binary is the operator interface for the service. It
//! provides commands for database initialization, feed discovery and
//! ingestion, article search, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! rss-chat --config ./config/rss-chat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rss-chat init` | Create the SQLite database and run schema migrations |
//! | `rss-chat discover <url>` | Print feed candidates for a site URL |
//! | `rss-chat ingest <url>` | Parse a feed and store its entries |
//! | `rss-chat feeds` | List registered feeds |
//! | `rss-chat search "<query>"` | Ranked full-text article search |
//! | `rss-chat serve` | Start the HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rss_chat::{config, db, discover, feed, migrate, server, store};

/// rss-chat — an RSS ingestion and retrieval-augmented chat service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rss-chat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rss-chat",
    about = "rss-chat — an RSS ingestion and retrieval-augmented chat service",
    version,
    long_about = "rss-chat discovers, parses, and deduplicates RSS/Atom feeds into a \
    searchable article store, and serves chat sessions whose context window is assembled \
    from recency- and relevance-ranked article retrieval."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rss-chat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (rss_feeds, rss_articles, chat_sessions, articles_fts).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Discover feed candidates for a site URL.
    ///
    /// Scans the page markup for RSS/Atom link elements and falls back to
    /// probing conventional paths. Best-effort: prints whatever was found.
    Discover {
        /// Site URL (scheme optional; defaults to https).
        url: String,
    },

    /// Parse a feed URL and store its entries.
    ///
    /// The feed row is upserted by url; entries deduplicate on
    /// (feed, url), so re-ingesting a feed is safe.
    Ingest {
        /// Feed URL.
        url: String,
    },

    /// List registered feeds, newest first.
    Feeds,

    /// Search stored articles.
    ///
    /// Ranked full-text search over article title, summary, and content.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` and serves the ingestion, search, and
    /// chat-session endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("ok");
        }
        Commands::Discover { url } => {
            let client = feed::http_client();
            let url = discover::normalize_url(url.trim());
            let feeds = discover::discover_feeds(&client, &url).await;
            if feeds.is_empty() {
                println!("No feeds found.");
            }
            for candidate in feeds {
                println!("{} — {}", candidate.url, candidate.title);
            }
        }
        Commands::Ingest { url } => {
            let client = feed::http_client();
            let url = discover::normalize_url(url.trim());
            let parsed = feed::parse_feed(&client, &url).await?;

            let pool = db::connect(&config).await?;
            migrate::apply_schema(&pool).await?;
            let feed_id =
                store::upsert_feed(&pool, &url, &parsed.title, &parsed.description).await?;
            let inserted = store::insert_articles(&pool, &feed_id, &parsed.entries).await?;
            pool.close().await;

            println!("ingested {}", parsed.title);
            println!("  feed id: {}", feed_id);
            println!("  entries: {}", parsed.entries.len());
            println!("  new articles: {}", inserted);
        }
        Commands::Feeds => {
            let pool = db::connect(&config).await?;
            migrate::apply_schema(&pool).await?;
            let feeds = store::list_feeds(&pool).await?;
            if feeds.is_empty() {
                println!("No feeds registered.");
            }
            for feed in feeds {
                println!("{} — {}", feed.title, feed.url);
                println!("    id: {}", feed.id);
            }
            pool.close().await;
        }
        Commands::Search { query, limit } => {
            let pool = db::connect(&config).await?;
            migrate::apply_schema(&pool).await?;
            let hits = store::search_articles(&pool, &query, limit).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. [{:.2}] {} / {}", i + 1, hit.score, hit.feed_title, hit.title);
                if !hit.url.is_empty() {
                    println!("    url: {}", hit.url);
                }
                println!("    id: {}", hit.id);
            }
            pool.close().await;
        }
        Commands::Serve => {
            server::run_server(&config).await?;
        }
    }

    Ok(())
}
