//! Feed fetching and normalization.
//!
//! Fetches a feed URL and normalizes the RSS/Atom payload into a
//! [`ParsedFeed`]. A feed that yields zero usable entries is a hard
//! [`Error::Parse`]; a feed with warnings but at least one entry is
//! accepted.

use std::time::Duration;

use feed_rs::parser;
use reqwest::Client;

use crate::error::{Error, Result};
use crate::models::{FeedEntry, ParsedFeed};

/// Entries beyond this are dropped before persistence.
pub const MAX_ENTRIES: usize = 20;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

pub fn http_client() -> Client {
    Client::builder()
        .timeout(FETCH_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("rss-chat/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to create HTTP client")
}

/// Fetch and parse a feed URL into normalized form.
pub async fn parse_feed(client: &Client, url: &str) -> Result<ParsedFeed> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(Error::Network(format!(
            "feed fetch returned HTTP {}",
            response.status()
        )));
    }

    let bytes = response.bytes().await?;
    parse_feed_bytes(&bytes)
}

/// Parse and normalize a raw feed payload.
pub fn parse_feed_bytes(bytes: &[u8]) -> Result<ParsedFeed> {
    let feed = match parser::parse(bytes) {
        Ok(feed) => feed,
        Err(e) => {
            tracing::warn!(error = %e, "feed parse failed");
            return Err(Error::Parse);
        }
    };

    if feed.entries.is_empty() {
        tracing::warn!("feed parsed but contained no entries");
        return Err(Error::Parse);
    }

    let title = feed
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| "Unknown Feed".to_string());
    let description = feed.description.map(|d| d.content).unwrap_or_default();
    let link = feed
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();

    let entries: Vec<FeedEntry> = feed
        .entries
        .into_iter()
        .take(MAX_ENTRIES)
        .map(|entry| {
            // Summary falls back to the content body when absent.
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();

            FeedEntry {
                title: entry
                    .title
                    .map(|t| t.content)
                    .unwrap_or_else(|| "No Title".to_string()),
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                summary,
                published: entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default(),
                author: entry
                    .authors
                    .first()
                    .map(|a| a.name.clone())
                    .unwrap_or_default(),
            }
        })
        .collect();

    Ok(ParsedFeed {
        title,
        description,
        link,
        entries,
    })
}
