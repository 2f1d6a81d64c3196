//! Best-effort feed discovery.
//!
//! Given a site URL, finds candidate feed URLs by scanning the page markup
//! for RSS/Atom `<link>` elements and, failing that, probing a small set
//! of conventional paths. Discovery never raises: every network or parse
//! failure is logged and swallowed, and whatever was found is returned.

use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};

use crate::models::DiscoveredFeed;

/// At most this many candidates are returned.
const MAX_CANDIDATES: usize = 5;

const PAGE_TIMEOUT: Duration = Duration::from_secs(15);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Conventional feed locations probed when the markup scan finds nothing.
const COMMON_PATHS: &[&str] = &["/rss", "/feed", "/rss.xml"];

/// Normalize a user-supplied URL to carry an explicit scheme.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Discover feed candidates for a site URL.
pub async fn discover_feeds(client: &Client, url: &str) -> Vec<DiscoveredFeed> {
    let mut feeds = scan_page_links(client, url).await;

    if feeds.is_empty() {
        feeds = probe_common_paths(client, url).await;
    }

    feeds.truncate(MAX_CANDIDATES);
    feeds
}

async fn scan_page_links(client: &Client, url: &str) -> Vec<DiscoveredFeed> {
    let html = match fetch_page(client, url, PAGE_TIMEOUT).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(url, error = %e, "feed discovery page fetch failed");
            return Vec::new();
        }
    };

    extract_feed_links(&html, url)
}

/// Scan markup for `<link type="application/rss+xml">` and
/// `<link type="application/atom+xml">`, resolving relative hrefs against
/// the base URL.
fn extract_feed_links(html: &str, base_url: &str) -> Vec<DiscoveredFeed> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(
        r#"link[type="application/rss+xml"], link[type="application/atom+xml"]"#,
    )
    .expect("static selector");

    let mut feeds = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let feed_url = resolve_url(href, base_url);
        let title = element
            .value()
            .attr("title")
            .unwrap_or("RSS Feed")
            .to_string();
        feeds.push(DiscoveredFeed {
            url: feed_url,
            title,
        });
    }

    feeds
}

/// Probe conventional paths with a shorter timeout, stopping at the first
/// reachable one.
async fn probe_common_paths(client: &Client, base_url: &str) -> Vec<DiscoveredFeed> {
    for path in COMMON_PATHS {
        let test_url = resolve_url(path, base_url);
        match client
            .get(&test_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                return vec![DiscoveredFeed {
                    url: test_url,
                    title: format!("RSS Feed ({})", path),
                }];
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(url = %test_url, error = %e, "feed probe failed");
                continue;
            }
        }
    }

    Vec::new()
}

async fn fetch_page(client: &Client, url: &str, timeout: Duration) -> reqwest::Result<String> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?;
    response.text().await
}

/// Resolve a potentially relative URL against a base URL.
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_string()
}
