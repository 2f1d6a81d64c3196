//! Context assembly.
//!
//! Builds the bounded text context supplied to the generation backend.
//! Two mutually exclusive retrieval modes, explicit-pin taking precedence
//! over freeform:
//!
//! - **Explicit**: pinned article ids are resolved (capped), unknown ids
//!   are skipped with a warning, and zero resolved ids yields a literal
//!   "no articles found" context instead of an empty string.
//! - **Freeform**: a recency window (articles created within the last 48
//!   hours, newest first) followed by, for non-empty queries, a relevance
//!   window (older articles ranked by full-text score).
//!
//! Whatever the mode, the final composition is hard-truncated to the
//! configured character cap as the last step; the cut may land mid-entry.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::models::ArticleHit;
use crate::store;

/// Per-entry summary truncation, in characters.
const SUMMARY_CHARS: usize = 300;

pub struct ContextAssembler {
    pool: SqlitePool,
    retrieval: RetrievalConfig,
}

impl ContextAssembler {
    pub fn new(pool: SqlitePool, retrieval: RetrievalConfig) -> Self {
        Self { pool, retrieval }
    }

    /// Assemble the context for a turn. `pinned_ids` non-empty selects
    /// explicit mode; otherwise freeform retrieval runs against `query`.
    pub async fn assemble(&self, query: &str, pinned_ids: &[String]) -> Result<String> {
        let body = if pinned_ids.is_empty() {
            self.freeform_context(query).await?
        } else {
            self.pinned_context(pinned_ids).await?
        };

        Ok(truncate_chars(body, self.retrieval.context_max_chars))
    }

    async fn pinned_context(&self, pinned_ids: &[String]) -> Result<String> {
        let articles =
            store::articles_by_ids(&self.pool, pinned_ids, self.retrieval.pinned_limit).await?;

        for id in pinned_ids {
            if !articles.iter().any(|a| &a.id == id) {
                tracing::warn!(article_id = %id, "pinned article not found; skipping");
            }
        }

        if articles.is_empty() {
            return Ok("No articles found for the provided IDs.".to_string());
        }

        let mut context = String::from("Selected Articles:\n\n");
        for article in &articles {
            context.push_str(&format_entry(article));
        }
        Ok(context)
    }

    async fn freeform_context(&self, query: &str) -> Result<String> {
        let cutoff = (Utc::now() - Duration::hours(self.retrieval.recency_hours)).timestamp();

        let recent =
            store::recent_articles(&self.pool, cutoff, self.retrieval.recency_limit).await?;

        let older = if query.trim().is_empty() {
            Vec::new()
        } else {
            store::relevant_older_articles(
                &self.pool,
                query,
                cutoff,
                self.retrieval.relevance_limit,
            )
            .await?
        };

        let mut context = String::from("RSS Feed Articles:\n\n");

        if !recent.is_empty() {
            context.push_str(&format!(
                "=== RECENT ARTICLES (Last {} hours) ===\n",
                self.retrieval.recency_hours
            ));
            for article in &recent {
                context.push_str(&format_entry(article));
            }
        }

        if !older.is_empty() {
            context.push_str("=== RELEVANT OLDER ARTICLES ===\n");
            for article in &older {
                context.push_str(&format_entry(article));
            }
        }

        Ok(context)
    }
}

fn format_entry(article: &ArticleHit) -> String {
    format!(
        "Feed: {}\nTitle: {}\nSummary: {}...\n\n",
        article.feed_title,
        article.title,
        truncate_chars(article.summary.clone(), SUMMARY_CHARS)
    )
}

/// Character-boundary truncation, so the cap never splits a UTF-8
/// sequence. May still cut mid-entry.
fn truncate_chars(s: String, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(feed_title: &str, title: &str, summary: &str) -> ArticleHit {
        ArticleHit {
            id: "a1".to_string(),
            feed_id: "f1".to_string(),
            feed_title: feed_title.to_string(),
            title: title.to_string(),
            summary: summary.to_string(),
            content: String::new(),
            url: String::new(),
            published_date: None,
            author: String::new(),
            created_at: 0,
            score: 0.0,
        }
    }

    #[test]
    fn truncate_shorter_is_identity() {
        assert_eq!(truncate_chars("hello".to_string(), 10), "hello");
        assert_eq!(truncate_chars("hello".to_string(), 5), "hello");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        let s = "ééééé".to_string(); // 10 bytes, 5 chars
        assert_eq!(truncate_chars(s, 3), "ééé");
    }

    #[test]
    fn entry_summary_capped_at_300_chars() {
        let long = "x".repeat(1000);
        let entry = format_entry(&hit("Feed", "Title", &long));
        assert!(entry.contains(&"x".repeat(300)));
        assert!(!entry.contains(&"x".repeat(301)));
        assert!(entry.starts_with("Feed: Feed\nTitle: Title\nSummary: "));
        assert!(entry.ends_with("...\n\n"));
    }
}
