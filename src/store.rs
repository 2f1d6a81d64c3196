//! Article store.
//!
//! Idempotent persistence of feeds and articles plus the maintained FTS5
//! index over title, summary, and content. Feeds are keyed by url;
//! articles by the (feed_id, url) natural key, so duplicate ingestion of
//! the same entry never creates a second row.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ArticleHit, Feed, FeedEntry};

/// Upsert a feed keyed by url, preserving its identity and refreshing
/// title, description, and last_updated.
pub async fn upsert_feed(
    pool: &SqlitePool,
    url: &str,
    title: &str,
    description: &str,
) -> Result<String> {
    let existing_id: Option<String> = sqlx::query_scalar("SELECT id FROM rss_feeds WHERE url = ?")
        .bind(url)
        .fetch_optional(pool)
        .await?;

    let feed_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO rss_feeds (id, title, url, description, last_updated, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(url) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(&feed_id)
    .bind(title)
    .bind(url)
    .bind(description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(feed_id)
}

/// Insert entries for a feed in a single transaction. Conflicting inserts
/// on (feed_id, url) are no-ops, not updates; per-entry failures are
/// logged and skipped without aborting the batch. Returns the number of
/// rows actually inserted.
pub async fn insert_articles(
    pool: &SqlitePool,
    feed_id: &str,
    entries: &[FeedEntry],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let now = Utc::now().timestamp();
    let mut inserted = 0u64;

    for entry in entries {
        let article_id = Uuid::new_v4().to_string();
        let published = parse_published_date(&entry.published);

        let result = sqlx::query(
            r#"
            INSERT INTO rss_articles
                (id, feed_id, title, content, summary, url, published_date, author, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(feed_id, url) DO NOTHING
            "#,
        )
        .bind(&article_id)
        .bind(feed_id)
        .bind(&entry.title)
        .bind("")
        .bind(&entry.summary)
        .bind(&entry.link)
        .bind(published)
        .bind(&entry.author)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let rows = match result {
            Ok(r) => r.rows_affected(),
            Err(e) => {
                tracing::warn!(feed_id, url = %entry.link, error = %e, "skipping entry");
                continue;
            }
        };

        // Index only rows that were actually inserted, so the FTS table
        // stays one-to-one with rss_articles.
        if rows > 0 {
            sqlx::query(
                "INSERT INTO articles_fts (article_id, feed_id, title, summary, content) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&article_id)
            .bind(feed_id)
            .bind(&entry.title)
            .bind(&entry.summary)
            .bind("")
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Parse an entry's publish date leniently. Unparseable dates become
/// `None` rather than failing the entry.
pub fn parse_published_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.timestamp())
        .ok()
}

/// All registered feeds, newest first.
pub async fn list_feeds(pool: &SqlitePool) -> Result<Vec<Feed>> {
    let rows = sqlx::query(
        "SELECT id, title, url, description, last_updated, created_at \
         FROM rss_feeds ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| Feed {
            id: r.get("id"),
            title: r.get("title"),
            url: r.get("url"),
            description: r.get("description"),
            last_updated: r.get("last_updated"),
            created_at: r.get("created_at"),
        })
        .collect())
}

const HIT_COLUMNS: &str = "a.id, a.feed_id, f.title AS feed_title, a.title, a.summary, \
     a.content, a.url, a.published_date, a.author, a.created_at";

fn hit_from_row(row: &SqliteRow, score: f64) -> ArticleHit {
    ArticleHit {
        id: row.get("id"),
        feed_id: row.get("feed_id"),
        feed_title: row.get("feed_title"),
        title: row.get("title"),
        summary: row.get("summary"),
        content: row.get("content"),
        url: row.get("url"),
        published_date: row.get("published_date"),
        author: row.get("author"),
        created_at: row.get("created_at"),
        score,
    }
}

/// All articles across feeds, newest-created first.
pub async fn list_articles(pool: &SqlitePool, limit: i64) -> Result<Vec<ArticleHit>> {
    let sql = format!(
        "SELECT {HIT_COLUMNS} FROM rss_articles a \
         JOIN rss_feeds f ON f.id = a.feed_id \
         ORDER BY a.created_at DESC LIMIT ?"
    );
    let rows = sqlx::query(&sql).bind(limit).fetch_all(pool).await?;

    Ok(rows.iter().map(|r| hit_from_row(r, 0.0)).collect())
}

/// Ranked full-text search over title+summary+content. Ties in rank break
/// by publish date, newest first. An empty sanitized query yields no
/// results rather than an FTS syntax error.
pub async fn search_articles(
    pool: &SqlitePool,
    query: &str,
    limit: i64,
) -> Result<Vec<ArticleHit>> {
    let Some(match_expr) = sanitize_match_query(query) else {
        return Ok(Vec::new());
    };

    let sql = format!(
        "SELECT {HIT_COLUMNS}, articles_fts.rank AS rank \
         FROM articles_fts \
         JOIN rss_articles a ON a.id = articles_fts.article_id \
         JOIN rss_feeds f ON f.id = a.feed_id \
         WHERE articles_fts MATCH ? \
         ORDER BY rank, a.published_date DESC \
         LIMIT ?"
    );
    let rows = sqlx::query(&sql)
        .bind(&match_expr)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|r| {
            let rank: f64 = r.get("rank");
            // negate so higher = better
            hit_from_row(r, -rank)
        })
        .collect())
}

/// Fetch articles by id, preserving nothing about input order beyond
/// membership; unknown ids simply produce no row.
pub async fn articles_by_ids(
    pool: &SqlitePool,
    ids: &[String],
    limit: i64,
) -> Result<Vec<ArticleHit>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!(
        "SELECT {HIT_COLUMNS} FROM rss_articles a \
         JOIN rss_feeds f ON f.id = a.feed_id \
         WHERE a.id IN ({placeholders}) LIMIT ?"
    );

    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let rows = query.bind(limit).fetch_all(pool).await?;

    Ok(rows.iter().map(|r| hit_from_row(r, 0.0)).collect())
}

/// Articles created at or after the cutoff, newest first.
pub async fn recent_articles(
    pool: &SqlitePool,
    cutoff: i64,
    limit: i64,
) -> Result<Vec<ArticleHit>> {
    let sql = format!(
        "SELECT {HIT_COLUMNS} FROM rss_articles a \
         JOIN rss_feeds f ON f.id = a.feed_id \
         WHERE a.created_at >= ? \
         ORDER BY a.created_at DESC LIMIT ?"
    );
    let rows = sqlx::query(&sql)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|r| hit_from_row(r, 0.0)).collect())
}

/// Articles older than the cutoff, ranked by relevance against the query;
/// ties break by recency.
pub async fn relevant_older_articles(
    pool: &SqlitePool,
    query: &str,
    cutoff: i64,
    limit: i64,
) -> Result<Vec<ArticleHit>> {
    let Some(match_expr) = sanitize_match_query(query) else {
        return Ok(Vec::new());
    };

    let sql = format!(
        "SELECT {HIT_COLUMNS}, articles_fts.rank AS rank \
         FROM articles_fts \
         JOIN rss_articles a ON a.id = articles_fts.article_id \
         JOIN rss_feeds f ON f.id = a.feed_id \
         WHERE articles_fts MATCH ? AND a.created_at < ? \
         ORDER BY rank, a.created_at DESC \
         LIMIT ?"
    );
    let rows = sqlx::query(&sql)
        .bind(&match_expr)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|r| {
            let rank: f64 = r.get("rank");
            hit_from_row(r, -rank)
        })
        .collect())
}

/// Turn raw user text into a safe FTS5 MATCH expression: each term is
/// quoted, terms combine with implicit AND. Returns `None` when no terms
/// survive.
pub fn sanitize_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_quotes_terms() {
        assert_eq!(
            sanitize_match_query("rust async runtime"),
            Some("\"rust\" \"async\" \"runtime\"".to_string())
        );
    }

    #[test]
    fn sanitize_strips_fts_syntax() {
        assert_eq!(
            sanitize_match_query("NEAR(\"a\" OR b*)"),
            Some("\"NEAR\" \"a\" \"OR\" \"b\"".to_string())
        );
    }

    #[test]
    fn sanitize_empty_and_punctuation() {
        assert_eq!(sanitize_match_query(""), None);
        assert_eq!(sanitize_match_query("?!... --"), None);
    }

    #[test]
    fn publish_date_parses_rfc3339_and_rfc2822() {
        assert!(parse_published_date("2024-05-01T10:00:00Z").is_some());
        assert!(parse_published_date("Wed, 01 May 2024 10:00:00 GMT").is_some());
        assert_eq!(parse_published_date("not a date"), None);
        assert_eq!(parse_published_date(""), None);
    }
}
