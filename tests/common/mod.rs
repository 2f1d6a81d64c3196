//! Shared fixtures for integration tests: in-memory database, in-memory
//! blob store, and scripted generation backends.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::SqlitePool;

use rss_chat::error::{Error, Result};
use rss_chat::generate::Generator;
use rss_chat::models::{ChatMessage, FeedEntry};

pub async fn setup_pool() -> SqlitePool {
    let pool = rss_chat::db::connect_memory().await.unwrap();
    rss_chat::migrate::apply_schema(&pool).await.unwrap();
    pool
}

pub fn entry(title: &str, link: &str, summary: &str) -> FeedEntry {
    FeedEntry {
        title: title.to_string(),
        link: link.to_string(),
        summary: summary.to_string(),
        published: "2024-05-01T10:00:00Z".to_string(),
        author: "tester".to_string(),
    }
}

/// Set an article's creation time directly, for window-boundary tests.
pub async fn set_created_at(pool: &SqlitePool, article_url: &str, created_at: i64) {
    sqlx::query("UPDATE rss_articles SET created_at = ? WHERE url = ?")
        .bind(created_at)
        .bind(article_url)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn article_id_by_url(pool: &SqlitePool, url: &str) -> String {
    sqlx::query_scalar("SELECT id FROM rss_articles WHERE url = ?")
        .bind(url)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// A generator that records every call and replies with a fixed string.
pub struct RecordingGenerator {
    pub calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    pub reply: String,
}

impl RecordingGenerator {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        })
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), messages.to_vec()));
        Ok(self.reply.clone())
    }
}

/// A generator whose backend is always down.
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn complete(&self, _system: &str, _messages: &[ChatMessage]) -> Result<String> {
        Err(Error::Generation("AI service unavailable".to_string()))
    }
}
