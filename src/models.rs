//! Core data models used throughout rss-chat.
//!
//! These types represent the feeds, articles, sessions, and transcripts
//! that flow through the ingestion and chat pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A syndication source identified by its canonical URL.
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub last_updated: i64,
    pub created_at: i64,
}

/// A feed candidate produced by discovery.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredFeed {
    pub url: String,
    pub title: String,
}

/// Normalized output of the feed parser, before persistence.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub description: String,
    pub link: String,
    pub entries: Vec<FeedEntry>,
}

/// One normalized feed entry. Missing fields default to empty strings;
/// `published` stays a raw string until ingestion parses it leniently.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: String,
    pub author: String,
}

/// A search or retrieval hit joined with its feed title.
#[derive(Debug, Clone)]
pub struct ArticleHit {
    pub id: String,
    pub feed_id: String,
    pub feed_title: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub url: String,
    pub published_date: Option<i64>,
    pub author: String,
    pub created_at: i64,
    /// Relevance score; only meaningful for ranked search results.
    pub score: f64,
}

/// Session metadata row. The authoritative index for listing and
/// existence; it never contains messages.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub blob_key: String,
    pub rss_feed_ids: Vec<String>,
    pub article_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// The transcript blob: authoritative message history plus the feed and
/// article association captured at session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTranscript {
    pub messages: Vec<ChatMessage>,
    pub context: TranscriptContext,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptContext {
    #[serde(default)]
    pub rss_feed_ids: Vec<String>,
    #[serde(default)]
    pub article_ids: Vec<String>,
}

impl ChatTranscript {
    pub fn empty(rss_feed_ids: Vec<String>, article_ids: Vec<String>) -> Self {
        Self {
            messages: Vec::new(),
            context: TranscriptContext {
                rss_feed_ids,
                article_ids,
            },
            updated_at: Utc::now(),
        }
    }
}
