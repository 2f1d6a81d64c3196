//! Session store.
//!
//! Chat sessions are split across two stores: the metadata row in SQLite
//! (the authoritative index for listing and existence) and the transcript
//! blob (the authoritative message history) at
//! `<prefix>/<session_id>.json`.
//!
//! Creation writes the empty transcript first and then inserts the row. If
//! the row insert fails after the blob write succeeded, the orphaned blob
//! is an accepted, documented gap: there is no compensating delete and no
//! retry, and existence is decided by the row alone.
//!
//! The transcript read-modify-write on a turn is not transactional across
//! the two stores. The concurrency contract is at most one in-flight turn
//! per session, enforced here with a per-session async mutex that callers
//! hold for the duration of the turn. The guard map keeps one entry per
//! session id touched over the process lifetime and is never pruned; like
//! the orphaned blob, this unbounded-but-small growth is an accepted gap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::error::{Error, Result};
use crate::models::{ChatSession, ChatTranscript, TranscriptContext};

pub struct SessionStore {
    pool: SqlitePool,
    blobs: Arc<dyn BlobStore>,
    prefix: String,
    turn_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(pool: SqlitePool, blobs: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            blobs,
            prefix: prefix.into(),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    fn blob_key(&self, session_id: &str) -> String {
        format!("{}/{}.json", self.prefix, session_id)
    }

    /// The per-session guard serializing turns. Callers hold the lock
    /// across the whole read-modify-write of a turn.
    pub fn turn_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.turn_locks.lock().expect("lock map poisoned");
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Allocate an id, write the empty transcript blob, then insert the
    /// metadata row referencing it.
    pub async fn create_session(
        &self,
        title: Option<String>,
        rss_feed_ids: Vec<String>,
        article_ids: Vec<String>,
    ) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let blob_key = self.blob_key(&session_id);
        let title = title.unwrap_or_else(|| "New Chat".to_string());

        let transcript = ChatTranscript::empty(rss_feed_ids.clone(), article_ids.clone());
        let body = serde_json::to_string(&transcript)
            .map_err(|e| Error::storage(format!("transcript encode failed: {}", e)))?;
        // Blob first. If the row insert below fails, this blob is orphaned
        // and stays orphaned; the row's absence keeps the session
        // nonexistent.
        self.blobs.put(&blob_key, body).await?;

        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO chat_sessions
                (id, title, blob_key, rss_feed_ids, article_ids, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session_id)
        .bind(&title)
        .bind(&blob_key)
        .bind(encode_ids(&rss_feed_ids))
        .bind(encode_ids(&article_ids))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(session_id)
    }

    /// Existence is decided solely by the metadata row; an orphaned blob
    /// under the expected key does not make a session exist.
    pub async fn get_session(&self, session_id: &str) -> Result<ChatSession> {
        let row = sqlx::query(
            "SELECT id, title, blob_key, rss_feed_ids, article_ids, created_at, updated_at \
             FROM chat_sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(session_from_row)
            .ok_or_else(|| Error::not_found("chat session"))
    }

    pub async fn list_sessions(&self, limit: i64) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            "SELECT id, title, blob_key, rss_feed_ids, article_ids, created_at, updated_at \
             FROM chat_sessions ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(session_from_row).collect())
    }

    /// Load a session's transcript. A missing or unreadable blob degrades
    /// to an empty transcript carrying the session's association, so a
    /// turn can still proceed.
    pub async fn load_transcript(&self, session: &ChatSession) -> Result<ChatTranscript> {
        match self.blobs.get(&session.blob_key).await? {
            Some(body) => match serde_json::from_str(&body) {
                Ok(transcript) => Ok(transcript),
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.id,
                        error = %e,
                        "transcript blob unreadable; starting empty"
                    );
                    Ok(empty_for(session))
                }
            },
            None => {
                tracing::warn!(session_id = %session.id, "transcript blob missing; starting empty");
                Ok(empty_for(session))
            }
        }
    }

    pub async fn store_transcript(
        &self,
        session: &ChatSession,
        transcript: &ChatTranscript,
    ) -> Result<()> {
        let body = serde_json::to_string(transcript)
            .map_err(|e| Error::storage(format!("transcript encode failed: {}", e)))?;
        self.blobs.put(&session.blob_key, body).await
    }

    /// Bump the metadata row's updated_at after a persisted turn.
    pub async fn touch(&self, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn empty_for(session: &ChatSession) -> ChatTranscript {
    ChatTranscript {
        messages: Vec::new(),
        context: TranscriptContext {
            rss_feed_ids: session.rss_feed_ids.clone(),
            article_ids: session.article_ids.clone(),
        },
        updated_at: Utc::now(),
    }
}

fn session_from_row(row: sqlx::sqlite::SqliteRow) -> ChatSession {
    ChatSession {
        id: row.get("id"),
        title: row.get("title"),
        blob_key: row.get("blob_key"),
        rss_feed_ids: decode_ids(row.get("rss_feed_ids")),
        article_ids: decode_ids(row.get("article_ids")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn encode_ids(ids: &[String]) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string())
}

fn decode_ids(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}
