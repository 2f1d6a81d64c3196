//! Session lifecycle and chat-turn properties: dual-store creation layout,
//! context-window bounds, retrieval-mode precedence, the bounded message
//! window, and failure paths that must leave both stores untouched.

mod common;

use std::sync::Arc;

use chrono::Utc;

use common::{article_id_by_url, entry, set_created_at, setup_pool, FailingGenerator, RecordingGenerator};
use rss_chat::blob::{BlobStore, MemoryBlobStore};
use rss_chat::chat::ChatOrchestrator;
use rss_chat::config::RetrievalConfig;
use rss_chat::context::ContextAssembler;
use rss_chat::error::Error;
use rss_chat::models::ChatTranscript;
use rss_chat::session::SessionStore;
use rss_chat::store;

const PREFIX: &str = "chat-history/anonymous";

async fn session_store(pool: sqlx::SqlitePool) -> (Arc<SessionStore>, Arc<MemoryBlobStore>) {
    let blobs = Arc::new(MemoryBlobStore::new());
    let sessions = Arc::new(SessionStore::new(pool, blobs.clone(), PREFIX));
    (sessions, blobs)
}

// ============ Session lifecycle ============

#[tokio::test]
async fn create_session_writes_blob_then_row() {
    let pool = setup_pool().await;
    let (sessions, blobs) = session_store(pool).await;

    let id = sessions
        .create_session(Some("Morning briefing".to_string()), vec![], vec!["a-1".to_string()])
        .await
        .unwrap();

    let session = sessions.get_session(&id).await.unwrap();
    assert_eq!(session.title, "Morning briefing");
    assert_eq!(session.blob_key, format!("{}/{}.json", PREFIX, id));
    assert_eq!(session.article_ids, vec!["a-1".to_string()]);

    // The empty transcript was durably written under the expected key.
    let body = blobs.get(&session.blob_key).await.unwrap().unwrap();
    let transcript: ChatTranscript = serde_json::from_str(&body).unwrap();
    assert!(transcript.messages.is_empty());
    assert_eq!(transcript.context.article_ids, vec!["a-1".to_string()]);
}

#[tokio::test]
async fn list_sessions_is_most_recent_first() {
    let pool = setup_pool().await;
    let (sessions, _blobs) = session_store(pool.clone()).await;

    let first = sessions.create_session(Some("First".to_string()), vec![], vec![]).await.unwrap();
    let second = sessions.create_session(Some("Second".to_string()), vec![], vec![]).await.unwrap();

    // Force distinct, ordered timestamps; wall-clock seconds can collide.
    sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE id = ?")
        .bind(100_i64)
        .bind(&first)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE id = ?")
        .bind(200_i64)
        .bind(&second)
        .execute(&pool)
        .await
        .unwrap();

    let listed = sessions.list_sessions(20).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second);
    assert_eq!(listed[1].id, first);
}

#[tokio::test]
async fn unknown_session_is_not_found_and_touches_nothing() {
    let pool = setup_pool().await;
    let (sessions, blobs) = session_store(pool.clone()).await;

    let assembler = ContextAssembler::new(pool, retrieval());
    let orchestrator =
        ChatOrchestrator::new(sessions, assembler, RecordingGenerator::new("unused"));

    let err = orchestrator
        .append_turn("3f2b8a9e-0000-0000-0000-000000000000", "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(blobs.is_empty());
}

// ============ Context assembly ============

fn retrieval() -> RetrievalConfig {
    RetrievalConfig::default()
}

#[tokio::test]
async fn recency_window_boundary_is_48_hours() {
    let pool = setup_pool().await;
    let feed_id = store::upsert_feed(&pool, "https://example.com/feed", "Example", "")
        .await
        .unwrap();

    let entries = vec![
        entry("Fresh", "https://example.com/fresh", "now"),
        entry("Hour old", "https://example.com/hour", "recent"),
        entry("Almost stale", "https://example.com/almost", "edge"),
        entry("Stale", "https://example.com/stale", "old"),
    ];
    store::insert_articles(&pool, &feed_id, &entries).await.unwrap();

    let now = Utc::now().timestamp();
    set_created_at(&pool, "https://example.com/fresh", now).await;
    set_created_at(&pool, "https://example.com/hour", now - 3600).await;
    set_created_at(&pool, "https://example.com/almost", now - 47 * 3600).await;
    set_created_at(&pool, "https://example.com/stale", now - 49 * 3600).await;

    let assembler = ContextAssembler::new(pool, retrieval());
    let context = assembler.assemble("", &[]).await.unwrap();

    assert!(context.contains("=== RECENT ARTICLES (Last 48 hours) ==="));
    assert!(context.contains("Title: Fresh"));
    assert!(context.contains("Title: Hour old"));
    assert!(context.contains("Title: Almost stale"));
    assert!(!context.contains("Title: Stale"));
    // Empty query skips the relevance window entirely.
    assert!(!context.contains("RELEVANT OLDER ARTICLES"));
}

#[tokio::test]
async fn stale_articles_return_through_relevance_window() {
    let pool = setup_pool().await;
    let feed_id = store::upsert_feed(&pool, "https://example.com/feed", "Example", "")
        .await
        .unwrap();

    let entries = vec![
        entry("Old kernel news", "https://example.com/kernel", "kernel scheduler rework"),
        entry("Old cooking news", "https://example.com/cooking", "a soup recipe"),
    ];
    store::insert_articles(&pool, &feed_id, &entries).await.unwrap();

    let stale = Utc::now().timestamp() - 72 * 3600;
    set_created_at(&pool, "https://example.com/kernel", stale).await;
    set_created_at(&pool, "https://example.com/cooking", stale).await;

    let assembler = ContextAssembler::new(pool, retrieval());
    let context = assembler.assemble("kernel scheduler", &[]).await.unwrap();

    assert!(context.contains("=== RELEVANT OLDER ARTICLES ==="));
    assert!(context.contains("Title: Old kernel news"));
    assert!(!context.contains("Title: Old cooking news"));
}

#[tokio::test]
async fn context_never_exceeds_configured_char_cap() {
    let pool = setup_pool().await;
    let feed_id = store::upsert_feed(&pool, "https://example.com/feed", "Example", "")
        .await
        .unwrap();

    // Titles are not per-entry truncated, so a handful of huge titles
    // pushes the composition well past the cap.
    let entries: Vec<_> = (0..10)
        .map(|i| {
            entry(
                &format!("{}-{}", "t".repeat(2000), i),
                &format!("https://example.com/{}", i),
                &"s".repeat(1000),
            )
        })
        .collect();
    store::insert_articles(&pool, &feed_id, &entries).await.unwrap();

    let assembler = ContextAssembler::new(pool, retrieval());
    let context = assembler.assemble("", &[]).await.unwrap();

    assert_eq!(context.chars().count(), 8000);
}

#[tokio::test]
async fn pinned_articles_suppress_freeform_retrieval() {
    let pool = setup_pool().await;
    let feed_id = store::upsert_feed(&pool, "https://example.com/feed", "Example", "")
        .await
        .unwrap();

    let entries = vec![
        entry("Pinned story", "https://example.com/pinned", "the chosen one"),
        entry("Fresh other", "https://example.com/other", "not chosen"),
    ];
    store::insert_articles(&pool, &feed_id, &entries).await.unwrap();
    let pinned_id = article_id_by_url(&pool, "https://example.com/pinned").await;

    let assembler = ContextAssembler::new(pool, retrieval());
    let context = assembler.assemble("not chosen", &[pinned_id]).await.unwrap();

    assert!(context.starts_with("Selected Articles:"));
    assert!(context.contains("Title: Pinned story"));
    // Both articles are fresh and the query matches the other one, but
    // pinning wins: neither freeform window appears.
    assert!(!context.contains("Title: Fresh other"));
    assert!(!context.contains("RECENT ARTICLES"));
    assert!(!context.contains("RELEVANT OLDER ARTICLES"));
}

#[tokio::test]
async fn all_unknown_pins_yield_placeholder_context() {
    let pool = setup_pool().await;
    let assembler = ContextAssembler::new(pool, retrieval());

    let context = assembler
        .assemble("anything", &["nope-1".to_string(), "nope-2".to_string()])
        .await
        .unwrap();
    assert_eq!(context, "No articles found for the provided IDs.");
}

// ============ Chat turns ============

#[tokio::test]
async fn generation_sees_only_the_latest_three_messages() {
    let pool = setup_pool().await;
    let (sessions, _blobs) = session_store(pool.clone()).await;
    let generator = RecordingGenerator::new("noted");
    let orchestrator = ChatOrchestrator::new(
        sessions.clone(),
        ContextAssembler::new(pool, retrieval()),
        generator.clone(),
    );

    let id = sessions.create_session(None, vec![], vec![]).await.unwrap();
    orchestrator.append_turn(&id, "first question").await.unwrap();
    orchestrator.append_turn(&id, "second question").await.unwrap();
    orchestrator.append_turn(&id, "third question").await.unwrap();

    let calls = generator.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);

    // By the third turn the transcript holds five messages; the backend
    // still receives exactly the latest three.
    let (system, window) = &calls[2];
    assert_eq!(window.len(), 3);
    assert_eq!(window[0].role, "user");
    assert_eq!(window[0].content, "second question");
    assert_eq!(window[1].role, "assistant");
    assert_eq!(window[1].content, "noted");
    assert_eq!(window[2].role, "user");
    assert_eq!(window[2].content, "third question");
    assert!(system.contains("RSS ARTICLES:"));
}

#[tokio::test]
async fn turn_persists_both_messages_and_bumps_session() {
    let pool = setup_pool().await;
    let (sessions, blobs) = session_store(pool.clone()).await;
    let orchestrator = ChatOrchestrator::new(
        sessions.clone(),
        ContextAssembler::new(pool.clone(), retrieval()),
        RecordingGenerator::new("the answer"),
    );

    let id = sessions.create_session(None, vec![], vec![]).await.unwrap();
    sqlx::query("UPDATE chat_sessions SET updated_at = 0 WHERE id = ?")
        .bind(&id)
        .execute(&pool)
        .await
        .unwrap();

    let reply = orchestrator.append_turn(&id, "what happened today?").await.unwrap();
    assert_eq!(reply, "the answer");

    let session = sessions.get_session(&id).await.unwrap();
    assert!(session.updated_at > 0);

    let body = blobs.get(&session.blob_key).await.unwrap().unwrap();
    let transcript: ChatTranscript = serde_json::from_str(&body).unwrap();
    assert_eq!(transcript.messages.len(), 2);
    assert_eq!(transcript.messages[0].role, "user");
    assert_eq!(transcript.messages[0].content, "what happened today?");
    assert_eq!(transcript.messages[1].role, "assistant");
    assert_eq!(transcript.messages[1].content, "the answer");
}

#[tokio::test]
async fn failed_generation_persists_nothing() {
    let pool = setup_pool().await;
    let (sessions, blobs) = session_store(pool.clone()).await;
    let orchestrator = ChatOrchestrator::new(
        sessions.clone(),
        ContextAssembler::new(pool.clone(), retrieval()),
        Arc::new(FailingGenerator),
    );

    let id = sessions.create_session(None, vec![], vec![]).await.unwrap();
    sqlx::query("UPDATE chat_sessions SET updated_at = 0 WHERE id = ?")
        .bind(&id)
        .execute(&pool)
        .await
        .unwrap();

    let err = orchestrator.append_turn(&id, "hello").await.unwrap_err();
    assert!(matches!(err, Error::Generation(_)));

    // The user turn was never written back and the row was not touched.
    let session = sessions.get_session(&id).await.unwrap();
    assert_eq!(session.updated_at, 0);
    let body = blobs.get(&session.blob_key).await.unwrap().unwrap();
    let transcript: ChatTranscript = serde_json::from_str(&body).unwrap();
    assert!(transcript.messages.is_empty());
}

#[tokio::test]
async fn missing_transcript_blob_degrades_to_empty() {
    let pool = setup_pool().await;
    let sessions = Arc::new(SessionStore::new(
        pool.clone(),
        Arc::new(MemoryBlobStore::new()),
        PREFIX,
    ));
    let id = sessions.create_session(None, vec![], vec![]).await.unwrap();
    let session = sessions.get_session(&id).await.unwrap();

    // Simulate a lost blob with a second store that never saw the put.
    let amnesiac = Arc::new(SessionStore::new(pool, Arc::new(MemoryBlobStore::new()), PREFIX));
    let transcript = amnesiac.load_transcript(&session).await.unwrap();
    assert!(transcript.messages.is_empty());
}
