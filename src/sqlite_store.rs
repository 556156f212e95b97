//! SQLite-backed collaborators for the assistant.
//!
//! Implements [`PassageStore`], [`EventStore`] and [`ConversationHistory`]
//! over the schema created by [`crate::migrate`]. Embeddings are stored as
//! little-endian f32 BLOBs; SQLite has no vector index here, so the store
//! reports no native vector search and the retriever ranks in-process.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use campus_guide_core::embedding::blob_to_vec;
use campus_guide_core::store::{
    CampusEvent, ConversationHistory, EventStore, KnowledgePassage, PassageStore,
    RetrievalMatch, Scope, Turn, TurnIntent,
};
use campus_guide_core::text::fold;

const PASSAGE_COLUMNS: &str =
    "id, content, category, subcategory, scene, is_active, usage_count, embedding";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Set a conversation's title unless it already has one.
    pub async fn set_conversation_title(&self, conversation_id: i64, title: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET title = COALESCE(title, ?) WHERE id = ?")
            .bind(title)
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn conversation_title(&self, conversation_id: i64) -> Result<Option<String>> {
        let title: Option<Option<String>> =
            sqlx::query_scalar("SELECT title FROM conversations WHERE id = ?")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(title.flatten())
    }
}

/// SQL predicate for a scope, and the scene key to bind if it needs one.
fn scope_filter<'a>(scope: Scope<'a>) -> (&'static str, Option<&'a str>) {
    match scope {
        Scope::Scene(key) => ("scene = ?", Some(key)),
        Scope::Global => ("scene IS NULL", None),
        Scope::Any => ("1 = 1", None),
    }
}

fn passage_from_row(row: &SqliteRow) -> KnowledgePassage {
    let embedding: Option<Vec<u8>> = row.get("embedding");
    KnowledgePassage {
        id: row.get("id"),
        content: row.get("content"),
        category: row.get("category"),
        subcategory: row.get("subcategory"),
        scene: row.get("scene"),
        is_active: row.get("is_active"),
        usage_count: row.get("usage_count"),
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
    }
}

fn event_from_row(row: &SqliteRow) -> Result<CampusEvent> {
    let ts: i64 = row.get("starts_at");
    let starts_at = DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| anyhow!("event has an invalid start timestamp: {}", ts))?;
    Ok(CampusEvent {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        location: row.get("location"),
        starts_at,
        scene: row.get("scene"),
        is_active: row.get("is_active"),
    })
}

#[async_trait]
impl PassageStore for SqliteStore {
    fn supports_vector_search(&self) -> bool {
        false
    }

    async fn nearest_passages(
        &self,
        _query_vec: &[f32],
        _limit: usize,
        _scope: Scope<'_>,
    ) -> Result<Vec<RetrievalMatch>> {
        anyhow::bail!("SQLite store has no vector index")
    }

    async fn eligible_passages(&self, scope: Scope<'_>) -> Result<Vec<KnowledgePassage>> {
        let (predicate, scene) = scope_filter(scope);
        let sql = format!(
            "SELECT {} FROM knowledge WHERE is_active = 1 AND {} ORDER BY id",
            PASSAGE_COLUMNS, predicate
        );
        let mut query = sqlx::query(&sql);
        if let Some(key) = scene {
            query = query.bind(key);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(passage_from_row).collect())
    }

    /// SQLite's `lower()` only folds ASCII, so matching happens here with the
    /// same accent and case folding the classifier uses.
    async fn passages_containing(
        &self,
        needle: &str,
        limit: usize,
        scope: Scope<'_>,
    ) -> Result<Vec<KnowledgePassage>> {
        let needle = fold(needle.trim());
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let hits = self
            .eligible_passages(scope)
            .await?
            .into_iter()
            .filter(|p| fold(&p.content).contains(&needle))
            .take(limit)
            .collect();
        Ok(hits)
    }

    async fn increment_usage(&self, ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for &id in ids {
            sqlx::query("UPDATE knowledge SET usage_count = usage_count + 1 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn upcoming_events(&self, now: DateTime<Utc>, scope: Scope<'_>) -> Result<Vec<CampusEvent>> {
        let (predicate, scene) = scope_filter(scope);
        let sql = format!(
            "SELECT id, title, description, location, starts_at, scene, is_active FROM events \
             WHERE is_active = 1 AND starts_at > ? AND {} ORDER BY starts_at",
            predicate
        );
        let mut query = sqlx::query(&sql).bind(now.timestamp());
        if let Some(key) = scene {
            query = query.bind(key);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(event_from_row).collect()
    }
}

#[async_trait]
impl ConversationHistory for SqliteStore {
    async fn recent_turns(&self, conversation_id: i64, limit: usize) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            r#"
            SELECT content, is_from_user, created_at, intent_category, intent_confidence,
                   intent_keywords, requires_clarification
            FROM messages
            WHERE conversation_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = rows
            .iter()
            .map(|row| {
                let ts: i64 = row.get("created_at");
                Ok(Turn {
                    content: row.get("content"),
                    is_from_user: row.get("is_from_user"),
                    timestamp: DateTime::from_timestamp(ts, 0)
                        .ok_or_else(|| anyhow!("message has an invalid timestamp: {}", ts))?,
                    intent: intent_from_row(row)?,
                })
            })
            .collect::<Result<Vec<Turn>>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn append_turn(&self, conversation_id: i64, turn: &Turn) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO conversations (id, created_at) VALUES (?, ?)")
            .bind(conversation_id)
            .bind(turn.timestamp.timestamp())
            .execute(&mut *tx)
            .await?;
        let intent = turn.intent.as_ref();
        let keywords = intent
            .map(|i| serde_json::to_string(&i.keywords))
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, content, is_from_user, created_at,
                                  intent_category, intent_confidence, intent_keywords,
                                  requires_clarification)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation_id)
        .bind(&turn.content)
        .bind(turn.is_from_user)
        .bind(turn.timestamp.timestamp())
        .bind(intent.map(|i| i.category.as_str()))
        .bind(intent.map(|i| i.confidence))
        .bind(keywords)
        .bind(intent.map(|i| i.requires_clarification))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn message_count(&self, conversation_id: i64) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

/// Intent columns of a `messages` row; all NULL for assistant turns.
fn intent_from_row(row: &SqliteRow) -> Result<Option<TurnIntent>> {
    let Some(category) = row.get::<Option<String>, _>("intent_category") else {
        return Ok(None);
    };
    let keywords: Option<String> = row.get("intent_keywords");
    Ok(Some(TurnIntent {
        category: category.parse()?,
        confidence: row.get::<Option<f64>, _>("intent_confidence").unwrap_or(0.0),
        keywords: match keywords {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        },
        requires_clarification: row
            .get::<Option<bool>, _>("requires_clarification")
            .unwrap_or(false),
    }))
}
