//! Collaborator traits for knowledge passages, events, and conversation
//! history.
//!
//! The retriever and the assistant only ever talk to these traits, enabling
//! pluggable backends (SQLite in the app crate, in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::cosine_distance;
use crate::intent::{IntentCategory, IntentResult};

/// A stored unit of campus knowledge.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgePassage {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub subcategory: Option<String>,
    /// Scene key this passage is about; `None` means campus-wide.
    pub scene: Option<String>,
    pub is_active: bool,
    pub usage_count: i64,
    pub embedding: Option<Vec<f32>>,
}

impl KnowledgePassage {
    pub fn to_match(&self, distance: f64) -> RetrievalMatch {
        RetrievalMatch {
            id: self.id,
            content: self.content.clone(),
            category: self.category.clone(),
            scene: self.scene.clone(),
            distance,
            score: 0.0,
        }
    }
}

/// A passage surfaced by a search, with its distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalMatch {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub scene: Option<String>,
    /// Cosine distance for vector hits; a fixed neutral value for lexical hits.
    pub distance: f64,
    /// Blended rerank score (higher is better); `0.0` until reranked.
    pub score: f64,
}

/// An upcoming campus event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampusEvent {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub scene: Option<String>,
    pub is_active: bool,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub content: String,
    pub is_from_user: bool,
    pub timestamp: DateTime<Utc>,
    /// How a user message was classified; `None` for assistant turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<TurnIntent>,
}

/// The parts of an [`IntentResult`] kept with a stored user message, so
/// ambiguous and low-confidence messages can be reviewed later.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnIntent {
    pub category: IntentCategory,
    pub confidence: f64,
    pub keywords: Vec<String>,
    pub requires_clarification: bool,
}

impl From<&IntentResult> for TurnIntent {
    fn from(result: &IntentResult) -> Self {
        Self {
            category: result.category,
            confidence: result.confidence,
            keywords: result.keywords_found.clone(),
            requires_clarification: result.requires_clarification,
        }
    }
}

/// Which rows a query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Only rows tied to this scene.
    Scene(&'a str),
    /// Only campus-wide rows.
    Global,
    /// Every row.
    Any,
}

impl Scope<'_> {
    pub fn admits(&self, scene: Option<&str>) -> bool {
        match self {
            Scope::Scene(key) => scene == Some(*key),
            Scope::Global => scene.is_none(),
            Scope::Any => true,
        }
    }
}

/// Knowledge passage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`supports_vector_search`](PassageStore::supports_vector_search) | Capability probe for a native vector index |
/// | [`nearest_passages`](PassageStore::nearest_passages) | Top-K by cosine distance |
/// | [`eligible_passages`](PassageStore::eligible_passages) | Active passages in scope, for in-process ranking |
/// | [`passages_containing`](PassageStore::passages_containing) | Case-insensitive substring search |
/// | [`increment_usage`](PassageStore::increment_usage) | Usage counter bump |
#[async_trait]
pub trait PassageStore: Send + Sync {
    /// Whether [`nearest_passages`](PassageStore::nearest_passages) is backed
    /// by the store itself. When `false` the retriever ranks in-process.
    fn supports_vector_search(&self) -> bool {
        true
    }

    /// Active passages in `scope`, ordered by ascending cosine distance.
    async fn nearest_passages(
        &self,
        query_vec: &[f32],
        limit: usize,
        scope: Scope<'_>,
    ) -> Result<Vec<RetrievalMatch>>;

    /// Every active passage in `scope`.
    async fn eligible_passages(&self, scope: Scope<'_>) -> Result<Vec<KnowledgePassage>>;

    /// Active passages in `scope` whose content contains `needle`, ignoring case.
    async fn passages_containing(
        &self,
        needle: &str,
        limit: usize,
        scope: Scope<'_>,
    ) -> Result<Vec<KnowledgePassage>>;

    /// Add one to the usage counter of each id.
    async fn increment_usage(&self, ids: &[i64]) -> Result<()>;
}

/// Event backend.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Active events in `scope` starting after `now`, soonest first.
    async fn upcoming_events(&self, now: DateTime<Utc>, scope: Scope<'_>) -> Result<Vec<CampusEvent>>;
}

/// Conversation history backend.
#[async_trait]
pub trait ConversationHistory: Send + Sync {
    /// The last `limit` turns of a conversation, oldest first.
    async fn recent_turns(&self, conversation_id: i64, limit: usize) -> Result<Vec<Turn>>;

    /// Number of stored turns, from either side.
    async fn message_count(&self, conversation_id: i64) -> Result<usize>;

    async fn append_turn(&self, conversation_id: i64, turn: &Turn) -> Result<()>;
}

/// Rank passages by cosine distance to `query_vec`, closest first.
///
/// Passages without an embedding are skipped. Ties keep input order.
pub fn rank_by_distance(
    query_vec: &[f32],
    passages: &[KnowledgePassage],
    limit: usize,
) -> Vec<RetrievalMatch> {
    let mut ranked: Vec<RetrievalMatch> = passages
        .iter()
        .filter_map(|p| {
            p.embedding
                .as_deref()
                .map(|emb| p.to_match(cosine_distance(query_vec, emb)))
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}
