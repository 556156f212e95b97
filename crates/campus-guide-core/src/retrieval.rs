//! Hybrid knowledge retrieval: vector search blended with lexical search.
//!
//! The retriever operates entirely through the [`Embedder`], [`PassageStore`]
//! and [`EventStore`] traits. Every collaborator failure degrades to an
//! empty partial result plus a [`RetrievalWarning`]; nothing here returns an
//! error to the caller.
//!
//! # Retrieval Algorithm
//!
//! 1. Embed the query. If that fails, return no matches.
//! 2. Vector pass through a [`DistanceSearch`] strategy: the store's own
//!    index when it advertises one, otherwise in-process cosine ranking. A
//!    failing store index falls back to the in-process strategy.
//! 3. Lexical pass: passages containing the query, at a neutral distance.
//! 4. Both passes read the scene first and top up with campus-wide rows.
//! 5. Merge vector hits then lexical hits, dropping repeated ids; truncate.
//! 6. Rerank: `score = (1 - distance) × w + overlap × (1 - w)`.
//! 7. Bump usage counters of the survivors (best effort).

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::embedding::Embedder;
use crate::store::{rank_by_distance, CampusEvent, EventStore, PassageStore, Scope};
use crate::text::{fold, word_set};

pub use crate::store::RetrievalMatch;

/// Distance assigned to passages found only by the lexical pass.
pub const LEXICAL_DISTANCE: f64 = 0.5;

/// Weight of semantic closeness in the rerank blend.
pub const VECTOR_WEIGHT: f64 = 0.7;

/// Character budget per passage in [`format_passages`].
pub const MAX_CHARS_PER_PASSAGE: usize = 800;

/// Events returned by [`HybridRetriever::search_events`].
pub const EVENT_LIMIT: usize = 2;

/// Query words shorter than this never count as event overlap.
pub const MIN_EVENT_TERM_LEN: usize = 4;

const CAMPUS_WIDE_CUES: &[&str] = &[
    "todo el campus",
    "toda la sede",
    "en el campus",
    "campus en general",
    "whole campus",
    "across the campus",
];

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub lexical_distance: f64,
    pub vector_weight: f64,
    /// Drop matches farther than this distance.
    pub distance_threshold: Option<f64>,
    pub max_chars_per_passage: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 4,
            lexical_distance: LEXICAL_DISTANCE,
            vector_weight: VECTOR_WEIGHT,
            distance_threshold: None,
            max_chars_per_passage: MAX_CHARS_PER_PASSAGE,
        }
    }
}

/// A collaborator failure that was absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum RetrievalWarning {
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("store vector search failed, ranked in-process instead: {0}")]
    VectorSearchFallback(String),
    #[error("vector search failed: {0}")]
    VectorSearchFailed(String),
    #[error("keyword search failed: {0}")]
    KeywordSearchFailed(String),
    #[error("usage counter update failed: {0}")]
    UsageCounterFailed(String),
    #[error("event search failed: {0}")]
    EventSearchFailed(String),
    #[error("conversation history unavailable: {0}")]
    HistoryUnavailable(String),
}

/// A value plus the non-fatal warnings collected while producing it.
#[derive(Debug, Clone, Default)]
pub struct WithWarnings<T> {
    pub value: T,
    pub warnings: Vec<RetrievalWarning>,
}

impl<T> WithWarnings<T> {
    pub fn new(value: T, warnings: Vec<RetrievalWarning>) -> Self {
        Self { value, warnings }
    }
}

/// A way of getting the passages closest to a query vector.
#[async_trait]
pub trait DistanceSearch: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        store: &dyn PassageStore,
        query_vec: &[f32],
        limit: usize,
        scope: Scope<'_>,
    ) -> Result<Vec<RetrievalMatch>>;
}

/// Delegates to the store's native vector index.
pub struct StoreVectorSearch;

#[async_trait]
impl DistanceSearch for StoreVectorSearch {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn search(
        &self,
        store: &dyn PassageStore,
        query_vec: &[f32],
        limit: usize,
        scope: Scope<'_>,
    ) -> Result<Vec<RetrievalMatch>> {
        store.nearest_passages(query_vec, limit, scope).await
    }
}

/// Fetches eligible passages and ranks them by cosine distance locally.
pub struct InProcessCosine;

#[async_trait]
impl DistanceSearch for InProcessCosine {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn search(
        &self,
        store: &dyn PassageStore,
        query_vec: &[f32],
        limit: usize,
        scope: Scope<'_>,
    ) -> Result<Vec<RetrievalMatch>> {
        let passages = store.eligible_passages(scope).await?;
        Ok(rank_by_distance(query_vec, &passages, limit))
    }
}

/// Run `strategy` for the scene, then fill remaining slots from global rows.
async fn scene_then_global(
    strategy: &dyn DistanceSearch,
    store: &dyn PassageStore,
    query_vec: &[f32],
    top_k: usize,
    scene: Option<&str>,
) -> Result<Vec<RetrievalMatch>> {
    let Some(key) = scene else {
        return strategy.search(store, query_vec, top_k, Scope::Any).await;
    };
    let mut hits = strategy
        .search(store, query_vec, top_k, Scope::Scene(key))
        .await?;
    if hits.len() < top_k {
        let fill = strategy
            .search(store, query_vec, top_k - hits.len(), Scope::Global)
            .await?;
        hits.extend(fill);
    }
    Ok(hits)
}

/// Knowledge and event retriever.
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    passages: Arc<dyn PassageStore>,
    events: Arc<dyn EventStore>,
    params: RetrievalParams,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        passages: Arc<dyn PassageStore>,
        events: Arc<dyn EventStore>,
        params: RetrievalParams,
    ) -> Self {
        Self {
            embedder,
            passages,
            events,
            params,
        }
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// The `top_k` passages most relevant to `query`, best first.
    #[instrument(skip(self))]
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        scene: Option<&str>,
    ) -> WithWarnings<Vec<RetrievalMatch>> {
        let mut warnings = Vec::new();
        if query.trim().is_empty() || top_k == 0 {
            return WithWarnings::new(Vec::new(), warnings);
        }

        let query_vec = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed; continuing without context");
                warnings.push(RetrievalWarning::EmbeddingUnavailable(e.to_string()));
                return WithWarnings::new(Vec::new(), warnings);
            }
        };

        let vector_hits = self
            .vector_pass(&query_vec, top_k, scene, &mut warnings)
            .await;
        let lexical_hits = self.lexical_pass(query, top_k, scene, &mut warnings).await;
        debug!(
            vector = vector_hits.len(),
            lexical = lexical_hits.len(),
            "retrieval candidates"
        );

        let within = |m: &RetrievalMatch| {
            self.params
                .distance_threshold
                .map_or(true, |t| m.distance <= t)
        };
        let vector_hits: Vec<RetrievalMatch> = vector_hits.into_iter().filter(within).collect();
        let lexical_hits: Vec<RetrievalMatch> = lexical_hits.into_iter().filter(within).collect();

        let merged = merge_matches(vector_hits, lexical_hits, top_k);
        let ranked = rerank(query, merged, self.params.vector_weight);

        if !ranked.is_empty() {
            let mut seen = HashSet::new();
            let ids: Vec<i64> = ranked
                .iter()
                .map(|m| m.id)
                .filter(|id| seen.insert(*id))
                .collect();
            if let Err(e) = self.passages.increment_usage(&ids).await {
                warn!(error = %e, "usage counter update failed");
                warnings.push(RetrievalWarning::UsageCounterFailed(e.to_string()));
            }
        }

        WithWarnings::new(ranked, warnings)
    }

    async fn vector_pass(
        &self,
        query_vec: &[f32],
        top_k: usize,
        scene: Option<&str>,
        warnings: &mut Vec<RetrievalWarning>,
    ) -> Vec<RetrievalMatch> {
        let store = self.passages.as_ref();
        let primary: &dyn DistanceSearch = if store.supports_vector_search() {
            &StoreVectorSearch
        } else {
            &InProcessCosine
        };

        let first = scene_then_global(primary, store, query_vec, top_k, scene).await;
        let err = match first {
            Ok(hits) => return hits,
            Err(e) => e,
        };

        if primary.name() == InProcessCosine.name() {
            warn!(error = %err, "in-process vector ranking failed");
            warnings.push(RetrievalWarning::VectorSearchFailed(err.to_string()));
            return Vec::new();
        }

        warn!(error = %err, "store vector search failed; ranking in-process");
        warnings.push(RetrievalWarning::VectorSearchFallback(err.to_string()));
        match scene_then_global(&InProcessCosine, store, query_vec, top_k, scene).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "in-process vector ranking failed");
                warnings.push(RetrievalWarning::VectorSearchFailed(e.to_string()));
                Vec::new()
            }
        }
    }

    async fn lexical_pass(
        &self,
        query: &str,
        top_k: usize,
        scene: Option<&str>,
        warnings: &mut Vec<RetrievalWarning>,
    ) -> Vec<RetrievalMatch> {
        let needle = query.trim();
        let result = match scene {
            None => self.passages.passages_containing(needle, top_k, Scope::Any).await,
            Some(key) => {
                match self
                    .passages
                    .passages_containing(needle, top_k, Scope::Scene(key))
                    .await
                {
                    Ok(mut hits) if hits.len() < top_k => self
                        .passages
                        .passages_containing(needle, top_k - hits.len(), Scope::Global)
                        .await
                        .map(|fill| {
                            hits.extend(fill);
                            hits
                        }),
                    other => other,
                }
            }
        };

        match result {
            Ok(passages) => passages
                .iter()
                .map(|p| p.to_match(self.params.lexical_distance))
                .collect(),
            Err(e) => {
                warn!(error = %e, "keyword search failed");
                warnings.push(RetrievalWarning::KeywordSearchFailed(e.to_string()));
                Vec::new()
            }
        }
    }

    /// Up to [`EVENT_LIMIT`] upcoming events sharing words with `query`.
    #[instrument(skip(self))]
    pub async fn search_events(
        &self,
        query: &str,
        scene: Option<&str>,
    ) -> WithWarnings<Vec<CampusEvent>> {
        let now = Utc::now();
        let terms: BTreeSet<String> = word_set(query)
            .into_iter()
            .filter(|w| w.chars().count() >= MIN_EVENT_TERM_LEN)
            .collect();
        if terms.is_empty() {
            return WithWarnings::default();
        }

        let scope = scene.map_or(Scope::Any, Scope::Scene);
        let mut hits = match self.events.upcoming_events(now, scope).await {
            Ok(events) => rank_events(&terms, events),
            Err(e) => {
                warn!(error = %e, "event search failed");
                return WithWarnings::new(
                    Vec::new(),
                    vec![RetrievalWarning::EventSearchFailed(e.to_string())],
                );
            }
        };

        if hits.is_empty() && scene.is_some() && mentions_whole_campus(query) {
            debug!("no scene events matched; retrying campus-wide");
            hits = match self.events.upcoming_events(now, Scope::Global).await {
                Ok(events) => rank_events(&terms, events),
                Err(e) => {
                    warn!(error = %e, "campus-wide event search failed");
                    return WithWarnings::new(
                        Vec::new(),
                        vec![RetrievalWarning::EventSearchFailed(e.to_string())],
                    );
                }
            };
        }

        WithWarnings::new(hits, Vec::new())
    }
}

/// True if the query asks about the whole campus rather than one scene.
pub fn mentions_whole_campus(query: &str) -> bool {
    let folded = fold(query);
    CAMPUS_WIDE_CUES.iter().any(|cue| folded.contains(cue))
}

/// Keep events sharing at least one term with the query, most overlap first.
fn rank_events(terms: &BTreeSet<String>, events: Vec<CampusEvent>) -> Vec<CampusEvent> {
    let mut scored: Vec<(usize, CampusEvent)> = events
        .into_iter()
        .filter_map(|e| {
            let text = format!(
                "{} {} {}",
                e.title,
                e.description.as_deref().unwrap_or(""),
                e.location.as_deref().unwrap_or("")
            );
            let words = word_set(&text);
            let overlap = terms.iter().filter(|t| words.contains(*t)).count();
            (overlap > 0).then_some((overlap, e))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(EVENT_LIMIT)
        .map(|(_, e)| e)
        .collect()
}

/// Vector hits first, then lexical hits whose id has not been seen.
pub fn merge_matches(
    vector: Vec<RetrievalMatch>,
    lexical: Vec<RetrievalMatch>,
    top_k: usize,
) -> Vec<RetrievalMatch> {
    let mut seen = HashSet::new();
    let mut merged: Vec<RetrievalMatch> = vector
        .into_iter()
        .chain(lexical)
        .filter(|m| seen.insert(m.id))
        .collect();
    merged.truncate(top_k);
    merged
}

/// Fraction of `query_words` that also occur in `content`.
pub fn word_overlap_ratio(query_words: &BTreeSet<String>, content: &str) -> f64 {
    if query_words.is_empty() {
        return 0.0;
    }
    let content_words = word_set(content);
    let shared = query_words
        .iter()
        .filter(|w| content_words.contains(*w))
        .count();
    shared as f64 / query_words.len() as f64
}

/// Blend closeness with keyword confirmation and sort by the blend, best first.
pub fn rerank(query: &str, mut matches: Vec<RetrievalMatch>, vector_weight: f64) -> Vec<RetrievalMatch> {
    let query_words = word_set(query);
    for m in &mut matches {
        let overlap = word_overlap_ratio(&query_words, &m.content);
        m.score = (1.0 - m.distance) * vector_weight + overlap * (1.0 - vector_weight);
    }
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}

/// Cut `text` to at most `max_chars` characters on a word boundary.
pub fn truncate_at_word(text: &str, max_chars: usize) -> Cow<'_, str> {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return Cow::Borrowed(text);
    };
    let head = &text[..cut];
    let head = head.rfind(' ').map_or(head, |i| &head[..i]);
    Cow::Owned(format!("{}...", head))
}

/// Numbered, category-tagged context blocks; `None` when nothing matched.
pub fn format_passages(matches: &[RetrievalMatch], max_chars: usize) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let blocks: Vec<String> = matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "[{}] ({}) {}",
                i + 1,
                m.category,
                truncate_at_word(m.content.trim(), max_chars)
            )
        })
        .collect();
    Some(blocks.join("\n\n"))
}

/// One line per event; `None` when there are none.
pub fn format_events(events: &[CampusEvent]) -> Option<String> {
    if events.is_empty() {
        return None;
    }
    let lines: Vec<String> = events
        .iter()
        .map(|e| {
            let mut line = format!("- {} ({})", e.title, e.starts_at.format("%d/%m/%Y %H:%M"));
            if let Some(location) = &e.location {
                line.push_str(&format!(" en {}", location));
            }
            if let Some(description) = e.description.as_deref().filter(|d| !d.trim().is_empty()) {
                line.push_str(&format!(": {}", description.trim()));
            }
            line
        })
        .collect();
    Some(lines.join("\n"))
}
