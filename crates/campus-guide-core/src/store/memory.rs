//! In-memory collaborator implementations for tests and embedding hosts.
//!
//! Uses `Vec` and `HashMap` behind `std::sync::RwLock`. Vector search is a
//! brute-force cosine ranking over the stored passages.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::text::fold;

use super::{
    rank_by_distance, CampusEvent, ConversationHistory, EventStore, KnowledgePassage,
    PassageStore, RetrievalMatch, Scope, Turn,
};

/// In-memory passage, event, and history store.
pub struct InMemoryStore {
    passages: RwLock<Vec<KnowledgePassage>>,
    events: RwLock<Vec<CampusEvent>>,
    turns: RwLock<HashMap<i64, Vec<Turn>>>,
    vector_index: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
            turns: RwLock::new(HashMap::new()),
            vector_index: true,
        }
    }

    /// A store that reports no native vector search, so retrievers rank
    /// its passages in-process.
    pub fn without_vector_index() -> Self {
        Self {
            vector_index: false,
            ..Self::new()
        }
    }

    pub fn add_passage(&self, passage: KnowledgePassage) {
        let mut passages = self.passages.write().unwrap_or_else(PoisonError::into_inner);
        passages.retain(|p| p.id != passage.id);
        passages.push(passage);
    }

    pub fn add_event(&self, event: CampusEvent) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        events.retain(|e| e.id != event.id);
        events.push(event);
    }

    /// Current usage counter of a passage.
    pub fn usage_count(&self, id: i64) -> Option<i64> {
        self.passages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.usage_count)
    }

    fn eligible(&self, scope: Scope<'_>) -> Vec<KnowledgePassage> {
        self.passages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.is_active && scope.admits(p.scene.as_deref()))
            .cloned()
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PassageStore for InMemoryStore {
    fn supports_vector_search(&self) -> bool {
        self.vector_index
    }

    async fn nearest_passages(
        &self,
        query_vec: &[f32],
        limit: usize,
        scope: Scope<'_>,
    ) -> Result<Vec<RetrievalMatch>> {
        if !self.vector_index {
            anyhow::bail!("vector search is not available on this store");
        }
        Ok(rank_by_distance(query_vec, &self.eligible(scope), limit))
    }

    async fn eligible_passages(&self, scope: Scope<'_>) -> Result<Vec<KnowledgePassage>> {
        Ok(self.eligible(scope))
    }

    async fn passages_containing(
        &self,
        needle: &str,
        limit: usize,
        scope: Scope<'_>,
    ) -> Result<Vec<KnowledgePassage>> {
        let needle = fold(needle.trim());
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<KnowledgePassage> = self
            .eligible(scope)
            .into_iter()
            .filter(|p| fold(&p.content).contains(&needle))
            .collect();
        hits.sort_by_key(|p| p.id);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn increment_usage(&self, ids: &[i64]) -> Result<()> {
        let mut passages = self.passages.write().unwrap_or_else(PoisonError::into_inner);
        for p in passages.iter_mut().filter(|p| ids.contains(&p.id)) {
            p.usage_count += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn upcoming_events(&self, now: DateTime<Utc>, scope: Scope<'_>) -> Result<Vec<CampusEvent>> {
        let mut events: Vec<CampusEvent> = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.is_active && e.starts_at > now && scope.admits(e.scene.as_deref()))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.starts_at);
        Ok(events)
    }
}

#[async_trait]
impl ConversationHistory for InMemoryStore {
    async fn recent_turns(&self, conversation_id: i64, limit: usize) -> Result<Vec<Turn>> {
        let turns = self.turns.read().unwrap_or_else(PoisonError::into_inner);
        let all = turns.get(&conversation_id).map(Vec::as_slice).unwrap_or(&[]);
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }

    async fn message_count(&self, conversation_id: i64) -> Result<usize> {
        let turns = self.turns.read().unwrap_or_else(PoisonError::into_inner);
        Ok(turns.get(&conversation_id).map_or(0, Vec::len))
    }

    async fn append_turn(&self, conversation_id: i64, turn: &Turn) -> Result<()> {
        self.turns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id)
            .or_default()
            .push(turn.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn passage(id: i64, content: &str, scene: Option<&str>, active: bool) -> KnowledgePassage {
        KnowledgePassage {
            id,
            content: content.to_string(),
            category: "servicios".to_string(),
            subcategory: None,
            scene: scene.map(str::to_string),
            is_active: active,
            usage_count: 0,
            embedding: Some(vec![1.0, id as f32]),
        }
    }

    fn event(id: i64, offset_hours: i64, scene: Option<&str>, active: bool) -> CampusEvent {
        CampusEvent {
            id,
            title: format!("Evento {id}"),
            description: None,
            location: None,
            starts_at: Utc::now() + Duration::hours(offset_hours),
            scene: scene.map(str::to_string),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_substring_search_respects_scope_and_activity() {
        let store = InMemoryStore::new();
        store.add_passage(passage(1, "La Biblioteca abre a las 8", Some("26-biblioteca"), true));
        store.add_passage(passage(2, "La biblioteca central", None, true));
        store.add_passage(passage(3, "Biblioteca antigua", None, false));

        let scene = store
            .passages_containing("BIBLIOTECA", 10, Scope::Scene("26-biblioteca"))
            .await
            .unwrap();
        assert_eq!(scene.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);

        let global = store
            .passages_containing("biblioteca", 10, Scope::Global)
            .await
            .unwrap();
        assert_eq!(global.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);

        let any = store
            .passages_containing("biblioteca", 10, Scope::Any)
            .await
            .unwrap();
        assert_eq!(any.len(), 2);
    }

    #[tokio::test]
    async fn test_vector_index_toggle() {
        let store = InMemoryStore::without_vector_index();
        store.add_passage(passage(1, "x", None, true));
        assert!(!store.supports_vector_search());
        assert!(store
            .nearest_passages(&[1.0, 0.0], 1, Scope::Any)
            .await
            .is_err());
        assert_eq!(store.eligible_passages(Scope::Any).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_increment_usage() {
        let store = InMemoryStore::new();
        store.add_passage(passage(1, "a", None, true));
        store.add_passage(passage(2, "b", None, true));
        store.increment_usage(&[1]).await.unwrap();
        store.increment_usage(&[1, 2]).await.unwrap();
        assert_eq!(store.usage_count(1), Some(2));
        assert_eq!(store.usage_count(2), Some(1));
        assert_eq!(store.usage_count(9), None);
    }

    #[tokio::test]
    async fn test_upcoming_events_filters_and_sorts() {
        let store = InMemoryStore::new();
        store.add_event(event(1, 48, None, true));
        store.add_event(event(2, 2, None, true));
        store.add_event(event(3, -2, None, true));
        store.add_event(event(4, 5, None, false));
        store.add_event(event(5, 1, Some("6-polideportivo"), true));

        let global = store.upcoming_events(Utc::now(), Scope::Global).await.unwrap();
        assert_eq!(global.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 1]);

        let scene = store
            .upcoming_events(Utc::now(), Scope::Scene("6-polideportivo"))
            .await
            .unwrap();
        assert_eq!(scene.iter().map(|e| e.id).collect::<Vec<_>>(), vec![5]);
    }

    #[tokio::test]
    async fn test_recent_turns_keeps_tail() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            let turn = Turn {
                content: format!("m{i}"),
                is_from_user: i % 2 == 0,
                timestamp: Utc::now(),
                intent: None,
            };
            store.append_turn(7, &turn).await.unwrap();
        }
        let recent = store.recent_turns(7, 3).await.unwrap();
        assert_eq!(
            recent.iter().map(|t| t.content.as_str()).collect::<Vec<_>>(),
            vec!["m2", "m3", "m4"]
        );
        assert!(store.recent_turns(8, 3).await.unwrap().is_empty());
        assert_eq!(store.message_count(7).await.unwrap(), 5);
        assert_eq!(store.message_count(8).await.unwrap(), 0);
    }
}
