//! The SQLite store, the seeder and the assistant wired together, with a
//! deterministic embedder and a recording generator in place of HTTP
//! providers.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use campus_guide::seed::{seed_database, EventSeed, PassageSeed, SeedFile};
use campus_guide::sqlite_store::SqliteStore;
use campus_guide::{db, migrate};
use campus_guide_core::assistant::{
    Assistant, AssistantError, AssistantSettings, ChatRequest, Generation, GenerationError,
    Generator,
};
use campus_guide_core::embedding::{blob_to_vec, Embedder};
use campus_guide_core::graph::CampusGraph;
use campus_guide_core::intent::{IntentCategory, IntentClassifier};
use campus_guide_core::retrieval::{HybridRetriever, RetrievalParams};
use campus_guide_core::store::{
    ConversationHistory, EventStore, PassageStore, Scope, Turn,
};

/// One dimension per topic word, plus a constant so no vector is zero.
struct TopicEmbedder;

#[async_trait]
impl Embedder for TopicEmbedder {
    fn model_name(&self) -> &str {
        "topic-test"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        let has = |w: &str| if text.contains(w) { 1.0 } else { 0.0 };
        Ok(vec![has("biblioteca"), has("comedor"), 0.1])
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("provider unreachable")
    }
}

#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(
        &self,
        system_context: &str,
        history: &[Turn],
        _user_text: &str,
    ) -> Result<Generation, GenerationError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_context.to_string(), history.len()));
        Ok(Generation {
            text: "Claro, te explico.".to_string(),
            tokens_used: 42,
        })
    }
}

async fn fresh_pool() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = db::open(&tmp.path().join("data").join("guide.sqlite"))
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    (tmp, pool)
}

fn passage(key: &str, content: &str, scene: Option<&str>) -> PassageSeed {
    PassageSeed {
        key: key.to_string(),
        content: content.to_string(),
        category: "servicios".to_string(),
        subcategory: None,
        scene: scene.map(str::to_string),
        active: true,
    }
}

fn event(key: &str, title: &str, days_from_now: i64, active: bool) -> EventSeed {
    EventSeed {
        key: key.to_string(),
        title: title.to_string(),
        description: Some(format!("{} para toda la comunidad", title)),
        location: Some("Patio Central".to_string()),
        starts_at: Utc::now() + Duration::days(days_from_now),
        scene: None,
        active,
    }
}

fn campus_seed() -> SeedFile {
    SeedFile {
        passages: vec![
            passage(
                "biblioteca-horario",
                "La biblioteca abre de lunes a sábado de 8:00 a 20:00.",
                None,
            ),
            passage("comedor-menu", "El comedor sirve almuerzo desde las 12:00.", None),
            passage(
                "poli-cancha",
                "El polideportivo tiene cancha de fútbol y vóley.",
                Some("6-polideportivo"),
            ),
        ],
        events: vec![
            event("feria", "Feria de ciencias", 3, true),
            event("charla", "Charla de admisión", -2, true),
            event("taller", "Taller de robótica", 5, false),
        ],
    }
}

async fn usage_count(pool: &SqlitePool, key: &str) -> i64 {
    sqlx::query_scalar("SELECT usage_count FROM knowledge WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_seed_embeds_once_and_reembeds_on_change() {
    let (_tmp, pool) = fresh_pool().await;
    let graph = CampusGraph::campus().unwrap();
    let mut seed = campus_seed();

    let first = seed_database(&pool, &seed, &graph, Some(&TopicEmbedder))
        .await
        .unwrap();
    assert_eq!(first.passages, 3);
    assert_eq!(first.embedded, 3);
    assert_eq!(first.unchanged, 0);
    assert_eq!(first.events, 3);

    let second = seed_database(&pool, &seed, &graph, Some(&TopicEmbedder))
        .await
        .unwrap();
    assert_eq!(second.embedded, 0);
    assert_eq!(second.unchanged, 3);

    seed.passages[1].content = "El comedor sirve desayuno desde las 7:00.".to_string();
    let third = seed_database(&pool, &seed, &graph, Some(&TopicEmbedder))
        .await
        .unwrap();
    assert_eq!(third.embedded, 1);
    assert_eq!(third.unchanged, 2);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 3);
}

async fn stored_vector(pool: &SqlitePool, key: &str) -> Option<Vec<f32>> {
    let blob: Option<Vec<u8>> = sqlx::query_scalar("SELECT embedding FROM knowledge WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await
        .unwrap();
    blob.map(|b| blob_to_vec(&b))
}

#[tokio::test]
async fn test_content_change_without_embedder_drops_stale_vector() {
    let (_tmp, pool) = fresh_pool().await;
    let graph = CampusGraph::campus().unwrap();
    let mut seed = campus_seed();
    seed_database(&pool, &seed, &graph, Some(&TopicEmbedder))
        .await
        .unwrap();
    assert_eq!(
        stored_vector(&pool, "biblioteca-horario").await,
        Some(vec![1.0, 0.0, 0.1])
    );

    seed.passages[0].content = "La sala de lectura abre a las 9:00.".to_string();
    let offline = seed_database(&pool, &seed, &graph, None).await.unwrap();
    assert_eq!(offline.embedded, 0);
    assert_eq!(stored_vector(&pool, "biblioteca-horario").await, None);
    assert_eq!(
        stored_vector(&pool, "comedor-menu").await,
        Some(vec![0.0, 1.0, 0.1])
    );

    let online = seed_database(&pool, &seed, &graph, Some(&TopicEmbedder))
        .await
        .unwrap();
    assert_eq!(online.embedded, 1);
    assert_eq!(online.unchanged, 2);
    assert_eq!(
        stored_vector(&pool, "biblioteca-horario").await,
        Some(vec![0.0, 0.0, 0.1])
    );
}

#[tokio::test]
async fn test_keyword_match_folds_accents_and_case() {
    let (_tmp, pool) = fresh_pool().await;
    let graph = CampusGraph::campus().unwrap();
    let mut seed = campus_seed();
    seed.passages
        .push(passage("tecnologia", "El área de tecnología abre temprano.", None));
    seed_database(&pool, &seed, &graph, None).await.unwrap();
    let store = SqliteStore::new(pool);

    for needle in ["ÁREA DE TECNOLOGÍA", "area de tecnologia", "Área"] {
        let hits = store
            .passages_containing(needle, 5, Scope::Any)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1, "{needle}");
        assert!(hits[0].content.starts_with("El área"));
    }
    let capped = store
        .passages_containing("el", 1, Scope::Any)
        .await
        .unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn test_seed_keeps_passage_when_embedding_fails() {
    let (_tmp, pool) = fresh_pool().await;
    let graph = CampusGraph::campus().unwrap();
    let report = seed_database(&pool, &campus_seed(), &graph, Some(&FailingEmbedder))
        .await
        .unwrap();
    assert_eq!(report.passages, 3);
    assert_eq!(report.embedding_failed, 3);

    let store = SqliteStore::new(pool);
    let passages = store.eligible_passages(Scope::Any).await.unwrap();
    assert_eq!(passages.len(), 3);
    assert!(passages.iter().all(|p| p.embedding.is_none()));

    let hits = store
        .passages_containing("BIBLIOTECA", 5, Scope::Any)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.starts_with("La biblioteca"));
}

#[tokio::test]
async fn test_store_scopes_and_inactive_rows() {
    let (_tmp, pool) = fresh_pool().await;
    let graph = CampusGraph::campus().unwrap();
    let mut seed = campus_seed();
    seed.passages.push(PassageSeed {
        active: false,
        ..passage("viejo", "La biblioteca antigua cerró.", None)
    });
    seed_database(&pool, &seed, &graph, None).await.unwrap();
    let store = SqliteStore::new(pool);

    let global = store.eligible_passages(Scope::Global).await.unwrap();
    assert_eq!(global.len(), 2);
    let scene = store
        .eligible_passages(Scope::Scene("6-polideportivo"))
        .await
        .unwrap();
    assert_eq!(scene.len(), 1);
    assert_eq!(scene[0].scene.as_deref(), Some("6-polideportivo"));
    assert_eq!(store.eligible_passages(Scope::Any).await.unwrap().len(), 3);

    let hits = store
        .passages_containing("biblioteca", 5, Scope::Any)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let events = store.upcoming_events(Utc::now(), Scope::Any).await.unwrap();
    let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Feria de ciencias"]);
}

#[tokio::test]
async fn test_usage_counter_increments_once_per_id() {
    let (_tmp, pool) = fresh_pool().await;
    let graph = CampusGraph::campus().unwrap();
    seed_database(&pool, &campus_seed(), &graph, None).await.unwrap();
    let store = SqliteStore::new(pool.clone());

    let ids: Vec<i64> = store
        .eligible_passages(Scope::Global)
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    store.increment_usage(&ids).await.unwrap();
    store.increment_usage(&ids[..1]).await.unwrap();

    assert_eq!(usage_count(&pool, "biblioteca-horario").await, 2);
    assert_eq!(usage_count(&pool, "comedor-menu").await, 1);
    assert_eq!(usage_count(&pool, "poli-cancha").await, 0);
}

#[tokio::test]
async fn test_history_order_limit_and_title() {
    let (_tmp, pool) = fresh_pool().await;
    let store = SqliteStore::new(pool);

    for i in 0..5 {
        let turn = Turn {
            content: format!("mensaje {}", i),
            is_from_user: i % 2 == 0,
            timestamp: Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap(),
            intent: None,
        };
        store.append_turn(7, &turn).await.unwrap();
    }

    let turns = store.recent_turns(7, 3).await.unwrap();
    let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["mensaje 2", "mensaje 3", "mensaje 4"]);
    assert!(turns[0].is_from_user);
    assert!(store.recent_turns(8, 3).await.unwrap().is_empty());
    assert_eq!(store.message_count(7).await.unwrap(), 5);
    assert_eq!(store.message_count(8).await.unwrap(), 0);

    assert_eq!(store.conversation_title(7).await.unwrap(), None);
    store.set_conversation_title(7, "Primer título...").await.unwrap();
    store.set_conversation_title(7, "Otro título...").await.unwrap();
    assert_eq!(
        store.conversation_title(7).await.unwrap().as_deref(),
        Some("Primer título...")
    );
}

#[tokio::test]
async fn test_full_pipeline_over_sqlite() {
    let (_tmp, pool) = fresh_pool().await;
    let graph = CampusGraph::campus().unwrap();
    seed_database(&pool, &campus_seed(), &graph, Some(&TopicEmbedder))
        .await
        .unwrap();

    let store = Arc::new(SqliteStore::new(pool.clone()));
    let generator = Arc::new(RecordingGenerator::default());
    let retriever = HybridRetriever::new(
        Arc::new(TopicEmbedder),
        store.clone(),
        store.clone(),
        RetrievalParams {
            top_k: 1,
            ..RetrievalParams::default()
        },
    );
    let assistant = Assistant::new(
        Arc::new(graph),
        Arc::new(IntentClassifier::campus().unwrap()),
        retriever,
        store.clone(),
        generator.clone(),
        AssistantSettings::default(),
    );

    let reply = assistant
        .respond(&ChatRequest {
            message: "¿cómo llego a la biblioteca?".to_string(),
            scene: Some("0-entrada".to_string()),
            conversation_id: Some(1),
        })
        .await
        .unwrap();

    assert_eq!(reply.intent.category, IntentCategory::Navigation);
    assert!(reply.context_used);
    assert!(reply.warnings.is_empty(), "{:?}", reply.warnings);
    assert_eq!(reply.tokens_used, 42);
    assert_eq!(reply.title.as_deref(), Some("¿cómo llego a la..."));

    let plan = reply.navigation.as_ref().unwrap();
    assert_eq!(plan.to, "26-biblioteca");
    assert_eq!(plan.steps, 3);
    assert!(reply.reply.starts_with("Claro, te explico.\n\n"));
    assert!(reply.reply.contains("3 pasos"));

    let prompts = generator.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    let (system, history_len) = &prompts[0];
    assert_eq!(*history_len, 0);
    assert!(system.contains("El usuario está en Entrada."));
    assert!(system.contains("La biblioteca abre de lunes a sábado"));
    assert!(!system.contains("comedor"));
    assert!(!system.contains("polideportivo"));

    assert_eq!(usage_count(&pool, "biblioteca-horario").await, 1);
    assert_eq!(usage_count(&pool, "comedor-menu").await, 0);

    let turns = store.recent_turns(1, 10).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert!(turns[0].is_from_user);
    assert_eq!(turns[1].content, reply.reply);
    let stored = turns[0].intent.as_ref().unwrap();
    assert_eq!(stored.category, IntentCategory::Navigation);
    assert_eq!(stored.confidence, reply.intent.confidence);
    assert_eq!(stored.keywords, reply.intent.keywords_found);
    assert!(!stored.requires_clarification);
    assert!(turns[1].intent.is_none());

    // A second message sees the first exchange as history and gets no title.
    let follow_up = assistant
        .respond(&ChatRequest {
            message: "¿y el comedor?".to_string(),
            scene: None,
            conversation_id: Some(1),
        })
        .await
        .unwrap();
    assert_eq!(follow_up.title, None);
    assert_eq!(generator.prompts.lock().unwrap()[1].1, 2);
}

#[tokio::test]
async fn test_conversation_limit_over_sqlite() {
    let (_tmp, pool) = fresh_pool().await;
    let graph = CampusGraph::campus().unwrap();
    seed_database(&pool, &campus_seed(), &graph, None).await.unwrap();

    let store = Arc::new(SqliteStore::new(pool));
    let generator = Arc::new(RecordingGenerator::default());
    let retriever = HybridRetriever::new(
        Arc::new(TopicEmbedder),
        store.clone(),
        store.clone(),
        RetrievalParams::default(),
    );
    let assistant = Assistant::new(
        Arc::new(graph),
        Arc::new(IntentClassifier::campus().unwrap()),
        retriever,
        store.clone(),
        generator.clone(),
        AssistantSettings {
            max_conversation_messages: 4,
            ..AssistantSettings::default()
        },
    );
    let ask = |conversation_id| ChatRequest {
        message: "requisitos de admisión".to_string(),
        scene: None,
        conversation_id: Some(conversation_id),
    };

    assistant.respond(&ask(2)).await.unwrap();
    assistant.respond(&ask(2)).await.unwrap();
    assert_eq!(store.message_count(2).await.unwrap(), 4);

    let err = assistant.respond(&ask(2)).await.unwrap_err();
    assert!(matches!(err, AssistantError::ConversationLimit { max: 4 }));
    assert_eq!(store.message_count(2).await.unwrap(), 4);
    assert_eq!(generator.prompts.lock().unwrap().len(), 2);

    // Other conversations are unaffected.
    assistant.respond(&ask(3)).await.unwrap();
}
