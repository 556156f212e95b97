//! Load knowledge passages and events from a TOML seed file.
//!
//! Rows are upserted by their `key`. A passage is re-embedded only when its
//! content hash or the embedding model changed. Embedding failures are
//! non-fatal: the passage is stored without a vector and stays reachable
//! through keyword search.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

use campus_guide_core::embedding::{vec_to_blob, Embedder};
use campus_guide_core::graph::CampusGraph;

use crate::campus::load_graph;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;

#[derive(Debug, Deserialize, Default)]
pub struct SeedFile {
    #[serde(default)]
    pub passages: Vec<PassageSeed>,
    #[serde(default)]
    pub events: Vec<EventSeed>,
}

#[derive(Debug, Deserialize)]
pub struct PassageSeed {
    pub key: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventSeed {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub passages: u64,
    pub embedded: u64,
    pub unchanged: u64,
    pub embedding_failed: u64,
    pub events: u64,
}

pub fn parse_seed_file(path: &Path) -> Result<SeedFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse seed file: {}", path.display()))
}

pub async fn run_seed(config: &Config, path: &Path) -> Result<()> {
    let seed = parse_seed_file(path)?;
    let graph = load_graph(config)?;
    let embedder = if config.embedding.is_enabled() {
        Some(create_embedder(&config.embedding)?)
    } else {
        None
    };

    let pool = db::connect(config).await?;
    let report = seed_database(&pool, &seed, &graph, embedder.as_deref()).await?;
    pool.close().await;

    println!("seed {}", path.display());
    println!("  passages: {}", report.passages);
    println!("  embedded: {}", report.embedded);
    println!("  unchanged: {}", report.unchanged);
    println!("  embedding failed: {}", report.embedding_failed);
    println!("  events: {}", report.events);
    Ok(())
}

/// Upsert every passage and event, embedding passages whose content changed.
pub async fn seed_database(
    pool: &SqlitePool,
    seed: &SeedFile,
    graph: &CampusGraph,
    embedder: Option<&dyn Embedder>,
) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let now = Utc::now().timestamp();

    for passage in &seed.passages {
        if let Some(scene) = passage.scene.as_deref().filter(|s| !graph.contains(s)) {
            warn!(key = %passage.key, scene, "passage refers to an unknown scene");
        }

        let hash = hash_text(&passage.content);
        let existing = sqlx::query(
            "SELECT content_hash, embedding IS NOT NULL AS has_vector, embedding_model FROM knowledge WHERE key = ?",
        )
        .bind(&passage.key)
        .fetch_optional(pool)
        .await?;

        let up_to_date = existing.as_ref().is_some_and(|row| {
            let old_hash: String = row.get("content_hash");
            let has_vector: i64 = row.get("has_vector");
            let model: Option<String> = row.get("embedding_model");
            old_hash == hash
                && (embedder.is_none()
                    || (has_vector != 0 && model.as_deref() == embedder.map(|e| e.model_name())))
        });

        sqlx::query(
            r#"
            INSERT INTO knowledge (key, content, category, subcategory, scene, is_active,
                                   content_hash, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content = excluded.content,
                category = excluded.category,
                subcategory = excluded.subcategory,
                scene = excluded.scene,
                is_active = excluded.is_active,
                embedding = CASE WHEN knowledge.content_hash = excluded.content_hash
                                 THEN knowledge.embedding END,
                embedding_model = CASE WHEN knowledge.content_hash = excluded.content_hash
                                       THEN knowledge.embedding_model END,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&passage.key)
        .bind(&passage.content)
        .bind(&passage.category)
        .bind(&passage.subcategory)
        .bind(&passage.scene)
        .bind(passage.active)
        .bind(&hash)
        .bind(now)
        .execute(pool)
        .await?;
        report.passages += 1;

        if up_to_date {
            report.unchanged += 1;
            continue;
        }
        let Some(embedder) = embedder else {
            continue;
        };

        match embedder.embed(&passage.content).await {
            Ok(vector) => {
                sqlx::query(
                    "UPDATE knowledge SET embedding = ?, embedding_model = ? WHERE key = ?",
                )
                .bind(vec_to_blob(&vector))
                .bind(embedder.model_name())
                .bind(&passage.key)
                .execute(pool)
                .await?;
                report.embedded += 1;
            }
            Err(e) => {
                warn!(key = %passage.key, error = %e, "embedding failed; passage stored without a vector");
                sqlx::query(
                    "UPDATE knowledge SET embedding = NULL, embedding_model = NULL WHERE key = ?",
                )
                .bind(&passage.key)
                .execute(pool)
                .await?;
                report.embedding_failed += 1;
            }
        }
    }

    for event in &seed.events {
        if let Some(scene) = event.scene.as_deref().filter(|s| !graph.contains(s)) {
            warn!(key = %event.key, scene, "event refers to an unknown scene");
        }
        sqlx::query(
            r#"
            INSERT INTO events (key, title, description, location, starts_at, scene, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                starts_at = excluded.starts_at,
                scene = excluded.scene,
                is_active = excluded.is_active
            "#,
        )
        .bind(&event.key)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.starts_at.timestamp())
        .bind(&event.scene)
        .bind(event.active)
        .execute(pool)
        .await?;
        report.events += 1;
    }

    info!(
        passages = report.passages,
        embedded = report.embedded,
        events = report.events,
        "seed complete"
    );
    Ok(report)
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
