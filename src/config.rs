//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! documented in `config/guide.example.toml`.

use anyhow::{Context, Result};
use campus_guide_core::retrieval::RetrievalParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

impl Config {
    /// Config for commands that never touch the database or a provider.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/guide.sqlite"),
            },
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            assistant: AssistantConfig::default(),
            graph: GraphConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_lexical_distance")]
    pub lexical_distance: f64,
    /// Weight of vector closeness in the rerank; keywords get the rest.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default)]
    pub distance_threshold: Option<f64>,
    #[serde(default = "default_max_chars_per_passage")]
    pub max_chars_per_passage: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            lexical_distance: default_lexical_distance(),
            vector_weight: default_vector_weight(),
            distance_threshold: None,
            max_chars_per_passage: default_max_chars_per_passage(),
        }
    }
}

impl RetrievalConfig {
    pub fn to_params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.top_k,
            lexical_distance: self.lexical_distance,
            vector_weight: self.vector_weight,
            distance_threshold: self.distance_threshold,
            max_chars_per_passage: self.max_chars_per_passage,
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_lexical_distance() -> f64 {
    0.5
}
fn default_vector_weight() -> f64 {
    0.7
}
fn default_max_chars_per_passage() -> usize {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, or an OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_generation_model(),
            url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    300
}
fn default_temperature() -> f32 {
    0.7
}
fn default_generation_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    /// Stored messages, both sides counted, after which a conversation is closed.
    #[serde(default = "default_max_conversation_messages")]
    pub max_conversation_messages: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
            max_message_chars: default_max_message_chars(),
            max_conversation_messages: default_max_conversation_messages(),
        }
    }
}

fn default_history_turns() -> usize {
    3
}
fn default_max_message_chars() -> usize {
    500
}
fn default_max_conversation_messages() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GraphConfig {
    /// TOML file replacing the built-in campus graph.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let retrieval = &config.retrieval;
    if retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&retrieval.lexical_distance) {
        anyhow::bail!("retrieval.lexical_distance must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&retrieval.vector_weight) {
        anyhow::bail!("retrieval.vector_weight must be in [0.0, 1.0]");
    }
    if let Some(t) = retrieval.distance_threshold {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!("retrieval.distance_threshold must be in [0.0, 2.0]");
        }
    }
    if retrieval.max_chars_per_passage == 0 {
        anyhow::bail!("retrieval.max_chars_per_passage must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.generation.max_tokens == 0 {
        anyhow::bail!("generation.max_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }

    if config.assistant.max_message_chars < 2 {
        anyhow::bail!("assistant.max_message_chars must be >= 2");
    }
    if config.assistant.max_conversation_messages == 0 {
        anyhow::bail!("assistant.max_conversation_messages must be > 0");
    }

    Ok(())
}
