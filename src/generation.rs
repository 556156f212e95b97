//! OpenAI-compatible chat generation implementing the core [`Generator`].
//!
//! Unlike embedding calls there is no retry: a rate limit or timeout is
//! reported to the caller as [`GenerationError::RateLimited`] or
//! [`GenerationError::Timeout`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use campus_guide_core::assistant::{Generation, GenerationError, Generator};
use campus_guide_core::store::Turn;

use crate::config::GenerationConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Build the generator named by `generation.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(
        &self,
        _system_context: &str,
        _history: &[Turn],
        _user_text: &str,
    ) -> Result<Generation, GenerationError> {
        Err(GenerationError::Failed(
            "generation provider is disabled; set [generation] provider in config".to_string(),
        ))
    }
}

pub struct OpenAIGenerator {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    async fn generate(
        &self,
        system_context: &str,
        history: &[Turn],
        user_text: &str,
    ) -> Result<Generation, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": build_messages(system_context, history, user_text),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }

        let json: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::Failed(e.to_string())
            }
        })?;
        let generation = parse_chat_response(&json)?;
        debug!(tokens = generation.tokens_used, "generation complete");
        Ok(generation)
    }
}

/// Chat messages: system, then prior turns, then the user's text.
/// Turns with empty content are skipped.
pub fn build_messages(system_context: &str, history: &[Turn], user_text: &str) -> Vec<Value> {
    let mut messages = vec![json!({ "role": "system", "content": system_context })];
    for turn in history.iter().filter(|t| !t.content.trim().is_empty()) {
        let role = if turn.is_from_user { "user" } else { "assistant" };
        messages.push(json!({ "role": role, "content": turn.content }));
    }
    messages.push(json!({ "role": "user", "content": user_text }));
    messages
}

/// Map a non-success HTTP status onto a generation failure kind.
pub fn classify_status(status: u16, body: &str) -> GenerationError {
    match status {
        429 => GenerationError::RateLimited,
        408 | 504 => GenerationError::Timeout,
        _ => GenerationError::Failed(format!("HTTP {}: {}", status, body)),
    }
}

/// Reply text and total token count from a chat completion body.
pub fn parse_chat_response(json: &Value) -> Result<Generation, GenerationError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| GenerationError::Failed("response has no message content".to_string()))?;
    let tokens_used = json
        .pointer("/usage/total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    Ok(Generation {
        text: text.trim().to_string(),
        tokens_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(content: &str, is_from_user: bool) -> Turn {
        Turn {
            content: content.to_string(),
            is_from_user,
            timestamp: Utc::now(),
            intent: None,
        }
    }

    #[test]
    fn test_build_messages_roles_and_order() {
        let history = vec![turn("hola", true), turn("", false), turn("¡Hola!", false)];
        let messages = build_messages("sistema", &history, "¿dónde está el comedor?");
        let roles: Vec<&str> = messages
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[3]["content"], "¿dónde está el comedor?");
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(429, ""), GenerationError::RateLimited);
        assert_eq!(classify_status(504, ""), GenerationError::Timeout);
        assert_eq!(
            classify_status(500, "boom"),
            GenerationError::Failed("HTTP 500: boom".to_string())
        );
    }

    #[test]
    fn test_parse_chat_response() {
        let body = json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "  La biblioteca abre a las 8.  " } }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 12, "total_tokens": 132 }
        });
        let g = parse_chat_response(&body).unwrap();
        assert_eq!(g.text, "La biblioteca abre a las 8.");
        assert_eq!(g.tokens_used, 132);
        assert!(parse_chat_response(&json!({ "choices": [] })).is_err());
    }

    #[tokio::test]
    async fn test_disabled_generator_fails() {
        let generator = create_generator(&GenerationConfig::default()).unwrap();
        let err = generator.generate("s", &[], "hola").await.unwrap_err();
        assert!(matches!(err, GenerationError::Failed(_)));
    }
}
