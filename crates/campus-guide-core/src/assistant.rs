//! Message pipeline: validate, classify, clarify or retrieve, generate,
//! then enrich navigation replies with a route.
//!
//! ```text
//! START ─► classify ─┬─ ambiguous ─► clarification reply ─────────────► DONE
//!                    └─ proceed ───► retrieve + history ─► generate ─┬─► DONE
//!                                                                    └─► route appended ─► DONE
//! ```
//!
//! Retrieval and history failures never fail a request; they surface as
//! [`RetrievalWarning`]s on the reply. Generation rate limits and timeouts
//! are returned as distinct [`AssistantError`] variants.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::graph::{CampusGraph, NavigationPlan};
use crate::intent::{get_clarification_message, IntentClassifier, IntentResult};
use crate::retrieval::{format_events, format_passages, HybridRetriever, RetrievalWarning};
use crate::store::{ConversationHistory, Turn, TurnIntent};

/// Prior turns handed to generation.
pub const DEFAULT_HISTORY_TURNS: usize = 3;

/// Longest accepted message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Stored messages (user and assistant) after which a conversation is closed.
pub const DEFAULT_MAX_CONVERSATION_MESSAGES: usize = 5;

/// Shortest accepted message, in characters.
pub const MIN_MESSAGE_CHARS: usize = 2;

/// Fewer distinct characters than this reads as keyboard mashing.
pub const MIN_DISTINCT_CHARS: usize = 3;

const PERSONA: &str = "Eres un asistente virtual de Tecsup, una institución de educación técnica en Perú.\n\
Tu objetivo es ayudar a los usuarios con información sobre:\n\
- Carreras técnicas\n\
- Admisión y requisitos\n\
- Instalaciones\n\
- Vida estudiantil\n\
- Horarios y calendario académico\n\
- Becas y financiamiento\n\n\
Responde siempre en español de manera amigable y concisa.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message is empty")]
    Empty,
    #[error("message must be at least {min} characters")]
    TooShort { min: usize },
    #[error("message has {len} characters, the limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("message looks like spam")]
    LowEntropy,
}

/// Trim `message` and check it against the length and spam rules.
pub fn validate_message(message: &str, max_chars: usize) -> Result<&str, MessageError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(MessageError::Empty);
    }
    let len = trimmed.chars().count();
    if len < MIN_MESSAGE_CHARS {
        return Err(MessageError::TooShort {
            min: MIN_MESSAGE_CHARS,
        });
    }
    if len > max_chars {
        return Err(MessageError::TooLong { len, max: max_chars });
    }
    let distinct: BTreeSet<char> = trimmed.chars().collect();
    if distinct.len() < MIN_DISTINCT_CHARS {
        return Err(MessageError::LowEntropy);
    }
    Ok(trimmed)
}

/// Text produced by the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tokens_used: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("generation service is rate limiting requests")]
    RateLimited,
    #[error("generation service timed out")]
    Timeout,
    #[error("generation failed: {0}")]
    Failed(String),
}

/// External text-generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        system_context: &str,
        history: &[Turn],
        user_text: &str,
    ) -> Result<Generation, GenerationError>;
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] MessageError),
    #[error("conversation reached the limit of {max} messages, start a new one")]
    ConversationLimit { max: usize },
    #[error("too many requests, try again later")]
    RateLimited,
    #[error("the assistant took too long to answer")]
    Timeout,
    #[error("could not generate a reply: {0}")]
    Generation(String),
}

impl From<GenerationError> for AssistantError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::RateLimited => AssistantError::RateLimited,
            GenerationError::Timeout => AssistantError::Timeout,
            GenerationError::Failed(msg) => AssistantError::Generation(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub history_turns: usize,
    pub max_message_chars: usize,
    pub max_chars_per_passage: usize,
    pub max_conversation_messages: usize,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            history_turns: DEFAULT_HISTORY_TURNS,
            max_message_chars: MAX_MESSAGE_CHARS,
            max_chars_per_passage: crate::retrieval::MAX_CHARS_PER_PASSAGE,
            max_conversation_messages: DEFAULT_MAX_CONVERSATION_MESSAGES,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub message: String,
    /// Scene the user is currently looking at.
    pub scene: Option<String>,
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub tokens_used: u32,
    pub intent: IntentResult,
    pub navigation: Option<NavigationPlan>,
    /// The reply is a clarification question; nothing was generated.
    pub clarification: bool,
    /// Retrieved knowledge or events went into the prompt.
    pub context_used: bool,
    /// Fallback title for a conversation's first message.
    pub title: Option<String>,
    pub warnings: Vec<RetrievalWarning>,
}

/// The first four words of a message followed by `...`.
pub fn fallback_title(message: &str) -> String {
    let words: Vec<&str> = message.split_whitespace().take(4).collect();
    format!("{}...", words.join(" "))
}

/// Persona, then the user's location, then retrieved knowledge and events.
pub fn build_system_prompt(
    scene_name: Option<&str>,
    knowledge: Option<&str>,
    events: Option<&str>,
) -> String {
    let mut prompt = PERSONA.to_string();
    if let Some(name) = scene_name {
        prompt.push_str(&format!("\n\nContexto adicional: El usuario está en {}.", name));
    }
    if let Some(block) = knowledge {
        prompt.push_str(&format!("\n\nInformación relacionada:\n{}", block));
    }
    if let Some(block) = events {
        prompt.push_str(&format!("\n\nPróximos eventos:\n{}", block));
    }
    prompt
}

/// One-paragraph route description appended to navigation replies.
pub fn route_summary(graph: &CampusGraph, plan: &NavigationPlan) -> String {
    if plan.already_here {
        return format!("Ya te encuentras en {}.", plan.to_name);
    }
    let stops: Vec<&str> = plan
        .path
        .iter()
        .map(|key| graph.display_name(key).unwrap_or(key))
        .collect();
    let unit = if plan.steps == 1 { "paso" } else { "pasos" };
    format!(
        "Ruta desde {} hasta {}: {} ({} {}).",
        plan.from_name,
        plan.to_name,
        stops.join(" → "),
        plan.steps,
        unit
    )
}

/// Sequences the classifier, retriever, graph and generator for one message.
pub struct Assistant {
    graph: Arc<CampusGraph>,
    classifier: Arc<IntentClassifier>,
    retriever: HybridRetriever,
    history: Arc<dyn ConversationHistory>,
    generator: Arc<dyn Generator>,
    settings: AssistantSettings,
}

impl Assistant {
    pub fn new(
        graph: Arc<CampusGraph>,
        classifier: Arc<IntentClassifier>,
        retriever: HybridRetriever,
        history: Arc<dyn ConversationHistory>,
        generator: Arc<dyn Generator>,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            graph,
            classifier,
            retriever,
            history,
            generator,
            settings,
        }
    }

    pub fn graph(&self) -> &CampusGraph {
        &self.graph
    }

    #[instrument(skip(self, request), fields(scene = ?request.scene, conversation = ?request.conversation_id))]
    pub async fn respond(&self, request: &ChatRequest) -> Result<ChatReply, AssistantError> {
        let message = validate_message(&request.message, self.settings.max_message_chars)?;
        let scene = request.scene.as_deref();
        let mut warnings = Vec::new();

        if let Some(id) = request.conversation_id {
            self.check_conversation_limit(id, &mut warnings).await?;
        }

        let intent = self.classifier.detect_intent(message);
        info!(
            category = %intent.category,
            confidence = intent.confidence,
            clarification = intent.requires_clarification,
            "classified message"
        );

        let history = self
            .recent_history(request.conversation_id, &mut warnings)
            .await;
        let title = (request.conversation_id.is_some() && history.is_empty())
            .then(|| fallback_title(message));

        if intent.requires_clarification {
            let reply = get_clarification_message(&intent.all_matches);
            self.record(request.conversation_id, message, &intent, &reply, &mut warnings)
                .await;
            return Ok(ChatReply {
                reply,
                tokens_used: 0,
                intent,
                navigation: None,
                clarification: true,
                context_used: false,
                title,
                warnings,
            });
        }

        let top_k = self.retriever.params().top_k;
        let passages = self.retriever.retrieve(message, top_k, scene).await;
        let events = self.retriever.search_events(message, scene).await;
        warnings.extend(passages.warnings);
        warnings.extend(events.warnings);

        let knowledge = format_passages(&passages.value, self.settings.max_chars_per_passage);
        let upcoming = format_events(&events.value);
        let context_used = knowledge.is_some() || upcoming.is_some();
        debug!(
            passages = passages.value.len(),
            events = events.value.len(),
            "assembled context"
        );

        let scene_name = scene.map(|key| self.graph.display_name(key).unwrap_or(key));
        let system = build_system_prompt(scene_name, knowledge.as_deref(), upcoming.as_deref());

        let generation = match self.generator.generate(&system, &history, message).await {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "generation failed");
                return Err(e.into());
            }
        };
        let mut reply = generation.text.trim().to_string();

        let navigation = if intent.mentions_navigation() {
            self.plan_route(message, scene)
        } else {
            None
        };
        if let Some(plan) = &navigation {
            reply.push_str("\n\n");
            reply.push_str(&route_summary(&self.graph, plan));
        }

        self.record(request.conversation_id, message, &intent, &reply, &mut warnings)
            .await;

        if !warnings.is_empty() {
            info!(count = warnings.len(), "reply produced with degraded context");
        }

        Ok(ChatReply {
            reply,
            tokens_used: generation.tokens_used,
            intent,
            navigation,
            clarification: false,
            context_used,
            title,
            warnings,
        })
    }

    /// Route from the user's scene to the place the message names, if both are known.
    fn plan_route(&self, message: &str, scene: Option<&str>) -> Option<NavigationPlan> {
        let Some(from) = scene else {
            debug!("navigation intent without a current scene");
            return None;
        };
        let Some(to) = self.graph.resolve_name(message) else {
            debug!("no destination recognised in message");
            return None;
        };
        let plan = self.graph.get_navigation_info(from, to);
        if plan.is_none() {
            debug!(from, to, "no route between scenes");
        }
        plan
    }

    async fn check_conversation_limit(
        &self,
        conversation_id: i64,
        warnings: &mut Vec<RetrievalWarning>,
    ) -> Result<(), AssistantError> {
        let max = self.settings.max_conversation_messages;
        match self.history.message_count(conversation_id).await {
            Ok(count) if count >= max => {
                info!(conversation = conversation_id, count, max, "conversation limit reached");
                Err(AssistantError::ConversationLimit { max })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, conversation = conversation_id, "could not count messages");
                warnings.push(RetrievalWarning::HistoryUnavailable(e.to_string()));
                Ok(())
            }
        }
    }

    async fn recent_history(
        &self,
        conversation_id: Option<i64>,
        warnings: &mut Vec<RetrievalWarning>,
    ) -> Vec<Turn> {
        let Some(id) = conversation_id else {
            return Vec::new();
        };
        match self
            .history
            .recent_turns(id, self.settings.history_turns)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                warn!(error = %e, conversation = id, "could not load history");
                warnings.push(RetrievalWarning::HistoryUnavailable(e.to_string()));
                Vec::new()
            }
        }
    }

    async fn record(
        &self,
        conversation_id: Option<i64>,
        message: &str,
        intent: &IntentResult,
        reply: &str,
        warnings: &mut Vec<RetrievalWarning>,
    ) {
        let Some(id) = conversation_id else {
            return;
        };
        let turns = [
            (message, true, Some(TurnIntent::from(intent))),
            (reply, false, None),
        ];
        for (content, is_from_user, intent) in turns {
            let turn = Turn {
                content: content.to_string(),
                is_from_user,
                timestamp: Utc::now(),
                intent,
            };
            if let Err(e) = self.history.append_turn(id, &turn).await {
                warn!(error = %e, conversation = id, "could not record turn");
                warnings.push(RetrievalWarning::HistoryUnavailable(e.to_string()));
                return;
            }
        }
    }
}
