//! `guide ask`: run one message through the full pipeline.

use anyhow::{bail, Result};
use std::sync::Arc;

use campus_guide_core::assistant::{ChatReply, ChatRequest};

use crate::campus::build_assistant;
use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn run_ask(
    config: &Config,
    message: &str,
    scene: Option<String>,
    conversation_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let assistant = build_assistant(config, store.clone())?;

    if let Some(key) = scene.as_deref() {
        if !assistant.graph().contains(key) {
            bail!("unknown scene: {}", key);
        }
    }

    let request = ChatRequest {
        message: message.to_string(),
        scene,
        conversation_id,
    };
    let reply = assistant.respond(&request).await?;

    if let (Some(id), Some(title)) = (conversation_id, reply.title.as_deref()) {
        store.set_conversation_title(id, title).await?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print_reply(&reply);
    }

    store.pool().close().await;
    Ok(())
}

fn print_reply(reply: &ChatReply) {
    println!("{}", reply.reply);
    println!();
    println!(
        "intent: {} ({:.2}){}",
        reply.intent.category,
        reply.intent.confidence,
        if reply.clarification {
            ", needs clarification"
        } else {
            ""
        }
    );
    if !reply.intent.keywords_found.is_empty() {
        println!("keywords: {}", reply.intent.keywords_found.join(", "));
    }
    if let Some(plan) = &reply.navigation {
        println!(
            "route: {} ({} steps, distance {})",
            plan.path.join(" -> "),
            plan.steps,
            plan.distance
        );
    }
    if reply.tokens_used > 0 {
        println!("tokens: {}", reply.tokens_used);
    }
    for warning in &reply.warnings {
        println!("warning: {}", warning);
    }
}
