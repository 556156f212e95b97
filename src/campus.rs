//! Builds the shared, immutable engine pieces from configuration.

use anyhow::{Context, Result};
use std::sync::Arc;

use campus_guide_core::assistant::{Assistant, AssistantSettings};
use campus_guide_core::graph::{CampusGraph, GraphTable};
use campus_guide_core::intent::IntentClassifier;
use campus_guide_core::retrieval::HybridRetriever;
use tracing::info;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::sqlite_store::SqliteStore;

/// The campus graph: the built-in table, or the file named by `[graph] path`.
pub fn load_graph(config: &Config) -> Result<CampusGraph> {
    let Some(path) = &config.graph.path else {
        return Ok(CampusGraph::campus()?);
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph file: {}", path.display()))?;
    let table: GraphTable = toml::from_str(&content)
        .with_context(|| format!("Failed to parse graph file: {}", path.display()))?;
    let graph = CampusGraph::from_table(table)
        .with_context(|| format!("Invalid graph file: {}", path.display()))?;
    info!(nodes = graph.len(), path = %path.display(), "loaded campus graph");
    Ok(graph)
}

/// Wire the full pipeline over a SQLite store.
pub fn build_assistant(config: &Config, store: Arc<SqliteStore>) -> Result<Assistant> {
    let graph = Arc::new(load_graph(config)?);
    let classifier = Arc::new(IntentClassifier::campus()?);
    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;

    let retriever = HybridRetriever::new(
        embedder,
        store.clone(),
        store.clone(),
        config.retrieval.to_params(),
    );
    let settings = AssistantSettings {
        history_turns: config.assistant.history_turns,
        max_message_chars: config.assistant.max_message_chars,
        max_chars_per_passage: config.retrieval.max_chars_per_passage,
        max_conversation_messages: config.assistant.max_conversation_messages,
    };

    Ok(Assistant::new(
        graph, classifier, retriever, store, generator, settings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_with_graph(path: Option<std::path::PathBuf>) -> Config {
        let mut config = Config::minimal();
        config.graph.path = path;
        config
    }

    #[test]
    fn test_builtin_graph_by_default() {
        let graph = load_graph(&Config::minimal()).unwrap();
        assert!(graph.contains("0-entrada"));
        assert!(graph.contains("26-biblioteca"));
    }

    #[test]
    fn test_graph_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("graph.toml");
        fs::write(
            &path,
            r#"
[[nodes]]
key = "a-puerta"
name = "Puerta"
edges = [["b-aula", 2]]

[[nodes]]
key = "b-aula"
name = "Aula Magna"
edges = [["a-puerta", 2]]

[[aliases]]
alias = "aula magna"
key = "b-aula"
"#,
        )
        .unwrap();

        let graph = load_graph(&config_with_graph(Some(path))).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.resolve_name("vamos al aula magna"), Some("b-aula"));
        let plan = graph.get_navigation_info("a-puerta", "b-aula").unwrap();
        assert_eq!(plan.distance, 2);
    }

    #[test]
    fn test_graph_file_with_dangling_edge_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("graph.toml");
        fs::write(
            &path,
            "[[nodes]]\nkey = \"a\"\nname = \"A\"\nedges = [[\"missing\", 1]]\n",
        )
        .unwrap();

        let err = load_graph(&config_with_graph(Some(path))).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown location"));
    }
}
