//! `guide route`, `guide resolve` and `guide intent`: inspect the graph and
//! the classifier without touching the database.

use anyhow::{bail, Result};

use campus_guide_core::graph::CampusGraph;
use campus_guide_core::intent::{get_clarification_message, IntentClassifier};

use crate::campus::load_graph;
use crate::config::Config;

/// A node key as given, or the location the text resolves to.
pub fn locate<'g>(graph: &'g CampusGraph, text: &str) -> Option<&'g str> {
    if let Some(node) = graph.node(text) {
        return Some(node.key.as_str());
    }
    graph.resolve_name(text)
}

pub fn run_route(config: &Config, from: &str, to: &str) -> Result<()> {
    let graph = load_graph(config)?;
    let Some(from_key) = locate(&graph, from) else {
        bail!("unknown location: {}", from);
    };
    let Some(to_key) = locate(&graph, to) else {
        bail!("unknown location: {}", to);
    };

    let Some(plan) = graph.get_navigation_info(from_key, to_key) else {
        bail!("no route from {} to {}", from_key, to_key);
    };

    if plan.already_here {
        println!("Already at {} ({}).", plan.to_name, plan.to);
        return Ok(());
    }

    println!("{} -> {}", plan.from_name, plan.to_name);
    for (i, key) in plan.path.iter().enumerate() {
        println!("  {}. {} ({})", i, graph.display_name(key).unwrap_or(key), key);
    }
    println!("steps: {}", plan.steps);
    println!("distance: {}", plan.distance);
    Ok(())
}

pub fn run_resolve(config: &Config, text: &str) -> Result<()> {
    let graph = load_graph(config)?;
    match graph.resolve_name(text) {
        Some(key) => println!("{} ({})", key, graph.display_name(key).unwrap_or(key)),
        None => println!("No location recognised."),
    }
    Ok(())
}

pub fn run_intent(message: &str) -> Result<()> {
    let classifier = IntentClassifier::campus()?;
    let result = classifier.detect_intent(message);

    println!("category: {}", result.category);
    println!("confidence: {:.2}", result.confidence);
    if !result.keywords_found.is_empty() {
        println!("keywords: {}", result.keywords_found.join(", "));
    }
    for (category, score) in &result.all_matches {
        println!("  {}: {}", category, score);
    }
    if result.requires_clarification {
        println!();
        println!("{}", get_clarification_message(&result.all_matches));
    }
    Ok(())
}
