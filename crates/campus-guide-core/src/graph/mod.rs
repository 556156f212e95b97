//! Campus location graph: shortest paths and free-text location resolution.
//!
//! The graph is immutable once built. Build it once at startup, from the
//! built-in table ([`CampusGraph::campus`]) or a deserialized
//! [`GraphTable`], and share it behind an `Arc`.
//!
//! # Name resolution
//!
//! 1. Substring pass: the first alias (in table order) contained in the
//!    folded message wins.
//! 2. Fuzzy pass: every word of at least [`MIN_FUZZY_WORD_LEN`] characters is
//!    scored against every alias with a normalized Levenshtein ratio (0–100),
//!    scaled by `min(len) / max(len)` of the pair. The best pair is accepted
//!    if its adjusted score reaches [`FUZZY_ACCEPT_SCORE`].

mod seed;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::text::{fold, words};

pub use seed::campus_table;

/// Words shorter than this are skipped by the fuzzy pass.
pub const MIN_FUZZY_WORD_LEN: usize = 3;

/// Minimum length-adjusted similarity for a fuzzy alias match.
pub const FUZZY_ACCEPT_SCORE: f64 = 60.0;

/// Errors raised while building a [`CampusGraph`] from a table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate location key: {0}")]
    DuplicateNode(String),
    #[error("edge {from} -> {to} points to an unknown location")]
    UnknownEdgeTarget { from: String, to: String },
    #[error("edge {from} -> {to} must have a positive weight")]
    ZeroWeight { from: String, to: String },
    #[error("alias '{0}' is defined more than once")]
    DuplicateAlias(String),
    #[error("alias '{alias}' points to an unknown location {key}")]
    UnknownAliasTarget { alias: String, key: String },
}

/// Serializable description of a graph, as shipped or loaded from TOML.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GraphTable {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub aliases: Vec<AliasSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSpec {
    pub key: String,
    pub name: String,
    /// Outgoing `(target key, weight)` pairs.
    #[serde(default)]
    pub edges: Vec<(String, u32)>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AliasSpec {
    pub alias: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub to: String,
    pub weight: u32,
}

/// One stop on the campus tour.
#[derive(Debug, Clone)]
pub struct LocationNode {
    pub key: String,
    pub name: String,
    pub edges: Vec<Edge>,
}

/// A folded alias phrase pointing at exactly one node.
#[derive(Debug, Clone)]
pub struct AliasEntry {
    pub alias: String,
    pub key: String,
}

/// Route between two locations, as returned by [`CampusGraph::get_navigation_info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationPlan {
    pub from: String,
    pub to: String,
    pub from_name: String,
    pub to_name: String,
    /// Node keys from origin to destination, both included.
    pub path: Vec<String>,
    pub distance: u32,
    /// `path.len() - 1`.
    pub steps: usize,
    pub should_navigate: bool,
    pub already_here: bool,
}

/// Immutable weighted graph of campus locations plus its alias table.
#[derive(Debug, Clone)]
pub struct CampusGraph {
    nodes: HashMap<String, LocationNode>,
    aliases: Vec<AliasEntry>,
}

impl CampusGraph {
    /// Build the graph from a table, validating edges and aliases.
    pub fn from_table(table: GraphTable) -> Result<Self, GraphError> {
        let mut nodes: HashMap<String, LocationNode> = HashMap::new();
        for def in &table.nodes {
            if nodes.contains_key(&def.key) {
                return Err(GraphError::DuplicateNode(def.key.clone()));
            }
            nodes.insert(
                def.key.clone(),
                LocationNode {
                    key: def.key.clone(),
                    name: def.name.clone(),
                    edges: Vec::with_capacity(def.edges.len()),
                },
            );
        }

        for def in table.nodes {
            let mut edges = Vec::with_capacity(def.edges.len());
            for (to, weight) in def.edges {
                if !nodes.contains_key(&to) {
                    return Err(GraphError::UnknownEdgeTarget {
                        from: def.key.clone(),
                        to,
                    });
                }
                if weight == 0 {
                    return Err(GraphError::ZeroWeight {
                        from: def.key.clone(),
                        to,
                    });
                }
                edges.push(Edge { to, weight });
            }
            if let Some(node) = nodes.get_mut(&def.key) {
                node.edges = edges;
            }
        }

        let mut seen = HashSet::new();
        let mut aliases = Vec::with_capacity(table.aliases.len());
        for def in table.aliases {
            let alias = fold(def.alias.trim());
            if !seen.insert(alias.clone()) {
                return Err(GraphError::DuplicateAlias(alias));
            }
            if !nodes.contains_key(&def.key) {
                return Err(GraphError::UnknownAliasTarget {
                    alias,
                    key: def.key,
                });
            }
            aliases.push(AliasEntry {
                alias,
                key: def.key,
            });
        }

        Ok(Self { nodes, aliases })
    }

    /// The built-in campus graph.
    pub fn campus() -> Result<Self, GraphError> {
        Self::from_table(campus_table())
    }

    pub fn node(&self, key: &str) -> Option<&LocationNode> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Display name for a key, if the key exists.
    pub fn display_name(&self, key: &str) -> Option<&str> {
        self.nodes.get(key).map(|n| n.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn aliases(&self) -> &[AliasEntry] {
        &self.aliases
    }

    /// Resolve a location mentioned in free text to a node key.
    pub fn resolve_name(&self, text: &str) -> Option<&str> {
        let folded = fold(text);

        if let Some(entry) = self
            .aliases
            .iter()
            .find(|a| folded.contains(a.alias.as_str()))
        {
            debug!(alias = %entry.alias, key = %entry.key, "alias substring match");
            return Some(entry.key.as_str());
        }

        let mut best: Option<(&str, &AliasEntry, f64)> = None;
        for word in words(&folded).filter(|w| w.chars().count() >= MIN_FUZZY_WORD_LEN) {
            for entry in &self.aliases {
                let score = length_adjusted_similarity(word, &entry.alias);
                if best.map_or(true, |(_, _, s)| score > s) {
                    best = Some((word, entry, score));
                }
            }
        }

        match best {
            Some((word, entry, score)) if score >= FUZZY_ACCEPT_SCORE => {
                debug!(word, alias = %entry.alias, score, "fuzzy alias match");
                Some(entry.key.as_str())
            }
            Some((word, entry, score)) => {
                debug!(word, alias = %entry.alias, score, "best fuzzy alias below threshold");
                None
            }
            None => None,
        }
    }

    /// Dijkstra from `from` to `to`, returning `(path, total weight)`.
    ///
    /// Each queue entry carries its own path, so the first time the
    /// destination is popped its path is already complete. Returns `None`
    /// if either endpoint is unknown or the two are disconnected.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<(Vec<String>, u32)> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }

        let mut queue = BinaryHeap::new();
        queue.push(Reverse((0u32, from.to_string(), vec![from.to_string()])));
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(Reverse((dist, current, path))) = queue.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if current == to {
                return Some((path, dist));
            }
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            for edge in &node.edges {
                if visited.contains(&edge.to) {
                    continue;
                }
                let mut next = path.clone();
                next.push(edge.to.clone());
                queue.push(Reverse((dist + edge.weight, edge.to.clone(), next)));
            }
        }

        None
    }

    /// Route from `from` to `to`, or an "already here" plan when they match.
    pub fn get_navigation_info(&self, from: &str, to: &str) -> Option<NavigationPlan> {
        let from_name = self.display_name(from)?.to_string();
        let to_name = self.display_name(to)?.to_string();

        if from == to {
            return Some(NavigationPlan {
                from: from.to_string(),
                to: to.to_string(),
                from_name,
                to_name,
                path: vec![from.to_string()],
                distance: 0,
                steps: 0,
                should_navigate: false,
                already_here: true,
            });
        }

        let (path, distance) = self.shortest_path(from, to)?;
        Some(NavigationPlan {
            from: from.to_string(),
            to: to.to_string(),
            from_name,
            to_name,
            steps: path.len().saturating_sub(1),
            path,
            distance,
            should_navigate: true,
            already_here: false,
        })
    }
}

/// Normalized Levenshtein ratio (0–100) scaled by the length ratio of the pair.
pub fn length_adjusted_similarity(word: &str, alias: &str) -> f64 {
    let raw = strsim::normalized_levenshtein(word, alias) * 100.0;
    let (a, b) = (word.chars().count(), alias.chars().count());
    if a == 0 || b == 0 {
        return 0.0;
    }
    raw * a.min(b) as f64 / a.max(b) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> CampusGraph {
        let node = |key: &str, name: &str, edges: &[&str]| NodeSpec {
            key: key.to_string(),
            name: name.to_string(),
            edges: edges.iter().map(|e| (e.to_string(), 1)).collect(),
        };
        CampusGraph::from_table(GraphTable {
            nodes: vec![
                node("0-entrada", "Entrada", &["1-patio-central"]),
                node(
                    "1-patio-central",
                    "Patio Central",
                    &["0-entrada", "25-entrada-biblioteca"],
                ),
                node(
                    "25-entrada-biblioteca",
                    "Entrada Biblioteca",
                    &["1-patio-central", "26-biblioteca"],
                ),
                node("26-biblioteca", "Biblioteca", &["25-entrada-biblioteca"]),
                node("99-aislado", "Aislado", &[]),
            ],
            aliases: vec![AliasSpec {
                alias: "Biblioteca".to_string(),
                key: "26-biblioteca".to_string(),
            }],
        })
        .unwrap()
    }

    #[test]
    fn test_shortest_path_chain() {
        let g = chain();
        let (path, weight) = g.shortest_path("0-entrada", "26-biblioteca").unwrap();
        assert_eq!(
            path,
            vec![
                "0-entrada",
                "1-patio-central",
                "25-entrada-biblioteca",
                "26-biblioteca"
            ]
        );
        assert_eq!(weight, 3);

        let plan = g.get_navigation_info("0-entrada", "26-biblioteca").unwrap();
        assert_eq!(plan.steps, 3);
        assert!(plan.should_navigate);
        assert!(!plan.already_here);
        assert_eq!(plan.to_name, "Biblioteca");
    }

    #[test]
    fn test_shortest_path_prefers_lighter_route() {
        let g = CampusGraph::from_table(GraphTable {
            nodes: vec![
                NodeSpec {
                    key: "a".into(),
                    name: "A".into(),
                    edges: vec![("b".into(), 10), ("c".into(), 1)],
                },
                NodeSpec {
                    key: "b".into(),
                    name: "B".into(),
                    edges: vec![("a".into(), 10), ("c".into(), 1)],
                },
                NodeSpec {
                    key: "c".into(),
                    name: "C".into(),
                    edges: vec![("a".into(), 1), ("b".into(), 1)],
                },
            ],
            aliases: vec![],
        })
        .unwrap();
        let (path, weight) = g.shortest_path("a", "b").unwrap();
        assert_eq!(path, vec!["a", "c", "b"]);
        assert_eq!(weight, 2);
    }

    #[test]
    fn test_shortest_path_unknown_or_disconnected() {
        let g = chain();
        assert!(g.shortest_path("0-entrada", "nowhere").is_none());
        assert!(g.shortest_path("nowhere", "0-entrada").is_none());
        assert!(g.shortest_path("0-entrada", "99-aislado").is_none());
        assert!(g.get_navigation_info("0-entrada", "99-aislado").is_none());
    }

    #[test]
    fn test_same_node_is_already_here() {
        let g = chain();
        let plan = g.get_navigation_info("26-biblioteca", "26-biblioteca").unwrap();
        assert!(!plan.should_navigate);
        assert!(plan.already_here);
        assert_eq!(plan.path, vec!["26-biblioteca"]);
        assert_eq!(plan.distance, 0);
        assert_eq!(plan.steps, 0);
    }

    #[test]
    fn test_campus_graph_builds_and_routes() {
        let g = CampusGraph::campus().unwrap();
        assert_eq!(g.len(), 29);
        let (path, weight) = g.shortest_path("0-entrada", "26-biblioteca").unwrap();
        assert_eq!(
            path,
            vec![
                "0-entrada",
                "1-patio-central",
                "25-entrada-biblioteca",
                "26-biblioteca"
            ]
        );
        assert_eq!(weight, 3);
        assert!(g.shortest_path("14-salon-701", "28-salon-1509").is_some());
    }

    #[test]
    fn test_resolve_substring_alias() {
        let g = CampusGraph::campus().unwrap();
        assert_eq!(
            g.resolve_name("quiero ir a la biblioteca"),
            Some("26-biblioteca")
        );
        assert_eq!(
            g.resolve_name("¿Dónde queda el Pabellón 7?"),
            Some("4-pabellon-7")
        );
    }

    #[test]
    fn test_resolve_fuzzy_typo() {
        let g = CampusGraph::campus().unwrap();
        assert_eq!(g.resolve_name("como llego a la bibloteca"), Some("26-biblioteca"));
    }

    #[test]
    fn test_resolve_rejects_weak_matches() {
        let g = CampusGraph::campus().unwrap();
        assert_eq!(g.resolve_name("hola que tal"), None);
        assert_eq!(g.resolve_name(""), None);
    }

    #[test]
    fn test_length_penalty() {
        let short = length_adjusted_similarity("poli", "polideportivo");
        let exact = length_adjusted_similarity("polideportivo", "polideportivo");
        assert!((exact - 100.0).abs() < 1e-9);
        assert!(short < FUZZY_ACCEPT_SCORE);
    }

    #[test]
    fn test_table_validation() {
        let bad_edge = GraphTable {
            nodes: vec![NodeSpec {
                key: "a".into(),
                name: "A".into(),
                edges: vec![("missing".into(), 1)],
            }],
            aliases: vec![],
        };
        assert!(matches!(
            CampusGraph::from_table(bad_edge),
            Err(GraphError::UnknownEdgeTarget { .. })
        ));

        let zero = GraphTable {
            nodes: vec![
                NodeSpec {
                    key: "a".into(),
                    name: "A".into(),
                    edges: vec![("b".into(), 0)],
                },
                NodeSpec {
                    key: "b".into(),
                    name: "B".into(),
                    edges: vec![],
                },
            ],
            aliases: vec![],
        };
        assert!(matches!(
            CampusGraph::from_table(zero),
            Err(GraphError::ZeroWeight { .. })
        ));

        let dup_alias = GraphTable {
            nodes: vec![NodeSpec {
                key: "a".into(),
                name: "A".into(),
                edges: vec![],
            }],
            aliases: vec![
                AliasSpec {
                    alias: "Aula".into(),
                    key: "a".into(),
                },
                AliasSpec {
                    alias: "aula".into(),
                    key: "a".into(),
                },
            ],
        };
        assert_eq!(
            CampusGraph::from_table(dup_alias).unwrap_err(),
            GraphError::DuplicateAlias("aula".into())
        );
    }
}
