//! Keyword-and-pattern intent classifier.
//!
//! # Classification
//!
//! 1. Navigation patterns are tried in order against the folded message. The
//!    first match returns [`IntentCategory::Navigation`] with confidence
//!    [`PATTERN_CONFIDENCE`] and no clarification.
//! 2. Every category sums weighted phrase hits: high = 3, medium = 2, low = 1.
//!    No hits at all yields [`IntentCategory::General`] with confidence 1.0.
//! 3. Categories are ranked by score. If navigation is in the top two and the
//!    gap is under [`AMBIGUITY_GAP`], navigation wins. Otherwise a gap under
//!    [`AMBIGUITY_GAP`] asks for clarification with confidence fixed at
//!    [`AMBIGUOUS_CONFIDENCE`]. Otherwise confidence is
//!    `min(score / CONFIDENCE_CEILING, 1.0)`.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::text::fold;

/// Confidence reported when a navigation pattern fires.
pub const PATTERN_CONFIDENCE: f64 = 0.90;

/// Score gap below which the top two categories are considered tied.
pub const AMBIGUITY_GAP: f64 = 2.0;

/// Confidence reported for ambiguous messages, regardless of the raw scores.
pub const AMBIGUOUS_CONFIDENCE: f64 = 0.5;

/// Score that maps to full confidence (two high-priority hits).
pub const CONFIDENCE_CEILING: f64 = 6.0;

const GENERIC_CLARIFICATION: &str = "¿Podrías ser más específico con tu pregunta?";

/// Closed set of message purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Navigation,
    LocationInfo,
    Events,
    Careers,
    Admissions,
    Services,
    Schedules,
    General,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 8] = [
        IntentCategory::Navigation,
        IntentCategory::LocationInfo,
        IntentCategory::Events,
        IntentCategory::Careers,
        IntentCategory::Admissions,
        IntentCategory::Services,
        IntentCategory::Schedules,
        IntentCategory::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IntentCategory::Navigation => "navigation",
            IntentCategory::LocationInfo => "location_info",
            IntentCategory::Events => "events",
            IntentCategory::Careers => "careers",
            IntentCategory::Admissions => "admissions",
            IntentCategory::Services => "services",
            IntentCategory::Schedules => "schedules",
            IntentCategory::General => "general",
        }
    }

    /// Disambiguation question offered when this category is a candidate.
    pub fn clarification_question(self) -> Option<&'static str> {
        match self {
            IntentCategory::Navigation => Some("¿Quieres saber cómo llegar a algún lugar?"),
            IntentCategory::LocationInfo => Some("¿Buscas información sobre un lugar específico?"),
            IntentCategory::Events => Some("¿Te interesa conocer eventos o actividades?"),
            IntentCategory::Careers => Some("¿Buscas información sobre carreras disponibles?"),
            IntentCategory::Admissions => {
                Some("¿Necesitas información sobre el proceso de admisión?")
            }
            IntentCategory::Services => Some("¿Quieres saber sobre servicios del campus?"),
            IntentCategory::Schedules => Some("¿Necesitas conocer horarios de atención?"),
            IntentCategory::General => None,
        }
    }
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IntentCategory {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntentCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| IntentError::UnknownCategory(s.to_string()))
    }
}

/// Phrase lists for one category. Phrases are folded before matching.
#[derive(Debug, Clone, Default)]
pub struct KeywordTiers {
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl KeywordTiers {
    fn from_static(high: &[&str], medium: &[&str], low: &[&str]) -> Self {
        fn own(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            high: own(high),
            medium: own(medium),
            low: own(low),
        }
    }
}

/// Keyword tables and navigation patterns, injected into the classifier.
#[derive(Debug, Clone)]
pub struct IntentTable {
    pub keywords: Vec<(IntentCategory, KeywordTiers)>,
    /// Regular expressions matched against the folded message.
    pub navigation_patterns: Vec<String>,
}

impl IntentTable {
    /// Spanish campus vocabulary.
    pub fn campus() -> Self {
        use IntentCategory::*;
        Self {
            keywords: vec![
                (
                    Navigation,
                    KeywordTiers::from_static(
                        &["como llego", "como voy", "ruta", "camino", "direccion"],
                        &["donde esta", "donde queda", "ubicacion"],
                        &["ir a", "llegar"],
                    ),
                ),
                (
                    LocationInfo,
                    KeywordTiers::from_static(
                        &["que es", "que hay en", "informacion sobre"],
                        &["cuentame", "describe", "para que sirve"],
                        &["que tiene"],
                    ),
                ),
                (
                    Events,
                    KeywordTiers::from_static(
                        &["eventos", "actividades", "calendario"],
                        &["que hay", "talleres", "charlas"],
                        &["hoy", "esta semana"],
                    ),
                ),
                (
                    Careers,
                    KeywordTiers::from_static(
                        &["carreras", "que puedo estudiar", "programas"],
                        &["ingenieria", "tecnologia", "especialidad"],
                        &["estudiar", "profesion"],
                    ),
                ),
                (
                    Admissions,
                    KeywordTiers::from_static(
                        &["admision", "postular", "inscripcion", "matricula"],
                        &["requisitos", "examen", "proceso"],
                        &["como ingreso", "vacantes"],
                    ),
                ),
                (
                    Services,
                    KeywordTiers::from_static(
                        &["biblioteca", "comedor", "cafeteria", "laboratorio"],
                        &["servicios", "gimnasio", "enfermeria"],
                        &["donde puedo"],
                    ),
                ),
                (
                    Schedules,
                    KeywordTiers::from_static(
                        &["horario", "que hora", "cuando abre", "cuando cierra"],
                        &["atencion", "disponible", "funcionamiento"],
                        &["abierto", "dias"],
                    ),
                ),
            ],
            navigation_patterns: [
                r"\bcomo (llego|voy|puedo (llegar|ir)|hago para (llegar|ir)) (a|al|hasta|hacia)\b",
                r"\b(llevame|guiame|dirigeme) (a|al|hasta|hacia)\b",
                r"\bquiero (ir|llegar) (a|al|hasta|hacia)\b",
                r"\bdonde (esta|queda|se encuentra|encuentro)\b",
                r"\b(ruta|camino) (a|al|hacia|hasta|para)\b",
                r"\bhow (do|can) i (get|go) to\b",
                r"\btake me to\b",
                r"\bwhere is\b",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("unknown intent category '{0}'")]
    UnknownCategory(String),
    #[error("invalid navigation pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Classification of one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentResult {
    pub category: IntentCategory,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    /// Phrases (or the pattern match) that fired for the winning category.
    pub keywords_found: Vec<String>,
    pub requires_clarification: bool,
    /// Every category that scored, best first.
    pub all_matches: Vec<(IntentCategory, f64)>,
}

impl IntentResult {
    /// True if navigation won or scored at all.
    pub fn mentions_navigation(&self) -> bool {
        self.category == IntentCategory::Navigation
            || self
                .all_matches
                .iter()
                .any(|(c, _)| *c == IntentCategory::Navigation)
    }
}

/// Immutable classifier; build once and share.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    keywords: Vec<(IntentCategory, KeywordTiers)>,
    patterns: Vec<Regex>,
}

impl IntentClassifier {
    pub fn new(table: IntentTable) -> Result<Self, IntentError> {
        let patterns = table
            .navigation_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| IntentError::Pattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let keywords = table
            .keywords
            .into_iter()
            .filter(|(c, _)| *c != IntentCategory::General)
            .map(|(c, tiers)| {
                let fold_all =
                    |list: Vec<String>| -> Vec<String> { list.iter().map(|s| fold(s)).collect() };
                (
                    c,
                    KeywordTiers {
                        high: fold_all(tiers.high),
                        medium: fold_all(tiers.medium),
                        low: fold_all(tiers.low),
                    },
                )
            })
            .collect();

        Ok(Self { keywords, patterns })
    }

    /// Classifier with the built-in Spanish campus vocabulary.
    pub fn campus() -> Result<Self, IntentError> {
        Self::new(IntentTable::campus())
    }

    pub fn detect_intent(&self, message: &str) -> IntentResult {
        let folded = fold(message);

        for pattern in &self.patterns {
            if let Some(m) = pattern.find(&folded) {
                debug!(pattern = pattern.as_str(), "navigation pattern matched");
                return IntentResult {
                    category: IntentCategory::Navigation,
                    confidence: PATTERN_CONFIDENCE,
                    keywords_found: vec![m.as_str().to_string()],
                    requires_clarification: false,
                    all_matches: vec![(IntentCategory::Navigation, PATTERN_CONFIDENCE)],
                };
            }
        }

        let mut scored: Vec<(IntentCategory, f64, Vec<String>)> = self
            .keywords
            .iter()
            .filter_map(|(category, tiers)| {
                let mut score = 0.0;
                let mut found = Vec::new();
                for (list, weight) in [(&tiers.high, 3.0), (&tiers.medium, 2.0), (&tiers.low, 1.0)] {
                    for phrase in list {
                        if folded.contains(phrase.as_str()) {
                            score += weight;
                            found.push(phrase.clone());
                        }
                    }
                }
                (score > 0.0).then_some((*category, score, found))
            })
            .collect();

        if scored.is_empty() {
            return IntentResult {
                category: IntentCategory::General,
                confidence: 1.0,
                keywords_found: Vec::new(),
                requires_clarification: false,
                all_matches: Vec::new(),
            };
        }

        // Stable: equal scores keep table order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let all_matches: Vec<(IntentCategory, f64)> =
            scored.iter().map(|(c, s, _)| (*c, *s)).collect();

        let runner_up = scored.get(1).map(|(c, s, _)| (*c, *s));
        let (top_category, top_score, _) = &scored[0];
        let tied = runner_up.is_some_and(|(_, s)| top_score - s < AMBIGUITY_GAP);

        let navigation_in_top_two = *top_category == IntentCategory::Navigation
            || runner_up.is_some_and(|(c, _)| c == IntentCategory::Navigation);

        let (winner, confidence, requires_clarification) = if tied && navigation_in_top_two {
            let nav = scored
                .iter()
                .position(|(c, _, _)| *c == IntentCategory::Navigation)
                .unwrap_or(0);
            (nav, (scored[nav].1 / CONFIDENCE_CEILING).min(1.0), false)
        } else if tied {
            (0, AMBIGUOUS_CONFIDENCE, true)
        } else {
            (0, (top_score / CONFIDENCE_CEILING).min(1.0), false)
        };

        let (category, _, keywords_found) = scored.swap_remove(winner);
        debug!(%category, confidence, requires_clarification, "intent scored");

        IntentResult {
            category,
            confidence,
            keywords_found,
            requires_clarification,
            all_matches,
        }
    }
}

/// Bulleted question list for the top two candidates of an ambiguous message.
pub fn get_clarification_message(all_matches: &[(IntentCategory, f64)]) -> String {
    if all_matches.len() < 2 {
        return GENERIC_CLARIFICATION.to_string();
    }

    let options: Vec<&str> = all_matches
        .iter()
        .take(2)
        .filter_map(|(c, _)| c.clarification_question())
        .collect();

    if options.is_empty() {
        return GENERIC_CLARIFICATION.to_string();
    }

    let bullets: Vec<String> = options.iter().map(|q| format!("• {}", q)).collect();
    format!(
        "Entiendo que podrías estar preguntando sobre:\n{}",
        bullets.join("\n")
    )
}
