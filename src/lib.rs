//! # Campus Guide
//!
//! A campus tour assistant. A visitor's message is classified by intent,
//! grounded in knowledge passages and upcoming events retrieved from SQLite,
//! answered by a chat model, and paired with a walking route when the
//! message asks how to get somewhere.
//!
//! The engine itself (graph, classifier, retriever, orchestrator) lives in
//! `campus-guide-core` and is storage agnostic. This crate supplies the
//! SQLite store, the HTTP providers, configuration and the `guide` CLI.
//!
//! ```text
//! message ──▶ intent ──▶ retrieval (vector + keyword) ──▶ generation
//!                │                                          │
//!                └────────▶ route planning ◀────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Passage, event and conversation storage |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Chat generation provider |
//! | [`campus`] | Assembles the engine from configuration |
//! | [`seed`] | Loads passages and events from a seed file |
//! | [`ask`] | `guide ask` |
//! | [`navigate`] | `guide route`, `guide resolve`, `guide intent` |

pub mod ask;
pub mod campus;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod migrate;
pub mod navigate;
pub mod seed;
pub mod sqlite_store;
