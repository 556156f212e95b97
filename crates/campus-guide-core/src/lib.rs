//! # Campus Guide Core
//!
//! Message-understanding and retrieval engine for the campus tour assistant:
//! location graph, intent classifier, hybrid retriever, and the pipeline
//! that sequences them around an external text generator.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies. Every external collaborator (embedding service, passage
//! store, event store, conversation history, generation service) is a trait
//! that the application crate implements.

pub mod assistant;
pub mod embedding;
pub mod graph;
pub mod intent;
pub mod retrieval;
pub mod store;
pub mod text;
