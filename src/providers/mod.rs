//! External provider seams.
//!
//! The engine's only outward dependency is the summarization backend;
//! connectors, storage, and rendering live in the embedding application.

pub mod llm;
