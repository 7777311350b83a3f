//! brief - evidence assembly and hierarchical summarization for message digests
//!
//! This crate turns normalized message threads into a grounded daily
//! digest: messages are cut into scored evidence chunks, a budget-aware
//! selector picks a balanced subset, and — above a volume threshold — a
//! two-stage summarization pipeline condenses each thread before a final
//! aggregation pass. Every digest item is bound to verifiable citations
//! into the source text.
//!
//! The summarization backend is pluggable through
//! [`providers::llm::Summarizer`]; the engine owns deadlines, degradation,
//! and grounding enforcement.

pub mod config;
pub mod domain;
pub mod engine;
pub mod providers;

pub use engine::{DigestRun, DigestService, EngineError, EngineResult};
