//! Configuration types.
//!
//! This module defines the engine's settings shapes. Loading them from
//! disk or CLI flags is the embedding application's concern.

mod settings;

pub use settings::{
    BucketMinimums, ChunkingSettings, CitationSettings, DigestSettings, HierarchicalSettings,
    ScoreWeights, SelectionSettings,
};
