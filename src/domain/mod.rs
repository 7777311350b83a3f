//! Domain types.
//!
//! This module contains the core domain types used throughout the engine,
//! from normalized input messages to evidence chunks, thread summaries,
//! citations, and the final digest artifact.

mod chunk;
mod citation;
mod digest;
mod message;
mod metrics;
mod summary;
mod types;

pub use chunk::{ChunkSignals, EvidenceChunk, SourceRef};
pub use citation::{Citation, PREVIEW_MAX_LEN};
pub use digest::{Digest, DigestItem, DigestProvenance, PartialReason};
pub use message::{Address, MessageThread, NormalizedMessage};
pub use metrics::{MetricsSnapshot, RunMetrics};
pub use summary::{
    ActionItem, DeadlineItem, DegradeCause, GroundingOutcome, SummaryProvenance, ThreadSummary,
};
pub use types::{ChunkId, MessageId, ThreadId};

pub(crate) use summary::truncate_at_char_boundary;
