//! Final digest output types.

use serde::{Deserialize, Serialize};

use super::{Citation, ChunkId, MetricsSnapshot, ThreadId, ThreadSummary};

/// Which pipeline produced the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestProvenance {
    /// Single aggregation call over selected chunks.
    Flat,
    /// Per-thread pre-summarization followed by aggregation.
    Hierarchical,
}

/// Reason code attached to a partial run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialReason {
    /// One or more threads were dropped during chunking.
    ChunkingPartial,
    /// One or more threads resolved to degraded summaries.
    SummarizationDegraded,
    /// The selector evicted admitted evidence to meet the budget.
    BudgetShrunk,
}

/// One item of the final digest, bound to its evidence where possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestItem {
    /// The item text as produced by aggregation.
    pub text: String,
    /// Thread the item concerns, if the aggregator attributed one.
    pub thread_id: Option<ThreadId>,
    /// Evidence chunk backing the item.
    pub evidence: Option<ChunkId>,
    /// Verified pointer into source text; `None` when no match was found
    /// (a citation is omitted, never fabricated).
    pub citation: Option<Citation>,
}

/// The complete digest artifact for one run.
///
/// A degraded or partial run still yields a well-formed digest; the
/// `partial_reasons` field carries why it is not a full one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    /// Which pipeline produced this digest.
    pub provenance: DigestProvenance,
    /// Top-level overview text.
    pub overview: String,
    /// Individual digest items.
    pub items: Vec<DigestItem>,
    /// Intermediate per-thread summaries (hierarchical path, for audit;
    /// empty on the flat path).
    pub thread_summaries: Vec<ThreadSummary>,
    /// Why the run was partial, if it was.
    pub partial_reasons: Vec<PartialReason>,
    /// Frozen run counters.
    pub metrics: MetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_serialization() {
        let digest = Digest {
            provenance: DigestProvenance::Hierarchical,
            overview: "Three threads need attention.".to_string(),
            items: vec![DigestItem {
                text: "Finance needs the revised budget by Friday.".to_string(),
                thread_id: Some(ThreadId::from("t1")),
                evidence: Some(ChunkId(4)),
                citation: None,
            }],
            thread_summaries: vec![],
            partial_reasons: vec![PartialReason::SummarizationDegraded],
            metrics: MetricsSnapshot::default(),
        };

        let json = serde_json::to_string(&digest).unwrap();
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.provenance, DigestProvenance::Hierarchical);
        assert_eq!(back.items.len(), 1);
        assert_eq!(back.partial_reasons, vec![PartialReason::SummarizationDegraded]);
    }

    #[test]
    fn provenance_tags_are_distinct() {
        let flat = serde_json::to_string(&DigestProvenance::Flat).unwrap();
        let hier = serde_json::to_string(&DigestProvenance::Hierarchical).unwrap();
        assert_ne!(flat, hier);
    }
}
