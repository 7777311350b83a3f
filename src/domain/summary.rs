//! Per-thread summary types and the grounding invariant.
//!
//! A [`ThreadSummary`] is the synthesis of one thread produced by the
//! summarization stage (or locally, on the degraded path). Every asserted
//! action and deadline must be grounded: it carries the id of a real
//! evidence chunk and a verbatim quote of at least the configured minimum
//! length. Violations are repaired from the referenced chunk where
//! possible and rejected otherwise — never passed through silently.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ChunkId, EvidenceChunk, ThreadId};

/// An action item asserted by a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    /// What must be done.
    pub description: String,
    /// Who must act, if known.
    pub owner: Option<String>,
    /// Evidence chunk the action was derived from.
    pub evidence: Option<ChunkId>,
    /// Verbatim quote from the evidence chunk.
    pub quote: String,
}

/// A deadline or dated commitment asserted by a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineItem {
    /// What is due.
    pub description: String,
    /// The date expression as it appeared in source text.
    pub due: String,
    /// Evidence chunk the deadline was derived from.
    pub evidence: Option<ChunkId>,
    /// Verbatim quote from the evidence chunk.
    pub quote: String,
}

/// How a thread summary came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum SummaryProvenance {
    /// Produced by a successful summarization call.
    Full,
    /// Synthesized locally after a failure.
    Degraded(DegradeCause),
}

/// Why a thread fell back to a degraded summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeCause {
    /// The summarization call exceeded its deadline.
    Timeout,
    /// The summarization call returned an error.
    Error,
}

/// Per-thread synthesis produced by the summarization stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Thread this summary covers.
    pub thread_id: ThreadId,
    /// Short title (usually the thread subject).
    pub title: String,
    /// Free-text summary.
    pub summary: String,
    /// Actions asserted by the summary.
    pub actions: Vec<ActionItem>,
    /// Deadlines asserted by the summary.
    pub deadlines: Vec<DeadlineItem>,
    /// Who must act, if the summary names anyone.
    pub who_must_act: Vec<String>,
    /// Open questions raised in the thread.
    pub open_questions: Vec<String>,
    /// Evidence chunks the summary drew on.
    pub evidence: Vec<ChunkId>,
    /// How this summary was produced.
    pub provenance: SummaryProvenance,
}

impl ThreadSummary {
    /// Returns true if the summary asserts any action or deadline.
    pub fn has_commitments(&self) -> bool {
        !self.actions.is_empty() || !self.deadlines.is_empty()
    }

    /// Enforces the grounding invariant on all actions and deadlines.
    ///
    /// Items whose quote is missing or shorter than `min_quote_len` are
    /// repaired by re-quoting the referenced chunk's opening text. Items
    /// with no usable evidence id are rejected. Returns how many items
    /// were repaired and how many rejected.
    pub fn enforce_grounding(
        &mut self,
        chunks: &HashMap<ChunkId, EvidenceChunk>,
        min_quote_len: usize,
    ) -> GroundingOutcome {
        let mut outcome = GroundingOutcome::default();

        self.actions.retain_mut(|item| {
            ground_item(&mut item.quote, item.evidence, chunks, min_quote_len, &mut outcome)
        });
        self.deadlines.retain_mut(|item| {
            ground_item(&mut item.quote, item.evidence, chunks, min_quote_len, &mut outcome)
        });

        outcome
    }
}

/// Result of a grounding enforcement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroundingOutcome {
    /// Items whose quote was re-derived from the referenced chunk.
    pub repaired: u32,
    /// Items dropped for lack of usable evidence.
    pub rejected: u32,
}

/// Grounds one action/deadline quote against its evidence chunk.
///
/// Returns false when the item must be dropped.
fn ground_item(
    quote: &mut String,
    evidence: Option<ChunkId>,
    chunks: &HashMap<ChunkId, EvidenceChunk>,
    min_quote_len: usize,
    outcome: &mut GroundingOutcome,
) -> bool {
    let chunk = match evidence.and_then(|id| chunks.get(&id)) {
        Some(chunk) => chunk,
        None => {
            outcome.rejected += 1;
            return false;
        }
    };

    let quote_ok = quote.len() >= min_quote_len && chunk.content.contains(quote.as_str());
    if quote_ok {
        return true;
    }

    // Re-quote from the chunk's opening text, cut at a char boundary.
    let repaired = truncate_at_char_boundary(&chunk.content, min_quote_len.max(80));
    if repaired.len() < min_quote_len {
        outcome.rejected += 1;
        return false;
    }
    *quote = repaired.to_string();
    outcome.repaired += 1;
    true
}

/// Cuts `text` to at most `max_bytes`, backing up to a char boundary.
pub(crate) fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
