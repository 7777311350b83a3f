//! Digest engine: chunking, selection, summarization, citations.
//!
//! [`DigestService`] is the orchestration facade. One call to
//! [`DigestService::run`] takes normalized threads through the full
//! pipeline: chunk and score, decide the pipeline mode from input volume,
//! run either the flat path (budget-respecting selection plus a single
//! aggregation call) or the hierarchical path (bounded per-thread
//! summarization, then aggregation), and enrich the result with verified
//! citations.
//!
//! Per-unit failures degrade and are counted; only an empty or
//! evidence-free run, or a failure of the final aggregation call itself,
//! comes back as an error.

pub mod chunker;
pub mod citations;
pub mod hierarchical;
pub mod selector;
pub mod signals;

pub use chunker::{effective_chunk_cap, estimate_tokens, ChunkError, Chunker};
pub use citations::{
    CitationBuilder, CitationFault, CitationValidator, ValidationMode, ValidationReport,
};
pub use hierarchical::{use_hierarchical, HierarchicalProcessor, HierarchicalResult, ThreadGroup};
pub use selector::{BucketCounts, BucketKind, Selection, SelectionMetrics, Selector};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DigestSettings;
use crate::domain::{
    ChunkId, Digest, DigestItem, DigestProvenance, EvidenceChunk, MessageId, MessageThread,
    MetricsSnapshot, PartialReason, RunMetrics, ThreadId,
};
use crate::providers::llm::{AggregateRequest, AggregatedItem, Summarizer, SummarizerError};

/// Errors that end a digest run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No input threads were provided.
    #[error("no input threads")]
    EmptyInput,

    /// Chunking and selection produced no usable evidence.
    #[error("no usable evidence in input")]
    NoUsableEvidence,

    /// The final aggregation call failed.
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] SummarizerError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Output of one digest run.
#[derive(Debug)]
pub struct DigestRun {
    /// The complete digest artifact.
    pub digest: Digest,
    /// The run's frozen counters, also embedded in the digest.
    pub metrics: MetricsSnapshot,
}

/// Orchestrates one digest run end to end.
pub struct DigestService<S: Summarizer> {
    summarizer: Arc<S>,
    settings: DigestSettings,
}

impl<S: Summarizer> DigestService<S> {
    /// Creates a service over the given summarizer and settings.
    pub fn new(summarizer: Arc<S>, settings: DigestSettings) -> Self {
        Self {
            summarizer,
            settings,
        }
    }

    /// Runs the full pipeline over `threads` as of `now`.
    ///
    /// A degraded or partial run still yields a complete digest; the
    /// digest's `partial_reasons` carry why it is not a full one.
    pub async fn run(
        &self,
        threads: &[MessageThread],
        now: DateTime<Utc>,
    ) -> EngineResult<DigestRun> {
        if threads.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let metrics = RunMetrics::new();

        let chunker = Chunker::new(self.settings.clone());
        let pool = chunker.chunk_threads(threads, now, &metrics);
        if pool.is_empty() {
            return Err(EngineError::NoUsableEvidence);
        }

        let message_count: usize = threads.iter().map(|t| t.messages.len()).sum();
        let hierarchical = use_hierarchical(
            threads.len(),
            message_count,
            &self.settings.hierarchical,
        );
        info!(
            threads = threads.len(),
            messages = message_count,
            chunks = pool.len(),
            hierarchical,
            "starting digest run"
        );

        let (aggregated, thread_summaries, provenance) = if hierarchical {
            let subjects: HashMap<ThreadId, Option<String>> = threads
                .iter()
                .map(|t| (t.id.clone(), t.subject.clone()))
                .collect();
            let processor =
                HierarchicalProcessor::new(Arc::clone(&self.summarizer), self.settings.clone());
            let result = processor.process(&pool, &subjects, &metrics).await?;
            (
                result.digest,
                result.summaries,
                DigestProvenance::Hierarchical,
            )
        } else {
            let selection = Selector::new(self.settings.clone()).select(&pool);
            record_selection(&metrics, &selection, &self.settings);
            if selection.chunks.is_empty() {
                return Err(EngineError::NoUsableEvidence);
            }

            let input = render_flat_input(&selection.chunks);
            let token_estimate = u64::from(estimate_tokens(
                &input,
                self.settings.chunking.tokens_per_word,
            ));
            debug!(
                chunks = selection.chunks.len(),
                token_estimate, "issuing flat aggregation call"
            );
            let digest = self
                .summarizer
                .aggregate(&AggregateRequest {
                    input,
                    token_estimate,
                })
                .await?;
            (digest, Vec::new(), DigestProvenance::Flat)
        };

        let chunk_index: HashMap<ChunkId, EvidenceChunk> =
            pool.iter().map(|c| (c.id, c.clone())).collect();
        let bodies: HashMap<MessageId, &str> = threads
            .iter()
            .flat_map(|t| t.messages.iter())
            .map(|m| (m.id.clone(), m.body.as_str()))
            .collect();
        let items = self.enrich_items(aggregated.items, &chunk_index, &bodies, &metrics);

        let partial_reasons = partial_reasons(&metrics);
        let snapshot = metrics.snapshot();
        let digest = Digest {
            provenance,
            overview: aggregated.overview,
            items,
            thread_summaries,
            partial_reasons,
            metrics: snapshot.clone(),
        };
        Ok(DigestRun {
            digest,
            metrics: snapshot,
        })
    }

    /// Binds aggregated items to verified citations. An item whose
    /// evidence cannot be matched keeps its text but carries no citation.
    fn enrich_items(
        &self,
        items: Vec<AggregatedItem>,
        chunk_index: &HashMap<ChunkId, EvidenceChunk>,
        bodies: &HashMap<MessageId, &str>,
        metrics: &RunMetrics,
    ) -> Vec<DigestItem> {
        let mut builder = CitationBuilder::new(&self.settings.citations);
        items
            .into_iter()
            .map(|item| {
                let citation = item.evidence.and_then(|id| {
                    let chunk = chunk_index.get(&id)?;
                    let body = bodies.get(&chunk.source.message_id)?;
                    builder.build(chunk, body)
                });
                match (&item.evidence, &citation) {
                    (Some(_), Some(_)) => RunMetrics::incr(&metrics.citations_built),
                    (Some(_), None) => RunMetrics::incr(&metrics.citations_missed),
                    (None, _) => {}
                }
                DigestItem {
                    text: item.text,
                    thread_id: item.thread_id,
                    evidence: item.evidence,
                    citation,
                }
            })
            .collect()
    }
}

/// Copies the selection pass outcome into the run counters.
fn record_selection(metrics: &RunMetrics, selection: &Selection, settings: &DigestSettings) {
    let m = &selection.metrics;
    RunMetrics::add(&metrics.tokens_selected, m.tokens_used);
    RunMetrics::add(&metrics.token_budget, settings.selection.token_budget);
    RunMetrics::add(&metrics.shrink_dropped_tokens, m.shrink_dropped_tokens);
    RunMetrics::add(&metrics.discarded_qualifying, m.discarded_qualifying as u64);
    RunMetrics::add(&metrics.threads_covered, m.threads_covered as u64);
}

/// Renders selected chunks as evidence-tagged aggregator input.
fn render_flat_input(chunks: &[EvidenceChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[{} | thread {}] {}", c.id, c.thread_id, c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Derives reason codes for a partial run from the counters.
fn partial_reasons(metrics: &RunMetrics) -> Vec<PartialReason> {
    use std::sync::atomic::Ordering;

    let mut reasons = Vec::new();
    if metrics.chunking_failures.load(Ordering::Relaxed) > 0 {
        reasons.push(PartialReason::ChunkingPartial);
    }
    if metrics.timeouts.load(Ordering::Relaxed) + metrics.errors.load(Ordering::Relaxed) > 0 {
        reasons.push(PartialReason::SummarizationDegraded);
    }
    if metrics.shrink_dropped_tokens.load(Ordering::Relaxed) > 0 {
        reasons.push(PartialReason::BudgetShrunk);
    }
    reasons
}
