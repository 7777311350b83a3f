//! Hierarchical two-stage summarization.
//!
//! Above the volume thresholds, the engine summarizes each qualifying
//! thread with one bounded, deadline-carrying call, then aggregates the
//! per-thread summaries (plus small bypassed threads) in a single final
//! call. Per-thread work runs on a bounded worker pool; results are
//! consumed in completion order and deterministic ordering is re-imposed
//! during aggregator-input assembly.
//!
//! A thread that times out or errors is converted on the spot to a
//! locally synthesized summary from its top two chunks — no retry, no
//! second network round trip — so every thread resolves to a valid
//! summary before aggregation.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::config::{DigestSettings, HierarchicalSettings};
use crate::domain::{
    truncate_at_char_boundary, ChunkId, DegradeCause, EvidenceChunk, RunMetrics,
    SummaryProvenance, ThreadId, ThreadSummary,
};
use crate::engine::chunker::estimate_tokens;
use crate::providers::llm::{
    AggregateRequest, AggregatedDigest, Summarizer, SummarizerResult, ThreadSummaryRequest,
};

/// Threads with fewer chunks than this bypass summarization entirely;
/// summarizing a near-trivial thread wastes a call.
const MIN_CHUNKS_TO_SUMMARIZE: usize = 3;

/// Chunks used to synthesize a degraded summary.
const DEGRADED_CHUNK_COUNT: usize = 2;

/// Byte cap on one evidence snippet in the aggregator input.
const SNIPPET_MAX_LEN: usize = 240;

/// Mode decision: pure in the counts and the config, monotonic in both
/// counts.
pub fn use_hierarchical(
    thread_count: usize,
    message_count: usize,
    settings: &HierarchicalSettings,
) -> bool {
    settings.enabled
        && (thread_count >= settings.min_threads || message_count >= settings.min_messages)
}

/// One thread's share of the ranked pool, sorted score-descending.
#[derive(Debug, Clone)]
pub struct ThreadGroup {
    pub thread_id: ThreadId,
    pub subject: Option<String>,
    pub chunks: Vec<EvidenceChunk>,
}

/// Partitions the ranked pool by thread id.
///
/// Groups come back ordered by their best chunk's score (thread priority),
/// each group's chunks score-descending.
pub fn group_by_thread(
    pool: &[EvidenceChunk],
    subjects: &HashMap<ThreadId, Option<String>>,
) -> Vec<ThreadGroup> {
    let mut by_thread: HashMap<ThreadId, Vec<EvidenceChunk>> = HashMap::new();
    for chunk in pool {
        by_thread
            .entry(chunk.thread_id.clone())
            .or_default()
            .push(chunk.clone());
    }

    let mut groups: Vec<ThreadGroup> = by_thread
        .into_iter()
        .map(|(thread_id, mut chunks)| {
            chunks.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            });
            let subject = subjects.get(&thread_id).cloned().flatten();
            ThreadGroup {
                thread_id,
                subject,
                chunks,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        let sa = a.chunks.first().map(|c| c.score).unwrap_or(f64::MIN);
        let sb = b.chunks.first().map(|c| c.score).unwrap_or(f64::MIN);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.thread_id.cmp(&b.thread_id))
    });
    groups
}

/// Result of the hierarchical stage.
#[derive(Debug)]
pub struct HierarchicalResult {
    /// The aggregated top-level digest.
    pub digest: AggregatedDigest,
    /// All per-thread summaries in deterministic (priority) order, for
    /// audit.
    pub summaries: Vec<ThreadSummary>,
    /// Whether any thread resolved through degradation.
    pub any_degraded: bool,
}

/// Runs bounded-concurrency per-thread summarization and the final
/// aggregation call.
pub struct HierarchicalProcessor<S: Summarizer> {
    summarizer: Arc<S>,
    settings: DigestSettings,
}

impl<S: Summarizer> HierarchicalProcessor<S> {
    /// Creates a processor over the given summarizer and settings.
    pub fn new(summarizer: Arc<S>, settings: DigestSettings) -> Self {
        Self {
            summarizer,
            settings,
        }
    }

    /// Processes the ranked pool end to end: group, summarize with
    /// deadlines, assemble, aggregate.
    ///
    /// Only a failure of the final aggregation call propagates; no single
    /// thread's failure can block the run past its deadline.
    pub async fn process(
        &self,
        pool: &[EvidenceChunk],
        subjects: &HashMap<ThreadId, Option<String>>,
        metrics: &RunMetrics,
    ) -> SummarizerResult<HierarchicalResult> {
        let hierarchical = &self.settings.hierarchical;
        let groups = group_by_thread(pool, subjects);

        // Small threads bypass summarization; their chunks go straight
        // to aggregation.
        let (to_summarize, bypassed): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .partition(|g| g.chunks.len() >= MIN_CHUNKS_TO_SUMMARIZE);
        RunMetrics::add(&metrics.threads_bypassed, bypassed.len() as u64);

        let chunk_index: HashMap<ChunkId, EvidenceChunk> = to_summarize
            .iter()
            .flat_map(|g| g.chunks.iter())
            .map(|c| (c.id, c.clone()))
            .collect();

        // Remember each thread's priority rank; completion order is
        // arbitrary and ordering is re-imposed below.
        let priority: HashMap<ThreadId, usize> = to_summarize
            .iter()
            .enumerate()
            .map(|(i, g)| (g.thread_id.clone(), i))
            .collect();

        let timeout = hierarchical.summarize_timeout();
        let cap = hierarchical.per_thread_chunk_cap;
        let mut summaries: Vec<ThreadSummary> = stream::iter(to_summarize.iter().cloned())
            .map(|mut group| {
                let summarizer = Arc::clone(&self.summarizer);
                group.chunks.truncate(cap);
                async move {
                    let request = ThreadSummaryRequest::new(
                        group.thread_id.clone(),
                        group.subject.clone(),
                        group.chunks.clone(),
                    );
                    match tokio::time::timeout(timeout, summarizer.summarize_thread(&request))
                        .await
                    {
                        Ok(Ok(summary)) => (group, Ok(summary)),
                        Ok(Err(err)) => {
                            warn!(thread = %group.thread_id, error = %err, "summarization failed, degrading");
                            (group, Err(DegradeCause::Error))
                        }
                        Err(_elapsed) => {
                            warn!(thread = %group.thread_id, "summarization deadline expired, degrading");
                            (group, Err(DegradeCause::Timeout))
                        }
                    }
                }
            })
            .buffer_unordered(hierarchical.worker_pool_size.max(1))
            .map(|(group, outcome)| match outcome {
                Ok(summary) => {
                    RunMetrics::incr(&metrics.threads_summarized);
                    self.accept(summary, &group, &chunk_index, metrics)
                }
                Err(cause) => {
                    match cause {
                        DegradeCause::Timeout => RunMetrics::incr(&metrics.timeouts),
                        DegradeCause::Error => RunMetrics::incr(&metrics.errors),
                    }
                    degraded_summary(&group, cause)
                }
            })
            .collect()
            .await;

        let any_degraded = summaries
            .iter()
            .any(|s| matches!(s.provenance, SummaryProvenance::Degraded(_)));

        // Re-impose deterministic priority order.
        summaries.sort_by_key(|s| priority.get(&s.thread_id).copied().unwrap_or(usize::MAX));

        let input = self.assemble_input(&summaries, &bypassed, &chunk_index);
        let token_estimate = u64::from(estimate_tokens(
            &input,
            self.settings.chunking.tokens_per_word,
        ));
        debug!(
            summaries = summaries.len(),
            bypassed = bypassed.len(),
            token_estimate,
            "issuing final aggregation call"
        );
        let digest = self
            .summarizer
            .aggregate(&AggregateRequest {
                input,
                token_estimate,
            })
            .await?;

        Ok(HierarchicalResult {
            digest,
            summaries,
            any_degraded,
        })
    }

    /// Accepts a successful summarization response: pins the thread id,
    /// truncates over-length free text on sentence boundaries, and
    /// enforces the grounding invariant.
    fn accept(
        &self,
        mut summary: ThreadSummary,
        group: &ThreadGroup,
        chunk_index: &HashMap<ChunkId, EvidenceChunk>,
        metrics: &RunMetrics,
    ) -> ThreadSummary {
        let hierarchical = &self.settings.hierarchical;
        summary.thread_id = group.thread_id.clone();
        summary.provenance = SummaryProvenance::Full;
        summary.summary = truncate_sentences(&summary.summary, hierarchical.max_field_len);
        summary.title = truncate_at_char_boundary(&summary.title, hierarchical.max_field_len)
            .to_string();
        for question in &mut summary.open_questions {
            *question = truncate_sentences(question, hierarchical.max_field_len);
        }
        for action in &mut summary.actions {
            action.description = truncate_sentences(&action.description, hierarchical.max_field_len);
        }
        for deadline in &mut summary.deadlines {
            deadline.description =
                truncate_sentences(&deadline.description, hierarchical.max_field_len);
        }

        let outcome = summary.enforce_grounding(chunk_index, hierarchical.min_quote_len);
        if outcome.repaired > 0 || outcome.rejected > 0 {
            debug!(
                thread = %summary.thread_id,
                repaired = outcome.repaired,
                rejected = outcome.rejected,
                "grounding enforcement modified summary"
            );
            RunMetrics::add(&metrics.grounding_repaired, u64::from(outcome.repaired));
            RunMetrics::add(&metrics.grounding_rejected, u64::from(outcome.rejected));
        }
        summary
    }

    /// Renders summaries and bypassed threads into the aggregator input,
    /// shrinking to the token cap when needed.
    fn assemble_input(
        &self,
        summaries: &[ThreadSummary],
        bypassed: &[ThreadGroup],
        chunk_index: &HashMap<ChunkId, EvidenceChunk>,
    ) -> String {
        let hierarchical = &self.settings.hierarchical;
        let ratio = self.settings.chunking.tokens_per_word;

        let rendered: Vec<String> = summaries
            .iter()
            .map(|s| self.render_summary(s, hierarchical.snippets_per_thread, None, chunk_index))
            .collect();
        let bypassed_rendered: Vec<String> = bypassed
            .iter()
            .map(|g| render_bypassed(g, hierarchical.bypassed_thread_max_len))
            .collect();

        let full = rendered
            .iter()
            .chain(bypassed_rendered.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n");
        if u64::from(estimate_tokens(&full, ratio)) <= hierarchical.aggregator_token_cap {
            return full;
        }

        // Over the cap: keep threads with commitments in full (lists cut
        // to the top few items), append the rest in original order while
        // budget remains.
        debug!("aggregator input over cap, shrinking");
        let mut parts: Vec<String> = Vec::new();
        let mut used: u64 = 0;
        let cap = hierarchical.aggregator_token_cap;
        for summary in summaries.iter().filter(|s| s.has_commitments()) {
            let text = self.render_summary(
                summary,
                hierarchical.snippets_per_thread,
                Some(hierarchical.max_list_items),
                chunk_index,
            );
            used += u64::from(estimate_tokens(&text, ratio));
            parts.push(text);
        }
        for summary in summaries.iter().filter(|s| !s.has_commitments()) {
            let text =
                self.render_summary(summary, hierarchical.snippets_per_thread, None, chunk_index);
            let tokens = u64::from(estimate_tokens(&text, ratio));
            if used + tokens > cap {
                continue;
            }
            used += tokens;
            parts.push(text);
        }
        for text in bypassed_rendered {
            let tokens = u64::from(estimate_tokens(&text, ratio));
            if used + tokens > cap {
                continue;
            }
            used += tokens;
            parts.push(text);
        }
        parts.join("\n\n")
    }

    /// Compact, evidence-tagged rendering of one thread summary.
    fn render_summary(
        &self,
        summary: &ThreadSummary,
        snippet_cap: usize,
        list_cap: Option<usize>,
        chunk_index: &HashMap<ChunkId, EvidenceChunk>,
    ) -> String {
        let mut out = format!("## {} [thread {}]\n", summary.title, summary.thread_id);
        out.push_str(&summary.summary);
        out.push('\n');

        let list_cap = list_cap.unwrap_or(usize::MAX);
        if !summary.actions.is_empty() {
            out.push_str("Actions:\n");
            for action in summary.actions.iter().take(list_cap) {
                let owner = action.owner.as_deref().unwrap_or("unassigned");
                let evidence = action
                    .evidence
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                out.push_str(&format!(
                    "- {} ({}; {}: \"{}\")\n",
                    action.description, owner, evidence, action.quote
                ));
            }
        }
        if !summary.deadlines.is_empty() {
            out.push_str("Deadlines:\n");
            for deadline in summary.deadlines.iter().take(list_cap) {
                let evidence = deadline
                    .evidence
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                out.push_str(&format!(
                    "- {} — due {} ({}: \"{}\")\n",
                    deadline.description, deadline.due, evidence, deadline.quote
                ));
            }
        }
        if !summary.open_questions.is_empty() {
            out.push_str("Open questions:\n");
            for question in &summary.open_questions {
                out.push_str(&format!("- {}\n", question));
            }
        }

        // Highest-relevance snippets, tagged with their evidence ids. A
        // bare tag is useless to the aggregator, so each id carries a
        // capped excerpt of its chunk's content.
        let snippets: Vec<&ChunkId> = summary.evidence.iter().take(snippet_cap).collect();
        if !snippets.is_empty() {
            out.push_str("Evidence:\n");
            for id in snippets {
                match chunk_index.get(id) {
                    Some(chunk) => out.push_str(&format!(
                        "[{}] {}\n",
                        id,
                        truncate_at_char_boundary(&chunk.content, SNIPPET_MAX_LEN)
                    )),
                    None => out.push_str(&format!("[{}]\n", id)),
                }
            }
        }
        out
    }
}

/// Renders a bypassed small thread as raw, length-capped content.
fn render_bypassed(group: &ThreadGroup, max_len: usize) -> String {
    let title = group
        .subject
        .clone()
        .unwrap_or_else(|| group.thread_id.to_string());
    let mut out = format!("## {} [thread {}, direct]\n", title, group.thread_id);
    let mut used = 0;
    for chunk in &group.chunks {
        if used >= max_len {
            break;
        }
        let remaining = max_len - used;
        let content = truncate_at_char_boundary(&chunk.content, remaining);
        out.push_str(&format!("[{}] {}\n", chunk.id, content));
        used += content.len();
    }
    out
}

/// Locally synthesized fallback from the thread's top chunks. No
/// network round trip; no actions or deadlines are asserted.
fn degraded_summary(group: &ThreadGroup, cause: DegradeCause) -> ThreadSummary {
    let top: Vec<&EvidenceChunk> = group.chunks.iter().take(DEGRADED_CHUNK_COUNT).collect();
    let summary_text = top
        .iter()
        .map(|c| truncate_at_char_boundary(&c.content, 240))
        .collect::<Vec<_>>()
        .join(" … ");

    ThreadSummary {
        thread_id: group.thread_id.clone(),
        title: group
            .subject
            .clone()
            .unwrap_or_else(|| group.thread_id.to_string()),
        summary: summary_text,
        actions: Vec::new(),
        deadlines: Vec::new(),
        who_must_act: Vec::new(),
        open_questions: Vec::new(),
        evidence: top.iter().map(|c| c.id).collect(),
        provenance: SummaryProvenance::Degraded(cause),
    }
}

/// Keeps whole sentences while the result fits in `max_len` bytes; falls
/// back to a char-boundary cut when even the first sentence is too long.
pub(crate) fn truncate_sentences(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = 0;
    let mut prev_terminal = false;
    for (i, c) in text.char_indices() {
        if prev_terminal && c.is_whitespace() {
            if i > max_len {
                break;
            }
            end = i;
        }
        prev_terminal = matches!(c, '.' | '!' | '?');
    }
    if end == 0 {
        return truncate_at_char_boundary(text, max_len).to_string();
    }
    text[..end].trim_end().to_string()
}
