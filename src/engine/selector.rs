//! Budget-respecting evidence selection.
//!
//! The selector turns the full chunk pool into a deduplicated subset that
//! respects the global token budget, the global chunk count, and the
//! per-thread cap, while guaranteeing per-bucket minimums where a bucket's
//! candidate pool is non-empty. The whole pass is deterministic: equal
//! scores resolve by chunk creation order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DigestSettings;
use crate::domain::{ChunkId, EvidenceChunk, SourceRef, ThreadId};
use crate::engine::chunker::estimate_tokens;

/// Named chunk categories, processed in this fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    /// Top-scoring chunks across all threads.
    ThreadsTop,
    /// Chunks addressed directly to the digest owner.
    AddressedToMe,
    /// Chunks mentioning dates or deadlines.
    DatesDeadlines,
    /// Chunks from critical senders.
    CriticalSenders,
    /// Remaining capacity, best score first.
    Overflow,
}

/// Admitted chunk counts per bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub threads_top: usize,
    pub addressed_to_me: usize,
    pub dates_deadlines: usize,
    pub critical_senders: usize,
    pub overflow: usize,
}

impl BucketCounts {
    fn incr(&mut self, bucket: BucketKind) {
        match bucket {
            BucketKind::ThreadsTop => self.threads_top += 1,
            BucketKind::AddressedToMe => self.addressed_to_me += 1,
            BucketKind::DatesDeadlines => self.dates_deadlines += 1,
            BucketKind::CriticalSenders => self.critical_senders += 1,
            BucketKind::Overflow => self.overflow += 1,
        }
    }

    /// Total admitted across all buckets.
    pub fn total(&self) -> usize {
        self.threads_top
            + self.addressed_to_me
            + self.dates_deadlines
            + self.critical_senders
            + self.overflow
    }
}

/// Snapshot of one selection pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionMetrics {
    /// Admitted counts per bucket.
    pub buckets: BucketCounts,
    /// Distinct threads represented in the selection.
    pub threads_covered: usize,
    /// Total estimated tokens of the selection.
    pub tokens_used: u64,
    /// Chunks evicted by the shrink pass.
    pub shrink_dropped: usize,
    /// Tokens evicted by the shrink pass.
    pub shrink_dropped_tokens: u64,
    /// Percentage of admitted tokens evicted by the shrink pass.
    pub shrink_pct: f64,
    /// Qualifying candidates discarded for cap/budget reasons.
    pub discarded_qualifying: usize,
    /// Chunks filtered as service/automated mail.
    pub service_filtered: usize,
}

/// The selected evidence subset plus its metrics snapshot.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Admitted chunks, score-descending (creation order on ties).
    pub chunks: Vec<EvidenceChunk>,
    /// What happened during selection.
    pub metrics: SelectionMetrics,
}

impl Selection {
    /// An empty selection (empty pool input).
    pub fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            metrics: SelectionMetrics::default(),
        }
    }
}

/// Selects a budget-respecting, quota-balanced subset of the chunk pool.
pub struct Selector {
    settings: DigestSettings,
}

/// Internal admission bookkeeping for one pass.
struct Admission {
    chunks: Vec<(EvidenceChunk, BucketKind)>,
    seen: HashSet<SourceRef>,
    per_thread: HashMap<ThreadId, usize>,
    tokens: u64,
    rescue: HashSet<ChunkId>,
    discarded_qualifying: usize,
}

impl Admission {
    fn new() -> Self {
        Self {
            chunks: Vec::new(),
            seen: HashSet::new(),
            per_thread: HashMap::new(),
            tokens: 0,
            rescue: HashSet::new(),
            discarded_qualifying: 0,
        }
    }

    fn is_admitted(&self, chunk: &EvidenceChunk) -> bool {
        self.seen.contains(&chunk.source)
    }

    fn thread_count(&self, thread: &ThreadId) -> usize {
        self.per_thread.get(thread).copied().unwrap_or(0)
    }

    fn admit(&mut self, chunk: EvidenceChunk, bucket: BucketKind) {
        self.tokens += u64::from(chunk.tokens);
        *self.per_thread.entry(chunk.thread_id.clone()).or_default() += 1;
        self.seen.insert(chunk.source.clone());
        self.chunks.push((chunk, bucket));
    }
}

impl Selector {
    /// Creates a selector over the given settings.
    pub fn new(settings: DigestSettings) -> Self {
        Self { settings }
    }

    /// Runs the full selection pass over `pool`.
    ///
    /// An empty pool yields an empty selection with zero tokens; this is
    /// never an error.
    pub fn select(&self, pool: &[EvidenceChunk]) -> Selection {
        if pool.is_empty() {
            return Selection::empty();
        }
        let selection = &self.settings.selection;

        // 1. Filter service/automated mail.
        let mut candidates: Vec<&EvidenceChunk> =
            pool.iter().filter(|c| !c.signals.service_mail).collect();
        let service_filtered = pool.len() - candidates.len();
        sort_ranked(&mut candidates);

        let mut admission = Admission::new();

        // 2. Minimum-if-available rescue: the top candidate of the
        // dates_deadlines and addressed_to_me pools is force-admitted
        // unless the pool is empty. Never fabricated from nothing.
        for bucket in [BucketKind::DatesDeadlines, BucketKind::AddressedToMe] {
            let top = candidates
                .iter()
                .find(|c| in_bucket(c, bucket) && !admission.is_admitted(c));
            if let Some(chunk) = top {
                admission.rescue.insert(chunk.id);
                admission.admit((*chunk).clone(), bucket);
            }
        }

        // 3. Greedy bucketed fill in fixed priority order.
        let quotas = [
            (BucketKind::ThreadsTop, selection.bucket_minimums.threads_top),
            (
                BucketKind::AddressedToMe,
                selection.bucket_minimums.addressed_to_me,
            ),
            (
                BucketKind::DatesDeadlines,
                selection.bucket_minimums.dates_deadlines,
            ),
            (
                BucketKind::CriticalSenders,
                selection.bucket_minimums.critical_senders,
            ),
        ];
        for (bucket, quota) in quotas {
            let already = admission
                .chunks
                .iter()
                .filter(|(_, b)| *b == bucket)
                .count();
            let mut remaining = quota.saturating_sub(already);
            for chunk in candidates.iter().filter(|c| in_bucket(c, bucket)) {
                if remaining == 0 {
                    break;
                }
                match self.try_admit(&mut admission, chunk, bucket) {
                    Admit::Yes => remaining -= 1,
                    Admit::Duplicate => {}
                    Admit::Constrained => {}
                    Admit::Full => break,
                }
            }
        }

        // Overflow: remaining capacity, best score first.
        for chunk in &candidates {
            match self.try_admit(&mut admission, chunk, BucketKind::Overflow) {
                Admit::Yes | Admit::Duplicate | Admit::Constrained => {}
                Admit::Full => break,
            }
        }

        // 5. Shrink.
        let (shrink_dropped, shrink_dropped_tokens) = self.shrink(&mut admission);

        // Budget smaller than any single candidate: admit a truncated
        // remainder if it still meets the minimum chunk size. Runs after
        // shrink so an eviction that empties the selection still leaves
        // something behind.
        if admission.chunks.is_empty() {
            if let Some(chunk) = candidates.first() {
                if let Some(truncated) = self.truncate_to_budget(chunk, selection.token_budget) {
                    admission.admit(truncated, BucketKind::Overflow);
                }
            }
        }

        self.finish(admission, service_filtered, shrink_dropped, shrink_dropped_tokens)
    }

    /// Attempts a normal (non-rescue) admission under all constraints.
    fn try_admit(&self, admission: &mut Admission, chunk: &EvidenceChunk, bucket: BucketKind) -> Admit {
        let selection = &self.settings.selection;
        if admission.chunks.len() >= selection.max_chunks {
            return Admit::Full;
        }
        if admission.is_admitted(chunk) {
            return Admit::Duplicate;
        }
        if admission.thread_count(&chunk.thread_id) >= selection.per_thread_max {
            admission.discarded_qualifying += 1;
            return Admit::Constrained;
        }
        if admission.tokens + u64::from(chunk.tokens) > selection.token_budget {
            admission.discarded_qualifying += 1;
            return Admit::Constrained;
        }
        admission.admit(chunk.clone(), bucket);
        Admit::Yes
    }

    /// Truncates a chunk to the remaining budget on a word boundary.
    fn truncate_to_budget(&self, chunk: &EvidenceChunk, budget: u64) -> Option<EvidenceChunk> {
        let ratio = self.settings.chunking.tokens_per_word;
        let max_words = ((budget as f64 / ratio).floor() as usize).min(usize::MAX);
        if max_words == 0 {
            return None;
        }
        let mut end = 0;
        for (i, word) in chunk.content.split_whitespace().enumerate() {
            if i >= max_words {
                break;
            }
            // Offset of the word's end within the content.
            let word_start = word.as_ptr() as usize - chunk.content.as_ptr() as usize;
            end = word_start + word.len();
        }
        if end == 0 {
            return None;
        }
        let content = chunk.content[..end].to_string();
        let tokens = estimate_tokens(&content, ratio);
        if tokens < self.settings.chunking.min_chunk_tokens || u64::from(tokens) > budget {
            return None;
        }
        Some(chunk.truncated(content, tokens))
    }

    /// Evicts lowest-scoring admissions until the budget holds. Returns
    /// the evicted chunk count and their token total.
    ///
    /// Over budget can only arise through rescue admissions, which skip
    /// the budget check. With shrink enabled, non-rescue victims go
    /// first and the rescue set is only touched when the budget cannot
    /// hold it alone. With shrink disabled, regular admissions are left
    /// standing and the rescue set itself is truncated by priority
    /// score. The budget ceiling holds either way.
    fn shrink(&self, admission: &mut Admission) -> (usize, u64) {
        let selection = &self.settings.selection;
        if admission.tokens <= selection.token_budget {
            return (0, 0);
        }
        if !selection.shrink_enabled {
            debug!(
                tokens = admission.tokens,
                budget = selection.token_budget,
                "rescue admissions over budget with shrink disabled, truncating rescue set"
            );
        }

        let scopes: &[EvictionScope] = if selection.shrink_enabled {
            &[EvictionScope::NonRescue, EvictionScope::Any]
        } else {
            &[EvictionScope::RescueOnly]
        };
        let mut dropped = 0;
        let mut dropped_tokens = 0u64;
        for scope in scopes {
            while admission.tokens > selection.token_budget {
                let victim = admission
                    .chunks
                    .iter()
                    .enumerate()
                    .filter(|(_, (c, _))| scope.allows(admission.rescue.contains(&c.id)))
                    .min_by(|(_, (a, _)), (_, (b, _))| {
                        a.score
                            .partial_cmp(&b.score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(b.id.cmp(&a.id))
                    })
                    .map(|(i, _)| i);
                let Some(i) = victim else { break };
                let (chunk, _) = admission.chunks.remove(i);
                admission.tokens -= u64::from(chunk.tokens);
                dropped_tokens += u64::from(chunk.tokens);
                admission.seen.remove(&chunk.source);
                if let Some(count) = admission.per_thread.get_mut(&chunk.thread_id) {
                    *count = count.saturating_sub(1);
                }
                dropped += 1;
            }
            if admission.tokens <= selection.token_budget {
                break;
            }
        }
        (dropped, dropped_tokens)
    }

    /// Orders the final selection and builds the metrics snapshot.
    fn finish(
        &self,
        admission: Admission,
        service_filtered: usize,
        shrink_dropped: usize,
        shrink_dropped_tokens: u64,
    ) -> Selection {
        let mut buckets = BucketCounts::default();
        for (_, bucket) in &admission.chunks {
            buckets.incr(*bucket);
        }
        let threads_covered = admission
            .chunks
            .iter()
            .map(|(c, _)| &c.thread_id)
            .collect::<HashSet<_>>()
            .len();
        let tokens_used = admission.tokens;
        let admitted_plus_dropped = tokens_used + shrink_dropped_tokens;
        let shrink_pct = if admitted_plus_dropped == 0 {
            0.0
        } else {
            shrink_dropped_tokens as f64 / admitted_plus_dropped as f64 * 100.0
        };

        let mut chunks: Vec<EvidenceChunk> =
            admission.chunks.into_iter().map(|(c, _)| c).collect();
        chunks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });

        Selection {
            chunks,
            metrics: SelectionMetrics {
                buckets,
                threads_covered,
                tokens_used,
                shrink_dropped,
                shrink_dropped_tokens,
                shrink_pct,
                discarded_qualifying: admission.discarded_qualifying,
                service_filtered,
            },
        }
    }
}

/// Outcome of one admission attempt.
enum Admit {
    Yes,
    Duplicate,
    Constrained,
    Full,
}

/// Which admissions an eviction pass may touch.
enum EvictionScope {
    NonRescue,
    Any,
    RescueOnly,
}

impl EvictionScope {
    fn allows(&self, is_rescue: bool) -> bool {
        match self {
            Self::NonRescue => !is_rescue,
            Self::Any => true,
            Self::RescueOnly => is_rescue,
        }
    }
}

/// True if the chunk belongs to the bucket's candidate pool.
fn in_bucket(chunk: &EvidenceChunk, bucket: BucketKind) -> bool {
    match bucket {
        BucketKind::ThreadsTop | BucketKind::Overflow => true,
        BucketKind::AddressedToMe => chunk.signals.addressed_to_me,
        BucketKind::DatesDeadlines => chunk.signals.mentions_date,
        BucketKind::CriticalSenders => chunk.signals.sender_rank > 0,
    }
}

/// Sorts candidates score-descending, creation order on ties.
fn sort_ranked(candidates: &mut [&EvidenceChunk]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkSignals, MessageId};
    use pretty_assertions::assert_eq;

    fn make_chunk(id: u64, thread: &str, tokens: u32, score: f64) -> EvidenceChunk {
        EvidenceChunk {
            id: ChunkId(id),
            thread_id: ThreadId::from(thread),
            content: "some evidence content with enough words to truncate if needed here"
                .to_string(),
            source: SourceRef {
                message_id: MessageId::from(format!("m{id}")),
                start: id as usize * 100,
                end: id as usize * 100 + 66,
            },
            tokens,
            score,
            signals: ChunkSignals::default(),
        }
    }

    fn settings() -> DigestSettings {
        let mut settings = DigestSettings::default();
        settings.chunking.min_chunk_tokens = 5;
        settings
    }

    #[test]
    fn empty_pool_yields_empty_selection() {
        let selector = Selector::new(settings());
        let selection = selector.select(&[]);
        assert!(selection.chunks.is_empty());
        assert_eq!(selection.metrics.tokens_used, 0);
    }

    #[test]
    fn budget_is_never_exceeded() {
        let mut s = settings();
        s.selection.token_budget = 100;
        let selector = Selector::new(s);

        let pool: Vec<_> = (0..20)
            .map(|i| make_chunk(i, &format!("t{i}"), 30, 10.0 - i as f64))
            .collect();
        let selection = selector.select(&pool);

        let total: u64 = selection.chunks.iter().map(|c| u64::from(c.tokens)).sum();
        assert!(total <= 100);
        assert_eq!(selection.metrics.tokens_used, total);
        assert_eq!(selection.chunks.len(), 3);
    }

    #[test]
    fn per_thread_cap_holds_even_for_top_scorers() {
        let mut s = settings();
        s.selection.per_thread_max = 3;
        let selector = Selector::new(s);

        // Ten chunks, all from one thread, all outscoring a couple of
        // chunks from other threads.
        let mut pool: Vec<_> = (0..10)
            .map(|i| make_chunk(i, "noisy", 10, 100.0 - i as f64))
            .collect();
        pool.push(make_chunk(10, "quiet", 10, 1.0));
        pool.push(make_chunk(11, "calm", 10, 0.5));

        let selection = selector.select(&pool);
        let noisy = selection
            .chunks
            .iter()
            .filter(|c| c.thread_id == ThreadId::from("noisy"))
            .count();
        assert_eq!(noisy, 3);
        // The other threads still get in.
        assert_eq!(selection.metrics.threads_covered, 3);
    }

    #[test]
    fn dedup_by_identity_key() {
        let selector = Selector::new(settings());
        let mut a = make_chunk(1, "t1", 10, 5.0);
        let mut b = make_chunk(2, "t1", 10, 4.0);
        // Same identity, different chunk records.
        b.source = a.source.clone();
        a.signals.mentions_date = true;
        b.signals.addressed_to_me = true;

        let selection = selector.select(&[a, b]);
        assert_eq!(selection.chunks.len(), 1);
    }

    #[test]
    fn rescue_admits_top_date_chunk_despite_low_score() {
        let mut s = settings();
        s.selection.token_budget = 50;
        s.selection.max_chunks = 5;
        let selector = Selector::new(s);

        let mut pool: Vec<_> = (0..4)
            .map(|i| make_chunk(i, &format!("t{i}"), 10, 50.0))
            .collect();
        let mut date_chunk = make_chunk(99, "t-date", 10, 0.01);
        date_chunk.signals.mentions_date = true;
        pool.push(date_chunk);

        let selection = selector.select(&pool);
        assert!(selection
            .chunks
            .iter()
            .any(|c| c.id == ChunkId(99)), "low-scoring date chunk must be rescued");
    }

    #[test]
    fn no_rescue_from_empty_pool() {
        let selector = Selector::new(settings());
        let pool: Vec<_> = (0..3).map(|i| make_chunk(i, "t1", 10, 5.0)).collect();
        let selection = selector.select(&pool);
        assert_eq!(selection.metrics.buckets.dates_deadlines, 0);
        assert_eq!(selection.metrics.buckets.addressed_to_me, 0);
    }

    #[test]
    fn addressed_to_me_rescued_when_pool_non_empty() {
        let mut s = settings();
        s.selection.token_budget = 30;
        s.selection.max_chunks = 3;
        let selector = Selector::new(s);

        let mut pool: Vec<_> = (0..3)
            .map(|i| make_chunk(i, &format!("t{i}"), 10, 50.0))
            .collect();
        let mut mine = make_chunk(50, "t-me", 10, 0.1);
        mine.signals.addressed_to_me = true;
        pool.push(mine);

        let selection = selector.select(&pool);
        assert!(selection.chunks.iter().any(|c| c.id == ChunkId(50)));
        assert!(selection.metrics.buckets.addressed_to_me >= 1);
    }

    #[test]
    fn service_mail_filtered() {
        let selector = Selector::new(settings());
        let mut pool: Vec<_> = (0..2).map(|i| make_chunk(i, "t1", 10, 5.0)).collect();
        pool[1].signals.service_mail = true;

        let selection = selector.select(&pool);
        assert_eq!(selection.chunks.len(), 1);
        assert_eq!(selection.metrics.service_filtered, 1);
    }

    #[test]
    fn shrink_protects_rescue_set() {
        let mut s = settings();
        s.selection.token_budget = 40;
        s.selection.shrink_enabled = true;
        let selector = Selector::new(s);

        // Rescue candidates total 20 tokens; high scorers fill the rest.
        let mut date_chunk = make_chunk(0, "t-date", 20, 0.1);
        date_chunk.signals.mentions_date = true;
        let pool = vec![
            date_chunk,
            make_chunk(1, "t1", 20, 90.0),
            make_chunk(2, "t2", 20, 80.0),
        ];

        let selection = selector.select(&pool);
        let total: u64 = selection.chunks.iter().map(|c| u64::from(c.tokens)).sum();
        assert!(total <= 40);
        assert!(selection.chunks.iter().any(|c| c.id == ChunkId(0)));
    }

    #[test]
    fn rescue_truncated_when_budget_below_rescue_set() {
        let mut s = settings();
        s.selection.token_budget = 25;
        let selector = Selector::new(s);

        let mut date_chunk = make_chunk(0, "t-date", 20, 5.0);
        date_chunk.signals.mentions_date = true;
        let mut mine = make_chunk(1, "t-me", 20, 3.0);
        mine.signals.addressed_to_me = true;

        let selection = selector.select(&[date_chunk, mine]);
        let total: u64 = selection.chunks.iter().map(|c| u64::from(c.tokens)).sum();
        assert!(total <= 25);
        // Higher-scoring rescue survives.
        assert!(selection.chunks.iter().any(|c| c.id == ChunkId(0)));
        assert!(!selection.chunks.iter().any(|c| c.id == ChunkId(1)));
    }

    #[test]
    fn budget_holds_when_shrink_disabled_and_rescue_overruns() {
        let mut s = settings();
        s.selection.token_budget = 10;
        s.selection.shrink_enabled = false;
        s.chunking.min_chunk_tokens = 2;
        let selector = Selector::new(s);

        // A single rescued chunk twice the budget: the rescue set is
        // truncated and a budget-sized remainder survives.
        let mut date_chunk = make_chunk(0, "t-date", 20, 5.0);
        date_chunk.signals.mentions_date = true;

        let selection = selector.select(&[date_chunk]);
        let total: u64 = selection.chunks.iter().map(|c| u64::from(c.tokens)).sum();
        assert!(total <= 10, "selected {total} tokens over budget 10");
        assert_eq!(selection.chunks.len(), 1);
        assert!(selection.chunks[0].content.len() < 66);
    }

    #[test]
    fn shrink_disabled_truncates_rescue_set_by_score() {
        let mut s = settings();
        s.selection.token_budget = 10;
        s.selection.shrink_enabled = false;
        let selector = Selector::new(s);

        let mut date_chunk = make_chunk(0, "t-date", 8, 5.0);
        date_chunk.signals.mentions_date = true;
        let mut mine = make_chunk(1, "t-me", 8, 3.0);
        mine.signals.addressed_to_me = true;

        let selection = selector.select(&[date_chunk, mine]);
        assert!(selection.metrics.tokens_used <= 10);
        assert!(selection.chunks.iter().any(|c| c.id == ChunkId(0)));
        assert!(!selection.chunks.iter().any(|c| c.id == ChunkId(1)));
        assert_eq!(selection.metrics.shrink_dropped, 1);
        assert_eq!(selection.metrics.shrink_dropped_tokens, 8);
    }

    #[test]
    fn shrink_pct_measures_tokens_not_chunks() {
        let mut s = settings();
        s.selection.token_budget = 25;
        let selector = Selector::new(s);

        // One eviction of an outsized chunk: the dropped share is its
        // token weight, not one chunk out of two.
        let mut date_chunk = make_chunk(0, "t-date", 20, 5.0);
        date_chunk.signals.mentions_date = true;
        let mut mine = make_chunk(1, "t-me", 30, 3.0);
        mine.signals.addressed_to_me = true;

        let selection = selector.select(&[date_chunk, mine]);
        assert_eq!(selection.metrics.tokens_used, 20);
        assert_eq!(selection.metrics.shrink_dropped_tokens, 30);
        assert!((selection.metrics.shrink_pct - 60.0).abs() < 1e-9);
    }

    #[test]
    fn shrink_disabled_stops_admissions_at_budget() {
        let mut s = settings();
        s.selection.token_budget = 25;
        s.selection.shrink_enabled = false;
        let selector = Selector::new(s);

        let pool: Vec<_> = (0..5)
            .map(|i| make_chunk(i, &format!("t{i}"), 10, 10.0 - i as f64))
            .collect();
        let selection = selector.select(&pool);
        assert_eq!(selection.chunks.len(), 2);
        assert!(selection.metrics.tokens_used <= 25);
        assert!(selection.metrics.discarded_qualifying > 0);
    }

    #[test]
    fn oversized_single_candidate_admitted_truncated() {
        let mut s = settings();
        s.selection.token_budget = 10;
        s.chunking.min_chunk_tokens = 2;
        let selector = Selector::new(s);

        let big = make_chunk(0, "t1", 500, 5.0);
        let selection = selector.select(&[big]);
        assert_eq!(selection.chunks.len(), 1);
        assert!(u64::from(selection.chunks[0].tokens) <= 10);
        assert!(selection.chunks[0].content.len() < 66);
    }

    #[test]
    fn truncated_remainder_rejected_below_min_size() {
        let mut s = settings();
        s.selection.token_budget = 2;
        s.chunking.min_chunk_tokens = 10;
        let selector = Selector::new(s);

        let big = make_chunk(0, "t1", 500, 5.0);
        let selection = selector.select(&[big]);
        assert!(selection.chunks.is_empty());
        assert_eq!(selection.metrics.tokens_used, 0);
    }

    #[test]
    fn ties_resolve_by_creation_order() {
        let mut s = settings();
        s.selection.max_chunks = 2;
        s.selection.per_thread_max = 2;
        let selector = Selector::new(s);

        let pool: Vec<_> = (0..4).map(|i| make_chunk(i, "t1", 10, 7.0)).collect();
        let mut shuffled = pool.clone();
        shuffled.reverse();

        let a = selector.select(&pool);
        let b = selector.select(&shuffled);
        let ids_a: Vec<_> = a.chunks.iter().map(|c| c.id).collect();
        let ids_b: Vec<_> = b.chunks.iter().map(|c| c.id).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(ids_a, vec![ChunkId(0), ChunkId(1)]);
    }

    #[test]
    fn metrics_cover_threads_and_buckets() {
        let selector = Selector::new(settings());
        let mut pool: Vec<_> = (0..4)
            .map(|i| make_chunk(i, &format!("t{}", i % 2), 10, 10.0 - i as f64))
            .collect();
        pool[0].signals.mentions_date = true;

        let selection = selector.select(&pool);
        assert_eq!(selection.metrics.threads_covered, 2);
        assert!(selection.metrics.buckets.total() >= selection.chunks.len());
        assert!(selection.metrics.buckets.dates_deadlines >= 1);
    }
}
