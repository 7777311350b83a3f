//! Engine settings types.
//!
//! Every tunable of the pipeline lives here, grouped by stage. The outer
//! application owns loading and persistence; this crate only defines the
//! shapes and their defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestSettings {
    /// Address of the digest owner; drives the `addressed_to_me` signal.
    pub owner_email: String,
    /// Senders whose messages are always high-priority evidence.
    pub critical_senders: Vec<String>,
    /// Chunking stage configuration.
    pub chunking: ChunkingSettings,
    /// Priority-score feature weights.
    pub weights: ScoreWeights,
    /// Selection stage configuration.
    pub selection: SelectionSettings,
    /// Hierarchical summarization configuration.
    pub hierarchical: HierarchicalSettings,
    /// Citation building configuration.
    pub citations: CitationSettings,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            owner_email: String::new(),
            critical_senders: Vec::new(),
            chunking: ChunkingSettings::default(),
            weights: ScoreWeights::default(),
            selection: SelectionSettings::default(),
            hierarchical: HierarchicalSettings::default(),
            citations: CitationSettings::default(),
        }
    }
}

/// Chunking stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSettings {
    /// Maximum estimated tokens per chunk before the next splitting layer
    /// kicks in.
    pub max_chunk_tokens: u32,
    /// Chunks smaller than this are merged into a neighbor or dropped.
    pub min_chunk_tokens: u32,
    /// Base cap on chunks cut from a single message.
    pub max_chunks_per_message: usize,
    /// Fixed words-to-tokens ratio for the deterministic estimate.
    pub tokens_per_word: f64,
    /// Message count above which load shedding engages.
    pub high_volume_messages: usize,
    /// Thread count above which load shedding engages.
    pub high_volume_threads: usize,
    /// Estimated token size above which a single message counts as long.
    pub long_message_tokens: u32,
    /// Multiplier applied to the per-message chunk cap under load
    /// shedding (0 < multiplier <= 1).
    pub shed_multiplier: f64,
    /// Hard ceiling on total tokens across all emitted chunks, applied
    /// after score ordering as a backstop independent of selection.
    pub total_token_ceiling: u64,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 220,
            min_chunk_tokens: 12,
            max_chunks_per_message: 8,
            tokens_per_word: 1.3,
            high_volume_messages: 200,
            high_volume_threads: 60,
            long_message_tokens: 1500,
            shed_multiplier: 0.5,
            total_token_ceiling: 60_000,
        }
    }
}

/// Weights for the priority-score linear combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Per priority-keyword hit.
    pub keyword: f64,
    /// Content mentions a date or deadline.
    pub date_mention: f64,
    /// Per question mark in the content.
    pub question: f64,
    /// The owner is a direct recipient.
    pub addressed_to_me: f64,
    /// Per sender importance rank point.
    pub sender_rank: f64,
    /// The message carries attachments.
    pub attachment: f64,
    /// Weight of the recency term (decays with message age).
    pub recency: f64,
    /// Half-life of the recency decay, in hours.
    pub recency_half_life_hours: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            keyword: 1.0,
            date_mention: 2.0,
            question: 0.5,
            addressed_to_me: 2.5,
            sender_rank: 1.5,
            attachment: 0.5,
            recency: 1.0,
            recency_half_life_hours: 24.0,
        }
    }
}

/// Minimum admission quotas per bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketMinimums {
    /// Top-scoring chunks across all threads.
    pub threads_top: usize,
    /// Chunks addressed directly to the owner.
    pub addressed_to_me: usize,
    /// Chunks mentioning dates or deadlines.
    pub dates_deadlines: usize,
    /// Chunks from critical senders.
    pub critical_senders: usize,
}

impl Default for BucketMinimums {
    fn default() -> Self {
        Self {
            threads_top: 10,
            addressed_to_me: 3,
            dates_deadlines: 3,
            critical_senders: 3,
        }
    }
}

/// Selection stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionSettings {
    /// Per-bucket minimum quotas.
    pub bucket_minimums: BucketMinimums,
    /// No single thread may place more than this many chunks in the
    /// selection.
    pub per_thread_max: usize,
    /// Global cap on selected chunk count.
    pub max_chunks: usize,
    /// Global token budget for the selection.
    pub token_budget: u64,
    /// Whether the shrink pass may evict regular admissions to meet the
    /// budget; when false, admission stops at the budget and a rescue
    /// overrun is resolved by truncating the rescue set itself.
    pub shrink_enabled: bool,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            bucket_minimums: BucketMinimums::default(),
            per_thread_max: 4,
            max_chunks: 80,
            token_budget: 12_000,
            shrink_enabled: true,
        }
    }
}

/// Hierarchical summarization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalSettings {
    /// Master switch for the hierarchical path.
    pub enabled: bool,
    /// Thread count at which hierarchical mode activates.
    pub min_threads: usize,
    /// Message count at which hierarchical mode activates.
    pub min_messages: usize,
    /// Top-N chunks sent to per-thread summarization.
    pub per_thread_chunk_cap: usize,
    /// Deadline for one per-thread summarization call, in milliseconds.
    pub summarize_timeout_ms: u64,
    /// Width of the bounded worker pool.
    pub worker_pool_size: usize,
    /// Token cap on the assembled aggregator input.
    pub aggregator_token_cap: u64,
    /// Minimum verbatim-quote length for grounded actions/deadlines.
    pub min_quote_len: usize,
    /// Byte cap on any free-text field accepted from a summarization
    /// response (sentence-boundary truncated).
    pub max_field_len: usize,
    /// Citation snippets rendered per thread in the aggregator input.
    pub snippets_per_thread: usize,
    /// Items kept per action/deadline list when the aggregator input is
    /// shrunk.
    pub max_list_items: usize,
    /// Byte cap on raw content rendered for a bypassed small thread.
    pub bypassed_thread_max_len: usize,
}

impl Default for HierarchicalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_threads: 25,
            min_messages: 120,
            per_thread_chunk_cap: 6,
            summarize_timeout_ms: 30_000,
            worker_pool_size: 4,
            aggregator_token_cap: 8_000,
            min_quote_len: 20,
            max_field_len: 1_200,
            snippets_per_thread: 2,
            max_list_items: 3,
            bypassed_thread_max_len: 1_500,
        }
    }
}

impl HierarchicalSettings {
    /// The per-call deadline as a [`Duration`].
    pub fn summarize_timeout(&self) -> Duration {
        Duration::from_millis(self.summarize_timeout_ms)
    }
}

/// Citation building configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationSettings {
    /// Capacity of the per-message checksum cache.
    pub checksum_cache_size: usize,
}

impl Default for CitationSettings {
    fn default() -> Self {
        Self {
            checksum_cache_size: 512,
        }
    }
}
