//! Summarizer trait and supporting types.
//!
//! The engine never talks to a model API directly. The embedding
//! application implements [`Summarizer`] on top of its LLM-calling layer
//! (including prompt construction and response parsing into the typed
//! values below); the engine drives it with deadlines and degrades locally
//! when a call fails or times out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ChunkId, EvidenceChunk, ThreadId, ThreadSummary};

/// Errors that can occur during summarization calls.
#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("invalid response format: {0}")]
    InvalidResponse(String),

    #[error("rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("context length exceeded: {used} tokens used, {max} maximum")]
    ContextLengthExceeded { used: usize, max: usize },

    #[error("summarizer not available: {0}")]
    Unavailable(String),
}

/// Result type for summarization calls.
pub type SummarizerResult<T> = Result<T, SummarizerError>;

/// Request for one per-thread summarization call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummaryRequest {
    /// Thread to summarize.
    pub thread_id: ThreadId,
    /// Thread subject, if known.
    pub subject: Option<String>,
    /// The thread's top evidence chunks, score-descending, already
    /// truncated to the configured per-thread cap.
    pub chunks: Vec<EvidenceChunk>,
}

impl ThreadSummaryRequest {
    pub fn new(thread_id: ThreadId, subject: Option<String>, chunks: Vec<EvidenceChunk>) -> Self {
        Self {
            thread_id,
            subject,
            chunks,
        }
    }

    /// Total estimated tokens across the request's chunks.
    pub fn token_estimate(&self) -> u64 {
        self.chunks.iter().map(|c| u64::from(c.tokens)).sum()
    }
}

/// Request for the final aggregation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRequest {
    /// Pre-assembled, budget-capped aggregator input text.
    pub input: String,
    /// Estimated token size of `input`.
    pub token_estimate: u64,
}

/// One item of the aggregated digest, before citation enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedItem {
    /// Item text.
    pub text: String,
    /// Thread the item concerns, if the model attributed one.
    pub thread_id: Option<ThreadId>,
    /// Evidence chunk the model tagged, if any.
    pub evidence: Option<ChunkId>,
}

/// Structured output of the final aggregation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedDigest {
    /// Top-level overview text.
    pub overview: String,
    /// Individual digest items.
    pub items: Vec<AggregatedItem>,
}

/// Trait for the external summarization backend.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Returns the backend's name (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// Summarizes one thread's evidence chunks.
    async fn summarize_thread(
        &self,
        request: &ThreadSummaryRequest,
    ) -> SummarizerResult<ThreadSummary>;

    /// Produces the top-level digest from assembled input text.
    async fn aggregate(&self, request: &AggregateRequest) -> SummarizerResult<AggregatedDigest>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkSignals, MessageId, SourceRef};

    fn make_chunk(id: u64, tokens: u32) -> EvidenceChunk {
        EvidenceChunk {
            id: ChunkId(id),
            thread_id: ThreadId::from("t1"),
            content: "content".to_string(),
            source: SourceRef {
                message_id: MessageId::from("m1"),
                start: 0,
                end: 7,
            },
            tokens,
            score: 1.0,
            signals: ChunkSignals::default(),
        }
    }

    #[test]
    fn request_token_estimate_sums_chunks() {
        let request = ThreadSummaryRequest::new(
            ThreadId::from("t1"),
            Some("Subject".to_string()),
            vec![make_chunk(1, 40), make_chunk(2, 25)],
        );
        assert_eq!(request.token_estimate(), 65);
    }

    #[test]
    fn aggregated_digest_serialization() {
        let digest = AggregatedDigest {
            overview: "Two items need attention.".to_string(),
            items: vec![AggregatedItem {
                text: "Review the budget.".to_string(),
                thread_id: Some(ThreadId::from("t1")),
                evidence: Some(ChunkId(3)),
            }],
        };
        let json = serde_json::to_string(&digest).unwrap();
        let back: AggregatedDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.items.len(), 1);
        assert_eq!(back.items[0].evidence, Some(ChunkId(3)));
    }

    #[test]
    fn error_display() {
        let err = SummarizerError::Api {
            status: 429,
            message: "too many requests".to_string(),
        };
        assert!(err.to_string().contains("429"));
    }
}
