//! Evidence chunk value types.
//!
//! An evidence chunk is the atomic unit of selection and summarization: a
//! bounded, scored slice of one message's normalized body. Chunks are
//! immutable once created — rescoring produces a new value — so the
//! partitioned pool can be read concurrently during per-thread
//! summarization without synchronization.

use serde::{Deserialize, Serialize};

use super::{ChunkId, MessageId, ThreadId};

/// Exact location of a chunk's content within its source message.
///
/// `start`/`end` are byte offsets into the normalized body registered
/// under `message_id`. They double as the deduplication identity key:
/// two chunks with the same `(message_id, start, end)` are the same
/// evidence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Message the content was cut from.
    pub message_id: MessageId,
    /// Byte offset of the first content byte.
    pub start: usize,
    /// Byte offset one past the last content byte.
    pub end: usize,
}

/// Boolean and cardinal signals extracted from a chunk's content and its
/// message metadata. Signals feed the priority score and the bucket
/// assignment in selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkSignals {
    /// Number of priority-keyword hits in the content.
    pub keyword_hits: u32,
    /// Content mentions a date or deadline.
    pub mentions_date: bool,
    /// The digest owner appears among the direct recipients.
    pub addressed_to_me: bool,
    /// Importance rank of the sender (0 = unranked).
    pub sender_rank: u32,
    /// The source message carries attachments.
    pub has_attachment: bool,
    /// Number of question marks in the content.
    pub question_count: u32,
    /// Content matches a service/automated-mail signature.
    pub service_mail: bool,
}

/// A bounded, scored slice of message text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceChunk {
    /// Sequence number in creation order; ties in score resolve by this.
    pub id: ChunkId,
    /// Thread the source message belongs to.
    pub thread_id: ThreadId,
    /// The chunk text itself.
    pub content: String,
    /// Where the content lives in source text.
    pub source: SourceRef,
    /// Estimated token count (deterministic words-to-tokens ratio).
    pub tokens: u32,
    /// Priority score; higher is selected first.
    pub score: f64,
    /// Extracted signals.
    pub signals: ChunkSignals,
}

impl EvidenceChunk {
    /// Returns a copy of this chunk with a new priority score.
    ///
    /// Chunks are never mutated in place; concurrent readers of the
    /// original value are unaffected.
    pub fn with_score(&self, score: f64) -> Self {
        Self {
            score,
            ..self.clone()
        }
    }

    /// Returns a copy truncated to `content`, with the source reference
    /// and token estimate adjusted to the shorter span.
    pub fn truncated(&self, content: String, tokens: u32) -> Self {
        let end = self.source.start + content.len();
        Self {
            content,
            tokens,
            source: SourceRef {
                end,
                ..self.source.clone()
            },
            ..self.clone()
        }
    }

    /// The deduplication identity key.
    pub fn identity(&self) -> &SourceRef {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk() -> EvidenceChunk {
        EvidenceChunk {
            id: ChunkId(1),
            thread_id: ThreadId::from("t1"),
            content: "Please review the budget by Friday.".to_string(),
            source: SourceRef {
                message_id: MessageId::from("m1"),
                start: 10,
                end: 45,
            },
            tokens: 9,
            score: 4.5,
            signals: ChunkSignals {
                mentions_date: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn with_score_returns_new_value() {
        let chunk = make_chunk();
        let rescored = chunk.with_score(9.0);

        assert_eq!(chunk.score, 4.5);
        assert_eq!(rescored.score, 9.0);
        assert_eq!(rescored.content, chunk.content);
        assert_eq!(rescored.id, chunk.id);
    }

    #[test]
    fn truncated_adjusts_source_end() {
        let chunk = make_chunk();
        let short = chunk.truncated("Please rev".to_string(), 3);

        assert_eq!(short.source.start, 10);
        assert_eq!(short.source.end, 20);
        assert_eq!(short.tokens, 3);
        // Original untouched.
        assert_eq!(chunk.source.end, 45);
    }

    #[test]
    fn identity_is_source_ref() {
        let a = make_chunk();
        let mut b = make_chunk();
        b.id = ChunkId(2);
        b.score = 1.0;
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn chunk_serialization() {
        let chunk = make_chunk();
        let json = serde_json::to_string(&chunk).unwrap();
        let deserialized: EvidenceChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.source, chunk.source);
        assert!(deserialized.signals.mentions_date);
    }
}
