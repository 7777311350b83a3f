//! Evidence chunker.
//!
//! Cuts each normalized message into bounded, scored evidence chunks. The
//! splitter is layered, preferring natural boundaries: structural breaks
//! (headings, list items, horizontal rules, quoted-reply headers), then
//! paragraphs, then sentences, then hard truncation for an oversized
//! single sentence. Token sizes use a fixed words-to-tokens ratio so runs
//! are reproducible without a tokenizer.
//!
//! Chunk content is always an exact byte slice of the source body, so a
//! chunk can later be located verbatim for citation building.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ChunkingSettings, DigestSettings};
use crate::domain::{
    ChunkId, ChunkSignals, EvidenceChunk, MessageThread, NormalizedMessage, RunMetrics, SourceRef,
    ThreadId,
};
use crate::engine::signals;

/// Errors that can occur while chunking a thread.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A message is filed under a thread it does not belong to.
    #[error("message {message} belongs to thread {actual}, found in thread {found}")]
    ThreadMismatch {
        message: String,
        actual: String,
        found: String,
    },

    /// A message body is not valid for offset slicing.
    #[error("message {message} has inconsistent body offsets")]
    BadOffsets { message: String },
}

/// Result type for chunking operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Estimates tokens for `text` with the fixed words-to-tokens ratio.
pub fn estimate_tokens(text: &str, tokens_per_word: f64) -> u32 {
    let words = text.split_whitespace().count();
    (words as f64 * tokens_per_word).ceil() as u32
}

/// Pure load-shedding function: the effective per-message chunk cap given
/// ambient volume and the message's own size. Independent of content
/// quality.
pub fn effective_chunk_cap(
    settings: &ChunkingSettings,
    total_messages: usize,
    total_threads: usize,
    message_tokens: u32,
) -> usize {
    let mut cap = settings.max_chunks_per_message as f64;
    if total_messages > settings.high_volume_messages
        || total_threads > settings.high_volume_threads
    {
        cap *= settings.shed_multiplier;
    }
    if message_tokens > settings.long_message_tokens {
        cap *= settings.shed_multiplier;
    }
    (cap.floor() as usize).max(1)
}

/// Cuts normalized threads into scored evidence chunks.
pub struct Chunker {
    settings: DigestSettings,
}

impl Chunker {
    /// Creates a chunker over the given settings.
    pub fn new(settings: DigestSettings) -> Self {
        Self { settings }
    }

    /// Chunks every thread, scores the result, and returns all chunks
    /// sorted score-descending, truncated at the hard total-token
    /// ceiling.
    ///
    /// A thread that fails to chunk is logged, counted, and dropped; the
    /// run continues with the remaining threads.
    pub fn chunk_threads(
        &self,
        threads: &[MessageThread],
        now: DateTime<Utc>,
        metrics: &RunMetrics,
    ) -> Vec<EvidenceChunk> {
        let total_messages: usize = threads.iter().map(|t| t.messages.len()).sum();
        let total_threads = threads.len();

        let mut next_id: u64 = 0;
        let mut chunks = Vec::new();
        for thread in threads {
            match self.chunk_thread(thread, total_messages, total_threads, now, &mut next_id) {
                Ok(mut thread_chunks) => chunks.append(&mut thread_chunks),
                Err(err) => {
                    warn!(thread = %thread.id, error = %err, "dropping thread after chunking failure");
                    RunMetrics::incr(&metrics.chunking_failures);
                }
            }
        }

        // Score-descending, creation order on ties.
        chunks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });

        // Backstop ceiling, independent of the selector's budget.
        let ceiling = self.settings.chunking.total_token_ceiling;
        let mut total: u64 = 0;
        let mut kept = 0;
        for chunk in &chunks {
            if total + u64::from(chunk.tokens) > ceiling {
                break;
            }
            total += u64::from(chunk.tokens);
            kept += 1;
        }
        if kept < chunks.len() {
            debug!(
                dropped = chunks.len() - kept,
                ceiling, "token ceiling truncated chunk pool"
            );
            chunks.truncate(kept);
        }
        chunks
    }

    /// Chunks one thread. Fails as a unit so the caller can skip it.
    fn chunk_thread(
        &self,
        thread: &MessageThread,
        total_messages: usize,
        total_threads: usize,
        now: DateTime<Utc>,
        next_id: &mut u64,
    ) -> ChunkResult<Vec<EvidenceChunk>> {
        let mut chunks = Vec::new();
        for message in &thread.messages {
            if message.thread_id != thread.id {
                return Err(ChunkError::ThreadMismatch {
                    message: message.id.to_string(),
                    actual: message.thread_id.to_string(),
                    found: thread.id.to_string(),
                });
            }
            let mut message_chunks =
                self.chunk_message(message, &thread.id, total_messages, total_threads, now, next_id)?;
            chunks.append(&mut message_chunks);
        }
        Ok(chunks)
    }

    /// Cuts one message into scored chunks, capped by the load-shedding
    /// function.
    fn chunk_message(
        &self,
        message: &NormalizedMessage,
        thread_id: &ThreadId,
        total_messages: usize,
        total_threads: usize,
        now: DateTime<Utc>,
        next_id: &mut u64,
    ) -> ChunkResult<Vec<EvidenceChunk>> {
        let chunking = &self.settings.chunking;
        let message_tokens = estimate_tokens(&message.body, chunking.tokens_per_word);
        let cap = effective_chunk_cap(chunking, total_messages, total_threads, message_tokens);

        let spans = self.split_message(&message.body)?;

        let age_hours = (now - message.date).num_minutes() as f64 / 60.0;
        let service = signals::is_service_mail(
            message.subject.as_deref(),
            &message.body,
            &message.from.email,
        );

        let mut chunks: Vec<EvidenceChunk> = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            let content = message
                .body
                .get(start..end)
                .ok_or_else(|| ChunkError::BadOffsets {
                    message: message.id.to_string(),
                })?;
            let tokens = estimate_tokens(content, chunking.tokens_per_word);
            if tokens < chunking.min_chunk_tokens {
                continue;
            }

            let chunk_signals = ChunkSignals {
                keyword_hits: signals::keyword_hits(content),
                mentions_date: signals::mentions_date(content),
                addressed_to_me: message.is_addressed_to(&self.settings.owner_email),
                sender_rank: signals::sender_rank(
                    &message.from.email,
                    &self.settings.critical_senders,
                ),
                has_attachment: message.has_attachments,
                question_count: signals::question_count(content),
                service_mail: service,
            };
            let score =
                signals::priority_score(&chunk_signals, &self.settings.weights, age_hours);

            chunks.push(EvidenceChunk {
                id: ChunkId(*next_id),
                thread_id: thread_id.clone(),
                content: content.to_string(),
                source: SourceRef {
                    message_id: message.id.clone(),
                    start,
                    end,
                },
                tokens,
                score,
                signals: chunk_signals,
            });
            *next_id += 1;
        }

        // Over the shed cap, keep the top-scoring chunks of this message.
        if chunks.len() > cap {
            chunks.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            });
            chunks.truncate(cap);
            chunks.sort_by_key(|c| c.id);
        }
        Ok(chunks)
    }

    /// Layered splitting. Returns trimmed byte spans into `body`.
    fn split_message(&self, body: &str) -> ChunkResult<Vec<(usize, usize)>> {
        let max_tokens = self.settings.chunking.max_chunk_tokens;
        let ratio = self.settings.chunking.tokens_per_word;

        let mut spans = Vec::new();
        for (start, end) in structural_segments(body) {
            if estimate_tokens(&body[start..end], ratio) <= max_tokens {
                push_trimmed(body, start, end, &mut spans);
                continue;
            }
            for (p_start, p_end) in paragraph_segments(body, start, end) {
                if estimate_tokens(&body[p_start..p_end], ratio) <= max_tokens {
                    push_trimmed(body, p_start, p_end, &mut spans);
                    continue;
                }
                for (s_start, s_end) in sentence_segments(body, p_start, p_end) {
                    if estimate_tokens(&body[s_start..s_end], ratio) <= max_tokens {
                        push_trimmed(body, s_start, s_end, &mut spans);
                    } else {
                        // Last resort: hard cut the oversized sentence.
                        for (h_start, h_end) in
                            hard_segments(body, s_start, s_end, max_tokens, ratio)
                        {
                            push_trimmed(body, h_start, h_end, &mut spans);
                        }
                    }
                }
            }
        }
        Ok(spans)
    }
}

/// Trims whitespace off a span's edges and keeps it if non-empty.
fn push_trimmed(body: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
    let slice = &body[start..end];
    let trimmed = slice.trim_start();
    let new_start = start + (slice.len() - trimmed.len());
    let trimmed = trimmed.trim_end();
    let new_end = new_start + trimmed.len();
    if new_end > new_start {
        out.push((new_start, new_end));
    }
}

/// Returns true if a line starts a new structural segment.
fn is_structural_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.starts_with('#') {
        return true;
    }
    // Bulleted list items.
    if trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("• ") {
        return true;
    }
    // Numbered list items: "1. " or "1) ".
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if rest.starts_with(". ") || rest.starts_with(") ") {
            return true;
        }
    }
    // Horizontal rules.
    let t = trimmed.trim_end();
    if t.len() >= 3 && t.chars().all(|c| c == '-' || c == '_' || c == '*') {
        return true;
    }
    signals::is_quoted_reply_header(line)
}

/// First layer: split at structural break lines.
fn structural_segments(body: &str) -> Vec<(usize, usize)> {
    let mut segments = Vec::new();
    let mut seg_start = 0;
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if offset > seg_start && is_structural_line(line) {
            segments.push((seg_start, offset));
            seg_start = offset;
        }
        offset += line.len();
    }
    if offset > seg_start {
        segments.push((seg_start, offset));
    }
    segments
}

/// Second layer: split a span at blank lines.
fn paragraph_segments(body: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let slice = &body[start..end];
    let mut segments = Vec::new();
    let mut seg_start = start;
    let mut search = 0;
    while let Some(pos) = slice[search..].find("\n\n") {
        let abs = start + search + pos + 2;
        if abs > seg_start {
            segments.push((seg_start, abs));
        }
        seg_start = abs;
        search = search + pos + 2;
    }
    if end > seg_start {
        segments.push((seg_start, end));
    }
    segments
}

/// Third layer: split a span at sentence boundaries.
pub(crate) fn sentence_segments(body: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let slice = &body[start..end];
    let mut segments = Vec::new();
    let mut seg_start = start;
    let mut prev_terminal = false;
    for (i, c) in slice.char_indices() {
        if prev_terminal && c.is_whitespace() {
            let abs = start + i + c.len_utf8();
            segments.push((seg_start, abs));
            seg_start = abs;
        }
        prev_terminal = matches!(c, '.' | '!' | '?');
    }
    if end > seg_start {
        segments.push((seg_start, end));
    }
    segments
}

/// Last layer: hard word-boundary cuts sized to the token limit.
fn hard_segments(
    body: &str,
    start: usize,
    end: usize,
    max_tokens: u32,
    ratio: f64,
) -> Vec<(usize, usize)> {
    let max_words = ((f64::from(max_tokens) / ratio).floor() as usize).max(1);
    let slice = &body[start..end];
    let mut segments = Vec::new();
    let mut seg_start = start;
    let mut words = 0;
    let mut in_word = false;
    for (i, c) in slice.char_indices() {
        if c.is_whitespace() {
            if in_word {
                words += 1;
                in_word = false;
                if words >= max_words {
                    let abs = start + i;
                    segments.push((seg_start, abs));
                    seg_start = abs;
                    words = 0;
                }
            }
        } else {
            in_word = true;
        }
    }
    if end > seg_start {
        segments.push((seg_start, end));
    }
    segments
}
