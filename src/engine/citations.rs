//! Citation building and validation.
//!
//! Builds verifiable pointers from digest items back to exact spans of
//! normalized source text, and validates them later against the same
//! text. Building prefers a verbatim match; when whitespace has shifted
//! it falls back to a whitespace-normalized match mapped back to original
//! coordinates. Recovered offsets are best-effort and are vouched for by
//! the preview and checksum, not assumed exact. When no match exists at
//! all, the citation is omitted — never fabricated.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use base64::Engine as _;
use lru::LruCache;
use ring::digest;
use thiserror::Error;
use tracing::debug;

use crate::config::CitationSettings;
use crate::domain::{Citation, EvidenceChunk, MessageId, PREVIEW_MAX_LEN};

/// Ways a citation can fail validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CitationFault {
    #[error("empty span: start {start} >= end {end}")]
    EmptySpan { start: usize, end: usize },

    #[error("span end {end} past message length {len}")]
    EndPastBody { end: usize, len: usize },

    #[error("span does not fall on char boundaries")]
    OffsetNotBoundary,

    #[error("substring does not match stored preview")]
    PreviewMismatch,

    #[error("message checksum changed since the citation was built")]
    ChecksumMismatch,

    #[error("message {0} not present in body map")]
    UnknownMessage(MessageId),
}

/// Validation strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Stop at the first failure; used for gating.
    Strict,
    /// Gather every failure; used for diagnostics.
    CollectAll,
}

/// Outcome of a batch validation pass. Validation never mutates
/// anything; it only reports.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Citations that passed.
    pub passed: usize,
    /// Index-tagged failures, in input order.
    pub failures: Vec<(usize, CitationFault)>,
}

impl ValidationReport {
    /// True when every citation validated.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builds citations, caching one checksum per message id.
pub struct CitationBuilder {
    checksums: LruCache<MessageId, String>,
}

impl CitationBuilder {
    /// Creates a builder with the configured cache capacity.
    pub fn new(settings: &CitationSettings) -> Self {
        let capacity =
            NonZeroUsize::new(settings.checksum_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            checksums: LruCache::new(capacity),
        }
    }

    /// Builds a citation binding `chunk` to `body`, the current
    /// normalized text of the chunk's source message.
    ///
    /// Returns `None` when the chunk content cannot be located even
    /// after whitespace-normalized matching.
    pub fn build(&mut self, chunk: &EvidenceChunk, body: &str) -> Option<Citation> {
        let (start, end) = locate(body, chunk)?;
        let preview = preview_of(&body[start..end]);
        let checksum = self.checksum(&chunk.source.message_id, body);
        Some(Citation {
            message_id: chunk.source.message_id.clone(),
            start,
            end,
            preview,
            checksum,
        })
    }

    /// Cached base64 SHA-256 of the message body.
    fn checksum(&mut self, message_id: &MessageId, body: &str) -> String {
        if let Some(cached) = self.checksums.get(message_id) {
            return cached.clone();
        }
        let sum = checksum_of(body);
        self.checksums.put(message_id.clone(), sum.clone());
        sum
    }
}

/// Base64 SHA-256 of a body text.
pub fn checksum_of(body: &str) -> String {
    let digest = digest::digest(&digest::SHA256, body.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest.as_ref())
}

/// Locates chunk content in the body: recorded offsets, verbatim search,
/// then whitespace-normalized fallback.
fn locate(body: &str, chunk: &EvidenceChunk) -> Option<(usize, usize)> {
    let source = &chunk.source;
    // Fast path: the recorded offsets still hold.
    if let Some(slice) = body.get(source.start..source.end) {
        if slice == chunk.content {
            return Some((source.start, source.end));
        }
    }
    // Verbatim search anywhere in the body.
    if let Some(start) = body.find(&chunk.content) {
        return Some((start, start + chunk.content.len()));
    }
    // Fuzzy: collapse whitespace on both sides and map back.
    let found = fuzzy_locate(body, &chunk.content);
    if found.is_none() {
        debug!(message = %source.message_id, "no citation match, omitting");
    }
    found
}

/// Whitespace-normalized search mapped back to original coordinates.
///
/// Offsets recovered this way can be off by surrounding whitespace; they
/// are verified downstream via preview and checksum rather than trusted.
fn fuzzy_locate(body: &str, content: &str) -> Option<(usize, usize)> {
    let (norm_body, index_map) = normalize_with_map(body);
    let (norm_content, _) = normalize_with_map(content);
    if norm_content.is_empty() {
        return None;
    }
    let pos = norm_body.find(&norm_content)?;
    let start = *index_map.get(pos)?;
    let last = *index_map.get(pos + norm_content.len() - 1)?;
    // Extend past the final char of the match.
    let end = last + body[last..].chars().next().map_or(1, |c| c.len_utf8());
    Some((start, end))
}

/// Collapses whitespace runs to single spaces, recording for every byte
/// of the output which original byte it came from.
fn normalize_with_map(text: &str) -> (String, Vec<usize>) {
    let mut out = String::with_capacity(text.len());
    let mut map = Vec::with_capacity(text.len());
    let mut pending_space = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            map.push(i);
            pending_space = false;
        }
        out.push(c);
        for _ in 0..c.len_utf8() {
            map.push(i);
        }
    }
    (out, map)
}

/// First bytes of a span, cut to the preview cap on a char boundary.
fn preview_of(span: &str) -> String {
    crate::domain::truncate_at_char_boundary(span, PREVIEW_MAX_LEN).to_string()
}

/// Collapses whitespace for tolerant comparisons.
fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validates citations against current message bodies.
pub struct CitationValidator {
    mode: ValidationMode,
}

impl CitationValidator {
    /// Creates a validator with the given strictness.
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    /// Checks one citation against the current body text.
    pub fn validate(&self, citation: &Citation, body: &str) -> Result<(), CitationFault> {
        if citation.start >= citation.end {
            return Err(CitationFault::EmptySpan {
                start: citation.start,
                end: citation.end,
            });
        }
        if citation.end > body.len() {
            return Err(CitationFault::EndPastBody {
                end: citation.end,
                len: body.len(),
            });
        }
        let Some(slice) = body.get(citation.start..citation.end) else {
            return Err(CitationFault::OffsetNotBoundary);
        };
        let head = crate::domain::truncate_at_char_boundary(slice, PREVIEW_MAX_LEN);
        if head != citation.preview && normalize_ws(head) != normalize_ws(&citation.preview) {
            return Err(CitationFault::PreviewMismatch);
        }
        if checksum_of(body) != citation.checksum {
            return Err(CitationFault::ChecksumMismatch);
        }
        Ok(())
    }

    /// Validates a batch against a body map. Strict mode stops at the
    /// first failure; collect-all keeps going.
    pub fn validate_batch(
        &self,
        citations: &[Citation],
        bodies: &HashMap<MessageId, String>,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();
        for (i, citation) in citations.iter().enumerate() {
            let outcome = match bodies.get(&citation.message_id) {
                Some(body) => self.validate(citation, body),
                None => Err(CitationFault::UnknownMessage(citation.message_id.clone())),
            };
            match outcome {
                Ok(()) => report.passed += 1,
                Err(fault) => {
                    report.failures.push((i, fault));
                    if self.mode == ValidationMode::Strict {
                        break;
                    }
                }
            }
        }
        report
    }
}
