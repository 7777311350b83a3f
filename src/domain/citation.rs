//! Citation value type.
//!
//! A citation is a verifiable pointer from a digest item back to an exact
//! span of a message's normalized body. The builder and validator live in
//! [`crate::engine::citations`]; this module only carries the value and
//! its size cap.

use serde::{Deserialize, Serialize};

use super::MessageId;

/// Maximum preview length in bytes.
pub const PREVIEW_MAX_LEN: usize = 200;

/// A verifiable pointer to a span of source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Message the span lives in.
    pub message_id: MessageId,
    /// Byte offset of the span start in the normalized body.
    pub start: usize,
    /// Byte offset one past the span end.
    pub end: usize,
    /// First bytes of the span, at most [`PREVIEW_MAX_LEN`].
    pub preview: String,
    /// Base64 SHA-256 checksum of the full normalized body, used to
    /// detect silent upstream drift of the source text.
    pub checksum: String,
}

impl Citation {
    /// Length of the cited span in bytes.
    pub fn span_len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_len() {
        let citation = Citation {
            message_id: MessageId::from("m1"),
            start: 10,
            end: 32,
            preview: "the cited text".to_string(),
            checksum: "abc=".to_string(),
        };
        assert_eq!(citation.span_len(), 22);
    }

    #[test]
    fn citation_serialization() {
        let citation = Citation {
            message_id: MessageId::from("m1"),
            start: 0,
            end: 5,
            preview: "hello".to_string(),
            checksum: "xyz=".to_string(),
        };
        let json = serde_json::to_string(&citation).unwrap();
        let back: Citation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, citation);
    }
}
