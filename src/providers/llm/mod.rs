//! LLM summarization seam.

mod traits;

pub use traits::{
    AggregateRequest, AggregatedDigest, AggregatedItem, Summarizer, SummarizerError,
    SummarizerResult, ThreadSummaryRequest,
};
