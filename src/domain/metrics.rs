//! Per-run metrics counters.
//!
//! One [`RunMetrics`] instance is created per digest run and passed
//! explicitly into every stage — never a global. The summarization stage
//! updates it from concurrent tasks, so counters are atomics; everything
//! else increments from the single run thread. `snapshot()` freezes the
//! counters into a serializable record for the output artifact.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Mutable counters for one digest run.
#[derive(Debug, Default)]
pub struct RunMetrics {
    /// Threads successfully summarized.
    pub threads_summarized: AtomicU64,
    /// Threads that bypassed summarization (too few chunks).
    pub threads_bypassed: AtomicU64,
    /// Threads degraded after a summarization timeout.
    pub timeouts: AtomicU64,
    /// Threads degraded after a summarization error.
    pub errors: AtomicU64,
    /// Threads dropped during chunking.
    pub chunking_failures: AtomicU64,
    /// Grounding items repaired from their evidence chunk.
    pub grounding_repaired: AtomicU64,
    /// Grounding items rejected for lack of evidence.
    pub grounding_rejected: AtomicU64,
    /// Tokens admitted by the selector.
    pub tokens_selected: AtomicU64,
    /// Token budget the selector ran under.
    pub token_budget: AtomicU64,
    /// Tokens evicted by the shrink pass.
    pub shrink_dropped_tokens: AtomicU64,
    /// Qualifying chunks discarded for cap/budget reasons.
    pub discarded_qualifying: AtomicU64,
    /// Distinct threads covered by the final selection.
    pub threads_covered: AtomicU64,
    /// Citations successfully built.
    pub citations_built: AtomicU64,
    /// Citation lookups that found no match and were omitted.
    pub citations_missed: AtomicU64,
}

impl RunMetrics {
    /// Creates a fresh, zeroed metrics instance for one run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Increments a counter by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Freezes the counters into a serializable snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let tokens_selected = self.tokens_selected.load(Ordering::Relaxed);
        let token_budget = self.token_budget.load(Ordering::Relaxed);
        let shrink_dropped_tokens = self.shrink_dropped_tokens.load(Ordering::Relaxed);
        let admitted = tokens_selected + shrink_dropped_tokens;
        let shrink_pct = if admitted == 0 {
            0.0
        } else {
            shrink_dropped_tokens as f64 / admitted as f64 * 100.0
        };

        MetricsSnapshot {
            threads_summarized: self.threads_summarized.load(Ordering::Relaxed),
            threads_bypassed: self.threads_bypassed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            chunking_failures: self.chunking_failures.load(Ordering::Relaxed),
            grounding_repaired: self.grounding_repaired.load(Ordering::Relaxed),
            grounding_rejected: self.grounding_rejected.load(Ordering::Relaxed),
            tokens_selected,
            token_budget,
            shrink_pct,
            discarded_qualifying: self.discarded_qualifying.load(Ordering::Relaxed),
            threads_covered: self.threads_covered.load(Ordering::Relaxed),
            citations_built: self.citations_built.load(Ordering::Relaxed),
            citations_missed: self.citations_missed.load(Ordering::Relaxed),
        }
    }
}

/// Frozen metrics for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub threads_summarized: u64,
    pub threads_bypassed: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub chunking_failures: u64,
    pub grounding_repaired: u64,
    pub grounding_rejected: u64,
    pub tokens_selected: u64,
    pub token_budget: u64,
    /// Percentage of admitted tokens evicted by the shrink pass.
    pub shrink_pct: f64,
    pub discarded_qualifying: u64,
    pub threads_covered: u64,
    pub citations_built: u64,
    pub citations_missed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fresh_metrics_are_zero() {
        let metrics = RunMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn shrink_pct_from_token_counters() {
        let metrics = RunMetrics::new();
        RunMetrics::add(&metrics.tokens_selected, 900);
        RunMetrics::add(&metrics.shrink_dropped_tokens, 100);
        let snapshot = metrics.snapshot();
        assert!((snapshot.shrink_pct - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn one_heavy_eviction_dominates_shrink_pct() {
        // A single dropped chunk worth 1000 tokens against 2000 kept
        // tokens is a third of the admitted volume.
        let metrics = RunMetrics::new();
        RunMetrics::add(&metrics.tokens_selected, 2_000);
        RunMetrics::add(&metrics.shrink_dropped_tokens, 1_000);
        let snapshot = metrics.snapshot();
        assert!((snapshot.shrink_pct - 100.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn concurrent_increments() {
        let metrics = Arc::new(RunMetrics::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    RunMetrics::incr(&m.timeouts);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(metrics.snapshot().timeouts, 800);
    }

    #[test]
    fn snapshot_serialization() {
        let metrics = RunMetrics::new();
        RunMetrics::incr(&metrics.threads_summarized);
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.threads_summarized, 1);
    }
}
