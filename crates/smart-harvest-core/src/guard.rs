//! Early-termination check for sessions that mostly re-discover the corpus.

use crate::corpus::Corpus;
use crate::models::Item;

/// Callback a collector consults periodically while a session runs.
///
/// Returning `false` asks the collector to stop the session early and hand
/// back what it has so far.
pub trait DuplicateCheck: Send + Sync {
    fn should_continue(&self, items_so_far: &[Item]) -> bool;
}

impl<F> DuplicateCheck for F
where
    F: Fn(&[Item]) -> bool + Send + Sync,
{
    fn should_continue(&self, items_so_far: &[Item]) -> bool {
        self(items_so_far)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardConfig {
    /// Below this many items the guard always lets the session continue.
    pub min_sample: usize,
    /// Stop once this fraction of the sample is already in the corpus.
    pub duplicate_threshold: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_sample: 20,
            duplicate_threshold: 0.8,
        }
    }
}

/// Compares the current session's items against a read-only corpus.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateGuard<'a> {
    corpus: &'a Corpus,
    config: GuardConfig,
}

impl<'a> DuplicateGuard<'a> {
    pub fn new(corpus: &'a Corpus, config: GuardConfig) -> Self {
        Self { corpus, config }
    }

    /// Number of items already present in the corpus.
    pub fn duplicates(&self, items: &[Item]) -> usize {
        items
            .iter()
            .filter(|item| self.corpus.contains(&item.identity))
            .count()
    }

    pub fn duplicate_ratio(&self, items: &[Item]) -> f64 {
        if items.is_empty() {
            return 0.0;
        }
        self.duplicates(items) as f64 / items.len() as f64
    }

    pub fn should_continue(&self, items_so_far: &[Item]) -> bool {
        if items_so_far.len() < self.config.min_sample {
            return true;
        }
        self.duplicate_ratio(items_so_far) < self.config.duplicate_threshold
    }
}

impl DuplicateCheck for DuplicateGuard<'_> {
    fn should_continue(&self, items_so_far: &[Item]) -> bool {
        DuplicateGuard::should_continue(self, items_so_far)
    }
}
