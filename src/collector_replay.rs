//! Collector that replays recorded session batches from a JSON fixture.
//!
//! ```json
//! { "sessions": [
//!     { "items": [ {"id": "a", "title": "Clip"} ], "score": 40 },
//!     { "fail": true },
//!     { "items": [], "score": 0, "duration_seconds": 12.5 }
//! ] }
//! ```
//!
//! Batch N is served on the N-th call. Once the fixture is exhausted every
//! further call returns an empty outcome.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use smart_harvest_core::{ContinuationPoint, DuplicateCheck, Item, TitleClassifier};
use tracing::debug;

use crate::collector::{due_for_check, CollectOutcome, Collector, RawItem};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayFixture {
    #[serde(default)]
    pub sessions: Vec<ReplayBatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayBatch {
    #[serde(default)]
    pub items: Vec<RawItem>,
    #[serde(default)]
    pub score: i64,
    /// Simulate a transient collector failure for this call.
    #[serde(default)]
    pub fail: bool,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

pub struct ReplayCollector {
    fixture: ReplayFixture,
    cursor: AtomicUsize,
    classifier: TitleClassifier,
    check_every: usize,
}

impl ReplayCollector {
    pub fn new(fixture: ReplayFixture, classifier: TitleClassifier, check_every: usize) -> Self {
        Self {
            fixture,
            cursor: AtomicUsize::new(0),
            classifier,
            check_every,
        }
    }

    pub fn from_file(path: &Path, classifier: TitleClassifier, check_every: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay fixture: {}", path.display()))?;
        let fixture: ReplayFixture = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse replay fixture: {}", path.display()))?;
        Ok(Self::new(fixture, classifier, check_every))
    }

    /// Number of calls served so far.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for ReplayCollector {
    fn name(&self) -> &str {
        "replay"
    }

    async fn collect(
        &self,
        continuation: &ContinuationPoint,
        duplicate_check: &dyn DuplicateCheck,
    ) -> Result<CollectOutcome> {
        let started = Instant::now();
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(batch) = self.fixture.sessions.get(index) else {
            debug!(call = index, "replay fixture exhausted");
            return Ok(CollectOutcome::default());
        };
        if batch.fail {
            bail!("replayed failure for call {}", index + 1);
        }
        debug!(
            call = index,
            strategy = %continuation.strategy(),
            items = batch.items.len(),
            "replaying batch"
        );

        let mut outcome = CollectOutcome {
            quality_score: batch.score,
            ..CollectOutcome::default()
        };
        let mut seen: Vec<Item> = Vec::with_capacity(batch.items.len());
        for raw in &batch.items {
            let collected = raw.clone().into_collected(&self.classifier)?;
            seen.push(collected.item.clone());
            outcome.items.push(collected);
            if due_for_check(seen.len(), self.check_every)
                && !duplicate_check.should_continue(&seen)
            {
                outcome.stopped_early = true;
                break;
            }
        }
        outcome.duration_seconds = batch
            .duration_seconds
            .unwrap_or_else(|| started.elapsed().as_secs_f64());
        Ok(outcome)
    }
}
