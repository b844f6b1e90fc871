//! The multi-session harvest loop.
//!
//! For each session index the orchestrator plans a continuation, runs the
//! collector with a duplicate guard over the current corpus, merges what
//! came back, appends a [`SessionRecord`], persists the state and then
//! sleeps for a scheduler-chosen gap:
//!
//! ```text
//!   ┌──────────── target reached? ──── yes ──▶ stop
//!   │                  │ no
//!   │                  ▼
//!   │      ContinuationPlanner::plan
//!   │                  │
//!   │                  ▼
//!   │      Collector::collect ── Err ──▶ recovery sleep ─┐
//!   │                  │ Ok                              │
//!   │                  ▼                                 │
//!   │   merge ▸ record ▸ persist ▸ GapScheduler sleep    │
//!   └──────────────────┴─────────────────────────────────┘
//! ```
//!
//! Sessions never overlap. The corpus and the history are only mutated
//! here, after the collector has returned.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use smart_harvest_core::{
    ContinuationPlanner, ContinuationPoint, DuplicateCheck, DuplicateGuard, GapScheduler,
    GuardConfig, HarvestState, Item, MergeOutcome, SessionRecord,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::{CollectOutcome, Collector};
use crate::config::Config;
use crate::error::HarvestError;
use crate::progress::{HarvestEvent, HarvestObserver, NoProgress};
use crate::store::StateStore;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    SessionsExhausted,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::TargetReached => "target_reached",
            StopReason::SessionsExhausted => "sessions_exhausted",
            StopReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::TargetReached => "target corpus size reached",
            StopReason::SessionsExhausted => "all sessions used",
            StopReason::Cancelled => "cancelled",
        })
    }
}

/// Outcome of [`HarvestOrchestrator::run`].
#[derive(Debug, Clone)]
pub struct HarvestRun {
    pub state: HarvestState,
    pub stop_reason: StopReason,
    pub completed_sessions: usize,
    pub failed_sessions: usize,
    pub new_items: u64,
    pub elapsed: Duration,
}

/// Hands out session start times whose ids are strictly increasing, even
/// when two sessions start within the same millisecond or the wall clock
/// steps backwards.
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    last: Option<DateTime<Utc>>,
}

impl SessionClock {
    pub fn resume_after(last: Option<DateTime<Utc>>) -> Self {
        Self {
            last: last.map(|t| t.trunc_subsecs(3)),
        }
    }

    pub fn next_start(&mut self) -> DateTime<Utc> {
        self.next_start_at(Utc::now())
    }

    pub fn next_start_at(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut start = now.trunc_subsecs(3);
        if let Some(last) = self.last {
            if start <= last {
                start = last + TimeDelta::milliseconds(1);
            }
        }
        self.last = Some(start);
        start
    }
}

pub fn session_id(started_at: DateTime<Utc>) -> String {
    format!(
        "harvest_{}_{:03}",
        started_at.format("%Y%m%d_%H%M%S"),
        started_at.timestamp_subsec_millis()
    )
}

/// Gap multiplier requested by the orchestrator after session `index`.
pub fn hint_multiplier(index: usize, last_success_rate: f64) -> f64 {
    if index >= 2 {
        2.5
    } else if last_success_rate < 50.0 {
        2.0
    } else {
        1.0
    }
}

/// Duplicate guard that reports each consultation to the observer.
struct ObservedGuard<'a> {
    guard: DuplicateGuard<'a>,
    observer: &'a dyn HarvestObserver,
}

impl DuplicateCheck for ObservedGuard<'_> {
    fn should_continue(&self, items_so_far: &[Item]) -> bool {
        let verdict = self.guard.should_continue(items_so_far);
        self.observer.report(HarvestEvent::DuplicateCheck {
            items_so_far: items_so_far.len(),
            duplicates: self.guard.duplicates(items_so_far),
            continue_session: verdict,
        });
        verdict
    }
}

pub struct HarvestOrchestrator {
    collector: Arc<dyn Collector>,
    store: Arc<dyn StateStore>,
    planner: ContinuationPlanner,
    scheduler: GapScheduler,
    guard: GuardConfig,
    recovery_secs: (u64, u64),
    observer: Box<dyn HarvestObserver>,
    cancel: CancellationToken,
    rng: StdRng,
}

impl HarvestOrchestrator {
    pub fn new(collector: Arc<dyn Collector>, store: Arc<dyn StateStore>) -> Self {
        Self {
            collector,
            store,
            planner: ContinuationPlanner::default(),
            scheduler: GapScheduler::default(),
            guard: GuardConfig::default(),
            recovery_secs: (60, 180),
            observer: Box::new(NoProgress),
            cancel: CancellationToken::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Build an orchestrator with planner, scheduler, guard and recovery
    /// settings taken from the config file.
    pub fn from_config(
        config: &Config,
        collector: Arc<dyn Collector>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self::new(collector, store)
            .with_planner(ContinuationPlanner::new(config.planner.planner_config()))
            .with_scheduler(GapScheduler::new(config.schedule.gap_config()))
            .with_guard(config.guard.guard_config())
            .with_recovery(
                config.schedule.recovery_min_secs,
                config.schedule.recovery_max_secs,
            )
    }

    pub fn with_planner(mut self, planner: ContinuationPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_scheduler(mut self, scheduler: GapScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_guard(mut self, guard: GuardConfig) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_recovery(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.recovery_secs = (min_secs.min(max_secs), min_secs.max(max_secs));
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn HarvestObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Make offsets, scroll budgets and gaps reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run up to `num_sessions` sessions or until the corpus holds
    /// `target_corpus_size` items.
    ///
    /// Collector failures are absorbed: they are logged, cost a recovery
    /// sleep and the loop moves on. Unreadable state, a failed save or an
    /// invalid plan end the run with an error.
    pub async fn run(
        &mut self,
        num_sessions: usize,
        target_corpus_size: usize,
    ) -> Result<HarvestRun, HarvestError> {
        if num_sessions == 0 {
            return Err(HarvestError::Config("number of sessions must be > 0".into()));
        }
        if target_corpus_size == 0 {
            return Err(HarvestError::Config("target corpus size must be > 0".into()));
        }

        let started = tokio::time::Instant::now();
        let mut state = self.store.load()?;
        let mut clock = SessionClock::resume_after(state.sessions().last().map(|s| s.started_at));
        let mut completed_sessions = 0;
        let mut failed_sessions = 0;
        let mut new_items = 0u64;

        info!(
            collector = self.collector.name(),
            sessions = num_sessions,
            target = target_corpus_size,
            corpus = state.corpus().size(),
            history = state.sessions().len(),
            "starting harvest"
        );

        let stop_reason = 'sessions: {
            for index in 0..num_sessions {
                if self.cancel.is_cancelled() {
                    break 'sessions StopReason::Cancelled;
                }
                if state.corpus().size() >= target_corpus_size {
                    break 'sessions StopReason::TargetReached;
                }

                let continuation = self.planner.plan_with_rng(
                    index,
                    state.corpus(),
                    state.sessions(),
                    &mut self.rng,
                );
                continuation.validate()?;
                info!(
                    session = index + 1,
                    strategy = %continuation.strategy(),
                    offset = continuation.position_offset(),
                    "{}",
                    continuation.reasoning()
                );
                self.observer.report(HarvestEvent::SessionStarted {
                    index,
                    total: num_sessions,
                    strategy: continuation.strategy().to_string(),
                    reasoning: continuation.reasoning().to_string(),
                });

                let started_at = clock.next_start();
                let collected = {
                    let guard = ObservedGuard {
                        guard: DuplicateGuard::new(state.corpus(), self.guard),
                        observer: self.observer.as_ref(),
                    };
                    self.collector.collect(&continuation, &guard).await
                };
                let is_last = index + 1 == num_sessions;

                let outcome = match collected {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        failed_sessions += 1;
                        warn!(session = index + 1, error = %format!("{:#}", e), "session failed");
                        self.observer.report(HarvestEvent::SessionFailed {
                            index,
                            error: format!("{:#}", e),
                        });
                        if !is_last {
                            let (lo, hi) = self.recovery_secs;
                            let secs = self.rng.random_range(lo..=hi);
                            self.observer.report(HarvestEvent::Cooldown {
                                secs,
                                recovery: true,
                            });
                            if !self.pause(secs).await {
                                break 'sessions StopReason::Cancelled;
                            }
                        }
                        continue;
                    }
                };

                log_continuation_analysis(&continuation, &outcome);
                let record = absorb(&mut state, started_at, continuation, outcome);
                record.validate()?;
                let fresh = record.new_items;
                state.record_session(record.clone());
                self.store.save(&state)?;

                completed_sessions += 1;
                new_items += fresh;
                info!(
                    session = %record.session_id,
                    items = record.items_found,
                    new = fresh,
                    success_rate = %format!("{:.1}", record.success_rate),
                    corpus = state.corpus().size(),
                    "session complete"
                );
                self.observer.report(HarvestEvent::SessionCompleted {
                    corpus_size: state.corpus().size(),
                    record: record.clone(),
                });

                if self.cancel.is_cancelled() {
                    break 'sessions StopReason::Cancelled;
                }
                if state.corpus().size() >= target_corpus_size {
                    break 'sessions StopReason::TargetReached;
                }
                if is_last {
                    continue;
                }

                let hint = hint_multiplier(index, record.success_rate);
                let gap = self
                    .scheduler
                    .next_gap_with_rng(state.sessions(), hint, &mut self.rng);
                if let Some(drop) = self.scheduler.degradation(state.sessions()) {
                    warn!(
                        previous = drop.previous_rate,
                        latest = drop.latest_rate,
                        "success rate dropped, backing off"
                    );
                }

                // Planning draws from the same generator, so a clone shows
                // exactly what the next iteration will do.
                let mut preview_rng = self.rng.clone();
                let next = self.planner.plan_with_rng(
                    index + 1,
                    state.corpus(),
                    state.sessions(),
                    &mut preview_rng,
                );
                info!(
                    next_session = index + 2,
                    strategy = %next.strategy(),
                    offset = next.position_offset(),
                    gap_secs = gap,
                    "next: {}",
                    next.reasoning()
                );

                self.observer.report(HarvestEvent::Cooldown {
                    secs: gap,
                    recovery: false,
                });
                if !self.pause(gap).await {
                    break 'sessions StopReason::Cancelled;
                }
            }
            StopReason::SessionsExhausted
        };

        info!(
            reason = stop_reason.as_str(),
            completed = completed_sessions,
            failed = failed_sessions,
            new_items,
            corpus = state.corpus().size(),
            "harvest finished"
        );
        self.observer.report(HarvestEvent::Stopped {
            reason: stop_reason,
        });

        Ok(HarvestRun {
            state,
            stop_reason,
            completed_sessions,
            failed_sessions,
            new_items,
            elapsed: started.elapsed(),
        })
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, secs: u64) -> bool {
        debug!(secs, "sleeping before next session");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}

/// Merge a session's items into the state and build its record.
fn absorb(
    state: &mut HarvestState,
    started_at: DateTime<Utc>,
    continuation: ContinuationPoint,
    outcome: CollectOutcome,
) -> SessionRecord {
    let items_found = outcome.items_found();
    let success_rate = outcome.success_rate();
    let mut new_items = 0;
    for collected in outcome.items {
        if state.merge(collected.item) == MergeOutcome::New {
            new_items += 1;
        }
    }
    SessionRecord {
        session_id: session_id(started_at),
        started_at,
        items_found,
        new_items,
        success_rate,
        duration_seconds: outcome.duration_seconds.max(0.0),
        continuation,
        score: outcome.quality_score,
    }
}

/// How well the continuation worked, logged after every session.
fn log_continuation_analysis(continuation: &ContinuationPoint, outcome: &CollectOutcome) {
    let offset = continuation.position_offset();
    if offset > 0 {
        let scrolls = offset + continuation.scroll_budget();
        let efficiency = outcome.items_found() as f64 / f64::from(scrolls.max(1));
        debug!(
            offset,
            efficiency = %format!("{:.2}", efficiency),
            "items per scroll"
        );
    }
    if let Some(anchor) = continuation.anchor_identity() {
        let hit = outcome.items.iter().any(|c| c.item.identity == anchor);
        debug!(anchor, hit, "anchor re-appeared in results");
    }
    if let Some(bucket) = continuation.target_age_bucket() {
        let matches = outcome
            .items
            .iter()
            .filter(|c| c.item.date_bucket.as_deref() == Some(bucket))
            .count();
        debug!(bucket, matches, "items in targeted age bucket");
    }
    if outcome.stopped_early {
        debug!("session ended early on duplicates");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_policy() {
        assert_eq!(hint_multiplier(0, 100.0), 1.0);
        assert_eq!(hint_multiplier(0, 49.9), 2.0);
        assert_eq!(hint_multiplier(1, 10.0), 2.0);
        assert_eq!(hint_multiplier(1, 50.0), 1.0);
        assert_eq!(hint_multiplier(2, 100.0), 2.5);
        assert_eq!(hint_multiplier(7, 0.0), 2.5);
    }

    #[test]
    fn session_ids_are_strictly_increasing() {
        let t: DateTime<Utc> = "2026-10-18T10:15:00.123456Z".parse().unwrap();
        let mut clock = SessionClock::default();
        let a = clock.next_start_at(t);
        let b = clock.next_start_at(t);
        let c = clock.next_start_at(t - TimeDelta::seconds(5));
        assert_eq!(session_id(a), "harvest_20261018_101500_123");
        assert_eq!(session_id(b), "harvest_20261018_101500_124");
        assert_eq!(session_id(c), "harvest_20261018_101500_125");
        assert!(session_id(a) < session_id(b) && session_id(b) < session_id(c));
    }

    #[test]
    fn clock_resumes_after_persisted_history() {
        let last: DateTime<Utc> = "2026-10-18T10:15:00.999Z".parse().unwrap();
        let mut clock = SessionClock::resume_after(Some(last));
        let next = clock.next_start_at("2026-10-18T10:14:00Z".parse().unwrap());
        assert_eq!(session_id(next), "harvest_20261018_101501_000");
    }

    #[test]
    fn absorb_counts_new_and_duplicate_items() {
        use crate::collector::CollectedItem;

        let mut state = HarvestState::new();
        state.merge(Item::new("known"));
        let outcome = CollectOutcome {
            items: vec![
                CollectedItem {
                    item: Item::new("known"),
                    proper_title: true,
                },
                CollectedItem {
                    item: Item::new("fresh"),
                    proper_title: false,
                },
            ],
            duration_seconds: 3.0,
            quality_score: 9,
            stopped_early: false,
        };
        let started_at = Utc::now();
        let record = absorb(
            &mut state,
            started_at,
            ContinuationPoint::fresh_start(),
            outcome,
        );
        assert_eq!(record.items_found, 2);
        assert_eq!(record.new_items, 1);
        assert!((record.success_rate - 50.0).abs() < 1e-9);
        assert_eq!(record.score, 9);
        assert_eq!(state.corpus().size(), 2);
    }
}
