//! Continuation planning: where the next session should start.
//!
//! Strategy choice is fully determined by the session index, the corpus and
//! the session history. Only offset and scroll-budget magnitudes are random,
//! and they are always drawn from bounded ranges.
//!
//! | index | strategy | offset |
//! |-------|----------|--------|
//! | 0 | `FreshStart` | 0 |
//! | 1 | `ScrollOffset` | random in `[10, 15]` |
//! | ≥2, corpus has aged items | `VideoAnchor` | `min(index × 12, 50)` |
//! | ≥2, history has a target bucket | `DateAnchor` | `index × 8` |
//! | otherwise | `DeepScroll` | `index × 10` |

use rand::Rng;

use crate::age::age_priority;
use crate::corpus::Corpus;
use crate::models::{ContinuationPoint, Item, SessionPriority, SessionRecord};

/// Tunable planning policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    /// Rank (0.0 = most recent, 1.0 = oldest) of the anchor among aged items.
    pub anchor_percentile: f64,
    pub scroll_offset_min: u32,
    pub scroll_offset_max: u32,
    pub anchor_offset_step: u32,
    pub anchor_offset_cap: u32,
    pub date_offset_step: u32,
    pub deep_offset_step: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            anchor_percentile: 0.5,
            scroll_offset_min: 10,
            scroll_offset_max: 15,
            anchor_offset_step: 12,
            anchor_offset_cap: 50,
            date_offset_step: 8,
            deep_offset_step: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContinuationPlanner {
    config: PlannerConfig,
}

impl ContinuationPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan session `session_index` using the thread-local RNG.
    pub fn plan(
        &self,
        session_index: usize,
        corpus: &Corpus,
        sessions: &[SessionRecord],
    ) -> ContinuationPoint {
        self.plan_with_rng(session_index, corpus, sessions, &mut rand::rng())
    }

    pub fn plan_with_rng<R: Rng + ?Sized>(
        &self,
        session_index: usize,
        corpus: &Corpus,
        sessions: &[SessionRecord],
        rng: &mut R,
    ) -> ContinuationPoint {
        let cfg = &self.config;
        let index = u32::try_from(session_index).unwrap_or(u32::MAX);
        let label = session_index.saturating_add(1);

        let point = match session_index {
            0 => ContinuationPoint::fresh_start()
                .with_reasoning(format!("Session {}: fresh start from the top", label)),
            1 => {
                let (lo, hi) = ordered(cfg.scroll_offset_min, cfg.scroll_offset_max);
                let offset = rng.random_range(lo..=hi);
                ContinuationPoint::scroll_offset(offset).with_reasoning(format!(
                    "Session {}: start at scroll {} to avoid overlap",
                    label, offset
                ))
            }
            _ => {
                if let Some(anchor) = self.select_anchor(corpus) {
                    let offset = index
                        .saturating_mul(cfg.anchor_offset_step)
                        .min(cfg.anchor_offset_cap);
                    let bucket = anchor.known_age_bucket().unwrap_or_default().to_string();
                    ContinuationPoint::video_anchor(offset, anchor.identity.clone(), bucket.clone())
                        .with_reasoning(format!(
                            "Session {}: continue from {} ({})",
                            label,
                            short_id(&anchor.identity),
                            bucket
                        ))
                } else if let Some(bucket) = least_recent_target(sessions) {
                    let offset = index.saturating_mul(cfg.date_offset_step);
                    ContinuationPoint::date_anchor(offset, bucket.to_string()).with_reasoning(
                        format!("Session {}: target {} content", label, bucket),
                    )
                } else {
                    let offset = index.saturating_mul(cfg.deep_offset_step);
                    ContinuationPoint::deep_scroll(offset).with_reasoning(format!(
                        "Session {}: deep scroll continuation",
                        label
                    ))
                }
            }
        };

        let (lo, hi) = point.strategy().scroll_budget_range();
        let priority = if session_index < 2 {
            SessionPriority::Quality
        } else {
            SessionPriority::Coverage
        };
        point
            .with_scroll_budget(rng.random_range(lo..=hi))
            .with_priority(priority)
    }

    /// Pick the item at the configured age percentile among aged items.
    ///
    /// Items are ordered by age priority, ties broken by identity so the
    /// choice does not depend on corpus iteration order.
    pub fn select_anchor<'c>(&self, corpus: &'c Corpus) -> Option<&'c Item> {
        let mut aged: Vec<(u32, &Item)> = corpus
            .items()
            .filter_map(|item| item.known_age_bucket().map(|b| (age_priority(b), item)))
            .collect();
        if aged.is_empty() {
            return None;
        }
        aged.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.identity.cmp(&b.1.identity)));

        let p = self.config.anchor_percentile.clamp(0.0, 1.0);
        let rank = ((p * aged.len() as f64).floor() as usize).min(aged.len() - 1);
        Some(aged[rank].1)
    }
}

/// The oldest target bucket any previous session aimed for.
fn least_recent_target(sessions: &[SessionRecord]) -> Option<&str> {
    let mut best: Option<(u32, &str)> = None;
    for bucket in sessions
        .iter()
        .filter_map(|s| s.continuation.target_age_bucket())
        .filter(|b| !b.trim().is_empty())
    {
        let priority = age_priority(bucket);
        match best {
            Some((p, _)) if priority <= p => {}
            _ => best = Some((priority, bucket)),
        }
    }
    best.map(|(_, bucket)| bucket)
}

fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn short_id(identity: &str) -> String {
    let chars: Vec<char> = identity.chars().collect();
    if chars.len() <= 8 {
        identity.to_string()
    } else {
        let tail: String = chars[chars.len() - 8..].iter().collect();
        format!("…{}", tail)
    }
}
