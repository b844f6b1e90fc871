//! Inter-session gap computation.
//!
//! A base delay is drawn uniformly from `[floor, ceiling]`, then scaled by:
//!
//! 1. `degradation_factor` when the latest session's success rate dropped by
//!    more than `degradation_points` against the one before it,
//! 2. `steady_state_factor` once `steady_state_after` sessions have completed,
//! 3. the caller's hint multiplier.
//!
//! Factors compose multiplicatively and the result is clamped to
//! `[min_secs, max_secs]` last.

use rand::Rng;

use crate::models::SessionRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct GapConfig {
    pub floor_secs: u64,
    pub ceiling_secs: u64,
    pub min_secs: u64,
    pub max_secs: u64,
    pub degradation_points: f64,
    pub degradation_factor: f64,
    pub steady_state_factor: f64,
    pub steady_state_after: usize,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            floor_secs: 30,
            ceiling_secs: 120,
            min_secs: 30,
            max_secs: 300,
            degradation_points: 10.0,
            degradation_factor: 3.0,
            steady_state_factor: 2.5,
            steady_state_after: 2,
        }
    }
}

/// A drop in success rate between the two most recent sessions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Degradation {
    pub previous_rate: f64,
    pub latest_rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct GapScheduler {
    config: GapConfig,
}

impl GapScheduler {
    pub fn new(config: GapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GapConfig {
        &self.config
    }

    pub fn next_gap(&self, sessions: &[SessionRecord], hint_multiplier: f64) -> u64 {
        self.next_gap_with_rng(sessions, hint_multiplier, &mut rand::rng())
    }

    pub fn next_gap_with_rng<R: Rng + ?Sized>(
        &self,
        sessions: &[SessionRecord],
        hint_multiplier: f64,
        rng: &mut R,
    ) -> u64 {
        let cfg = &self.config;
        let (lo, hi) = if cfg.floor_secs <= cfg.ceiling_secs {
            (cfg.floor_secs, cfg.ceiling_secs)
        } else {
            (cfg.ceiling_secs, cfg.floor_secs)
        };
        let base = rng.random_range(lo..=hi);
        self.scale(base, sessions, hint_multiplier)
    }

    /// Apply the multipliers and the clamp to an already-drawn base gap.
    pub fn scale(&self, base_secs: u64, sessions: &[SessionRecord], hint_multiplier: f64) -> u64 {
        let cfg = &self.config;
        let mut multiplier = 1.0;
        if self.degradation(sessions).is_some() {
            multiplier *= cfg.degradation_factor;
        }
        if sessions.len() >= cfg.steady_state_after {
            multiplier *= cfg.steady_state_factor;
        }
        multiplier *= sanitize_hint(hint_multiplier);

        let raw = base_secs as f64 * multiplier;
        let gap = if raw.is_finite() { raw as u64 } else { u64::MAX };
        gap.clamp(cfg.min_secs, cfg.max_secs.max(cfg.min_secs))
    }

    /// Detect a success-rate drop between the last two sessions.
    pub fn degradation(&self, sessions: &[SessionRecord]) -> Option<Degradation> {
        let [.., previous, latest] = sessions else {
            return None;
        };
        if latest.success_rate < previous.success_rate - self.config.degradation_points {
            Some(Degradation {
                previous_rate: previous.success_rate,
                latest_rate: latest.success_rate,
            })
        } else {
            None
        }
    }
}

/// Hints below 1.0 (or NaN) are treated as 1.0; the scheduler never shortens
/// the base gap on a caller's request.
fn sanitize_hint(hint: f64) -> f64 {
    if hint.is_nan() || hint < 1.0 {
        1.0
    } else {
        hint
    }
}
