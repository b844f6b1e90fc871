//! Core data models shared by the planner, scheduler, guard and orchestrator.
//!
//! [`ContinuationPoint`] is a closed type: it can only be built through the
//! per-strategy constructors or by deserializing a record that passes
//! [`ContinuationPoint::validate`], so a `VideoAnchor` without an anchor
//! identity cannot exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::corpus::{Corpus, MergeOutcome};

/// A single collected record (one video), keyed by `identity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub identity: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Coarse relative-age label such as `"3 years ago"`. Never a timestamp.
    #[serde(default)]
    pub date_bucket: Option<String>,
    #[serde(default)]
    pub engagement_count: u64,
}

impl Item {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            title: None,
            date_bucket: None,
            engagement_count: 0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_date_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.date_bucket = Some(bucket.into());
        self
    }

    pub fn with_engagement(mut self, count: u64) -> Self {
        self.engagement_count = count;
        self
    }

    /// The age bucket, if present and non-blank.
    pub fn known_age_bucket(&self) -> Option<&str> {
        self.date_bucket
            .as_deref()
            .filter(|bucket| !bucket.trim().is_empty())
    }
}

/// How a session positions itself within the source's content stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FreshStart,
    ScrollOffset,
    VideoAnchor,
    DateAnchor,
    DeepScroll,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FreshStart => "fresh_start",
            Strategy::ScrollOffset => "scroll_offset",
            Strategy::VideoAnchor => "video_anchor",
            Strategy::DateAnchor => "date_anchor",
            Strategy::DeepScroll => "deep_scroll",
        }
    }

    /// Extra depth the collector should plan for beyond the start offset.
    pub fn depth_margin(&self) -> u32 {
        match self {
            Strategy::FreshStart => 0,
            Strategy::ScrollOffset => 20,
            Strategy::VideoAnchor | Strategy::DateAnchor => 15,
            Strategy::DeepScroll => 25,
        }
    }

    /// Inclusive range of scrolls a session using this strategy should budget.
    pub fn scroll_budget_range(&self) -> (u32, u32) {
        match self {
            Strategy::FreshStart => (18, 22),
            Strategy::ScrollOffset => (16, 20),
            Strategy::VideoAnchor | Strategy::DeepScroll => (12, 16),
            Strategy::DateAnchor => (15, 20),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a session favours extraction quality or breadth of coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPriority {
    #[default]
    Quality,
    Coverage,
}

/// A broken structural invariant. Always a logic bug, never an
/// environmental condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("{strategy} continuation must carry an anchor identity")]
    MissingAnchor { strategy: Strategy },
    #[error("{strategy} continuation cannot carry an anchor identity")]
    UnexpectedAnchor { strategy: Strategy },
    #[error("{strategy} continuation must carry a target age bucket")]
    MissingAgeBucket { strategy: Strategy },
    #[error("{strategy} continuation cannot carry a target age bucket")]
    UnexpectedAgeBucket { strategy: Strategy },
    #[error("fresh start must begin at offset 0, got {offset}")]
    FreshStartOffset { offset: u32 },
    #[error("expected depth {depth} is shallower than start offset {offset}")]
    DepthBeforeOffset { depth: u32, offset: u32 },
    #[error("age filter active without a target age bucket")]
    FilterWithoutBucket,
    #[error("success rate {0} outside [0, 100]")]
    SuccessRate(f64),
    #[error("negative session duration {0}")]
    NegativeDuration(f64),
}

/// Where and how the next session should resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContinuationPoint", into = "RawContinuationPoint")]
pub struct ContinuationPoint {
    strategy: Strategy,
    reasoning: String,
    position_offset: u32,
    anchor_identity: Option<String>,
    target_age_bucket: Option<String>,
    expected_depth: u32,
    age_filter_active: bool,
    scroll_budget: u32,
    priority: SessionPriority,
}

impl ContinuationPoint {
    fn base(strategy: Strategy, position_offset: u32) -> Self {
        Self {
            strategy,
            reasoning: String::new(),
            position_offset,
            anchor_identity: None,
            target_age_bucket: None,
            expected_depth: position_offset.saturating_add(strategy.depth_margin()),
            age_filter_active: false,
            scroll_budget: 0,
            priority: SessionPriority::Quality,
        }
    }

    pub fn fresh_start() -> Self {
        Self::base(Strategy::FreshStart, 0)
    }

    pub fn scroll_offset(offset: u32) -> Self {
        Self::base(Strategy::ScrollOffset, offset)
    }

    pub fn video_anchor(offset: u32, anchor_identity: String, age_bucket: String) -> Self {
        let mut point = Self::base(Strategy::VideoAnchor, offset);
        point.anchor_identity = Some(anchor_identity);
        point.target_age_bucket = Some(age_bucket);
        point.age_filter_active = true;
        point
    }

    pub fn date_anchor(offset: u32, age_bucket: String) -> Self {
        let mut point = Self::base(Strategy::DateAnchor, offset);
        point.target_age_bucket = Some(age_bucket);
        point.age_filter_active = true;
        point
    }

    pub fn deep_scroll(offset: u32) -> Self {
        Self::base(Strategy::DeepScroll, offset)
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_scroll_budget(mut self, scrolls: u32) -> Self {
        self.scroll_budget = scrolls;
        self
    }

    pub fn with_priority(mut self, priority: SessionPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Human-readable explanation of the choice. Diagnostic only.
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn position_offset(&self) -> u32 {
        self.position_offset
    }

    pub fn anchor_identity(&self) -> Option<&str> {
        self.anchor_identity.as_deref()
    }

    pub fn target_age_bucket(&self) -> Option<&str> {
        self.target_age_bucket.as_deref()
    }

    /// Advisory depth the collector should expect to reach.
    pub fn expected_depth(&self) -> u32 {
        self.expected_depth
    }

    pub fn age_filter_active(&self) -> bool {
        self.age_filter_active
    }

    pub fn scroll_budget(&self) -> u32 {
        self.scroll_budget
    }

    pub fn priority(&self) -> SessionPriority {
        self.priority
    }

    /// Check the strategy-specific field invariants.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let strategy = self.strategy;
        match (strategy, self.anchor_identity.is_some()) {
            (Strategy::VideoAnchor, false) => {
                return Err(InvariantViolation::MissingAnchor { strategy })
            }
            (Strategy::VideoAnchor, true) | (_, false) => {}
            (_, true) => return Err(InvariantViolation::UnexpectedAnchor { strategy }),
        }
        let anchored = matches!(strategy, Strategy::VideoAnchor | Strategy::DateAnchor);
        match (anchored, self.target_age_bucket.is_some()) {
            (true, false) => return Err(InvariantViolation::MissingAgeBucket { strategy }),
            (false, true) => return Err(InvariantViolation::UnexpectedAgeBucket { strategy }),
            _ => {}
        }
        if strategy == Strategy::FreshStart && self.position_offset != 0 {
            return Err(InvariantViolation::FreshStartOffset {
                offset: self.position_offset,
            });
        }
        if self.expected_depth < self.position_offset {
            return Err(InvariantViolation::DepthBeforeOffset {
                depth: self.expected_depth,
                offset: self.position_offset,
            });
        }
        if self.age_filter_active && self.target_age_bucket.is_none() {
            return Err(InvariantViolation::FilterWithoutBucket);
        }
        Ok(())
    }
}

/// Flat wire form of [`ContinuationPoint`]; validated on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawContinuationPoint {
    strategy: Strategy,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    position_offset: u32,
    #[serde(default)]
    anchor_identity: Option<String>,
    #[serde(default)]
    target_age_bucket: Option<String>,
    #[serde(default)]
    expected_depth: u32,
    #[serde(default)]
    age_filter_active: bool,
    #[serde(default)]
    scroll_budget: u32,
    #[serde(default)]
    priority: SessionPriority,
}

impl TryFrom<RawContinuationPoint> for ContinuationPoint {
    type Error = InvariantViolation;

    fn try_from(raw: RawContinuationPoint) -> Result<Self, Self::Error> {
        let point = ContinuationPoint {
            strategy: raw.strategy,
            reasoning: raw.reasoning,
            position_offset: raw.position_offset,
            anchor_identity: raw.anchor_identity,
            target_age_bucket: raw.target_age_bucket,
            expected_depth: raw.expected_depth,
            age_filter_active: raw.age_filter_active,
            scroll_budget: raw.scroll_budget,
            priority: raw.priority,
        };
        point.validate()?;
        Ok(point)
    }
}

impl From<ContinuationPoint> for RawContinuationPoint {
    fn from(point: ContinuationPoint) -> Self {
        RawContinuationPoint {
            strategy: point.strategy,
            reasoning: point.reasoning,
            position_offset: point.position_offset,
            anchor_identity: point.anchor_identity,
            target_age_bucket: point.target_age_bucket,
            expected_depth: point.expected_depth,
            age_filter_active: point.age_filter_active,
            scroll_budget: point.scroll_budget,
            priority: point.priority,
        }
    }
}

/// Log entry for one completed session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub items_found: u64,
    /// Items from this session that were new to the corpus.
    #[serde(default)]
    pub new_items: u64,
    /// Percentage of items with a proper (non-fallback) title.
    pub success_rate: f64,
    pub duration_seconds: f64,
    pub continuation: ContinuationPoint,
    pub score: i64,
}

impl SessionRecord {
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if !(0.0..=100.0).contains(&self.success_rate) {
            return Err(InvariantViolation::SuccessRate(self.success_rate));
        }
        if self.duration_seconds.is_nan() || self.duration_seconds < 0.0 {
            return Err(InvariantViolation::NegativeDuration(self.duration_seconds));
        }
        self.continuation.validate()
    }
}

/// Aggregate counters carried alongside the corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub sessions_run: u64,
    pub items_seen_total: u64,
    pub total_time_secs: f64,
    pub total_score: i64,
    pub best_session_score: i64,
    pub average_success_rate: f64,
}

/// Everything the orchestrator persists between sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestState {
    corpus: Corpus,
    sessions: Vec<SessionRecord>,
    totals: Totals,
    last_run: Option<DateTime<Utc>>,
}

impl HarvestState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state from persisted parts without recomputing totals.
    pub fn from_parts(
        corpus: Corpus,
        sessions: Vec<SessionRecord>,
        totals: Totals,
        last_run: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            corpus,
            sessions,
            totals,
            last_run,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    pub fn merge(&mut self, item: Item) -> MergeOutcome {
        self.corpus.merge(item)
    }

    /// Append a finished session and fold it into the totals.
    pub fn record_session(&mut self, record: SessionRecord) {
        let totals = &mut self.totals;
        totals.sessions_run += 1;
        totals.items_seen_total += record.items_found;
        totals.total_time_secs += record.duration_seconds;
        totals.total_score += record.score;
        totals.best_session_score = totals.best_session_score.max(record.score);

        self.last_run = Some(record.started_at);
        self.sessions.push(record);

        let rates: f64 = self.sessions.iter().map(|s| s.success_rate).sum();
        self.totals.average_success_rate = rates / self.sessions.len() as f64;
    }
}
