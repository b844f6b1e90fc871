//! # Smart Harvest Core
//!
//! Pure decision logic for Smart Harvest: the data model, the deduplicated
//! corpus, the age-priority function, the continuation planner, the gap
//! scheduler and the duplicate guard.
//!
//! This crate contains no tokio, filesystem I/O, or process handling. Every
//! function here is either pure or draws from a caller-supplied random
//! number generator, which keeps the planning core testable in isolation.
//!
//! ```text
//!  sessions + corpus ──▶ ContinuationPlanner ──▶ ContinuationPoint
//!                                                   │
//!  items so far ─────▶ DuplicateGuard ──▶ continue? │ (consulted by the collector)
//!                                                   ▼
//!  sessions + hint ──▶ GapScheduler ──▶ seconds until the next session
//! ```

pub mod age;
pub mod analysis;
pub mod corpus;
pub mod guard;
pub mod models;
pub mod planner;
pub mod scheduler;

pub use age::age_priority;
pub use analysis::TitleClassifier;
pub use corpus::{Corpus, MergeOutcome};
pub use guard::{DuplicateCheck, DuplicateGuard, GuardConfig};
pub use models::{
    ContinuationPoint, HarvestState, InvariantViolation, Item, SessionPriority, SessionRecord,
    Strategy, Totals,
};
pub use planner::{ContinuationPlanner, PlannerConfig};
pub use scheduler::{GapConfig, GapScheduler};
