//! # Smart Harvest
//!
//! A multi-session harvest orchestrator. It runs a sequence of collection
//! sessions against a rate-limited source, decides where each session should
//! resume, paces the gaps between sessions from indirect degradation
//! signals, and keeps a deduplicated corpus that survives restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ ContinuationPlan │──▶│  Collector   │──▶│    Corpus     │
//! │ (core crate)     │   │command/replay│   │ merge + record│
//! └──────────────────┘   └──────┬───────┘   └───────┬───────┘
//!          ▲                    │ DuplicateGuard     │ persist (JSON)
//!          │                    ▼                    ▼
//!          └─────────────── GapScheduler ◀──── session history
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest run --sessions 5 --target 300    # harvest with the configured collector
//! harvest report                           # age, quality and session analysis
//! harvest plan                             # preview the next session's continuation
//! harvest duplicates                       # titles shared by several items
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Fatal orchestrator errors |
//! | [`store`] | Atomic JSON persistence of the harvest state |
//! | [`collector`] | Collector trait and wire records |
//! | [`collector_command`] | External scraper process collector |
//! | [`collector_replay`] | Fixture replay collector |
//! | [`orchestrator`] | The multi-session loop |
//! | [`progress`] | Observer events and reporters |
//! | [`report`] | Read-only reports |

pub mod collector;
pub mod collector_command;
pub mod collector_replay;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod store;
