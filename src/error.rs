//! Fatal orchestrator errors.
//!
//! Per-session collector failures are plain [`anyhow::Error`]s and are
//! absorbed by the harvest loop. Everything in [`HarvestError`] stops the
//! run and reaches the caller.

use std::path::PathBuf;

use smart_harvest_core::InvariantViolation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Persisted state exists but cannot be read or parsed. The run refuses
    /// to start rather than overwrite it with an empty corpus.
    #[error("harvest state at {path} is unreadable: {reason}")]
    StateUnreadable { path: PathBuf, reason: String },

    /// State could not be written after a session.
    #[error("failed to persist harvest state: {0:#}")]
    Persist(#[source] anyhow::Error),

    /// The planner or scheduler produced an impossible value.
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("invalid harvest settings: {0}")]
    Config(String),
}
