//! Harvest progress reporting.
//!
//! The orchestrator emits a [`HarvestEvent`] at every step of the loop and
//! hands it to a [`HarvestObserver`]. Observers only watch; nothing they do
//! feeds back into planning or pacing. Progress goes to **stderr** so stdout
//! stays parseable for scripts.

use std::io::Write;

use smart_harvest_core::SessionRecord;

use crate::orchestrator::StopReason;

/// A single progress event for a harvest run.
#[derive(Clone, Debug)]
pub enum HarvestEvent {
    /// A session is about to start (`index` is zero-based).
    SessionStarted {
        index: usize,
        total: usize,
        strategy: String,
        reasoning: String,
    },
    /// The collector consulted the duplicate guard.
    DuplicateCheck {
        items_so_far: usize,
        duplicates: usize,
        continue_session: bool,
    },
    /// A session finished and was persisted.
    SessionCompleted {
        record: SessionRecord,
        corpus_size: usize,
    },
    /// The collector failed; no record was written.
    SessionFailed { index: usize, error: String },
    /// Waiting before the next session.
    Cooldown { secs: u64, recovery: bool },
    /// The run is over.
    Stopped { reason: StopReason },
}

/// Receives harvest events. Implementations write to stderr (human or JSON).
pub trait HarvestObserver: Send + Sync {
    fn report(&self, event: HarvestEvent);
}

/// Human-friendly progress on stderr: "harvest  session 2/5  18 items  +12 new".
pub struct StderrProgress;

impl HarvestObserver for StderrProgress {
    fn report(&self, event: HarvestEvent) {
        let line = match &event {
            HarvestEvent::SessionStarted {
                index,
                total,
                strategy,
                reasoning,
            } => format!(
                "harvest  session {}/{}  {}  {}\n",
                index + 1,
                total,
                strategy,
                reasoning
            ),
            HarvestEvent::DuplicateCheck {
                items_so_far,
                duplicates,
                continue_session,
            } => {
                if *continue_session {
                    return;
                }
                format!(
                    "harvest  stopping early  {} of {} items already known\n",
                    duplicates, items_so_far
                )
            }
            HarvestEvent::SessionCompleted {
                record,
                corpus_size,
            } => format!(
                "harvest  {}  {} items  +{} new  {:.1}% titles  corpus {}\n",
                record.session_id,
                format_number(record.items_found),
                format_number(record.new_items),
                record.success_rate,
                format_number(*corpus_size as u64)
            ),
            HarvestEvent::SessionFailed { index, error } => {
                format!("harvest  session {} failed: {}\n", index + 1, error)
            }
            HarvestEvent::Cooldown { secs, recovery } => {
                let kind = if *recovery { "recovery" } else { "cooldown" };
                format!("harvest  {}  {}\n", kind, format_duration(*secs))
            }
            HarvestEvent::Stopped { reason } => format!("harvest  stopped: {}\n", reason),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl HarvestObserver for JsonProgress {
    fn report(&self, event: HarvestEvent) {
        let obj = match &event {
            HarvestEvent::SessionStarted {
                index,
                total,
                strategy,
                reasoning,
            } => serde_json::json!({
                "event": "session_started",
                "index": index,
                "total": total,
                "strategy": strategy,
                "reasoning": reasoning
            }),
            HarvestEvent::DuplicateCheck {
                items_so_far,
                duplicates,
                continue_session,
            } => serde_json::json!({
                "event": "duplicate_check",
                "items_so_far": items_so_far,
                "duplicates": duplicates,
                "continue": continue_session
            }),
            HarvestEvent::SessionCompleted {
                record,
                corpus_size,
            } => serde_json::json!({
                "event": "session_completed",
                "record": record,
                "corpus_size": corpus_size
            }),
            HarvestEvent::SessionFailed { index, error } => serde_json::json!({
                "event": "session_failed",
                "index": index,
                "error": error
            }),
            HarvestEvent::Cooldown { secs, recovery } => serde_json::json!({
                "event": "cooldown",
                "secs": secs,
                "recovery": recovery
            }),
            HarvestEvent::Stopped { reason } => serde_json::json!({
                "event": "stopped",
                "reason": reason.as_str()
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op observer when progress is disabled.
pub struct NoProgress;

impl HarvestObserver for NoProgress {
    fn report(&self, _event: HarvestEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

pub fn format_duration(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn observer(&self) -> Box<dyn HarvestObserver> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
