//! Persistence of [`HarvestState`] as a single JSON document.
//!
//! # Layout
//!
//! ```json
//! {
//!   "metadata": { "version": "2.0", "last_run": "...", "sessions_run": 3, ... },
//!   "sessions": [ { "session_id": "harvest_...", "continuation": { ... }, ... } ],
//!   "items":    { "<identity>": { "identity": "...", "title": "...", ... } }
//! }
//! ```
//!
//! Items are written in identity order so that loading a document and saving
//! it again reproduces it exactly.
//!
//! # Atomicity
//!
//! Saves go to a temporary file in the target directory which is fsynced and
//! then renamed over the old document. A crash mid-save leaves either the
//! old or the new document, never a mixture.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smart_harvest_core::{Corpus, HarvestState, Item, SessionRecord, Totals};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::HarvestError;

pub const STATE_VERSION: &str = "2.0";

/// Load/save contract used by the orchestrator.
pub trait StateStore: Send + Sync {
    /// Load the persisted state. A store with nothing saved yet returns an
    /// empty state; an unreadable one is a fatal error.
    fn load(&self) -> Result<HarvestState, HarvestError>;

    /// Persist the state atomically.
    fn save(&self, state: &HarvestState) -> Result<(), HarvestError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Metadata {
    version: String,
    #[serde(default)]
    last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    sessions_run: u64,
    #[serde(default)]
    items_seen_total: u64,
    #[serde(default)]
    corpus_size: usize,
    #[serde(default)]
    total_time_secs: f64,
    #[serde(default)]
    total_score: i64,
    #[serde(default)]
    best_session_score: i64,
    #[serde(default)]
    average_success_rate: f64,
}

/// The on-disk document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestDocument {
    metadata: Metadata,
    #[serde(default)]
    sessions: Vec<SessionRecord>,
    #[serde(default)]
    items: BTreeMap<String, Item>,
}

impl HarvestDocument {
    pub fn from_state(state: &HarvestState) -> Self {
        let totals = state.totals();
        let items = state
            .corpus()
            .items()
            .map(|item| (item.identity.clone(), item.clone()))
            .collect();
        Self {
            metadata: Metadata {
                version: STATE_VERSION.to_string(),
                last_run: state.last_run(),
                sessions_run: totals.sessions_run,
                items_seen_total: totals.items_seen_total,
                corpus_size: state.corpus().size(),
                total_time_secs: totals.total_time_secs,
                total_score: totals.total_score,
                best_session_score: totals.best_session_score,
                average_success_rate: totals.average_success_rate,
            },
            sessions: state.sessions().to_vec(),
            items,
        }
    }

    pub fn into_state(self) -> Result<HarvestState> {
        for record in &self.sessions {
            record
                .validate()
                .with_context(|| format!("session {} is malformed", record.session_id))?;
        }
        let mut corpus = Corpus::new();
        for (key, item) in self.items {
            if key != item.identity {
                anyhow::bail!(
                    "item keyed '{}' carries identity '{}'",
                    key,
                    item.identity
                );
            }
            corpus.merge(item);
        }
        let m = self.metadata;
        let totals = Totals {
            sessions_run: m.sessions_run,
            items_seen_total: m.items_seen_total,
            total_time_secs: m.total_time_secs,
            total_score: m.total_score,
            best_session_score: m.best_session_score,
            average_success_rate: m.average_success_rate,
        };
        Ok(HarvestState::from_parts(
            corpus,
            self.sessions,
            totals,
            m.last_run,
        ))
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Corpus size recorded in the metadata, which may disagree with the
    /// item map if the file was edited by hand.
    pub fn recorded_corpus_size(&self) -> usize {
        self.metadata.corpus_size
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// JSON document on the local filesystem.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw document, if any. Used by reports.
    pub fn read_document(&self) -> Result<Option<HarvestDocument>, HarvestError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.unreadable(e))?;
        if content.trim().is_empty() {
            warn!(path = %self.path.display(), "state file is empty, starting fresh");
            return Ok(None);
        }
        let doc = HarvestDocument::from_json(&content).map_err(|e| self.unreadable(e))?;
        if doc.version() != STATE_VERSION {
            warn!(
                found = doc.version(),
                expected = STATE_VERSION,
                "state document version differs"
            );
        }
        Ok(Some(doc))
    }

    fn unreadable(&self, err: impl std::fmt::Display) -> HarvestError {
        HarvestError::StateUnreadable {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }

    fn write_atomically(&self, json: &str) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;

        let mut tmp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<HarvestState, HarvestError> {
        match self.read_document()? {
            Some(doc) => doc.into_state().map_err(|e| self.unreadable(format!("{:#}", e))),
            None => Ok(HarvestState::new()),
        }
    }

    fn save(&self, state: &HarvestState) -> Result<(), HarvestError> {
        let json = HarvestDocument::from_state(state)
            .to_json()
            .map_err(HarvestError::Persist)?;
        self.write_atomically(&json).map_err(HarvestError::Persist)?;
        debug!(
            path = %self.path.display(),
            items = state.corpus().size(),
            sessions = state.sessions().len(),
            "harvest state saved"
        );
        Ok(())
    }
}

/// In-memory store for tests and dry runs. Keeps the last saved document
/// as JSON so that saves go through the same encoding as the file store.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<String>>,
    saves: Mutex<usize>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: &HarvestState) -> Result<Self> {
        let json = HarvestDocument::from_state(state).to_json()?;
        Ok(Self {
            saved: Mutex::new(Some(json)),
            ..Self::default()
        })
    }

    /// A store whose every save fails.
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn saved_json(&self) -> Option<String> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<HarvestState, HarvestError> {
        match self.saved_json() {
            Some(json) => HarvestDocument::from_json(&json)
                .and_then(HarvestDocument::into_state)
                .map_err(|e| HarvestError::StateUnreadable {
                    path: PathBuf::from("<memory>"),
                    reason: format!("{:#}", e),
                }),
            None => Ok(HarvestState::new()),
        }
    }

    fn save(&self, state: &HarvestState) -> Result<(), HarvestError> {
        if self.fail_saves {
            return Err(HarvestError::Persist(anyhow::anyhow!(
                "memory store configured to fail"
            )));
        }
        let json = HarvestDocument::from_state(state)
            .to_json()
            .map_err(HarvestError::Persist)?;
        *self.saved.lock().unwrap_or_else(|e| e.into_inner()) = Some(json);
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smart_harvest_core::ContinuationPoint;
    use tempfile::TempDir;

    fn sample_state() -> HarvestState {
        let mut state = HarvestState::new();
        state.merge(
            Item::new("v1")
                .with_title("Episode 1")
                .with_date_bucket("3 years ago")
                .with_engagement(40),
        );
        state.merge(Item::new("v2").with_title("Episode 2"));
        state.record_session(SessionRecord {
            session_id: "harvest_20261018_101500_000".into(),
            started_at: "2026-10-18T10:15:00Z".parse().unwrap(),
            items_found: 2,
            new_items: 2,
            success_rate: 100.0,
            duration_seconds: 41.5,
            continuation: ContinuationPoint::video_anchor(24, "v0".into(), "2 years ago".into())
                .with_reasoning("Session 3: continue from v0"),
            score: 120,
        });
        state
    }

    #[test]
    fn missing_file_loads_empty_state() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("nope.json"));
        let state = store.load().unwrap();
        assert!(state.corpus().is_empty());
        assert!(state.sessions().is_empty());
    }

    #[test]
    fn save_then_load_restores_state() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("data/harvest.json"));
        let state = sample_state();
        store.save(&state).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn load_save_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("harvest.json");
        let store = JsonFileStore::new(&path);
        store.save(&sample_state()).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();

        let reloaded = store.load().unwrap();
        store.save(&reloaded).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn full_precision_floats_survive_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("harvest.json");
        let store = JsonFileStore::new(&path);

        let mut state = HarvestState::new();
        let base: DateTime<Utc> = "2026-10-18T10:15:00Z".parse().unwrap();
        for i in 0..500u32 {
            let found = 47 + (i % 13) as u64;
            let proper = found - (i % 7) as u64;
            state.record_session(SessionRecord {
                session_id: format!("harvest_{:05}", i),
                started_at: base + chrono::TimeDelta::seconds(i as i64 * 90),
                items_found: found,
                new_items: proper,
                success_rate: proper as f64 / found as f64 * 100.0,
                duration_seconds: 11.988575926495301 + i as f64 / 7.0,
                continuation: ContinuationPoint::scroll_offset(10 + i % 6),
                score: 60,
            });
        }
        let expected: Vec<(f64, f64)> = state
            .sessions()
            .iter()
            .map(|s| (s.success_rate, s.duration_seconds))
            .collect();

        store.save(&state).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        let reloaded = store.load().unwrap();
        let restored: Vec<(f64, f64)> = reloaded
            .sessions()
            .iter()
            .map(|s| (s.success_rate, s.duration_seconds))
            .collect();
        assert_eq!(restored, expected);

        store.save(&reloaded).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn corrupt_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("harvest.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, HarvestError::StateUnreadable { .. }));
    }

    #[test]
    fn mismatched_item_key_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("harvest.json");
        std::fs::write(
            &path,
            r#"{"metadata":{"version":"2.0"},"sessions":[],
               "items":{"a":{"identity":"b"}}}"#,
        )
        .unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("carries identity"));
    }

    #[test]
    fn invalid_continuation_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("harvest.json");
        std::fs::write(
            &path,
            r#"{"metadata":{"version":"2.0"},"items":{},"sessions":[{
                "session_id":"s","started_at":"2026-10-18T10:15:00Z","items_found":1,
                "success_rate":100.0,"duration_seconds":1.0,"score":0,
                "continuation":{"strategy":"video_anchor","position_offset":24}}]}"#,
        )
        .unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, HarvestError::StateUnreadable { .. }));
    }

    #[test]
    fn empty_file_starts_fresh() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("harvest.json");
        std::fs::write(&path, "\n").unwrap();
        let state = JsonFileStore::new(&path).load().unwrap();
        assert!(state.corpus().is_empty());
    }

    #[test]
    fn document_records_metadata() {
        let doc = HarvestDocument::from_state(&sample_state());
        assert_eq!(doc.version(), STATE_VERSION);
        assert_eq!(doc.recorded_corpus_size(), 2);
        assert_eq!(doc.item_count(), 2);
        let json = doc.to_json().unwrap();
        assert!(json.contains("\"best_session_score\": 120"));
        assert!(json.contains("\"strategy\": \"video_anchor\""));
    }

    #[test]
    fn memory_store_round_trips_and_counts() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().corpus().is_empty());
        store.save(&sample_state()).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().unwrap(), sample_state());
        assert!(MemoryStore::failing().save(&sample_state()).is_err());
    }
}
