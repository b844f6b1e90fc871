//! The single-session collector seam.
//!
//! A [`Collector`] runs one harvesting session against the external source:
//! it starts from a [`ContinuationPoint`], streams items, consults the
//! [`DuplicateCheck`] as it goes and returns everything it found. It never
//! touches the corpus or the session history; the orchestrator merges what
//! it returns.
//!
//! ```text
//! HarvestOrchestrator ──plan──▶ ContinuationPoint
//!         │                            │
//!         ▼                            ▼
//!   Collector::collect(continuation, duplicate_check)
//!         │
//!         ▼
//!   CollectOutcome { items, duration_seconds, quality_score }
//! ```
//!
//! Two implementations ship with the crate: [`CommandCollector`] drives an
//! external scraper process, [`ReplayCollector`] replays recorded batches.
//!
//! [`CommandCollector`]: crate::collector_command::CommandCollector
//! [`ReplayCollector`]: crate::collector_replay::ReplayCollector

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smart_harvest_core::{ContinuationPoint, DuplicateCheck, Item, TitleClassifier};

use crate::collector_command::CommandCollector;
use crate::collector_replay::ReplayCollector;
use crate::config::Config;

/// One item as returned by a collector, with the collector's own verdict on
/// whether the title is a real one or an extraction fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedItem {
    pub item: Item,
    pub proper_title: bool,
}

/// Result of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectOutcome {
    pub items: Vec<CollectedItem>,
    pub duration_seconds: f64,
    pub quality_score: i64,
    /// Set when the duplicate check ended the session early.
    pub stopped_early: bool,
}

impl CollectOutcome {
    pub fn items_found(&self) -> u64 {
        self.items.len() as u64
    }

    pub fn proper_titles(&self) -> u64 {
        self.items.iter().filter(|c| c.proper_title).count() as u64
    }

    /// Share of items with a proper title, in percent.
    pub fn success_rate(&self) -> f64 {
        self.proper_titles() as f64 / self.items_found().max(1) as f64 * 100.0
    }
}

/// A session runner against the external source.
///
/// Implementations may parallelise internally but `collect` only resolves
/// once the session is over. Returning `Err` marks the session as a
/// transient failure; zero items is a valid outcome.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn collect(
        &self,
        continuation: &ContinuationPoint,
        duplicate_check: &dyn DuplicateCheck,
    ) -> Result<CollectOutcome>;
}

/// Wire form of one item, shared by the scraper protocol and replay
/// fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub likes: u64,
    /// Overrides the prefix-based title classification when present.
    #[serde(default)]
    pub proper: Option<bool>,
}

impl RawItem {
    pub fn into_collected(self, classifier: &TitleClassifier) -> Result<CollectedItem> {
        let id = self.id.trim();
        if id.is_empty() {
            bail!("collector produced an item without an identity");
        }
        let proper_title = self
            .proper
            .unwrap_or_else(|| classifier.is_proper(self.title.as_deref()));
        let mut item = Item::new(id).with_engagement(self.likes);
        item.title = self.title.filter(|t| !t.trim().is_empty());
        item.date_bucket = self.date.filter(|d| !d.trim().is_empty());
        Ok(CollectedItem { item, proper_title })
    }
}

/// One line of scraper output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectorRecord {
    Item(RawItem),
    Done {
        #[serde(default)]
        score: i64,
    },
    /// Free-form progress text, logged at debug level.
    Log { message: String },
}

/// Runs the duplicate check every `every` items.
pub(crate) fn due_for_check(collected: usize, every: usize) -> bool {
    collected > 0 && collected % every.max(1) == 0
}

/// Build the collector named by `[collector] kind`.
pub fn build_collector(config: &Config) -> Result<Arc<dyn Collector>> {
    let classifier = config.collector.title_classifier();
    let check_every = config.guard.check_every;
    match config.collector.kind.as_str() {
        "command" => {
            let Some(command) = config.collector.command.clone() else {
                bail!("collector.kind = \"command\" requires collector.command");
            };
            Ok(Arc::new(CommandCollector::new(
                command,
                config.collector.args.clone(),
                classifier,
                check_every,
            )))
        }
        "replay" => {
            let Some(path) = config.collector.replay_path.as_ref() else {
                bail!("collector.kind = \"replay\" requires collector.replay_path");
            };
            Ok(Arc::new(ReplayCollector::from_file(
                path,
                classifier,
                check_every,
            )?))
        }
        other => bail!(
            "Unknown collector kind '{}'. Must be 'command' or 'replay'.",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_counts_proper_titles() {
        let outcome = CollectOutcome {
            items: vec![
                CollectedItem {
                    item: Item::new("a"),
                    proper_title: true,
                },
                CollectedItem {
                    item: Item::new("b"),
                    proper_title: false,
                },
                CollectedItem {
                    item: Item::new("c"),
                    proper_title: true,
                },
                CollectedItem {
                    item: Item::new("d"),
                    proper_title: true,
                },
            ],
            ..CollectOutcome::default()
        };
        assert!((outcome.success_rate() - 75.0).abs() < 1e-9);
        assert_eq!(CollectOutcome::default().success_rate(), 0.0);
    }

    #[test]
    fn records_parse_by_type_tag() {
        let item: CollectorRecord = serde_json::from_str(
            r#"{"type":"item","id":"v1","title":"Clip","date":"2 weeks ago","likes":7}"#,
        )
        .unwrap();
        match item {
            CollectorRecord::Item(raw) => {
                assert_eq!(raw.id, "v1");
                assert_eq!(raw.likes, 7);
                assert_eq!(raw.proper, None);
            }
            other => panic!("unexpected record {:?}", other),
        }
        let done: CollectorRecord = serde_json::from_str(r#"{"type":"done","score":42}"#).unwrap();
        assert_eq!(done, CollectorRecord::Done { score: 42 });
    }

    #[test]
    fn raw_item_classification() {
        let classifier = TitleClassifier::new(Some("VIDEO_".into()));
        let raw = RawItem {
            id: " v9 ".into(),
            title: Some("VIDEO_v9".into()),
            date: Some("  ".into()),
            likes: 0,
            proper: None,
        };
        let collected = raw.clone().into_collected(&classifier).unwrap();
        assert_eq!(collected.item.identity, "v9");
        assert!(!collected.proper_title);
        assert_eq!(collected.item.date_bucket, None);

        let forced = RawItem {
            proper: Some(true),
            ..raw
        };
        assert!(forced.into_collected(&classifier).unwrap().proper_title);
    }

    #[test]
    fn blank_identity_is_rejected() {
        let raw = RawItem {
            id: "  ".into(),
            title: None,
            date: None,
            likes: 0,
            proper: None,
        };
        assert!(raw.into_collected(&TitleClassifier::default()).is_err());
    }

    #[test]
    fn check_cadence() {
        assert!(!due_for_check(0, 20));
        assert!(!due_for_check(19, 20));
        assert!(due_for_check(20, 20));
        assert!(due_for_check(40, 20));
        assert!(due_for_check(3, 0));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut config = Config::minimal();
        config.collector.kind = "browser".into();
        let err = build_collector(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown collector kind"));
    }
}
