//! Read-only analysis of a harvest: title quality, age distribution,
//! session trends and title collisions.
//!
//! Nothing here feeds back into planning decisions.

use std::collections::HashMap;

use crate::age::age_priority;
use crate::corpus::Corpus;
use crate::models::{SessionRecord, Totals};

/// Decides whether a title is "proper" or an extractor fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleClassifier {
    fallback_prefix: Option<String>,
}

impl TitleClassifier {
    pub fn new(fallback_prefix: Option<String>) -> Self {
        let fallback_prefix = fallback_prefix.filter(|p| !p.is_empty());
        Self { fallback_prefix }
    }

    /// A proper title is present, non-blank, and not a fallback placeholder.
    pub fn is_proper(&self, title: Option<&str>) -> bool {
        let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
            return false;
        };
        match &self.fallback_prefix {
            Some(prefix) => !title.starts_with(prefix.as_str()),
            None => true,
        }
    }
}

/// Items sharing one age bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeGroup {
    pub bucket: String,
    pub priority: u32,
    pub count: usize,
}

/// Group aged items by bucket, most recent bucket first.
pub fn age_distribution(corpus: &Corpus) -> Vec<AgeGroup> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for bucket in corpus.items().filter_map(|item| item.known_age_bucket()) {
        *counts.entry(bucket).or_default() += 1;
    }
    let mut groups: Vec<AgeGroup> = counts
        .into_iter()
        .map(|(bucket, count)| AgeGroup {
            bucket: bucket.to_string(),
            priority: age_priority(bucket),
            count,
        })
        .collect();
    groups.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.bucket.cmp(&b.bucket))
    });
    groups
}

/// Title and metadata coverage over the whole corpus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualitySummary {
    pub total: usize,
    pub proper_titles: usize,
    pub with_age_bucket: usize,
    pub with_engagement: usize,
}

impl QualitySummary {
    pub fn title_rate(&self) -> f64 {
        percent(self.proper_titles, self.total)
    }

    pub fn age_rate(&self) -> f64 {
        percent(self.with_age_bucket, self.total)
    }

    pub fn engagement_rate(&self) -> f64 {
        percent(self.with_engagement, self.total)
    }
}

pub fn quality_summary(corpus: &Corpus, classifier: &TitleClassifier) -> QualitySummary {
    let mut summary = QualitySummary {
        total: corpus.size(),
        ..QualitySummary::default()
    };
    for item in corpus.items() {
        if classifier.is_proper(item.title.as_deref()) {
            summary.proper_titles += 1;
        }
        if item.known_age_bucket().is_some() {
            summary.with_age_bucket += 1;
        }
        if item.engagement_count > 0 {
            summary.with_engagement += 1;
        }
    }
    summary
}

/// Aggregate view over the recorded sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPerformance {
    pub sessions: usize,
    pub average_success_rate: f64,
    pub average_items: f64,
    pub average_duration_secs: f64,
    /// Share of all sightings that were re-discoveries, in percent.
    pub dedup_rate: f64,
    /// Success rates of the first three sessions, when available.
    pub opening_trend: Vec<f64>,
    /// Whether the first two sessions ran clean and the third degraded.
    pub free_sessions_confirmed: Option<bool>,
}

pub fn session_performance(
    sessions: &[SessionRecord],
    totals: &Totals,
    corpus_size: usize,
) -> SessionPerformance {
    if sessions.is_empty() {
        return SessionPerformance::default();
    }
    let n = sessions.len() as f64;
    let opening_trend: Vec<f64> = sessions.iter().take(3).map(|s| s.success_rate).collect();
    let free_sessions_confirmed = match opening_trend.as_slice() {
        [first, second, third] => Some((first + second) / 2.0 > 95.0 && *third < 80.0),
        _ => None,
    };
    let seen = totals.items_seen_total.max(1) as f64;
    SessionPerformance {
        sessions: sessions.len(),
        average_success_rate: sessions.iter().map(|s| s.success_rate).sum::<f64>() / n,
        average_items: sessions.iter().map(|s| s.items_found as f64).sum::<f64>() / n,
        average_duration_secs: sessions.iter().map(|s| s.duration_seconds).sum::<f64>() / n,
        dedup_rate: ((1.0 - corpus_size as f64 / seen) * 100.0).max(0.0),
        opening_trend,
        free_sessions_confirmed,
    }
}

/// A title carried by more than one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleCollision {
    pub title: String,
    pub identities: Vec<String>,
}

/// Titles shared by several identities, largest groups first.
///
/// Blank titles are ignored; identity lists are sorted.
pub fn title_collisions(corpus: &Corpus) -> Vec<TitleCollision> {
    let mut by_title: HashMap<&str, Vec<&str>> = HashMap::new();
    for item in corpus.items() {
        if let Some(title) = item.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            by_title.entry(title).or_default().push(&item.identity);
        }
    }
    let mut collisions: Vec<TitleCollision> = by_title
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(title, mut ids)| {
            ids.sort_unstable();
            TitleCollision {
                title: title.to_string(),
                identities: ids.into_iter().map(str::to_string).collect(),
            }
        })
        .collect();
    collisions.sort_by(|a, b| {
        b.identities
            .len()
            .cmp(&a.identities.len())
            .then_with(|| a.title.cmp(&b.title))
    });
    collisions
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContinuationPoint, Item};
    use chrono::Utc;

    fn corpus() -> Corpus {
        vec![
            Item::new("a")
                .with_title("Episode 101")
                .with_date_bucket("3 years ago")
                .with_engagement(12),
            Item::new("b")
                .with_title("VIDEO_b")
                .with_date_bucket("3 years ago"),
            Item::new("c")
                .with_title("Episode 101")
                .with_date_bucket("2 days ago"),
            Item::new("d"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn classifier_rejects_blank_and_fallback_titles() {
        let classifier = TitleClassifier::new(Some("VIDEO_".into()));
        assert!(classifier.is_proper(Some("Episode 101")));
        assert!(!classifier.is_proper(Some("VIDEO_123")));
        assert!(!classifier.is_proper(Some("   ")));
        assert!(!classifier.is_proper(None));

        let lenient = TitleClassifier::new(Some(String::new()));
        assert!(lenient.is_proper(Some("VIDEO_123")));
    }

    #[test]
    fn distribution_orders_by_recency() {
        let groups = age_distribution(&corpus());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].bucket, "2 days ago");
        assert_eq!(groups[0].count, 1);
        assert_eq!(groups[1].bucket, "3 years ago");
        assert_eq!(groups[1].count, 2);
    }

    #[test]
    fn quality_counts() {
        let summary = quality_summary(&corpus(), &TitleClassifier::new(Some("VIDEO_".into())));
        assert_eq!(summary.total, 4);
        assert_eq!(summary.proper_titles, 2);
        assert_eq!(summary.with_age_bucket, 3);
        assert_eq!(summary.with_engagement, 1);
        assert!((summary.title_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn collisions_group_identities() {
        let collisions = title_collisions(&corpus());
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].title, "Episode 101");
        assert_eq!(collisions[0].identities, vec!["a", "c"]);
    }

    #[test]
    fn performance_detects_free_sessions() {
        let records: Vec<SessionRecord> = [100.0, 98.0, 60.0]
            .iter()
            .map(|rate| SessionRecord {
                session_id: "s".into(),
                started_at: Utc::now(),
                items_found: 20,
                new_items: 10,
                success_rate: *rate,
                duration_seconds: 30.0,
                continuation: ContinuationPoint::fresh_start(),
                score: 0,
            })
            .collect();
        let totals = Totals {
            items_seen_total: 60,
            ..Totals::default()
        };
        let perf = session_performance(&records, &totals, 30);
        assert_eq!(perf.sessions, 3);
        assert_eq!(perf.free_sessions_confirmed, Some(true));
        assert!((perf.dedup_rate - 50.0).abs() < 1e-9);
        assert!((perf.average_items - 20.0).abs() < 1e-9);
    }

    #[test]
    fn performance_of_empty_history() {
        let perf = session_performance(&[], &Totals::default(), 0);
        assert_eq!(perf, SessionPerformance::default());
    }
}
