//! Read-only reports over the persisted harvest: collection analysis,
//! title collisions and a preview of the next plan.
//!
//! Used by `harvest report`, `harvest duplicates` and `harvest plan`. None
//! of these commands write to the state file.

use anyhow::Result;
use chrono::{DateTime, Utc};
use smart_harvest_core::analysis::{
    age_distribution, quality_summary, session_performance, title_collisions,
};
use smart_harvest_core::{ContinuationPlanner, GapScheduler, HarvestState};

use crate::config::Config;
use crate::orchestrator::hint_multiplier;
use crate::progress::{format_duration, format_number};
use crate::store::{HarvestDocument, JsonFileStore};

const TOP_AGE_GROUPS: usize = 10;

/// Load the persisted document, or print a hint and return `None`.
fn load(config: &Config) -> Result<Option<(HarvestDocument, HarvestState)>> {
    let store = JsonFileStore::new(&config.state.path);
    let Some(doc) = store.read_document()? else {
        println!(
            "No harvest state at {}. Run `harvest run` first.",
            config.state.path.display()
        );
        return Ok(None);
    };
    let state = doc.clone().into_state()?;
    Ok(Some((doc, state)))
}

/// Run the report command: analyse the corpus and session history.
pub fn run_report(config: &Config) -> Result<()> {
    let Some((doc, state)) = load(config)? else {
        return Ok(());
    };
    let corpus = state.corpus();
    let file_size = std::fs::metadata(&config.state.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Smart Harvest — Collection Report");
    println!("=================================");
    println!();
    println!("  State:       {}", config.state.path.display());
    println!("  Size:        {}", format_bytes(file_size));
    println!("  Version:     {}", doc.version());
    println!(
        "  Last run:    {}",
        state
            .last_run()
            .map(format_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Items:       {}", format_number(corpus.size() as u64));
    println!("  Sessions:    {}", state.sessions().len());

    let groups = age_distribution(corpus);
    if !groups.is_empty() {
        println!();
        println!("  By age:");
        println!("  {:<24} {:>8} {:>8}", "BUCKET", "ITEMS", "PRIORITY");
        println!("  {}", "-".repeat(42));
        let mut by_size = groups.clone();
        by_size.sort_by(|a, b| b.count.cmp(&a.count).then(a.priority.cmp(&b.priority)));
        by_size.truncate(TOP_AGE_GROUPS);
        by_size.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.bucket.cmp(&b.bucket)));
        for g in &by_size {
            println!("  {:<24} {:>8} {:>8}", g.bucket, g.count, g.priority);
        }
        if groups.len() > TOP_AGE_GROUPS {
            println!("  ... {} more buckets", groups.len() - TOP_AGE_GROUPS);
        }
    }

    let quality = quality_summary(corpus, &config.collector.title_classifier());
    println!();
    println!("  Quality:");
    println!(
        "    Proper titles:   {} / {} ({:.1}%)",
        quality.proper_titles,
        quality.total,
        quality.title_rate()
    );
    println!(
        "    With age bucket: {} ({:.1}%)",
        quality.with_age_bucket,
        quality.age_rate()
    );
    println!(
        "    With engagement: {} ({:.1}%)",
        quality.with_engagement,
        quality.engagement_rate()
    );

    if !state.sessions().is_empty() {
        println!();
        println!("  Sessions:");
        println!(
            "  {:<28} {:<13} {:>6} {:>5} {:>8} {:>9} {:>6}",
            "SESSION", "STRATEGY", "ITEMS", "NEW", "TITLES", "DURATION", "SCORE"
        );
        println!("  {}", "-".repeat(81));
        for s in state.sessions() {
            println!(
                "  {:<28} {:<13} {:>6} {:>5} {:>7.1}% {:>9} {:>6}",
                s.session_id,
                s.continuation.strategy().as_str(),
                s.items_found,
                s.new_items,
                s.success_rate,
                format_duration(s.duration_seconds as u64),
                s.score
            );
        }

        let perf = session_performance(state.sessions(), state.totals(), corpus.size());
        let totals = state.totals();
        println!();
        println!("  Performance:");
        println!("    Average titles:    {:.1}%", perf.average_success_rate);
        println!("    Items per session: {:.1}", perf.average_items);
        println!(
            "    Average duration:  {}",
            format_duration(perf.average_duration_secs as u64)
        );
        println!(
            "    Items seen:        {} ({:.1}% re-discovered)",
            format_number(totals.items_seen_total),
            perf.dedup_rate
        );
        println!(
            "    Score:             {} total, best {}",
            totals.total_score, totals.best_session_score
        );
        if !perf.opening_trend.is_empty() {
            let trend: Vec<String> = perf
                .opening_trend
                .iter()
                .map(|r| format!("{:.1}%", r))
                .collect();
            println!("    Opening trend:     {}", trend.join(" -> "));
        }
        match perf.free_sessions_confirmed {
            Some(true) => {
                println!("    Note: the first two sessions ran clean, the third degraded.")
            }
            Some(false) => println!("    Note: no degradation after the first two sessions."),
            None => {}
        }
    }

    println!();
    if doc.recorded_corpus_size() == corpus.size() {
        println!("  Metadata:    consistent");
    } else {
        println!(
            "  Metadata:    recorded corpus size {} but {} items stored",
            doc.recorded_corpus_size(),
            corpus.size()
        );
    }
    println!();
    Ok(())
}

/// List titles carried by more than one identity.
pub fn run_duplicates(config: &Config) -> Result<()> {
    let Some((_, state)) = load(config)? else {
        return Ok(());
    };
    let collisions = title_collisions(state.corpus());
    if collisions.is_empty() {
        println!("No shared titles among {} items.", state.corpus().size());
        return Ok(());
    }

    let affected: usize = collisions.iter().map(|c| c.identities.len()).sum();
    println!(
        "{} titles shared by {} items:",
        collisions.len(),
        affected
    );
    println!();
    for c in &collisions {
        println!("  {} ({})", c.title, c.identities.len());
        for id in &c.identities {
            println!("    - {}", id);
        }
    }
    Ok(())
}

/// Print the continuation the planner would produce for `session`
/// (default: the next index after the recorded history).
pub fn run_plan(config: &Config, session: Option<usize>) -> Result<()> {
    let state = match JsonFileStore::new(&config.state.path).read_document()? {
        Some(doc) => doc.into_state()?,
        None => HarvestState::new(),
    };
    let index = session.unwrap_or(state.sessions().len());
    let planner = ContinuationPlanner::new(config.planner.planner_config());
    let point = planner.plan(index, state.corpus(), state.sessions());

    println!("Session {} plan", index + 1);
    println!("  Strategy:        {}", point.strategy());
    println!("  Reasoning:       {}", point.reasoning());
    println!("  Offset:          {}", point.position_offset());
    println!("  Expected depth:  {}", point.expected_depth());
    println!("  Scroll budget:   {}", point.scroll_budget());
    if let Some(anchor) = point.anchor_identity() {
        println!("  Anchor:          {}", anchor);
    }
    if let Some(bucket) = point.target_age_bucket() {
        println!("  Age bucket:      {}", bucket);
    }

    if let Some(last) = state.sessions().last() {
        let scheduler = GapScheduler::new(config.schedule.gap_config());
        let previous = index.saturating_sub(1);
        let gap = scheduler.next_gap(
            state.sessions(),
            hint_multiplier(previous, last.success_rate),
        );
        println!("  Gap before it:   {}", format_duration(gap));
    }
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to now (e.g. "3 hours ago").
fn format_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();
    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
