use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use smart_harvest_core::analysis::TitleClassifier;
use smart_harvest_core::{GapConfig, GuardConfig, PlannerConfig};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub guard: GuardSettings,
    #[serde(default)]
    pub planner: PlannerSettings,
    #[serde(default)]
    pub collector: CollectorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./data/harvest_results.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_gap_floor")]
    pub gap_floor_secs: u64,
    #[serde(default = "default_gap_ceiling")]
    pub gap_ceiling_secs: u64,
    #[serde(default = "default_min_gap")]
    pub min_gap_secs: u64,
    #[serde(default = "default_max_gap")]
    pub max_gap_secs: u64,
    #[serde(default = "default_degradation_points")]
    pub degradation_points: f64,
    #[serde(default = "default_degradation_factor")]
    pub degradation_factor: f64,
    #[serde(default = "default_steady_state_factor")]
    pub steady_state_factor: f64,
    #[serde(default = "default_steady_state_after")]
    pub steady_state_after: usize,
    #[serde(default = "default_recovery_min")]
    pub recovery_min_secs: u64,
    #[serde(default = "default_recovery_max")]
    pub recovery_max_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            gap_floor_secs: default_gap_floor(),
            gap_ceiling_secs: default_gap_ceiling(),
            min_gap_secs: default_min_gap(),
            max_gap_secs: default_max_gap(),
            degradation_points: default_degradation_points(),
            degradation_factor: default_degradation_factor(),
            steady_state_factor: default_steady_state_factor(),
            steady_state_after: default_steady_state_after(),
            recovery_min_secs: default_recovery_min(),
            recovery_max_secs: default_recovery_max(),
        }
    }
}

fn default_gap_floor() -> u64 {
    30
}
fn default_gap_ceiling() -> u64 {
    120
}
fn default_min_gap() -> u64 {
    30
}
fn default_max_gap() -> u64 {
    300
}
fn default_degradation_points() -> f64 {
    10.0
}
fn default_degradation_factor() -> f64 {
    3.0
}
fn default_steady_state_factor() -> f64 {
    2.5
}
fn default_steady_state_after() -> usize {
    2
}
fn default_recovery_min() -> u64 {
    60
}
fn default_recovery_max() -> u64 {
    180
}

impl ScheduleConfig {
    pub fn gap_config(&self) -> GapConfig {
        GapConfig {
            floor_secs: self.gap_floor_secs,
            ceiling_secs: self.gap_ceiling_secs,
            min_secs: self.min_gap_secs,
            max_secs: self.max_gap_secs,
            degradation_points: self.degradation_points,
            degradation_factor: self.degradation_factor,
            steady_state_factor: self.steady_state_factor,
            steady_state_after: self.steady_state_after,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardSettings {
    #[serde(default = "default_min_sample")]
    pub min_sample: usize,
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,
    /// How many items a collector gathers between guard consultations.
    #[serde(default = "default_check_every")]
    pub check_every: usize,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            min_sample: default_min_sample(),
            duplicate_threshold: default_duplicate_threshold(),
            check_every: default_check_every(),
        }
    }
}

fn default_min_sample() -> usize {
    20
}
fn default_duplicate_threshold() -> f64 {
    0.8
}
fn default_check_every() -> usize {
    20
}

impl GuardSettings {
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            min_sample: self.min_sample,
            duplicate_threshold: self.duplicate_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannerSettings {
    #[serde(default = "default_anchor_percentile")]
    pub anchor_percentile: f64,
    #[serde(default = "default_scroll_offset_min")]
    pub scroll_offset_min: u32,
    #[serde(default = "default_scroll_offset_max")]
    pub scroll_offset_max: u32,
    #[serde(default = "default_anchor_offset_step")]
    pub anchor_offset_step: u32,
    #[serde(default = "default_anchor_offset_cap")]
    pub anchor_offset_cap: u32,
    #[serde(default = "default_date_offset_step")]
    pub date_offset_step: u32,
    #[serde(default = "default_deep_offset_step")]
    pub deep_offset_step: u32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            anchor_percentile: default_anchor_percentile(),
            scroll_offset_min: default_scroll_offset_min(),
            scroll_offset_max: default_scroll_offset_max(),
            anchor_offset_step: default_anchor_offset_step(),
            anchor_offset_cap: default_anchor_offset_cap(),
            date_offset_step: default_date_offset_step(),
            deep_offset_step: default_deep_offset_step(),
        }
    }
}

fn default_anchor_percentile() -> f64 {
    0.5
}
fn default_scroll_offset_min() -> u32 {
    10
}
fn default_scroll_offset_max() -> u32 {
    15
}
fn default_anchor_offset_step() -> u32 {
    12
}
fn default_anchor_offset_cap() -> u32 {
    50
}
fn default_date_offset_step() -> u32 {
    8
}
fn default_deep_offset_step() -> u32 {
    10
}

impl PlannerSettings {
    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            anchor_percentile: self.anchor_percentile,
            scroll_offset_min: self.scroll_offset_min,
            scroll_offset_max: self.scroll_offset_max,
            anchor_offset_step: self.anchor_offset_step,
            anchor_offset_cap: self.anchor_offset_cap,
            date_offset_step: self.date_offset_step,
            deep_offset_step: self.deep_offset_step,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// `command` (external scraper process) or `replay` (fixture file).
    #[serde(default = "default_collector_kind")]
    pub kind: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub replay_path: Option<PathBuf>,
    /// Titles starting with this prefix are extractor fallbacks.
    #[serde(default)]
    pub fallback_title_prefix: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            kind: default_collector_kind(),
            command: None,
            args: Vec::new(),
            replay_path: None,
            fallback_title_prefix: None,
        }
    }
}

fn default_collector_kind() -> String {
    "command".to_string()
}

impl CollectorConfig {
    pub fn title_classifier(&self) -> TitleClassifier {
        TitleClassifier::new(self.fallback_title_prefix.clone())
    }
}

impl Config {
    /// All defaults; used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.schedule;
        if s.gap_floor_secs > s.gap_ceiling_secs {
            bail!(
                "schedule.gap_floor_secs ({}) must be <= schedule.gap_ceiling_secs ({})",
                s.gap_floor_secs,
                s.gap_ceiling_secs
            );
        }
        if s.min_gap_secs > s.max_gap_secs {
            bail!("schedule.min_gap_secs must be <= schedule.max_gap_secs");
        }
        if s.recovery_min_secs > s.recovery_max_secs {
            bail!("schedule.recovery_min_secs must be <= schedule.recovery_max_secs");
        }
        for (name, factor) in [
            ("degradation_factor", s.degradation_factor),
            ("steady_state_factor", s.steady_state_factor),
        ] {
            if !factor.is_finite() || factor < 1.0 {
                bail!("schedule.{} must be a finite value >= 1.0", name);
            }
        }

        let g = &self.guard;
        if g.min_sample == 0 {
            bail!("guard.min_sample must be >= 1");
        }
        if g.check_every == 0 {
            bail!("guard.check_every must be >= 1");
        }
        if !(g.duplicate_threshold > 0.0 && g.duplicate_threshold <= 1.0) {
            bail!("guard.duplicate_threshold must be in (0.0, 1.0]");
        }

        let p = &self.planner;
        if !(0.0..=1.0).contains(&p.anchor_percentile) {
            bail!("planner.anchor_percentile must be in [0.0, 1.0]");
        }
        if p.scroll_offset_min > p.scroll_offset_max {
            bail!("planner.scroll_offset_min must be <= planner.scroll_offset_max");
        }

        match self.collector.kind.as_str() {
            "command" | "replay" => {}
            other => bail!(
                "Unknown collector kind: '{}'. Must be command or replay.",
                other
            ),
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load the config file if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}
