//! Behavior dimension analysis
//!
//! Scores a wallet's recent race window on four axes. Each score is in
//! [0, 100] and low means bot-like.
//!
//! - **interval**: scripted clients start races on a fixed cadence, so
//!   inter-race gaps with almost no spread score low
//! - **variability**: replayed inputs finish in near-identical times
//! - **winrate**: sustained win rates above what humans manage
//! - **pattern**: the same earned amount over and over

use super::*;
use std::collections::HashMap;

/// Computes [`BehaviorDimensions`] from race log entries
#[derive(Clone, Debug, Default)]
pub struct BehaviorAnalyzer {
    config: AnalysisConfig,
}

impl BehaviorAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Start of the analysis window
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(self.config.window_hours)
    }

    /// Keep the most recent `window_races` entries inside the time window.
    /// Input must be oldest first.
    pub fn window<'a>(
        &self,
        entries: &'a [RaceLogEntry],
        now: DateTime<Utc>,
    ) -> &'a [RaceLogEntry] {
        let start = self.window_start(now);
        let first_in_time = entries.partition_point(|e| e.timestamp < start);
        let in_time = &entries[first_in_time..];
        let skip = in_time.len().saturating_sub(self.config.window_races);
        &in_time[skip..]
    }

    /// Score a window, oldest entry first
    pub fn analyze(&self, window: &[RaceLogEntry]) -> BehaviorDimensions {
        if window.len() < self.config.min_races_for_analysis {
            return BehaviorDimensions::uniform(self.config.neutral_score);
        }
        BehaviorDimensions {
            interval_score: self.interval_score(window),
            variability_score: self.variability_score(window),
            winrate_score: self.winrate_score(window),
            pattern_score: self.pattern_score(window),
        }
    }

    fn interval_score(&self, window: &[RaceLogEntry]) -> f64 {
        let gaps: Vec<f64> = window
            .windows(2)
            .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0)
            .collect();
        let (mean, cv) = match mean_and_cv(&gaps) {
            Some(stats) => stats,
            None => return 0.0,
        };
        let regularity = ratio_score(cv, self.config.human_interval_cv);
        if mean < self.config.min_human_interval_secs {
            regularity * (mean / self.config.min_human_interval_secs)
        } else {
            regularity
        }
    }

    fn variability_score(&self, window: &[RaceLogEntry]) -> f64 {
        let durations: Vec<f64> = window.iter().map(|e| e.duration_secs).collect();
        match mean_and_cv(&durations) {
            Some((_, cv)) => ratio_score(cv, self.config.human_duration_cv),
            None => 0.0,
        }
    }

    fn winrate_score(&self, window: &[RaceLogEntry]) -> f64 {
        let wins = window.iter().filter(|e| e.won).count() as f64;
        let rate = wins / window.len() as f64;
        falloff_score(rate, self.config.plausible_winrate)
    }

    fn pattern_score(&self, window: &[RaceLogEntry]) -> f64 {
        let mut counts: HashMap<Amount, usize> = HashMap::new();
        for entry in window {
            *counts.entry(entry.np_earned).or_default() += 1;
        }
        let dominant = counts.values().copied().max().unwrap_or(0) as f64;
        falloff_score(dominant / window.len() as f64, self.config.pattern_tolerance)
    }
}

/// Mean and coefficient of variation; `None` when the mean is not positive
fn mean_and_cv(samples: &[f64]) -> Option<(f64, f64)> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    if mean <= 0.0 || !mean.is_finite() {
        return None;
    }
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt() / mean))
}

/// 100 once `value` reaches `reference`, linear below it
fn ratio_score(value: f64, reference: f64) -> f64 {
    (value / reference).clamp(0.0, 1.0) * 100.0
}

/// 100 up to `tolerance`, linear down to 0 at a share of 1.0
fn falloff_score(share: f64, tolerance: f64) -> f64 {
    if share <= tolerance {
        return 100.0;
    }
    (100.0 * (1.0 - (share - tolerance) / (1.0 - tolerance))).clamp(0.0, 100.0)
}
