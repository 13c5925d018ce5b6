//! # Nitro Anti-Bot Engine
//!
//! Decides how much of a race reward a wallet may receive, based only on
//! race-cadence statistics from the race log.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RISK ASSESSMENT                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Race Log   │  │  Behavior   │  │   Risk Profile      │  │
//! │  │  Window     │─►│  Analyzer   │  │   (persisted)       │  │
//! │  └─────────────┘  └──────┬──────┘  └──────────┬──────────┘  │
//! │                          ▼                    │             │
//! │              ┌───────────────────────┐        │             │
//! │              │  Behavior Classifier  │◄───────┘             │
//! │              └───────────┬───────────┘                      │
//! │                          ▼                                  │
//! │              ┌───────────────────────┐                      │
//! │              │  Adjusted Reward,     │                      │
//! │              │  Penalty Tier, Gate   │                      │
//! │              └───────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Risk Tiers
//!
//! | Score | Level | Multiplier | Daily cap |
//! |-------|-------|------------|-----------|
//! | ≥ 70 | LOW | 1.0 | 2000 NP |
//! | ≥ 50 | MEDIUM | 0.5 | 800 NP |
//! | ≥ 30 | HIGH | 0.25 | 200 NP |
//! | < 30 | CRITICAL | 0.0 | 0 NP |

use chrono::{DateTime, Duration, Utc};
use nitro_core::{
    Amount, BehaviorDimensions, NitroError, PenaltyTier, RaceLogEntry, Result, RiskLevel,
    RiskProfile, WalletId,
};
use serde::{Deserialize, Serialize};

pub mod assessment;
pub mod behavior;
pub mod classifier;

// Re-exports
pub use assessment::*;
pub use behavior::*;
pub use classifier::*;

/// Behavior window and human reference statistics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Most recent races considered
    pub window_races: usize,
    /// Oldest race considered, in hours before now
    pub window_hours: i64,
    /// Below this many races every dimension is neutral
    pub min_races_for_analysis: usize,
    /// Score given to wallets without enough history
    pub neutral_score: f64,
    /// Coefficient of variation of inter-race gaps for casual human play
    pub human_interval_cv: f64,
    /// Mean gap below which play is faster than a human can queue races
    pub min_human_interval_secs: f64,
    /// Coefficient of variation of race durations for human drivers
    pub human_duration_cv: f64,
    /// Highest sustained win rate considered plausible
    pub plausible_winrate: f64,
    /// Share of the window a single earned amount may cover before it counts as a pattern
    pub pattern_tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_races: 20,
            window_hours: 24,
            min_races_for_analysis: 5,
            neutral_score: 100.0,
            human_interval_cv: 0.5,
            min_human_interval_secs: 30.0,
            human_duration_cv: 0.08,
            plausible_winrate: 0.7,
            pattern_tolerance: 0.5,
        }
    }
}

/// Penalty tier policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    /// Consecutive CRITICAL assessments before an automatic block
    pub block_after_strikes: u32,
    /// Length of an automatic block
    pub block_duration_secs: i64,
    pub warning_cooldown_secs: u64,
    pub suspect_cooldown_secs: u64,
    pub flagged_cooldown_secs: u64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            block_after_strikes: 3,
            block_duration_secs: 24 * 3600,
            warning_cooldown_secs: 30,
            suspect_cooldown_secs: 120,
            flagged_cooldown_secs: 600,
        }
    }
}

impl PenaltyConfig {
    /// Forced pause between races for a tier
    pub fn cooldown_for(&self, tier: PenaltyTier) -> u64 {
        match tier {
            PenaltyTier::None => 0,
            PenaltyTier::Warning => self.warning_cooldown_secs,
            PenaltyTier::Suspect => self.suspect_cooldown_secs,
            PenaltyTier::Flagged | PenaltyTier::Blocked => self.flagged_cooldown_secs,
        }
    }

    pub fn block_duration(&self) -> Duration {
        Duration::seconds(self.block_duration_secs)
    }
}

/// Risk engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub thresholds: RiskThresholds,
    pub policy: RiskPolicy,
    pub weights: DimensionWeights,
    pub analysis: AnalysisConfig,
    pub penalties: PenaltyConfig,
    /// How long `can_player_race` may reuse a cached gate
    pub gate_cache_ttl_secs: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            thresholds: RiskThresholds::default(),
            policy: RiskPolicy::default(),
            weights: DimensionWeights::default(),
            analysis: AnalysisConfig::default(),
            penalties: PenaltyConfig::default(),
            gate_cache_ttl_secs: 5,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.policy.validate()?;
        if !self.weights.verify() {
            return Err(NitroError::InvalidConfig(
                "dimension weights must sum to 1.0".into(),
            ));
        }
        let a = &self.analysis;
        if a.window_races == 0 || a.min_races_for_analysis < 2 {
            return Err(NitroError::InvalidConfig(
                "analysis window needs at least two races".into(),
            ));
        }
        if a.human_interval_cv <= 0.0 || a.human_duration_cv <= 0.0 {
            return Err(NitroError::InvalidConfig(
                "human reference CVs must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&a.plausible_winrate) || !(0.0..1.0).contains(&a.pattern_tolerance)
        {
            return Err(NitroError::InvalidConfig(
                "plausible_winrate and pattern_tolerance must be in [0, 1)".into(),
            ));
        }
        if self.penalties.block_duration_secs <= 0 || self.gate_cache_ttl_secs < 0 {
            return Err(NitroError::InvalidConfig(
                "block duration must be positive and cache TTL non-negative".into(),
            ));
        }
        Ok(())
    }
}
