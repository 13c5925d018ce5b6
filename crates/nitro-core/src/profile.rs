//! Behavioral risk data model
//!
//! Risk tiers, penalty tiers and the per-wallet `behavior_profile` row.

use crate::types::{Amount, WalletId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Automation likelihood tier. Ordered from least to most risky.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// All levels, least risky first
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Enforcement state of a wallet
///
/// ```text
///   None ─► Warning ─► Suspect ─► Flagged ─► Blocked
///    ▲         │          │          │          │
///    └─────────┴──────────┴──────────┘          │
///          one step down per clean assessment   │
///                       Flagged ◄── expiry ─────┘
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyTier {
    #[default]
    None,
    Warning,
    Suspect,
    Flagged,
    Blocked,
}

impl PenaltyTier {
    /// Tier a single assessment at `level` points to
    pub fn target_for(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => PenaltyTier::None,
            RiskLevel::Medium => PenaltyTier::Warning,
            RiskLevel::High => PenaltyTier::Suspect,
            RiskLevel::Critical => PenaltyTier::Flagged,
        }
    }

    /// One step towards `None`
    pub fn step_down(self) -> Self {
        match self {
            PenaltyTier::None | PenaltyTier::Warning => PenaltyTier::None,
            PenaltyTier::Suspect => PenaltyTier::Warning,
            PenaltyTier::Flagged => PenaltyTier::Suspect,
            // Blocked only leaves through expiry or an administrator
            PenaltyTier::Blocked => PenaltyTier::Blocked,
        }
    }

    /// Next tier after an assessment observed `level`.
    ///
    /// `critical_strikes` counts consecutive CRITICAL assessments including
    /// this one; reaching `block_after` escalates `Flagged` to `Blocked`.
    pub fn transition(self, level: RiskLevel, critical_strikes: u32, block_after: u32) -> Self {
        if self == PenaltyTier::Blocked {
            return PenaltyTier::Blocked;
        }
        if level == RiskLevel::Critical && block_after > 0 && critical_strikes >= block_after {
            return PenaltyTier::Blocked;
        }
        let target = Self::target_for(level);
        if target >= self {
            target
        } else {
            self.step_down().max(target)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyTier::None => "none",
            PenaltyTier::Warning => "warning",
            PenaltyTier::Suspect => "suspect",
            PenaltyTier::Flagged => "flagged",
            PenaltyTier::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for PenaltyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four independent behavior scores in [0, 100]; low means bot-like
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDimensions {
    /// Regularity of time between races
    pub interval_score: f64,
    /// Variance of race durations
    pub variability_score: f64,
    /// Deviation from plausible human win rates
    pub winrate_score: f64,
    /// Repetitiveness of earned amounts
    pub pattern_score: f64,
}

impl BehaviorDimensions {
    /// Same score on every dimension
    pub fn uniform(score: f64) -> Self {
        Self {
            interval_score: score,
            variability_score: score,
            winrate_score: score,
            pattern_score: score,
        }
    }
}

/// Persisted per-wallet risk state (`behavior_profile` row)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub wallet: WalletId,
    /// Composite of the four dimensions
    pub behavior_score: f64,
    pub risk_level: RiskLevel,
    pub penalty_tier: PenaltyTier,
    pub reward_multiplier: f64,
    pub forced_cooldown_seconds: u64,
    pub blocked_until: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
    pub flagged: bool,
    pub daily_earnings: Amount,
    pub races_today: u32,
    /// Consecutive CRITICAL assessments
    pub critical_strikes: u32,
    pub last_race_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RiskProfile {
    /// Profile for a wallet seen for the first time
    pub fn new(wallet: WalletId, now: DateTime<Utc>) -> Self {
        Self {
            wallet,
            behavior_score: 100.0,
            risk_level: RiskLevel::Low,
            penalty_tier: PenaltyTier::None,
            reward_multiplier: 1.0,
            forced_cooldown_seconds: 0,
            blocked_until: None,
            block_reason: None,
            flagged: false,
            daily_earnings: 0,
            races_today: 0,
            critical_strikes: 0,
            last_race_at: None,
            updated_at: now,
        }
    }

    /// Whether an active block covers `now`
    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.map(|until| until > now).unwrap_or(false)
    }

    /// Seconds left on an active block, rounded up
    pub fn block_remaining_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        self.blocked_until
            .filter(|until| *until > now)
            .map(|until| ceil_secs(until - now))
    }

    /// Seconds until the forced cooldown since the last race has elapsed
    pub fn cooldown_remaining_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.forced_cooldown_seconds == 0 {
            return None;
        }
        let until = self.last_race_at? + Duration::seconds(self.forced_cooldown_seconds as i64);
        (until > now).then(|| ceil_secs(until - now))
    }
}

fn ceil_secs(span: Duration) -> u64 {
    (span.num_milliseconds().max(0) as u64).div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert_eq!(serde_json::to_string(&RiskLevel::High).unwrap(), "\"HIGH\"");
    }

    #[test]
    fn test_tier_escalates_immediately() {
        let tier = PenaltyTier::None.transition(RiskLevel::High, 0, 3);
        assert_eq!(tier, PenaltyTier::Suspect);
    }

    #[test]
    fn test_tier_steps_down_one_at_a_time() {
        let tier = PenaltyTier::Flagged.transition(RiskLevel::Low, 0, 3);
        assert_eq!(tier, PenaltyTier::Suspect);
        let tier = tier.transition(RiskLevel::Low, 0, 3);
        assert_eq!(tier, PenaltyTier::Warning);
        let tier = tier.transition(RiskLevel::Low, 0, 3);
        assert_eq!(tier, PenaltyTier::None);
    }

    #[test]
    fn test_tier_blocks_on_repeated_critical() {
        let tier = PenaltyTier::None.transition(RiskLevel::Critical, 1, 3);
        assert_eq!(tier, PenaltyTier::Flagged);
        let tier = tier.transition(RiskLevel::Critical, 3, 3);
        assert_eq!(tier, PenaltyTier::Blocked);
        // Clean behavior does not lift a block
        assert_eq!(tier.transition(RiskLevel::Low, 0, 3), PenaltyTier::Blocked);
    }

    #[test]
    fn test_block_and_cooldown_windows() {
        let now = Utc::now();
        let mut profile = RiskProfile::new(WalletId::new("w1").unwrap(), now);
        assert!(!profile.is_blocked_at(now));

        profile.blocked_until = Some(now + Duration::seconds(90));
        assert!(profile.is_blocked_at(now));
        assert_eq!(profile.block_remaining_secs(now), Some(90));
        assert!(!profile.is_blocked_at(now + Duration::seconds(91)));

        profile.forced_cooldown_seconds = 120;
        profile.last_race_at = Some(now - Duration::seconds(20));
        assert_eq!(profile.cooldown_remaining_secs(now), Some(100));
        assert_eq!(profile.cooldown_remaining_secs(now + Duration::seconds(100)), None);
        assert_eq!(
            profile.cooldown_remaining_secs(now + Duration::milliseconds(99_500)),
            Some(1)
        );
    }
}
