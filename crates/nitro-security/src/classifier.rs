//! Behavior risk classifier
//!
//! Pure functions from dimension scores to a composite score, and from a
//! score to a risk level, reward multiplier and daily earnings cap.

use super::*;

/// Score thresholds, each the lowest score still in that level
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 70.0,
            medium: 50.0,
            high: 30.0,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<()> {
        let ordered = self.low > self.medium && self.medium > self.high && self.high > 0.0;
        if !ordered || self.low > 100.0 {
            return Err(NitroError::InvalidConfig(format!(
                "risk thresholds must descend within (0, 100]: {} / {} / {}",
                self.low, self.medium, self.high
            )));
        }
        Ok(())
    }
}

/// One value per risk level
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelTable<T> {
    pub low: T,
    pub medium: T,
    pub high: T,
    pub critical: T,
}

impl<T: Copy + PartialOrd> LevelTable<T> {
    pub fn get(&self, level: RiskLevel) -> T {
        match level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }

    /// Lower risk never maps to a smaller value
    pub fn is_non_increasing(&self) -> bool {
        self.low >= self.medium && self.medium >= self.high && self.high >= self.critical
    }
}

/// Reward multiplier and daily cap per level
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    pub reward_multipliers: LevelTable<f64>,
    pub daily_caps: LevelTable<Amount>,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            reward_multipliers: LevelTable {
                low: 1.0,
                medium: 0.5,
                high: 0.25,
                critical: 0.0,
            },
            daily_caps: LevelTable {
                low: 2_000,
                medium: 800,
                high: 200,
                critical: 0,
            },
        }
    }
}

impl RiskPolicy {
    pub fn validate(&self) -> Result<()> {
        let m = &self.reward_multipliers;
        if RiskLevel::ALL
            .iter()
            .any(|level| !(0.0..=1.0).contains(&m.get(*level)))
        {
            return Err(NitroError::InvalidConfig(
                "reward multipliers must be in [0, 1]".into(),
            ));
        }
        if !m.is_non_increasing() || !self.daily_caps.is_non_increasing() {
            return Err(NitroError::InvalidConfig(
                "reward multipliers and daily caps must not grow with risk".into(),
            ));
        }
        Ok(())
    }
}

/// Weights of the four behavior dimensions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionWeights {
    pub interval: f64,
    pub variability: f64,
    pub winrate: f64,
    pub pattern: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            interval: 0.30,
            variability: 0.20,
            winrate: 0.30,
            pattern: 0.20,
        }
    }
}

impl DimensionWeights {
    /// Verify weights sum to 1.0
    pub fn verify(&self) -> bool {
        let sum = self.interval + self.variability + self.winrate + self.pattern;
        (sum - 1.0).abs() < 0.001
    }
}

/// Risk-adjusted reward for one assessment
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardAdjustment {
    pub reward_multiplier: f64,
    pub daily_cap: Amount,
    pub remaining_cap: Amount,
    pub adjusted_reward: Amount,
}

/// Stateless classifier
#[derive(Clone, Debug, Default)]
pub struct BehaviorClassifier {
    thresholds: RiskThresholds,
    policy: RiskPolicy,
    weights: DimensionWeights,
}

impl BehaviorClassifier {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            policy: config.policy.clone(),
            weights: config.weights.clone(),
        }
    }

    /// Weighted composite in [0, 100]
    pub fn composite_score(&self, dims: &BehaviorDimensions) -> f64 {
        let w = &self.weights;
        let score = dims.interval_score * w.interval
            + dims.variability_score * w.variability
            + dims.winrate_score * w.winrate
            + dims.pattern_score * w.pattern;
        if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 100.0)
        }
    }

    pub fn classify_risk(&self, score: f64) -> RiskLevel {
        let t = &self.thresholds;
        if score >= t.low {
            RiskLevel::Low
        } else if score >= t.medium {
            RiskLevel::Medium
        } else if score >= t.high {
            RiskLevel::High
        } else {
            // NaN lands here too
            RiskLevel::Critical
        }
    }

    pub fn reward_multiplier(&self, level: RiskLevel) -> f64 {
        self.policy.reward_multipliers.get(level)
    }

    pub fn daily_cap(&self, level: RiskLevel) -> Amount {
        self.policy.daily_caps.get(level)
    }

    /// `min(round(base × multiplier), max(0, cap − earned today))`
    pub fn adjust_reward(
        &self,
        base_reward: Amount,
        level: RiskLevel,
        daily_earnings: Amount,
    ) -> RewardAdjustment {
        let reward_multiplier = self.reward_multiplier(level);
        let daily_cap = self.daily_cap(level);
        let remaining_cap = daily_cap.saturating_sub(daily_earnings);
        let scaled = (base_reward as f64 * reward_multiplier).round() as Amount;
        RewardAdjustment {
            reward_multiplier,
            daily_cap,
            remaining_cap,
            adjusted_reward: scaled.min(remaining_cap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_threshold_boundaries() {
        let classifier = BehaviorClassifier::default();
        assert_eq!(classifier.classify_risk(100.0), RiskLevel::Low);
        assert_eq!(classifier.classify_risk(70.0), RiskLevel::Low);
        assert_eq!(classifier.classify_risk(69.9), RiskLevel::Medium);
        assert_eq!(classifier.classify_risk(50.0), RiskLevel::Medium);
        assert_eq!(classifier.classify_risk(30.0), RiskLevel::High);
        assert_eq!(classifier.classify_risk(29.9), RiskLevel::Critical);
        assert_eq!(classifier.classify_risk(f64::NAN), RiskLevel::Critical);
    }

    #[test]
    fn test_high_risk_scenario() {
        let classifier = BehaviorClassifier::default();
        let adj = classifier.adjust_reward(100, RiskLevel::High, 150);
        assert_eq!(adj.reward_multiplier, 0.25);
        assert_eq!(adj.daily_cap, 200);
        assert_eq!(adj.remaining_cap, 50);
        assert_eq!(adj.adjusted_reward, 25);
    }

    #[test]
    fn test_cap_limits_reward() {
        let classifier = BehaviorClassifier::default();
        assert_eq!(classifier.adjust_reward(500, RiskLevel::Low, 1_800).adjusted_reward, 200);
        assert_eq!(classifier.adjust_reward(500, RiskLevel::Low, 5_000).adjusted_reward, 0);
        assert_eq!(classifier.adjust_reward(500, RiskLevel::Critical, 0).adjusted_reward, 0);
    }

    #[test]
    fn test_composite_score() {
        let classifier = BehaviorClassifier::default();
        assert_eq!(classifier.composite_score(&BehaviorDimensions::uniform(80.0)), 80.0);
        let dims = BehaviorDimensions {
            interval_score: 0.0,
            variability_score: 100.0,
            winrate_score: 0.0,
            pattern_score: 100.0,
        };
        assert!((classifier.composite_score(&dims) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_policy_validation() {
        assert!(RiskPolicy::default().validate().is_ok());
        let mut policy = RiskPolicy::default();
        policy.daily_caps.high = 5_000;
        assert!(policy.validate().is_err());

        let thresholds = RiskThresholds {
            low: 40.0,
            medium: 50.0,
            high: 30.0,
        };
        assert!(thresholds.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_classification_monotonic(s1 in 0.0f64..100.0, s2 in 0.0f64..100.0) {
            let classifier = BehaviorClassifier::default();
            let (lo, hi) = if s1 < s2 { (s1, s2) } else { (s2, s1) };
            // A lower score is never a lower risk level
            prop_assert!(classifier.classify_risk(lo) >= classifier.classify_risk(hi));
        }

        #[test]
        fn prop_policy_non_increasing(a in 0usize..4, b in 0usize..4) {
            let classifier = BehaviorClassifier::default();
            let (la, lb) = (RiskLevel::ALL[a.min(b)], RiskLevel::ALL[a.max(b)]);
            prop_assert!(classifier.reward_multiplier(la) >= classifier.reward_multiplier(lb));
            prop_assert!(classifier.daily_cap(la) >= classifier.daily_cap(lb));
        }
    }
}
