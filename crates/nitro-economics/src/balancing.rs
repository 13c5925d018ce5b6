//! # Reward Balancing
//!
//! Converts vehicle attributes and recent results into a base reward, an
//! opponent difficulty and an anti-farm penalty.
//!
//! ## PowerScore
//!
//! | Attribute | Weight |
//! |-----------|--------|
//! | Speed | 35% |
//! | Acceleration | 30% |
//! | Handling | 20% |
//! | Durability | 15% |
//!
//! ## Reward Curve
//!
//! ```text
//! reward = round(base × ln(ps + 1) / ln(101) × (1 + min(handling/100 × 0.15, 0.15)))
//! ```
//!
//! The log curve is 1.0 at PowerScore 100 and grows sub-linearly, so
//! stacking stats cannot produce runaway payouts.

use nitro_core::{Amount, NitroError, RandomSource, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

const ATTRIBUTE_MAX: f64 = 100.0;

/// Course length used by the race simulator, in seconds at neutral stats
const REFERENCE_RACE_SECS: f64 = 90.0;

/// PowerScore weights
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerScoreWeights {
    pub speed: f64,
    pub acceleration: f64,
    pub handling: f64,
    pub durability: f64,
}

impl Default for PowerScoreWeights {
    fn default() -> Self {
        Self {
            speed: 0.35,
            acceleration: 0.30,
            handling: 0.20,
            durability: 0.15,
        }
    }
}

impl PowerScoreWeights {
    /// Verify weights sum to 1.0
    pub fn verify(&self) -> bool {
        let sum = self.speed + self.acceleration + self.handling + self.durability;
        (sum - 1.0).abs() < 0.001
    }
}

/// Vehicle stats, each in [0, 100]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleAttributes {
    pub speed: f64,
    pub acceleration: f64,
    pub handling: f64,
    pub durability: f64,
}

impl VehicleAttributes {
    pub fn new(speed: f64, acceleration: f64, handling: f64, durability: f64) -> Self {
        Self {
            speed,
            acceleration,
            handling,
            durability,
        }
        .clamped()
    }

    /// Same stats forced into [0, 100]; NaN counts as 0
    pub fn clamped(self) -> Self {
        Self {
            speed: clamp_stat(self.speed),
            acceleration: clamp_stat(self.acceleration),
            handling: clamp_stat(self.handling),
            durability: clamp_stat(self.durability),
        }
    }
}

fn clamp_stat(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, ATTRIBUTE_MAX)
    }
}

/// Anti-farm parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiFarmConfig {
    /// Below this many recent races no penalty applies
    pub min_races: u32,
    /// Highest win rate considered plausible
    pub winrate_threshold: f64,
    /// Reward reduction at a 100% win rate
    pub max_penalty: f64,
    /// Opponent stat boost at a 100% win rate
    pub max_difficulty_boost: f64,
    /// Recent races looked at
    pub window_races: usize,
}

impl Default for AntiFarmConfig {
    fn default() -> Self {
        Self {
            min_races: 5,
            winrate_threshold: 0.7,
            max_penalty: 0.30,
            max_difficulty_boost: 15.0,
            window_races: 20,
        }
    }
}

/// Balancing configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancingConfig {
    pub weights: PowerScoreWeights,
    pub difficulty_base: f64,
    pub difficulty_slope: f64,
    pub opponent_spread: f64,
    pub opponent_floor: f64,
    pub opponent_ceiling: f64,
    pub max_efficiency_bonus: f64,
    pub anti_farm: AntiFarmConfig,
    pub min_damage_multiplier: f64,
    pub min_collision_multiplier: f64,
    pub base_handling_variance: f64,
    pub max_handling_variance_reduction: f64,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            weights: PowerScoreWeights::default(),
            difficulty_base: 50.0,
            difficulty_slope: 0.4,
            opponent_spread: 10.0,
            opponent_floor: 20.0,
            opponent_ceiling: 100.0,
            max_efficiency_bonus: 0.15,
            anti_farm: AntiFarmConfig::default(),
            min_damage_multiplier: 0.6,
            min_collision_multiplier: 0.7,
            base_handling_variance: 0.2,
            max_handling_variance_reduction: 0.75,
        }
    }
}

impl BalancingConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.weights.verify() {
            return Err(NitroError::InvalidConfig(
                "PowerScore weights must sum to 1.0".into(),
            ));
        }
        if self.opponent_floor > self.opponent_ceiling {
            return Err(NitroError::InvalidConfig(
                "opponent_floor above opponent_ceiling".into(),
            ));
        }
        let af = &self.anti_farm;
        if !(0.0..1.0).contains(&af.winrate_threshold) || !(0.0..=1.0).contains(&af.max_penalty) {
            return Err(NitroError::InvalidConfig(
                "anti-farm threshold must be in [0, 1) and penalty in [0, 1]".into(),
            ));
        }
        // Mitigation curves must never reach a zero-risk state
        if !(self.min_damage_multiplier > 0.0 && self.min_damage_multiplier <= 1.0)
            || !(self.min_collision_multiplier > 0.0 && self.min_collision_multiplier <= 1.0)
            || !(0.0..1.0).contains(&self.max_handling_variance_reduction)
        {
            return Err(NitroError::InvalidConfig(
                "mitigation floors must stay above zero".into(),
            ));
        }
        Ok(())
    }
}

/// Anti-farm outcome; both fields move together
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AntiFarmAdjustment {
    pub reward_multiplier: f64,
    pub difficulty_boost: f64,
    pub win_rate: f64,
}

impl AntiFarmAdjustment {
    pub fn neutral(win_rate: f64) -> Self {
        Self {
            reward_multiplier: 1.0,
            difficulty_boost: 0.0,
            win_rate,
        }
    }

    pub fn is_penalized(&self) -> bool {
        self.reward_multiplier < 1.0
    }
}

/// Simulated race result
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceOutcome {
    pub won: bool,
    pub player_performance: f64,
    pub opponent_performance: f64,
    pub duration_secs: f64,
}

/// Reward balancing calculator
pub struct BalancingCalculator {
    config: RwLock<BalancingConfig>,
}

impl Default for BalancingCalculator {
    fn default() -> Self {
        Self {
            config: RwLock::new(BalancingConfig::default()),
        }
    }
}

impl BalancingCalculator {
    pub fn new(config: BalancingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
        })
    }

    pub fn config(&self) -> BalancingConfig {
        self.config.read().clone()
    }

    pub fn reload_config(&self, config: BalancingConfig) -> Result<()> {
        config.validate()?;
        *self.config.write() = config;
        tracing::info!("Balancing config reloaded");
        Ok(())
    }

    /// Weighted stat composite in [0, 100]
    pub fn calculate_power_score(&self, attrs: &VehicleAttributes) -> f64 {
        let a = attrs.clamped();
        let cfg = self.config.read();
        let w = &cfg.weights;
        a.speed * w.speed
            + a.acceleration * w.acceleration
            + a.handling * w.handling
            + a.durability * w.durability
    }

    /// Opponent strength for a player PowerScore
    pub fn dynamic_difficulty(&self, player_power_score: f64) -> f64 {
        let cfg = self.config.read();
        cfg.difficulty_base + clamp_stat(player_power_score) * cfg.difficulty_slope
    }

    /// Draw opponent stats around the dynamic difficulty plus `difficulty_boost`
    pub fn generate_opponent_stats(
        &self,
        player_power_score: f64,
        difficulty_boost: f64,
        rng: &dyn RandomSource,
    ) -> VehicleAttributes {
        let target = self.dynamic_difficulty(player_power_score) + difficulty_boost.max(0.0);
        let cfg = self.config.read();
        let draw = || {
            rng.range_f64(target - cfg.opponent_spread, target + cfg.opponent_spread)
                .clamp(cfg.opponent_floor, cfg.opponent_ceiling)
        };
        VehicleAttributes {
            speed: draw(),
            acceleration: draw(),
            handling: draw(),
            durability: draw(),
        }
    }

    /// Apply the log PowerScore curve and the handling efficiency bonus
    pub fn calculate_reward(&self, base_reward: Amount, power_score: f64, handling: f64) -> Amount {
        let power_score = clamp_stat(power_score);
        if power_score <= 0.0 || base_reward == 0 {
            return 0;
        }
        let max_bonus = self.config.read().max_efficiency_bonus;
        let log_multiplier = (power_score + 1.0).ln() / (ATTRIBUTE_MAX + 1.0).ln();
        let efficiency = 1.0 + (clamp_stat(handling) / ATTRIBUTE_MAX * max_bonus).min(max_bonus);
        (base_reward as f64 * log_multiplier * efficiency).round() as Amount
    }

    /// Penalty for implausibly high recent win rates
    pub fn anti_farm_adjustment(&self, recent_wins: u32, recent_races: u32) -> AntiFarmAdjustment {
        let config = self.config.read();
        let cfg = &config.anti_farm;
        if recent_races == 0 {
            return AntiFarmAdjustment::neutral(0.0);
        }
        let win_rate = (recent_wins.min(recent_races) as f64) / recent_races as f64;
        if recent_races < cfg.min_races || win_rate <= cfg.winrate_threshold {
            return AntiFarmAdjustment::neutral(win_rate);
        }

        let severity = (win_rate - cfg.winrate_threshold) / (1.0 - cfg.winrate_threshold);
        let adjustment = AntiFarmAdjustment {
            reward_multiplier: 1.0 - cfg.max_penalty * severity,
            difficulty_boost: cfg.max_difficulty_boost * severity,
            win_rate,
        };
        tracing::debug!(
            "Anti-farm: win rate {:.2} over {} races -> x{:.3}, +{:.1} difficulty",
            win_rate,
            recent_races,
            adjustment.reward_multiplier,
            adjustment.difficulty_boost
        );
        adjustment
    }

    /// Top-speed multiplier, 0.75 to 1.25
    pub fn speed_multiplier(&self, speed: f64) -> f64 {
        0.75 + 0.5 * clamp_stat(speed) / ATTRIBUTE_MAX
    }

    /// Acceleration multiplier, 0.8 to 1.2
    pub fn acceleration_multiplier(&self, acceleration: f64) -> f64 {
        0.8 + 0.4 * clamp_stat(acceleration) / ATTRIBUTE_MAX
    }

    /// Relative performance noise; better handling means a steadier car
    pub fn handling_variance(&self, handling: f64) -> f64 {
        let cfg = self.config.read();
        cfg.base_handling_variance
            * (1.0 - cfg.max_handling_variance_reduction * clamp_stat(handling) / ATTRIBUTE_MAX)
    }

    /// Damage multiplier, 1.0 at durability 0 down to the configured floor
    pub fn durability_damage_reduction(&self, durability: f64) -> f64 {
        let floor = self.config.read().min_damage_multiplier;
        1.0 - (1.0 - floor) * clamp_stat(durability) / ATTRIBUTE_MAX
    }

    /// Collision chance multiplier, 1.0 at durability 0 down to the configured floor
    pub fn durability_collision_reduction(&self, durability: f64) -> f64 {
        let floor = self.config.read().min_collision_multiplier;
        1.0 - (1.0 - floor) * clamp_stat(durability) / ATTRIBUTE_MAX
    }

    /// Resolve a race between two cars
    pub fn simulate_race(
        &self,
        player: &VehicleAttributes,
        opponent: &VehicleAttributes,
        rng: &dyn RandomSource,
    ) -> RaceOutcome {
        let perform = |car: &VehicleAttributes| {
            let variance = self.handling_variance(car.handling);
            self.calculate_power_score(car) * (1.0 + rng.range_f64(-variance, variance))
        };
        let player_performance = perform(player);
        let opponent_performance = perform(opponent);

        let pace = (self.speed_multiplier(player.speed)
            + self.acceleration_multiplier(player.acceleration))
            / 2.0;
        let duration_secs = REFERENCE_RACE_SECS / pace * (1.0 + rng.range_f64(-0.15, 0.15));

        RaceOutcome {
            won: player_performance > opponent_performance,
            player_performance,
            opponent_performance,
            duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitro_core::ChaChaSource;
    use proptest::prelude::*;

    #[test]
    fn test_power_score_weights() {
        let calc = BalancingCalculator::default();
        assert!(PowerScoreWeights::default().verify());
        let attrs = VehicleAttributes::new(100.0, 0.0, 0.0, 0.0);
        assert!((calc.calculate_power_score(&attrs) - 35.0).abs() < 1e-9);
        let maxed = VehicleAttributes::new(150.0, 100.0, 100.0, 100.0);
        assert!((calc.calculate_power_score(&maxed) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reward_curve_endpoints() {
        let calc = BalancingCalculator::default();
        assert_eq!(calc.calculate_reward(100, 100.0, 0.0), 100);
        assert_eq!(calc.calculate_reward(100, 0.0, 80.0), 0);
        // Full handling adds the 15% efficiency bonus
        assert_eq!(calc.calculate_reward(100, 100.0, 100.0), 115);
        // Half the PowerScore still pays well over half
        assert!(calc.calculate_reward(100, 50.0, 0.0) > 80);
    }

    #[test]
    fn test_anti_farm_boundaries() {
        let calc = BalancingCalculator::default();
        assert_eq!(calc.anti_farm_adjustment(4, 4).reward_multiplier, 1.0);
        let boundary = calc.anti_farm_adjustment(7, 10);
        assert_eq!(boundary.reward_multiplier, 1.0);
        assert_eq!(boundary.difficulty_boost, 0.0);

        let perfect = calc.anti_farm_adjustment(20, 20);
        assert!((perfect.reward_multiplier - 0.7).abs() < 1e-9);
        assert!((perfect.difficulty_boost - 15.0).abs() < 1e-9);
        assert!(perfect.is_penalized());
    }

    #[test]
    fn test_difficulty_and_opponents() {
        let calc = BalancingCalculator::default();
        assert!((calc.dynamic_difficulty(100.0) - 90.0).abs() < 1e-9);

        let rng = ChaChaSource::from_seed(7);
        for _ in 0..50 {
            let opp = calc.generate_opponent_stats(100.0, 15.0, &rng);
            for stat in [opp.speed, opp.acceleration, opp.handling, opp.durability] {
                assert!((20.0..=100.0).contains(&stat));
            }
        }
        let weak = calc.generate_opponent_stats(0.0, 0.0, &rng);
        assert!(weak.speed >= 40.0 && weak.speed <= 60.0);
    }

    #[test]
    fn test_anti_farm_strictly_decreasing_above_threshold() {
        let calc = BalancingCalculator::default();
        for races in 5u32..60 {
            let mut previous = 1.0;
            for wins in 0..=races {
                let adj = calc.anti_farm_adjustment(wins, races);
                if adj.win_rate > 0.7 {
                    assert!(adj.reward_multiplier < previous);
                }
                previous = adj.reward_multiplier;
            }
        }
    }

    #[test]
    fn test_mitigation_floors() {
        let calc = BalancingCalculator::default();
        assert!((calc.durability_damage_reduction(100.0) - 0.6).abs() < 1e-9);
        assert!((calc.durability_collision_reduction(100.0) - 0.7).abs() < 1e-9);
        assert_eq!(calc.durability_damage_reduction(0.0), 1.0);
        assert!(calc.handling_variance(100.0) > 0.0);
        assert!(calc.handling_variance(100.0) < calc.handling_variance(0.0));
    }

    #[test]
    fn test_simulation_is_reproducible() {
        let calc = BalancingCalculator::default();
        let player = VehicleAttributes::new(80.0, 70.0, 60.0, 50.0);
        let opponent = VehicleAttributes::new(60.0, 60.0, 60.0, 60.0);

        let a = calc.simulate_race(&player, &opponent, &ChaChaSource::from_seed(42));
        let b = calc.simulate_race(&player, &opponent, &ChaChaSource::from_seed(42));
        assert_eq!(a, b);
        assert!(a.duration_secs > 60.0 && a.duration_secs < 130.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = BalancingConfig::default();
        config.weights.speed = 0.9;
        assert!(BalancingCalculator::new(config).is_err());

        let mut config = BalancingConfig::default();
        config.min_damage_multiplier = 0.0;
        assert!(config.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_reward_monotonic_in_power_score(base in 1u64..10_000, low in 0.0f64..100.0, delta in 0.0f64..100.0) {
            let calc = BalancingCalculator::default();
            let high = (low + delta).min(100.0);
            prop_assert!(calc.calculate_reward(base, low, 50.0) <= calc.calculate_reward(base, high, 50.0));
        }

        #[test]
        fn prop_anti_farm_never_increases_reward(races in 0u32..200, wins in 0u32..200) {
            let calc = BalancingCalculator::default();
            let adj = calc.anti_farm_adjustment(wins, races);
            prop_assert!(adj.reward_multiplier <= 1.0 && adj.reward_multiplier >= 0.7 - 1e-9);
            prop_assert_eq!(adj.reward_multiplier == 1.0, adj.difficulty_boost == 0.0);
        }
    }
}
