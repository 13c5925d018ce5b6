//! Risk Assessment Service
//!
//! Runs the classifier against a wallet's race history and persisted
//! profile, producing the risk-adjusted reward and the pre-race gate.

use super::*;
use dashmap::DashMap;
use nitro_core::{start_of_day, Clock, ProfileStore, RaceLogStore};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Result of one risk assessment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub wallet: WalletId,
    /// Caller-supplied origin of the reward (e.g. "race_win")
    pub source: String,
    pub base_reward: Amount,
    pub adjusted_reward: Amount,
    pub risk_level: RiskLevel,
    pub behavior_score: f64,
    /// `None` when a block short-circuited the computation
    pub dimensions: Option<BehaviorDimensions>,
    pub reward_multiplier: f64,
    pub daily_cap: Amount,
    pub remaining_cap: Amount,
    pub daily_earnings: Amount,
    pub races_today: u32,
    pub penalty_tier: PenaltyTier,
    pub blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
    pub forced_cooldown_seconds: u64,
    pub reason: String,
    pub recommendations: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

/// Pre-race decision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceGate {
    pub allowed: bool,
    pub reason: String,
    pub wait_seconds: Option<u64>,
    pub penalty_tier: PenaltyTier,
}

/// Assessment computed against the stores but not yet persisted.
///
/// Nothing about the wallet changes until it is handed to
/// [`RiskAssessmentService::commit_assessment`]; dropping it discards the
/// assessment.
#[derive(Clone, Debug)]
pub struct PendingAssessment {
    assessment: RiskAssessment,
    profile: RiskProfile,
    auto_blocked: bool,
}

impl PendingAssessment {
    pub fn assessment(&self) -> &RiskAssessment {
        &self.assessment
    }
}

/// Profile state kept for the gate
#[derive(Clone, Debug)]
struct GateEntry {
    profile: RiskProfile,
    cached_at: DateTime<Utc>,
}

impl GateEntry {
    fn from_profile(profile: &RiskProfile, now: DateTime<Utc>) -> Self {
        Self {
            profile: profile.clone(),
            cached_at: now,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.cached_at < ttl
    }

    fn gate(&self, now: DateTime<Utc>) -> RaceGate {
        let profile = &self.profile;
        if let Some(wait) = profile.block_remaining_secs(now) {
            return RaceGate {
                allowed: false,
                reason: match &profile.block_reason {
                    Some(reason) => format!("wallet blocked: {}", reason),
                    None => "wallet blocked".to_string(),
                },
                wait_seconds: Some(wait),
                penalty_tier: PenaltyTier::Blocked,
            };
        }
        // An expired block is reported as flagged until the next assessment
        let penalty_tier = if profile.penalty_tier == PenaltyTier::Blocked {
            PenaltyTier::Flagged
        } else {
            profile.penalty_tier
        };
        if let Some(wait) = profile.cooldown_remaining_secs(now) {
            return RaceGate {
                allowed: false,
                reason: format!("{} cooldown between races", penalty_tier),
                wait_seconds: Some(wait),
                penalty_tier,
            };
        }
        RaceGate {
            allowed: true,
            reason: "ok".to_string(),
            wait_seconds: None,
            penalty_tier,
        }
    }
}

/// Risk assessment service
pub struct RiskAssessmentService {
    race_log: Arc<dyn RaceLogStore>,
    profiles: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
    config: RwLock<RiskConfig>,
    gate_cache: DashMap<WalletId, GateEntry>,
    last_sweep: Mutex<DateTime<Utc>>,
}

impl RiskAssessmentService {
    pub fn new(
        race_log: Arc<dyn RaceLogStore>,
        profiles: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
        config: RiskConfig,
    ) -> Result<Self> {
        config.validate()?;
        let now = clock.now();
        Ok(Self {
            race_log,
            profiles,
            clock,
            config: RwLock::new(config),
            gate_cache: DashMap::new(),
            last_sweep: Mutex::new(now),
        })
    }

    pub fn config(&self) -> RiskConfig {
        self.config.read().clone()
    }

    /// Swap in new policy. Cached gates are dropped so new cooldowns apply.
    pub fn reload_config(&self, config: RiskConfig) -> Result<()> {
        config.validate()?;
        *self.config.write() = config;
        self.gate_cache.clear();
        tracing::info!("Risk config reloaded");
        Ok(())
    }

    pub fn classifier(&self) -> BehaviorClassifier {
        BehaviorClassifier::new(&self.config.read())
    }

    /// Stored profile, if the wallet has ever been assessed
    pub async fn profile(&self, wallet: &WalletId) -> Result<Option<RiskProfile>> {
        self.profiles.load_profile(wallet).await
    }

    /// Assess `wallet` for a reward of `base_reward` and persist the
    /// resulting profile.
    pub async fn assess_risk(
        &self,
        wallet: &WalletId,
        base_reward: Amount,
        source: &str,
    ) -> Result<RiskAssessment> {
        let pending = self.evaluate_risk(wallet, base_reward, source).await?;
        self.commit_assessment(pending).await
    }

    /// Compute an assessment without writing anything.
    ///
    /// An active block short-circuits everything else and yields a zero
    /// reward. Otherwise the profile is recomputed, its penalty tier
    /// advanced, and the adjusted reward capped by the daily cap.
    pub async fn evaluate_risk(
        &self,
        wallet: &WalletId,
        base_reward: Amount,
        source: &str,
    ) -> Result<PendingAssessment> {
        let now = self.clock.now();
        let config = self.config();
        let mut profile = self.load_or_new(wallet, now).await?;

        self.expire_block(&mut profile, now);
        self.refresh_daily_totals(&mut profile, now).await?;

        if profile.is_blocked_at(now) {
            return Ok(self.blocked_assessment(profile, base_reward, source, now));
        }

        let (analyzer, classifier) = self.tools();
        let dims = self.analyze(&analyzer, wallet, now).await?;
        let score = classifier.composite_score(&dims);
        let level = classifier.classify_risk(score);
        let adj = classifier.adjust_reward(base_reward, level, profile.daily_earnings);

        let penalties = &config.penalties;
        profile.critical_strikes = if level == RiskLevel::Critical {
            profile.critical_strikes.saturating_add(1)
        } else {
            0
        };
        let previous_tier = profile.penalty_tier;
        let tier = previous_tier.transition(
            level,
            profile.critical_strikes,
            penalties.block_after_strikes,
        );
        let auto_blocked = tier == PenaltyTier::Blocked && previous_tier != PenaltyTier::Blocked;
        if auto_blocked {
            profile.blocked_until = Some(now + penalties.block_duration());
            profile.block_reason = Some(format!(
                "{} consecutive critical assessments",
                profile.critical_strikes
            ));
        }

        profile.behavior_score = score;
        profile.risk_level = level;
        profile.penalty_tier = tier;
        profile.reward_multiplier = adj.reward_multiplier;
        profile.forced_cooldown_seconds = penalties.cooldown_for(tier);
        profile.flagged |= tier >= PenaltyTier::Flagged;
        profile.last_race_at = Some(now);
        profile.updated_at = now;

        let blocked = adj.adjusted_reward == 0 && level == RiskLevel::Critical;
        if level >= RiskLevel::High {
            tracing::warn!(
                "Wallet {} assessed {} (score {:.1}, tier {}): reward {} -> {}",
                wallet,
                level,
                score,
                tier,
                base_reward,
                adj.adjusted_reward
            );
        } else {
            tracing::debug!(
                "Wallet {} assessed {} (score {:.1}): reward {} -> {}",
                wallet,
                level,
                score,
                base_reward,
                adj.adjusted_reward
            );
        }

        let assessment = RiskAssessment {
            wallet: wallet.clone(),
            source: source.to_string(),
            base_reward,
            adjusted_reward: adj.adjusted_reward,
            risk_level: level,
            behavior_score: score,
            dimensions: Some(dims),
            reward_multiplier: adj.reward_multiplier,
            daily_cap: adj.daily_cap,
            remaining_cap: adj.remaining_cap,
            daily_earnings: profile.daily_earnings,
            races_today: profile.races_today,
            penalty_tier: tier,
            blocked,
            blocked_until: profile.blocked_until,
            forced_cooldown_seconds: profile.forced_cooldown_seconds,
            reason: describe(level, score, base_reward, &adj),
            recommendations: recommendations(level, &dims, &adj, tier),
            assessed_at: now,
        };
        Ok(PendingAssessment {
            assessment,
            profile,
            auto_blocked,
        })
    }

    /// Persist the profile produced by [`evaluate_risk`](Self::evaluate_risk)
    pub async fn commit_assessment(&self, pending: PendingAssessment) -> Result<RiskAssessment> {
        let PendingAssessment {
            assessment,
            profile,
            auto_blocked,
        } = pending;
        self.store_profile(&profile, assessment.assessed_at).await?;
        if auto_blocked {
            if let Some(until) = profile.blocked_until {
                tracing::warn!("Wallet {} auto-blocked until {}", profile.wallet, until);
            }
        }
        Ok(assessment)
    }

    /// Cheap pre-race gate from cached block and cooldown state.
    ///
    /// The cache is refreshed from the profile store once the entry is
    /// older than the TTL; blocks and clears write through immediately.
    pub async fn can_player_race(&self, wallet: &WalletId) -> Result<RaceGate> {
        let now = self.clock.now();
        let ttl = Duration::seconds(self.config.read().gate_cache_ttl_secs);

        if let Some(entry) = self.gate_cache.get(wallet) {
            if entry.is_fresh(now, ttl) {
                return Ok(entry.gate(now));
            }
        }
        self.evict_stale(now, ttl);

        let entry = match self.profiles.load_profile(wallet).await? {
            Some(profile) => GateEntry::from_profile(&profile, now),
            None => GateEntry::from_profile(&RiskProfile::new(wallet.clone(), now), now),
        };
        let gate = entry.gate(now);
        self.gate_cache.insert(wallet.clone(), entry);
        Ok(gate)
    }

    /// Block a wallet by operator decision
    pub async fn block_wallet(
        &self,
        wallet: &WalletId,
        duration: Duration,
        reason: &str,
    ) -> Result<RiskProfile> {
        if duration <= Duration::zero() {
            return Err(NitroError::InvalidConfig(
                "block duration must be positive".into(),
            ));
        }
        let now = self.clock.now();
        let mut profile = self.load_or_new(wallet, now).await?;
        let until = now + duration;
        profile.penalty_tier = PenaltyTier::Blocked;
        profile.blocked_until = Some(until);
        profile.block_reason = Some(reason.to_string());
        profile.flagged = true;
        profile.risk_level = RiskLevel::Critical;
        profile.reward_multiplier = 0.0;
        profile.updated_at = now;
        self.store_profile(&profile, now).await?;

        tracing::warn!("Wallet {} blocked until {}: {}", wallet, until, reason);
        Ok(profile)
    }

    /// Lift a block and the flag, resetting the wallet to a clean tier
    pub async fn clear_block(&self, wallet: &WalletId) -> Result<RiskProfile> {
        let now = self.clock.now();
        let mut profile = self.load_or_new(wallet, now).await?;
        profile.penalty_tier = PenaltyTier::None;
        profile.blocked_until = None;
        profile.block_reason = None;
        profile.flagged = false;
        profile.critical_strikes = 0;
        profile.forced_cooldown_seconds = 0;
        profile.updated_at = now;
        self.store_profile(&profile, now).await?;

        tracing::info!("Wallet {} cleared by operator", wallet);
        Ok(profile)
    }

    /// Drop expired gate entries, at most once per TTL
    fn evict_stale(&self, now: DateTime<Utc>, ttl: Duration) {
        {
            let mut last = self.last_sweep.lock();
            if now - *last < ttl {
                return;
            }
            *last = now;
        }
        let before = self.gate_cache.len();
        self.gate_cache.retain(|_, entry| entry.is_fresh(now, ttl));
        tracing::debug!(
            "Gate cache sweep: {} -> {} entries",
            before,
            self.gate_cache.len()
        );
    }

    async fn load_or_new(&self, wallet: &WalletId, now: DateTime<Utc>) -> Result<RiskProfile> {
        Ok(self
            .profiles
            .load_profile(wallet)
            .await?
            .unwrap_or_else(|| RiskProfile::new(wallet.clone(), now)))
    }

    async fn store_profile(&self, profile: &RiskProfile, now: DateTime<Utc>) -> Result<()> {
        self.profiles.save_profile(profile).await?;
        self.gate_cache
            .insert(profile.wallet.clone(), GateEntry::from_profile(profile, now));
        Ok(())
    }

    fn tools(&self) -> (BehaviorAnalyzer, BehaviorClassifier) {
        let config = self.config.read();
        (
            BehaviorAnalyzer::new(config.analysis.clone()),
            BehaviorClassifier::new(&config),
        )
    }

    async fn analyze(
        &self,
        analyzer: &BehaviorAnalyzer,
        wallet: &WalletId,
        now: DateTime<Utc>,
    ) -> Result<BehaviorDimensions> {
        let recent = self
            .race_log
            .recent(wallet, analyzer.config().window_races)
            .await?;
        Ok(analyzer.analyze(analyzer.window(&recent, now)))
    }

    /// A lapsed block drops back to flagged
    fn expire_block(&self, profile: &mut RiskProfile, now: DateTime<Utc>) {
        if profile.blocked_until.is_some() && !profile.is_blocked_at(now) {
            profile.blocked_until = None;
            profile.block_reason = None;
            profile.critical_strikes = 0;
            if profile.penalty_tier == PenaltyTier::Blocked {
                profile.penalty_tier = PenaltyTier::Flagged;
            }
            tracing::info!("Block on wallet {} expired", profile.wallet);
        }
    }

    async fn refresh_daily_totals(&self, profile: &mut RiskProfile, now: DateTime<Utc>) -> Result<()> {
        let today = self
            .race_log
            .entries_since(&profile.wallet, start_of_day(now))
            .await?;
        profile.daily_earnings = today.iter().map(|e| e.np_earned).sum();
        profile.races_today = today.len() as u32;
        Ok(())
    }

    fn blocked_assessment(
        &self,
        mut profile: RiskProfile,
        base_reward: Amount,
        source: &str,
        now: DateTime<Utc>,
    ) -> PendingAssessment {
        profile.updated_at = now;

        let reason = match &profile.block_reason {
            Some(r) => format!("wallet blocked: {}", r),
            None => "wallet blocked".to_string(),
        };
        tracing::warn!("Reward for blocked wallet {} withheld ({})", profile.wallet, source);

        let assessment = RiskAssessment {
            wallet: profile.wallet.clone(),
            source: source.to_string(),
            base_reward,
            adjusted_reward: 0,
            risk_level: RiskLevel::Critical,
            behavior_score: profile.behavior_score,
            dimensions: None,
            reward_multiplier: 0.0,
            daily_cap: 0,
            remaining_cap: 0,
            daily_earnings: profile.daily_earnings,
            races_today: profile.races_today,
            penalty_tier: PenaltyTier::Blocked,
            blocked: true,
            blocked_until: profile.blocked_until,
            forced_cooldown_seconds: profile.forced_cooldown_seconds,
            reason,
            recommendations: vec!["Review block evidence before clearing".to_string()],
            assessed_at: now,
        };
        PendingAssessment {
            assessment,
            profile,
            auto_blocked: false,
        }
    }
}

fn describe(level: RiskLevel, score: f64, base: Amount, adj: &RewardAdjustment) -> String {
    let mut reason = format!("risk {} (score {:.1})", level, score);
    if adj.adjusted_reward == base {
        reason.push_str(": full reward");
        return reason;
    }
    if adj.reward_multiplier < 1.0 {
        reason.push_str(&format!(": reward x{}", adj.reward_multiplier));
    }
    if (base as f64 * adj.reward_multiplier).round() as Amount > adj.remaining_cap {
        reason.push_str(&format!(
            ", capped at {} remaining of {} daily",
            adj.remaining_cap, adj.daily_cap
        ));
    }
    reason
}

fn recommendations(
    level: RiskLevel,
    dims: &BehaviorDimensions,
    adj: &RewardAdjustment,
    tier: PenaltyTier,
) -> Vec<String> {
    let mut out = Vec::new();
    match level {
        RiskLevel::Low => {}
        RiskLevel::Medium => out.push("Monitor wallet over the next sessions".to_string()),
        RiskLevel::High => out.push("Investigate recent race history for automation".to_string()),
        RiskLevel::Critical => {
            if tier == PenaltyTier::Blocked {
                out.push("Wallet auto-blocked; review evidence before clearing".to_string())
            } else {
                out.push("Auto-block candidate; confirm with a manual review".to_string())
            }
        }
    }

    const LOW_DIMENSION: f64 = 30.0;
    if dims.interval_score < LOW_DIMENSION {
        out.push("Race intervals are machine-regular; check for scripted race starts".to_string());
    }
    if dims.variability_score < LOW_DIMENSION {
        out.push("Race durations barely vary; check for replayed inputs".to_string());
    }
    if dims.winrate_score < LOW_DIMENSION {
        out.push("Win rate implausibly high; review opponent matching".to_string());
    }
    if dims.pattern_score < LOW_DIMENSION {
        out.push("Earned amounts repeat; check for farming a single reward route".to_string());
    }
    if adj.daily_cap > 0 && adj.remaining_cap == 0 {
        out.push(format!("Daily cap of {} NP reached", adj.daily_cap));
    }
    out
}
