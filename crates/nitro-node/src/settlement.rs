//! Race settlement
//!
//! Wires the reward flow for one race end to end:
//!
//! ```text
//! claim race id ─► reward curve ─► anti-farm ─► risk assessment ─► emission ─► finalize
//! ```
//!
//! The race id is claimed in the race log before anything else, so a
//! race can be credited at most once. The wallet's risk profile is only
//! written after the mint, and a failure before the mint commits releases
//! the claim, so the whole step may be retried. Settlements for one wallet
//! are serialized.

use crate::config::{NitroConfig, SettlementConfig};
use crate::metrics::EconomyMetrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nitro_core::{
    Amount, Clock, EconomyState, LedgerStore, ProfileStore, RaceId, RaceLogEntry, RaceLogStore,
    RandomSource, Result, WalletId,
};
use nitro_economics::{
    AntiFarmAdjustment, BalancingCalculator, EmissionController, EmissionResult, RaceOutcome,
    SpendKind, SplitPreview, SupplyLedger, TransactionResult, TransactionSplitter,
    VehicleAttributes,
};
use nitro_security::{PendingAssessment, RaceGate, RiskAssessment, RiskAssessmentService};
use nitro_storage::MemoryStores;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Store handles the engine runs on
#[derive(Clone)]
pub struct EngineStores {
    pub ledger: Arc<dyn LedgerStore>,
    pub race_log: Arc<dyn RaceLogStore>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl From<&MemoryStores> for EngineStores {
    fn from(stores: &MemoryStores) -> Self {
        Self {
            ledger: stores.ledger.clone(),
            race_log: stores.race_log.clone(),
            profiles: stores.profiles.clone(),
        }
    }
}

/// A finished race to settle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceRequest {
    pub race_id: RaceId,
    pub wallet: WalletId,
    pub vehicle: VehicleAttributes,
    pub won: bool,
    pub duration_secs: f64,
}

/// Pre-race gate and matchmaking
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RacePreparation {
    pub gate: RaceGate,
    pub power_score: f64,
    /// Opponent target strength including the anti-farm boost
    pub difficulty: f64,
    pub anti_farm: AntiFarmAdjustment,
    /// `None` when the gate denied the race
    pub opponent: Option<VehicleAttributes>,
}

/// Everything decided for one race
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceSettlement {
    pub race_id: RaceId,
    pub wallet: WalletId,
    pub won: bool,
    pub power_score: f64,
    pub base_reward: Amount,
    /// After the PowerScore curve
    pub curve_reward: Amount,
    pub anti_farm: AntiFarmAdjustment,
    /// After the anti-farm multiplier; what the risk assessment saw
    pub farm_adjusted_reward: Amount,
    pub assessment: RiskAssessment,
    /// `None` when the assessment left nothing to mint
    pub emission: Option<EmissionResult>,
    pub np_awarded: Amount,
    pub xp_awarded: u64,
    pub settled_at: DateTime<Utc>,
}

/// Gate, simulated race and settlement in one go
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceRun {
    pub preparation: RacePreparation,
    pub outcome: Option<RaceOutcome>,
    pub settlement: Option<RaceSettlement>,
}

struct Award {
    power_score: f64,
    base_reward: Amount,
    curve_reward: Amount,
    farm_adjusted_reward: Amount,
    pending: PendingAssessment,
    emission: Option<EmissionResult>,
}

impl Award {
    fn np(&self) -> Amount {
        self.emission.as_ref().map(|e| e.emitted).unwrap_or(0)
    }
}

/// Economy facade used by the game flow
pub struct SettlementEngine {
    ledger: Arc<SupplyLedger>,
    splitter: TransactionSplitter,
    emission: EmissionController,
    balancing: BalancingCalculator,
    risk: RiskAssessmentService,
    race_log: Arc<dyn RaceLogStore>,
    clock: Arc<dyn Clock>,
    settlement: RwLock<SettlementConfig>,
    metrics: EconomyMetrics,
    wallet_locks: DashMap<WalletId, Arc<Mutex<()>>>,
}

impl SettlementEngine {
    pub fn new(config: &NitroConfig, stores: EngineStores, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let ledger = Arc::new(SupplyLedger::new(stores.ledger, clock.clone()));
        Ok(Self {
            splitter: TransactionSplitter::new(ledger.clone(), config.split)?,
            emission: EmissionController::new(ledger.clone(), config.emission.clone())?,
            balancing: BalancingCalculator::new(config.balancing.clone())?,
            risk: RiskAssessmentService::new(
                stores.race_log.clone(),
                stores.profiles,
                clock.clone(),
                config.risk.clone(),
            )?,
            ledger,
            race_log: stores.race_log,
            clock,
            settlement: RwLock::new(config.settlement.clone()),
            metrics: EconomyMetrics::new()?,
            wallet_locks: DashMap::new(),
        })
    }

    /// Push a new configuration to every component. Nothing changes if
    /// the configuration does not validate.
    pub fn reload(&self, config: &NitroConfig) -> Result<()> {
        config.validate()?;
        self.splitter.reload_policy(config.split)?;
        self.emission.reload_policy(config.emission.clone())?;
        self.risk.reload_config(config.risk.clone())?;
        self.balancing.reload_config(config.balancing.clone())?;
        *self.settlement.write() = config.settlement.clone();
        Ok(())
    }

    pub fn risk(&self) -> &RiskAssessmentService {
        &self.risk
    }

    pub fn balancing(&self) -> &BalancingCalculator {
        &self.balancing
    }

    pub fn emission(&self) -> &EmissionController {
        &self.emission
    }

    pub fn metrics(&self) -> &EconomyMetrics {
        &self.metrics
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Read-only ledger view
    pub async fn economy_state(&self) -> Result<EconomyState> {
        self.ledger.snapshot().await
    }

    /// Split of a spend, for display before commit
    pub fn preview_spend(&self, amount: Amount) -> SplitPreview {
        self.splitter.preview(amount)
    }

    /// Commit a spend through the splitter
    pub async fn process_spend(
        &self,
        amount: Amount,
        wallet: Option<&WalletId>,
        kind: SpendKind,
    ) -> Result<TransactionResult> {
        let result = self
            .splitter
            .process_transaction(amount, wallet, kind.as_str())
            .await?;
        self.metrics
            .record_spend(result.burned, result.to_reward_pool, result.to_treasury);
        Ok(result)
    }

    /// Gate the wallet and pick an opponent
    pub async fn prepare_race(
        &self,
        wallet: &WalletId,
        vehicle: &VehicleAttributes,
        rng: &dyn RandomSource,
    ) -> Result<RacePreparation> {
        let gate = self.risk.can_player_race(wallet).await?;
        let power_score = self.balancing.calculate_power_score(vehicle);
        let difficulty = self.balancing.dynamic_difficulty(power_score);

        if !gate.allowed {
            return Ok(RacePreparation {
                gate,
                power_score,
                difficulty,
                anti_farm: AntiFarmAdjustment::neutral(0.0),
                opponent: None,
            });
        }

        let anti_farm = self.anti_farm(wallet).await?;
        let opponent =
            self.balancing
                .generate_opponent_stats(power_score, anti_farm.difficulty_boost, rng);
        Ok(RacePreparation {
            gate,
            power_score,
            difficulty: difficulty + anti_farm.difficulty_boost,
            anti_farm,
            opponent: Some(opponent),
        })
    }

    /// Prepare, simulate and settle a race
    pub async fn run_race(
        &self,
        wallet: &WalletId,
        vehicle: &VehicleAttributes,
        rng: &dyn RandomSource,
    ) -> Result<RaceRun> {
        let preparation = self.prepare_race(wallet, vehicle, rng).await?;
        let opponent = match preparation.opponent {
            Some(opponent) => opponent,
            None => {
                return Ok(RaceRun {
                    preparation,
                    outcome: None,
                    settlement: None,
                })
            }
        };

        let outcome = self.balancing.simulate_race(vehicle, &opponent, rng);
        let settlement = self
            .settle_race(&RaceRequest {
                race_id: RaceId::new(),
                wallet: wallet.clone(),
                vehicle: *vehicle,
                won: outcome.won,
                duration_secs: outcome.duration_secs,
            })
            .await?;
        Ok(RaceRun {
            preparation,
            outcome: Some(outcome),
            settlement: Some(settlement),
        })
    }

    /// Settle a finished race exactly once.
    ///
    /// Fails with `DuplicateRace` if the race id was already settled.
    /// Settlements for the same wallet run one at a time, so each sees
    /// the earnings of the previous one against its daily cap.
    pub async fn settle_race(&self, request: &RaceRequest) -> Result<RaceSettlement> {
        let lock = self
            .wallet_locks
            .entry(request.wallet.clone())
            .or_default()
            .value()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.settle_locked(request).await
        };
        drop(lock);
        self.wallet_locks
            .remove_if(&request.wallet, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn settle_locked(&self, request: &RaceRequest) -> Result<RaceSettlement> {
        let now = self.clock.now();
        let config = self.settlement.read().clone();
        let anti_farm = self.anti_farm(&request.wallet).await?;
        let xp_awarded = config.xp(request.won);

        self.race_log
            .append(RaceLogEntry {
                race_id: request.race_id,
                wallet: request.wallet.clone(),
                timestamp: now,
                np_earned: 0,
                xp_earned: xp_awarded,
                duration_secs: request.duration_secs,
                won: request.won,
            })
            .await?;

        let award = match self.award(request, &anti_farm, &config).await {
            Ok(award) => award,
            Err(e) => {
                // Nothing was minted or persisted; free the race id for a retry
                self.release_claim(request.race_id).await;
                return Err(e);
            }
        };

        let np_awarded = award.np();
        let assessment = match self.finish(request.race_id, np_awarded, award.pending).await {
            Ok(assessment) => assessment,
            Err(e) if np_awarded == 0 => {
                self.release_claim(request.race_id).await;
                return Err(e);
            }
            Err(e) => {
                // The mint is committed; keep the claim so a retry cannot credit twice
                tracing::error!(
                    "Race {} minted {} NP but settlement did not complete: {}",
                    request.race_id,
                    np_awarded,
                    e
                );
                return Err(e);
            }
        };

        self.metrics
            .record_race(assessment.risk_level, assessment.blocked, np_awarded);
        if let Some(reason) = award.emission.as_ref().and_then(|e| e.reason) {
            self.metrics.record_shortfall(reason);
        }

        tracing::info!(
            "Race {} settled for {}: {} NP, {} XP ({})",
            request.race_id,
            request.wallet,
            np_awarded,
            xp_awarded,
            assessment.risk_level
        );

        Ok(RaceSettlement {
            race_id: request.race_id,
            wallet: request.wallet.clone(),
            won: request.won,
            power_score: award.power_score,
            base_reward: award.base_reward,
            curve_reward: award.curve_reward,
            anti_farm,
            farm_adjusted_reward: award.farm_adjusted_reward,
            assessment,
            emission: award.emission,
            np_awarded,
            xp_awarded,
            settled_at: now,
        })
    }

    /// Reward curve × anti-farm × risk, then the emission caps. The risk
    /// profile is evaluated here but only persisted by [`Self::finish`].
    async fn award(
        &self,
        request: &RaceRequest,
        anti_farm: &AntiFarmAdjustment,
        config: &SettlementConfig,
    ) -> Result<Award> {
        let base_reward = config.base_reward(request.won);
        let power_score = self.balancing.calculate_power_score(&request.vehicle);
        let curve_reward =
            self.balancing
                .calculate_reward(base_reward, power_score, request.vehicle.handling);
        let farm_adjusted_reward =
            (curve_reward as f64 * anti_farm.reward_multiplier).round() as Amount;

        let source = if request.won { "race_win" } else { "race_loss" };
        let pending = self
            .risk
            .evaluate_risk(&request.wallet, farm_adjusted_reward, source)
            .await?;

        let adjusted_reward = pending.assessment().adjusted_reward;
        let emission = if adjusted_reward > 0 {
            Some(
                self.emission
                    .emit_tokens(&request.wallet, adjusted_reward, source)
                    .await?,
            )
        } else {
            None
        };

        Ok(Award {
            power_score,
            base_reward,
            curve_reward,
            farm_adjusted_reward,
            pending,
            emission,
        })
    }

    /// Record the minted amount on the race and persist the risk profile
    async fn finish(
        &self,
        race_id: RaceId,
        np_awarded: Amount,
        pending: PendingAssessment,
    ) -> Result<RiskAssessment> {
        self.race_log.finalize_earnings(race_id, np_awarded).await?;
        self.risk.commit_assessment(pending).await
    }

    async fn release_claim(&self, race_id: RaceId) {
        if let Err(e) = self.race_log.release(race_id).await {
            tracing::error!("Failed to release race {} after error: {}", race_id, e);
        }
    }

    async fn anti_farm(&self, wallet: &WalletId) -> Result<AntiFarmAdjustment> {
        let window = self.balancing.config().anti_farm.window_races;
        let recent = self.race_log.recent(wallet, window).await?;
        let wins = recent.iter().filter(|e| e.won).count() as u32;
        Ok(self
            .balancing
            .anti_farm_adjustment(wins, recent.len() as u32))
    }
}
