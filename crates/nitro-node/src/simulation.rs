//! Population simulation
//!
//! Runs human-like and scripted drivers through a fresh settlement engine
//! on a manual clock, to see how the anti-bot engine and the emission
//! schedule treat each group.

use crate::config::NitroConfig;
use crate::settlement::{EngineStores, RaceRequest, SettlementEngine};
use chrono::{DateTime, Duration, Utc};
use nitro_core::{
    Amount, ChaChaSource, Clock, EconomyState, ManualClock, PenaltyTier, RaceId, RandomSource,
    Result, RiskLevel, WalletId,
};
use nitro_economics::VehicleAttributes;
use nitro_storage::MemoryStores;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Scripted drivers replay the same winning lap
const BOT_LAP_SECS: f64 = 62.0;

/// Scripted drivers queue the next race this soon
const BOT_REQUEUE_SECS: i64 = 20;

/// Simulation parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub humans: usize,
    pub bots: usize,
    pub hours: i64,
    pub seed: u64,
    pub start: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Human,
    Bot,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Human => write!(f, "human"),
            DriverKind::Bot => write!(f, "bot"),
        }
    }
}

/// Per-driver outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverReport {
    pub wallet: WalletId,
    pub kind: DriverKind,
    pub attempts: u32,
    pub races: u32,
    pub wins: u32,
    pub denied: u32,
    pub np_earned: Amount,
    pub risk_level: Option<RiskLevel>,
    pub penalty_tier: PenaltyTier,
    pub flagged: bool,
    pub blocked: bool,
}

/// Simulation result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub drivers: Vec<DriverReport>,
    pub economy: EconomyState,
    pub races_settled: u64,
    /// Prometheus exposition of the run's counters
    pub metrics: String,
}

struct Driver {
    wallet: WalletId,
    kind: DriverKind,
    vehicle: VehicleAttributes,
    next_at: DateTime<Utc>,
    attempts: u32,
    races: u32,
    wins: u32,
    denied: u32,
    np_earned: Amount,
}

/// Run the simulation on in-memory stores
pub async fn run_simulation(
    config: &NitroConfig,
    sim: &SimulationConfig,
) -> Result<SimulationReport> {
    let clock = Arc::new(ManualClock::new(sim.start));
    let stores = MemoryStores::new(config.ledger.genesis(clock.as_ref()));
    let engine = SettlementEngine::new(config, EngineStores::from(&stores), clock.clone())?;
    let rng = ChaChaSource::from_seed(sim.seed);

    let mut drivers = spawn_drivers(sim, &rng)?;
    let end = sim.start + Duration::hours(sim.hours);

    loop {
        let next = match drivers
            .iter_mut()
            .filter(|d| d.next_at < end)
            .min_by_key(|d| d.next_at)
        {
            Some(driver) => driver,
            None => break,
        };
        clock.set(next.next_at);
        let now = clock.now();
        next.attempts += 1;

        let prep = engine.prepare_race(&next.wallet, &next.vehicle, &rng).await?;
        let opponent = match prep.opponent {
            Some(opponent) if prep.gate.allowed => opponent,
            _ => {
                next.denied += 1;
                let wait = prep.gate.wait_seconds.unwrap_or(60).max(1) as i64;
                next.next_at = now + Duration::seconds(wait);
                continue;
            }
        };

        let (won, duration_secs) = match next.kind {
            DriverKind::Human => {
                let outcome = engine
                    .balancing()
                    .simulate_race(&next.vehicle, &opponent, &rng);
                (outcome.won, outcome.duration_secs)
            }
            DriverKind::Bot => (true, BOT_LAP_SECS),
        };

        let settlement = engine
            .settle_race(&RaceRequest {
                race_id: RaceId::new(),
                wallet: next.wallet.clone(),
                vehicle: next.vehicle,
                won,
                duration_secs,
            })
            .await?;

        next.races += 1;
        next.wins += u32::from(won);
        next.np_earned += settlement.np_awarded;
        next.next_at = match next.kind {
            DriverKind::Human => {
                now + Duration::milliseconds(
                    ((duration_secs + rng.range_f64(45.0, 1_500.0)) * 1000.0) as i64,
                )
            }
            DriverKind::Bot => now + Duration::seconds(BOT_REQUEUE_SECS),
        };
    }

    let mut reports = Vec::with_capacity(drivers.len());
    for driver in drivers {
        let profile = engine.risk().profile(&driver.wallet).await?;
        let now = clock.now();
        reports.push(DriverReport {
            risk_level: profile.as_ref().map(|p| p.risk_level),
            penalty_tier: profile.as_ref().map(|p| p.penalty_tier).unwrap_or_default(),
            flagged: profile.as_ref().map(|p| p.flagged).unwrap_or(false),
            blocked: profile.as_ref().map(|p| p.is_blocked_at(now)).unwrap_or(false),
            wallet: driver.wallet,
            kind: driver.kind,
            attempts: driver.attempts,
            races: driver.races,
            wins: driver.wins,
            denied: driver.denied,
            np_earned: driver.np_earned,
        });
    }

    tracing::info!(
        "Simulation finished: {} drivers over {}h",
        reports.len(),
        sim.hours
    );

    Ok(SimulationReport {
        drivers: reports,
        economy: engine.economy_state().await?,
        races_settled: engine.metrics().races_settled(),
        metrics: engine.metrics().render()?,
    })
}

fn spawn_drivers(sim: &SimulationConfig, rng: &dyn RandomSource) -> Result<Vec<Driver>> {
    let mut drivers = Vec::with_capacity(sim.humans + sim.bots);
    for i in 0..sim.humans {
        let stat = || rng.range_f64(40.0, 75.0);
        drivers.push(Driver {
            wallet: WalletId::new(format!("human-{:02}", i))?,
            kind: DriverKind::Human,
            vehicle: VehicleAttributes::new(stat(), stat(), stat(), stat()),
            next_at: sim.start + Duration::seconds(rng.range_f64(0.0, 600.0) as i64),
            attempts: 0,
            races: 0,
            wins: 0,
            denied: 0,
            np_earned: 0,
        });
    }
    for i in 0..sim.bots {
        drivers.push(Driver {
            wallet: WalletId::new(format!("bot-{:02}", i))?,
            kind: DriverKind::Bot,
            vehicle: VehicleAttributes::new(100.0, 100.0, 100.0, 100.0),
            next_at: sim.start + Duration::seconds(i as i64 * 5),
            attempts: 0,
            races: 0,
            wins: 0,
            denied: 0,
            np_earned: 0,
        });
    }
    Ok(drivers)
}
