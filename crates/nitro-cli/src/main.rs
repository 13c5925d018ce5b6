//! Nitro Points CLI
//!
//! Operator and developer command line over the settlement engine.

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use nitro_core::{checked_amount, start_of_day, ChaChaSource, Clock, SystemClock, WalletId};
use nitro_economics::{SpendKind, VehicleAttributes};
use nitro_node::{
    run_simulation, EngineStores, LoggingConfig, NitroConfig, SettlementEngine, SimulationConfig,
};
use nitro_storage::{MemoryStores, StoreSnapshot};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "nitro")]
#[command(version)]
#[command(about = "Nitro Points economy - supply ledger, emission and anti-bot tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "NITRO_CONFIG")]
    config: Option<PathBuf>,

    /// Snapshot file; overrides `storage.state_file`
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a spend would be split
    Preview {
        /// Amount in NP
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },

    /// Commit a spend: burn, reward pool and treasury
    Spend {
        /// Amount in NP
        #[arg(allow_negative_numbers = true)]
        amount: i64,

        /// Paying wallet
        #[arg(short, long)]
        wallet: Option<String>,

        /// repair, oil_change, insurance, purchase or other
        #[arg(short, long, default_value = "other")]
        kind: String,
    },

    /// Gate, simulate and settle one race
    Race {
        /// Player wallet
        wallet: String,

        #[command(flatten)]
        vehicle: VehicleArgs,

        /// Seed for the opponent and race outcome
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check whether a wallet may start a race
    Gate {
        /// Player wallet
        wallet: String,
    },

    /// Run a risk assessment for a reward
    Assess {
        /// Player wallet
        wallet: String,

        /// Reward before risk adjustment
        #[arg(short, long, default_value = "100")]
        reward: u64,

        /// Where the reward comes from
        #[arg(long, default_value = "manual")]
        source: String,
    },

    /// Show the economy state
    State,

    /// Block a wallet
    Block {
        /// Player wallet
        wallet: String,

        /// Block length in hours
        #[arg(long, default_value = "24")]
        hours: i64,

        /// Reason recorded on the profile
        #[arg(short, long, default_value = "operator decision")]
        reason: String,
    },

    /// Lift a block and the flag on a wallet
    Unblock {
        /// Player wallet
        wallet: String,
    },

    /// Run a seeded population of human and scripted drivers
    Simulate {
        /// Number of human-like drivers
        #[arg(long, default_value = "20")]
        humans: usize,

        /// Number of bot-like drivers
        #[arg(long, default_value = "5")]
        bots: usize,

        /// Simulated hours
        #[arg(long, default_value = "24")]
        hours: i64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args)]
struct VehicleArgs {
    #[arg(long, default_value = "50")]
    speed: f64,

    #[arg(long, default_value = "50")]
    acceleration: f64,

    #[arg(long, default_value = "50")]
    handling: f64,

    #[arg(long, default_value = "50")]
    durability: f64,
}

impl VehicleArgs {
    fn attributes(&self) -> VehicleAttributes {
        VehicleAttributes::new(self.speed, self.acceleration, self.handling, self.durability)
    }
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let (json, text) = if logging.is_json() {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false),
            ),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(text)
        .init();
}

fn open_stores(path: &Path, config: &NitroConfig) -> anyhow::Result<MemoryStores> {
    if path.exists() {
        tracing::debug!("Loading state from {}", path.display());
        Ok(MemoryStores::from_snapshot(StoreSnapshot::load(path)?))
    } else {
        tracing::info!("No state at {}, starting from genesis", path.display());
        Ok(MemoryStores::new(config.ledger.genesis(&SystemClock)))
    }
}

fn save_stores(path: &Path, stores: &MemoryStores) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    stores.to_snapshot().save(path)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = NitroConfig::load(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging);

    let state_path = cli
        .state
        .clone()
        .unwrap_or_else(|| config.storage.state_file.clone());

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
            return Ok(());
        }

        Commands::Simulate {
            humans,
            bots,
            hours,
            seed,
        } => {
            let sim = SimulationConfig {
                humans,
                bots,
                hours,
                seed,
                start: start_of_day(Utc::now()),
            };
            tracing::info!(
                "Simulating {} humans and {} bots for {}h (seed {})",
                humans,
                bots,
                hours,
                seed
            );
            let report = run_simulation(&config, &sim).await?;

            println!(
                "{:<12} {:<6} {:>8} {:>6} {:>6} {:>7} {:>10} {:<9} {:<13} {:<7}",
                "wallet",
                "kind",
                "attempts",
                "races",
                "wins",
                "denied",
                "np",
                "risk",
                "tier",
                "flagged"
            );
            for d in &report.drivers {
                let risk = d
                    .risk_level
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<12} {:<6} {:>8} {:>6} {:>6} {:>7} {:>10} {:<9} {:<13} {:<7}",
                    d.wallet.as_str(),
                    d.kind.to_string(),
                    d.attempts,
                    d.races,
                    d.wins,
                    d.denied,
                    d.np_earned,
                    risk,
                    d.penalty_tier.to_string(),
                    if d.blocked { "blocked" } else if d.flagged { "yes" } else { "no" },
                );
            }
            println!();
            println!("Races settled: {}", report.races_settled);
            println!("Total minted:  {}", report.economy.total_minted);
            println!("Minted today:  {}", report.economy.daily_emitted);
            if cli.metrics {
                println!();
                print!("{}", report.metrics);
            }
            return Ok(());
        }

        _ => {}
    }

    let stores = open_stores(&state_path, &config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = SettlementEngine::new(&config, EngineStores::from(&stores), clock)?;

    let mutated = match cli.command {
        Commands::Preview { amount } => {
            print_json(&engine.preview_spend(checked_amount(amount)?))?;
            false
        }

        Commands::Spend {
            amount,
            wallet,
            kind,
        } => {
            let amount = checked_amount(amount)?;
            let kind: SpendKind = kind.parse()?;
            let wallet = wallet.map(WalletId::new).transpose()?;
            let result = engine.process_spend(amount, wallet.as_ref(), kind).await?;
            print_json(&result)?;
            true
        }

        Commands::Race {
            wallet,
            vehicle,
            seed,
        } => {
            let wallet = WalletId::new(wallet)?;
            let rng = match seed {
                Some(seed) => ChaChaSource::from_seed(seed),
                None => ChaChaSource::from_entropy(),
            };
            let run = engine.run_race(&wallet, &vehicle.attributes(), &rng).await?;
            if !run.preparation.gate.allowed {
                tracing::warn!("Race refused for {}: {}", wallet, run.preparation.gate.reason);
            }
            print_json(&run)?;
            true
        }

        Commands::Gate { wallet } => {
            let wallet = WalletId::new(wallet)?;
            print_json(&engine.risk().can_player_race(&wallet).await?)?;
            false
        }

        Commands::Assess {
            wallet,
            reward,
            source,
        } => {
            let wallet = WalletId::new(wallet)?;
            let assessment = engine.risk().assess_risk(&wallet, reward, &source).await?;
            print_json(&assessment)?;
            true
        }

        Commands::State => {
            let state = engine.economy_state().await?;
            print_json(&state)?;
            println!(
                "Effective daily limit: {}",
                engine.emission().effective_daily_limit()
            );
            false
        }

        Commands::Block {
            wallet,
            hours,
            reason,
        } => {
            let wallet = WalletId::new(wallet)?;
            let profile = engine
                .risk()
                .block_wallet(&wallet, Duration::hours(hours), &reason)
                .await?;
            print_json(&profile)?;
            true
        }

        Commands::Unblock { wallet } => {
            let wallet = WalletId::new(wallet)?;
            print_json(&engine.risk().clear_block(&wallet).await?)?;
            true
        }

        Commands::Config | Commands::Simulate { .. } => false,
    };

    if mutated {
        save_stores(&state_path, &stores)?;
    }
    if cli.metrics {
        print!("{}", engine.metrics().render()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitro_core::NitroError;

    fn amount_of(args: &[&str]) -> i64 {
        match Cli::try_parse_from(args).unwrap().command {
            Commands::Preview { amount } | Commands::Spend { amount, .. } => amount,
            _ => panic!("not an amount command"),
        }
    }

    #[test]
    fn test_non_positive_amounts_reach_validation() {
        assert_eq!(amount_of(&["nitro", "preview", "250"]), 250);
        assert_eq!(amount_of(&["nitro", "preview", "0"]), 0);
        assert_eq!(amount_of(&["nitro", "spend", "-40", "--kind", "repair"]), -40);

        for raw in [0, -40] {
            assert!(matches!(
                checked_amount(raw),
                Err(NitroError::InvalidAmount { .. })
            ));
        }
    }

    #[test]
    fn test_metrics_flag_is_global() {
        assert!(Cli::try_parse_from(["nitro", "state", "--metrics"]).unwrap().metrics);
        assert!(Cli::try_parse_from(["nitro", "--metrics", "simulate"]).unwrap().metrics);
        assert!(!Cli::try_parse_from(["nitro", "state"]).unwrap().metrics);
    }
}
