//! # Nitro Node
//!
//! Configuration, metrics and the race settlement engine that ties the
//! economy and anti-bot crates together.

pub mod config;
pub mod metrics;
pub mod settlement;
pub mod simulation;

pub use config::{LoggingConfig, NitroConfig, SettlementConfig, StorageConfig};
pub use metrics::EconomyMetrics;
pub use settlement::{
    EngineStores, RacePreparation, RaceRequest, RaceRun, RaceSettlement, SettlementEngine,
};
pub use simulation::{run_simulation, DriverKind, DriverReport, SimulationConfig, SimulationReport};
