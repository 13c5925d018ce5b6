//! # Nitro Core
//!
//! Core data model for the Nitro Points (NP) reward economy.
//!
//! This crate provides the building blocks shared by every other crate:
//! - `EconomyState` / `LedgerOp` - the supply ledger row and its atomic mutations
//! - `RiskProfile` / `RiskLevel` / `PenaltyTier` - per-wallet behavioral risk state
//! - `RaceLogEntry` - one row of the append-only race log
//! - `Clock` / `RandomSource` - injectable time and randomness
//! - `LedgerStore` / `RaceLogStore` / `ProfileStore` - persistence interfaces
//!
//! ## Reward Flow
//!
//! ```text
//!   race outcome ──► base reward ──► risk-adjusted ──► emission-checked ──► ledger
//!                    (balancing)     (assessment)      (daily/hard cap)     (mint)
//!
//!   spend ──► split ──► burn + reward pool + treasury ──► ledger
//! ```

pub mod clock;
pub mod error;
pub mod profile;
pub mod random;
pub mod state;
pub mod store;
pub mod types;

pub use clock::*;
pub use error::*;
pub use profile::*;
pub use random::*;
pub use state::*;
pub use store::*;
pub use types::*;
