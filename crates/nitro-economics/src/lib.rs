//! # Nitro Economics - NP Tokenomics & Reward System
//!
//! Supply-side economy of the Nitro Points (NP) reward token.
//!
//! ## Key Features
//!
//! - **Hard cap**: cumulative minting never exceeds `max_supply`
//! - **Deflationary spends**: every spend burns 10%, funds the reward pool with 20%,
//!   and sends the rest to the treasury
//! - **Decaying emission**: the daily mint allowance shrinks every week down to a floor
//! - **Anti-inflationary rewards**: logarithmic PowerScore curve plus an anti-farm penalty
//!
//! ## Spend Split
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SPEND OF N NP                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Burn:         floor(N × 10%), at least 1                   │
//! │  Reward pool:  floor(N × 20%), at least 1                   │
//! │  Treasury:     N − burn − reward pool (absorbs rounding)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Emission Schedule
//!
//! | Week | Daily limit (default) |
//! |------|-----------------------|
//! | 0 | 1,000,000 NP |
//! | 1 | 980,000 NP |
//! | 10 | ~817,000 NP |
//! | 69+ | 250,000 NP (floor) |

pub mod balancing;
pub mod emission;
pub mod ledger;
pub mod splitter;

// Re-exports
pub use balancing::{
    AntiFarmAdjustment, AntiFarmConfig, BalancingCalculator, BalancingConfig, PowerScoreWeights,
    RaceOutcome, VehicleAttributes,
};
pub use emission::{EmissionController, EmissionPolicy, EmissionResult, EmissionShortfall};
pub use ledger::{LedgerConfig, SupplyLedger};
pub use splitter::{SpendKind, SplitPolicy, SplitPreview, TransactionResult, TransactionSplitter};

/// NP token constants
pub mod constants {
    use nitro_core::Amount;

    /// Default hard cap: 1 billion NP
    pub const DEFAULT_MAX_SUPPLY: Amount = 1_000_000_000;

    /// Basis points in 100%
    pub const BPS_DENOMINATOR: u64 = 10_000;

    /// Burn share of every spend: 10%
    pub const DEFAULT_BURN_BPS: u64 = 1_000;

    /// Reward pool share of every spend: 20%
    pub const DEFAULT_REWARD_POOL_BPS: u64 = 2_000;

    /// Era 0 daily emission limit
    pub const DEFAULT_BASE_DAILY_LIMIT: Amount = 1_000_000;

    /// Weekly emission decay
    pub const DEFAULT_WEEKLY_DECAY_PERCENT: f64 = 2.0;

    /// Emission floor: the daily limit never decays below this
    pub const DEFAULT_MIN_DAILY_EMISSION: Amount = 250_000;

    /// Compare-and-swap retries before an emission gives up as contended
    pub const MAX_MINT_ATTEMPTS: usize = 8;
}

pub use constants::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_split_leaves_treasury_majority() {
        let treasury_bps = BPS_DENOMINATOR - DEFAULT_BURN_BPS - DEFAULT_REWARD_POOL_BPS;
        assert_eq!(treasury_bps, 7_000);
    }

    #[test]
    fn test_emission_floor_below_base() {
        assert!(DEFAULT_MIN_DAILY_EMISSION < DEFAULT_BASE_DAILY_LIMIT);
        assert!(DEFAULT_BASE_DAILY_LIMIT < DEFAULT_MAX_SUPPLY);
    }
}
