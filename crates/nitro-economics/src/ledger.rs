//! # Supply Ledger
//!
//! Authoritative record of minted, burned, pooled and treasury NP.
//!
//! The ledger never performs a read-modify-write of its own: every mutation
//! is handed to the [`LedgerStore`] as one batch of [`LedgerOp`]s, which the
//! store applies atomically. A rejected batch leaves the row unchanged.

use crate::constants::DEFAULT_MAX_SUPPLY;
use nitro_core::{Amount, Clock, EconomyState, LedgerOp, LedgerStore, NitroError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ledger configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Hard cap on cumulative minting
    #[serde(default = "default_max_supply")]
    pub max_supply: Amount,
}

fn default_max_supply() -> Amount {
    DEFAULT_MAX_SUPPLY
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_supply: default_max_supply(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_supply == 0 {
            return Err(NitroError::InvalidConfig("max_supply must be positive".into()));
        }
        Ok(())
    }

    /// Genesis row for this configuration
    pub fn genesis(&self, clock: &dyn Clock) -> EconomyState {
        EconomyState::genesis(self.max_supply, clock.today())
    }
}

/// Single-writer view over the ledger store
pub struct SupplyLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl SupplyLedger {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Consistent point-in-time view. A daily counter left over from a
    /// previous UTC day is reported as zero; nothing is written.
    pub async fn snapshot(&self) -> Result<EconomyState> {
        let state = self.store.snapshot().await?;
        Ok(state.as_of(self.clock.today()))
    }

    pub async fn apply_burn(&self, amount: Amount) -> Result<EconomyState> {
        self.apply_single(LedgerOp::Burn(amount)).await
    }

    pub async fn apply_to_pool(&self, amount: Amount) -> Result<EconomyState> {
        self.apply_single(LedgerOp::ToPool(amount)).await
    }

    pub async fn apply_to_treasury(&self, amount: Amount) -> Result<EconomyState> {
        self.apply_single(LedgerOp::ToTreasury(amount)).await
    }

    /// Mint against the hard cap only
    pub async fn apply_mint(&self, amount: Amount) -> Result<EconomyState> {
        self.apply_single(LedgerOp::Mint {
            amount,
            daily_limit: None,
        })
        .await
    }

    /// Mint against the hard cap and today's limit, rolling the daily
    /// counter over first if the UTC day changed. Both happen in one batch.
    pub async fn mint_within_daily_limit(
        &self,
        amount: Amount,
        daily_limit: Amount,
    ) -> Result<EconomyState> {
        self.apply_batch(&[
            LedgerOp::RolloverDay(self.clock.today()),
            LedgerOp::Mint {
                amount,
                daily_limit: Some(daily_limit),
            },
        ])
        .await
    }

    /// Apply several ops as one logical unit
    pub async fn apply_batch(&self, batch: &[LedgerOp]) -> Result<EconomyState> {
        for op in batch {
            let amount = match *op {
                LedgerOp::Burn(a) | LedgerOp::ToPool(a) | LedgerOp::ToTreasury(a) => a,
                LedgerOp::Mint { amount, .. } => amount,
                LedgerOp::RolloverDay(_) => continue,
            };
            if amount == 0 {
                return Err(NitroError::invalid_amount(0));
            }
        }

        let state = self.store.apply(batch).await?;
        if !state.verify() {
            tracing::error!(
                "Ledger invariant violated: minted {} (max {}), burned {}, pool {}, treasury {}",
                state.total_minted,
                state.max_supply,
                state.total_burned,
                state.reward_pool_balance,
                state.treasury_balance
            );
            return Err(NitroError::Internal("ledger supply invariant violated".into()));
        }
        tracing::debug!("Ledger batch committed: {:?}", batch);
        Ok(state)
    }

    async fn apply_single(&self, op: LedgerOp) -> Result<EconomyState> {
        self.apply_batch(&[op]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use nitro_core::{CapKind, ManualClock};
    use nitro_storage::MemoryLedgerStore;

    fn ledger(max_supply: Amount) -> (SupplyLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap(),
        ));
        let config = LedgerConfig { max_supply };
        let store = Arc::new(MemoryLedgerStore::new(config.genesis(clock.as_ref())));
        (SupplyLedger::new(store, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_mutators_update_totals() {
        let (ledger, _) = ledger(10_000);
        ledger.apply_mint(1_000).await.unwrap();
        ledger.apply_burn(10).await.unwrap();
        ledger.apply_to_pool(20).await.unwrap();
        let state = ledger.apply_to_treasury(70).await.unwrap();

        assert_eq!(state.total_minted, 1_000);
        assert_eq!(state.total_burned, 10);
        assert_eq!(state.reward_pool_balance, 20);
        assert_eq!(state.treasury_balance, 70);
        assert_eq!(state.circulating_outside_ledger(), 900);

        assert!(matches!(
            ledger.apply_burn(901).await,
            Err(NitroError::InsufficientCirculation {
                requested: 901,
                available: 900
            })
        ));
        assert_eq!(ledger.snapshot().await.unwrap().total_burned, 10);
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let (ledger, _) = ledger(10_000);
        assert!(matches!(
            ledger.apply_burn(0).await,
            Err(NitroError::InvalidAmount { amount: 0 })
        ));
    }

    #[tokio::test]
    async fn test_mint_past_cap_leaves_ledger_unchanged() {
        let (ledger, _) = ledger(500);
        ledger.apply_mint(400).await.unwrap();
        let err = ledger.apply_mint(101).await.unwrap_err();
        assert!(matches!(
            err,
            NitroError::CapExceeded {
                cap: CapKind::Supply,
                ..
            }
        ));
        assert_eq!(ledger.snapshot().await.unwrap().total_minted, 400);
    }

    #[tokio::test]
    async fn test_daily_counter_resets_lazily() {
        let (ledger, clock) = ledger(1_000_000);
        ledger.mint_within_daily_limit(300, 1_000).await.unwrap();
        assert_eq!(ledger.snapshot().await.unwrap().daily_emitted, 300);

        clock.advance(Duration::days(1));
        // Read-only view already shows the new day
        assert_eq!(ledger.snapshot().await.unwrap().daily_emitted, 0);

        let state = ledger.mint_within_daily_limit(1_000, 1_000).await.unwrap();
        assert_eq!(state.daily_emitted, 1_000);
        assert_eq!(state.total_minted, 1_300);
    }

    #[tokio::test]
    async fn test_concurrent_mints_never_exceed_cap() {
        let (ledger, _) = ledger(1_000);
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.apply_mint(30).await }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 30;
            }
        }

        let state = ledger.snapshot().await.unwrap();
        assert_eq!(state.total_minted, granted);
        assert_eq!(granted, 990);
        assert!(state.verify());
    }
}
