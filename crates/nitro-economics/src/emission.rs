//! # Emission Controller
//!
//! Governs minting of new NP. The daily allowance starts at
//! `base_daily_limit`, shrinks by `weekly_decay_percent` (compounding) for
//! every full week since `start_date`, and never drops below
//! `min_daily_emission`. Cumulative minting never passes the hard cap.
//!
//! A request that does not fit is degraded, not failed: the caller gets
//! whatever could be minted plus the reason for the shortfall.

use crate::constants::{
    DEFAULT_BASE_DAILY_LIMIT, DEFAULT_MIN_DAILY_EMISSION, DEFAULT_WEEKLY_DECAY_PERCENT,
    MAX_MINT_ATTEMPTS,
};
use crate::ledger::SupplyLedger;
use chrono::NaiveDate;
use nitro_core::{Amount, NitroError, Result, WalletId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Daily emission schedule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmissionPolicy {
    /// Week-0 daily limit
    #[serde(default = "default_base_daily_limit")]
    pub base_daily_limit: Amount,
    /// Reduction per elapsed week, in percent
    #[serde(default = "default_weekly_decay_percent")]
    pub weekly_decay_percent: f64,
    /// Floor for the decayed limit
    #[serde(default = "default_min_daily_emission")]
    pub min_daily_emission: Amount,
    /// Day the schedule starts counting weeks from
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
}

fn default_base_daily_limit() -> Amount {
    DEFAULT_BASE_DAILY_LIMIT
}

fn default_weekly_decay_percent() -> f64 {
    DEFAULT_WEEKLY_DECAY_PERCENT
}

fn default_min_daily_emission() -> Amount {
    DEFAULT_MIN_DAILY_EMISSION
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or_default()
}

impl Default for EmissionPolicy {
    fn default() -> Self {
        Self {
            base_daily_limit: default_base_daily_limit(),
            weekly_decay_percent: default_weekly_decay_percent(),
            min_daily_emission: default_min_daily_emission(),
            start_date: default_start_date(),
        }
    }
}

impl EmissionPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.base_daily_limit == 0 {
            return Err(NitroError::InvalidConfig(
                "base_daily_limit must be positive".into(),
            ));
        }
        if !(0.0..100.0).contains(&self.weekly_decay_percent) {
            return Err(NitroError::InvalidConfig(format!(
                "weekly_decay_percent must be in [0, 100), got {}",
                self.weekly_decay_percent
            )));
        }
        if self.min_daily_emission > self.base_daily_limit {
            return Err(NitroError::InvalidConfig(format!(
                "min_daily_emission {} above base_daily_limit {}",
                self.min_daily_emission, self.base_daily_limit
            )));
        }
        Ok(())
    }

    /// Full weeks since `start_date`; zero before it
    pub fn weeks_elapsed(&self, today: NaiveDate) -> u32 {
        let days = (today - self.start_date).num_days();
        if days <= 0 {
            return 0;
        }
        u32::try_from(days / 7).unwrap_or(u32::MAX)
    }

    /// Daily limit in force on `today`
    pub fn effective_daily_limit(&self, today: NaiveDate) -> Amount {
        let weeks = self.weeks_elapsed(today).min(i32::MAX as u32) as i32;
        let factor = (1.0 - self.weekly_decay_percent / 100.0).powi(weeks);
        let decayed = (self.base_daily_limit as f64 * factor).round() as Amount;
        decayed.max(self.min_daily_emission)
    }
}

/// Why an emission granted less than requested
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionShortfall {
    DailyCapReached,
    HardCapReached,
    /// Lost every compare-and-swap attempt to concurrent mints
    Contended,
}

impl EmissionShortfall {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmissionShortfall::DailyCapReached => "daily_cap_reached",
            EmissionShortfall::HardCapReached => "hard_cap_reached",
            EmissionShortfall::Contended => "contended",
        }
    }
}

impl fmt::Display for EmissionShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one emission request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionResult {
    pub wallet: WalletId,
    pub purpose: String,
    pub requested: Amount,
    /// Actually minted, never above `requested`
    pub emitted: Amount,
    pub daily_remaining: Amount,
    pub effective_daily_limit: Amount,
    /// Cumulative minted after this request
    pub total_minted: Amount,
    /// Set when `emitted < requested`
    pub reason: Option<EmissionShortfall>,
}

impl EmissionResult {
    pub fn is_full(&self) -> bool {
        self.emitted == self.requested
    }
}

/// Emission controller
pub struct EmissionController {
    ledger: Arc<SupplyLedger>,
    policy: RwLock<EmissionPolicy>,
}

impl EmissionController {
    pub fn new(ledger: Arc<SupplyLedger>, policy: EmissionPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            ledger,
            policy: RwLock::new(policy),
        })
    }

    pub fn policy(&self) -> EmissionPolicy {
        self.policy.read().clone()
    }

    pub fn reload_policy(&self, policy: EmissionPolicy) -> Result<()> {
        policy.validate()?;
        tracing::info!(
            "Emission policy reloaded: base {} NP/day, decay {}%/week, floor {}",
            policy.base_daily_limit,
            policy.weekly_decay_percent,
            policy.min_daily_emission
        );
        *self.policy.write() = policy;
        Ok(())
    }

    /// Today's limit
    pub fn effective_daily_limit(&self) -> Amount {
        let today = self.ledger.clock().today();
        self.policy.read().effective_daily_limit(today)
    }

    /// Mint up to `amount` for `wallet`.
    ///
    /// The mint is a conditional ledger write; if a concurrent mint got in
    /// between the read and the write, the request is recomputed against
    /// the new totals. Store failures are returned as errors.
    pub async fn emit_tokens(
        &self,
        wallet: &WalletId,
        amount: Amount,
        purpose: &str,
    ) -> Result<EmissionResult> {
        if amount == 0 {
            return Err(NitroError::invalid_amount(0));
        }

        let limit = self.effective_daily_limit();
        let result = |emitted, daily_remaining, total_minted, reason| EmissionResult {
            wallet: wallet.clone(),
            purpose: purpose.to_string(),
            requested: amount,
            emitted,
            daily_remaining,
            effective_daily_limit: limit,
            total_minted,
            reason,
        };

        let mut last_seen = None;
        for attempt in 1..=MAX_MINT_ATTEMPTS {
            let state = self.ledger.snapshot().await?;
            let daily_remaining = limit.saturating_sub(state.daily_emitted);
            let supply_remaining = state.remaining_supply();
            let mintable = amount.min(daily_remaining).min(supply_remaining);

            if mintable == 0 {
                let reason = if supply_remaining == 0 {
                    EmissionShortfall::HardCapReached
                } else {
                    EmissionShortfall::DailyCapReached
                };
                tracing::warn!(
                    "Emission for {} ({}) denied: {}",
                    wallet,
                    purpose,
                    reason
                );
                return Ok(result(0, daily_remaining, state.total_minted, Some(reason)));
            }

            match self.ledger.mint_within_daily_limit(mintable, limit).await {
                Ok(committed) => {
                    let reason = (mintable < amount).then(|| {
                        if supply_remaining <= daily_remaining {
                            EmissionShortfall::HardCapReached
                        } else {
                            EmissionShortfall::DailyCapReached
                        }
                    });
                    if let Some(reason) = reason {
                        tracing::warn!(
                            "Emission for {} ({}) capped at {} of {}: {}",
                            wallet,
                            purpose,
                            mintable,
                            amount,
                            reason
                        );
                    } else {
                        tracing::info!("Minted {} NP for {} ({})", mintable, wallet, purpose);
                    }
                    return Ok(result(
                        mintable,
                        limit.saturating_sub(committed.daily_emitted),
                        committed.total_minted,
                        reason,
                    ));
                }
                Err(NitroError::CapExceeded { cap, available, .. }) => {
                    tracing::debug!(
                        "Mint attempt {} for {} lost a race on the {} cap (available {})",
                        attempt,
                        wallet,
                        cap,
                        available
                    );
                    last_seen = Some(state);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(
            "Emission for {} ({}) gave up after {} contended attempts",
            wallet,
            purpose,
            MAX_MINT_ATTEMPTS
        );
        let (daily_remaining, total_minted) = last_seen
            .map(|s| (limit.saturating_sub(s.daily_emitted), s.total_minted))
            .unwrap_or((0, 0));
        Ok(result(
            0,
            daily_remaining,
            total_minted,
            Some(EmissionShortfall::Contended),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerConfig;
    use chrono::{Duration, TimeZone, Utc};
    use nitro_core::{EconomyState, ManualClock};
    use nitro_storage::MemoryLedgerStore;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn small_policy() -> EmissionPolicy {
        EmissionPolicy {
            base_daily_limit: 5_000,
            weekly_decay_percent: 2.0,
            min_daily_emission: 1_000,
            start_date: date(2026, 1, 1),
        }
    }

    fn controller(state: EconomyState, policy: EmissionPolicy) -> (EmissionController, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 3, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryLedgerStore::new(state));
        let ledger = Arc::new(SupplyLedger::new(store, clock.clone()));
        (EmissionController::new(ledger, policy).unwrap(), clock)
    }

    fn wallet() -> WalletId {
        WalletId::new("0xracer").unwrap()
    }

    #[test]
    fn test_schedule_decays_to_floor() {
        let policy = EmissionPolicy::default();
        assert_eq!(policy.effective_daily_limit(date(2026, 1, 1)), 1_000_000);
        assert_eq!(policy.effective_daily_limit(date(2026, 1, 7)), 1_000_000);
        assert_eq!(policy.effective_daily_limit(date(2026, 1, 8)), 980_000);
        assert_eq!(policy.effective_daily_limit(date(2026, 1, 15)), 960_400);
        assert_eq!(policy.effective_daily_limit(date(2030, 1, 1)), 250_000);
        // Before the start date the base applies
        assert_eq!(policy.effective_daily_limit(date(2025, 6, 1)), 1_000_000);
    }

    #[test]
    fn test_policy_validation() {
        let mut policy = small_policy();
        policy.min_daily_emission = 10_000;
        assert!(policy.validate().is_err());
        policy = small_policy();
        policy.weekly_decay_percent = 100.0;
        assert!(policy.validate().is_err());
    }

    #[tokio::test]
    async fn test_daily_cap_scenario() {
        let mut state = LedgerConfig::default().genesis(&ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap(),
        ));
        state.total_minted = 4_950;
        state.daily_emitted = 4_950;
        let (controller, _) = controller(state, small_policy());

        let result = controller.emit_tokens(&wallet(), 500, "race_win").await.unwrap();
        assert_eq!(result.emitted, 50);
        assert_eq!(result.daily_remaining, 0);
        assert_eq!(result.effective_daily_limit, 5_000);
        assert_eq!(result.reason, Some(EmissionShortfall::DailyCapReached));

        let again = controller.emit_tokens(&wallet(), 10, "race_win").await.unwrap();
        assert_eq!(again.emitted, 0);
        assert_eq!(again.reason, Some(EmissionShortfall::DailyCapReached));
    }

    #[tokio::test]
    async fn test_hard_cap_degrades_emission() {
        let mut state = EconomyState::genesis(1_000, date(2026, 1, 3));
        state.total_minted = 990;
        let (controller, _) = controller(state, small_policy());

        let result = controller.emit_tokens(&wallet(), 100, "race_win").await.unwrap();
        assert_eq!(result.emitted, 10);
        assert_eq!(result.total_minted, 1_000);
        assert_eq!(result.reason, Some(EmissionShortfall::HardCapReached));

        let none = controller.emit_tokens(&wallet(), 1, "race_win").await.unwrap();
        assert_eq!(none.emitted, 0);
        assert_eq!(none.reason, Some(EmissionShortfall::HardCapReached));
    }

    #[tokio::test]
    async fn test_new_day_restores_allowance() {
        let state = EconomyState::genesis(1_000_000, date(2026, 1, 3));
        let (controller, clock) = controller(state, small_policy());

        let first = controller.emit_tokens(&wallet(), 5_000, "race_win").await.unwrap();
        assert!(first.is_full());
        assert_eq!(first.daily_remaining, 0);

        clock.advance(Duration::days(1));
        let next = controller.emit_tokens(&wallet(), 300, "race_win").await.unwrap();
        assert_eq!(next.emitted, 300);
        assert_eq!(next.daily_remaining, 4_700);
        assert_eq!(next.reason, None);
    }

    #[tokio::test]
    async fn test_zero_request_is_invalid() {
        let state = EconomyState::genesis(1_000, date(2026, 1, 3));
        let (controller, _) = controller(state, small_policy());
        assert!(matches!(
            controller.emit_tokens(&wallet(), 0, "race_win").await,
            Err(NitroError::InvalidAmount { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_emissions_respect_daily_limit() {
        let state = EconomyState::genesis(1_000_000, date(2026, 1, 3));
        let (controller, _) = controller(state, small_policy());
        let controller = Arc::new(controller);

        let mut handles = Vec::new();
        for i in 0..40 {
            let controller = controller.clone();
            handles.push(tokio::spawn(async move {
                let wallet = WalletId::new(format!("0xwallet{}", i)).unwrap();
                controller.emit_tokens(&wallet, 300, "race_win").await
            }));
        }

        let mut emitted = 0;
        for handle in handles {
            emitted += handle.await.unwrap().unwrap().emitted;
        }
        assert!(emitted <= 5_000);
    }

    proptest! {
        #[test]
        fn prop_limit_never_below_floor(weeks in 0i64..5_000) {
            let policy = EmissionPolicy::default();
            let today = policy.start_date + chrono::Duration::weeks(weeks);
            let limit = policy.effective_daily_limit(today);
            prop_assert!(limit >= policy.min_daily_emission);
            prop_assert!(limit <= policy.base_daily_limit);
        }

        #[test]
        fn prop_limit_non_increasing(weeks in 0i64..500) {
            let policy = EmissionPolicy::default();
            let today = policy.start_date + chrono::Duration::weeks(weeks);
            let next = today + chrono::Duration::weeks(1);
            prop_assert!(policy.effective_daily_limit(next) <= policy.effective_daily_limit(today));
        }

        #[test]
        fn prop_emission_respects_both_caps(
            max_supply in 100u64..3_000,
            daily in 500u64..1_500,
            requests in prop::collection::vec((1u64..400, any::<bool>()), 1..40),
        ) {
            let policy = EmissionPolicy {
                base_daily_limit: daily,
                min_daily_emission: 500,
                ..small_policy()
            };
            let state = EconomyState::genesis(max_supply, date(2026, 1, 3));
            let (controller, clock) = controller(state, policy);
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

            let mut minted = 0;
            let mut minted_today = 0;
            for (amount, next_day) in requests {
                if next_day {
                    clock.advance(Duration::days(1));
                    minted_today = 0;
                }
                let limit = controller.effective_daily_limit();
                let result = rt
                    .block_on(controller.emit_tokens(&wallet(), amount, "race_win"))
                    .unwrap();

                prop_assert!(result.emitted <= result.requested);
                prop_assert_eq!(result.reason.is_some(), result.emitted < result.requested);
                minted += result.emitted;
                minted_today += result.emitted;
                prop_assert_eq!(result.total_minted, minted);
                prop_assert!(result.total_minted <= max_supply);
                prop_assert!(minted_today <= limit);
            }

            let state = rt.block_on(controller.ledger.snapshot()).unwrap();
            prop_assert_eq!(state.total_minted, minted);
            prop_assert!(state.verify());
        }
    }
}
