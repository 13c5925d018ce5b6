//! # Transaction Splitter
//!
//! Every NP-denominated spend is divided between a burn, the reward pool
//! and the treasury. The split is a pure function of the amount and the
//! [`SplitPolicy`]; committing it is one ledger batch.

use crate::constants::{BPS_DENOMINATOR, DEFAULT_BURN_BPS, DEFAULT_REWARD_POOL_BPS};
use crate::ledger::SupplyLedger;
use chrono::{DateTime, Utc};
use nitro_core::{Amount, LedgerOp, NitroError, Result, WalletId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Split percentages in basis points; the treasury takes the remainder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPolicy {
    #[serde(default = "default_burn_bps")]
    pub burn_bps: u64,
    #[serde(default = "default_reward_pool_bps")]
    pub reward_pool_bps: u64,
}

fn default_burn_bps() -> u64 {
    DEFAULT_BURN_BPS
}

fn default_reward_pool_bps() -> u64 {
    DEFAULT_REWARD_POOL_BPS
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            burn_bps: default_burn_bps(),
            reward_pool_bps: default_reward_pool_bps(),
        }
    }
}

impl SplitPolicy {
    pub fn validate(&self) -> Result<()> {
        let total = self.burn_bps.saturating_add(self.reward_pool_bps);
        if total > BPS_DENOMINATOR {
            return Err(NitroError::InvalidConfig(format!(
                "burn + reward pool = {} bps exceeds {}",
                total, BPS_DENOMINATOR
            )));
        }
        Ok(())
    }

    pub fn treasury_bps(&self) -> u64 {
        BPS_DENOMINATOR.saturating_sub(self.burn_bps + self.reward_pool_bps)
    }

    /// Split `amount`. Burn and reward are floored but at least 1 NP each
    /// while there is anything left to take; treasury absorbs the rest, so
    /// the three parts always add up to `amount`.
    pub fn split(&self, amount: Amount) -> SplitPreview {
        let burn = share(amount, self.burn_bps).min(amount);
        let reward = share(amount, self.reward_pool_bps).min(amount - burn);
        SplitPreview {
            amount,
            burn,
            reward,
            treasury: amount - burn - reward,
        }
    }
}

fn share(amount: Amount, bps: u64) -> Amount {
    if amount == 0 || bps == 0 {
        return 0;
    }
    let floored = (amount as u128 * bps as u128 / BPS_DENOMINATOR as u128) as Amount;
    floored.max(1)
}

/// Result of a split before anything is committed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPreview {
    pub amount: Amount,
    pub burn: Amount,
    pub reward: Amount,
    pub treasury: Amount,
}

/// What a spend paid for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendKind {
    Repair,
    OilChange,
    Insurance,
    Purchase,
    Other,
}

impl SpendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpendKind::Repair => "repair",
            SpendKind::OilChange => "oil_change",
            SpendKind::Insurance => "insurance",
            SpendKind::Purchase => "purchase",
            SpendKind::Other => "other",
        }
    }
}

impl fmt::Display for SpendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpendKind {
    type Err = NitroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "repair" => Ok(SpendKind::Repair),
            "oil_change" | "oil" => Ok(SpendKind::OilChange),
            "insurance" => Ok(SpendKind::Insurance),
            "purchase" | "marketplace" => Ok(SpendKind::Purchase),
            "other" => Ok(SpendKind::Other),
            other => Err(NitroError::InvalidConfig(format!(
                "unknown spend kind: {}",
                other
            ))),
        }
    }
}

/// Committed split plus the ledger totals right after it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub transaction_id: Uuid,
    pub wallet: Option<WalletId>,
    pub description: String,
    pub burned: Amount,
    pub to_reward_pool: Amount,
    pub to_treasury: Amount,
    pub total_burned: Amount,
    pub reward_pool_balance: Amount,
    pub treasury_balance: Amount,
    pub timestamp: DateTime<Utc>,
}

/// Single gate for every NP spend
pub struct TransactionSplitter {
    ledger: Arc<SupplyLedger>,
    policy: RwLock<SplitPolicy>,
}

impl TransactionSplitter {
    pub fn new(ledger: Arc<SupplyLedger>, policy: SplitPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            ledger,
            policy: RwLock::new(policy),
        })
    }

    pub fn policy(&self) -> SplitPolicy {
        *self.policy.read()
    }

    /// Swap in a new policy; later spends use it
    pub fn reload_policy(&self, policy: SplitPolicy) -> Result<()> {
        policy.validate()?;
        *self.policy.write() = policy;
        tracing::info!(
            "Split policy reloaded: burn {} bps, reward pool {} bps",
            policy.burn_bps,
            policy.reward_pool_bps
        );
        Ok(())
    }

    /// Pure preview for display before commit
    pub fn preview(&self, amount: Amount) -> SplitPreview {
        self.policy().split(amount)
    }

    /// Split `amount` and commit burn, pool and treasury credits as one batch
    pub async fn process_transaction(
        &self,
        amount: Amount,
        wallet: Option<&WalletId>,
        description: &str,
    ) -> Result<TransactionResult> {
        if amount == 0 {
            return Err(NitroError::invalid_amount(0));
        }

        let split = self.preview(amount);
        let batch: Vec<LedgerOp> = [
            LedgerOp::Burn(split.burn),
            LedgerOp::ToPool(split.reward),
            LedgerOp::ToTreasury(split.treasury),
        ]
        .into_iter()
        .filter(|op| {
            !matches!(
                op,
                LedgerOp::Burn(0) | LedgerOp::ToPool(0) | LedgerOp::ToTreasury(0)
            )
        })
        .collect();

        let state = self.ledger.apply_batch(&batch).await?;

        tracing::info!(
            "Spend {} NP ({}): burned {}, pool +{}, treasury +{}",
            amount,
            description,
            split.burn,
            split.reward,
            split.treasury
        );

        Ok(TransactionResult {
            transaction_id: Uuid::new_v4(),
            wallet: wallet.cloned(),
            description: description.to_string(),
            burned: split.burn,
            to_reward_pool: split.reward,
            to_treasury: split.treasury,
            total_burned: state.total_burned,
            reward_pool_balance: state.reward_pool_balance,
            treasury_balance: state.treasury_balance,
            timestamp: self.ledger.clock().now(),
        })
    }
}
