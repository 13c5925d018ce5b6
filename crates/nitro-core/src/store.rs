//! Persistence interfaces
//!
//! The economy core never owns its data store. These traits describe the
//! small set of atomic operations it needs from one; `nitro-storage`
//! provides in-memory implementations.

use crate::error::Result;
use crate::profile::RiskProfile;
use crate::state::{EconomyState, LedgerOp};
use crate::types::{Amount, RaceId, RaceLogEntry, WalletId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Transactional store holding the `economy_state` row
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Consistent point-in-time copy of the ledger
    async fn snapshot(&self) -> Result<EconomyState>;

    /// Apply every op or none, serialized against all other writers.
    /// Returns the committed state.
    async fn apply(&self, batch: &[LedgerOp]) -> Result<EconomyState>;
}

/// Append-only race log
#[async_trait]
pub trait RaceLogStore: Send + Sync {
    /// Claim the entry's race id and append it.
    /// Fails with `DuplicateRace` if the id is already present.
    async fn append(&self, entry: RaceLogEntry) -> Result<()>;

    /// Record the NP finally minted for a claimed race
    async fn finalize_earnings(&self, race_id: RaceId, np_earned: Amount) -> Result<()>;

    /// Drop a claimed race so the settlement can be retried
    async fn release(&self, race_id: RaceId) -> Result<()>;

    async fn contains(&self, race_id: RaceId) -> Result<bool>;

    /// Entries for `wallet` at or after `since`, oldest first
    async fn entries_since(
        &self,
        wallet: &WalletId,
        since: DateTime<Utc>,
    ) -> Result<Vec<RaceLogEntry>>;

    /// Up to `limit` most recent entries for `wallet`, oldest first
    async fn recent(&self, wallet: &WalletId, limit: usize) -> Result<Vec<RaceLogEntry>>;
}

/// Per-wallet `behavior_profile` rows
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load_profile(&self, wallet: &WalletId) -> Result<Option<RiskProfile>>;

    async fn save_profile(&self, profile: &RiskProfile) -> Result<()>;
}
