//! # Nitro Storage
//!
//! Store implementations for the economy core.
//!
//! ## Storage Layout
//!
//! - `ledger_db` - the singleton `economy_state` row
//! - `race_log_db` - append-only race log, indexed by race id and wallet
//! - `profile_db` - per-wallet `behavior_profile` rows
//! - `snapshot` - binary snapshot file tying the three together

pub mod ledger_db {
    //! Ledger row persistence

    use async_trait::async_trait;
    use nitro_core::{EconomyState, LedgerOp, LedgerStore, Result};
    use parking_lot::Mutex;

    /// In-memory ledger. One mutex is the serialization point for every
    /// batch, which gives the all-or-nothing semantics `LedgerStore` needs.
    pub struct MemoryLedgerStore {
        state: Mutex<EconomyState>,
    }

    impl MemoryLedgerStore {
        pub fn new(state: EconomyState) -> Self {
            Self {
                state: Mutex::new(state),
            }
        }

        /// Current row without going through the async trait
        pub fn current(&self) -> EconomyState {
            self.state.lock().clone()
        }
    }

    #[async_trait]
    impl LedgerStore for MemoryLedgerStore {
        async fn snapshot(&self) -> Result<EconomyState> {
            Ok(self.state.lock().clone())
        }

        async fn apply(&self, batch: &[LedgerOp]) -> Result<EconomyState> {
            let mut state = self.state.lock();
            let next = state.applied(batch)?;
            *state = next.clone();
            Ok(next)
        }
    }
}

pub mod race_log_db {
    //! Race log persistence

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use nitro_core::{Amount, NitroError, RaceId, RaceLogEntry, RaceLogStore, Result, WalletId};
    use parking_lot::RwLock;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RaceLogInner {
        entries: HashMap<RaceId, RaceLogEntry>,
        by_wallet: HashMap<WalletId, Vec<RaceId>>,
    }

    /// In-memory race log
    #[derive(Default)]
    pub struct MemoryRaceLog {
        inner: RwLock<RaceLogInner>,
    }

    impl MemoryRaceLog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Rebuild from persisted rows
        pub fn from_entries(entries: Vec<RaceLogEntry>) -> Self {
            let log = Self::new();
            {
                let mut inner = log.inner.write();
                for entry in entries {
                    inner
                        .by_wallet
                        .entry(entry.wallet.clone())
                        .or_default()
                        .push(entry.race_id);
                    inner.entries.insert(entry.race_id, entry);
                }
                let RaceLogInner {
                    entries,
                    by_wallet,
                } = &mut *inner;
                for ids in by_wallet.values_mut() {
                    ids.sort_by_key(|id| entries[id].timestamp);
                }
            }
            log
        }

        /// All rows, oldest first
        pub fn export(&self) -> Vec<RaceLogEntry> {
            let inner = self.inner.read();
            let mut rows: Vec<_> = inner.entries.values().cloned().collect();
            rows.sort_by_key(|e| e.timestamp);
            rows
        }

        pub fn len(&self) -> usize {
            self.inner.read().entries.len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl RaceLogStore for MemoryRaceLog {
        async fn append(&self, entry: RaceLogEntry) -> Result<()> {
            let mut guard = self.inner.write();
            let RaceLogInner {
                entries,
                by_wallet,
            } = &mut *guard;
            if entries.contains_key(&entry.race_id) {
                return Err(NitroError::DuplicateRace(entry.race_id));
            }
            let ids = by_wallet.entry(entry.wallet.clone()).or_default();
            // Keep the per-wallet index in time order even for late arrivals
            let position = ids
                .iter()
                .rposition(|id| {
                    entries
                        .get(id)
                        .map(|e| e.timestamp <= entry.timestamp)
                        .unwrap_or(true)
                })
                .map(|i| i + 1)
                .unwrap_or(0);
            ids.insert(position, entry.race_id);
            entries.insert(entry.race_id, entry);
            Ok(())
        }

        async fn finalize_earnings(&self, race_id: RaceId, np_earned: Amount) -> Result<()> {
            let mut inner = self.inner.write();
            let entry = inner.entries.get_mut(&race_id).ok_or_else(|| {
                NitroError::Internal(format!("finalize of unclaimed race {}", race_id))
            })?;
            entry.np_earned = np_earned;
            Ok(())
        }

        async fn release(&self, race_id: RaceId) -> Result<()> {
            let mut inner = self.inner.write();
            if let Some(entry) = inner.entries.remove(&race_id) {
                if let Some(ids) = inner.by_wallet.get_mut(&entry.wallet) {
                    ids.retain(|id| *id != race_id);
                }
            }
            Ok(())
        }

        async fn contains(&self, race_id: RaceId) -> Result<bool> {
            Ok(self.inner.read().entries.contains_key(&race_id))
        }

        async fn entries_since(
            &self,
            wallet: &WalletId,
            since: DateTime<Utc>,
        ) -> Result<Vec<RaceLogEntry>> {
            let inner = self.inner.read();
            Ok(inner
                .by_wallet
                .get(wallet)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| inner.entries.get(id))
                        .filter(|e| e.timestamp >= since)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn recent(&self, wallet: &WalletId, limit: usize) -> Result<Vec<RaceLogEntry>> {
            let inner = self.inner.read();
            Ok(inner
                .by_wallet
                .get(wallet)
                .map(|ids| {
                    let skip = ids.len().saturating_sub(limit);
                    ids.iter()
                        .skip(skip)
                        .filter_map(|id| inner.entries.get(id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }
}

pub mod profile_db {
    //! Behavior profile persistence

    use async_trait::async_trait;
    use dashmap::DashMap;
    use nitro_core::{ProfileStore, Result, RiskProfile, WalletId};

    /// In-memory profile table keyed by wallet
    #[derive(Default)]
    pub struct MemoryProfileStore {
        profiles: DashMap<WalletId, RiskProfile>,
    }

    impl MemoryProfileStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn from_profiles(profiles: Vec<RiskProfile>) -> Self {
            let store = Self::new();
            for profile in profiles {
                store.profiles.insert(profile.wallet.clone(), profile);
            }
            store
        }

        pub fn export(&self) -> Vec<RiskProfile> {
            let mut rows: Vec<_> = self.profiles.iter().map(|r| r.value().clone()).collect();
            rows.sort_by(|a, b| a.wallet.cmp(&b.wallet));
            rows
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryProfileStore {
        async fn load_profile(&self, wallet: &WalletId) -> Result<Option<RiskProfile>> {
            Ok(self.profiles.get(wallet).map(|r| r.value().clone()))
        }

        async fn save_profile(&self, profile: &RiskProfile) -> Result<()> {
            self.profiles.insert(profile.wallet.clone(), profile.clone());
            Ok(())
        }
    }
}

pub mod snapshot {
    //! Whole-store snapshot file

    use crate::{MemoryLedgerStore, MemoryProfileStore, MemoryRaceLog};
    use nitro_core::{EconomyState, NitroError, RaceLogEntry, Result, RiskProfile};
    use serde::{Deserialize, Serialize};
    use std::path::Path;
    use std::sync::Arc;

    /// Serialized contents of all three stores
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct StoreSnapshot {
        pub economy: EconomyState,
        pub races: Vec<RaceLogEntry>,
        pub profiles: Vec<RiskProfile>,
    }

    /// The three in-memory stores, shareable across components
    #[derive(Clone)]
    pub struct MemoryStores {
        pub ledger: Arc<MemoryLedgerStore>,
        pub race_log: Arc<MemoryRaceLog>,
        pub profiles: Arc<MemoryProfileStore>,
    }

    impl MemoryStores {
        /// Empty stores around a genesis ledger
        pub fn new(economy: EconomyState) -> Self {
            Self {
                ledger: Arc::new(MemoryLedgerStore::new(economy)),
                race_log: Arc::new(MemoryRaceLog::new()),
                profiles: Arc::new(MemoryProfileStore::new()),
            }
        }

        pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
            Self {
                ledger: Arc::new(MemoryLedgerStore::new(snapshot.economy)),
                race_log: Arc::new(MemoryRaceLog::from_entries(snapshot.races)),
                profiles: Arc::new(MemoryProfileStore::from_profiles(snapshot.profiles)),
            }
        }

        pub fn to_snapshot(&self) -> StoreSnapshot {
            StoreSnapshot {
                economy: self.ledger.current(),
                races: self.race_log.export(),
                profiles: self.profiles.export(),
            }
        }
    }

    impl StoreSnapshot {
        /// Load a snapshot file
        pub fn load(path: &Path) -> Result<Self> {
            let bytes = std::fs::read(path)
                .map_err(|e| NitroError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;
            bincode::deserialize(&bytes).map_err(|e| NitroError::Serialization(e.to_string()))
        }

        /// Write a snapshot file, replacing the previous one atomically
        pub fn save(&self, path: &Path) -> Result<()> {
            let bytes =
                bincode::serialize(self).map_err(|e| NitroError::Serialization(e.to_string()))?;
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, bytes)
                .and_then(|_| std::fs::rename(&tmp, path))
                .map_err(|e| NitroError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;
            tracing::debug!("Snapshot written to {}", path.display());
            Ok(())
        }
    }
}

// Re-export for convenience
pub use ledger_db::MemoryLedgerStore;
pub use profile_db::MemoryProfileStore;
pub use race_log_db::MemoryRaceLog;
pub use snapshot::{MemoryStores, StoreSnapshot};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use nitro_core::*;

    fn entry(wallet: &WalletId, secs: i64, np: Amount) -> RaceLogEntry {
        RaceLogEntry {
            race_id: RaceId::new(),
            wallet: wallet.clone(),
            timestamp: Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(secs),
            np_earned: np,
            xp_earned: 10,
            duration_secs: 90.0,
            won: false,
        }
    }

    fn genesis() -> EconomyState {
        EconomyState::genesis(1_000, NaiveDate::from_ymd_opt(2026, 6, 1).unwrap())
    }

    #[tokio::test]
    async fn test_ledger_batch_commit_and_rollback() {
        let store = MemoryLedgerStore::new(genesis());

        let state = store
            .apply(&[
                LedgerOp::Mint {
                    amount: 10,
                    daily_limit: None,
                },
                LedgerOp::Burn(1),
                LedgerOp::ToPool(2),
                LedgerOp::ToTreasury(7),
            ])
            .await
            .unwrap();
        assert_eq!(state.total_burned, 1);
        assert_eq!(state.treasury_balance, 7);

        let err = store
            .apply(&[
                LedgerOp::ToPool(5),
                LedgerOp::Mint {
                    amount: 5_000,
                    daily_limit: None,
                },
            ])
            .await;
        assert!(err.is_err());
        assert_eq!(store.snapshot().await.unwrap().reward_pool_balance, 2);
    }

    #[tokio::test]
    async fn test_race_log_dedupes_and_orders() {
        let log = MemoryRaceLog::new();
        let wallet = WalletId::new("w1").unwrap();

        let late = entry(&wallet, 300, 5);
        let early = entry(&wallet, 100, 3);
        log.append(late.clone()).await.unwrap();
        log.append(early.clone()).await.unwrap();

        assert!(matches!(
            log.append(late.clone()).await,
            Err(NitroError::DuplicateRace(_))
        ));

        let recent = log.recent(&wallet, 10).await.unwrap();
        assert_eq!(recent[0].race_id, early.race_id);
        assert_eq!(recent[1].race_id, late.race_id);

        let since = log.entries_since(&wallet, late.timestamp).await.unwrap();
        assert_eq!(since.len(), 1);

        log.finalize_earnings(early.race_id, 42).await.unwrap();
        log.release(late.race_id).await.unwrap();
        let recent = log.recent(&wallet, 1).await.unwrap();
        assert_eq!(recent[0].np_earned, 42);
        assert!(!log.contains(late.race_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_profile_store_roundtrip() {
        let store = MemoryProfileStore::new();
        let wallet = WalletId::new("w2").unwrap();
        assert!(store.load_profile(&wallet).await.unwrap().is_none());

        let mut profile = RiskProfile::new(wallet.clone(), Utc::now());
        profile.flagged = true;
        store.save_profile(&profile).await.unwrap();
        assert!(store.load_profile(&wallet).await.unwrap().unwrap().flagged);
    }

    #[tokio::test]
    async fn test_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");
        let stores = MemoryStores::new(genesis());
        let wallet = WalletId::new("w3").unwrap();
        stores.race_log.append(entry(&wallet, 0, 9)).await.unwrap();
        stores
            .ledger
            .apply(&[
                LedgerOp::Mint {
                    amount: 20,
                    daily_limit: None,
                },
                LedgerOp::Burn(4),
            ])
            .await
            .unwrap();

        stores.to_snapshot().save(&path).unwrap();
        let restored = MemoryStores::from_snapshot(StoreSnapshot::load(&path).unwrap());
        assert_eq!(restored.ledger.current().total_burned, 4);
        assert_eq!(restored.race_log.len(), 1);
    }
}
