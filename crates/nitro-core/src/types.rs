//! Core type definitions for the Nitro economy

use crate::error::{NitroError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// NP amount in whole points. Amounts are never negative.
pub type Amount = u64;

/// Validate a signed amount coming from an outer surface (CLI, RPC).
///
/// Rejects zero and negative values before any store is touched.
pub fn checked_amount(raw: i64) -> Result<Amount> {
    if raw <= 0 {
        return Err(NitroError::invalid_amount(raw));
    }
    Ok(raw as Amount)
}

/// WalletId - player wallet address as handed over by the session layer
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletId(String);

impl WalletId {
    /// Create a wallet id, rejecting blank addresses
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(NitroError::UnknownWallet(address));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletId({})", self.0)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Long chain addresses are shortened for log lines
        if self.0.is_ascii() && self.0.len() > 14 {
            write!(f, "{}…{}", &self.0[..8], &self.0[self.0.len() - 4..])
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl std::str::FromStr for WalletId {
    type Err = NitroError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// RaceId - idempotency key for one completed race
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaceId(Uuid);

impl RaceId {
    /// Generate a fresh random race id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RaceId({})", self.0)
    }
}

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RaceId {
    type Err = NitroError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| NitroError::Serialization(format!("race id: {}", e)))
    }
}

/// One row of the append-only race log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceLogEntry {
    /// Idempotency key
    pub race_id: RaceId,
    /// Racing wallet
    pub wallet: WalletId,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// NP actually minted for this race
    pub np_earned: Amount,
    /// XP earned
    pub xp_earned: u64,
    /// Race duration in seconds
    pub duration_secs: f64,
    /// Whether the player won
    pub won: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_amount() {
        assert_eq!(checked_amount(100).unwrap(), 100);
        assert!(matches!(
            checked_amount(0),
            Err(NitroError::InvalidAmount { amount: 0 })
        ));
        assert!(checked_amount(-7).is_err());
    }

    #[test]
    fn test_wallet_id() {
        assert!(WalletId::new("   ").is_err());
        let wallet = WalletId::new(" 0xabc ").unwrap();
        assert_eq!(wallet.as_str(), "0xabc");

        let long = WalletId::new("0x1234567890abcdef1234").unwrap();
        assert_eq!(format!("{}", long), "0x123456…1234");
    }

    #[test]
    fn test_race_id_parse() {
        let id = RaceId::new();
        let parsed: RaceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<RaceId>().is_err());
    }
}
