//! Error types for Nitro economy operations

use crate::types::{Amount, RaceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Nitro operations
pub type Result<T> = std::result::Result<T, NitroError>;

/// Which supply limit a rejected mint ran into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapKind {
    /// Absolute hard cap (`max_supply`)
    Supply,
    /// Today's effective emission limit
    Daily,
}

impl std::fmt::Display for CapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapKind::Supply => write!(f, "supply"),
            CapKind::Daily => write!(f, "daily"),
        }
    }
}

/// Errors that can occur in the economy core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NitroError {
    // === Input Errors ===
    /// Amount was zero, negative or otherwise malformed
    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: i128 },

    /// Wallet identifier is empty or not known to the caller
    #[error("Unknown wallet: {0:?}")]
    UnknownWallet(String),

    /// Race was already settled
    #[error("Race already settled: {0}")]
    DuplicateRace(RaceId),

    // === Ledger Errors ===
    /// Mint would exceed a supply limit; ledger unchanged
    #[error("{cap} cap exceeded: requested {requested}, available {available}")]
    CapExceeded {
        cap: CapKind,
        requested: Amount,
        available: Amount,
    },

    /// Spend would move more NP than is circulating; ledger unchanged
    #[error("Insufficient circulating supply: requested {requested}, available {available}")]
    InsufficientCirculation { requested: Amount, available: Amount },

    // === Storage Errors ===
    /// Transient persistence failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    // === General Errors ===
    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NitroError {
    /// Build an `InvalidAmount` from any integer-like input
    pub fn invalid_amount(amount: impl Into<i128>) -> Self {
        Self::InvalidAmount {
            amount: amount.into(),
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidAmount { .. } => 2001,
            Self::UnknownWallet(_) => 2002,
            Self::DuplicateRace(_) => 2003,
            Self::CapExceeded { .. } => 2101,
            Self::InsufficientCirculation { .. } => 2102,
            Self::StoreUnavailable(_) => 2201,
            Self::Serialization(_) => 2202,
            Self::InvalidConfig(_) => 2301,
            Self::Internal(_) => 9999,
        }
    }

    /// Check if the caller may retry the whole operation
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::CapExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(NitroError::invalid_amount(0).code(), 2001);
        assert_eq!(
            NitroError::CapExceeded {
                cap: CapKind::Supply,
                requested: 10,
                available: 5
            }
            .code(),
            2101
        );
        assert_eq!(NitroError::Internal("x".into()).code(), 9999);
    }

    #[test]
    fn test_error_display() {
        let err = NitroError::CapExceeded {
            cap: CapKind::Daily,
            requested: 500,
            available: 50,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("daily cap exceeded"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(NitroError::StoreUnavailable("timeout".into()).is_recoverable());
        assert!(!NitroError::invalid_amount(-5).is_recoverable());
        assert!(!NitroError::UnknownWallet(String::new()).is_recoverable());
        assert!(!NitroError::InsufficientCirculation {
            requested: 10,
            available: 0
        }
        .is_recoverable());
    }
}
