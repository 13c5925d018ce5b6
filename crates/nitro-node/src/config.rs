//! Node configuration types
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML
//! file, then `NITRO__<SECTION>__<KEY>` environment variables.

use nitro_core::{NitroError, Result};
use nitro_economics::{BalancingConfig, EmissionPolicy, LedgerConfig, SplitPolicy};
use nitro_security::RiskConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "NITRO";

/// Complete economy configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NitroConfig {
    /// Supply ledger
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Spend split percentages
    #[serde(default)]
    pub split: SplitPolicy,

    /// Daily emission schedule
    #[serde(default)]
    pub emission: EmissionPolicy,

    /// Anti-bot engine
    #[serde(default)]
    pub risk: RiskConfig,

    /// Reward curve and difficulty
    #[serde(default)]
    pub balancing: BalancingConfig,

    /// Base rewards per race
    #[serde(default)]
    pub settlement: SettlementConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

impl NitroConfig {
    /// Load defaults, then `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default()).map_err(config_error)?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| NitroError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| NitroError::Serialization(e.to_string()))
    }

    /// Reject configurations that would break the economy invariants
    pub fn validate(&self) -> Result<()> {
        self.ledger.validate()?;
        self.split.validate()?;
        self.emission.validate()?;
        self.risk.validate()?;
        self.balancing.validate()?;
        self.settlement.validate()?;
        Ok(())
    }
}

fn config_error(e: config::ConfigError) -> NitroError {
    NitroError::InvalidConfig(e.to_string())
}

/// Base rewards before the reward curve and risk adjustments
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "default_win_reward")]
    pub win_reward: u64,

    #[serde(default = "default_loss_reward")]
    pub loss_reward: u64,

    #[serde(default = "default_win_xp")]
    pub win_xp: u64,

    #[serde(default = "default_loss_xp")]
    pub loss_xp: u64,
}

fn default_win_reward() -> u64 {
    100
}

fn default_loss_reward() -> u64 {
    25
}

fn default_win_xp() -> u64 {
    50
}

fn default_loss_xp() -> u64 {
    20
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            win_reward: default_win_reward(),
            loss_reward: default_loss_reward(),
            win_xp: default_win_xp(),
            loss_xp: default_loss_xp(),
        }
    }
}

impl SettlementConfig {
    pub fn validate(&self) -> Result<()> {
        if self.loss_reward > self.win_reward {
            return Err(NitroError::InvalidConfig(
                "loss_reward must not exceed win_reward".into(),
            ));
        }
        Ok(())
    }

    pub fn base_reward(&self, won: bool) -> u64 {
        if won {
            self.win_reward
        } else {
            self.loss_reward
        }
    }

    pub fn xp(&self, won: bool) -> u64 {
        if won {
            self.win_xp
        } else {
            self.loss_xp
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Storage settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Snapshot file holding ledger, race log and profiles between runs
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./data/nitro-state.bin")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}
