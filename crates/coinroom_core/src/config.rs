//! Economy tuning loaded from TOML.
//!
//! # Invariants
//! - Every field has a default; an empty file yields `EconomyConfig::default()`.
//! - A config that passed `validate()` keeps every sampled value in range.

use crate::model::LedgerLimits;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest deposit term accepted from configuration (about a century).
pub const MAX_TERM_DAYS: u32 = 36_500;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(details) => write!(f, "invalid config: {details}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Inclusive sampling bounds for one deposit product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductTerms {
    pub min_days: u32,
    pub max_days: u32,
    pub min_rate: u32,
    pub max_rate: u32,
    pub min_tax: u32,
    pub max_tax: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DepositConfig {
    pub max_slots: usize,
    pub basic: ProductTerms,
    pub premium: ProductTerms,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            max_slots: 2,
            basic: ProductTerms {
                min_days: 1,
                max_days: 10,
                min_rate: 10,
                max_rate: 50,
                min_tax: 0,
                max_tax: 0,
            },
            premium: ProductTerms {
                min_days: 1,
                max_days: 100,
                min_rate: 0,
                max_rate: 100,
                min_tax: 0,
                max_tax: 50,
            },
        }
    }
}

/// One row of the mining reward table; `weight` is relative to the table sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewardTier {
    pub weight: u32,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiningConfig {
    pub daily_limit: u32,
    /// Tiers are tried in order; the first whose cumulative weight exceeds the
    /// roll wins.
    pub rewards: Vec<RewardTier>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            daily_limit: 3,
            rewards: vec![
                RewardTier {
                    weight: 20,
                    amount: 50,
                },
                RewardTier {
                    weight: 30,
                    amount: 30,
                },
                RewardTier {
                    weight: 50,
                    amount: 10,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttendanceConfig {
    pub base_reward: i64,
    pub weekly_bonus: i64,
    pub weekly_every: u32,
    pub month_end_bonus: i64,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            base_reward: 3_000,
            weekly_bonus: 5_000,
            weekly_every: 7,
            month_end_bonus: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JackpotConfig {
    /// Payout multiplier for three sevens.
    pub sevens_multiplier: i64,
    /// Payout multiplier for any other winning triple.
    pub triple_multiplier: i64,
    /// Loss multiplier for three fours.
    pub fours_penalty_multiplier: i64,
}

impl Default for JackpotConfig {
    fn default() -> Self {
        Self {
            sevens_multiplier: 1_000,
            triple_multiplier: 250,
            fours_penalty_multiplier: 444,
        }
    }
}

/// Complete tuning surface of the economy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EconomyConfig {
    pub deposit: DepositConfig,
    pub mining: MiningConfig,
    pub attendance: AttendanceConfig,
    pub jackpot: JackpotConfig,
    pub ranking_limit: u32,
    pub name_max_chars: usize,
    pub max_conflict_retries: u32,
    pub busy_timeout_ms: u64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            deposit: DepositConfig::default(),
            mining: MiningConfig::default(),
            attendance: AttendanceConfig::default(),
            jackpot: JackpotConfig::default(),
            ranking_limit: 10,
            name_max_chars: 32,
            max_conflict_retries: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

impl EconomyConfig {
    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deposit.max_slots == 0 {
            return Err(ConfigError::Invalid("deposit.max_slots must be > 0".into()));
        }
        check_terms("deposit.basic", &self.deposit.basic)?;
        check_terms("deposit.premium", &self.deposit.premium)?;
        if self.deposit.basic.max_tax != 0 {
            return Err(ConfigError::Invalid(
                "deposit.basic is untaxed; max_tax must be 0".into(),
            ));
        }

        if self.mining.daily_limit == 0 {
            return Err(ConfigError::Invalid("mining.daily_limit must be > 0".into()));
        }
        if self.mining.rewards.is_empty() {
            return Err(ConfigError::Invalid("mining.rewards must not be empty".into()));
        }
        let mut total_weight: u32 = 0;
        for tier in &self.mining.rewards {
            if tier.amount < 0 {
                return Err(ConfigError::Invalid(
                    "mining reward amounts must be >= 0".into(),
                ));
            }
            total_weight = total_weight.checked_add(tier.weight).ok_or_else(|| {
                ConfigError::Invalid("mining reward weights overflow".into())
            })?;
        }
        if total_weight == 0 {
            return Err(ConfigError::Invalid(
                "mining reward weights must sum to > 0".into(),
            ));
        }

        let attendance = &self.attendance;
        if attendance.weekly_every == 0 {
            return Err(ConfigError::Invalid(
                "attendance.weekly_every must be > 0".into(),
            ));
        }
        if attendance.base_reward < 0 || attendance.weekly_bonus < 0 || attendance.month_end_bonus < 0
        {
            return Err(ConfigError::Invalid(
                "attendance rewards must be >= 0".into(),
            ));
        }

        let jackpot = &self.jackpot;
        if jackpot.sevens_multiplier < 0
            || jackpot.triple_multiplier < 0
            || jackpot.fours_penalty_multiplier < 0
        {
            return Err(ConfigError::Invalid(
                "jackpot multipliers must be >= 0".into(),
            ));
        }

        if self.ranking_limit == 0 {
            return Err(ConfigError::Invalid("ranking_limit must be > 0".into()));
        }
        if self.name_max_chars == 0 {
            return Err(ConfigError::Invalid("name_max_chars must be > 0".into()));
        }
        Ok(())
    }

    /// Cross-record limits enforced by the ledger store.
    pub fn ledger_limits(&self) -> LedgerLimits {
        LedgerLimits {
            max_unpaid_deposits: self.deposit.max_slots,
            mining_daily_limit: self.mining.daily_limit,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn check_terms(section: &str, terms: &ProductTerms) -> Result<(), ConfigError> {
    if terms.min_days == 0 || terms.min_days > terms.max_days || terms.max_days > MAX_TERM_DAYS {
        return Err(ConfigError::Invalid(format!(
            "{section}: day range must satisfy 0 < min_days <= max_days <= {MAX_TERM_DAYS}"
        )));
    }
    if terms.min_rate > terms.max_rate {
        return Err(ConfigError::Invalid(format!(
            "{section}: min_rate must be <= max_rate"
        )));
    }
    if terms.min_tax > terms.max_tax || terms.max_tax > 100 {
        return Err(ConfigError::Invalid(format!(
            "{section}: tax range must satisfy min_tax <= max_tax <= 100"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EconomyConfig};

    #[test]
    fn empty_document_yields_defaults() {
        let config = EconomyConfig::from_toml_str("").unwrap();
        assert_eq!(config, EconomyConfig::default());
        assert_eq!(config.ledger_limits().max_unpaid_deposits, 2);
        assert_eq!(config.ledger_limits().mining_daily_limit, 3);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EconomyConfig::from_toml_str(
            r#"
            ranking_limit = 25

            [mining]
            daily_limit = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.ranking_limit, 25);
        assert_eq!(config.mining.daily_limit, 5);
        assert_eq!(config.mining.rewards.len(), 3);
        assert_eq!(config.attendance.base_reward, 3_000);
    }

    #[test]
    fn inverted_day_range_is_rejected() {
        let err = EconomyConfig::from_toml_str(
            r#"
            [deposit.basic]
            min_days = 9
            max_days = 3
            min_rate = 10
            max_rate = 50
            min_tax = 0
            max_tax = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = EconomyConfig::from_toml_str("rankng_limit = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
