//! Account record.
//!
//! # Invariants
//! - `id` is externally issued and trusted as-is (trimmed, non-blank).
//! - `balance` is never negative after a committed write.
//! - `version` is owned by the store; callers only echo it back in guards.

use super::RecordValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const ACCOUNT_ID_MAX_CHARS: usize = 128;

/// Opaque external account identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Parses a caller-supplied identifier.
    pub fn parse(value: &str) -> Result<Self, RecordValidationError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.chars().count() > ACCOUNT_ID_MAX_CHARS {
            return Err(RecordValidationError::InvalidAccountId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user's economic identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// Smallest currency unit.
    pub balance: i64,
    /// Unix epoch milliseconds of first sight.
    pub joined_at_ms: i64,
    /// Optimistic concurrency token; `0` for a record not yet persisted.
    pub version: i64,
}

impl Account {
    /// Creates an unpersisted account with zero balance.
    pub fn new(id: AccountId, name: impl Into<String>, joined_at_ms: i64) -> Self {
        Self {
            id,
            name: name.into(),
            balance: 0,
            joined_at_ms,
            version: 0,
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.name.trim().is_empty() {
            return Err(RecordValidationError::EmptyName);
        }
        if self.balance < 0 {
            return Err(RecordValidationError::NegativeBalance {
                account_id: self.id.clone(),
                balance: self.balance,
            });
        }
        Ok(())
    }
}
