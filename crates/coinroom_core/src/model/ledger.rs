//! Satellite ledger records owned by an account.
//!
//! # Invariants
//! - A deposit only ever transitions `paid: false -> true`; everything else is
//!   fixed at creation.
//! - A stock position with zero quantity does not exist; it is deleted.
//! - Room ownership always contains `DEFAULT_ROOM_SKIN` and the active skin.

use super::{AccountId, RecordValidationError};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Skin every account owns from the start.
pub const DEFAULT_ROOM_SKIN: &str = "Room1";

/// Deposit identifier. New ids are UUIDv7 so they sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepositId(String);

impl DepositId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an id issued elsewhere (legacy import, persisted rows).
    pub fn from_existing(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DepositId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deposit product kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepositProduct {
    /// Short term, moderate rate, untaxed.
    Basic,
    /// Long term, volatile rate, taxed.
    Premium,
}

impl DepositProduct {
    /// Accepts canonical names and the legacy `soso`/`hanbang` aliases.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" | "soso" => Some(Self::Basic),
            "premium" | "hanbang" => Some(Self::Premium),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }
}

/// Time-boxed principal plus interest commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub id: DepositId,
    pub account_id: AccountId,
    pub product: DepositProduct,
    pub principal: i64,
    pub term_days: u32,
    /// Percent for basic deposits, raw multiplier for premium ones.
    pub rate_pct: u32,
    /// Always `0` for basic deposits.
    pub tax_pct: u32,
    pub start_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub paid: bool,
}

impl Deposit {
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.principal <= 0 {
            return Err(RecordValidationError::NonPositivePrincipal(self.id.clone()));
        }
        if self.maturity_date < self.start_date {
            return Err(RecordValidationError::MaturityBeforeStart(self.id.clone()));
        }
        Ok(())
    }

    /// Unpaid and due on or before `today`.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        !self.paid && self.maturity_date <= today
    }

    /// Checks that `next` is a legal successor of this persisted deposit.
    pub fn check_transition(&self, next: &Deposit) -> Result<(), RecordValidationError> {
        if self.paid {
            if self == next {
                return Ok(());
            }
            return Err(RecordValidationError::DepositSettled(self.id.clone()));
        }

        let same_terms = Deposit {
            paid: next.paid,
            ..self.clone()
        };
        if &same_terms != next {
            return Err(RecordValidationError::DepositImmutable(self.id.clone()));
        }
        Ok(())
    }
}

/// Daily mining quota state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningState {
    pub account_id: AccountId,
    pub last_day: NaiveDate,
    pub count: u32,
}

impl MiningState {
    /// Attempts already used on `today`; a stale day counts as zero.
    pub fn used_on(&self, today: NaiveDate) -> u32 {
        if self.last_day == today {
            self.count
        } else {
            0
        }
    }
}

/// Calendar attendance streak state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceState {
    pub account_id: AccountId,
    pub last_date: Option<NaiveDate>,
    pub days: BTreeSet<NaiveDate>,
    pub streak: u32,
}

impl AttendanceState {
    pub fn empty(account_id: AccountId) -> Self {
        Self {
            account_id,
            last_date: None,
            days: BTreeSet::new(),
            streak: 0,
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.streak > 0 && self.last_date.is_none() {
            return Err(RecordValidationError::InvalidAttendance(
                "streak without a last check-in date",
            ));
        }
        Ok(())
    }
}

/// Held quantity of one symbol with its weighted-average cost basis.
#[derive(Debug, Clone, PartialEq)]
pub struct StockPosition {
    pub account_id: AccountId,
    pub symbol: String,
    pub quantity: f64,
    pub avg_price: f64,
}

impl StockPosition {
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(RecordValidationError::EmptySymbol);
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(RecordValidationError::InvalidQuantity {
                symbol: self.symbol.clone(),
                quantity: self.quantity,
            });
        }
        if !self.avg_price.is_finite() || self.avg_price < 0.0 {
            return Err(RecordValidationError::InvalidAveragePrice {
                symbol: self.symbol.clone(),
                avg_price: self.avg_price,
            });
        }
        Ok(())
    }
}

/// Cosmetic room skins owned by an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomOwnership {
    pub account_id: AccountId,
    pub owned: BTreeSet<String>,
    pub active: String,
}

impl RoomOwnership {
    /// Initial state: only the default skin, which is also active.
    pub fn with_default(account_id: AccountId) -> Self {
        Self {
            account_id,
            owned: BTreeSet::from([DEFAULT_ROOM_SKIN.to_string()]),
            active: DEFAULT_ROOM_SKIN.to_string(),
        }
    }

    pub fn owns(&self, skin: &str) -> bool {
        self.owned.contains(skin)
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if !self.owns(DEFAULT_ROOM_SKIN) {
            return Err(RecordValidationError::DefaultSkinMissing);
        }
        if !self.owns(&self.active) {
            return Err(RecordValidationError::ActiveSkinNotOwned(self.active.clone()));
        }
        Ok(())
    }
}
