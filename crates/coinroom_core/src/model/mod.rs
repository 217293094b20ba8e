//! Ledger domain model.
//!
//! # Responsibility
//! - Define the per-account records persisted by the ledger store.
//! - Provide record-level validation shared by every store backend.
//!
//! # Invariants
//! - Every record is owned by exactly one account via `AccountId`.
//! - Accounts are never deleted; satellite records may be.
//! - `validate()` is called on every write path before persistence.

pub mod account;
pub mod ledger;
pub mod record;

use std::error::Error;
use std::fmt::{Display, Formatter};

pub use account::{Account, AccountId};
pub use ledger::{
    AttendanceState, Deposit, DepositId, DepositProduct, MiningState, RoomOwnership,
    StockPosition, DEFAULT_ROOM_SKIN,
};
pub use record::{AccountSnapshot, LedgerLimits, Record, RecordKey, RecordKind};

/// Record-level invariant violations.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValidationError {
    /// Account identifier is blank or too long.
    InvalidAccountId(String),
    /// Display name is blank.
    EmptyName,
    /// Balance would be negative.
    NegativeBalance { account_id: AccountId, balance: i64 },
    /// Deposit principal must be positive.
    NonPositivePrincipal(DepositId),
    /// Maturity date precedes start date.
    MaturityBeforeStart(DepositId),
    /// Paid deposits cannot change, and `paid` never flips back.
    DepositSettled(DepositId),
    /// Only the `paid` flag of an unpaid deposit may change.
    DepositImmutable(DepositId),
    /// More unpaid deposits than the slot limit.
    DepositSlotsExceeded {
        account_id: AccountId,
        unpaid: usize,
        max: usize,
    },
    /// Mining count outside `[0, daily_limit]`.
    MiningCountOutOfRange { count: u32, max: u32 },
    /// Attendance state is internally inconsistent.
    InvalidAttendance(&'static str),
    /// Stock symbol is blank.
    EmptySymbol,
    /// Position quantity must be finite and positive.
    InvalidQuantity { symbol: String, quantity: f64 },
    /// Average price must be finite and non-negative.
    InvalidAveragePrice { symbol: String, avg_price: f64 },
    /// Room record is missing the default skin.
    DefaultSkinMissing,
    /// Active skin is not in the owned set.
    ActiveSkinNotOwned(String),
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAccountId(value) => write!(f, "invalid account id: `{value}`"),
            Self::EmptyName => write!(f, "display name must not be blank"),
            Self::NegativeBalance {
                account_id,
                balance,
            } => write!(f, "balance of {account_id} would be negative: {balance}"),
            Self::NonPositivePrincipal(id) => {
                write!(f, "deposit {id} principal must be positive")
            }
            Self::MaturityBeforeStart(id) => {
                write!(f, "deposit {id} matures before it starts")
            }
            Self::DepositSettled(id) => write!(f, "deposit {id} is already settled"),
            Self::DepositImmutable(id) => {
                write!(f, "deposit {id} terms cannot change after creation")
            }
            Self::DepositSlotsExceeded {
                account_id,
                unpaid,
                max,
            } => write!(
                f,
                "account {account_id} would hold {unpaid} unpaid deposits (max {max})"
            ),
            Self::MiningCountOutOfRange { count, max } => {
                write!(f, "mining count {count} outside [0, {max}]")
            }
            Self::InvalidAttendance(details) => write!(f, "invalid attendance state: {details}"),
            Self::EmptySymbol => write!(f, "stock symbol must not be blank"),
            Self::InvalidQuantity { symbol, quantity } => {
                write!(f, "invalid quantity {quantity} for {symbol}")
            }
            Self::InvalidAveragePrice { symbol, avg_price } => {
                write!(f, "invalid average price {avg_price} for {symbol}")
            }
            Self::DefaultSkinMissing => {
                write!(f, "room ownership must include `{DEFAULT_ROOM_SKIN}`")
            }
            Self::ActiveSkinNotOwned(skin) => write!(f, "active skin `{skin}` is not owned"),
        }
    }
}

impl Error for RecordValidationError {}
