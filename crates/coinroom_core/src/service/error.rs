//! Economy operation errors.

use crate::model::{AccountId, RecordValidationError};
use crate::notation::NotationError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EconomyResult<T> = Result<T, EconomyError>;

/// Coarse error family, mapped to transport status by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Input rejected before any read.
    Validation,
    /// Input valid but current state forbids the operation.
    Precondition,
    /// Store failure or exhausted conflict retries.
    Store,
}

#[derive(Debug)]
pub enum EconomyError {
    InvalidAccountId(String),
    InvalidAmount(String),
    InvalidNotation(String),
    InvalidPrice(String),
    InvalidName(String),
    InvalidSymbol(String),
    InvalidSkin(String),
    UnknownProduct(String),
    AmountOverflow,
    UnknownAccount(AccountId),
    InsufficientFunds { required: i64, available: i64 },
    SlotLimit { max: usize },
    LimitReached { limit: u32 },
    AlreadyCheckedIn,
    NoPosition(String),
    InsufficientQuantity {
        symbol: String,
        held: f64,
        requested: f64,
    },
    NotOwned(String),
    Conflict { account_id: AccountId, attempts: u32 },
    Unavailable(String),
    Store(StoreError),
}

impl EconomyError {
    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAccountId(_) => "INVALID_ACCOUNT_ID",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidNotation(_) => "INVALID_NOTATION",
            Self::InvalidPrice(_) => "INVALID_PRICE",
            Self::InvalidName(_) => "INVALID_NAME",
            Self::InvalidSymbol(_) => "INVALID_SYMBOL",
            Self::InvalidSkin(_) => "INVALID_SKIN",
            Self::UnknownProduct(_) => "UNKNOWN_PRODUCT",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::SlotLimit { .. } => "SLOT_LIMIT",
            Self::LimitReached { .. } => "LIMIT_REACHED",
            Self::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            Self::NoPosition(_) => "NO_POSITION",
            Self::InsufficientQuantity { .. } => "INSUFFICIENT_QUANTITY",
            Self::NotOwned(_) => "NOT_OWNED",
            Self::Conflict { .. } => "CONFLICT",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAccountId(_)
            | Self::InvalidAmount(_)
            | Self::InvalidNotation(_)
            | Self::InvalidPrice(_)
            | Self::InvalidName(_)
            | Self::InvalidSymbol(_)
            | Self::InvalidSkin(_)
            | Self::UnknownProduct(_)
            | Self::AmountOverflow => ErrorClass::Validation,
            Self::UnknownAccount(_)
            | Self::InsufficientFunds { .. }
            | Self::SlotLimit { .. }
            | Self::LimitReached { .. }
            | Self::AlreadyCheckedIn
            | Self::NoPosition(_)
            | Self::InsufficientQuantity { .. }
            | Self::NotOwned(_) => ErrorClass::Precondition,
            Self::Conflict { .. } | Self::Unavailable(_) | Self::Store(_) => ErrorClass::Store,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable(_))
    }
}

impl Display for EconomyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAccountId(value) => write!(f, "invalid account id: `{value}`"),
            Self::InvalidAmount(details) => write!(f, "invalid amount: {details}"),
            Self::InvalidNotation(text) => write!(f, "invalid notation: `{text}`"),
            Self::InvalidPrice(details) => write!(f, "invalid price: {details}"),
            Self::InvalidName(details) => write!(f, "invalid name: {details}"),
            Self::InvalidSymbol(value) => write!(f, "invalid stock symbol: `{value}`"),
            Self::InvalidSkin(value) => write!(f, "invalid room skin: `{value}`"),
            Self::UnknownProduct(value) => write!(f, "unknown deposit product: `{value}`"),
            Self::AmountOverflow => write!(f, "amount exceeds the representable range"),
            Self::UnknownAccount(id) => write!(f, "account not found: {id}"),
            Self::InsufficientFunds {
                required,
                available,
            } => write!(f, "insufficient funds: need {required}, have {available}"),
            Self::SlotLimit { max } => write!(f, "at most {max} active deposits are allowed"),
            Self::LimitReached { limit } => write!(f, "daily limit of {limit} reached"),
            Self::AlreadyCheckedIn => write!(f, "already checked in today"),
            Self::NoPosition(symbol) => write!(f, "no position in `{symbol}`"),
            Self::InsufficientQuantity {
                symbol,
                held,
                requested,
            } => write!(f, "cannot sell {requested} of `{symbol}`; holding {held}"),
            Self::NotOwned(skin) => write!(f, "room skin `{skin}` is not owned"),
            Self::Conflict {
                account_id,
                attempts,
            } => write!(
                f,
                "account {account_id} kept changing concurrently ({attempts} attempts)"
            ),
            Self::Unavailable(details) => write!(f, "ledger unavailable: {details}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EconomyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for EconomyError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(details) => Self::Unavailable(details),
            StoreError::Conflict { account_id } => Self::Conflict {
                account_id,
                attempts: 1,
            },
            StoreError::Validation(RecordValidationError::DepositSlotsExceeded { max, .. }) => {
                Self::SlotLimit { max }
            }
            other => Self::Store(other),
        }
    }
}

impl From<NotationError> for EconomyError {
    fn from(value: NotationError) -> Self {
        match value {
            NotationError::InvalidNotation(text) => Self::InvalidNotation(text),
            NotationError::NonFinite(value) => Self::InvalidNotation(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EconomyError, ErrorClass};
    use crate::model::{AccountId, RecordValidationError};
    use crate::store::StoreError;

    #[test]
    fn store_slot_violation_surfaces_as_slot_limit() {
        let err: EconomyError = StoreError::Validation(RecordValidationError::DepositSlotsExceeded {
            account_id: AccountId::parse("a").unwrap(),
            unpaid: 3,
            max: 2,
        })
        .into();
        assert_eq!(err.code(), "SLOT_LIMIT");
        assert_eq!(err.class(), ErrorClass::Precondition);
    }

    #[test]
    fn unavailable_is_retryable_store_class() {
        let err: EconomyError = StoreError::Unavailable("database is locked".into()).into();
        assert_eq!(err.code(), "UNAVAILABLE");
        assert_eq!(err.class(), ErrorClass::Store);
        assert!(err.is_retryable());
        assert!(!EconomyError::AlreadyCheckedIn.is_retryable());
    }
}
