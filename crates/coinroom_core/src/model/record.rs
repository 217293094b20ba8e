//! Store-facing record envelope, keys and per-account snapshot.

use super::{
    Account, AccountId, AttendanceState, Deposit, DepositId, MiningState, RecordValidationError,
    RoomOwnership, StockPosition,
};

/// Record family stored by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Account,
    Deposit,
    Mining,
    Attendance,
    Stock,
    Room,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Deposit => "deposit",
            Self::Mining => "mining",
            Self::Attendance => "attendance",
            Self::Stock => "stock",
            Self::Room => "room",
        }
    }
}

/// Address of one record. Deposits and stocks carry a secondary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Account(AccountId),
    Deposit(AccountId, DepositId),
    Mining(AccountId),
    Attendance(AccountId),
    Stock(AccountId, String),
    Room(AccountId),
}

impl RecordKey {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Account(_) => RecordKind::Account,
            Self::Deposit(..) => RecordKind::Deposit,
            Self::Mining(_) => RecordKind::Mining,
            Self::Attendance(_) => RecordKind::Attendance,
            Self::Stock(..) => RecordKind::Stock,
            Self::Room(_) => RecordKind::Room,
        }
    }

    pub fn owner(&self) -> &AccountId {
        match self {
            Self::Account(id)
            | Self::Deposit(id, _)
            | Self::Mining(id)
            | Self::Attendance(id)
            | Self::Stock(id, _)
            | Self::Room(id) => id,
        }
    }
}

/// Limits that span more than one record or depend on configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerLimits {
    pub max_unpaid_deposits: usize,
    pub mining_daily_limit: u32,
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            max_unpaid_deposits: 2,
            mining_daily_limit: 3,
        }
    }
}

/// One persisted record of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Account(Account),
    Deposit(Deposit),
    Mining(MiningState),
    Attendance(AttendanceState),
    Stock(StockPosition),
    Room(RoomOwnership),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        self.key().kind()
    }

    pub fn key(&self) -> RecordKey {
        match self {
            Self::Account(account) => RecordKey::Account(account.id.clone()),
            Self::Deposit(deposit) => {
                RecordKey::Deposit(deposit.account_id.clone(), deposit.id.clone())
            }
            Self::Mining(state) => RecordKey::Mining(state.account_id.clone()),
            Self::Attendance(state) => RecordKey::Attendance(state.account_id.clone()),
            Self::Stock(position) => {
                RecordKey::Stock(position.account_id.clone(), position.symbol.clone())
            }
            Self::Room(room) => RecordKey::Room(room.account_id.clone()),
        }
    }

    /// Validates record-local invariants, including configured bounds.
    pub fn validate(&self, limits: &LedgerLimits) -> Result<(), RecordValidationError> {
        match self {
            Self::Account(account) => account.validate(),
            Self::Deposit(deposit) => deposit.validate(),
            Self::Mining(state) => {
                if state.count > limits.mining_daily_limit {
                    return Err(RecordValidationError::MiningCountOutOfRange {
                        count: state.count,
                        max: limits.mining_daily_limit,
                    });
                }
                Ok(())
            }
            Self::Attendance(state) => state.validate(),
            Self::Stock(position) => position.validate(),
            Self::Room(room) => room.validate(),
        }
    }
}

/// Consistent read of every record owned by one account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub account: Account,
    /// Ordered by id, which is creation order for generated ids.
    pub deposits: Vec<Deposit>,
    pub mining: Option<MiningState>,
    pub attendance: Option<AttendanceState>,
    /// Ordered by symbol.
    pub stocks: Vec<StockPosition>,
    pub room: Option<RoomOwnership>,
}

impl AccountSnapshot {
    pub fn unpaid_deposits(&self) -> usize {
        self.deposits.iter().filter(|deposit| !deposit.paid).count()
    }

    pub fn position(&self, symbol: &str) -> Option<&StockPosition> {
        self.stocks.iter().find(|position| position.symbol == symbol)
    }
}
