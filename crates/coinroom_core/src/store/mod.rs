//! Ledger store contract and backends.
//!
//! # Responsibility
//! - Key-value access to every per-account record (`get`, `put`, `scan`).
//! - All-or-nothing multi-record writes (`apply`) with optimistic guards.
//!
//! # Invariants
//! - A batch commits entirely or leaves every record untouched.
//! - Every committed batch bumps `version` once per touched account, so a
//!   guard built from a stale snapshot always fails with `Conflict`.
//! - Written records pass `Record::validate` and the cross-record limits
//!   (`LedgerLimits`) before commit. A batch carrying its own limits is
//!   checked against those instead of the store's.
//! - Accounts and deposits are never deleted.

mod memory;
mod sqlite;

pub use memory::MemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;

use crate::db::DbError;
use crate::model::{
    Account, AccountId, AccountSnapshot, Deposit, DepositId, LedgerLimits, Record, RecordKey,
    RecordKind, RecordValidationError,
};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type StoreResult<T> = Result<T, StoreError>;

/// Ledger store failures.
#[derive(Debug)]
pub enum StoreError {
    /// Backing medium is busy, locked or unreachable. Retryable.
    Unavailable(String),
    /// A version guard did not match; re-read and retry the whole operation.
    Conflict { account_id: AccountId },
    /// A written record violates a record or cross-record invariant.
    Validation(RecordValidationError),
    /// A satellite record was written for an account that does not exist.
    Orphan {
        kind: RecordKind,
        account_id: AccountId,
    },
    /// The mutation is not allowed by the store contract.
    Unsupported(&'static str),
    /// Persisted data cannot be decoded into a valid record.
    InvalidData(String),
    /// Any other database failure.
    Db(DbError),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict { .. })
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(details) => write!(f, "ledger store unavailable: {details}"),
            Self::Conflict { account_id } => {
                write!(f, "concurrent write conflict on account {account_id}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Orphan { kind, account_id } => write!(
                f,
                "cannot write {} record for unknown account {account_id}",
                kind.as_str()
            ),
            Self::Unsupported(details) => write!(f, "unsupported mutation: {details}"),
            Self::InvalidData(details) => write!(f, "invalid persisted ledger data: {details}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RecordValidationError> for StoreError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match value.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly,
            ) => Self::Unavailable(value.to_string()),
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Db(other),
        }
    }
}

/// Expected state of an account when a batch commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGuard {
    pub account_id: AccountId,
    /// `None` requires the account to be absent.
    pub expected: Option<i64>,
}

/// One ordered write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put(Record),
    Delete(RecordKey),
}

impl Mutation {
    pub fn owner(&self) -> AccountId {
        match self {
            Self::Put(record) => record.key().owner().clone(),
            Self::Delete(key) => key.owner().clone(),
        }
    }
}

/// Ordered mutations plus the guards they are conditional on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    guards: Vec<VersionGuard>,
    mutations: Vec<Mutation>,
    limits: Option<LedgerLimits>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits only if the account still has `version`.
    pub fn expect_version(mut self, account_id: AccountId, version: i64) -> Self {
        self.guards.push(VersionGuard {
            account_id,
            expected: Some(version),
        });
        self
    }

    /// Commits only if the account does not exist yet.
    pub fn expect_absent(mut self, account_id: AccountId) -> Self {
        self.guards.push(VersionGuard {
            account_id,
            expected: None,
        });
        self
    }

    pub fn put(mut self, record: Record) -> Self {
        self.mutations.push(Mutation::Put(record));
        self
    }

    pub fn delete(mut self, key: RecordKey) -> Self {
        self.mutations.push(Mutation::Delete(key));
        self
    }

    /// Validates this batch against `limits` instead of the store's own.
    pub fn with_limits(mut self, limits: LedgerLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn limits(&self) -> Option<&LedgerLimits> {
        self.limits.as_ref()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn guards(&self) -> &[VersionGuard] {
        &self.guards
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Accounts whose version a commit of this batch will bump.
    pub fn touched_accounts(&self) -> BTreeSet<AccountId> {
        self.mutations.iter().map(Mutation::owner).collect()
    }
}

/// Persistence contract for per-account ledger records.
pub trait LedgerStore {
    /// Loads one record by key.
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Record>>;
    /// Loads every record of one kind, ordered by key.
    fn scan(&self, kind: RecordKind) -> StoreResult<Vec<Record>>;
    /// Loads every record owned by one account from a single consistent view.
    fn snapshot(&self, account_id: &AccountId) -> StoreResult<Option<AccountSnapshot>>;
    /// Accounts ordered by `balance DESC, id ASC`.
    fn top_accounts(&self, limit: u32) -> StoreResult<Vec<Account>>;
    /// Commits every mutation of `batch` or none of them.
    fn apply(&self, batch: &WriteBatch) -> StoreResult<()>;

    /// Unconditional single-record upsert.
    fn put(&self, record: Record) -> StoreResult<()> {
        self.apply(&WriteBatch::new().put(record))
    }
}

impl<T: LedgerStore + ?Sized> LedgerStore for &T {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        (**self).get(key)
    }
    fn scan(&self, kind: RecordKind) -> StoreResult<Vec<Record>> {
        (**self).scan(kind)
    }
    fn snapshot(&self, account_id: &AccountId) -> StoreResult<Option<AccountSnapshot>> {
        (**self).snapshot(account_id)
    }
    fn top_accounts(&self, limit: u32) -> StoreResult<Vec<Account>> {
        (**self).top_accounts(limit)
    }
    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        (**self).apply(batch)
    }
}

impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        (**self).get(key)
    }
    fn scan(&self, kind: RecordKind) -> StoreResult<Vec<Record>> {
        (**self).scan(kind)
    }
    fn snapshot(&self, account_id: &AccountId) -> StoreResult<Option<AccountSnapshot>> {
        (**self).snapshot(account_id)
    }
    fn top_accounts(&self, limit: u32) -> StoreResult<Vec<Account>> {
        (**self).top_accounts(limit)
    }
    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        (**self).apply(batch)
    }
}

/// Backend-specific view used while a batch is being staged.
///
/// Implementations run inside their own atomicity boundary (SQL transaction
/// or a private copy of the state); `stage_batch` only decides what to write.
trait StagingArea {
    fn account_version(&mut self, account_id: &AccountId) -> StoreResult<Option<i64>>;
    fn load_deposit(
        &mut self,
        account_id: &AccountId,
        deposit_id: &DepositId,
    ) -> StoreResult<Option<Deposit>>;
    fn unpaid_deposits(&mut self, account_id: &AccountId) -> StoreResult<usize>;
    fn write(&mut self, record: &Record) -> StoreResult<()>;
    fn remove(&mut self, key: &RecordKey) -> StoreResult<()>;
    fn bump_version(&mut self, account_id: &AccountId) -> StoreResult<()>;
}

fn stage_batch<A: StagingArea>(
    area: &mut A,
    batch: &WriteBatch,
    store_limits: &LedgerLimits,
) -> StoreResult<()> {
    let limits = batch.limits().unwrap_or(store_limits);
    for guard in batch.guards() {
        let current = area.account_version(&guard.account_id)?;
        if current != guard.expected {
            return Err(StoreError::Conflict {
                account_id: guard.account_id.clone(),
            });
        }
    }

    for mutation in batch.mutations() {
        match mutation {
            Mutation::Put(record) => {
                record.validate(limits)?;
                if let Record::Account(_) = record {
                    area.write(record)?;
                    continue;
                }

                let key = record.key();
                let owner = key.owner();
                if area.account_version(owner)?.is_none() {
                    return Err(StoreError::Orphan {
                        kind: key.kind(),
                        account_id: owner.clone(),
                    });
                }
                if let Record::Deposit(next) = record {
                    if let Some(existing) = area.load_deposit(&next.account_id, &next.id)? {
                        existing.check_transition(next)?;
                    }
                }
                area.write(record)?;
            }
            Mutation::Delete(RecordKey::Account(_)) => {
                return Err(StoreError::Unsupported("accounts are never deleted"));
            }
            Mutation::Delete(RecordKey::Deposit(..)) => {
                return Err(StoreError::Unsupported("deposits are never deleted"));
            }
            Mutation::Delete(key) => area.remove(key)?,
        }
    }

    for account_id in batch.touched_accounts() {
        let unpaid = area.unpaid_deposits(&account_id)?;
        if unpaid > limits.max_unpaid_deposits {
            return Err(RecordValidationError::DepositSlotsExceeded {
                account_id,
                unpaid,
                max: limits.max_unpaid_deposits,
            }
            .into());
        }
        area.bump_version(&account_id)?;
    }

    Ok(())
}
