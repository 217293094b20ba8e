//! In-memory ledger store.
//!
//! Readers share an immutable `Arc<LedgerState>`; `apply` stages a batch on a
//! private copy and swaps it in only when every mutation succeeded.

use super::{stage_batch, LedgerStore, StagingArea, StoreError, StoreResult, WriteBatch};
use crate::model::{
    Account, AccountId, AccountSnapshot, AttendanceState, Deposit, DepositId, LedgerLimits,
    MiningState, Record, RecordKey, RecordKind, RoomOwnership, StockPosition,
};
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: BTreeMap<AccountId, Account>,
    deposits: BTreeMap<(AccountId, DepositId), Deposit>,
    mining: BTreeMap<AccountId, MiningState>,
    attendance: BTreeMap<AccountId, AttendanceState>,
    stocks: BTreeMap<(AccountId, String), StockPosition>,
    rooms: BTreeMap<AccountId, RoomOwnership>,
}

impl LedgerState {
    fn get(&self, key: &RecordKey) -> Option<Record> {
        match key {
            RecordKey::Account(id) => self.accounts.get(id).cloned().map(Record::Account),
            RecordKey::Deposit(id, deposit_id) => self
                .deposits
                .get(&(id.clone(), deposit_id.clone()))
                .cloned()
                .map(Record::Deposit),
            RecordKey::Mining(id) => self.mining.get(id).cloned().map(Record::Mining),
            RecordKey::Attendance(id) => self.attendance.get(id).cloned().map(Record::Attendance),
            RecordKey::Stock(id, symbol) => self
                .stocks
                .get(&(id.clone(), symbol.clone()))
                .cloned()
                .map(Record::Stock),
            RecordKey::Room(id) => self.rooms.get(id).cloned().map(Record::Room),
        }
    }

    fn deposits_of<'a>(&'a self, account_id: &'a AccountId) -> impl Iterator<Item = &'a Deposit> {
        self.deposits
            .iter()
            .filter(move |((owner, _), _)| owner == account_id)
            .map(|(_, deposit)| deposit)
    }
}

/// Copy-on-write ledger store for tests and embedding without a database.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<Arc<LedgerState>>,
    limits: LedgerLimits,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: LedgerLimits) -> Self {
        self.limits = limits;
        self
    }

    fn current(&self) -> StoreResult<Arc<LedgerState>> {
        let guard = self.state.lock().map_err(|_| poisoned())?;
        Ok(Arc::clone(&guard))
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("memory ledger lock poisoned".to_string())
}

impl LedgerStore for MemoryLedgerStore {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        Ok(self.current()?.get(key))
    }

    fn scan(&self, kind: RecordKind) -> StoreResult<Vec<Record>> {
        let state = self.current()?;
        let records = match kind {
            RecordKind::Account => state.accounts.values().cloned().map(Record::Account).collect(),
            RecordKind::Deposit => state.deposits.values().cloned().map(Record::Deposit).collect(),
            RecordKind::Mining => state.mining.values().cloned().map(Record::Mining).collect(),
            RecordKind::Attendance => state
                .attendance
                .values()
                .cloned()
                .map(Record::Attendance)
                .collect(),
            RecordKind::Stock => state.stocks.values().cloned().map(Record::Stock).collect(),
            RecordKind::Room => state.rooms.values().cloned().map(Record::Room).collect(),
        };
        Ok(records)
    }

    fn snapshot(&self, account_id: &AccountId) -> StoreResult<Option<AccountSnapshot>> {
        let state = self.current()?;
        let Some(account) = state.accounts.get(account_id).cloned() else {
            return Ok(None);
        };
        Ok(Some(AccountSnapshot {
            account,
            deposits: state.deposits_of(account_id).cloned().collect(),
            mining: state.mining.get(account_id).cloned(),
            attendance: state.attendance.get(account_id).cloned(),
            stocks: state
                .stocks
                .iter()
                .filter(|((owner, _), _)| owner == account_id)
                .map(|(_, position)| position.clone())
                .collect(),
            room: state.rooms.get(account_id).cloned(),
        }))
    }

    fn top_accounts(&self, limit: u32) -> StoreResult<Vec<Account>> {
        let state = self.current()?;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|left, right| {
            right
                .balance
                .cmp(&left.balance)
                .then_with(|| left.id.cmp(&right.id))
        });
        accounts.truncate(limit as usize);
        Ok(accounts)
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut guard = self.state.lock().map_err(|_| poisoned())?;
        let mut staged = LedgerState::clone(&guard);
        if let Err(err) = stage_batch(&mut staged, batch, &self.limits) {
            debug!("event=store_apply module=store status=rejected backend=memory error={err}");
            return Err(err);
        }
        *guard = Arc::new(staged);
        Ok(())
    }
}

impl StagingArea for LedgerState {
    fn account_version(&mut self, account_id: &AccountId) -> StoreResult<Option<i64>> {
        Ok(self.accounts.get(account_id).map(|account| account.version))
    }

    fn load_deposit(
        &mut self,
        account_id: &AccountId,
        deposit_id: &DepositId,
    ) -> StoreResult<Option<Deposit>> {
        Ok(self
            .deposits
            .get(&(account_id.clone(), deposit_id.clone()))
            .cloned())
    }

    fn unpaid_deposits(&mut self, account_id: &AccountId) -> StoreResult<usize> {
        Ok(self
            .deposits_of(account_id)
            .filter(|deposit| !deposit.paid)
            .count())
    }

    fn write(&mut self, record: &Record) -> StoreResult<()> {
        match record {
            Record::Account(account) => {
                let version = self
                    .accounts
                    .get(&account.id)
                    .map_or(0, |existing| existing.version);
                self.accounts.insert(
                    account.id.clone(),
                    Account {
                        version,
                        ..account.clone()
                    },
                );
            }
            Record::Deposit(deposit) => {
                self.deposits.insert(
                    (deposit.account_id.clone(), deposit.id.clone()),
                    deposit.clone(),
                );
            }
            Record::Mining(state) => {
                self.mining.insert(state.account_id.clone(), state.clone());
            }
            Record::Attendance(state) => {
                self.attendance
                    .insert(state.account_id.clone(), state.clone());
            }
            Record::Stock(position) => {
                self.stocks.insert(
                    (position.account_id.clone(), position.symbol.clone()),
                    position.clone(),
                );
            }
            Record::Room(room) => {
                self.rooms.insert(room.account_id.clone(), room.clone());
            }
        }
        Ok(())
    }

    fn remove(&mut self, key: &RecordKey) -> StoreResult<()> {
        match key {
            RecordKey::Account(_) => {
                return Err(StoreError::Unsupported("accounts are never deleted"));
            }
            RecordKey::Deposit(id, deposit_id) => {
                self.deposits.remove(&(id.clone(), deposit_id.clone()));
            }
            RecordKey::Mining(id) => {
                self.mining.remove(id);
            }
            RecordKey::Attendance(id) => {
                self.attendance.remove(id);
            }
            RecordKey::Stock(id, symbol) => {
                self.stocks.remove(&(id.clone(), symbol.clone()));
            }
            RecordKey::Room(id) => {
                self.rooms.remove(id);
            }
        }
        Ok(())
    }

    fn bump_version(&mut self, account_id: &AccountId) -> StoreResult<()> {
        if let Some(account) = self.accounts.get_mut(account_id) {
            account.version += 1;
        }
        Ok(())
    }
}
