//! Account mutation use-cases.
//!
//! # Responsibility
//! - Expose every balance-affecting operation of the economy.
//! - Keep an account's balance and its satellite records consistent.
//!
//! # Invariants
//! - Every mutation is: read snapshot, validate, compute, apply one batch
//!   guarded by the snapshot's account version.
//! - On `Conflict` the whole operation re-runs from the read, at most
//!   `max_conflict_retries` extra times.
//! - Input validation happens before the first read.
//! - Balances never go negative and amounts never wrap; overflow is
//!   `AMOUNT_OVERFLOW`, except settlement credits which saturate.

use crate::clock::{Clock, SystemClock};
use crate::config::EconomyConfig;
use crate::entropy::{Entropy, ThreadEntropy};
use crate::model::{
    Account, AccountId, AccountSnapshot, AttendanceState, Deposit, DepositId, DepositProduct,
    Record, RecordKey, RecordKind, RoomOwnership, StockPosition,
};
use crate::notation;
use crate::policy::attendance::{self, days_in_month, week_index};
use crate::policy::deposit::{payout, remaining_days, sample_terms, Payout};
use crate::policy::jackpot::{self, Spin};
use crate::policy::mining::{attempts_left, next_attempt, sample_reward};
use crate::service::error::{EconomyError, EconomyResult};
use crate::store::{LedgerStore, Mutation, StoreError, WriteBatch};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::BTreeMap;

const GENERATED_NAME_PREFIX: &str = "user";
/// Rounding slack on a sale, relative to the held quantity.
const QUANTITY_TOLERANCE: f64 = 1e-12;

/// Result of `identify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyOutcome {
    pub account: Account,
    /// `true` when this call created the account.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedDeposit {
    pub deposit: Deposit,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDeposit {
    pub deposit: Deposit,
    pub remaining_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledDeposit {
    /// The deposit as persisted, with `paid = true`.
    pub deposit: Deposit,
    pub payout: Payout,
}

/// Deposit ledger view after lazy settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositInfo {
    pub active: Vec<ActiveDeposit>,
    /// Deposits settled by this call; empty on a repeated call.
    pub payouts: Vec<SettledDeposit>,
    pub balance: i64,
    pub max_slots: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningOutcome {
    pub reward: i64,
    pub left: u32,
    pub balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningInfo {
    pub left: u32,
    pub daily_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInOutcome {
    pub reward: i64,
    pub base_reward: i64,
    pub weekly_bonus: i64,
    pub month_end_bonus: i64,
    pub streak: u32,
    pub week_index: u32,
    pub attended_days: Vec<u32>,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceInfo {
    pub streak: u32,
    pub week_index: u32,
    pub attended_days: Vec<u32>,
    pub already_today: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JackpotOutcome {
    pub symbols: Spin,
    /// Applied on top of the taken bet; negative for a capped loss.
    pub reward: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeOutcome {
    pub symbol: String,
    pub quantity: f64,
    /// Cost debited on a buy, proceeds credited on a sell.
    pub amount: i64,
    /// Position after the trade; `None` once fully sold.
    pub position: Option<StockPosition>,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPurchase {
    pub already_owned: bool,
    pub room: RoomOwnership,
    pub balance: i64,
}

/// Planned writes plus the value returned once they commit.
struct Plan<T> {
    batch: WriteBatch,
    output: T,
}

impl<T> Plan<T> {
    fn write(batch: WriteBatch, output: T) -> Self {
        Self { batch, output }
    }

    fn read_only(output: T) -> Self {
        Self {
            batch: WriteBatch::new(),
            output,
        }
    }
}

/// Serialization point for every account mutation.
///
/// Shareable across threads when the store is (`Arc<AccountMutator<_>>`).
pub struct AccountMutator<S: LedgerStore> {
    store: S,
    config: EconomyConfig,
    clock: Box<dyn Clock + Send + Sync>,
    entropy: Box<dyn Entropy + Send + Sync>,
}

impl<S: LedgerStore> AccountMutator<S> {
    /// Creates a mutator on the system clock and thread-local randomness.
    pub fn new(store: S, config: EconomyConfig) -> Self {
        Self {
            store,
            config,
            clock: Box::new(SystemClock),
            entropy: Box::new(ThreadEntropy),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_entropy(mut self, entropy: impl Entropy + Send + Sync + 'static) -> Self {
        self.entropy = Box::new(entropy);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Returns the account, creating it on first sight.
    ///
    /// A new account starts at balance 0 with `name_hint` (when it is a valid
    /// name) or a generated `user<1000..9999>` name. Creation is guarded by an
    /// absent-expectation, so concurrent first calls create exactly one record.
    pub fn identify(&self, account_id: &str, name_hint: Option<&str>) -> EconomyResult<IdentifyOutcome> {
        let id = parse_account_id(account_id)?;
        let max_attempts = self.max_attempts();

        for attempt in 1..=max_attempts {
            if let Some(snapshot) = self.store.snapshot(&id)? {
                return Ok(IdentifyOutcome {
                    account: snapshot.account,
                    created: false,
                });
            }

            let name = name_hint
                .and_then(|hint| self.normalize_name(hint).ok())
                .unwrap_or_else(|| self.generated_name());
            let account = Account::new(id.clone(), name, self.clock.now_ms());
            let batch = WriteBatch::new()
                .expect_absent(id.clone())
                .put(Record::Account(account))
                .with_limits(self.config.ledger_limits());

            match self.store.apply(&batch) {
                Ok(()) => {
                    info!(
                        "event=account_create module=service status=ok account_id={} attempts={}",
                        id, attempt
                    );
                    let account = self.load(&id)?.account;
                    return Ok(IdentifyOutcome {
                        account,
                        created: true,
                    });
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(
                        "event=account_create module=service status=retry account_id={} attempt={}",
                        id, attempt
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(EconomyError::Conflict {
            account_id: id,
            attempts: max_attempts,
        })
    }

    pub fn balance(&self, account_id: &str) -> EconomyResult<Account> {
        let id = parse_account_id(account_id)?;
        Ok(self.load(&id)?.account)
    }

    /// Sets a trimmed, non-blank display name of at most `name_max_chars`.
    pub fn rename(&self, account_id: &str, name: &str) -> EconomyResult<()> {
        let id = parse_account_id(account_id)?;
        let name = self.normalize_name(name)?;
        self.transact("rename", &id, |snapshot, _| {
            let account = Account {
                name: name.clone(),
                ..snapshot.account.clone()
            };
            Ok(Plan::write(
                WriteBatch::new().put(Record::Account(account)),
                (),
            ))
        })
    }

    /// Adds `amount` and returns the new balance.
    pub fn credit(&self, account_id: &str, amount: i64) -> EconomyResult<i64> {
        let id = parse_account_id(account_id)?;
        require_positive(amount)?;
        self.transact("credit", &id, |snapshot, _| {
            let balance = add_checked(snapshot.account.balance, amount)?;
            Ok(Plan::write(
                WriteBatch::new().put(with_balance(&snapshot.account, balance)),
                balance,
            ))
        })
    }

    /// Subtracts `amount` and returns the new balance.
    pub fn debit(&self, account_id: &str, amount: i64) -> EconomyResult<i64> {
        let id = parse_account_id(account_id)?;
        require_positive(amount)?;
        self.transact("debit", &id, |snapshot, _| {
            let balance = take_funds(&snapshot.account, amount)?;
            Ok(Plan::write(
                WriteBatch::new().put(with_balance(&snapshot.account, balance)),
                balance,
            ))
        })
    }

    /// Moves `amount` into a new deposit with sampled terms.
    pub fn open_deposit(
        &self,
        account_id: &str,
        product: &str,
        amount: i64,
    ) -> EconomyResult<OpenedDeposit> {
        let id = parse_account_id(account_id)?;
        let product = DepositProduct::parse(product)
            .ok_or_else(|| EconomyError::UnknownProduct(product.to_string()))?;
        require_positive(amount)?;

        self.transact("open_deposit", &id, |snapshot, today| {
            let max = self.config.deposit.max_slots;
            if snapshot.unpaid_deposits() >= max {
                return Err(EconomyError::SlotLimit { max });
            }
            let balance = take_funds(&snapshot.account, amount)?;

            let terms = sample_terms(product, &self.config.deposit, &*self.entropy);
            let deposit = Deposit {
                id: DepositId::generate(),
                account_id: id.clone(),
                product,
                principal: amount,
                term_days: terms.term_days,
                rate_pct: terms.rate_pct,
                tax_pct: terms.tax_pct,
                start_date: today,
                maturity_date: terms.maturity_from(today),
                paid: false,
            };

            Ok(Plan::write(
                WriteBatch::new()
                    .put(with_balance(&snapshot.account, balance))
                    .put(Record::Deposit(deposit.clone())),
                OpenedDeposit { deposit, balance },
            ))
        })
    }

    /// Pays out every unpaid deposit due on or before today.
    ///
    /// Idempotent: a deposit is marked paid in the same batch that credits it,
    /// so a second call finds nothing due.
    pub fn settle_deposits(&self, account_id: &str) -> EconomyResult<DepositInfo> {
        let id = parse_account_id(account_id)?;
        self.transact("settle_deposits", &id, |snapshot, today| {
            let mut balance = snapshot.account.balance;
            let mut batch = WriteBatch::new();
            let mut payouts = Vec::new();
            let mut active = Vec::new();

            for deposit in snapshot.deposits.iter().filter(|deposit| !deposit.paid) {
                if deposit.is_due(today) {
                    let amounts = payout(deposit);
                    balance = balance.saturating_add(amounts.total);
                    let settled = Deposit {
                        paid: true,
                        ..deposit.clone()
                    };
                    batch.push(Mutation::Put(Record::Deposit(settled.clone())));
                    payouts.push(SettledDeposit {
                        deposit: settled,
                        payout: amounts,
                    });
                } else {
                    active.push(ActiveDeposit {
                        deposit: deposit.clone(),
                        remaining_days: remaining_days(deposit, today),
                    });
                }
            }
            if !payouts.is_empty() {
                batch.push(Mutation::Put(with_balance(&snapshot.account, balance)));
            }

            Ok(Plan::write(
                batch,
                DepositInfo {
                    active,
                    payouts,
                    balance,
                    max_slots: self.config.deposit.max_slots,
                },
            ))
        })
    }

    /// Settles due deposits, then lists what is still running.
    pub fn deposit_info(&self, account_id: &str) -> EconomyResult<DepositInfo> {
        self.settle_deposits(account_id)
    }

    /// Spends one of today's mining attempts for a weighted random reward.
    pub fn mine(&self, account_id: &str) -> EconomyResult<MiningOutcome> {
        let id = parse_account_id(account_id)?;
        self.transact("mine", &id, |snapshot, today| {
            let limit = self.config.mining.daily_limit;
            let next = next_attempt(&id, snapshot.mining.as_ref(), today, limit)
                .ok_or(EconomyError::LimitReached { limit })?;
            let reward = sample_reward(&self.config.mining.rewards, &*self.entropy);
            let balance = add_checked(snapshot.account.balance, reward)?;
            let left = limit.saturating_sub(next.count);

            Ok(Plan::write(
                WriteBatch::new()
                    .put(with_balance(&snapshot.account, balance))
                    .put(Record::Mining(next)),
                MiningOutcome {
                    reward,
                    left,
                    balance,
                },
            ))
        })
    }

    /// Attempts left today. Read-only; a stale day is reported as a full quota.
    pub fn mining_info(&self, account_id: &str) -> EconomyResult<MiningInfo> {
        let id = parse_account_id(account_id)?;
        let snapshot = self.load(&id)?;
        let daily_limit = self.config.mining.daily_limit;
        Ok(MiningInfo {
            left: attempts_left(snapshot.mining.as_ref(), self.clock.today(), daily_limit),
            daily_limit,
        })
    }

    /// Records today's attendance and pays the streak rewards.
    pub fn check_in(&self, account_id: &str) -> EconomyResult<CheckInOutcome> {
        let id = parse_account_id(account_id)?;
        self.transact("check_in", &id, |snapshot, today| {
            let config = &self.config.attendance;
            let result = attendance::check_in(&id, snapshot.attendance.as_ref(), today, config)
                .ok_or(EconomyError::AlreadyCheckedIn)?;
            let reward = result.reward();
            let balance = add_checked(snapshot.account.balance, reward)?;
            let streak = result.next.streak;
            let output = CheckInOutcome {
                reward,
                base_reward: result.base_reward,
                weekly_bonus: result.weekly_bonus,
                month_end_bonus: result.month_end_bonus,
                streak,
                week_index: week_index(streak, config.weekly_every),
                attended_days: days_in_month(&result.next, today),
                balance,
            };

            Ok(Plan::write(
                WriteBatch::new()
                    .put(with_balance(&snapshot.account, balance))
                    .put(Record::Attendance(result.next)),
                output,
            ))
        })
    }

    pub fn attendance_info(&self, account_id: &str) -> EconomyResult<AttendanceInfo> {
        let id = parse_account_id(account_id)?;
        let snapshot = self.load(&id)?;
        let today = self.clock.today();
        let state = snapshot
            .attendance
            .unwrap_or_else(|| AttendanceState::empty(id.clone()));
        Ok(AttendanceInfo {
            streak: state.streak,
            week_index: week_index(state.streak, self.config.attendance.weekly_every),
            attended_days: days_in_month(&state, today),
            already_today: state.last_date == Some(today),
        })
    }

    /// Takes `bet`, spins three reels and applies the reward.
    pub fn jackpot(&self, account_id: &str, bet: i64) -> EconomyResult<JackpotOutcome> {
        let id = parse_account_id(account_id)?;
        require_positive(bet)?;
        self.transact("jackpot", &id, |snapshot, _| {
            take_funds(&snapshot.account, bet)?;
            let symbols = jackpot::spin(&*self.entropy);
            let nominal = jackpot::nominal_reward(&symbols, bet, &self.config.jackpot)
                .ok_or(EconomyError::AmountOverflow)?;
            let settlement = jackpot::settle(snapshot.account.balance, bet, nominal)
                .ok_or(EconomyError::AmountOverflow)?;

            Ok(Plan::write(
                WriteBatch::new().put(with_balance(&snapshot.account, settlement.balance)),
                JackpotOutcome {
                    symbols,
                    reward: settlement.reward,
                    balance: settlement.balance,
                },
            ))
        })
    }

    /// Richest accounts, `balance DESC, id ASC`. Defaults to `ranking_limit`.
    pub fn ranking(&self, limit: Option<u32>) -> EconomyResult<Vec<Account>> {
        let limit = limit.unwrap_or(self.config.ranking_limit);
        Ok(self.store.top_accounts(limit)?)
    }

    /// Buys `quantity` (plain or suffix notation) at `price` per unit.
    ///
    /// Cost is `ceil(quantity * price)`; the position's average price becomes
    /// the quantity-weighted mean of old and new lots.
    pub fn buy_stock(
        &self,
        account_id: &str,
        symbol: &str,
        quantity: &str,
        price: f64,
    ) -> EconomyResult<TradeOutcome> {
        let id = parse_account_id(account_id)?;
        let symbol = normalize_symbol(symbol)?;
        let quantity = decode_quantity(quantity)?;
        require_price(price)?;
        let cost = trade_value(quantity, price, f64::ceil)?;

        self.transact("buy_stock", &id, |snapshot, _| {
            let balance = take_funds(&snapshot.account, cost)?;
            let position = match snapshot.position(&symbol) {
                Some(existing) => {
                    let total = existing.quantity + quantity;
                    let avg_price =
                        (existing.quantity * existing.avg_price + quantity * price) / total;
                    if !total.is_finite() || !avg_price.is_finite() {
                        return Err(EconomyError::AmountOverflow);
                    }
                    StockPosition {
                        quantity: total,
                        avg_price,
                        ..existing.clone()
                    }
                }
                None => StockPosition {
                    account_id: id.clone(),
                    symbol: symbol.clone(),
                    quantity,
                    avg_price: price,
                },
            };

            Ok(Plan::write(
                WriteBatch::new()
                    .put(with_balance(&snapshot.account, balance))
                    .put(Record::Stock(position.clone())),
                TradeOutcome {
                    symbol: symbol.clone(),
                    quantity,
                    amount: cost,
                    position: Some(position),
                    balance,
                },
            ))
        })
    }

    /// Sells `quantity` at `price`; proceeds are `floor(quantity * price)`.
    /// A position is deleted only once the remainder is float noise relative
    /// to the held quantity.
    pub fn sell_stock(
        &self,
        account_id: &str,
        symbol: &str,
        quantity: &str,
        price: f64,
    ) -> EconomyResult<TradeOutcome> {
        let id = parse_account_id(account_id)?;
        let symbol = normalize_symbol(symbol)?;
        let quantity = decode_quantity(quantity)?;
        require_price(price)?;

        self.transact("sell_stock", &id, |snapshot, _| {
            let existing = snapshot
                .position(&symbol)
                .ok_or_else(|| EconomyError::NoPosition(symbol.clone()))?;
            let tolerance = existing.quantity * QUANTITY_TOLERANCE;
            if quantity > existing.quantity + tolerance {
                return Err(EconomyError::InsufficientQuantity {
                    symbol: symbol.clone(),
                    held: existing.quantity,
                    requested: quantity,
                });
            }
            let sold = quantity.min(existing.quantity);
            let proceeds = trade_value(sold, price, f64::floor)?;
            let balance = add_checked(snapshot.account.balance, proceeds)?;
            let remaining = existing.quantity - sold;

            let batch = WriteBatch::new().put(with_balance(&snapshot.account, balance));
            let (batch, position) = if remaining <= tolerance {
                (batch.delete(RecordKey::Stock(id.clone(), symbol.clone())), None)
            } else {
                let position = StockPosition {
                    quantity: remaining,
                    ..existing.clone()
                };
                (batch.put(Record::Stock(position.clone())), Some(position))
            };

            Ok(Plan::write(
                batch,
                TradeOutcome {
                    symbol: symbol.clone(),
                    quantity: sold,
                    amount: proceeds,
                    position,
                    balance,
                },
            ))
        })
    }

    pub fn positions(&self, account_id: &str) -> EconomyResult<Vec<StockPosition>> {
        let id = parse_account_id(account_id)?;
        Ok(self.load(&id)?.stocks)
    }

    /// Every account's positions, keyed by account id.
    pub fn all_positions(&self) -> EconomyResult<BTreeMap<AccountId, Vec<StockPosition>>> {
        let mut grouped: BTreeMap<AccountId, Vec<StockPosition>> = BTreeMap::new();
        for record in self.store.scan(RecordKind::Stock)? {
            if let Record::Stock(position) = record {
                grouped
                    .entry(position.account_id.clone())
                    .or_default()
                    .push(position);
            }
        }
        Ok(grouped)
    }

    /// Owned and active skins; materialises the default room on first access.
    pub fn rooms(&self, account_id: &str) -> EconomyResult<RoomOwnership> {
        let id = parse_account_id(account_id)?;
        self.transact("rooms", &id, |snapshot, _| match &snapshot.room {
            Some(room) => Ok(Plan::read_only(room.clone())),
            None => {
                let room = RoomOwnership::with_default(id.clone());
                Ok(Plan::write(
                    WriteBatch::new().put(Record::Room(room.clone())),
                    room,
                ))
            }
        })
    }

    /// Buys a skin. Buying an owned skin succeeds without charging.
    pub fn buy_room_skin(
        &self,
        account_id: &str,
        skin: &str,
        price: i64,
    ) -> EconomyResult<RoomPurchase> {
        let id = parse_account_id(account_id)?;
        let skin = normalize_skin(skin)?;
        if price < 0 {
            return Err(EconomyError::InvalidPrice(format!(
                "skin price must be >= 0, got {price}"
            )));
        }

        self.transact("buy_room_skin", &id, |snapshot, _| {
            let mut room = snapshot
                .room
                .clone()
                .unwrap_or_else(|| RoomOwnership::with_default(id.clone()));
            if room.owns(&skin) {
                return Ok(Plan::read_only(RoomPurchase {
                    already_owned: true,
                    room,
                    balance: snapshot.account.balance,
                }));
            }

            let balance = take_funds(&snapshot.account, price)?;
            room.owned.insert(skin.clone());
            Ok(Plan::write(
                WriteBatch::new()
                    .put(with_balance(&snapshot.account, balance))
                    .put(Record::Room(room.clone())),
                RoomPurchase {
                    already_owned: false,
                    room,
                    balance,
                },
            ))
        })
    }

    /// Makes an owned skin the active one.
    pub fn apply_room_skin(&self, account_id: &str, skin: &str) -> EconomyResult<RoomOwnership> {
        let id = parse_account_id(account_id)?;
        let skin = normalize_skin(skin)?;
        self.transact("apply_room_skin", &id, |snapshot, _| {
            let mut room = snapshot
                .room
                .clone()
                .unwrap_or_else(|| RoomOwnership::with_default(id.clone()));
            if !room.owns(&skin) {
                return Err(EconomyError::NotOwned(skin.clone()));
            }
            room.active = skin.clone();
            Ok(Plan::write(
                WriteBatch::new().put(Record::Room(room.clone())),
                room,
            ))
        })
    }

    fn transact<T>(
        &self,
        operation: &'static str,
        account_id: &AccountId,
        mut plan: impl FnMut(&AccountSnapshot, NaiveDate) -> EconomyResult<Plan<T>>,
    ) -> EconomyResult<T> {
        let max_attempts = self.max_attempts();

        for attempt in 1..=max_attempts {
            let snapshot = self.load(account_id)?;
            let today = self.clock.today();
            let Plan { batch, output } = match plan(&snapshot, today) {
                Ok(planned) => planned,
                Err(err) => {
                    info!(
                        "event=ledger_mutation module=service status=rejected op={} account_id={} error_code={}",
                        operation,
                        account_id,
                        err.code()
                    );
                    return Err(err);
                }
            };
            if batch.is_empty() {
                return Ok(output);
            }

            let batch = batch
                .expect_version(account_id.clone(), snapshot.account.version)
                .with_limits(self.config.ledger_limits());
            match self.store.apply(&batch) {
                Ok(()) => {
                    info!(
                        "event=ledger_mutation module=service status=ok op={} account_id={} attempts={}",
                        operation, account_id, attempt
                    );
                    return Ok(output);
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(
                        "event=ledger_mutation module=service status=retry op={} account_id={} attempt={}",
                        operation, account_id, attempt
                    );
                }
                Err(err) => {
                    let err = EconomyError::from(err);
                    warn!(
                        "event=ledger_mutation module=service status=error op={} account_id={} error_code={} error={}",
                        operation,
                        account_id,
                        err.code(),
                        err
                    );
                    return Err(err);
                }
            }
        }

        warn!(
            "event=ledger_mutation module=service status=error op={} account_id={} error_code=CONFLICT attempts={}",
            operation, account_id, max_attempts
        );
        Err(EconomyError::Conflict {
            account_id: account_id.clone(),
            attempts: max_attempts,
        })
    }

    fn load(&self, account_id: &AccountId) -> EconomyResult<AccountSnapshot> {
        self.store
            .snapshot(account_id)?
            .ok_or_else(|| EconomyError::UnknownAccount(account_id.clone()))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_conflict_retries.saturating_add(1)
    }

    fn normalize_name(&self, name: &str) -> EconomyResult<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(EconomyError::InvalidName("name must not be blank".into()));
        }
        let max = self.config.name_max_chars;
        if trimmed.chars().count() > max {
            return Err(EconomyError::InvalidName(format!(
                "name must be at most {max} characters"
            )));
        }
        Ok(trimmed.to_string())
    }

    fn generated_name(&self) -> String {
        format!("{GENERATED_NAME_PREFIX}{}", 1000 + self.entropy.below(9000))
    }
}

fn parse_account_id(value: &str) -> EconomyResult<AccountId> {
    AccountId::parse(value).map_err(|_| EconomyError::InvalidAccountId(value.to_string()))
}

fn require_positive(amount: i64) -> EconomyResult<()> {
    if amount <= 0 {
        return Err(EconomyError::InvalidAmount(format!(
            "amount must be > 0, got {amount}"
        )));
    }
    Ok(())
}

fn require_price(price: f64) -> EconomyResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(EconomyError::InvalidPrice(format!(
            "price must be finite and > 0, got {price}"
        )));
    }
    Ok(())
}

fn normalize_symbol(symbol: &str) -> EconomyResult<String> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(EconomyError::InvalidSymbol(symbol.to_string()));
    }
    Ok(trimmed.to_string())
}

fn normalize_skin(skin: &str) -> EconomyResult<String> {
    let trimmed = skin.trim();
    if trimmed.is_empty() {
        return Err(EconomyError::InvalidSkin(skin.to_string()));
    }
    Ok(trimmed.to_string())
}

fn decode_quantity(text: &str) -> EconomyResult<f64> {
    let quantity = notation::decode(text)?;
    if quantity <= 0.0 {
        return Err(EconomyError::InvalidAmount(format!(
            "quantity must be > 0, got `{}`",
            text.trim()
        )));
    }
    Ok(quantity)
}

/// Rounds `quantity * price` into whole currency units.
fn trade_value(quantity: f64, price: f64, round: fn(f64) -> f64) -> EconomyResult<i64> {
    let value = round(quantity * price);
    // i64::MAX is not representable; 2^63 is the first value that overflows.
    if !value.is_finite() || value >= i64::MAX as f64 {
        return Err(EconomyError::AmountOverflow);
    }
    Ok(value as i64)
}

fn add_checked(balance: i64, amount: i64) -> EconomyResult<i64> {
    balance
        .checked_add(amount)
        .ok_or(EconomyError::AmountOverflow)
}

/// Balance after paying `amount`, or `InsufficientFunds`.
fn take_funds(account: &Account, amount: i64) -> EconomyResult<i64> {
    if account.balance < amount {
        return Err(EconomyError::InsufficientFunds {
            required: amount,
            available: account.balance,
        });
    }
    Ok(account.balance - amount)
}

fn with_balance(account: &Account, balance: i64) -> Record {
    Record::Account(Account {
        balance,
        ..account.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::{decode_quantity, trade_value};
    use crate::service::error::EconomyError;

    #[test]
    fn quantity_accepts_suffix_notation() {
        assert_eq!(decode_quantity("1.5A").unwrap(), 1_500.0);
        assert_eq!(decode_quantity(" 0.25 ").unwrap(), 0.25);
    }

    #[test]
    fn quantity_rejects_non_positive_and_garbage() {
        assert!(matches!(
            decode_quantity("0"),
            Err(EconomyError::InvalidAmount(_))
        ));
        assert!(matches!(
            decode_quantity("-3"),
            Err(EconomyError::InvalidAmount(_))
        ));
        assert!(matches!(
            decode_quantity("lots"),
            Err(EconomyError::InvalidNotation(_))
        ));
    }

    #[test]
    fn trade_value_rounds_in_the_house_favour() {
        assert_eq!(trade_value(0.5, 3.0, f64::ceil).unwrap(), 2);
        assert_eq!(trade_value(0.5, 3.0, f64::floor).unwrap(), 1);
        assert!(matches!(
            trade_value(1e30, 1e10, f64::ceil),
            Err(EconomyError::AmountOverflow)
        ));
    }
}
