//! SQLite-backed ledger store.
//!
//! # Invariants
//! - `apply` runs inside one `BEGIN IMMEDIATE` transaction; any error rolls
//!   the whole batch back.
//! - `snapshot` reads every table inside one read transaction.
//! - The connection must be migrated to `latest_version()` before use.

use super::{stage_batch, LedgerStore, StagingArea, StoreError, StoreResult, WriteBatch};
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{open_db, open_db_in_memory, open_db_with_timeout};
use crate::model::{
    Account, AccountId, AccountSnapshot, AttendanceState, Deposit, DepositId, DepositProduct,
    LedgerLimits, MiningState, Record, RecordKey, RecordKind, RoomOwnership, StockPosition,
};
use chrono::NaiveDate;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DATE_FORMAT: &str = "%Y-%m-%d";

const ACCOUNT_SELECT_SQL: &str = "SELECT
    account_id,
    name,
    balance,
    joined_at_ms,
    version
FROM accounts";

const DEPOSIT_SELECT_SQL: &str = "SELECT
    account_id,
    deposit_id,
    product,
    principal,
    term_days,
    rate_pct,
    tax_pct,
    start_date,
    maturity_date,
    paid
FROM deposits";

const REQUIRED_TABLES: &[&str] = &[
    "accounts",
    "deposits",
    "mining",
    "attendance",
    "attendance_days",
    "stock_positions",
    "rooms",
    "room_skins",
];

/// Ledger store over one SQLite connection.
///
/// The connection is guarded by a mutex so the store can be shared across
/// threads; several stores may also point at the same database file.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
    limits: LedgerLimits,
}

impl SqliteLedgerStore {
    /// Wraps a migrated connection.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_ledger_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            limits: LedgerLimits::default(),
        })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens a database file with an explicit busy timeout.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        Self::try_new(open_db_with_timeout(path, busy_timeout)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    pub fn with_limits(mut self, limits: LedgerLimits) -> Self {
        self.limits = limits;
        self
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger connection lock poisoned".to_string()))
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        let conn = self.lock()?;
        let record = match key {
            RecordKey::Account(id) => load_account(&conn, id)?.map(Record::Account),
            RecordKey::Deposit(id, deposit_id) => {
                load_deposit(&conn, id, deposit_id)?.map(Record::Deposit)
            }
            RecordKey::Mining(id) => load_mining(&conn, id)?.map(Record::Mining),
            RecordKey::Attendance(id) => load_attendance(&conn, id)?.map(Record::Attendance),
            RecordKey::Stock(id, symbol) => load_stock(&conn, id, symbol)?.map(Record::Stock),
            RecordKey::Room(id) => load_room(&conn, id)?.map(Record::Room),
        };
        Ok(record)
    }

    fn scan(&self, kind: RecordKind) -> StoreResult<Vec<Record>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let records = match kind {
            RecordKind::Account => {
                query_accounts(&tx, &format!("{ACCOUNT_SELECT_SQL} ORDER BY account_id ASC;"))?
                    .into_iter()
                    .map(Record::Account)
                    .collect()
            }
            RecordKind::Deposit => {
                let mut stmt = tx.prepare(&format!(
                    "{DEPOSIT_SELECT_SQL} ORDER BY account_id ASC, deposit_id ASC;"
                ))?;
                let mut rows = stmt.query([])?;
                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    records.push(Record::Deposit(parse_deposit_row(row)?));
                }
                records
            }
            RecordKind::Mining => {
                let mut stmt = tx.prepare(
                    "SELECT account_id, last_day, count FROM mining ORDER BY account_id ASC;",
                )?;
                let mut rows = stmt.query([])?;
                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    records.push(Record::Mining(parse_mining_row(row)?));
                }
                records
            }
            RecordKind::Attendance => {
                let ids = query_ids(&tx, "SELECT account_id FROM attendance ORDER BY account_id;")?;
                let mut records = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(state) = load_attendance(&tx, &id)? {
                        records.push(Record::Attendance(state));
                    }
                }
                records
            }
            RecordKind::Stock => {
                let mut stmt = tx.prepare(
                    "SELECT account_id, symbol, quantity, avg_price
                     FROM stock_positions
                     ORDER BY account_id ASC, symbol ASC;",
                )?;
                let mut rows = stmt.query([])?;
                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    records.push(Record::Stock(parse_stock_row(row)?));
                }
                records
            }
            RecordKind::Room => {
                let ids = query_ids(&tx, "SELECT account_id FROM rooms ORDER BY account_id;")?;
                let mut records = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(room) = load_room(&tx, &id)? {
                        records.push(Record::Room(room));
                    }
                }
                records
            }
        };
        tx.commit()?;
        Ok(records)
    }

    fn snapshot(&self, account_id: &AccountId) -> StoreResult<Option<AccountSnapshot>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let Some(account) = load_account(&tx, account_id)? else {
            return Ok(None);
        };
        let snapshot = AccountSnapshot {
            account,
            deposits: load_deposits(&tx, account_id)?,
            mining: load_mining(&tx, account_id)?,
            attendance: load_attendance(&tx, account_id)?,
            stocks: load_stocks(&tx, account_id)?,
            room: load_room(&tx, account_id)?,
        };
        tx.commit()?;
        Ok(Some(snapshot))
    }

    fn top_accounts(&self, limit: u32) -> StoreResult<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{ACCOUNT_SELECT_SQL} ORDER BY balance DESC, account_id ASC LIMIT ?1;"
        ))?;
        let mut rows = stmt.query([i64::from(limit)])?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next()? {
            accounts.push(parse_account_row(row)?);
        }
        Ok(accounts)
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut staging = SqliteStaging { conn: &tx };
        if let Err(err) = stage_batch(&mut staging, batch, &self.limits) {
            if matches!(err, StoreError::Conflict { .. }) {
                debug!("event=store_apply module=store status=conflict error={err}");
            } else {
                warn!("event=store_apply module=store status=rejected error={err}");
            }
            return Err(err);
        }
        tx.commit()?;
        Ok(())
    }
}

struct SqliteStaging<'a> {
    conn: &'a Connection,
}

impl StagingArea for SqliteStaging<'_> {
    fn account_version(&mut self, account_id: &AccountId) -> StoreResult<Option<i64>> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM accounts WHERE account_id = ?1;",
                [account_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(version)
    }

    fn load_deposit(
        &mut self,
        account_id: &AccountId,
        deposit_id: &DepositId,
    ) -> StoreResult<Option<Deposit>> {
        load_deposit(self.conn, account_id, deposit_id)
    }

    fn unpaid_deposits(&mut self, account_id: &AccountId) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM deposits WHERE account_id = ?1 AND paid = 0;",
            [account_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    fn write(&mut self, record: &Record) -> StoreResult<()> {
        match record {
            Record::Account(account) => write_account(self.conn, account),
            Record::Deposit(deposit) => write_deposit(self.conn, deposit),
            Record::Mining(state) => write_mining(self.conn, state),
            Record::Attendance(state) => write_attendance(self.conn, state),
            Record::Stock(position) => write_stock(self.conn, position),
            Record::Room(room) => write_room(self.conn, room),
        }
    }

    fn remove(&mut self, key: &RecordKey) -> StoreResult<()> {
        match key {
            RecordKey::Account(_) => {
                return Err(StoreError::Unsupported("accounts are never deleted"));
            }
            RecordKey::Deposit(id, deposit_id) => {
                self.conn.execute(
                    "DELETE FROM deposits WHERE account_id = ?1 AND deposit_id = ?2;",
                    params![id.as_str(), deposit_id.as_str()],
                )?;
            }
            RecordKey::Mining(id) => {
                self.conn
                    .execute("DELETE FROM mining WHERE account_id = ?1;", [id.as_str()])?;
            }
            RecordKey::Attendance(id) => {
                self.conn.execute(
                    "DELETE FROM attendance WHERE account_id = ?1;",
                    [id.as_str()],
                )?;
            }
            RecordKey::Stock(id, symbol) => {
                self.conn.execute(
                    "DELETE FROM stock_positions WHERE account_id = ?1 AND symbol = ?2;",
                    params![id.as_str(), symbol],
                )?;
            }
            RecordKey::Room(id) => {
                self.conn
                    .execute("DELETE FROM rooms WHERE account_id = ?1;", [id.as_str()])?;
            }
        }
        Ok(())
    }

    fn bump_version(&mut self, account_id: &AccountId) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE accounts SET version = version + 1 WHERE account_id = ?1;",
            [account_id.as_str()],
        )?;
        Ok(())
    }
}

fn write_account(conn: &Connection, account: &Account) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO accounts (account_id, name, balance, joined_at_ms, version)
         VALUES (?1, ?2, ?3, ?4, 0)
         ON CONFLICT (account_id) DO UPDATE SET
            name = excluded.name,
            balance = excluded.balance,
            joined_at_ms = excluded.joined_at_ms;",
        params![
            account.id.as_str(),
            account.name.as_str(),
            account.balance,
            account.joined_at_ms,
        ],
    )?;
    Ok(())
}

fn write_deposit(conn: &Connection, deposit: &Deposit) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO deposits (
            account_id,
            deposit_id,
            product,
            principal,
            term_days,
            rate_pct,
            tax_pct,
            start_date,
            maturity_date,
            paid
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT (account_id, deposit_id) DO UPDATE SET paid = excluded.paid;",
        params![
            deposit.account_id.as_str(),
            deposit.id.as_str(),
            deposit.product.as_str(),
            deposit.principal,
            deposit.term_days,
            deposit.rate_pct,
            deposit.tax_pct,
            format_date(deposit.start_date),
            format_date(deposit.maturity_date),
            bool_to_int(deposit.paid),
        ],
    )?;
    Ok(())
}

fn write_mining(conn: &Connection, state: &MiningState) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO mining (account_id, last_day, count) VALUES (?1, ?2, ?3)
         ON CONFLICT (account_id) DO UPDATE SET
            last_day = excluded.last_day,
            count = excluded.count;",
        params![
            state.account_id.as_str(),
            format_date(state.last_day),
            state.count,
        ],
    )?;
    Ok(())
}

fn write_attendance(conn: &Connection, state: &AttendanceState) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO attendance (account_id, last_date, streak) VALUES (?1, ?2, ?3)
         ON CONFLICT (account_id) DO UPDATE SET
            last_date = excluded.last_date,
            streak = excluded.streak;",
        params![
            state.account_id.as_str(),
            state.last_date.map(format_date),
            state.streak,
        ],
    )?;
    conn.execute(
        "DELETE FROM attendance_days WHERE account_id = ?1;",
        [state.account_id.as_str()],
    )?;
    for day in &state.days {
        conn.execute(
            "INSERT INTO attendance_days (account_id, day) VALUES (?1, ?2);",
            params![state.account_id.as_str(), format_date(*day)],
        )?;
    }
    Ok(())
}

fn write_stock(conn: &Connection, position: &StockPosition) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO stock_positions (account_id, symbol, quantity, avg_price)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (account_id, symbol) DO UPDATE SET
            quantity = excluded.quantity,
            avg_price = excluded.avg_price;",
        params![
            position.account_id.as_str(),
            position.symbol.as_str(),
            position.quantity,
            position.avg_price,
        ],
    )?;
    Ok(())
}

fn write_room(conn: &Connection, room: &RoomOwnership) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO rooms (account_id, active_skin) VALUES (?1, ?2)
         ON CONFLICT (account_id) DO UPDATE SET active_skin = excluded.active_skin;",
        params![room.account_id.as_str(), room.active.as_str()],
    )?;
    conn.execute(
        "DELETE FROM room_skins WHERE account_id = ?1;",
        [room.account_id.as_str()],
    )?;
    for skin in &room.owned {
        conn.execute(
            "INSERT INTO room_skins (account_id, skin) VALUES (?1, ?2);",
            params![room.account_id.as_str(), skin.as_str()],
        )?;
    }
    Ok(())
}

fn load_account(conn: &Connection, account_id: &AccountId) -> StoreResult<Option<Account>> {
    let mut stmt = conn.prepare(&format!("{ACCOUNT_SELECT_SQL} WHERE account_id = ?1;"))?;
    let mut rows = stmt.query([account_id.as_str()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_account_row(row)?));
    }
    Ok(None)
}

fn query_accounts(conn: &Connection, sql: &str) -> StoreResult<Vec<Account>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut accounts = Vec::new();
    while let Some(row) = rows.next()? {
        accounts.push(parse_account_row(row)?);
    }
    Ok(accounts)
}

fn query_ids(conn: &Connection, sql: &str) -> StoreResult<Vec<AccountId>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_account_id(&value)?);
    }
    Ok(ids)
}

fn load_deposit(
    conn: &Connection,
    account_id: &AccountId,
    deposit_id: &DepositId,
) -> StoreResult<Option<Deposit>> {
    let mut stmt = conn.prepare(&format!(
        "{DEPOSIT_SELECT_SQL} WHERE account_id = ?1 AND deposit_id = ?2;"
    ))?;
    let mut rows = stmt.query(params![account_id.as_str(), deposit_id.as_str()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_deposit_row(row)?));
    }
    Ok(None)
}

fn load_deposits(conn: &Connection, account_id: &AccountId) -> StoreResult<Vec<Deposit>> {
    let mut stmt = conn.prepare(&format!(
        "{DEPOSIT_SELECT_SQL} WHERE account_id = ?1 ORDER BY deposit_id ASC;"
    ))?;
    let mut rows = stmt.query([account_id.as_str()])?;
    let mut deposits = Vec::new();
    while let Some(row) = rows.next()? {
        deposits.push(parse_deposit_row(row)?);
    }
    Ok(deposits)
}

fn load_mining(conn: &Connection, account_id: &AccountId) -> StoreResult<Option<MiningState>> {
    let mut stmt =
        conn.prepare("SELECT account_id, last_day, count FROM mining WHERE account_id = ?1;")?;
    let mut rows = stmt.query([account_id.as_str()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_mining_row(row)?));
    }
    Ok(None)
}

fn load_attendance(
    conn: &Connection,
    account_id: &AccountId,
) -> StoreResult<Option<AttendanceState>> {
    let head = conn
        .query_row(
            "SELECT last_date, streak FROM attendance WHERE account_id = ?1;",
            [account_id.as_str()],
            |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, u32>(1)?)),
        )
        .optional()?;
    let Some((last_date, streak)) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT day FROM attendance_days WHERE account_id = ?1 ORDER BY day ASC;",
    )?;
    let mut rows = stmt.query([account_id.as_str()])?;
    let mut days = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        days.insert(parse_date(&value, "attendance_days.day")?);
    }

    Ok(Some(AttendanceState {
        account_id: account_id.clone(),
        last_date: last_date
            .map(|value| parse_date(&value, "attendance.last_date"))
            .transpose()?,
        days,
        streak,
    }))
}

fn load_stock(
    conn: &Connection,
    account_id: &AccountId,
    symbol: &str,
) -> StoreResult<Option<StockPosition>> {
    let mut stmt = conn.prepare(
        "SELECT account_id, symbol, quantity, avg_price
         FROM stock_positions
         WHERE account_id = ?1 AND symbol = ?2;",
    )?;
    let mut rows = stmt.query(params![account_id.as_str(), symbol])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_stock_row(row)?));
    }
    Ok(None)
}

fn load_stocks(conn: &Connection, account_id: &AccountId) -> StoreResult<Vec<StockPosition>> {
    let mut stmt = conn.prepare(
        "SELECT account_id, symbol, quantity, avg_price
         FROM stock_positions
         WHERE account_id = ?1
         ORDER BY symbol ASC;",
    )?;
    let mut rows = stmt.query([account_id.as_str()])?;
    let mut positions = Vec::new();
    while let Some(row) = rows.next()? {
        positions.push(parse_stock_row(row)?);
    }
    Ok(positions)
}

fn load_room(conn: &Connection, account_id: &AccountId) -> StoreResult<Option<RoomOwnership>> {
    let active = conn
        .query_row(
            "SELECT active_skin FROM rooms WHERE account_id = ?1;",
            [account_id.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    let Some(active) = active else {
        return Ok(None);
    };

    let mut stmt =
        conn.prepare("SELECT skin FROM room_skins WHERE account_id = ?1 ORDER BY skin ASC;")?;
    let mut rows = stmt.query([account_id.as_str()])?;
    let mut owned = BTreeSet::new();
    while let Some(row) = rows.next()? {
        owned.insert(row.get::<_, String>(0)?);
    }

    Ok(Some(RoomOwnership {
        account_id: account_id.clone(),
        owned,
        active,
    }))
}

fn parse_account_row(row: &Row<'_>) -> StoreResult<Account> {
    let id_text: String = row.get("account_id")?;
    let account = Account {
        id: parse_account_id(&id_text)?,
        name: row.get("name")?,
        balance: row.get("balance")?,
        joined_at_ms: row.get("joined_at_ms")?,
        version: row.get("version")?,
    };
    account
        .validate()
        .map_err(|err| StoreError::InvalidData(err.to_string()))?;
    Ok(account)
}

fn parse_deposit_row(row: &Row<'_>) -> StoreResult<Deposit> {
    let id_text: String = row.get("account_id")?;
    let product_text: String = row.get("product")?;
    let product = DepositProduct::parse(&product_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid product `{product_text}` in deposits.product"
        ))
    })?;
    let paid = match row.get::<_, i64>("paid")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid paid value `{other}` in deposits.paid"
            )));
        }
    };
    let start_text: String = row.get("start_date")?;
    let maturity_text: String = row.get("maturity_date")?;

    Ok(Deposit {
        id: DepositId::from_existing(row.get::<_, String>("deposit_id")?),
        account_id: parse_account_id(&id_text)?,
        product,
        principal: row.get("principal")?,
        term_days: row.get("term_days")?,
        rate_pct: row.get("rate_pct")?,
        tax_pct: row.get("tax_pct")?,
        start_date: parse_date(&start_text, "deposits.start_date")?,
        maturity_date: parse_date(&maturity_text, "deposits.maturity_date")?,
        paid,
    })
}

fn parse_mining_row(row: &Row<'_>) -> StoreResult<MiningState> {
    let id_text: String = row.get("account_id")?;
    let day_text: String = row.get("last_day")?;
    Ok(MiningState {
        account_id: parse_account_id(&id_text)?,
        last_day: parse_date(&day_text, "mining.last_day")?,
        count: row.get("count")?,
    })
}

fn parse_stock_row(row: &Row<'_>) -> StoreResult<StockPosition> {
    let id_text: String = row.get("account_id")?;
    Ok(StockPosition {
        account_id: parse_account_id(&id_text)?,
        symbol: row.get("symbol")?,
        quantity: row.get("quantity")?,
        avg_price: row.get("avg_price")?,
    })
}

fn parse_account_id(value: &str) -> StoreResult<AccountId> {
    AccountId::parse(value).map_err(|_| {
        StoreError::InvalidData(format!("invalid account id `{value}` in account_id"))
    })
}

fn parse_date(value: &str, column: &'static str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| StoreError::InvalidData(format!("invalid date `{value}` in {column}")))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_ledger_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected = latest_version();
    let actual = current_user_version(conn)?;
    if actual != expected {
        return Err(StoreError::InvalidData(format!(
            "ledger store requires schema version {expected}, got {actual}"
        )));
    }

    for table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(StoreError::InvalidData(format!(
                "ledger store requires table `{table}`"
            )));
        }
    }
    Ok(())
}
