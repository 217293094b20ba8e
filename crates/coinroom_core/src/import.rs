//! One-shot importer for the legacy flat-file JSON data set.
//!
//! # Responsibility
//! - Read `user_data.json`, `user_map.json`, `attendance.json`,
//!   `mine_attempts.json`, `saving.json` and `stocks.json` from one directory.
//! - Upsert every record by its natural key through `LedgerStore::put`.
//!
//! # Invariants
//! - Re-running on the same input yields the same ledger state.
//! - A deposit already persisted as paid is never rewritten.
//! - A record that fails validation is counted and logged, never fatal.
//! - Missing files are skipped with a warning.

use crate::entropy::{Entropy, ThreadEntropy};
use crate::model::{
    Account, AccountId, AttendanceState, Deposit, DepositId, DepositProduct, MiningState, Record,
    RecordKey, RoomOwnership, StockPosition,
};
use crate::store::{LedgerStore, StoreError};
use chrono::{NaiveDate, Utc};
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const USER_DATA_FILE: &str = "user_data.json";
const USER_MAP_FILE: &str = "user_map.json";
const ATTENDANCE_FILE: &str = "attendance.json";
const MINING_FILE: &str = "mine_attempts.json";
const SAVING_FILE: &str = "saving.json";
const STOCKS_FILE: &str = "stocks.json";

/// Fatal import failures. Per-record problems are reported in `ImportReport`.
#[derive(Debug)]
pub enum ImportError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    Store(StoreError),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read `{}`: {source}", path.display()),
            Self::Json { path, source } => {
                write!(f, "`{}` is not a JSON object: {source}", path.display())
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Store(err) => Some(err),
        }
    }
}

/// Per-kind counts of an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub accounts: usize,
    pub rooms: usize,
    pub attendance: usize,
    pub mining: usize,
    pub deposits: usize,
    pub stocks: usize,
    /// Entries intentionally left alone (paid deposits, empty records).
    pub skipped: usize,
    /// Entries that could not be decoded or failed store validation.
    pub rejected: usize,
    pub missing_files: Vec<String>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.accounts + self.rooms + self.attendance + self.mining + self.deposits + self.stocks
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LegacyUser {
    name: Option<String>,
    balance: Value,
    join_date: Value,
    owned_rooms: Option<Vec<String>>,
    current_room: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LegacyAttendance {
    last_date: Option<String>,
    days: Vec<String>,
    streak: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LegacyMining {
    last_day: Option<String>,
    count: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LegacySaving {
    id: Value,
    product: String,
    amount: Value,
    days: Value,
    rate: Value,
    tax: Value,
    start_date: String,
    end_date: String,
    paid: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyStock {
    amount: Value,
    avg_price: Value,
}

/// Imports every legacy file found in `dir` into `store`.
pub fn import_legacy_dir<S: LedgerStore + ?Sized>(
    store: &S,
    dir: impl AsRef<Path>,
) -> Result<ImportReport, ImportError> {
    let dir = dir.as_ref();
    let mut report = ImportReport::default();
    let entropy = ThreadEntropy;
    info!(
        "event=legacy_import module=import status=start dir={}",
        dir.display()
    );

    let user_map = read_object(dir, USER_MAP_FILE, &mut report)?;
    let users = read_object(dir, USER_DATA_FILE, &mut report)?;
    for (raw_id, value) in users {
        let hint = user_map
            .get(&raw_id)
            .and_then(Value::as_str)
            .map(str::to_string);
        import_user(store, &raw_id, value, hint, &entropy, &mut report)?;
    }

    for (raw_id, value) in read_object(dir, ATTENDANCE_FILE, &mut report)? {
        import_attendance(store, &raw_id, value, &mut report)?;
    }
    for (raw_id, value) in read_object(dir, MINING_FILE, &mut report)? {
        import_mining(store, &raw_id, value, &mut report)?;
    }
    for (raw_id, value) in read_object(dir, SAVING_FILE, &mut report)? {
        import_savings(store, &raw_id, value, &mut report)?;
    }
    for (raw_id, value) in read_object(dir, STOCKS_FILE, &mut report)? {
        import_stocks(store, &raw_id, value, &mut report)?;
    }

    info!(
        "event=legacy_import module=import status=ok imported={} skipped={} rejected={} missing_files={}",
        report.imported(),
        report.skipped,
        report.rejected,
        report.missing_files.len()
    );
    Ok(report)
}

fn import_user<S: LedgerStore + ?Sized>(
    store: &S,
    raw_id: &str,
    value: Value,
    name_hint: Option<String>,
    entropy: &dyn Entropy,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    let Some((id, user)) = decode_entry::<LegacyUser>(USER_DATA_FILE, raw_id, value, report)
    else {
        return Ok(());
    };

    let existing = match store.get(&RecordKey::Account(id.clone()))? {
        Some(Record::Account(account)) => Some(account),
        _ => None,
    };
    let name = [user.name.clone(), name_hint]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .or_else(|| existing.as_ref().map(|account| account.name.clone()))
        .unwrap_or_else(|| format!("user{}", 1000 + entropy.below(9000)));
    let joined_at_ms = as_i64(&user.join_date)
        .or_else(|| existing.as_ref().map(|account| account.joined_at_ms))
        .unwrap_or_else(|| Utc::now().timestamp_millis());
    let account = Account {
        id: id.clone(),
        name,
        balance: as_i64(&user.balance).unwrap_or(0),
        joined_at_ms,
        version: 0,
    };
    if put(store, Record::Account(account), USER_DATA_FILE, raw_id, report)? {
        report.accounts += 1;
    }

    if user.owned_rooms.is_none() && user.current_room.is_none() {
        return Ok(());
    }
    let mut room = RoomOwnership::with_default(id);
    room.owned.extend(
        user.owned_rooms
            .unwrap_or_default()
            .into_iter()
            .map(|skin| skin.trim().to_string())
            .filter(|skin| !skin.is_empty()),
    );
    if let Some(current) = user.current_room.map(|skin| skin.trim().to_string()) {
        if !current.is_empty() {
            room.owned.insert(current.clone());
            room.active = current;
        }
    }
    if put(store, Record::Room(room), USER_DATA_FILE, raw_id, report)? {
        report.rooms += 1;
    }
    Ok(())
}

fn import_attendance<S: LedgerStore + ?Sized>(
    store: &S,
    raw_id: &str,
    value: Value,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    let Some((id, legacy)) =
        decode_entry::<LegacyAttendance>(ATTENDANCE_FILE, raw_id, value, report)
    else {
        return Ok(());
    };

    let days: BTreeSet<NaiveDate> = legacy.days.iter().filter_map(|day| parse_date(day)).collect();
    let state = AttendanceState {
        account_id: id,
        last_date: legacy.last_date.as_deref().and_then(parse_date),
        days,
        streak: as_i64(&legacy.streak)
            .and_then(|streak| u32::try_from(streak).ok())
            .unwrap_or(0),
    };
    if put(store, Record::Attendance(state), ATTENDANCE_FILE, raw_id, report)? {
        report.attendance += 1;
    }
    Ok(())
}

fn import_mining<S: LedgerStore + ?Sized>(
    store: &S,
    raw_id: &str,
    value: Value,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    let Some((id, legacy)) = decode_entry::<LegacyMining>(MINING_FILE, raw_id, value, report)
    else {
        return Ok(());
    };

    let Some(last_day) = legacy.last_day.as_deref().and_then(parse_date) else {
        report.skipped += 1;
        return Ok(());
    };
    let Some(count) = as_i64(&legacy.count).and_then(|count| u32::try_from(count).ok()) else {
        reject(MINING_FILE, raw_id, "count is not a non-negative integer", report);
        return Ok(());
    };
    let state = MiningState {
        account_id: id,
        last_day,
        count,
    };
    if put(store, Record::Mining(state), MINING_FILE, raw_id, report)? {
        report.mining += 1;
    }
    Ok(())
}

fn import_savings<S: LedgerStore + ?Sized>(
    store: &S,
    raw_id: &str,
    value: Value,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    let Some((id, items)) = decode_entry::<Vec<Value>>(SAVING_FILE, raw_id, value, report) else {
        return Ok(());
    };

    for item in items {
        let legacy: LegacySaving = match serde_json::from_value(item) {
            Ok(legacy) => legacy,
            Err(err) => {
                reject(SAVING_FILE, raw_id, &err.to_string(), report);
                continue;
            }
        };
        let deposit = match legacy_deposit(&id, &legacy) {
            Ok(deposit) => deposit,
            Err(reason) => {
                reject(SAVING_FILE, raw_id, reason, report);
                continue;
            }
        };

        let key = RecordKey::Deposit(id.clone(), deposit.id.clone());
        if let Some(Record::Deposit(existing)) = store.get(&key)? {
            if existing.paid {
                report.skipped += 1;
                continue;
            }
        }
        if put(store, Record::Deposit(deposit), SAVING_FILE, raw_id, report)? {
            report.deposits += 1;
        }
    }
    Ok(())
}

fn import_stocks<S: LedgerStore + ?Sized>(
    store: &S,
    raw_id: &str,
    value: Value,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    let Some((id, holdings)) =
        decode_entry::<BTreeMap<String, Value>>(STOCKS_FILE, raw_id, value, report)
    else {
        return Ok(());
    };

    for (symbol, value) in holdings {
        let legacy: LegacyStock = match serde_json::from_value(value) {
            Ok(legacy) => legacy,
            Err(err) => {
                reject(STOCKS_FILE, raw_id, &err.to_string(), report);
                continue;
            }
        };
        let quantity = as_f64(&legacy.amount).unwrap_or(0.0);
        if quantity == 0.0 {
            report.skipped += 1;
            continue;
        }
        let position = StockPosition {
            account_id: id.clone(),
            symbol: symbol.trim().to_string(),
            quantity,
            avg_price: as_f64(&legacy.avg_price).unwrap_or(0.0),
        };
        if put(store, Record::Stock(position), STOCKS_FILE, raw_id, report)? {
            report.stocks += 1;
        }
    }
    Ok(())
}

fn legacy_deposit(account_id: &AccountId, legacy: &LegacySaving) -> Result<Deposit, &'static str> {
    let id = match &legacy.id {
        Value::String(text) if !text.trim().is_empty() => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return Err("deposit id is missing"),
    };
    let product = DepositProduct::parse(&legacy.product).ok_or("unknown deposit product")?;
    let principal = as_i64(&legacy.amount).ok_or("deposit amount is not a number")?;
    let start_date = parse_date(&legacy.start_date).ok_or("deposit start date is invalid")?;
    let maturity_date = parse_date(&legacy.end_date).ok_or("deposit end date is invalid")?;
    let small = |value: &Value| {
        as_i64(value)
            .and_then(|number| u32::try_from(number).ok())
            .unwrap_or(0)
    };

    Ok(Deposit {
        id: DepositId::from_existing(id),
        account_id: account_id.clone(),
        product,
        principal,
        term_days: small(&legacy.days),
        rate_pct: small(&legacy.rate),
        tax_pct: match product {
            DepositProduct::Basic => 0,
            DepositProduct::Premium => small(&legacy.tax),
        },
        start_date,
        maturity_date,
        paid: legacy.paid,
    })
}

/// Writes one record; `Ok(false)` when the store rejected it as invalid.
fn put<S: LedgerStore + ?Sized>(
    store: &S,
    record: Record,
    file: &str,
    raw_id: &str,
    report: &mut ImportReport,
) -> Result<bool, ImportError> {
    match store.put(record) {
        Ok(()) => Ok(true),
        Err(err @ (StoreError::Validation(_) | StoreError::Orphan { .. })) => {
            reject(file, raw_id, &err.to_string(), report);
            Ok(false)
        }
        Err(err) => Err(ImportError::Store(err)),
    }
}

fn decode_entry<T: serde::de::DeserializeOwned>(
    file: &str,
    raw_id: &str,
    value: Value,
    report: &mut ImportReport,
) -> Option<(AccountId, T)> {
    if value.is_null() {
        report.skipped += 1;
        return None;
    }
    let Ok(id) = AccountId::parse(raw_id) else {
        reject(file, raw_id, "invalid account id", report);
        return None;
    };
    match serde_json::from_value(value) {
        Ok(entry) => Some((id, entry)),
        Err(err) => {
            reject(file, raw_id, &err.to_string(), report);
            None
        }
    }
}

fn read_object(
    dir: &Path,
    file: &str,
    report: &mut ImportReport,
) -> Result<BTreeMap<String, Value>, ImportError> {
    let path = dir.join(file);
    if !path.exists() {
        warn!("event=legacy_import module=import status=missing file={file}");
        report.missing_files.push(file.to_string());
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(&path).map_err(|source| ImportError::Io {
        path: path.clone(),
        source,
    })?;
    let object: BTreeMap<String, Value> =
        serde_json::from_str(&content).map_err(|source| ImportError::Json {
            path: path.clone(),
            source,
        })?;
    info!(
        "event=legacy_import module=import status=read file={} entries={}",
        file,
        object.len()
    );
    Ok(object)
}

fn reject(file: &str, raw_id: &str, reason: &str, report: &mut ImportReport) {
    warn!(
        "event=legacy_import module=import status=rejected file={} account_id={} reason={}",
        file, raw_id, reason
    );
    report.rejected += 1;
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && float.abs() < i64::MAX as f64)
                .map(|float| float.trunc() as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|float| float.is_finite())
}

impl From<StoreError> for ImportError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{as_f64, as_i64, parse_date};
    use serde_json::json;

    #[test]
    fn numeric_fields_accept_numbers_and_strings() {
        assert_eq!(as_i64(&json!(42)), Some(42));
        assert_eq!(as_i64(&json!("17")), Some(17));
        assert_eq!(as_i64(&json!(12.9)), Some(12));
        assert_eq!(as_i64(&json!(null)), None);
        assert_eq!(as_f64(&json!("0.5")), Some(0.5));
    }

    #[test]
    fn dates_are_day_precision() {
        assert!(parse_date("2024-12-31").is_some());
        assert!(parse_date("").is_none());
        assert!(parse_date("12/31/2024").is_none());
    }
}
