//! Route table for the legacy HTTP surface, without a transport.
//!
//! # Responsibility
//! - Map `(method, path, body)` onto `AccountMutator` use-cases.
//! - Parse request bodies into typed requests; render JSON payloads with a
//!   `formatted` balance string where the client displays one.
//! - Render every failure as `{error:{code, message, retryable}}`.
//!
//! # Invariants
//! - `dispatch` never panics and always returns a JSON object.
//! - The status code depends only on the error class.
//! - Display names are never logged.

use coinroom_core::service::{
    ActiveDeposit, AttendanceInfo, CheckInOutcome, DepositInfo, SettledDeposit,
};
use coinroom_core::{
    format_balance, Account, AccountMutator, Deposit, EconomyError, ErrorClass, LedgerStore,
};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure of one dispatched call.
#[derive(Debug)]
pub enum ApiError {
    /// No route for this method and path.
    NotFound { method: String, path: String },
    /// Body is not an object, or a field is missing or mistyped.
    BadRequest(String),
    Economy(EconomyError),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::BadRequest(_) => 400,
            Self::Economy(err) => match err.class() {
                ErrorClass::Validation => 400,
                ErrorClass::Precondition => 422,
                ErrorClass::Store => match err {
                    EconomyError::Conflict { .. } => 409,
                    EconomyError::Unavailable(_) => 503,
                    _ => 500,
                },
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::BadRequest(_) => "INVALID_REQUEST",
            Self::Economy(err) => err.code(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Economy(err) if err.is_retryable())
    }

    fn to_body(&self) -> Value {
        json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
            }
        })
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { method, path } => write!(f, "no route for {method} {path}"),
            Self::BadRequest(details) => write!(f, "invalid request: {details}"),
            Self::Economy(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Economy(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EconomyError> for ApiError {
    fn from(value: EconomyError) -> Self {
        Self::Economy(value)
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// JSON scalar accepted where clients send either numbers or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn text(&self) -> String {
        match self {
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    fn integer(&self, invalid: fn(String) -> EconomyError) -> ApiResult<i64> {
        match self {
            Self::Int(value) => Ok(*value),
            Self::Float(value)
                if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 =>
            {
                Ok(*value as i64)
            }
            Self::Text(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|_| invalid(format!("expected an integer, got `{}`", text.trim())).into()),
            Self::Float(value) => Err(invalid(format!("expected an integer, got {value}")).into()),
        }
    }

    fn number(&self, invalid: fn(String) -> EconomyError) -> ApiResult<f64> {
        match self {
            Self::Int(value) => Ok(*value as f64),
            Self::Float(value) => Ok(*value),
            Self::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(format!("expected a number, got `{}`", text.trim())).into()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    discord_id: Scalar,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountRequest {
    id: Scalar,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    id: Scalar,
    name: String,
}

#[derive(Debug, Deserialize)]
struct JackpotRequest {
    id: Scalar,
    bet: Scalar,
}

#[derive(Debug, Default, Deserialize)]
struct RankRequest {
    #[serde(default)]
    limit: Option<Scalar>,
}

#[derive(Debug, Deserialize)]
struct JoinSavingRequest {
    id: Scalar,
    product: String,
    amount: Scalar,
}

#[derive(Debug, Deserialize)]
struct TradeRequest {
    id: Scalar,
    symbol: String,
    amount: Scalar,
    price: Scalar,
}

#[derive(Debug, Deserialize)]
struct BuySkinRequest {
    id: Scalar,
    skin: String,
    price: Scalar,
}

#[derive(Debug, Deserialize)]
struct ApplySkinRequest {
    id: Scalar,
    skin: String,
}

/// Endpoint layer owning one mutator.
pub struct EconomyApi<S: LedgerStore> {
    mutator: AccountMutator<S>,
}

impl<S: LedgerStore> EconomyApi<S> {
    pub fn new(mutator: AccountMutator<S>) -> Self {
        Self { mutator }
    }

    pub fn mutator(&self) -> &AccountMutator<S> {
        &self.mutator
    }

    /// Handles one call and returns `(status, payload)`.
    ///
    /// `path` may carry a query string; its pairs fill fields the body does
    /// not set. A `null` body is treated as `{}`.
    pub fn dispatch(&self, method: &str, path: &str, body: &Value) -> (u16, Value) {
        let method = method.trim().to_ascii_uppercase();
        let (route, query) = split_query(path.trim());
        let request = merge_query(body, query);

        match self.route(&method, route, &request) {
            Ok(payload) => {
                info!(
                    "event=api_call module=api status=ok method={} path={}",
                    method, route
                );
                (200, payload)
            }
            Err(err) => {
                let status = err.status();
                if status >= 500 {
                    warn!(
                        "event=api_call module=api status=error method={} path={} http_status={} error_code={} error={}",
                        method, route, status, err.code(), err
                    );
                } else {
                    info!(
                        "event=api_call module=api status=rejected method={} path={} http_status={} error_code={}",
                        method, route, status, err.code()
                    );
                }
                (status, err.to_body())
            }
        }
    }

    fn route(&self, method: &str, path: &str, body: &Value) -> ApiResult<Value> {
        match (method, path) {
            ("POST", "/api/login") => self.login(parse(body)?),
            ("GET", "/api/balance") => self.balance(parse(body)?),
            ("POST", "/api/setname") => self.rename(parse(body)?),
            ("POST", "/api/jackpot") => self.jackpot(parse(body)?),
            ("GET", "/api/rank") => self.rank(parse(body)?),
            ("GET", "/api/attendance/info") => self.attendance_info(parse(body)?),
            ("POST", "/api/attendance") => self.check_in(parse(body)?),
            ("GET", "/api/saving/info") => self.saving_info(parse(body)?),
            ("POST", "/api/saving/join") => self.join_saving(parse(body)?),
            ("GET", "/api/mine/info") => self.mining_info(parse(body)?),
            ("POST", "/api/mine") => self.mine(parse(body)?),
            ("POST", "/api/stock/buy") => self.trade(parse(body)?, true),
            ("POST", "/api/stock/sell") => self.trade(parse(body)?, false),
            ("GET", "/api/stocks") => self.all_stocks(),
            ("POST", "/api/buyRoomSkin") => self.buy_room_skin(parse(body)?),
            ("GET", "/api/rooms") => self.rooms(parse(body)?),
            ("POST", "/api/applyRoomSkin") => self.apply_room_skin(parse(body)?),
            _ => Err(ApiError::NotFound {
                method: method.to_string(),
                path: path.to_string(),
            }),
        }
    }

    fn login(&self, request: LoginRequest) -> ApiResult<Value> {
        let outcome = self
            .mutator
            .identify(&request.discord_id.text(), request.name.as_deref())?;
        Ok(json!({
            "status": if outcome.created { "new" } else { "ok" },
            "name": outcome.account.name,
            "balance": outcome.account.balance,
        }))
    }

    fn balance(&self, request: AccountRequest) -> ApiResult<Value> {
        let account = self.mutator.balance(&request.id.text())?;
        Ok(json!({
            "balance": account.balance,
            "formatted": format_balance(account.balance),
            "name": account.name,
        }))
    }

    fn rename(&self, request: RenameRequest) -> ApiResult<Value> {
        self.mutator.rename(&request.id.text(), &request.name)?;
        Ok(json!({ "ok": true }))
    }

    fn jackpot(&self, request: JackpotRequest) -> ApiResult<Value> {
        let bet = request.bet.integer(EconomyError::InvalidAmount)?;
        let outcome = self.mutator.jackpot(&request.id.text(), bet)?;
        Ok(json!({
            "result": outcome.symbols,
            "reward": outcome.reward,
            "balance": outcome.balance,
            "formatted": format_balance(outcome.balance),
        }))
    }

    fn rank(&self, request: RankRequest) -> ApiResult<Value> {
        let limit = match request.limit {
            Some(limit) => {
                let value = limit.integer(EconomyError::InvalidAmount)?;
                let value = u32::try_from(value).ok().filter(|value| *value > 0).ok_or_else(|| {
                    EconomyError::InvalidAmount(format!("limit must be > 0, got {value}"))
                })?;
                Some(value)
            }
            None => None,
        };
        let ranking: Vec<Value> = self
            .mutator
            .ranking(limit)?
            .iter()
            .map(ranking_entry)
            .collect();
        Ok(json!({ "ranking": ranking }))
    }

    fn attendance_info(&self, request: AccountRequest) -> ApiResult<Value> {
        let AttendanceInfo {
            streak,
            week_index,
            attended_days,
            already_today,
        } = self.mutator.attendance_info(&request.id.text())?;
        Ok(json!({
            "streak": streak,
            "weekIndex": week_index,
            "attendedDays": attended_days,
            "alreadyToday": already_today,
        }))
    }

    fn check_in(&self, request: AccountRequest) -> ApiResult<Value> {
        let CheckInOutcome {
            reward,
            base_reward,
            weekly_bonus,
            month_end_bonus,
            streak,
            week_index,
            attended_days,
            balance,
        } = self.mutator.check_in(&request.id.text())?;
        Ok(json!({
            "ok": true,
            "reward": reward,
            "baseReward": base_reward,
            "weeklyBonus": weekly_bonus,
            "monthlyBonus": month_end_bonus,
            "streak": streak,
            "weekIndex": week_index,
            "attendedDays": attended_days,
            "balance": balance,
            "formatted": format_balance(balance),
        }))
    }

    fn saving_info(&self, request: AccountRequest) -> ApiResult<Value> {
        let DepositInfo {
            active,
            payouts,
            balance,
            max_slots,
        } = self.mutator.deposit_info(&request.id.text())?;
        let active: Vec<Value> = active.iter().map(active_entry).collect();
        let payouts: Vec<Value> = payouts.iter().map(payout_entry).collect();
        Ok(json!({
            "active": active,
            "payouts": payouts,
            "balance": balance,
            "formatted": format_balance(balance),
            "maxSlots": max_slots,
        }))
    }

    fn join_saving(&self, request: JoinSavingRequest) -> ApiResult<Value> {
        let amount = request.amount.integer(EconomyError::InvalidAmount)?;
        let opened = self
            .mutator
            .open_deposit(&request.id.text(), &request.product, amount)?;
        Ok(json!({
            "ok": true,
            "saving": deposit_entry(&opened.deposit),
            "balance": opened.balance,
            "formatted": format_balance(opened.balance),
        }))
    }

    fn mining_info(&self, request: AccountRequest) -> ApiResult<Value> {
        let info = self.mutator.mining_info(&request.id.text())?;
        Ok(json!({ "left": info.left, "dailyLimit": info.daily_limit }))
    }

    fn mine(&self, request: AccountRequest) -> ApiResult<Value> {
        let outcome = self.mutator.mine(&request.id.text())?;
        Ok(json!({
            "ok": true,
            "reward": outcome.reward,
            "left": outcome.left,
            "balance": outcome.balance,
            "formatted": format_balance(outcome.balance),
        }))
    }

    fn trade(&self, request: TradeRequest, buy: bool) -> ApiResult<Value> {
        let id = request.id.text();
        let quantity = request.amount.text();
        let price = request.price.number(EconomyError::InvalidPrice)?;
        let outcome = if buy {
            self.mutator
                .buy_stock(&id, &request.symbol, &quantity, price)?
        } else {
            self.mutator
                .sell_stock(&id, &request.symbol, &quantity, price)?
        };
        Ok(json!({
            "ok": true,
            "symbol": outcome.symbol,
            "quantity": outcome.quantity,
            "total": outcome.amount,
            "balance": outcome.balance,
            "formatted": format_balance(outcome.balance),
        }))
    }

    fn all_stocks(&self) -> ApiResult<Value> {
        let mut accounts = Map::new();
        for (account_id, positions) in self.mutator.all_positions()? {
            let mut holdings = Map::new();
            for position in positions {
                holdings.insert(
                    position.symbol,
                    json!({ "amount": position.quantity, "avg_price": position.avg_price }),
                );
            }
            accounts.insert(account_id.as_str().to_string(), Value::Object(holdings));
        }
        Ok(Value::Object(accounts))
    }

    fn buy_room_skin(&self, request: BuySkinRequest) -> ApiResult<Value> {
        let price = request.price.integer(EconomyError::InvalidPrice)?;
        let purchase = self
            .mutator
            .buy_room_skin(&request.id.text(), &request.skin, price)?;
        Ok(json!({
            "success": true,
            "already": purchase.already_owned,
            "balance": purchase.balance,
            "formatted": format_balance(purchase.balance),
        }))
    }

    fn rooms(&self, request: AccountRequest) -> ApiResult<Value> {
        let room = self.mutator.rooms(&request.id.text())?;
        Ok(json!({
            "ownedRooms": room.owned,
            "currentRoom": room.active,
        }))
    }

    fn apply_room_skin(&self, request: ApplySkinRequest) -> ApiResult<Value> {
        let room = self
            .mutator
            .apply_room_skin(&request.id.text(), &request.skin)?;
        Ok(json!({ "success": true, "currentRoom": room.active }))
    }
}

fn parse<T: DeserializeOwned>(body: &Value) -> ApiResult<T> {
    serde_json::from_value(body.clone()).map_err(|err| ApiError::BadRequest(err.to_string()))
}

fn split_query(path: &str) -> (&str, Option<&str>) {
    let (route, query) = match path.split_once('?') {
        Some((route, query)) => (route, Some(query)),
        None => (path, None),
    };
    let route = match route.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => route,
    };
    (route, query)
}

fn merge_query(body: &Value, query: Option<&str>) -> Value {
    let mut object = match body {
        Value::Null => Map::new(),
        Value::Object(object) => object.clone(),
        other => return other.clone(),
    };
    for pair in query.unwrap_or_default().split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if key.is_empty() || object.contains_key(key) {
            continue;
        }
        object.insert(key.to_string(), Value::String(value.to_string()));
    }
    Value::Object(object)
}

fn ranking_entry(account: &Account) -> Value {
    json!({
        "id": account.id.as_str(),
        "name": account.name,
        "balance": account.balance,
        "formatted": format_balance(account.balance),
    })
}

fn deposit_entry(deposit: &Deposit) -> Value {
    json!({
        "id": deposit.id.as_str(),
        "product": deposit.product.as_str(),
        "amount": deposit.principal,
        "days": deposit.term_days,
        "rate": deposit.rate_pct,
        "tax": deposit.tax_pct,
        "startDate": deposit.start_date.to_string(),
        "endDate": deposit.maturity_date.to_string(),
        "paid": deposit.paid,
    })
}

fn active_entry(active: &ActiveDeposit) -> Value {
    let mut entry = deposit_entry(&active.deposit);
    entry["remainDays"] = json!(active.remaining_days);
    entry
}

fn payout_entry(settled: &SettledDeposit) -> Value {
    let mut entry = deposit_entry(&settled.deposit);
    entry["interest"] = json!(settled.payout.interest);
    entry["taxAmount"] = json!(settled.payout.tax);
    entry["payout"] = json!(settled.payout.total);
    entry
}
