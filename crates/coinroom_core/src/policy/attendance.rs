//! Calendar attendance streaks.
//!
//! # Invariants
//! - At most one check-in per calendar day.
//! - The streak continues only when the previous check-in was yesterday.
//! - Stored days cover the current and previous month only.

use crate::config::AttendanceConfig;
use crate::model::{AccountId, AttendanceState};
use chrono::{Datelike, Months, NaiveDate};

/// Result of a successful check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub next: AttendanceState,
    pub base_reward: i64,
    pub weekly_bonus: i64,
    pub month_end_bonus: i64,
}

impl CheckIn {
    pub fn reward(&self) -> i64 {
        self.base_reward
            .saturating_add(self.weekly_bonus)
            .saturating_add(self.month_end_bonus)
    }
}

/// Evaluates a check-in for `today`; `None` when already checked in.
pub fn check_in(
    account_id: &AccountId,
    state: Option<&AttendanceState>,
    today: NaiveDate,
    config: &AttendanceConfig,
) -> Option<CheckIn> {
    let current = state
        .cloned()
        .unwrap_or_else(|| AttendanceState::empty(account_id.clone()));
    if current.last_date == Some(today) {
        return None;
    }

    let continues = match (current.last_date, today.pred_opt()) {
        (Some(last), Some(yesterday)) => last == yesterday,
        _ => false,
    };
    let streak = if continues {
        current.streak.saturating_add(1)
    } else {
        1
    };

    let weekly_bonus = if streak % config.weekly_every.max(1) == 0 {
        config.weekly_bonus
    } else {
        0
    };
    let month_end_bonus = if is_last_day_of_month(today) {
        config.month_end_bonus
    } else {
        0
    };

    let mut days = current.days;
    days.insert(today);
    let floor = first_of_previous_month(today);
    days.retain(|day| *day >= floor);

    Some(CheckIn {
        next: AttendanceState {
            account_id: account_id.clone(),
            last_date: Some(today),
            days,
            streak,
        },
        base_reward: config.base_reward,
        weekly_bonus,
        month_end_bonus,
    })
}

/// Position inside the weekly cycle, `1..=weekly_every`; `0` before any
/// check-in.
pub fn week_index(streak: u32, weekly_every: u32) -> u32 {
    if streak == 0 {
        return 0;
    }
    ((streak - 1) % weekly_every.max(1)) + 1
}

/// Day-of-month numbers checked in during `today`'s month, ascending.
pub fn days_in_month(state: &AttendanceState, today: NaiveDate) -> Vec<u32> {
    state
        .days
        .iter()
        .filter(|day| day.year() == today.year() && day.month() == today.month())
        .map(|day| day.day())
        .collect()
}

pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.succ_opt()
        .map_or(true, |next| next.month() != date.month())
}

fn first_of_previous_month(today: NaiveDate) -> NaiveDate {
    let first = today.with_day(1).unwrap_or(today);
    first.checked_sub_months(Months::new(1)).unwrap_or(first)
}
