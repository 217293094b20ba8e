//! Daily mining quota.

use crate::config::RewardTier;
use crate::entropy::Entropy;
use crate::model::{AccountId, MiningState};
use chrono::NaiveDate;

/// Attempts still available today. A record from an earlier day counts as a
/// fresh quota without being rewritten.
pub fn attempts_left(state: Option<&MiningState>, today: NaiveDate, daily_limit: u32) -> u32 {
    let used = state.map_or(0, |state| state.used_on(today));
    daily_limit.saturating_sub(used)
}

/// State after one more attempt, or `None` when today's quota is spent.
pub fn next_attempt(
    account_id: &AccountId,
    state: Option<&MiningState>,
    today: NaiveDate,
    daily_limit: u32,
) -> Option<MiningState> {
    let used = state.map_or(0, |state| state.used_on(today));
    if used >= daily_limit {
        return None;
    }
    Some(MiningState {
        account_id: account_id.clone(),
        last_day: today,
        count: used + 1,
    })
}

/// Draws one reward from a weighted table.
pub fn sample_reward(tiers: &[RewardTier], entropy: &dyn Entropy) -> i64 {
    let total: u32 = tiers.iter().map(|tier| tier.weight).sum();
    let roll = entropy.below(total);
    let mut cumulative = 0u32;
    for tier in tiers {
        cumulative += tier.weight;
        if roll < cumulative {
            return tier.amount;
        }
    }
    tiers.last().map_or(0, |tier| tier.amount)
}
