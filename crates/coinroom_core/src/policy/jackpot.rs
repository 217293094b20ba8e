//! Three-reel slot machine.

use crate::config::JackpotConfig;
use crate::entropy::Entropy;

pub const REEL: [&str; 10] = [
    "7️⃣", "🍎", "🍉", "🍌", "🍇", "1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣",
];
pub const SEVEN: &str = REEL[0];
pub const FOUR: &str = REEL[8];

pub type Spin = [&'static str; 3];

pub fn spin(entropy: &dyn Entropy) -> Spin {
    let bound = REEL.len() as u32;
    [
        REEL[entropy.below(bound) as usize],
        REEL[entropy.below(bound) as usize],
        REEL[entropy.below(bound) as usize],
    ]
}

/// Nominal reward for a spin; negative for the cursed triple.
/// `None` when the multiplication overflows.
pub fn nominal_reward(symbols: &Spin, bet: i64, config: &JackpotConfig) -> Option<i64> {
    let [first, second, third] = *symbols;
    if first != second || second != third {
        return Some(0);
    }
    match first {
        SEVEN => bet.checked_mul(config.sevens_multiplier),
        FOUR => bet
            .checked_mul(config.fours_penalty_multiplier)
            .map(|loss| -loss),
        _ => bet.checked_mul(config.triple_multiplier),
    }
}

/// Settled outcome of a spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JackpotSettlement {
    /// Reward actually applied after the bet was taken; the loss of a cursed
    /// triple is capped at what the account still holds.
    pub reward: i64,
    pub balance: i64,
}

/// `balance - bet + reward`, floored at zero. `None` on overflow.
pub fn settle(balance: i64, bet: i64, nominal: i64) -> Option<JackpotSettlement> {
    let after_bet = balance.checked_sub(bet)?;
    let raw = after_bet.checked_add(nominal)?;
    let balance = raw.max(0);
    Some(JackpotSettlement {
        reward: balance - after_bet,
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::{nominal_reward, settle, spin, FOUR, SEVEN};
    use crate::config::JackpotConfig;
    use crate::entropy::SequenceEntropy;

    #[test]
    fn spin_reads_reel_positions_from_entropy() {
        let entropy = SequenceEntropy::new([0, 0, 0, 8, 8, 8, 1, 2, 3]);
        assert_eq!(spin(&entropy), [SEVEN, SEVEN, SEVEN]);
        assert_eq!(spin(&entropy), [FOUR, FOUR, FOUR]);
        assert_eq!(spin(&entropy), ["🍎", "🍉", "🍌"]);
    }

    #[test]
    fn payout_table() {
        let config = JackpotConfig::default();
        assert_eq!(nominal_reward(&[SEVEN; 3], 10, &config), Some(10_000));
        assert_eq!(nominal_reward(&["🍇"; 3], 10, &config), Some(2_500));
        assert_eq!(nominal_reward(&[FOUR; 3], 10, &config), Some(-4_440));
        assert_eq!(nominal_reward(&[SEVEN, SEVEN, "🍇"], 10, &config), Some(0));
        assert_eq!(nominal_reward(&[SEVEN; 3], i64::MAX, &config), None);
    }

    #[test]
    fn cursed_loss_is_capped_at_zero_balance() {
        let outcome = settle(1_000, 10, -4_440).unwrap();
        assert_eq!(outcome.balance, 0);
        assert_eq!(outcome.reward, -990);

        let outcome = settle(100_000, 10, -4_440).unwrap();
        assert_eq!(outcome.balance, 95_550);
        assert_eq!(outcome.reward, -4_440);
    }
}
