//! Deposit term sampling and maturity payouts.
//!
//! Basic deposits pay `floor(principal * rate / 100)`. Premium deposits treat
//! `rate` as a raw multiplier: `gross = principal * rate`, taxed at
//! `floor(gross * tax / 100)`.

use crate::config::{DepositConfig, ProductTerms};
use crate::entropy::Entropy;
use crate::model::{Deposit, DepositProduct};
use chrono::{Days, NaiveDate};

/// Sampled terms for a new deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositTerms {
    pub term_days: u32,
    pub rate_pct: u32,
    pub tax_pct: u32,
}

impl DepositTerms {
    pub fn maturity_from(&self, start: NaiveDate) -> NaiveDate {
        start
            .checked_add_days(Days::new(u64::from(self.term_days)))
            .unwrap_or(NaiveDate::MAX)
    }
}

pub fn sample_terms(
    product: DepositProduct,
    config: &DepositConfig,
    entropy: &dyn Entropy,
) -> DepositTerms {
    let bounds: &ProductTerms = match product {
        DepositProduct::Basic => &config.basic,
        DepositProduct::Premium => &config.premium,
    };
    let term_days = entropy.between(bounds.min_days, bounds.max_days);
    let rate_pct = entropy.between(bounds.min_rate, bounds.max_rate);
    let tax_pct = match product {
        DepositProduct::Basic => 0,
        DepositProduct::Premium => entropy.between(bounds.min_tax, bounds.max_tax),
    };
    DepositTerms {
        term_days,
        rate_pct,
        tax_pct,
    }
}

/// Amounts credited when a deposit matures. Totals saturate at `i64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub principal: i64,
    pub interest: i64,
    pub tax: i64,
    pub total: i64,
}

pub fn payout(deposit: &Deposit) -> Payout {
    let principal = i128::from(deposit.principal);
    let rate = i128::from(deposit.rate_pct);
    let (interest, tax) = match deposit.product {
        DepositProduct::Basic => (principal * rate / 100, 0),
        DepositProduct::Premium => {
            let gross = principal * rate;
            let tax = gross * i128::from(deposit.tax_pct) / 100;
            (gross - tax, tax)
        }
    };
    Payout {
        principal: deposit.principal,
        interest: saturate(interest),
        tax: saturate(tax),
        total: saturate(principal + interest),
    }
}

/// Whole days until maturity, never negative.
pub fn remaining_days(deposit: &Deposit, today: NaiveDate) -> i64 {
    (deposit.maturity_date - today).num_days().max(0)
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::{payout, remaining_days, sample_terms};
    use crate::config::DepositConfig;
    use crate::entropy::{RngEntropy, SequenceEntropy};
    use crate::model::{AccountId, Deposit, DepositId, DepositProduct};
    use chrono::NaiveDate;

    fn deposit(product: DepositProduct, principal: i64, rate: u32, tax: u32) -> Deposit {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        Deposit {
            id: DepositId::from_existing("d-1"),
            account_id: AccountId::parse("u-1").unwrap(),
            product,
            principal,
            term_days: 5,
            rate_pct: rate,
            tax_pct: tax,
            start_date: start,
            maturity_date: NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
            paid: false,
        }
    }

    #[test]
    fn basic_interest_is_floored_percent() {
        let result = payout(&deposit(DepositProduct::Basic, 999, 15, 0));
        assert_eq!(result.interest, 149);
        assert_eq!(result.tax, 0);
        assert_eq!(result.total, 1_148);
    }

    #[test]
    fn premium_rate_is_a_multiplier_and_tax_is_floored() {
        let result = payout(&deposit(DepositProduct::Premium, 1_000, 3, 33));
        assert_eq!(result.tax, 990);
        assert_eq!(result.interest, 2_010);
        assert_eq!(result.total, 3_010);
    }

    #[test]
    fn huge_payouts_saturate() {
        let result = payout(&deposit(DepositProduct::Premium, i64::MAX, 100, 0));
        assert_eq!(result.total, i64::MAX);
    }

    #[test]
    fn sampled_terms_stay_in_configured_ranges() {
        let config = DepositConfig::default();
        let entropy = RngEntropy::seeded(11);
        for _ in 0..500 {
            let basic = sample_terms(DepositProduct::Basic, &config, &entropy);
            assert!((1..=10).contains(&basic.term_days));
            assert!((10..=50).contains(&basic.rate_pct));
            assert_eq!(basic.tax_pct, 0);

            let premium = sample_terms(DepositProduct::Premium, &config, &entropy);
            assert!((1..=100).contains(&premium.term_days));
            assert!(premium.rate_pct <= 100);
            assert!(premium.tax_pct <= 50);
        }
    }

    #[test]
    fn sequence_entropy_drives_terms() {
        let config = DepositConfig::default();
        let entropy = SequenceEntropy::new([2, 5]);
        let terms = sample_terms(DepositProduct::Basic, &config, &entropy);
        assert_eq!(terms.term_days, 3);
        assert_eq!(terms.rate_pct, 15);
        let start = NaiveDate::from_ymd_opt(2025, 1, 30).unwrap();
        assert_eq!(
            terms.maturity_from(start),
            NaiveDate::from_ymd_opt(2025, 2, 2).unwrap()
        );
    }

    #[test]
    fn remaining_days_never_negative() {
        let item = deposit(DepositProduct::Basic, 10, 10, 0);
        let before = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let after = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(remaining_days(&item, before), 2);
        assert_eq!(remaining_days(&item, after), 0);
    }
}
