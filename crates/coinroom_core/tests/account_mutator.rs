use chrono::NaiveDate;
use coinroom_core::policy::jackpot;
use coinroom_core::service::TradeOutcome;
use coinroom_core::{
    AccountMutator, EconomyConfig, EconomyError, EconomyResult, ErrorClass, FixedClock,
    LedgerStore, ManualClock, MemoryLedgerStore, RngEntropy, SequenceEntropy, SqliteLedgerStore,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Barrier};
use std::thread;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn mutator_at(
    clock: &Arc<ManualClock>,
    entropy: impl IntoIterator<Item = u32>,
) -> AccountMutator<MemoryLedgerStore> {
    AccountMutator::new(MemoryLedgerStore::new(), EconomyConfig::default())
        .with_clock(Arc::clone(clock))
        .with_entropy(SequenceEntropy::new(entropy))
}

fn funded<S: LedgerStore>(mutator: &AccountMutator<S>, id: &str, amount: i64) {
    mutator.identify(id, Some(id)).unwrap();
    if amount > 0 {
        mutator.credit(id, amount).unwrap();
    }
}

#[test]
fn identify_creates_once_and_then_returns_existing_account() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, [234]);

    let first = mutator.identify("u-1", None).unwrap();
    assert!(first.created);
    assert_eq!(first.account.name, "user1234");
    assert_eq!(first.account.balance, 0);

    let again = mutator.identify("u-1", Some("Other")).unwrap();
    assert!(!again.created);
    assert_eq!(again.account, first.account);

    let hinted = mutator.identify("u-2", Some("  Zed  ")).unwrap();
    assert_eq!(hinted.account.name, "Zed");

    assert!(matches!(
        mutator.identify("   ", None),
        Err(EconomyError::InvalidAccountId(_))
    ));
}

#[test]
fn operations_on_unknown_account_fail_without_creating_it() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);

    let err = mutator.credit("ghost", 10).unwrap_err();
    assert!(matches!(err, EconomyError::UnknownAccount(_)));
    assert_eq!(err.code(), "UNKNOWN_ACCOUNT");
    assert!(mutator.ranking(None).unwrap().is_empty());
}

#[test]
fn debit_never_overdraws_and_rejects_bad_amounts() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 100);

    assert_eq!(mutator.debit("alice", 40).unwrap(), 60);
    let err = mutator.debit("alice", 61).unwrap_err();
    assert!(matches!(
        err,
        EconomyError::InsufficientFunds {
            required: 61,
            available: 60
        }
    ));
    assert!(matches!(
        mutator.credit("alice", 0),
        Err(EconomyError::InvalidAmount(_))
    ));
    assert!(matches!(
        mutator.credit("alice", i64::MAX),
        Err(EconomyError::AmountOverflow)
    ));
    assert_eq!(mutator.balance("alice").unwrap().balance, 60);
}

#[test]
fn rename_validates_name() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 0);

    mutator.rename("alice", " Alice Cooper ").unwrap();
    assert_eq!(mutator.balance("alice").unwrap().name, "Alice Cooper");

    assert!(matches!(
        mutator.rename("alice", "   "),
        Err(EconomyError::InvalidName(_))
    ));
    assert!(matches!(
        mutator.rename("alice", &"x".repeat(33)),
        Err(EconomyError::InvalidName(_))
    ));
    assert_eq!(mutator.balance("alice").unwrap().name, "Alice Cooper");
}

#[test]
fn deposit_lifecycle_pays_once_at_maturity() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    // term = 1 + 2, rate = 10 + 10
    let mutator = mutator_at(&clock, [2, 10]);
    funded(&mutator, "alice", 10_000);

    let opened = mutator.open_deposit("alice", "basic", 1_000).unwrap();
    assert_eq!(opened.balance, 9_000);
    assert_eq!(opened.deposit.term_days, 3);
    assert_eq!(opened.deposit.rate_pct, 20);
    assert_eq!(opened.deposit.maturity_date, date(2025, 3, 4));

    clock.advance_days(2);
    let info = mutator.deposit_info("alice").unwrap();
    assert!(info.payouts.is_empty());
    assert_eq!(info.active.len(), 1);
    assert_eq!(info.active[0].remaining_days, 1);
    assert_eq!(info.balance, 9_000);

    // Never polled on the maturity day; paid on the next poll.
    clock.advance_days(5);
    let info = mutator.settle_deposits("alice").unwrap();
    assert_eq!(info.payouts.len(), 1);
    assert_eq!(info.payouts[0].payout.total, 1_200);
    assert!(info.payouts[0].deposit.paid);
    assert!(info.active.is_empty());
    assert_eq!(info.balance, 10_200);

    let repeat = mutator.settle_deposits("alice").unwrap();
    assert!(repeat.payouts.is_empty());
    assert_eq!(repeat.balance, 10_200);
    assert_eq!(mutator.balance("alice").unwrap().balance, 10_200);
}

#[test]
fn third_deposit_hits_slot_limit_and_leaves_balance_alone() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 1_000);

    mutator.open_deposit("alice", "soso", 100).unwrap();
    mutator.open_deposit("alice", "premium", 100).unwrap();
    let err = mutator.open_deposit("alice", "basic", 100).unwrap_err();
    assert!(matches!(err, EconomyError::SlotLimit { max: 2 }));
    assert_eq!(err.code(), "SLOT_LIMIT");
    assert_eq!(mutator.balance("alice").unwrap().balance, 800);

    // Slots are checked before funds.
    let err = mutator.open_deposit("alice", "basic", 1_000_000).unwrap_err();
    assert!(matches!(err, EconomyError::SlotLimit { .. }));

    assert!(matches!(
        mutator.open_deposit("alice", "gold", 100),
        Err(EconomyError::UnknownProduct(_))
    ));
}

#[test]
fn mining_respects_daily_limit_and_resets_next_day() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, [0, 25, 60, 0]);
    funded(&mutator, "alice", 0);

    let first = mutator.mine("alice").unwrap();
    assert_eq!((first.reward, first.left, first.balance), (50, 2, 50));
    let second = mutator.mine("alice").unwrap();
    assert_eq!((second.reward, second.left, second.balance), (30, 1, 80));
    let third = mutator.mine("alice").unwrap();
    assert_eq!((third.reward, third.left, third.balance), (10, 0, 90));

    let err = mutator.mine("alice").unwrap_err();
    assert!(matches!(err, EconomyError::LimitReached { limit: 3 }));
    assert_eq!(mutator.mining_info("alice").unwrap().left, 0);

    clock.advance_days(1);
    assert_eq!(mutator.mining_info("alice").unwrap().left, 3);
    let next_day = mutator.mine("alice").unwrap();
    assert_eq!(next_day.left, 2);
    assert_eq!(next_day.balance, 140);
}

#[test]
fn week_long_streak_ending_on_month_end_pays_every_bonus() {
    let clock = Arc::new(ManualClock::new(date(2025, 7, 25)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 0);

    let mut last = None;
    for offset in 0..7 {
        if offset > 0 {
            clock.advance_days(1);
        }
        last = Some(mutator.check_in("alice").unwrap());
    }
    let last = last.unwrap();
    assert_eq!(last.streak, 7);
    assert_eq!(last.week_index, 7);
    assert_eq!(last.weekly_bonus, 5_000);
    assert_eq!(last.month_end_bonus, 10_000);
    assert_eq!(last.reward, 18_000);
    assert_eq!(last.attended_days, (25..=31).collect::<Vec<u32>>());
    assert_eq!(last.balance, 7 * 3_000 + 5_000 + 10_000);

    let info = mutator.attendance_info("alice").unwrap();
    assert!(info.already_today);
    assert_eq!(info.streak, 7);
}

#[test]
fn second_check_in_same_day_changes_nothing() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 10)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 0);

    let first = mutator.check_in("alice").unwrap();
    assert_eq!(first.reward, 3_000);
    let err = mutator.check_in("alice").unwrap_err();
    assert!(matches!(err, EconomyError::AlreadyCheckedIn));
    assert_eq!(mutator.balance("alice").unwrap().balance, 3_000);

    clock.advance_days(2);
    let after_gap = mutator.check_in("alice").unwrap();
    assert_eq!(after_gap.streak, 1);
    assert_eq!(after_gap.attended_days, vec![10, 12]);
}

#[test]
fn jackpot_pays_triples_and_caps_cursed_losses() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, [0, 1, 2, 8, 8, 8, 0, 0, 0]);
    funded(&mutator, "alice", 100);

    let miss = mutator.jackpot("alice", 10).unwrap();
    assert_eq!(miss.reward, 0);
    assert_eq!(miss.balance, 90);

    let cursed = mutator.jackpot("alice", 10).unwrap();
    assert_eq!(cursed.symbols, [jackpot::FOUR; 3]);
    assert_eq!(cursed.reward, -80);
    assert_eq!(cursed.balance, 0);

    mutator.credit("alice", 100).unwrap();
    let sevens = mutator.jackpot("alice", 10).unwrap();
    assert_eq!(sevens.symbols, [jackpot::SEVEN; 3]);
    assert_eq!(sevens.reward, 10_000);
    assert_eq!(sevens.balance, 10_090);

    assert!(matches!(
        mutator.jackpot("alice", 1_000_000),
        Err(EconomyError::InsufficientFunds { .. })
    ));
}

#[test]
fn buying_twice_averages_price_and_selling_all_removes_position() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 1_000);

    let first = mutator.buy_stock("alice", "ACME", "2", 10.5).unwrap();
    assert_eq!(first.amount, 21);
    let second = mutator.buy_stock("alice", " ACME ", "2", 12.5).unwrap();
    assert_eq!(second.amount, 25);
    let position = second.position.unwrap();
    assert_eq!(position.quantity, 4.0);
    assert!((position.avg_price - 11.5).abs() < 1e-9);
    assert_eq!(second.balance, 954);

    let err = mutator.sell_stock("alice", "ACME", "5", 13.0).unwrap_err();
    assert!(matches!(err, EconomyError::InsufficientQuantity { .. }));

    let sold: TradeOutcome = mutator.sell_stock("alice", "ACME", "4", 13.0).unwrap();
    assert_eq!(sold.amount, 52);
    assert!(sold.position.is_none());
    assert_eq!(sold.balance, 1_006);
    assert!(mutator.positions("alice").unwrap().is_empty());
    assert!(mutator.all_positions().unwrap().is_empty());

    assert!(matches!(
        mutator.sell_stock("alice", "ACME", "1", 13.0),
        Err(EconomyError::NoPosition(_))
    ));
}

#[test]
fn tiny_positions_keep_their_remainder_and_cannot_be_oversold() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 10_000);

    let bought = mutator.buy_stock("alice", "DUST", "0.000000001", 1e12).unwrap();
    assert!((1_000..=1_001).contains(&bought.amount));

    let partial = mutator.sell_stock("alice", "DUST", "0.0000000004", 1e12).unwrap();
    assert!((399..=400).contains(&partial.amount));
    let left = partial.position.unwrap();
    assert!((left.quantity - 6e-10).abs() < 1e-20);
    assert_eq!(mutator.positions("alice").unwrap().len(), 1);

    let err = mutator.sell_stock("alice", "DUST", "0.0000000009", 1e12).unwrap_err();
    assert!(matches!(err, EconomyError::InsufficientQuantity { .. }));
    assert_eq!(
        mutator.balance("alice").unwrap().balance,
        10_000 - bought.amount + partial.amount
    );

    let rest = mutator.sell_stock("alice", "DUST", "0.0000000006", 1e12).unwrap();
    assert!(rest.position.is_none());
    assert!(mutator.positions("alice").unwrap().is_empty());
}

#[test]
fn float_noise_on_a_full_sale_still_closes_the_position() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 1_000);

    mutator.buy_stock("alice", "ACME", "0.1", 1.0).unwrap();
    let second = mutator.buy_stock("alice", "ACME", "0.2", 1.0).unwrap();
    assert_ne!(second.position.unwrap().quantity, 0.3);

    let sold = mutator.sell_stock("alice", "ACME", "0.3", 1.0).unwrap();
    assert!(sold.position.is_none());
    assert!(mutator.positions("alice").unwrap().is_empty());
}

#[test]
fn stock_quantities_accept_suffix_notation() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 10_000);

    let bought = mutator.buy_stock("alice", "ZED", "1.5A", 2.0).unwrap();
    assert_eq!(bought.quantity, 1_500.0);
    assert_eq!(bought.amount, 3_000);
    assert!(matches!(
        mutator.buy_stock("alice", "ZED", "many", 2.0),
        Err(EconomyError::InvalidNotation(_))
    ));
    assert!(matches!(
        mutator.buy_stock("alice", "ZED", "1", f64::NAN),
        Err(EconomyError::InvalidPrice(_))
    ));

    let partial = mutator.sell_stock("alice", "ZED", "500", 3.0).unwrap();
    assert_eq!(partial.amount, 1_500);
    assert_eq!(partial.position.unwrap().quantity, 1_000.0);
    let grouped = mutator.all_positions().unwrap();
    assert_eq!(grouped.len(), 1);
}

#[test]
fn room_skins_are_bought_once_and_applied_when_owned() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "alice", 1_000);

    let initial = mutator.rooms("alice").unwrap();
    assert_eq!(initial.active, "Room1");
    assert!(initial.owns("Room1"));

    let bought = mutator.buy_room_skin("alice", "Room2", 500).unwrap();
    assert!(!bought.already_owned);
    assert_eq!(bought.balance, 500);
    let again = mutator.buy_room_skin("alice", "Room2", 500).unwrap();
    assert!(again.already_owned);
    assert_eq!(again.balance, 500);

    assert!(matches!(
        mutator.buy_room_skin("alice", "Room3", 501),
        Err(EconomyError::InsufficientFunds { .. })
    ));
    assert!(matches!(
        mutator.apply_room_skin("alice", "Room3"),
        Err(EconomyError::NotOwned(_))
    ));

    let applied = mutator.apply_room_skin("alice", "Room2").unwrap();
    assert_eq!(applied.active, "Room2");
    assert_eq!(mutator.rooms("alice").unwrap().active, "Room2");
}

#[test]
fn ranking_orders_by_balance_then_id() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, []);
    funded(&mutator, "b", 50);
    funded(&mutator, "a", 50);
    funded(&mutator, "c", 90);

    let top: Vec<String> = mutator
        .ranking(Some(2))
        .unwrap()
        .into_iter()
        .map(|account| account.id.as_str().to_string())
        .collect();
    assert_eq!(top, vec!["c", "a"]);
    assert_eq!(mutator.ranking(None).unwrap().len(), 3);
}

#[test]
fn money_is_conserved_across_a_replayed_session() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mutator = mutator_at(&clock, [0, 0, 0, 0]);
    funded(&mutator, "alice", 5_000);

    let mut expected = 5_000;
    expected -= 300;
    mutator.debit("alice", 300).unwrap();
    let opened = mutator.open_deposit("alice", "basic", 1_000).unwrap();
    expected -= 1_000;
    let mined = mutator.mine("alice").unwrap();
    expected += mined.reward;
    let bought = mutator.buy_stock("alice", "ACME", "3", 7.0).unwrap();
    expected -= bought.amount;
    assert_eq!(mutator.balance("alice").unwrap().balance, expected);

    clock.set_today(opened.deposit.maturity_date);
    let settled = mutator.settle_deposits("alice").unwrap();
    expected += settled.payouts[0].payout.total;
    let sold = mutator.sell_stock("alice", "ACME", "3", 7.0).unwrap();
    expected += sold.amount;
    assert_eq!(mutator.balance("alice").unwrap().balance, expected);
}

fn replay_random_session<S: LedgerStore>(store: S, seed: u64) {
    let clock = Arc::new(ManualClock::new(date(2025, 1, 1)));
    let mutator = AccountMutator::new(store, EconomyConfig::default())
        .with_clock(Arc::clone(&clock))
        .with_entropy(RngEntropy::seeded(seed));
    let mut rng = StdRng::seed_from_u64(seed);
    funded(&mutator, "alice", 10_000);
    let mut expected: i64 = 10_000;

    for step in 0..400 {
        let delta: EconomyResult<i64> = match rng.gen_range(0..11u32) {
            0 => {
                let amount = rng.gen_range(1..=500i64);
                mutator.credit("alice", amount).map(|_| amount)
            }
            1 => {
                let amount = rng.gen_range(1..=800i64);
                mutator.debit("alice", amount).map(|_| -amount)
            }
            2 => {
                let product = if rng.gen_bool(0.5) { "basic" } else { "premium" };
                let amount = rng.gen_range(1..=1_000i64);
                mutator
                    .open_deposit("alice", product, amount)
                    .map(|_| -amount)
            }
            3 => mutator.settle_deposits("alice").map(|info| {
                info.payouts
                    .iter()
                    .map(|settled| settled.payout.total)
                    .sum::<i64>()
            }),
            4 => mutator.mine("alice").map(|outcome| outcome.reward),
            5 => mutator.check_in("alice").map(|outcome| outcome.reward),
            6 => {
                let bet = rng.gen_range(1..=50i64);
                mutator
                    .jackpot("alice", bet)
                    .map(|outcome| outcome.reward - bet)
            }
            7 => {
                let quantity = rng.gen_range(1..=5u32).to_string();
                let price = rng.gen_range(1.0..20.0);
                mutator
                    .buy_stock("alice", "ACME", &quantity, price)
                    .map(|outcome| -outcome.amount)
            }
            8 => {
                let quantity = rng.gen_range(1..=5u32).to_string();
                let price = rng.gen_range(1.0..20.0);
                mutator
                    .sell_stock("alice", "ACME", &quantity, price)
                    .map(|outcome| outcome.amount)
            }
            9 => {
                let skin = format!("Room{}", rng.gen_range(1..=4u32));
                let price = rng.gen_range(0..=300i64);
                mutator
                    .buy_room_skin("alice", &skin, price)
                    .map(|purchase| if purchase.already_owned { 0 } else { -price })
            }
            _ => {
                clock.advance_days(rng.gen_range(1..=3u64));
                Ok(0)
            }
        };

        match delta {
            Ok(delta) => expected += delta,
            Err(err) => assert_ne!(err.class(), ErrorClass::Store, "step {step}: {err}"),
        }
        assert_eq!(
            mutator.balance("alice").unwrap().balance,
            expected,
            "step {step}"
        );
    }
}

#[test]
fn random_sessions_conserve_money_on_memory_store() {
    for seed in [1, 7, 42] {
        replay_random_session(MemoryLedgerStore::new(), seed);
    }
}

#[test]
fn random_sessions_conserve_money_on_sqlite_store() {
    for seed in [3, 11] {
        replay_random_session(SqliteLedgerStore::open_in_memory().unwrap(), seed);
    }
}

#[test]
fn configured_limits_apply_without_touching_store_defaults() {
    let clock = Arc::new(ManualClock::new(date(2025, 3, 1)));
    let mut config = EconomyConfig::default();
    config.mining.daily_limit = 5;
    config.deposit.max_slots = 3;
    let mutator = AccountMutator::new(SqliteLedgerStore::open_in_memory().unwrap(), config)
        .with_clock(Arc::clone(&clock))
        .with_entropy(SequenceEntropy::new([]));
    funded(&mutator, "alice", 1_000);

    for expected_left in (0..5).rev() {
        assert_eq!(mutator.mine("alice").unwrap().left, expected_left);
    }
    assert!(matches!(
        mutator.mine("alice"),
        Err(EconomyError::LimitReached { limit: 5 })
    ));

    for _ in 0..3 {
        mutator.open_deposit("alice", "basic", 10).unwrap();
    }
    assert!(matches!(
        mutator.open_deposit("alice", "basic", 10),
        Err(EconomyError::SlotLimit { max: 3 })
    ));
}

#[test]
fn concurrent_overdraw_has_exactly_one_winner() {
    let mutator = Arc::new(
        AccountMutator::new(MemoryLedgerStore::new(), EconomyConfig::default())
            .with_clock(FixedClock::new(date(2025, 3, 1))),
    );
    funded(mutator.as_ref(), "alice", 100);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let mutator = Arc::clone(&mutator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                mutator.debit("alice", 100)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().all(|r| match r {
        Ok(balance) => *balance == 0,
        Err(err) => matches!(err, EconomyError::InsufficientFunds { .. }),
    }));
    assert_eq!(mutator.balance("alice").unwrap().balance, 0);
}

#[test]
fn separate_connections_on_one_file_never_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let config = EconomyConfig {
        max_conflict_retries: 200,
        ..EconomyConfig::default()
    };
    {
        let store = SqliteLedgerStore::open(&path).unwrap();
        let mutator = AccountMutator::new(store, config.clone());
        funded(&mutator, "alice", 100);
    }

    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let path = path.clone();
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = SqliteLedgerStore::open(&path).unwrap();
                let mutator = AccountMutator::new(store, config);
                barrier.wait();
                let overdraw = mutator.debit("alice", 100).is_ok();
                barrier.wait();
                for _ in 0..5 {
                    mutator.credit("alice", 10).unwrap();
                }
                overdraw
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);

    let store = SqliteLedgerStore::open(&path).unwrap();
    let mutator = AccountMutator::new(store, config);
    assert_eq!(
        mutator.balance("alice").unwrap().balance,
        threads as i64 * 50
    );
}
