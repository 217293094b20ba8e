use coinroom_core::{
    import_legacy_dir, AccountId, LedgerStore, MemoryLedgerStore, Record, RecordKind,
    SqliteLedgerStore,
};
use std::path::Path;

fn write(dir: &Path, file: &str, content: &str) {
    std::fs::write(dir.join(file), content).unwrap();
}

fn seed_full_dataset(dir: &Path) {
    write(
        dir,
        "user_data.json",
        r#"{
            "u1": {"balance": 1500, "joinDate": 1700000000000, "ownedRooms": ["Room1", "Room2"], "currentRoom": "Room2"},
            "u2": {"name": "Bea", "balance": "20"},
            "   ": {"balance": 5},
            "u3": null
        }"#,
    );
    write(dir, "user_map.json", r#"{"u1": "Ann"}"#);
    write(
        dir,
        "attendance.json",
        r#"{"u1": {"lastDate": "2025-07-03", "days": ["2025-07-01", "2025-07-02", "2025-07-03", "bogus"], "streak": 3}}"#,
    );
    write(
        dir,
        "mine_attempts.json",
        r#"{"u1": {"lastDay": "2025-07-03", "count": 2}, "u2": {"lastDay": "", "count": 0}}"#,
    );
    write(
        dir,
        "saving.json",
        r#"{
            "u1": [
                {"id": 1, "product": "soso", "amount": 100, "days": 3, "rate": 20, "startDate": "2025-07-01", "endDate": "2025-07-04", "paid": true},
                {"id": "b", "product": "hanbang", "amount": 50, "days": 10, "rate": 30, "tax": 12, "startDate": "2025-07-01", "endDate": "2025-07-11", "paid": false},
                {"id": "c", "product": "mystery", "amount": 50, "startDate": "2025-07-01", "endDate": "2025-07-11"}
            ]
        }"#,
    );
    write(
        dir,
        "stocks.json",
        r#"{"u1": {"ACME": {"amount": 2.5, "avg_price": 10}, "DEAD": {"amount": 0, "avg_price": 1}}}"#,
    );
}

fn account_names(store: &dyn LedgerStore) -> Vec<(String, String, i64)> {
    store
        .scan(RecordKind::Account)
        .unwrap()
        .into_iter()
        .map(|record| match record {
            Record::Account(account) => (
                account.id.as_str().to_string(),
                account.name,
                account.balance,
            ),
            other => panic!("unexpected record {other:?}"),
        })
        .collect()
}

#[test]
fn full_dataset_imports_every_kind() {
    let dir = tempfile::tempdir().unwrap();
    seed_full_dataset(dir.path());
    let store = SqliteLedgerStore::open_in_memory().unwrap();

    let report = import_legacy_dir(&store, dir.path()).unwrap();
    assert_eq!(report.accounts, 2);
    assert_eq!(report.rooms, 1);
    assert_eq!(report.attendance, 1);
    assert_eq!(report.mining, 1);
    assert_eq!(report.deposits, 2);
    assert_eq!(report.stocks, 1);
    // null user, empty mining day, zero-quantity stock
    assert_eq!(report.skipped, 3);
    // blank account id, unknown product
    assert_eq!(report.rejected, 2);
    assert!(report.missing_files.is_empty());

    assert_eq!(
        account_names(&store),
        vec![
            ("u1".to_string(), "Ann".to_string(), 1500),
            ("u2".to_string(), "Bea".to_string(), 20),
        ]
    );

    let snapshot = store
        .snapshot(&AccountId::parse("u1").unwrap())
        .unwrap()
        .unwrap();
    let room = snapshot.room.as_ref().unwrap();
    assert_eq!(room.active, "Room2");
    assert!(room.owns("Room1"));
    assert_eq!(snapshot.attendance.as_ref().unwrap().days.len(), 3);
    assert_eq!(snapshot.mining.as_ref().unwrap().count, 2);
    assert_eq!(snapshot.deposits.len(), 2);
    assert_eq!(snapshot.unpaid_deposits(), 1);
    assert_eq!(snapshot.stocks.len(), 1);
    assert_eq!(snapshot.stocks[0].quantity, 2.5);
}

#[test]
fn second_run_leaves_ledger_unchanged_and_skips_paid_deposits() {
    let dir = tempfile::tempdir().unwrap();
    seed_full_dataset(dir.path());
    let store = MemoryLedgerStore::new();

    import_legacy_dir(&store, dir.path()).unwrap();
    let before = store.scan(RecordKind::Deposit).unwrap();
    let names_before = account_names(&store);

    let again = import_legacy_dir(&store, dir.path()).unwrap();
    assert_eq!(again.deposits, 1);
    assert_eq!(again.skipped, 4);
    assert_eq!(store.scan(RecordKind::Deposit).unwrap(), before);
    assert_eq!(account_names(&store), names_before);
}

#[test]
fn missing_files_are_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "user_data.json", r#"{"solo": {"balance": 7}}"#);
    let store = MemoryLedgerStore::new();

    let report = import_legacy_dir(&store, dir.path()).unwrap();
    assert_eq!(report.accounts, 1);
    assert_eq!(report.missing_files.len(), 5);
    assert!(report.missing_files.contains(&"stocks.json".to_string()));

    // No name anywhere: a generated one is assigned.
    let names = account_names(&store);
    assert!(names[0].1.starts_with("user"));
}

#[test]
fn records_for_unknown_accounts_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "mine_attempts.json",
        r#"{"ghost": {"lastDay": "2025-07-03", "count": 1}}"#,
    );
    let store = MemoryLedgerStore::new();

    let report = import_legacy_dir(&store, dir.path()).unwrap();
    assert_eq!(report.mining, 0);
    assert_eq!(report.rejected, 1);
}

#[test]
fn malformed_file_aborts_import() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "user_data.json", "[1, 2, 3]");
    let store = MemoryLedgerStore::new();

    let err = import_legacy_dir(&store, dir.path()).unwrap_err();
    assert!(err.to_string().contains("user_data.json"));
}
