//! Scenario S6: counter read-modify-write semantics, including the
//! read-only `n == 0` case.

use ordstore::{Store, TxnOutcome};

#[test]
fn counter_seeds_increments_and_supports_readonly_peek() {
    let store = Store::open("mem:/").unwrap();
    store
        .transact(true, |txn| {
            assert_eq!(store.count(txn, "c", 1, 10).unwrap(), 10);
            assert_eq!(store.count(txn, "c", 1, 10).unwrap(), 11);
            assert_eq!(store.count(txn, "c", 1, 10).unwrap(), 12);
            assert_eq!(store.count(txn, "c", 0, 10).unwrap(), 13);
            assert_eq!(store.count(txn, "c", 1, 10).unwrap(), 13);
            assert_eq!(store.count(txn, "c", 0, 10).unwrap(), 14);
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
}
