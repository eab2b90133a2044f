//! Scenario S3: an index tracks a record through replacement, with the
//! stale entry from the old value gone afterward.

use ordstore::{Collection, IndexArgs, PutOpts, Store, TxnOutcome, Value};
use serde_json::json;

#[test]
fn index_reflects_latest_value_after_replacement() {
    let store = Store::open("mem:/").unwrap();
    store
        .transact(true, |txn| {
            let people = Collection::open(&store, txn, "people", "json", None, false).unwrap();
            people
                .add_index(
                    txn,
                    "age",
                    Box::new(|rec: &serde_json::Value| Ok(vec![vec![Value::Int(rec["age"].as_i64().unwrap())]])),
                )
                .unwrap();

            let d_key = people
                .put(txn, &json!({"name": "D", "age": 29}), PutOpts::default())
                .unwrap();
            people
                .put(txn, &json!({"name": "J", "age": 40}), PutOpts::default())
                .unwrap();

            let age_idx = people.index("age").unwrap();
            let before: Vec<_> = age_idx
                .pairs(&*txn, IndexArgs::all())
                .unwrap()
                .collect::<ordstore::Result<Vec<_>>>()
                .unwrap();
            assert_eq!(
                before,
                vec![
                    (vec![Value::Int(29)], vec![Value::Int(1)]),
                    (vec![Value::Int(40)], vec![Value::Int(2)]),
                ]
            );

            people
                .put(
                    txn,
                    &json!({"name": "D", "age": 30}),
                    PutOpts { key: Some(d_key), ..Default::default() },
                )
                .unwrap();

            let after: Vec<_> = age_idx
                .pairs(&*txn, IndexArgs::all())
                .unwrap()
                .collect::<ordstore::Result<Vec<_>>>()
                .unwrap();
            assert_eq!(
                after,
                vec![
                    (vec![Value::Int(30)], vec![Value::Int(1)]),
                    (vec![Value::Int(40)], vec![Value::Int(2)]),
                ]
            );
            assert!(!after.iter().any(|(age, _)| age == &vec![Value::Int(29)]));

            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
}
