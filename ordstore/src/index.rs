//! Secondary index query surface.
//!
//! An index's physical keys are two SEP-joined tuples (`[index_tuple,
//! record_key]`); because the tuple codec packs a tuple's
//! elements with no separator between them, a byte-prefix of the packed
//! `index_tuple` is also a byte-prefix of the whole physical key, so the
//! same `pack_tuple`-then-append-to-prefix trick `Collection` uses for its
//! own keys works unchanged here for partial `args` bounds.

use ordstore_core::engine::EngineTxn;
use ordstore_core::{pack_tuple, unpacks, Value};
use ruc::*;

use crate::collection::Collection;
use crate::error::Error;
use crate::iter::{RangeIter, RangeIterBuilder};

/// Query and manipulation access to a single index on a [`Collection`].
/// Obtained via [`Collection::index`](crate::collection::Collection::index)
/// by name; there is one `Index` handle per `(collection, index name)`.
pub struct Index<'c, 's> {
    coll: &'c Collection<'s>,
    name: String,
    prefix: Vec<u8>,
}

impl<'c, 's> Index<'c, 's> {
    pub(crate) fn new(coll: &'c Collection<'s>, name: &str, prefix: Vec<u8>) -> Index<'c, 's> {
        Index {
            coll,
            name: name.to_string(),
            prefix,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn builder(&self, args: IndexArgs<'_>) -> Result<RangeIterBuilder> {
        let mut b = RangeIterBuilder::new(self.prefix.clone());
        if let Some(key) = args.exact {
            let packed = pack_tuple(key).map_err(Error::from).c(d!())?;
            b = b.set_exact(packed);
        } else if let Some(key) = args.prefix {
            let packed = pack_tuple(key).map_err(Error::from).c(d!())?;
            b = b.set_prefix(packed);
        } else {
            if let Some(lo) = args.lo {
                let packed = pack_tuple(lo).map_err(Error::from).c(d!())?;
                b = b.set_lo(packed, true);
            }
            if let Some(hi) = args.hi {
                let packed = pack_tuple(hi).map_err(Error::from).c(d!())?;
                b = b.set_hi(packed, args.include);
            }
        }
        if let Some(max) = args.max {
            b = b.set_max(max);
        }
        Ok(b.reverse(args.reverse))
    }

    /// Yields `(index tuple, record key)` pairs in index order.
    pub fn pairs<'t>(&self, txn: &'t dyn EngineTxn, args: IndexArgs<'_>) -> Result<IndexPairs<'t>> {
        let builder = self.builder(args).c(d!())?;
        Ok(IndexPairs {
            inner: builder.run(txn).c(d!())?,
            prefix: self.prefix.clone(),
        })
    }

    /// Counts matching entries without decoding records.
    pub fn count(&self, txn: &dyn EngineTxn, args: IndexArgs<'_>) -> Result<usize> {
        Ok(self.pairs(txn, args).c(d!())?.count())
    }

    /// `true` if an entry with the exact tuple `x` exists.
    pub fn has(&self, txn: &dyn EngineTxn, x: &[Value]) -> Result<bool> {
        let mut it = self.pairs(txn, IndexArgs::exact(x)).c(d!())?;
        Ok(it.next().transpose().c(d!())?.is_some())
    }

    /// Yields the referenced `(record key, record)` items, skipping (and
    /// warning about) any entry whose record no longer exists — a stale
    /// index needing a rebuild.
    pub fn items<'t>(&self, txn: &'t dyn EngineTxn, args: IndexArgs<'_>) -> Result<IndexItems<'_, 'c, 's, 't>> {
        Ok(IndexItems {
            index: self,
            txn,
            pairs: self.pairs(txn, args).c(d!())?,
        })
    }

    /// Yields just the index tuple of each matching entry.
    pub fn tups<'t>(&self, txn: &'t dyn EngineTxn, args: IndexArgs<'_>) -> Result<Tups<'t>> {
        Ok(Tups(self.pairs(txn, args).c(d!())?))
    }

    /// Yields just the record key of each matching entry.
    pub fn keys<'t>(&self, txn: &'t dyn EngineTxn, args: IndexArgs<'_>) -> Result<Keys<'t>> {
        Ok(Keys(self.pairs(txn, args).c(d!())?))
    }

    /// Yields just the record of each matching, non-stale entry.
    pub fn values<'t>(&self, txn: &'t dyn EngineTxn, args: IndexArgs<'_>) -> Result<Values<'_, 'c, 's, 't>> {
        Ok(Values(self.items(txn, args).c(d!())?))
    }

    /// First matching record, or `None`.
    pub fn find(&self, txn: &dyn EngineTxn, args: IndexArgs<'_>) -> Result<Option<(Vec<Value>, serde_json::Value)>> {
        let mut it = self.items(txn, args.max(1)).c(d!())?;
        it.next().transpose().c(d!())
    }

    /// The first record whose index tuple is exactly `x`, or `None`.
    pub fn get(&self, txn: &dyn EngineTxn, x: &[Value]) -> Result<Option<serde_json::Value>> {
        Ok(self.find(txn, IndexArgs::exact(x)).c(d!())?.map(|(_, rec)| rec))
    }
}

/// Bound specification shared by every [`Index`] query method: `exact`
/// takes precedence over `prefix`, which takes precedence over `lo`/`hi`.
#[derive(Default, Clone)]
pub struct IndexArgs<'a> {
    exact: Option<&'a [Value]>,
    prefix: Option<&'a [Value]>,
    lo: Option<&'a [Value]>,
    hi: Option<&'a [Value]>,
    reverse: bool,
    max: Option<usize>,
    include: bool,
}

impl<'a> IndexArgs<'a> {
    pub fn all() -> IndexArgs<'a> {
        IndexArgs::default()
    }

    pub fn exact(x: &'a [Value]) -> IndexArgs<'a> {
        IndexArgs {
            exact: Some(x),
            ..Default::default()
        }
    }

    pub fn prefix(p: &'a [Value]) -> IndexArgs<'a> {
        IndexArgs {
            prefix: Some(p),
            ..Default::default()
        }
    }

    pub fn lo(mut self, lo: &'a [Value]) -> Self {
        self.lo = Some(lo);
        self
    }

    pub fn hi(mut self, hi: &'a [Value]) -> Self {
        self.hi = Some(hi);
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn include(mut self, include: bool) -> Self {
        self.include = include;
        self
    }
}

/// Splits a decoded index physical key's tuple list into `(index tuple,
/// record key)`. Index keys are always exactly two SEP-joined tuples (spec
/// §3).
fn split_entry(full_key: &[u8], prefix: &[u8]) -> Result<(Vec<Value>, Vec<Value>)> {
    let mut tuples = unpacks(full_key, Some(prefix)).map_err(Error::from).c(d!())?;
    if tuples.len() != 2 {
        return Err(eg!(format!(
            "corrupt index entry: expected 2 SEP-joined tuples, got {}",
            tuples.len()
        )));
    }
    let record_key = tuples.pop().unwrap();
    let index_tuple = tuples.pop().unwrap();
    Ok((index_tuple, record_key))
}

/// Yields `(index tuple, record key)` pairs.
pub struct IndexPairs<'t> {
    inner: RangeIter<'t>,
    prefix: Vec<u8>,
}

impl<'t> Iterator for IndexPairs<'t> {
    type Item = Result<(Vec<Value>, Vec<Value>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (full_key, _) = self.inner.next()?;
        Some(split_entry(&full_key, &self.prefix))
    }
}

/// Yields just the index tuple of each [`IndexPairs`] entry.
pub struct Tups<'t>(IndexPairs<'t>);

impl<'t> Iterator for Tups<'t> {
    type Item = Result<Vec<Value>>;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.0.next()?.map(|(tup, _)| tup))
    }
}

/// Yields just the record key of each [`IndexPairs`] entry.
pub struct Keys<'t>(IndexPairs<'t>);

impl<'t> Iterator for Keys<'t> {
    type Item = Result<Vec<Value>>;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.0.next()?.map(|(_, key)| key))
    }
}

/// Yields just the record of each non-stale [`IndexItems`] entry.
pub struct Values<'i, 'c, 's, 't>(IndexItems<'i, 'c, 's, 't>);

impl<'i, 'c, 's, 't> Iterator for Values<'i, 'c, 's, 't> {
    type Item = Result<serde_json::Value>;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.0.next()?.map(|(_, rec)| rec))
    }
}

/// Yields `(record key, record)` pairs, silently skipping stale entries
/// after printing a warning.
pub struct IndexItems<'i, 'c, 's, 't> {
    index: &'i Index<'c, 's>,
    txn: &'t dyn EngineTxn,
    pairs: IndexPairs<'t>,
}

impl<'i, 'c, 's, 't> Iterator for IndexItems<'i, 'c, 's, 't> {
    type Item = Result<(Vec<Value>, serde_json::Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (_, record_key) = match self.pairs.next()? {
                Ok(pair) => pair,
                Err(e) => return Some(Err(e)),
            };
            match self.index.coll.get(self.txn, &record_key) {
                Ok(Some(rec)) => return Some(Ok((record_key, rec))),
                Ok(None) => {
                    eprintln!(
                        "warning: stale entry in index {:?} of collection {:?}, requires rebuild",
                        self.index.name,
                        self.index.coll.name()
                    );
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection::{Collection, PutOpts};
    use crate::store::{Store, TxnOutcome};
    use serde_json::json;

    fn build_indexed_store() -> Store {
        Store::open("mem:/").unwrap()
    }

    #[test]
    fn pairs_and_exact_lookup() {
        let s = build_indexed_store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "people", "json", None, false).unwrap();
            coll.add_index(
                txn,
                "age",
                Box::new(|rec: &serde_json::Value| Ok(vec![vec![Value::Int(rec["age"].as_i64().unwrap())]])),
            )
            .unwrap();
            coll.put(txn, &json!({"name": "D", "age": 29}), PutOpts { key: Some(vec![Value::Int(1)]), ..Default::default() })
                .unwrap();
            coll.put(txn, &json!({"name": "J", "age": 40}), PutOpts { key: Some(vec![Value::Int(2)]), ..Default::default() })
                .unwrap();

            let (_, prefix) = coll.index_meta("age").unwrap();
            let idx = Index::new(&coll, "age", prefix);

            let all: Vec<_> = idx.pairs(&*txn, IndexArgs::all()).unwrap().collect::<Result<Vec<_>>>().unwrap();
            assert_eq!(all, vec![(vec![Value::Int(29)], vec![Value::Int(1)]), (vec![Value::Int(40)], vec![Value::Int(2)])]);

            assert!(idx.has(&*txn, &[Value::Int(29)]).unwrap());
            assert!(!idx.has(&*txn, &[Value::Int(99)]).unwrap());

            let found = idx.get(&*txn, &[Value::Int(40)]).unwrap().unwrap();
            assert_eq!(found["name"], "J");
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }

    #[test]
    fn tups_keys_and_values_project_pairs() {
        let s = build_indexed_store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "people", "json", None, false).unwrap();
            coll.add_index(
                txn,
                "age",
                Box::new(|rec: &serde_json::Value| Ok(vec![vec![Value::Int(rec["age"].as_i64().unwrap())]])),
            )
            .unwrap();
            coll.put(txn, &json!({"name": "D", "age": 29}), PutOpts { key: Some(vec![Value::Int(1)]), ..Default::default() })
                .unwrap();
            coll.put(txn, &json!({"name": "J", "age": 40}), PutOpts { key: Some(vec![Value::Int(2)]), ..Default::default() })
                .unwrap();

            let (_, prefix) = coll.index_meta("age").unwrap();
            let idx = Index::new(&coll, "age", prefix);

            let tups: Vec<_> = idx.tups(&*txn, IndexArgs::all()).unwrap().collect::<Result<Vec<_>>>().unwrap();
            assert_eq!(tups, vec![vec![Value::Int(29)], vec![Value::Int(40)]]);

            let keys: Vec<_> = idx.keys(&*txn, IndexArgs::all()).unwrap().collect::<Result<Vec<_>>>().unwrap();
            assert_eq!(keys, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);

            let values: Vec<_> = idx.values(&*txn, IndexArgs::all()).unwrap().collect::<Result<Vec<_>>>().unwrap();
            assert_eq!(values[0]["name"], "D");
            assert_eq!(values[1]["name"], "J");
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }

    #[test]
    fn reverse_and_max_apply_under_a_prefix_bound() {
        let s = build_indexed_store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "people", "json", None, false).unwrap();
            coll.add_index(
                txn,
                "city_age",
                Box::new(|rec: &serde_json::Value| {
                    Ok(vec![vec![
                        Value::Text(rec["city"].as_str().unwrap().to_string()),
                        Value::Int(rec["age"].as_i64().unwrap()),
                    ]])
                }),
            )
            .unwrap();
            for (i, (city, age)) in [("nyc", 20), ("nyc", 30), ("nyc", 40), ("sf", 25)].iter().enumerate() {
                coll.put(
                    txn,
                    &json!({"city": city, "age": age}),
                    PutOpts { key: Some(vec![Value::Int(i as i64 + 1)]), ..Default::default() },
                )
                .unwrap();
            }

            let (_, prefix) = coll.index_meta("city_age").unwrap();
            let idx = Index::new(&coll, "city_age", prefix);

            // Under the "nyc" prefix, reverse order should yield the
            // highest-age entry first, and max should cap it at one —
            // both `reverse` and `max` must still apply even though the
            // bound came from `IndexArgs::prefix`, not `lo`/`hi`.
            let found = idx
                .pairs(&*txn, IndexArgs::prefix(&[Value::Text("nyc".into())]).reverse(true).max(1))
                .unwrap()
                .collect::<Result<Vec<_>>>()
                .unwrap();
            assert_eq!(
                found,
                vec![(vec![Value::Text("nyc".into()), Value::Int(40)], vec![Value::Int(3)])]
            );
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }

    #[test]
    fn stale_entry_is_skipped_by_items() {
        let s = build_indexed_store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "people", "json", None, false).unwrap();
            coll.add_index(
                txn,
                "age",
                Box::new(|rec: &serde_json::Value| Ok(vec![vec![Value::Int(rec["age"].as_i64().unwrap())]])),
            )
            .unwrap();
            let key = coll
                .put(txn, &json!({"name": "D", "age": 29}), PutOpts { key: Some(vec![Value::Int(1)]), ..Default::default() })
                .unwrap();

            let (_, prefix) = coll.index_meta("age").unwrap();
            // Simulate a stale index by deleting the record directly
            // without going through `Collection::delete` (which would
            // also retire the index entry).
            let full_key = coll.full_key(&key).unwrap();
            txn.delete(&full_key).unwrap();

            let idx = Index::new(&coll, "age", prefix);
            let items: Vec<_> = idx.items(&*txn, IndexArgs::all()).unwrap().collect::<Result<Vec<_>>>().unwrap();
            assert!(items.is_empty());
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }
}
