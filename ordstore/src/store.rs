//! The store: owns the engine, the transaction-context machinery, and the
//! reserved meta-collection that all numeric-id allocation and
//! collection/index/encoder registration is built on.
//!
//! Bootstrapping order matters: the meta-collection itself is *not*
//! allocated an id through the counter it hosts — it is pinned to
//! [`META_COLLECTION_ID`] so the counters have somewhere to live before
//! any id allocation can happen at all.

use std::collections::HashMap;

use ordstore_core::engine::{Engine, EngineTxn};
use ordstore_core::{pack_tuple, Value as TupleValue};
use parking_lot::Mutex;
use ruc::*;

use crate::compressor;
use crate::encoder::{self, RecordEncoder};
use crate::error::Error;
use crate::txn::{ScopeTracker, TaskLocalContext, ThreadLocalContext, TxnContext};

/// The fixed id of the meta-collection.
pub const META_COLLECTION_ID: u64 = 9;

/// Reserved counter names the store itself owns, namespaced with a leading
/// NUL so they can never collide with a user-chosen counter name.
const COUNTER_TABLE_IDX: &str = "\u{0}table_idx";
const COUNTER_ENCODER_IDX: &str = "\u{0}encoder_idx";

/// `kind` discriminant for a meta-collection row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Table = 0,
    Index = 1,
    Encoder = 2,
    Counter = 3,
    Struct = 4,
}

/// Outcome of a closure run under [`Store::transact`]: an explicit,
/// in-band way to cancel a transaction — Rust has no exception to catch
/// mid-closure, so the sentinel is a plain return value instead.
pub enum TxnOutcome<T> {
    Commit(T),
    Abort,
}

/// Per-collection metadata cached in memory after the first lookup in a
/// process, so meta rows don't need re-reading on every access.
#[derive(Debug, Clone)]
pub struct CollectionMeta {
    pub id: u64,
    pub name: String,
    pub encoder: String,
    pub blind: bool,
}

pub struct Store {
    engine: Box<dyn Engine>,
    ctx: Box<dyn TxnContext>,
    scopes: ScopeTracker,
    prefix: Vec<u8>,
    collections: Mutex<HashMap<String, CollectionMeta>>,
    encoder_ids: Mutex<HashMap<String, u64>>,
}

impl Store {
    /// Opens a store at `url` using the default thread-bound transaction
    /// context.
    pub fn open(url: &str) -> Result<Store> {
        Store::open_with_context(url, Box::new(ThreadLocalContext))
    }

    /// Opens a store whose transaction scope is bound to a cooperative
    /// task-local id rather than the OS thread.
    pub fn open_cooperative(url: &str) -> Result<Store> {
        Store::open_with_context(url, Box::new(TaskLocalContext))
    }

    pub fn open_with_context(url: &str, ctx: Box<dyn TxnContext>) -> Result<Store> {
        let engine = ordstore_core::engines::open(url).c(d!())?;
        let store = Store {
            engine,
            ctx,
            scopes: ScopeTracker::new(),
            prefix: Vec::new(),
            collections: Mutex::new(HashMap::new()),
            encoder_ids: Mutex::new(HashMap::new()),
        };
        store.bootstrap_builtin_encoders().c(d!())?;
        Ok(store)
    }

    fn bootstrap_builtin_encoders(&self) -> Result<()> {
        let mut ids = self.encoder_ids.lock();
        ids.insert("key".to_string(), u64::from(compressor::BUILTIN_ID_KEY));
        ids.insert("json".to_string(), u64::from(compressor::BUILTIN_ID_JSON));
        ids.insert("plain".to_string(), u64::from(compressor::BUILTIN_ID_PLAIN));
        ids.insert("zlib".to_string(), u64::from(compressor::BUILTIN_ID_ZLIB));
        Ok(())
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn meta_prefix(&self) -> Vec<u8> {
        let mut p = self.prefix.clone();
        p.extend_from_slice(&ordstore_core::varint::pack_uint(META_COLLECTION_ID));
        p
    }

    fn meta_key(&self, kind: MetaKind, name: &str, attr: &str) -> Result<Vec<u8>> {
        let tuple = vec![
            TupleValue::Int(kind as i64),
            TupleValue::Text(name.to_string()),
            TupleValue::Text(attr.to_string()),
        ];
        let mut key = self.meta_prefix();
        key.extend_from_slice(&pack_tuple(&tuple).map_err(Error::from).c(d!())?);
        Ok(key)
    }

    /// Reads one meta attribute for `(kind, name)`, or `None` if absent.
    pub fn get_meta(
        &self,
        txn: &dyn EngineTxn,
        kind: MetaKind,
        name: &str,
        attr: &str,
    ) -> Result<Option<serde_json::Value>> {
        let key = self.meta_key(kind, name, attr).c(d!())?;
        match txn.get(&key).c(d!())? {
            Some(bytes) => serde_json::from_slice(&bytes).c(d!()).map(Some),
            None => Ok(None),
        }
    }

    /// Writes one meta attribute for `(kind, name)`.
    pub fn set_meta(
        &self,
        txn: &mut dyn EngineTxn,
        kind: MetaKind,
        name: &str,
        attr: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        let key = self.meta_key(kind, name, attr).c(d!())?;
        let bytes = serde_json::to_vec(value).c(d!())?;
        txn.put(&key, &bytes).c(d!())
    }

    /// Atomic counter read-modify-write: returns the value *before* this
    /// call's increment, seeding unseen counters with `init`. `n == 0`
    /// performs a read with no write, and is therefore idempotent under
    /// retry.
    pub fn count(&self, txn: &mut dyn EngineTxn, name: &str, n: i64, init: i64) -> Result<i64> {
        let current = match self.get_meta(txn, MetaKind::Counter, name, "value").c(d!())? {
            Some(v) => v.as_i64().ok_or_else(|| eg!("counter value is not an integer"))?,
            None => init,
        };
        if n != 0 {
            self.set_meta(
                txn,
                MetaKind::Counter,
                name,
                "value",
                &serde_json::Value::from(current + n),
            )
            .c(d!())?;
        }
        Ok(current)
    }

    fn next_object_id(&self, txn: &mut dyn EngineTxn) -> Result<u64> {
        let old = self
            .count(txn, COUNTER_TABLE_IDX, 1, compressor::FIRST_USER_ID as i64)
            .c(d!())?;
        Ok(old as u64)
    }

    fn next_encoder_id(&self, txn: &mut dyn EngineTxn) -> Result<u64> {
        let old = self
            .count(txn, COUNTER_ENCODER_IDX, 1, compressor::FIRST_USER_ID as i64)
            .c(d!())?;
        Ok(old as u64)
    }

    /// Registers `encoder_name` if it isn't already known, returning its
    /// numeric id. Builtins (`key`/`json`/`plain`/`zlib`) resolve without
    /// touching storage at all.
    pub fn add_encoder(&self, txn: &mut dyn EngineTxn, encoder_name: &str) -> Result<u64> {
        if let Some(id) = self.encoder_ids.lock().get(encoder_name).copied() {
            return Ok(id);
        }
        let id = match self.get_meta(txn, MetaKind::Encoder, encoder_name, "id").c(d!())? {
            Some(v) => v.as_u64().ok_or_else(|| eg!("encoder id is not an integer"))?,
            None => {
                let id = self.next_encoder_id(txn).c(d!())?;
                self.set_meta(txn, MetaKind::Encoder, encoder_name, "id", &serde_json::Value::from(id))
                    .c(d!())?;
                id
            }
        };
        self.encoder_ids.lock().insert(encoder_name.to_string(), id);
        Ok(id)
    }

    /// Looks up a previously-registered encoder's name by id.
    pub fn get_encoder(&self, id: u64) -> Result<String> {
        let found = self
            .encoder_ids
            .lock()
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.clone());
        match found {
            Some(name) => Ok(name),
            None => Err(Error::NotFound(format!("no encoder registered with id {id}"))).c(d!()),
        }
    }

    /// Registers a collection, or verifies an existing registration
    /// agrees with the requested options: re-adding a collection with
    /// conflicting options is a config error, not a silent merge.
    pub fn add_collection(
        &self,
        txn: &mut dyn EngineTxn,
        name: &str,
        encoder_name: &str,
        blind: bool,
    ) -> Result<CollectionMeta> {
        if let Some(existing) = self.collections.lock().get(name).cloned() {
            if existing.encoder != encoder_name || existing.blind != blind {
                return Err(Error::Config(format!(
                    "collection {name:?}: encoder/blind disagree with prior registration"
                )))
                .c(d!());
            }
            return Ok(existing);
        }

        let meta = match self.get_meta(txn, MetaKind::Table, name, "id").c(d!())? {
            Some(id_val) => {
                let id = id_val.as_u64().ok_or_else(|| eg!("table id is not an integer"))?;
                let stored_encoder = self
                    .get_meta(txn, MetaKind::Table, name, "encoder")
                    .c(d!())?
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                let stored_blind = self
                    .get_meta(txn, MetaKind::Table, name, "blind")
                    .c(d!())?
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if stored_encoder != encoder_name || stored_blind != blind {
                    return Err(Error::Config(format!(
                        "collection {name:?}: attribute mismatch against stored metadata \
                         (encoder {stored_encoder:?} != {encoder_name:?} or blind {stored_blind} != {blind})"
                    )))
                    .c(d!());
                }
                CollectionMeta {
                    id,
                    name: name.to_string(),
                    encoder: encoder_name.to_string(),
                    blind,
                }
            }
            None => {
                let id = self.next_object_id(txn).c(d!())?;
                self.set_meta(txn, MetaKind::Table, name, "id", &serde_json::Value::from(id)).c(d!())?;
                self.set_meta(
                    txn,
                    MetaKind::Table,
                    name,
                    "encoder",
                    &serde_json::Value::String(encoder_name.to_string()),
                )
                .c(d!())?;
                self.set_meta(txn, MetaKind::Table, name, "blind", &serde_json::Value::Bool(blind))
                    .c(d!())?;
                CollectionMeta {
                    id,
                    name: name.to_string(),
                    encoder: encoder_name.to_string(),
                    blind,
                }
            }
        };

        self.add_encoder(txn, encoder_name).c(d!())?;
        self.collections.lock().insert(name.to_string(), meta.clone());
        Ok(meta)
    }

    /// Allocates an id for an index belonging to `collection`, sharing
    /// the same id counter collections draw from.
    pub fn add_index(&self, txn: &mut dyn EngineTxn, collection: &str, index_name: &str) -> Result<u64> {
        let qualified = format!("{collection}::{index_name}");
        match self.get_meta(txn, MetaKind::Index, &qualified, "id").c(d!())? {
            Some(v) => v.as_u64().ok_or_else(|| eg!("index id is not an integer")),
            None => {
                let id = self.next_object_id(txn).c(d!())?;
                self.set_meta(txn, MetaKind::Index, &qualified, "id", &serde_json::Value::from(id))
                    .c(d!())?;
                Ok(id)
            }
        }
    }

    /// Renames a collection in place.
    pub fn rename_collection(&self, txn: &mut dyn EngineTxn, old: &str, new: &str) -> Result<()> {
        if self.get_meta(txn, MetaKind::Table, new, "id").c(d!())?.is_some() {
            return Err(Error::NameInUse(format!("collection {new:?} already exists"))).c(d!());
        }
        let Some(meta) = self.collections.lock().get(old).cloned() else {
            return Err(Error::NotFound(format!("collection {old:?} is not registered"))).c(d!());
        };
        self.set_meta(txn, MetaKind::Table, new, "id", &serde_json::Value::from(meta.id)).c(d!())?;
        self.set_meta(
            txn,
            MetaKind::Table,
            new,
            "encoder",
            &serde_json::Value::String(meta.encoder.clone()),
        )
        .c(d!())?;
        self.set_meta(txn, MetaKind::Table, new, "blind", &serde_json::Value::Bool(meta.blind)).c(d!())?;

        for attr in ["id", "encoder", "blind"] {
            let key = self.meta_key(MetaKind::Table, old, attr).c(d!())?;
            txn.delete(&key).c(d!())?;
        }

        let mut collections = self.collections.lock();
        collections.remove(old);
        collections.insert(new.to_string(), CollectionMeta { name: new.to_string(), ..meta });
        Ok(())
    }

    /// Runs `f` inside a transaction scoped to the caller's current
    /// task/thread. Returns `Ok(None)` if `f` chose [`TxnOutcome::Abort`];
    /// the underlying engine transaction is aborted either way an error or
    /// an `Abort` outcome is produced.
    pub fn transact<T>(
        &self,
        write: bool,
        f: impl FnOnce(&mut dyn EngineTxn) -> Result<TxnOutcome<T>>,
    ) -> Result<Option<T>> {
        let scope = self.ctx.current_scope();
        let _guard = self
            .scopes
            .acquire(scope)
            .ok_or_else(|| eg!(Error::Txn("a transaction is already open on this scope".into())))?;

        let mut txn = self.engine.begin(write).c(d!())?;
        match f(&mut *txn) {
            Ok(TxnOutcome::Commit(value)) => {
                txn.commit().c(d!())?;
                Ok(Some(value))
            }
            Ok(TxnOutcome::Abort) => {
                txn.abort().c(d!())?;
                Ok(None)
            }
            Err(e) => {
                let _ = txn.abort();
                Err(e)
            }
        }
    }

    pub(crate) fn resolve_record_encoder(&self, name: &str) -> Result<Box<dyn RecordEncoder>> {
        encoder::by_name(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn store() -> Store {
        Store::open("mem:/").unwrap()
    }

    #[test]
    fn builtin_encoders_resolve_without_a_transaction() {
        let s = store();
        assert_eq!(s.encoder_ids.lock().get("json").copied(), Some(2));
        assert_eq!(s.encoder_ids.lock().get("plain").copied(), Some(3));
    }

    #[test]
    fn count_returns_old_value_and_seeds_with_init() {
        let s = store();
        let got = s
            .transact(true, |txn| {
                let a = s.count(txn, "widgets", 1, 10).c(d!())?;
                let b = s.count(txn, "widgets", 1, 10).c(d!())?;
                Ok(TxnOutcome::Commit((a, b)))
            })
            .unwrap()
            .unwrap();
        assert_eq!(got, (10, 11));
    }

    #[test]
    fn count_with_zero_delta_is_read_only() {
        let s = store();
        let got = s
            .transact(true, |txn| {
                let a = s.count(txn, "widgets", 0, 5).c(d!())?;
                let b = s.count(txn, "widgets", 0, 5).c(d!())?;
                Ok(TxnOutcome::Commit((a, b)))
            })
            .unwrap()
            .unwrap();
        assert_eq!(got, (5, 5));
    }

    #[test]
    fn add_collection_allocates_ids_starting_at_ten() {
        let s = store();
        let (a, b) = s
            .transact(true, |txn| {
                let a = s.add_collection(txn, "people", "json", false).c(d!())?;
                let b = s.add_collection(txn, "pets", "json", false).c(d!())?;
                Ok(TxnOutcome::Commit((a, b)))
            })
            .unwrap()
            .unwrap();
        assert_eq!(a.id, 10);
        assert_eq!(b.id, 11);
    }

    #[test]
    fn add_collection_is_idempotent_for_matching_options() {
        let s = store();
        s.transact(true, |txn| {
            s.add_collection(txn, "people", "json", false).c(d!())?;
            let again = s.add_collection(txn, "people", "json", false).c(d!())?;
            assert_eq!(again.id, 10);
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }

    #[test]
    fn add_collection_rejects_conflicting_reregistration() {
        let s = store();
        let err = s.transact(true, |txn| {
            s.add_collection(txn, "people", "json", false).c(d!())?;
            s.collections.lock().clear();
            s.add_collection(txn, "people", "json", true).c(d!())?;
            Ok(TxnOutcome::Commit(()))
        });
        assert!(err.is_err());
    }

    #[test]
    fn transact_rejects_reentry_on_the_same_scope() {
        let s = store();
        let result = s.transact(true, |_txn| {
            let inner = s.transact(true, |_txn2| Ok(TxnOutcome::Commit(())));
            assert!(inner.is_err());
            Ok(TxnOutcome::Commit(()))
        });
        assert!(result.unwrap().is_some());
    }

    #[test]
    fn abort_outcome_yields_none_and_discards_writes() {
        let s = store();
        s.transact(true, |txn| -> Result<TxnOutcome<()>> {
            s.add_collection(txn, "ghost", "json", false).c(d!())?;
            Ok(TxnOutcome::Abort)
        })
        .unwrap();
        assert!(!s.collections.lock().contains_key("ghost"));
    }
}
