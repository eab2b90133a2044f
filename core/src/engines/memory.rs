//! Always-on in-memory engine backend. Not a deliverable in its own right —
//! it exists so the core and its test suite have a concrete `Engine` to run
//! against without pulling in `sled`/`rocksdb`, the reference instance that
//! exercises the contract directly.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;
use ruc::*;

use crate::engine::{Engine, EngineTxn, KvPair};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

pub struct MemoryEngine {
    data: Arc<RwLock<Map>>,
}

impl MemoryEngine {
    pub fn new() -> MemoryEngine {
        MemoryEngine {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        MemoryEngine::new()
    }
}

impl Engine for MemoryEngine {
    fn begin(&self, write: bool) -> Result<Box<dyn EngineTxn + '_>> {
        let snapshot = self.data.read().clone();
        Ok(Box::new(MemoryTxn {
            store: &self.data,
            write,
            snapshot,
            staged: BTreeMap::new(),
        }))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryTxn<'e> {
    store: &'e Arc<RwLock<Map>>,
    write: bool,
    snapshot: Map,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'e> MemoryTxn<'e> {
    fn current(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.staged.get(key) {
            Some(Some(v)) => Some(v.clone()),
            Some(None) => None,
            None => self.snapshot.get(key).cloned(),
        }
    }

    fn require_write(&self) -> Result<()> {
        if !self.write {
            return Err(eg!("write attempted on a read-only transaction"));
        }
        Ok(())
    }
}

impl<'e> EngineTxn for MemoryTxn<'e> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.current(key))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.require_write().c(d!())?;
        self.staged.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn replace(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.require_write().c(d!())?;
        let old = self.current(key);
        self.staged.insert(key.to_vec(), Some(value.to_vec()));
        Ok(old)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.require_write().c(d!())?;
        self.staged.insert(key.to_vec(), None);
        Ok(())
    }

    fn pop(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.require_write().c(d!())?;
        let old = self.current(key);
        self.staged.insert(key.to_vec(), None);
        Ok(old)
    }

    fn iter(&self, start: &[u8], reverse: bool) -> Result<Box<dyn Iterator<Item = KvPair> + '_>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.snapshot.clone();
        for (k, v) in self.staged.iter() {
            match v {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }

        let items: Vec<KvPair> = if reverse {
            merged
                .range((Bound::Unbounded, Bound::Included(start.to_vec())))
                .rev()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            merged
                .range((Bound::Included(start.to_vec()), Bound::Unbounded))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        Ok(Box::new(items.into_iter()))
    }

    fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        self.require_write().c(d!())?;
        let mut guard = self.store.write();
        for (k, v) in self.staged.into_iter() {
            match v {
                Some(v) => {
                    guard.insert(k, v);
                }
                None => {
                    guard.remove(&k);
                }
            }
        }
        Ok(())
    }
}
