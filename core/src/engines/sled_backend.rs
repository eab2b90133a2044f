//! `sled`-backed engine (feature `sled_engine`). A thin contract adapter:
//! sled's own tree already gives durable, thread-safe storage, so this
//! module's job is only to fit it to the `Engine`/`EngineTxn` shape and add
//! the write mutex, either engine-native or via an internal lock.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use ruc::*;
use sled::{Db, IVec};

use crate::engine::{Engine, EngineTxn, KvPair};

pub struct SledEngine {
    db: Db,
    write_lock: Mutex<()>,
}

impl SledEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<SledEngine> {
        let db = sled::open(path).c(d!())?;
        Ok(SledEngine {
            db,
            write_lock: Mutex::new(()),
        })
    }
}

impl Engine for SledEngine {
    fn begin(&self, write: bool) -> Result<Box<dyn EngineTxn + '_>> {
        Ok(Box::new(SledTxn {
            db: &self.db,
            write_lock: &self.write_lock,
            write,
            staged: BTreeMap::new(),
        }))
    }

    fn close(&self) -> Result<()> {
        self.db.flush().c(d!())?;
        Ok(())
    }
}

struct SledTxn<'e> {
    db: &'e Db,
    write_lock: &'e Mutex<()>,
    write: bool,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'e> SledTxn<'e> {
    fn require_write(&self) -> Result<()> {
        if !self.write {
            return Err(eg!("write attempted on a read-only transaction"));
        }
        Ok(())
    }
}

impl<'e> EngineTxn for SledTxn<'e> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.staged.get(key) {
            Some(v) => Ok(v.clone()),
            None => Ok(self.db.get(key).c(d!())?.map(|v| v.to_vec())),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.require_write().c(d!())?;
        self.staged.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn replace(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.require_write().c(d!())?;
        let old = self.get(key).c(d!())?;
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
        let old = self.get(key).c(d!())?;
        self.staged.insert(key.to_vec(), None);
        Ok(old)
    }

    fn iter(&self, start: &[u8], reverse: bool) -> Result<Box<dyn Iterator<Item = KvPair> + '_>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let range_iter: Box<dyn Iterator<Item = sled::Result<(IVec, IVec)>>> = if reverse {
            Box::new(self.db.range(..=start.to_vec()).rev())
        } else {
            Box::new(self.db.range(start.to_vec()..))
        };
        for item in range_iter {
            let (k, v) = item.c(d!())?;
            merged.insert(k.to_vec(), v.to_vec());
        }
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

        let mut items: Vec<KvPair> = merged.into_iter().collect();
        if reverse {
            items.retain(|(k, _)| k.as_slice() <= start);
            items.sort_by(|a, b| b.0.cmp(&a.0));
        } else {
            items.retain(|(k, _)| k.as_slice() >= start);
            items.sort_by(|a, b| a.0.cmp(&b.0));
        }
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
        let _guard = self.write_lock.lock().expect("sled write mutex poisoned");
        let mut batch = sled::Batch::default();
        for (k, v) in self.staged.into_iter() {
            match v {
                Some(v) => batch.insert(k, v),
                None => batch.remove(k),
            }
        }
        self.db.apply_batch(batch).c(d!())?;
        Ok(())
    }
}
