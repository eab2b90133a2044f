//! `rocksdb`-backed engine (feature `rocks_engine`). Uses a real
//! [`rocksdb::Snapshot`] for read isolation and a [`rocksdb::WriteBatch`] for
//! atomic commit.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use ruc::*;
use rocksdb::{Direction, IteratorMode, Options, ReadOptions, WriteBatch, DB};

use crate::engine::{Engine, EngineTxn, KvPair};

pub struct RocksEngine {
    db: DB,
    write_lock: Mutex<()>,
}

impl RocksEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<RocksEngine> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).c(d!())?;
        Ok(RocksEngine {
            db,
            write_lock: Mutex::new(()),
        })
    }
}

impl Engine for RocksEngine {
    fn begin(&self, write: bool) -> Result<Box<dyn EngineTxn + '_>> {
        Ok(Box::new(RocksTxn {
            db: &self.db,
            write_lock: &self.write_lock,
            write,
            snapshot: self.db.snapshot(),
            staged: BTreeMap::new(),
        }))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct RocksTxn<'e> {
    db: &'e DB,
    write_lock: &'e Mutex<()>,
    write: bool,
    snapshot: rocksdb::SnapshotWithThreadMode<'e, DB>,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'e> RocksTxn<'e> {
    fn require_write(&self) -> Result<()> {
        if !self.write {
            return Err(eg!("write attempted on a read-only transaction"));
        }
        Ok(())
    }
}

impl<'e> EngineTxn for RocksTxn<'e> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.staged.get(key) {
            Some(v) => Ok(v.clone()),
            None => Ok(self.snapshot.get(key).c(d!())?),
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
        let mut ro = ReadOptions::default();
        ro.set_snapshot(&self.snapshot);
        let mode = if reverse {
            IteratorMode::From(start, Direction::Reverse)
        } else {
            IteratorMode::From(start, Direction::Forward)
        };

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for item in self.db.iterator_opt(mode, ro) {
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
        let _guard = self.write_lock.lock().expect("rocksdb write mutex poisoned");
        let mut batch = WriteBatch::default();
        for (k, v) in self.staged.into_iter() {
            match v {
                Some(v) => batch.put(k, v),
                None => batch.delete(k),
            }
        }
        self.db.write(batch).c(d!())?;
        Ok(())
    }
}
