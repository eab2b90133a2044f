//! Trace wrapper: duplicates every engine call to a text log, one line per
//! call, keyed by a monotonic transaction id.
//!
//! Log line format: space-separated fields `<txn_id> <op> <key_hex>
//! <value_hex>`, newline-terminated. `key_hex`/`value_hex` are empty when
//! not applicable. Operation identifiers: `begin`, `get`, `got`, `put`,
//! `delete`, `abort`, `commit`, `close`, `iter`.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ruc::*;

use crate::engine::{Engine, EngineTxn, KvPair};

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

struct Log {
    file: Mutex<File>,
    next_txn_id: AtomicU64,
}

impl Log {
    fn line(&self, txn_id: u64, op: &str, key: &str, value: &str) {
        let mut f = self.file.lock().expect("trace log mutex poisoned");
        let _ = writeln!(f, "{txn_id} {op} {key} {value}");
    }
}

/// Wraps any [`Engine`] implementation, logging every call to `trace_path`,
/// a filesystem path overwritten with a fresh trace log on construction.
pub struct TraceEngine<E: Engine> {
    inner: E,
    log: Log,
}

impl<E: Engine> TraceEngine<E> {
    pub fn new(inner: E, trace_path: impl AsRef<Path>) -> Result<TraceEngine<E>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(trace_path)
            .c(d!())?;
        Ok(TraceEngine {
            inner,
            log: Log {
                file: Mutex::new(file),
                next_txn_id: AtomicU64::new(1),
            },
        })
    }
}

impl<E: Engine> Engine for TraceEngine<E> {
    fn begin(&self, write: bool) -> Result<Box<dyn EngineTxn + '_>> {
        let txn_id = self.log.next_txn_id.fetch_add(1, Ordering::SeqCst);
        self.log.line(txn_id, "begin", if write { "True" } else { "False" }, "");
        let inner = self.inner.begin(write).c(d!())?;
        Ok(Box::new(TraceTxn {
            inner,
            log: &self.log,
            txn_id,
        }))
    }

    fn close(&self) -> Result<()> {
        self.log.line(1, "close", "", "");
        self.inner.close().c(d!())
    }
}

struct TraceTxn<'e> {
    inner: Box<dyn EngineTxn + 'e>,
    log: &'e Log,
    txn_id: u64,
}

impl<'e> EngineTxn for TraceTxn<'e> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.log.line(self.txn_id, "get", &hex(key), "");
        let v = self.inner.get(key).c(d!())?;
        let logged = v.as_deref().map(hex).unwrap_or_else(|| "None".to_string());
        self.log.line(self.txn_id, "got", &hex(key), &logged);
        Ok(v)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.log.line(self.txn_id, "put", &hex(key), &hex(value));
        self.inner.put(key, value).c(d!())
    }

    fn replace(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.log.line(self.txn_id, "put", &hex(key), &hex(value));
        self.inner.replace(key, value).c(d!())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.log.line(self.txn_id, "delete", &hex(key), "");
        self.inner.delete(key).c(d!())
    }

    fn pop(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.log.line(self.txn_id, "delete", &hex(key), "");
        self.inner.pop(key).c(d!())
    }

    fn iter(&self, start: &[u8], reverse: bool) -> Result<Box<dyn Iterator<Item = KvPair> + '_>> {
        self.log.line(
            self.txn_id,
            "iter",
            &hex(start),
            if reverse { "True" } else { "False" },
        );
        self.inner.iter(start, reverse).c(d!())
    }

    fn abort(self: Box<Self>) -> Result<()> {
        self.log.line(self.txn_id, "abort", "", "");
        self.inner.abort().c(d!())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        self.log.line(self.txn_id, "commit", "", "");
        self.inner.commit().c(d!())
    }
}
