//! Logical record collection: CRUD over a single store prefix,
//! encoder/compressor routing, secondary index maintenance, and batch
//! compaction/splitting.
//!
//! A `Collection` borrows its owning [`Store`] rather than caching an owned
//! copy of it: collections are resolved as an arena owned by the store, and
//! each collection holds a non-owning handle back to it.

use std::collections::HashMap;

use ordstore_core::engine::EngineTxn;
use ordstore_core::{pack_tuple, packs, unpack_tuple, Value};
use parking_lot::Mutex;
use ruc::*;

use crate::batch_iter::{BatchIter, BatchIterBuilder};
use crate::compressor;
use crate::encoder::RecordEncoder;
use crate::error::Error;
use crate::store::Store;

/// Produces the key tuple a record is filed under. Boxed so a collection
/// can be constructed either with a user function or the default
/// counter-backed assignment.
pub type KeyFunc = Box<dyn Fn(&serde_json::Value) -> Result<Vec<Value>> + Send + Sync>;

/// Produces zero or more index tuples for a record. An empty result means
/// the record contributes no entry to this index.
pub type IndexFunc = Box<dyn Fn(&serde_json::Value) -> Result<Vec<Vec<Value>>> + Send + Sync>;

struct IndexDef {
    id: u64,
    prefix: Vec<u8>,
    func: IndexFunc,
}

/// Options accepted by [`Collection::put`].
#[derive(Default)]
pub struct PutOpts {
    pub packer: Option<&'static str>,
    pub key: Option<Vec<Value>>,
    pub blind: bool,
}

pub struct Collection<'s> {
    store: &'s Store,
    name: String,
    id: u64,
    prefix: Vec<u8>,
    encoder: Box<dyn RecordEncoder>,
    key_func: Option<KeyFunc>,
    counter_name: String,
    /// The value the caller requested at construction, independent of
    /// whether a custom `key_func` is supplied; further overridable per-call
    /// via [`PutOpts::blind`] or permanently via [`Collection::set_blind`].
    blind: Mutex<bool>,
    indexes: Mutex<HashMap<String, IndexDef>>,
}

impl<'s> Collection<'s> {
    /// Registers (or re-opens) a collection named `name`, storing values
    /// with record encoder `encoder_name`.
    ///
    /// `key_func = None` selects the default counter-backed key assignment;
    /// `key_func = Some(_)` uses a caller-supplied one. Either way `blind` is
    /// used exactly as given — a default key function never collides with
    /// itself, but an explicit `PutOpts::key` override can still replace an
    /// existing record under a default-keyed collection, so blindness is not
    /// inferred from `key_func`'s presence.
    pub fn open(
        store: &'s Store,
        txn: &mut dyn EngineTxn,
        name: &str,
        encoder_name: &str,
        key_func: Option<KeyFunc>,
        blind: bool,
    ) -> Result<Collection<'s>> {
        let meta = store.add_collection(txn, name, encoder_name, blind).c(d!())?;
        let encoder = store.resolve_record_encoder(encoder_name).c(d!())?;
        let mut prefix = store.prefix().to_vec();
        prefix.extend_from_slice(&ordstore_core::varint::pack_uint(meta.id));
        Ok(Collection {
            store,
            name: name.to_string(),
            id: meta.id,
            prefix,
            encoder,
            key_func,
            counter_name: format!("key:{name}"),
            blind: Mutex::new(blind),
            indexes: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Sets the default blind-write behaviour: rejected with
    /// [`Error::Constraint`] unless the collection currently has no
    /// indexes, since flipping it on a collection with live indexes can
    /// silently desynchronize them — this forbids that outright rather
    /// than allow a silent corruption path.
    pub fn set_blind(&self, blind: bool) -> Result<()> {
        if blind && !self.indexes.lock().is_empty() {
            return Err(Error::Constraint(
                "set_blind(true) on a collection with live indexes would desynchronize them; \
                 remove the indexes first or rebuild them after"
                    .into(),
            ))
            .c(d!());
        }
        *self.blind.lock() = blind;
        Ok(())
    }

    /// Associates an index with the collection. May only be called once
    /// per unique `name` on a given `Collection`
    /// instance; only the index's metadata (its id) is persisted; the
    /// function itself must be supplied identically every time the
    /// collection is reopened.
    pub fn add_index(&self, txn: &mut dyn EngineTxn, name: &str, func: IndexFunc) -> Result<()> {
        let mut indexes = self.indexes.lock();
        if indexes.contains_key(name) {
            return Err(Error::NameInUse(format!("index {name:?} already added to this collection"))).c(d!());
        }
        let id = self.store.add_index(txn, &self.name, name).c(d!())?;
        let mut prefix = self.store.prefix().to_vec();
        prefix.extend_from_slice(&ordstore_core::varint::pack_uint(id));
        indexes.insert(name.to_string(), IndexDef { id, prefix, func });
        Ok(())
    }

    /// Look up a previously-[`add_index`](Self::add_index)ed index's id and
    /// byte prefix for building an [`crate::index::Index`] query handle.
    pub(crate) fn index_meta(&self, name: &str) -> Option<(u64, Vec<u8>)> {
        self.indexes.lock().get(name).map(|d| (d.id, d.prefix.clone()))
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.lock().contains_key(name)
    }

    /// Returns a query handle for a previously-[`add_index`](Self::add_index)ed
    /// index, or `None` if no index of that name has been added to this
    /// `Collection` instance.
    pub fn index(&self, name: &str) -> Option<crate::index::Index<'_, 's>> {
        let (_, prefix) = self.index_meta(name)?;
        Some(crate::index::Index::new(self, name, prefix))
    }

    fn has_any_index(&self) -> bool {
        !self.indexes.lock().is_empty()
    }

    pub(crate) fn full_key(&self, key: &[Value]) -> Result<Vec<u8>> {
        let mut out = self.prefix.clone();
        out.extend_from_slice(&pack_tuple(key).map_err(Error::from).c(d!())?);
        Ok(out)
    }

    fn key_from_full(&self, full: &[u8]) -> Result<Vec<Value>> {
        let tail = full
            .strip_prefix(self.prefix.as_slice())
            .ok_or(Error::PrefixMismatch)
            .c(d!())?;
        let (values, _) = unpack_tuple(tail, 0).map_err(Error::from).c(d!())?;
        Ok(values)
    }

    /// All engine keys (empty-valued) an index entry for `rec` filed under
    /// `key` expands to, across every index currently attached (spec
    /// §4.F.1 step 4, §3's "Index entry").
    fn index_entries(&self, key: &[Value], rec: &serde_json::Value) -> Result<Vec<Vec<u8>>> {
        let indexes = self.indexes.lock();
        let mut out = Vec::new();
        for def in indexes.values() {
            for tuple in (def.func)(rec).c(d!())? {
                let mut entry = def.prefix.clone();
                entry.extend_from_slice(&packs(&[&tuple, key]).map_err(Error::from).c(d!())?);
                out.push(entry);
            }
        }
        Ok(out)
    }

    fn compute_key(&self, txn: &mut dyn EngineTxn, rec: &serde_json::Value) -> Result<Vec<Value>> {
        match &self.key_func {
            Some(f) => f(rec).c(d!()),
            None => {
                let n = self.store.count(txn, &self.counter_name, 1, 1).c(d!())?;
                Ok(vec![Value::Int(n)])
            }
        }
    }

    /// If `key`'s physical record is currently a batch, explode it to
    /// singletons first: every mutation path must observe a singleton
    /// before touching a logical key, regardless of indexes or blindness —
    /// otherwise a fresh `put` would coexist with the stale batch copy of
    /// the same key, and one logical record would end up backed by two
    /// physical records.
    fn ensure_singleton(&self, txn: &mut dyn EngineTxn, key: &[Value]) -> Result<()> {
        let full_key = self.full_key(key).c(d!())?;
        let in_batch = {
            let mut it = BatchIterBuilder::new(self.prefix.clone())
                .set_exact(full_key)
                .run(&*txn)
                .c(d!())?;
            match it.next() {
                None => false,
                Some(hit) => {
                    hit.c(d!())?;
                    it.batch_items().map(|m| m.len()).unwrap_or(1) > 1
                }
            }
        };
        if in_batch {
            self.split_batch(txn, key).c(d!())?;
        }
        Ok(())
    }

    /// Explodes the batch physical record containing `key` into singleton
    /// physical records for every *other* member, deleting the batch
    /// itself. `key`'s own slot is left empty — the caller (`put`/`delete`)
    /// is responsible for what happens to it next.
    fn split_batch(&self, txn: &mut dyn EngineTxn, key: &[Value]) -> Result<()> {
        let full_key = self.full_key(key).c(d!())?;
        let (phys_key, members) = {
            let mut it = BatchIterBuilder::new(self.prefix.clone())
                .set_exact(full_key.clone())
                .run(&*txn)
                .c(d!())?;
            match it.next() {
                Some(hit) => {
                    hit.c(d!())?;
                    let phys_key = it
                        .current_phys_key()
                        .ok_or_else(|| eg!("batch iterator lost its current physical key"))?
                        .to_vec();
                    let members = it
                        .batch_items()
                        .ok_or_else(|| eg!("batch iterator lost its current members"))?
                        .to_vec();
                    (phys_key, members)
                }
                None => {
                    return Err(Error::NotFound(format!(
                        "split_batch: no physical record contains key {key:?}"
                    )))
                    .c(d!())
                }
            }
        };

        txn.delete(&phys_key).c(d!())?;
        for (member_key, data) in members {
            if member_key != full_key {
                let mut value = vec![compressor::BUILTIN_ID_PLAIN];
                value.extend_from_slice(&data);
                txn.put(&member_key, &value).c(d!())?;
            }
        }
        Ok(())
    }

    /// Creates or overwrites a record.
    pub fn put(&self, txn: &mut dyn EngineTxn, rec: &serde_json::Value, opts: PutOpts) -> Result<Vec<Value>> {
        let key = match opts.key {
            Some(k) => k,
            None => self.compute_key(txn, rec).c(d!())?,
        };

        let packer_name = opts.packer.unwrap_or("plain");
        let packer_id = self.store.add_encoder(txn, packer_name).c(d!())? as u8;

        self.ensure_singleton(txn, &key).c(d!())?;

        let blind = opts.blind || *self.blind.lock();
        if self.has_any_index() {
            if !blind {
                self.delete(txn, &key).c(d!())?;
            }
            for entry in self.index_entries(&key, rec).c(d!())? {
                txn.put(&entry, b"").c(d!())?;
            }
        }

        let packed = self.encoder.pack(rec).c(d!())?;
        let compressed = compressor::by_id(packer_id).c(d!())?.compress(&packed).c(d!())?;
        let mut value = Vec::with_capacity(1 + compressed.len());
        value.push(packer_id);
        value.extend_from_slice(&compressed);

        let full_key = self.full_key(&key).c(d!())?;
        txn.put(&full_key, &value).c(d!())?;
        Ok(key)
    }

    /// Deletes any record filed under `key`, retiring its index entries
    /// first. A no-op if `key` does not currently exist.
    pub fn delete(&self, txn: &mut dyn EngineTxn, key: &[Value]) -> Result<()> {
        let full_key = self.full_key(key).c(d!())?;
        let hit = {
            let mut it = BatchIterBuilder::new(self.prefix.clone())
                .set_exact(full_key.clone())
                .run(&*txn)
                .c(d!())?;
            match it.next() {
                None => None,
                Some(r) => {
                    let (_, data) = r.c(d!())?;
                    let in_batch = it.batch_items().map(|m| m.len()).unwrap_or(1) > 1;
                    Some((data, in_batch))
                }
            }
        };

        let Some((data, in_batch)) = hit else {
            return Ok(());
        };

        if self.has_any_index() {
            let obj = self.encoder.unpack(&data).c(d!())?;
            for entry in self.index_entries(key, &obj).c(d!())? {
                txn.delete(&entry).c(d!())?;
            }
        }

        if in_batch {
            self.split_batch(txn, key).c(d!())?;
        } else {
            txn.delete(&full_key).c(d!())?;
        }
        Ok(())
    }

    /// Fetches the record filed under `key`, or `None` if absent.
    pub fn get(&self, txn: &dyn EngineTxn, key: &[Value]) -> Result<Option<serde_json::Value>> {
        let full_key = self.full_key(key).c(d!())?;
        let mut it = BatchIterBuilder::new(self.prefix.clone())
            .set_exact(full_key)
            .run(txn)
            .c(d!())?;
        match it.next() {
            None => Ok(None),
            Some(r) => {
                let (_, data) = r.c(d!())?;
                self.encoder.unpack(&data).c(d!()).map(Some)
            }
        }
    }

    /// Starts building a range query over this collection's records,
    /// backed by the batch iterator so batched and singleton records look
    /// identical to the caller.
    pub fn query(&self) -> CollectionQuery<'_, 's> {
        CollectionQuery {
            coll: self,
            inner: BatchIterBuilder::new(self.prefix.clone()),
        }
    }

    /// Rewrites the key range `[lo, hi]` into batches. At least one of
    /// `max_recs`/`max_bytes` must be set.
    /// Returns `(found, made, last_key)`: the number of records combined,
    /// the number of physical batch records produced, and the key the
    /// iterator stopped at (for resuming compaction across transactions
    /// via a subsequent call's `lo`).
    #[allow(clippy::too_many_arguments)]
    pub fn batch(&self, txn: &mut dyn EngineTxn, opts: BatchOpts) -> Result<BatchOutcome> {
        if opts.max_keylen.is_some() {
            return Err(Error::Unimplemented("Collection::batch's max_keylen")).c(d!());
        }
        if opts.max_recs.is_none() && opts.max_bytes.is_none() {
            return Err(Error::Config("batch() requires max_recs and/or max_bytes".into())).c(d!());
        }
        let packer_name = opts.packer.unwrap_or("plain");
        let packer_id = self.store.add_encoder(txn, packer_name).c(d!())? as u8;

        let mut builder = BatchIterBuilder::new(self.prefix.clone());
        if let Some(lo) = &opts.lo {
            builder = builder.set_lo(self.full_key(lo).c(d!())?, true);
        }
        if let Some(hi) = &opts.hi {
            builder = builder.set_hi(self.full_key(hi).c(d!())?, true);
        }
        if let Some(p) = &opts.prefix {
            builder = builder.set_prefix(self.full_key(p).c(d!())?);
        }
        if let Some(n) = opts.max_phys {
            builder = builder.set_max_phys(n);
        }

        let mut found = 0usize;
        let mut made = 0usize;
        let mut last_key: Option<Vec<u8>> = None;
        let mut items: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut group_val: Option<serde_json::Value> = None;

        {
            let mut it = builder.run(&*txn).c(d!())?;
            loop {
                let Some(next) = it.next() else { break };
                let (member_key, data) = next.c(d!())?;
                last_key = Some(member_key.clone());
                let currently_batched = it.batch_items().map(|m| m.len()).unwrap_or(1) > 1;

                if opts.preserve && currently_batched {
                    made += (!items.is_empty()) as usize;
                    flush_items(txn, &self.prefix, &mut items, packer_id).c(d!())?;
                    continue;
                }

                found += 1;
                txn.delete(&member_key).c(d!())?;
                items.push((member_key.clone(), data));

                let mut flushed = false;
                if let Some(max_bytes) = opts.max_bytes {
                    let encoded = encode_batch(&self.prefix, &items, packer_id).c(d!())?;
                    if encoded.len() > max_bytes {
                        let popped = items.pop();
                        if !items.is_empty() {
                            made += 1;
                            write_batch(txn, &self.prefix, &items, packer_id).c(d!())?;
                        }
                        items.clear();
                        if let Some(p) = popped {
                            items.push(p);
                        }
                        flushed = true;
                    }
                }

                if !flushed {
                    let mut done = opts.max_recs.is_some_and(|m| items.len() == m);
                    if !done {
                        if let Some(grouper) = &opts.grouper {
                            let rec = self.encoder.unpack(&items.last().unwrap().1).c(d!())?;
                            let val = grouper(&rec).c(d!())?;
                            done = group_val.as_ref() != Some(&val);
                            group_val = Some(val);
                        }
                    }
                    if done {
                        made += (!items.is_empty()) as usize;
                        flush_items(txn, &self.prefix, &mut items, packer_id).c(d!())?;
                    }
                }
            }
        }

        made += (!items.is_empty()) as usize;
        flush_items(txn, &self.prefix, &mut items, packer_id).c(d!())?;

        let last_key = last_key.map(|k| self.key_from_full(&k)).transpose().c(d!())?;
        Ok(BatchOutcome { found, made, last_key })
    }
}

fn flush_items(txn: &mut dyn EngineTxn, prefix: &[u8], items: &mut Vec<(Vec<u8>, Vec<u8>)>, packer_id: u8) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    write_batch(txn, prefix, items, packer_id).c(d!())?;
    items.clear();
    Ok(())
}

fn write_batch(txn: &mut dyn EngineTxn, prefix: &[u8], items: &[(Vec<u8>, Vec<u8>)], packer_id: u8) -> Result<()> {
    let (phys_key, value) = prepare_batch(prefix, items, packer_id).c(d!())?;
    txn.put(&phys_key, &value).c(d!())
}

fn encode_batch(prefix: &[u8], items: &[(Vec<u8>, Vec<u8>)], packer_id: u8) -> Result<Vec<u8>> {
    prepare_batch(prefix, items, packer_id).map(|(_, v)| v)
}

/// Builds a single physical (key, value) pair for `items`, the members in
/// *ascending* key order as accumulated by `batch()`. A batch's member
/// keys are packed in the engine key in descending order (highest first),
/// so `items` is reversed before packing.
fn prepare_batch(prefix: &[u8], items: &[(Vec<u8>, Vec<u8>)], packer_id: u8) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut tuples = Vec::with_capacity(items.len());
    for (full_key, _) in items.iter().rev() {
        let tail = full_key.strip_prefix(prefix).ok_or(Error::PrefixMismatch).c(d!())?;
        let (values, _) = unpack_tuple(tail, 0).map_err(Error::from).c(d!())?;
        tuples.push(values);
    }
    let refs: Vec<&[Value]> = tuples.iter().map(|t| t.as_slice()).collect();
    let mut phys_key = prefix.to_vec();
    phys_key.extend_from_slice(&packs(&refs).map_err(Error::from).c(d!())?);

    let compressor = compressor::by_id(packer_id).c(d!())?;
    let mut value = Vec::new();
    if items.len() == 1 {
        value.push(packer_id);
        value.extend_from_slice(&compressor.compress(&items[0].1).c(d!())?);
    } else {
        value.extend_from_slice(&ordstore_core::varint::pack_uint(items.len() as u64));
        for (_, data) in items {
            value.extend_from_slice(&ordstore_core::varint::pack_uint(data.len() as u64));
        }
        value.push(packer_id);
        let concat: Vec<u8> = items.iter().flat_map(|(_, d)| d.clone()).collect();
        value.extend_from_slice(&compressor.compress(&concat).c(d!())?);
    }
    Ok((phys_key, value))
}

/// Options accepted by [`Collection::batch`].
#[derive(Default)]
pub struct BatchOpts {
    pub lo: Option<Vec<Value>>,
    pub hi: Option<Vec<Value>>,
    pub prefix: Option<Vec<Value>>,
    pub max_recs: Option<usize>,
    pub max_bytes: Option<usize>,
    /// Declared but unimplemented pending a concrete format: always
    /// rejected with [`Error::Unimplemented`] when set.
    pub max_keylen: Option<usize>,
    pub preserve: bool,
    pub packer: Option<&'static str>,
    pub max_phys: Option<usize>,
    pub grouper: Option<Box<dyn Fn(&serde_json::Value) -> Result<serde_json::Value> + Send + Sync>>,
}

impl BatchOpts {
    pub fn new() -> BatchOpts {
        BatchOpts {
            preserve: true,
            ..Default::default()
        }
    }
}

/// Outcome of a [`Collection::batch`] call.
pub struct BatchOutcome {
    pub found: usize,
    pub made: usize,
    pub last_key: Option<Vec<Value>>,
}

/// Builds a [`CollectionItems`] query over a collection's records, mirroring
/// [`BatchIterBuilder`]'s bound-setting methods one level up (full logical
/// keys in, decoded records out).
pub struct CollectionQuery<'c, 's> {
    coll: &'c Collection<'s>,
    inner: BatchIterBuilder,
}

impl<'c, 's> CollectionQuery<'c, 's> {
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.inner = self.inner.reverse(reverse);
        self
    }

    pub fn lo(mut self, key: &[Value], closed: bool) -> Result<Self> {
        self.inner = self.inner.set_lo(self.coll.full_key(key).c(d!())?, closed);
        Ok(self)
    }

    pub fn hi(mut self, key: &[Value], closed: bool) -> Result<Self> {
        self.inner = self.inner.set_hi(self.coll.full_key(key).c(d!())?, closed);
        Ok(self)
    }

    /// All records whose key tuple starts with `key` (a partial tuple is
    /// fine: tuple elements are packed with no separator between them, so
    /// a prefix of fewer elements is also a valid byte prefix).
    pub fn prefix(mut self, key: &[Value]) -> Result<Self> {
        self.inner = self.inner.set_prefix(self.coll.full_key(key).c(d!())?);
        Ok(self)
    }

    pub fn exact(mut self, key: &[Value]) -> Result<Self> {
        self.inner = self.inner.set_exact(self.coll.full_key(key).c(d!())?);
        Ok(self)
    }

    pub fn max(mut self, n: usize) -> Self {
        self.inner = self.inner.set_max(n);
        self
    }

    pub fn max_phys(mut self, n: usize) -> Self {
        self.inner = self.inner.set_max_phys(n);
        self
    }

    pub fn run<'t>(self, txn: &'t dyn EngineTxn) -> Result<CollectionItems<'c, 's, 't>> {
        Ok(CollectionItems {
            coll: self.coll,
            inner: self.inner.run(txn).c(d!())?,
        })
    }

    /// Yields just the keys, in the same order `run` would.
    pub fn keys<'t>(self, txn: &'t dyn EngineTxn) -> Result<CollectionKeys<'c, 's, 't>> {
        Ok(CollectionKeys(self.run(txn).c(d!())?))
    }

    /// Yields just the decoded records, in the same order `run` would.
    pub fn values<'t>(self, txn: &'t dyn EngineTxn) -> Result<CollectionValues<'c, 's, 't>> {
        Ok(CollectionValues(self.run(txn).c(d!())?))
    }

    /// The first matching `(key, record)` pair, or `None`.
    pub fn find(self, txn: &dyn EngineTxn) -> Result<Option<(Vec<Value>, serde_json::Value)>> {
        let mut it = self.max(1).run(txn).c(d!())?;
        it.next().transpose().c(d!())
    }
}

/// Yields `(key, record)` pairs in key order, decoding each physical value
/// through the collection's record encoder.
pub struct CollectionItems<'c, 's, 't> {
    coll: &'c Collection<'s>,
    inner: BatchIter<'t>,
}

impl<'c, 's, 't> Iterator for CollectionItems<'c, 's, 't> {
    type Item = Result<(Vec<Value>, serde_json::Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (full_key, data) = match self.inner.next()? {
            Ok(pair) => pair,
            Err(e) => return Some(Err(e)),
        };
        let key = match self.coll.key_from_full(&full_key) {
            Ok(k) => k,
            Err(e) => return Some(Err(e)),
        };
        match self.coll.encoder.unpack(&data) {
            Ok(rec) => Some(Ok((key, rec))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Yields just the key of each [`CollectionItems`] entry.
pub struct CollectionKeys<'c, 's, 't>(CollectionItems<'c, 's, 't>);

impl<'c, 's, 't> Iterator for CollectionKeys<'c, 's, 't> {
    type Item = Result<Vec<Value>>;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.0.next()?.map(|(key, _)| key))
    }
}

/// Yields just the record of each [`CollectionItems`] entry.
pub struct CollectionValues<'c, 's, 't>(CollectionItems<'c, 's, 't>);

impl<'c, 's, 't> Iterator for CollectionValues<'c, 's, 't> {
    type Item = Result<serde_json::Value>;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.0.next()?.map(|(_, rec)| rec))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::{Store, TxnOutcome};
    use serde_json::json;

    fn store() -> Store {
        Store::open("mem:/").unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let s = store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "people", "json", None, false).unwrap();
            let key = coll.put(txn, &json!({"name": "D", "age": 29}), PutOpts::default()).unwrap();
            assert_eq!(key, vec![Value::Int(1)]);
            let got = coll.get(txn, &key).unwrap().unwrap();
            assert_eq!(got["name"], "D");
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }

    #[test]
    fn put_then_delete_leaves_no_trace() {
        let s = store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "people", "json", None, false).unwrap();
            let key = coll.put(txn, &json!({"name": "D"}), PutOpts::default()).unwrap();
            coll.delete(txn, &key).unwrap();
            assert!(coll.get(txn, &key).unwrap().is_none());
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }

    #[test]
    fn index_maintenance_tracks_replacement() {
        let s = store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "people", "json", None, false).unwrap();
            coll.add_index(
                txn,
                "age",
                Box::new(|rec: &serde_json::Value| Ok(vec![vec![Value::Int(rec["age"].as_i64().unwrap())]])),
            )
            .unwrap();

            let k1 = coll
                .put(txn, &json!({"name": "D", "age": 29}), PutOpts { key: Some(vec![Value::Int(1)]), ..Default::default() })
                .unwrap();
            coll.put(txn, &json!({"name": "J", "age": 40}), PutOpts { key: Some(vec![Value::Int(2)]), ..Default::default() })
                .unwrap();

            let (_, prefix) = coll.index_meta("age").unwrap();
            let scan = |txn: &dyn EngineTxn| -> Vec<(Vec<Value>, Vec<Value>)> {
                crate::iter::RangeIterBuilder::new(prefix.clone())
                    .run(txn)
                    .unwrap()
                    .map(|(k, _)| {
                        let pair = ordstore_core::unpacks(&k, Some(&prefix)).unwrap();
                        (pair[0].clone(), pair[1].clone())
                    })
                    .collect()
            };

            let before = scan(&*txn);
            assert_eq!(before, vec![(vec![Value::Int(29)], vec![Value::Int(1)]), (vec![Value::Int(40)], vec![Value::Int(2)])]);

            coll.put(txn, &json!({"name": "D", "age": 30}), PutOpts { key: Some(k1), ..Default::default() })
                .unwrap();
            let after = scan(&*txn);
            assert_eq!(after, vec![(vec![Value::Int(30)], vec![Value::Int(1)]), (vec![Value::Int(40)], vec![Value::Int(2)])]);
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }

    #[test]
    fn batch_then_split_preserves_values() {
        let s = store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "items", "json", None, false).unwrap();
            for (i, v) in ["a", "b", "c", "d", "e"].iter().enumerate() {
                coll.put(
                    txn,
                    &json!(v),
                    PutOpts { key: Some(vec![Value::Int(i as i64 + 1)]), ..Default::default() },
                )
                .unwrap();
            }

            let outcome = coll
                .batch(
                    txn,
                    BatchOpts { max_recs: Some(5), ..BatchOpts::new() },
                )
                .unwrap();
            assert_eq!(outcome.found, 5);
            assert_eq!(outcome.made, 1);

            assert_eq!(coll.get(txn, &[Value::Int(3)]).unwrap().unwrap(), json!("c"));

            coll.delete(txn, &[Value::Int(3)]).unwrap();
            let remaining: Vec<_> = coll
                .query()
                .run(&*txn)
                .unwrap()
                .collect::<Result<Vec<_>>>()
                .unwrap();
            assert_eq!(
                remaining,
                vec![
                    (vec![Value::Int(1)], json!("a")),
                    (vec![Value::Int(2)], json!("b")),
                    (vec![Value::Int(4)], json!("d")),
                    (vec![Value::Int(5)], json!("e")),
                ]
            );
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }

    #[test]
    fn keys_values_and_find_project_items() {
        let s = store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "items", "json", None, false).unwrap();
            for (i, v) in ["a", "b", "c"].iter().enumerate() {
                coll.put(
                    txn,
                    &json!(v),
                    PutOpts { key: Some(vec![Value::Int(i as i64 + 1)]), ..Default::default() },
                )
                .unwrap();
            }

            let keys: Vec<_> = coll.query().keys(&*txn).unwrap().collect::<Result<Vec<_>>>().unwrap();
            assert_eq!(keys, vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]]);

            let values: Vec<_> = coll.query().values(&*txn).unwrap().collect::<Result<Vec<_>>>().unwrap();
            assert_eq!(values, vec![json!("a"), json!("b"), json!("c")]);

            let first = coll.query().find(&*txn).unwrap().unwrap();
            assert_eq!(first, (vec![Value::Int(1)], json!("a")));
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }

    #[test]
    fn set_blind_rejected_while_indexes_are_live() {
        let s = store();
        s.transact(true, |txn| {
            let coll = Collection::open(&s, txn, "people", "json", None, false).unwrap();
            coll.add_index(txn, "age", Box::new(|_: &serde_json::Value| Ok(vec![]))).unwrap();
            assert!(coll.set_blind(true).is_err());
            Ok(TxnOutcome::Commit(()))
        })
        .unwrap();
    }
}
