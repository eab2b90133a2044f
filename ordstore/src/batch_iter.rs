//! Batch iterator: same surface as the range iterator, plus `set_max_phys`,
//! and transparently decodes multi-record physical values (batches) into
//! their member logical records.
//!
//! Bound checking happens at the *decoded member key* level, not the
//! physical engine key: a batch's physical key is built from its highest
//! member, so a tight `lo`/`hi` on raw physical bytes would wrongly exclude
//! a batch that still contains matching members below its anchor. Only the
//! bound that also doubles as a safe seek hint (`lo` forward, `hi` reverse)
//! is pushed down to the physical range iterator; the other is evaluated
//! per member as it's exploded.

use ordstore_core::varint::decode_offsets;
use ordstore_core::{next_greater, pack_tuple, unpacks};
use ruc::*;

use crate::compressor;
use crate::error::Error;
use crate::iter::{RangeIter, RangeIterBuilder};

#[derive(Debug, Clone)]
struct Edge {
    key: Vec<u8>,
    closed: bool,
}

/// Builds a [`BatchIter`]; bound-setting methods mirror [`RangeIterBuilder`]
/// exactly, plus `set_max_phys` (a cap on physical records visited,
/// independent of `set_max`'s cap on logical/decoded elements).
pub struct BatchIterBuilder {
    prefix: Vec<u8>,
    lo: Option<Edge>,
    hi: Option<Edge>,
    reverse: bool,
    max_logical: Option<usize>,
    max_phys: Option<usize>,
}

impl BatchIterBuilder {
    pub fn new(prefix: Vec<u8>) -> BatchIterBuilder {
        BatchIterBuilder {
            prefix,
            lo: None,
            hi: None,
            reverse: false,
            max_logical: None,
            max_phys: None,
        }
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn set_lo(mut self, key: Vec<u8>, closed: bool) -> Self {
        self.lo = Some(Edge { key, closed });
        self
    }

    pub fn set_hi(mut self, key: Vec<u8>, closed: bool) -> Self {
        self.hi = Some(Edge { key, closed });
        self
    }

    pub fn set_prefix(self, key: Vec<u8>) -> Self {
        let hi = next_greater(&key);
        self.set_lo(key, true).set_hi(hi, false)
    }

    pub fn set_exact(self, key: Vec<u8>) -> Self {
        self.set_lo(key.clone(), true).set_hi(key, true)
    }

    /// Cap on logical (decoded) elements yielded.
    pub fn set_max(mut self, n: usize) -> Self {
        self.max_logical = Some(n);
        self
    }

    /// Cap on physical records visited — lets compaction make incremental
    /// progress without blocking other writers for too long.
    pub fn set_max_phys(mut self, n: usize) -> Self {
        self.max_phys = Some(n);
        self
    }

    pub fn run<'t>(self, txn: &'t dyn ordstore_core::engine::EngineTxn) -> Result<BatchIter<'t>> {
        // Only the bound that also serves as a safe seek position is
        // forwarded to the physical range iterator. A batch's physical key
        // is anchored on its highest member, so a forward `hi` (or a
        // reverse `lo`) applied at the physical-byte level could exclude a
        // batch whose anchor sits outside the window while containing
        // members that satisfy it; those bounds are instead re-checked per
        // decoded member below.
        let mut phys = RangeIterBuilder::new(self.prefix.clone()).reverse(self.reverse);
        if self.reverse {
            if let Some(hi) = &self.hi {
                phys = phys.set_hi(hi.key.clone(), hi.closed);
            }
        } else if let Some(lo) = &self.lo {
            phys = phys.set_lo(lo.key.clone(), lo.closed);
        }
        if let Some(n) = self.max_phys {
            phys = phys.set_max(n);
        }

        Ok(BatchIter {
            phys: phys.run(txn)?,
            prefix: self.prefix,
            reverse: self.reverse,
            lo: self.lo,
            hi: self.hi,
            remaining_logical: self.max_logical,
            current: None,
            done: false,
        })
    }
}

struct CurrentBatch {
    /// The physical engine key this batch was read from — the key the
    /// split protocol must delete to retire the batch as a whole, as
    /// opposed to any single member's reconstructed key.
    phys_key: Vec<u8>,
    /// `(full engine key for this member, decoded+decompressed record bytes)`,
    /// in physical order `[k1 highest .. km lowest]`.
    members: Vec<(Vec<u8>, Vec<u8>)>,
    cursor: isize,
}

/// Yields `(engine_key, record_bytes)` pairs, transparently exploding batch
/// physical records into their member logical records.
pub struct BatchIter<'t> {
    phys: RangeIter<'t>,
    prefix: Vec<u8>,
    reverse: bool,
    lo: Option<Edge>,
    hi: Option<Edge>,
    remaining_logical: Option<usize>,
    current: Option<CurrentBatch>,
    done: bool,
}

impl<'t> BatchIter<'t> {
    /// The members of the physical record currently being walked, without
    /// advancing this iterator — used by the collection's split protocol
    /// to explode a batch in place.
    pub fn batch_items(&self) -> Option<&[(Vec<u8>, Vec<u8>)]> {
        self.current.as_ref().map(|b| b.members.as_slice())
    }

    /// The raw physical engine key backing the batch currently being
    /// walked — the key the split protocol deletes to retire the whole
    /// physical record.
    pub fn current_phys_key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|b| b.phys_key.as_slice())
    }

    fn fetch_next_physical(&mut self) -> Result<bool> {
        let Some((engine_key, value)) = self.phys.next() else {
            return Ok(false);
        };

        let tuples = unpacks(&engine_key, Some(&self.prefix))
            .map_err(Error::from)
            .c(d!())?;
        if tuples.is_empty() {
            return Err(Error::CorruptKey("physical key decoded to zero logical keys".into())).c(d!());
        }

        if tuples.len() == 1 {
            if value.is_empty() {
                return Err(Error::CorruptKey("physical value missing compressor id".into())).c(d!());
            }
            let payload = compressor::by_id(value[0])?.decompress(&value[1..])?;
            let member_key = pack_tuple(&tuples[0]).map_err(Error::from).c(d!())?;
            let mut full_key = self.prefix.clone();
            full_key.extend_from_slice(&member_key);
            self.current = Some(CurrentBatch {
                phys_key: engine_key,
                members: vec![(full_key, payload)],
                cursor: 0,
            });
            return Ok(true);
        }

        let (offsets, pos) = decode_offsets(&value).map_err(Error::from).c(d!())?;
        if value.len() <= pos {
            return Err(Error::CorruptKey("batch value missing compressor id".into())).c(d!());
        }
        let compressor_id = value[pos];
        let concatenated = compressor::by_id(compressor_id)?.decompress(&value[pos + 1..])?;

        let m = tuples.len();
        let mut members = Vec::with_capacity(m);
        for i in 0..m {
            let (start, end) = (offsets[i], offsets[i + 1]);
            let bytes = concatenated
                .get(start..end)
                .ok_or_else(|| Error::CorruptKey("batch member offset out of range".into()))
                .c(d!())?
                .to_vec();
            let member_key = pack_tuple(&tuples[i]).map_err(Error::from).c(d!())?;
            let mut full_key = self.prefix.clone();
            full_key.extend_from_slice(&member_key);
            members.push((full_key, bytes));
        }

        let cursor = if self.reverse { 0 } else { m as isize - 1 };
        self.current = Some(CurrentBatch {
            phys_key: engine_key,
            members,
            cursor,
        });
        Ok(true)
    }

    /// Whether `full_key` (a decoded member's reconstructed engine key)
    /// satisfies both configured bounds.
    fn in_bounds(&self, full_key: &[u8]) -> bool {
        if let Some(lo) = &self.lo {
            let ok = if lo.closed {
                full_key >= lo.key.as_slice()
            } else {
                full_key > lo.key.as_slice()
            };
            if !ok {
                return false;
            }
        }
        if let Some(hi) = &self.hi {
            let ok = if hi.closed {
                full_key <= hi.key.as_slice()
            } else {
                full_key < hi.key.as_slice()
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Whether `full_key` lies entirely past the window in the direction of
    /// travel — once true, no later member (in this batch or a later
    /// physical record) can satisfy the bounds, since keys are visited in
    /// monotonic order overall.
    fn past_window(&self, full_key: &[u8]) -> bool {
        if !self.reverse {
            if let Some(hi) = &self.hi {
                return if hi.closed {
                    full_key > hi.key.as_slice()
                } else {
                    full_key >= hi.key.as_slice()
                };
            }
        } else if let Some(lo) = &self.lo {
            return if lo.closed {
                full_key < lo.key.as_slice()
            } else {
                full_key <= lo.key.as_slice()
            };
        }
        false
    }

    fn next_member(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        let batch = self.current.as_mut()?;
        if self.reverse {
            if (batch.cursor as usize) >= batch.members.len() {
                self.current = None;
                return None;
            }
            let item = batch.members[batch.cursor as usize].clone();
            batch.cursor += 1;
            Some(item)
        } else {
            if batch.cursor < 0 {
                self.current = None;
                return None;
            }
            let item = batch.members[batch.cursor as usize].clone();
            batch.cursor -= 1;
            Some(item)
        }
    }
}

impl<'t> Iterator for BatchIter<'t> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining_logical == Some(0) {
            return None;
        }

        loop {
            if self.current.is_some() {
                let Some((key, value)) = self.next_member() else {
                    continue;
                };

                if self.past_window(&key) {
                    self.done = true;
                    return None;
                }
                if !self.in_bounds(&key) {
                    continue;
                }

                if let Some(r) = &mut self.remaining_logical {
                    *r -= 1;
                }
                return Some(Ok((key, value)));
            }

            match self.fetch_next_physical() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
