//! Range iterator: forward/reverse traversal of an engine key range under a
//! fixed byte prefix, with open/closed bounds and an element count cap.

use ordstore_core::engine::EngineTxn;
use ordstore_core::next_greater;

#[derive(Debug, Clone)]
struct Edge {
    key: Vec<u8>,
    closed: bool,
}

/// Builds a [`RangeIter`] bound-by-bound via a
/// `set_lo`/`set_hi`/`set_prefix`/`set_exact`/`set_max` method chain.
#[derive(Debug, Clone)]
pub struct RangeIterBuilder {
    prefix: Vec<u8>,
    lo: Option<Edge>,
    hi: Option<Edge>,
    max: Option<usize>,
    reverse: bool,
}

impl RangeIterBuilder {
    pub fn new(prefix: Vec<u8>) -> RangeIterBuilder {
        RangeIterBuilder {
            prefix,
            lo: None,
            hi: None,
            max: None,
            reverse: false,
        }
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Lower-inclusive if `closed`, else lower-exclusive.
    pub fn set_lo(mut self, key: Vec<u8>, closed: bool) -> Self {
        self.lo = Some(Edge { key, closed });
        self
    }

    /// Upper-inclusive if `closed`, else upper-exclusive.
    pub fn set_hi(mut self, key: Vec<u8>, closed: bool) -> Self {
        self.hi = Some(Edge { key, closed });
        self
    }

    /// `lo` closed at `key`, `hi` open at `next_greater(key)`.
    pub fn set_prefix(self, key: Vec<u8>) -> Self {
        let hi = next_greater(&key);
        self.set_lo(key, true).set_hi(hi, false)
    }

    /// `lo` and `hi` both equal to `key`, both closed.
    pub fn set_exact(self, key: Vec<u8>) -> Self {
        self.set_lo(key.clone(), true).set_hi(key, true)
    }

    pub fn set_max(mut self, n: usize) -> Self {
        self.max = Some(n);
        self
    }

    pub fn run<'t>(self, txn: &'t dyn EngineTxn) -> ruc::Result<RangeIter<'t>> {
        let start = if self.reverse {
            match &self.hi {
                Some(h) => next_greater(&h.key),
                None => next_greater(&self.prefix),
            }
        } else {
            match &self.lo {
                Some(l) => l.key.clone(),
                None => self.prefix.clone(),
            }
        };

        let inner = txn.iter(&start, self.reverse)?;
        Ok(RangeIter {
            inner,
            prefix: self.prefix,
            lo: self.lo,
            hi: self.hi,
            remaining: self.max,
            reverse: self.reverse,
            done: false,
        })
    }
}

/// Yields `(engine_key, value)` pairs within the configured bounds under a
/// fixed prefix, as owned copies.
pub struct RangeIter<'t> {
    inner: Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 't>,
    prefix: Vec<u8>,
    lo: Option<Edge>,
    hi: Option<Edge>,
    remaining: Option<usize>,
    reverse: bool,
    done: bool,
}

impl<'t> Iterator for RangeIter<'t> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.remaining == Some(0) {
            self.done = true;
            return None;
        }

        loop {
            let (key, value) = self.inner.next()?;
            if !key.starts_with(&self.prefix) {
                self.done = true;
                return None;
            }

            if self.reverse {
                if let Some(hi) = &self.hi {
                    if !hi.closed && key == hi.key {
                        continue;
                    }
                }
                if let Some(lo) = &self.lo {
                    let stop = if lo.closed { key < lo.key } else { key <= lo.key };
                    if stop {
                        self.done = true;
                        return None;
                    }
                }
            } else {
                if let Some(lo) = &self.lo {
                    if !lo.closed && key == lo.key {
                        continue;
                    }
                }
                if let Some(hi) = &self.hi {
                    let stop = if hi.closed { key > hi.key } else { key >= hi.key };
                    if stop {
                        self.done = true;
                        return None;
                    }
                }
            }

            if let Some(r) = &mut self.remaining {
                *r -= 1;
            }
            return Some((key, value));
        }
    }
}
