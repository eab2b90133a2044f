//! An embeddable, ordered, transactional record store core: collections of
//! JSON-ish records keyed by tuples, secondary indexes maintained
//! automatically on write, and a pluggable ordered key/value engine
//! underneath.
//!
//! Layering follows [`ordstore_core`]: that crate owns the tuple codec and
//! the engine contract, this crate owns everything that depends on a
//! *collection* of keyed records existing — compression, record encoding,
//! range/batch iteration, the store's id/meta bookkeeping, and the
//! `Collection`/`Index` query surface built on top of it.

pub mod batch_iter;
pub mod collection;
pub mod compressor;
pub mod encoder;
pub mod error;
pub mod index;
pub mod iter;
pub mod store;
pub mod txn;

pub use batch_iter::{BatchIter, BatchIterBuilder};
pub use collection::{
    BatchOpts, BatchOutcome, Collection, CollectionItems, CollectionKeys, CollectionQuery,
    CollectionValues, IndexFunc, KeyFunc, PutOpts,
};
pub use error::{Abort, Error};
pub use index::{Index, IndexArgs, IndexItems, IndexPairs, Keys, Tups, Values};
pub use iter::{RangeIter, RangeIterBuilder};
pub use store::{CollectionMeta, Store, TxnOutcome};
pub use txn::{ScopeTracker, TaskLocalContext, ThreadLocalContext, TxnContext};

pub use ordstore_core::{next_greater, pack_tuple, packs, unpack_tuple, unpacks, Key, Timestamp, Value};

/// `Result` alias used throughout this crate; `ruc`'s boxed-trait-object
/// error type composes [`error::Error`] and [`ordstore_core::CoreError`]
/// through `From` without either crate needing to know about the other's
/// concrete type.
pub type Result<T> = ruc::Result<T>;
