//! Order-preserving tuple key codec and pluggable ordered key/value engine
//! contract underlying `ordstore`.
//!
//! This crate has no notion of collections, indexes, or compression — see
//! the `ordstore` crate for those. It only knows how to turn tuples of
//! primitive values into byte strings whose ordering matches a well-defined
//! total order, and how to talk to an ordered key/value engine through a
//! small trait.

pub mod bitstring;
pub mod engine;
pub mod engines;
pub mod error;
pub mod tuple;
pub mod value;
pub mod varint;

pub use error::CoreError;
pub use tuple::{next_greater, pack_tuple, packs, unpack_tuple, unpacks, Key};
pub use value::{Timestamp, Value};
