//! Error taxonomy for `ordstore`, extending
//! [`ordstore_core::CoreError`] with the collection/index/transaction-level
//! failure modes. Every variant implements `std::error::Error`, so it
//! composes into `ruc`'s `.c(d!())?` chains the way any other leaf error in
//! the workspace does.

use std::fmt;

use ordstore_core::CoreError;

/// `Abort` is in-band control flow: user code raises it to cancel a
/// transaction; the transaction context recognises it, aborts the
/// underlying engine transaction, and swallows it rather than propagating
/// it as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Abort;

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transaction aborted by user code")
    }
}
impl std::error::Error for Abort {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// In-band cancellation; see [`Abort`].
    Abort,
    /// A collection/index/encoder was re-registered with options that
    /// disagree with its stored metadata.
    Config(String),
    /// A structural invariant of the store was violated (e.g. `set_blind`
    /// requested on a collection with live indexes).
    Constraint(String),
    /// The underlying engine reported a failure.
    Engine(String),
    /// A name (collection/index/encoder) is already registered under a
    /// different identity.
    NameInUse(String),
    /// A requested record/collection/index/encoder does not exist.
    NotFound(String),
    /// A transaction-context invariant was violated (e.g. nested `begin`
    /// on the same task-local scope, or commit/abort called twice).
    Txn(String),
    /// A packed key or physical value was truncated or malformed.
    CorruptKey(String),
    /// A tuple element had no packed representation.
    UnsupportedType(String),
    /// `unpacks` was asked to strip a prefix the buffer does not start
    /// with; callers treat this as "no match".
    PrefixMismatch,
    /// A declared-but-unimplemented feature was invoked (e.g. `batch`'s
    /// `max_keylen` parameter).
    Unimplemented(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Abort => write!(f, "transaction aborted by user code"),
            Error::Config(m) => write!(f, "config error: {m}"),
            Error::Constraint(m) => write!(f, "constraint violation: {m}"),
            Error::Engine(m) => write!(f, "engine error: {m}"),
            Error::NameInUse(m) => write!(f, "name in use: {m}"),
            Error::NotFound(m) => write!(f, "not found: {m}"),
            Error::Txn(m) => write!(f, "transaction error: {m}"),
            Error::CorruptKey(m) => write!(f, "corrupt key: {m}"),
            Error::UnsupportedType(m) => write!(f, "unsupported type: {m}"),
            Error::PrefixMismatch => write!(f, "prefix mismatch"),
            Error::Unimplemented(what) => write!(f, "not implemented: {what}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<CoreError> for Error {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnsupportedType(m) => Error::UnsupportedType(m),
            CoreError::CorruptKey(m) => Error::CorruptKey(m),
            CoreError::PrefixMismatch => Error::PrefixMismatch,
            CoreError::Unimplemented(w) => Error::Unimplemented(w),
            CoreError::Engine(m) => Error::Engine(m),
        }
    }
}

impl From<Abort> for Error {
    fn from(_: Abort) -> Self {
        Error::Abort
    }
}
