//! Error taxonomy for the codec and engine contract.
//!
//! Every variant here is raised with `ruc`'s `eg!()`/`d!()` machinery so it
//! composes with `.c(d!())?` chains the same way the rest of the workspace
//! does; callers see a `ruc::Result<T>` (`= Result<T, Box<dyn RucError>>`).

use std::fmt;

/// Failure modes that originate in the codec or engine layer, as opposed to
/// errors surfaced by a concrete storage backend (which are wrapped instead,
/// see [`CoreError::Engine`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A tuple element's type has no packed representation (pack-time).
    UnsupportedType(String),
    /// A packed buffer was truncated or carried an unrecognised kind byte.
    CorruptKey(String),
    /// `unpacks` was asked to strip a prefix the buffer does not start with.
    /// Not fatal — callers treat this as "no match".
    PrefixMismatch,
    /// A declared feature was invoked with no concrete format backing it yet
    /// (e.g. `batch(max_keylen = Some(_))`).
    Unimplemented(&'static str),
    /// The underlying storage engine reported a failure.
    Engine(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::UnsupportedType(t) => write!(f, "unsupported type: {t}"),
            CoreError::CorruptKey(m) => write!(f, "corrupt key: {m}"),
            CoreError::PrefixMismatch => write!(f, "prefix mismatch"),
            CoreError::Unimplemented(what) => write!(f, "not implemented: {what}"),
            CoreError::Engine(m) => write!(f, "engine error: {m}"),
        }
    }
}

impl std::error::Error for CoreError {}
