//! The primitive value domain a tuple element can hold.

use crate::error::CoreError;

/// A timestamp: an absolute instant plus the UTC offset it was recorded
/// under, in 15-minute units. Comparisons and ordering act on the instant
/// only — the offset rides along for display/round-trip purposes, exactly
/// as the packed composite integer encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Milliseconds since the Unix epoch, UTC.
    pub millis: i64,
    /// Offset from UTC, in seconds, must be a multiple of 900 (15 minutes)
    /// and fit in the `(utc_offset_seconds / 900) + 64` range 0..127, i.e.
    /// -57600..=56700.
    pub offset_seconds: i32,
}

impl Timestamp {
    pub fn new(millis: i64, offset_seconds: i32) -> Result<Timestamp, CoreError> {
        if offset_seconds % 900 != 0 {
            return Err(CoreError::UnsupportedType(
                "timestamp offset must be a multiple of 900 seconds".into(),
            ));
        }
        let slot = offset_seconds / 900 + 64;
        if !(0..=127).contains(&slot) {
            return Err(CoreError::UnsupportedType(
                "timestamp offset out of the +-16h range".into(),
            ));
        }
        Ok(Timestamp {
            millis,
            offset_seconds,
        })
    }

    /// The signed composite integer packed by the tuple codec: milliseconds
    /// shifted left 7 bits, OR-ed (additively, to keep sign correct) with
    /// the 7-bit offset slot.
    pub(crate) fn composite(&self) -> i64 {
        let slot = (self.offset_seconds / 900 + 64) as i64;
        self.millis * 128 + slot
    }

    pub(crate) fn from_composite(composite: i64) -> Timestamp {
        let slot = composite.rem_euclid(128);
        let millis = (composite - slot) >> 7;
        Timestamp {
            millis,
            offset_seconds: ((slot - 64) * 900) as i32,
        }
    }
}

/// One element of a tuple key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Blob(Vec<u8>),
    Text(String),
    Uuid([u8; 16]),
    Timestamp(Timestamp),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<'a> From<&'a str> for Value {
    fn from(v: &'a str) -> Self {
        Value::Text(v.to_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn composite_round_trips_through_zero_offset() {
        let ts = Timestamp::new(1_700_000_000_123, 0).unwrap();
        let c = ts.composite();
        assert_eq!(Timestamp::from_composite(c), ts);
    }

    #[test]
    fn composite_round_trips_with_positive_and_negative_offsets() {
        for offset in [-57600, -3600, 0, 3600, 19800, 56700] {
            let ts = Timestamp::new(12_345, offset).unwrap();
            assert_eq!(Timestamp::from_composite(ts.composite()), ts);
        }
    }

    #[test]
    fn composite_round_trips_with_negative_millis() {
        let ts = Timestamp::new(-500, 3600).unwrap();
        assert_eq!(Timestamp::from_composite(ts.composite()), ts);
    }

    #[test]
    fn rejects_non_quarter_hour_offsets() {
        assert!(Timestamp::new(0, 100).is_err());
    }
}
