//! Tuple codec: packs/unpacks sequences of [`Value`]s to/from order-preserving
//! byte strings, and the [`Key`] type wrapping a single packed tuple (spec
//! §4.A.4, §3's "Key" data-model entry).

use once_cell::sync::OnceCell;

use crate::bitstring;
use crate::error::CoreError;
use crate::value::{Timestamp, Value};
use crate::varint;

pub const KIND_NULL: u8 = 0x0f;
pub const KIND_NEG_INTEGER: u8 = 0x14;
pub const KIND_INTEGER: u8 = 0x15;
pub const KIND_BOOL: u8 = 0x1e;
pub const KIND_BLOB: u8 = 0x28;
pub const KIND_TEXT: u8 = 0x32;
pub const KIND_UUID: u8 = 0x5a;
pub const KIND_NEG_TIME: u8 = 0x5b;
pub const KIND_TIME: u8 = 0x5c;
pub const KIND_SEP: u8 = 0x66;

/// Append the packed representation of one [`Value`] to `out`.
pub fn pack_value(v: &Value, out: &mut Vec<u8>) -> Result<(), CoreError> {
    match v {
        Value::Null => out.push(KIND_NULL),
        Value::Int(i) if *i < 0 => {
            out.push(KIND_NEG_INTEGER);
            varint::write_uint(i.unsigned_abs(), 0xff, out);
        }
        Value::Int(i) => {
            out.push(KIND_INTEGER);
            varint::write_uint(*i as u64, 0, out);
        }
        Value::Bool(b) => {
            out.push(KIND_BOOL);
            varint::write_uint(*b as u64, 0, out);
        }
        Value::Blob(b) => {
            out.push(KIND_BLOB);
            bitstring::write_bytes(b, out);
        }
        Value::Text(s) => {
            out.push(KIND_TEXT);
            bitstring::write_bytes(s.as_bytes(), out);
        }
        Value::Uuid(u) => {
            out.push(KIND_UUID);
            out.extend_from_slice(u);
        }
        Value::Timestamp(ts) => {
            let composite = ts.composite();
            if composite < 0 {
                out.push(KIND_NEG_TIME);
                varint::write_uint(composite.unsigned_abs(), 0xff, out);
            } else {
                out.push(KIND_TIME);
                varint::write_uint(composite as u64, 0, out);
            }
        }
    }
    Ok(())
}

/// Decode one [`Value`] starting at `pos`, returning it and the position
/// just past it.
pub fn unpack_value(buf: &[u8], pos: usize) -> Result<(Value, usize), CoreError> {
    let kind = *buf
        .get(pos)
        .ok_or_else(|| CoreError::CorruptKey("truncated tuple element".into()))?;
    let pos = pos + 1;
    match kind {
        KIND_NULL => Ok((Value::Null, pos)),
        KIND_NEG_INTEGER => {
            let (mag, next) = varint::read_uint(buf, pos, 0xff)?;
            Ok((Value::Int(-(mag as i64)), next))
        }
        KIND_INTEGER => {
            let (v, next) = varint::read_uint(buf, pos, 0)?;
            Ok((Value::Int(v as i64), next))
        }
        KIND_BOOL => {
            let (v, next) = varint::read_uint(buf, pos, 0)?;
            Ok((Value::Bool(v != 0), next))
        }
        KIND_BLOB => {
            let (bytes, next) = bitstring::read_bytes(buf, pos)?;
            Ok((Value::Blob(bytes), next))
        }
        KIND_TEXT => {
            let (bytes, next) = bitstring::read_bytes(buf, pos)?;
            let s = String::from_utf8(bytes)
                .map_err(|_| CoreError::CorruptKey("text element is not valid utf-8".into()))?;
            Ok((Value::Text(s), next))
        }
        KIND_UUID => {
            let end = pos + 16;
            let raw = buf
                .get(pos..end)
                .ok_or_else(|| CoreError::CorruptKey("truncated uuid".into()))?;
            let mut u = [0u8; 16];
            u.copy_from_slice(raw);
            Ok((Value::Uuid(u), end))
        }
        KIND_NEG_TIME => {
            let (mag, next) = varint::read_uint(buf, pos, 0xff)?;
            Ok((Value::Timestamp(Timestamp::from_composite(-(mag as i64))), next))
        }
        KIND_TIME => {
            let (v, next) = varint::read_uint(buf, pos, 0)?;
            Ok((Value::Timestamp(Timestamp::from_composite(v as i64)), next))
        }
        other => Err(CoreError::CorruptKey(format!("unknown kind byte {other:#04x}"))),
    }
}

/// Pack a single tuple (no trailing separator) — callers wanting several
/// tuples in one key should use [`packs`].
pub fn pack_tuple(values: &[Value]) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::new();
    for v in values {
        pack_value(v, &mut out)?;
    }
    Ok(out)
}

/// Decode one tuple's worth of elements starting at `pos`, stopping at a
/// [`KIND_SEP`] byte or the end of `buf`. Returns the tuple and the position
/// of the byte that stopped it (either a `KIND_SEP` or `buf.len()`).
pub fn unpack_tuple(buf: &[u8], mut pos: usize) -> Result<(Vec<Value>, usize), CoreError> {
    let mut values = Vec::new();
    while pos < buf.len() && buf[pos] != KIND_SEP {
        let (v, next) = unpack_value(buf, pos)?;
        values.push(v);
        pos = next;
    }
    Ok((values, pos))
}

/// Pack several tuples, joined by [`KIND_SEP`]: the physical record key
/// packs one or more logical-key tuples separated by a delimiter byte.
pub fn packs(tuples: &[&[Value]]) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::new();
    for (i, t) in tuples.iter().enumerate() {
        if i > 0 {
            out.push(KIND_SEP);
        }
        for v in t.iter() {
            pack_value(v, &mut out)?;
        }
    }
    Ok(out)
}

/// Split a buffer produced by [`packs`] back into its component tuples,
/// optionally after stripping a caller-supplied prefix. Returns
/// [`CoreError::PrefixMismatch`] (not a hard error — callers treat this as
/// "no match") if `prefix` is given and `buf` doesn't start with it.
pub fn unpacks(buf: &[u8], prefix: Option<&[u8]>) -> Result<Vec<Vec<Value>>, CoreError> {
    let rest = match prefix {
        Some(p) => buf.strip_prefix(p).ok_or(CoreError::PrefixMismatch)?,
        None => buf,
    };
    let mut tuples = Vec::new();
    let mut pos = 0;
    loop {
        let (t, next) = unpack_tuple(rest, pos)?;
        tuples.push(t);
        if next >= rest.len() {
            break;
        }
        pos = next + 1; // skip KIND_SEP
    }
    Ok(tuples)
}

/// Compute the least byte string strictly greater than every string having
/// `s` as a prefix, used to form half-open upper bounds for prefix scans.
/// Undefined (panics) for an all-`0xFF`/empty input — callers must not
/// invoke it on one.
pub fn next_greater(s: &[u8]) -> Vec<u8> {
    let mut out = s.to_vec();
    while out.last() == Some(&0xff) {
        out.pop();
    }
    let last = out
        .last_mut()
        .expect("next_greater is undefined for an all-0xFF or empty string");
    *last += 1;
    out
}

/// A single packed tuple, used as a logical or index key.
///
/// The packed tail is cached lazily: constructing a `Key` from decoded
/// [`Value`]s doesn't pack until something asks for the bytes (`to_raw`,
/// `as_bytes`, comparisons).
#[derive(Debug, Clone)]
pub struct Key {
    values: Vec<Value>,
    packed: OnceCell<Vec<u8>>,
}

impl Key {
    pub fn new(values: Vec<Value>) -> Key {
        Key {
            values,
            packed: OnceCell::new(),
        }
    }

    /// Parse a packed tail (no prefix) into a `Key`.
    pub fn from_packed(packed: &[u8]) -> Result<Key, CoreError> {
        let (values, _) = unpack_tuple(packed, 0)?;
        let cell = OnceCell::new();
        let _ = cell.set(packed.to_vec());
        Ok(Key {
            values,
            packed: cell,
        })
    }

    /// Parse a raw engine key, stripping `prefix` first.
    pub fn from_raw(raw: &[u8], prefix: &[u8]) -> Result<Key, CoreError> {
        let tail = raw.strip_prefix(prefix).ok_or(CoreError::PrefixMismatch)?;
        Key::from_packed(tail)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.packed.get_or_init(|| {
            pack_tuple(&self.values).expect("Key constructed from already-valid Values")
        })
    }

    /// Splice this key's packed tail behind `prefix`, producing a full
    /// engine key.
    pub fn to_raw(&self, prefix: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(prefix.len() + self.as_bytes().len());
        out.extend_from_slice(prefix);
        out.extend_from_slice(self.as_bytes());
        out
    }

    /// The least raw key (under `prefix`) strictly greater than every raw
    /// key having this key's packed tail as a prefix.
    pub fn next_greater(&self, prefix: &[u8]) -> Vec<u8> {
        next_greater(&self.to_raw(prefix))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Key {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn uuid_sample(b: u8) -> Value {
        Value::Uuid([b; 16])
    }

    #[test]
    fn round_trips_every_variant() {
        let values = vec![
            Value::Null,
            Value::Int(-42),
            Value::Int(42),
            Value::Int(0),
            Value::Bool(true),
            Value::Bool(false),
            Value::Blob(vec![1, 2, 3]),
            Value::Text("hello".into()),
            uuid_sample(7),
            Value::Timestamp(Timestamp::new(1_700_000_000_000, 0).unwrap()),
            Value::Timestamp(Timestamp::new(-1_000, 3600).unwrap()),
        ];
        let packed = pack_tuple(&values).unwrap();
        let (decoded, pos) = unpack_tuple(&packed, 0).unwrap();
        assert_eq!(pos, packed.len());
        assert_eq!(decoded, values);
    }

    #[test]
    fn cross_type_order_matches_kind_byte_order() {
        let samples = vec![
            Value::Null,
            Value::Int(-1),
            Value::Int(1),
            Value::Bool(true),
            Value::Blob(vec![0]),
            Value::Text("a".into()),
            uuid_sample(0),
        ];
        let mut packed: Vec<Vec<u8>> = samples.iter().map(|v| pack_tuple(&[v.clone()]).unwrap()).collect();
        let original = packed.clone();
        packed.sort();
        assert_eq!(packed, original, "kind-byte order must already be ascending");
    }

    #[test]
    fn negative_integers_sort_before_positive_and_among_themselves() {
        let mut vs = vec![-100i64, -5, -1, 0, 1, 5, 100];
        vs.sort_unstable();
        let packed: Vec<Vec<u8>> = vs
            .iter()
            .map(|&v| pack_tuple(&[Value::Int(v)]).unwrap())
            .collect();
        let mut sorted = packed.clone();
        sorted.sort();
        assert_eq!(packed, sorted);
    }

    #[test]
    fn packs_and_unpacks_multiple_tuples() {
        let a: Vec<Value> = vec![Value::Int(1)];
        let b: Vec<Value> = vec![Value::Text("x".into())];
        let packed = packs(&[&a, &b]).unwrap();
        let tuples = unpacks(&packed, None).unwrap();
        assert_eq!(tuples, vec![a, b]);
    }

    #[test]
    fn unpacks_strips_prefix_or_reports_mismatch() {
        let a: Vec<Value> = vec![Value::Int(1)];
        let packed = packs(&[&a]).unwrap();
        let mut with_prefix = b"\x01\x02".to_vec();
        with_prefix.extend_from_slice(&packed);
        let tuples = unpacks(&with_prefix, Some(b"\x01\x02")).unwrap();
        assert_eq!(tuples, vec![a]);
        assert!(matches!(
            unpacks(&with_prefix, Some(b"\x09\x09")),
            Err(CoreError::PrefixMismatch)
        ));
    }

    #[test]
    fn next_greater_strips_trailing_ff_and_increments() {
        assert_eq!(next_greater(&[1, 2, 3]), vec![1, 2, 4]);
        assert_eq!(next_greater(&[1, 0xff, 0xff]), vec![2]);
    }

    #[test]
    fn key_to_raw_and_from_raw_round_trip() {
        let k = Key::new(vec![Value::Int(7), Value::Text("abc".into())]);
        let prefix = b"\x00\x00\x05";
        let raw = k.to_raw(prefix);
        let parsed = Key::from_raw(&raw, prefix).unwrap();
        assert_eq!(parsed.values(), k.values());
        assert_eq!(parsed, k);
    }

    #[test]
    fn key_ordering_matches_packed_byte_order() {
        let a = Key::new(vec![Value::Int(1)]);
        let b = Key::new(vec![Value::Int(2)]);
        assert!(a < b);
    }
}
