//! Record encoders: an opaque `pack`/`unpack` pair turning a record into
//! bytes and back. User-encoder *registration* stays out of scope —
//! `RecordEncoder` here is exactly the opaque callback pair a caller needs,
//! nothing more. Records are represented as [`serde_json::Value`], the
//! natural Rust stand-in for "whatever structured value the caller wants
//! to store".

use ordstore_core::{tuple, Value as TupleValue};
use ruc::*;

use crate::error::Error;

pub trait RecordEncoder: Send + Sync {
    fn name(&self) -> &str;
    fn pack(&self, record: &serde_json::Value) -> Result<Vec<u8>>;
    fn unpack(&self, data: &[u8]) -> Result<serde_json::Value>;
}

/// Serializes records with `serde_json`.
pub struct Json;

impl RecordEncoder for Json {
    fn name(&self) -> &str {
        "json"
    }
    fn pack(&self, record: &serde_json::Value) -> Result<Vec<u8>> {
        serde_json::to_vec(record).c(d!())
    }
    fn unpack(&self, data: &[u8]) -> Result<serde_json::Value> {
        serde_json::from_slice(data).c(d!())
    }
}

/// Encodes a record that is itself a flat JSON array of scalars using the
/// tuple codec. Used internally for the meta-collection's own rows.
pub struct Key;

fn json_to_tuple_value(v: &serde_json::Value) -> Result<TupleValue> {
    match v {
        serde_json::Value::Null => Ok(TupleValue::Null),
        serde_json::Value::Bool(b) => Ok(TupleValue::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(TupleValue::Int)
            .ok_or_else(|| eg!(format!("key encoder only supports i64 numbers, got {n}"))),
        serde_json::Value::String(s) => Ok(TupleValue::Text(s.clone())),
        other => Err(eg!(format!("key encoder cannot represent {other}"))),
    }
}

fn tuple_value_to_json(v: &TupleValue) -> serde_json::Value {
    match v {
        TupleValue::Null => serde_json::Value::Null,
        TupleValue::Bool(b) => serde_json::Value::Bool(*b),
        TupleValue::Int(i) => serde_json::Value::from(*i),
        TupleValue::Text(s) => serde_json::Value::String(s.clone()),
        TupleValue::Blob(b) => serde_json::Value::String(hex::encode(b)),
        TupleValue::Uuid(u) => serde_json::Value::String(hex::encode(u)),
        TupleValue::Timestamp(ts) => serde_json::Value::from(ts.millis),
    }
}

impl RecordEncoder for Key {
    fn name(&self) -> &str {
        "key"
    }

    fn pack(&self, record: &serde_json::Value) -> Result<Vec<u8>> {
        let arr = record
            .as_array()
            .ok_or_else(|| eg!("key encoder requires a JSON array record"))?;
        let values: Vec<TupleValue> = arr
            .iter()
            .map(json_to_tuple_value)
            .collect::<Result<_>>()
            .c(d!())?;
        tuple::pack_tuple(&values).map_err(Error::from).c(d!())
    }

    fn unpack(&self, data: &[u8]) -> Result<serde_json::Value> {
        let (values, _) = tuple::unpack_tuple(data, 0).map_err(Error::from).c(d!())?;
        Ok(serde_json::Value::Array(values.iter().map(tuple_value_to_json).collect()))
    }
}

pub fn by_name(name: &str) -> Result<Box<dyn RecordEncoder>> {
    match name {
        "json" => Ok(Box::new(Json)),
        "key" => Ok(Box::new(Key)),
        other => Err(eg!(format!("no builtin record encoder named {other:?}"))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_encoder_round_trips() {
        let e = Json;
        let record = json!({"name": "D", "age": 29});
        let packed = e.pack(&record).unwrap();
        assert_eq!(e.unpack(&packed).unwrap(), record);
    }

    #[test]
    fn key_encoder_round_trips_flat_arrays() {
        let e = Key;
        let record = json!([1, "x", true, serde_json::Value::Null]);
        let packed = e.pack(&record).unwrap();
        assert_eq!(e.unpack(&packed).unwrap(), record);
    }
}
