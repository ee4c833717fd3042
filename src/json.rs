//! JSON codec for the tagged wire format.
//!
//! | Value       | Wire                                   |
//! |-------------|----------------------------------------|
//! | `Ref`       | `{"@ref": {"id", "collection"?, "database"?}}` |
//! | `SetRef`    | `{"@set": raw}`                        |
//! | `FaunaTime` | `{"@ts": "..."}`                       |
//! | `FaunaDate` | `{"@date": "..."}`                     |
//! | `Bytes`     | `{"@bytes": "base64"}`                 |
//! | `QueryValue`| `{"@query": raw}`                      |
//!
//! Objects whose keys collide with a tag are escaped as `{"@obj": {...}}`.

use std::collections::BTreeMap;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{Error, Result};
use crate::values::{Bytes, FaunaDate, FaunaTime, Native, QueryValue, Ref, SetRef, Value};

/// Encode any expression or value as wire JSON.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
  Ok(serde_json::to_string_pretty(value)?)
}

/// Decode wire JSON into a [`Value`], resolving tagged objects.
pub fn parse_json(text: &str) -> Result<Value> {
  let raw: serde_json::Value = serde_json::from_str(text)?;
  Value::try_from(raw)
}

/// Parse a buffer holding newline-delimited JSON values, possibly followed by
/// an incomplete record. Returns the parsed values and the unconsumed tail,
/// which belongs in front of the next chunk.
pub fn parse_json_streaming(buffer: &str) -> Result<(Vec<Value>, String)> {
  if let Ok(value) = parse_json(buffer) {
    return Ok((vec![value], String::new()));
  }

  let mut values = Vec::new();
  let mut rest = buffer;
  while let Some(pos) = rest.find('\n') {
    let line = rest[..pos].trim();
    if !line.is_empty() {
      values.push(parse_json(line)?);
    }
    rest = &rest[pos + 1..];
  }
  Ok((values, rest.to_string()))
}

/// Incremental decoder for a chunked stream of newline-delimited JSON.
#[derive(Debug, Default)]
pub struct JsonFragments {
  text: String,
  // trailing bytes of an incomplete UTF-8 sequence
  partial: Vec<u8>,
}

impl JsonFragments {
  pub fn new() -> Self {
    Self::default()
  }

  /// Feed one chunk, returning every record it completes.
  pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Value>> {
    self.partial.extend_from_slice(chunk);
    let valid = match std::str::from_utf8(&self.partial) {
      Ok(s) => s.len(),
      Err(e) if e.error_len().is_none() => e.valid_up_to(),
      Err(e) => return Err(Error::Serialization(format!("invalid UTF-8 in stream: {}", e))),
    };
    let tail = self.partial.split_off(valid);
    let decoded = String::from_utf8(std::mem::replace(&mut self.partial, tail))
      .map_err(|e| Error::Serialization(e.to_string()))?;
    self.text.push_str(&decoded);

    let (values, rest) = parse_json_streaming(&self.text)?;
    self.text = rest;
    Ok(values)
  }

  /// Text received but not yet parsed.
  pub fn pending(&self) -> &str {
    &self.text
  }
}

impl TryFrom<serde_json::Value> for Value {
  type Error = Error;

  fn try_from(raw: serde_json::Value) -> Result<Value> {
    Ok(match raw {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(b),
      serde_json::Value::Number(n) => Value::Number(n),
      serde_json::Value::String(s) => Value::String(s),
      serde_json::Value::Array(items) => Value::Array(
        items
          .into_iter()
          .map(Value::try_from)
          .collect::<Result<_>>()?,
      ),
      serde_json::Value::Object(map) => decode_object(map)?,
    })
  }
}

fn decode_object(mut map: serde_json::Map<String, serde_json::Value>) -> Result<Value> {
  if let Some(inner) = map.remove("@ref") {
    return decode_ref(inner).map(Value::Ref);
  }
  if let Some(inner) = map.remove("@set") {
    return Ok(Value::Set(SetRef::new(Value::try_from(inner)?)));
  }
  if let Some(inner) = map.remove("@query") {
    return Ok(Value::Query(QueryValue::new(Value::try_from(inner)?)));
  }
  if let Some(inner) = map.remove("@ts") {
    return tagged_str("@ts", inner).map(|s| Value::Time(FaunaTime::new(s)));
  }
  if let Some(inner) = map.remove("@date") {
    return tagged_str("@date", inner).map(|s| Value::Date(FaunaDate::new(s)));
  }
  if let Some(inner) = map.remove("@bytes") {
    return tagged_str("@bytes", inner)
      .and_then(|s| Bytes::from_base64(&s))
      .map(Value::Bytes);
  }
  if let Some(inner) = map.remove("@obj") {
    return match inner {
      serde_json::Value::Object(fields) => decode_fields(fields).map(Value::Object),
      other => Err(Error::InvalidValue(format!("@obj expects an object, got {}", other))),
    };
  }
  decode_fields(map).map(Value::Object)
}

fn decode_fields(map: serde_json::Map<String, serde_json::Value>) -> Result<BTreeMap<String, Value>> {
  map
    .into_iter()
    .map(|(k, v)| Ok((k, Value::try_from(v)?)))
    .collect()
}

fn tagged_str(tag: &str, value: serde_json::Value) -> Result<String> {
  match value {
    serde_json::Value::String(s) => Ok(s),
    other => Err(Error::InvalidValue(format!("{} expects a string, got {}", tag, other))),
  }
}

fn decode_ref(inner: serde_json::Value) -> Result<Ref> {
  let mut fields = match inner {
    serde_json::Value::Object(fields) => fields,
    other => return Err(Error::InvalidValue(format!("@ref expects an object, got {}", other))),
  };
  let id = match fields.remove("id") {
    Some(serde_json::Value::String(id)) => id,
    Some(serde_json::Value::Number(n)) => n.to_string(),
    _ => return Err(Error::InvalidValue("@ref without an id".to_string())),
  };
  let collection = fields.remove("collection").map(nested_ref).transpose()?;
  let database = fields.remove("database").map(nested_ref).transpose()?;

  Ok(match (collection, database) {
    (None, None) => Native::from_id(&id).map(Native::to_ref).unwrap_or_else(|| Ref::new(id)),
    (Some(collection), database) => {
      let r = Ref::with_collection(id, collection);
      match database {
        Some(db) => r.with_database(db),
        None => r,
      }
    }
    (None, Some(database)) => Ref::new(id).with_database(database),
  })
}

fn nested_ref(value: serde_json::Value) -> Result<Ref> {
  match Value::try_from(value)? {
    Value::Ref(r) => Ok(r),
    other => Err(Error::InvalidValue(format!("expected a reference, got {:?}", other))),
  }
}

impl<'de> Deserialize<'de> for Value {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    Value::try_from(raw).map_err(serde::de::Error::custom)
  }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match self {
      Value::Null => serializer.serialize_unit(),
      Value::Bool(b) => serializer.serialize_bool(*b),
      Value::Number(n) => n.serialize(serializer),
      Value::String(s) => serializer.serialize_str(s),
      Value::Array(items) => {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
          seq.serialize_element(item)?;
        }
        seq.end()
      }
      Value::Object(fields) => {
        if fields.keys().any(|k| k.starts_with('@')) {
          tagged(serializer, "@obj", fields)
        } else {
          fields.serialize(serializer)
        }
      }
      Value::Ref(r) => tagged(serializer, "@ref", &RefFields(r)),
      Value::Set(s) => tagged(serializer, "@set", s.value()),
      Value::Time(t) => tagged(serializer, "@ts", t.as_str()),
      Value::Date(d) => tagged(serializer, "@date", d.as_str()),
      Value::Bytes(b) => tagged(serializer, "@bytes", &b.to_base64()),
      Value::Query(q) => tagged(serializer, "@query", q.value()),
    }
  }
}

fn tagged<S: Serializer, T: Serialize + ?Sized>(
  serializer: S,
  tag: &str,
  value: &T,
) -> std::result::Result<S::Ok, S::Error> {
  let mut map = serializer.serialize_map(Some(1))?;
  map.serialize_entry(tag, value)?;
  map.end()
}

struct RefFields<'a>(&'a Ref);

impl Serialize for RefFields<'_> {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let r = self.0;
    let len = 1 + usize::from(r.collection().is_some()) + usize::from(r.database().is_some());
    let mut map = serializer.serialize_map(Some(len))?;
    map.serialize_entry("id", r.id())?;
    if let Some(collection) = r.collection() {
      map.serialize_entry("collection", &Value::Ref(collection.clone()))?;
    }
    if let Some(database) = r.database() {
      map.serialize_entry("database", &Value::Ref(database.clone()))?;
    }
    map.end()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_streaming_keeps_partial_record() {
    let (values, rest) = parse_json_streaming("{\"a\": 1}\n{\"b\"").unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(rest, "{\"b\"");
  }

  #[test]
  fn test_streaming_rejects_broken_line() {
    assert!(parse_json_streaming("{\"a\": }\n").is_err());
  }

  #[test]
  fn test_fragments_join_split_utf8() {
    let record = "{\"name\": \"caf\u{e9}\"}\n".as_bytes();
    let split = record.len() - 4;
    let mut fragments = JsonFragments::new();
    assert!(fragments.push(&record[..split]).unwrap().is_empty());
    let values = fragments.push(&record[split..]).unwrap();
    assert_eq!(values[0]["name"], Value::from("caf\u{e9}"));
    assert_eq!(fragments.pending(), "");
  }

  #[test]
  fn test_ref_without_id_is_rejected() {
    assert!(parse_json(r#"{"@ref": {"collection": 1}}"#).is_err());
  }
}
