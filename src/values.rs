//! Value model for decoded FaunaDB responses.
//!
//! Responses are trees of plain JSON data with tagged leaves (`@ref`, `@set`,
//! `@ts`, `@date`, `@bytes`, `@query`). [`Value`] is the decoded form of such a
//! tree. Values compare structurally and are immutable once built.

use std::collections::BTreeMap;
use std::ops::Index;

use base64::prelude::*;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Number;

use crate::error::{Error, Result};

/// A decoded response value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Number(Number),
  String(String),
  Array(Vec<Value>),
  Object(BTreeMap<String, Value>),
  Ref(Ref),
  Set(SetRef),
  Time(FaunaTime),
  Date(FaunaDate),
  Bytes(Bytes),
  Query(QueryValue),
}

static NULL: Value = Value::Null;

impl Value {
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Value::Number(n) => n.as_i64(),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Number(n) => n.as_f64(),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_array(&self) -> Option<&Vec<Value>> {
    match self {
      Value::Array(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
    match self {
      Value::Object(map) => Some(map),
      _ => None,
    }
  }

  pub fn as_reference(&self) -> Option<&Ref> {
    match self {
      Value::Ref(r) => Some(r),
      _ => None,
    }
  }

  /// Look up a field of an object value.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.as_object().and_then(|map| map.get(key))
  }
}

impl Index<&str> for Value {
  type Output = Value;

  /// Missing fields and non-objects index to `Null`.
  fn index(&self, key: &str) -> &Value {
    self.get(key).unwrap_or(&NULL)
  }
}

impl Index<usize> for Value {
  type Output = Value;

  fn index(&self, index: usize) -> &Value {
    self
      .as_array()
      .and_then(|items| items.get(index))
      .unwrap_or(&NULL)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self {
    Value::Number(n.into())
  }
}

/// Non-finite floats become `Null`.
impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
  fn from(items: Vec<T>) -> Self {
    Value::Array(items.into_iter().map(Into::into).collect())
  }
}

impl From<BTreeMap<String, Value>> for Value {
  fn from(map: BTreeMap<String, Value>) -> Self {
    Value::Object(map)
  }
}

impl From<Ref> for Value {
  fn from(r: Ref) -> Self {
    Value::Ref(r)
  }
}

impl From<SetRef> for Value {
  fn from(s: SetRef) -> Self {
    Value::Set(s)
  }
}

impl From<FaunaTime> for Value {
  fn from(t: FaunaTime) -> Self {
    Value::Time(t)
  }
}

impl From<FaunaDate> for Value {
  fn from(d: FaunaDate) -> Self {
    Value::Date(d)
  }
}

impl From<Bytes> for Value {
  fn from(b: Bytes) -> Self {
    Value::Bytes(b)
  }
}

impl From<QueryValue> for Value {
  fn from(q: QueryValue) -> Self {
    Value::Query(q)
  }
}

/// Built-in root collections. A reference to one of these carries only an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Native {
  Classes,
  Collections,
  Databases,
  Indexes,
  Functions,
  Roles,
  Keys,
  Tokens,
  Credentials,
  AccessProviders,
}

impl Native {
  pub const ALL: [Native; 10] = [
    Native::Classes,
    Native::Collections,
    Native::Databases,
    Native::Indexes,
    Native::Functions,
    Native::Roles,
    Native::Keys,
    Native::Tokens,
    Native::Credentials,
    Native::AccessProviders,
  ];

  pub fn id(self) -> &'static str {
    match self {
      Native::Classes => "classes",
      Native::Collections => "collections",
      Native::Databases => "databases",
      Native::Indexes => "indexes",
      Native::Functions => "functions",
      Native::Roles => "roles",
      Native::Keys => "keys",
      Native::Tokens => "tokens",
      Native::Credentials => "credentials",
      Native::AccessProviders => "access_providers",
    }
  }

  pub fn from_id(id: &str) -> Option<Native> {
    Native::ALL.into_iter().find(|n| n.id() == id)
  }

  /// Name of the function that lists this root, e.g. `Collections`.
  pub fn plural_name(self) -> &'static str {
    match self {
      Native::Classes => "Classes",
      Native::Collections => "Collections",
      Native::Databases => "Databases",
      Native::Indexes => "Indexes",
      Native::Functions => "Functions",
      Native::Roles => "Roles",
      Native::Keys => "Keys",
      Native::Tokens => "Tokens",
      Native::Credentials => "Credentials",
      Native::AccessProviders => "AccessProviders",
    }
  }

  /// Name of the function that builds a member reference, e.g. `Collection`.
  pub fn singular_name(self) -> Option<&'static str> {
    match self {
      Native::Classes => Some("Class"),
      Native::Collections => Some("Collection"),
      Native::Databases => Some("Database"),
      Native::Indexes => Some("Index"),
      Native::Functions => Some("Function"),
      Native::Roles => Some("Role"),
      Native::AccessProviders => Some("AccessProvider"),
      Native::Keys | Native::Tokens | Native::Credentials => None,
    }
  }

  pub fn to_ref(self) -> Ref {
    Ref::new(self.id())
  }
}

impl From<Native> for Ref {
  fn from(n: Native) -> Self {
    n.to_ref()
  }
}

/// A reference to a document, schema object or native root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ref {
  id: String,
  collection: Option<Box<Ref>>,
  database: Option<Box<Ref>>,
}

impl Ref {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      collection: None,
      database: None,
    }
  }

  pub fn with_collection(id: impl Into<String>, collection: Ref) -> Self {
    Self {
      id: id.into(),
      collection: Some(Box::new(collection)),
      database: None,
    }
  }

  pub fn with_database(mut self, database: Ref) -> Self {
    self.database = Some(Box::new(database));
    self
  }

  /// Reference to the collection `name`.
  pub fn collection_named(name: impl Into<String>) -> Self {
    Self::with_collection(name, Native::Collections.to_ref())
  }

  /// Reference to the index `name`.
  pub fn index_named(name: impl Into<String>) -> Self {
    Self::with_collection(name, Native::Indexes.to_ref())
  }

  /// Reference to the database `name`.
  pub fn database_named(name: impl Into<String>) -> Self {
    Self::with_collection(name, Native::Databases.to_ref())
  }

  /// Reference to the user-defined function `name`.
  pub fn function_named(name: impl Into<String>) -> Self {
    Self::with_collection(name, Native::Functions.to_ref())
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn collection(&self) -> Option<&Ref> {
    self.collection.as_deref()
  }

  pub fn database(&self) -> Option<&Ref> {
    self.database.as_deref()
  }

  /// The native root this reference names, if it is one.
  pub fn native(&self) -> Option<Native> {
    if self.collection.is_some() {
      return None;
    }
    Native::from_id(&self.id)
  }
}

/// A set reference; wraps the raw query describing the set.
#[derive(Debug, Clone, PartialEq)]
pub struct SetRef(Box<Value>);

impl SetRef {
  pub fn new(value: Value) -> Self {
    Self(Box::new(value))
  }

  pub fn value(&self) -> &Value {
    &self.0
  }
}

/// A timestamp. The ISO-8601 text is kept verbatim so nanoseconds survive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FaunaTime(String);

impl FaunaTime {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn from_datetime(dt: DateTime<Utc>) -> Self {
    Self(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn to_datetime(&self) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&self.0)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(|e| Error::InvalidValue(format!("invalid timestamp {:?}: {}", self.0, e)))
  }
}

impl From<DateTime<Utc>> for FaunaTime {
  fn from(dt: DateTime<Utc>) -> Self {
    Self::from_datetime(dt)
  }
}

/// A calendar date, `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FaunaDate(String);

impl FaunaDate {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn from_naive(date: NaiveDate) -> Self {
    Self(date.format("%Y-%m-%d").to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn to_naive_date(&self) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&self.0, "%Y-%m-%d")
      .map_err(|e| Error::InvalidValue(format!("invalid date {:?}: {}", self.0, e)))
  }
}

impl From<NaiveDate> for FaunaDate {
  fn from(date: NaiveDate) -> Self {
    Self::from_naive(date)
  }
}

/// A byte blob. Encodes on the wire as standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bytes(Vec<u8>);

impl Bytes {
  pub fn new(bytes: Vec<u8>) -> Self {
    Self(bytes)
  }

  pub fn from_base64(encoded: &str) -> Result<Self> {
    Ok(Self(BASE64_STANDARD.decode(encoded)?))
  }

  /// Accepts a base64 string or an array of byte-sized integers.
  pub fn from_json(value: &serde_json::Value) -> Result<Self> {
    match value {
      serde_json::Value::String(s) => Self::from_base64(s),
      serde_json::Value::Array(items) => items
        .iter()
        .map(|item| {
          item
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| Error::InvalidValue(format!("not a byte: {}", item)))
        })
        .collect::<Result<Vec<u8>>>()
        .map(Self),
      other => Err(Error::InvalidValue(format!(
        "Bytes expects a base64 string or a byte array, got {}",
        other
      ))),
    }
  }

  pub fn to_base64(&self) -> String {
    BASE64_STANDARD.encode(&self.0)
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.0
  }

  pub fn into_vec(self) -> Vec<u8> {
    self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<Vec<u8>> for Bytes {
  fn from(bytes: Vec<u8>) -> Self {
    Self(bytes)
  }
}

impl From<&[u8]> for Bytes {
  fn from(bytes: &[u8]) -> Self {
    Self(bytes.to_vec())
  }
}

impl<const N: usize> From<[u8; N]> for Bytes {
  fn from(bytes: [u8; N]) -> Self {
    Self(bytes.to_vec())
  }
}

/// A query stored as data, typically a lambda.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryValue(Box<Value>);

impl QueryValue {
  pub fn new(value: Value) -> Self {
    Self(Box::new(value))
  }

  pub fn value(&self) -> &Value {
    &self.0
  }
}
