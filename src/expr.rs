//! Query expression tree.
//!
//! [`Expr`] is the intermediate representation handed to the database. Any
//! native value converts into it through `From`, recursively, and an `Expr`
//! converts into itself unchanged. The tree serializes to the wire format
//! with an explicit key mapping per node kind.

use std::collections::{BTreeMap, HashMap};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Number;

use crate::error::Result;
use crate::ops::{Op, Param};
use crate::values::{Bytes, FaunaDate, FaunaTime, QueryValue, Ref, SetRef, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Null,
  Bool(bool),
  Number(Number),
  String(String),
  Array(Vec<Expr>),
  /// An object literal; sent as `{"object": {...}}`.
  Object(BTreeMap<String, Expr>),
  /// A decoded value used as a literal (reference, timestamp, bytes, ...).
  Value(Value),
  Var(String),
  Lambda {
    params: Pattern,
    body: Box<Expr>,
  },
  Let {
    bindings: Vec<(String, Expr)>,
    body: Box<Expr>,
  },
  Call(Box<Call>),
}

/// An operator applied to its operands. Operands are stored in call order,
/// each under its wire key.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
  op: Op,
  fields: Vec<(&'static str, Expr)>,
}

impl Call {
  pub(crate) fn new(op: Op, fields: Vec<(&'static str, Expr)>) -> Self {
    Self { op, fields }
  }

  pub fn op(&self) -> Op {
    self.op
  }

  pub fn fields(&self) -> &[(&'static str, Expr)] {
    &self.fields
  }

  pub fn field(&self, key: &str) -> Option<&Expr> {
    self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
  }
}

impl Expr {
  pub fn is_null(&self) -> bool {
    matches!(self, Expr::Null)
  }

  pub fn as_call(&self) -> Option<&Call> {
    match self {
      Expr::Call(call) => Some(call),
      _ => None,
    }
  }

  /// Convert a raw query as found inside `@set` and `@query` values back
  /// into an expression tree.
  pub fn from_wire(value: &Value) -> Expr {
    match value {
      Value::Null => Expr::Null,
      Value::Bool(b) => Expr::Bool(*b),
      Value::Number(n) => Expr::Number(n.clone()),
      Value::String(s) => Expr::String(s.clone()),
      Value::Array(items) => Expr::Array(items.iter().map(Expr::from_wire).collect()),
      Value::Object(map) => from_wire_object(map),
      other => Expr::Value(other.clone()),
    }
  }
}

fn from_wire_object(map: &BTreeMap<String, Value>) -> Expr {
  if map.len() == 1 {
    if let Some(Value::Object(fields)) = map.get("object") {
      return Expr::Object(
        fields
          .iter()
          .map(|(k, v)| (k.clone(), Expr::from_wire(v)))
          .collect(),
      );
    }
    if let Some(Value::String(name)) = map.get("var") {
      return Expr::Var(name.clone());
    }
  }

  if let (Some(params), Some(body)) = (map.get("lambda"), map.get("expr")) {
    if map.keys().all(|k| matches!(k.as_str(), "lambda" | "expr" | "api_version")) {
      return Expr::Lambda {
        params: Pattern::from_wire(params),
        body: Box::new(Expr::from_wire(body)),
      };
    }
  }

  if let (Some(bindings), Some(body)) = (map.get("let"), map.get("in")) {
    if map.len() == 2 {
      let bindings = match bindings {
        Value::Array(items) => items
          .iter()
          .filter_map(Value::as_object)
          .flat_map(|m| m.iter())
          .map(|(k, v)| (k.clone(), Expr::from_wire(v)))
          .collect(),
        Value::Object(m) => m.iter().map(|(k, v)| (k.clone(), Expr::from_wire(v))).collect(),
        _ => Vec::new(),
      };
      return Expr::Let {
        bindings,
        body: Box::new(Expr::from_wire(body)),
      };
    }
  }

  let op = Op::ALL.iter().copied().find(|op| {
    let spec = op.spec();
    map.contains_key(spec.key) && map.keys().all(|k| k == spec.key || spec.param(k).is_some())
  });
  match op {
    Some(op) => {
      let fields = op
        .spec()
        .params
        .iter()
        .filter_map(|p| map.get(p.key()).map(|v| (p.key(), Expr::from_wire(v))))
        .filter(|(key, v)| !(v.is_null() && *key != op.key() && is_optional(op, key)))
        .collect();
      Expr::Call(Box::new(Call::new(op, fields)))
    }
    None => Expr::Object(
      map
        .iter()
        .map(|(k, v)| (k.clone(), Expr::from_wire(v)))
        .collect(),
    ),
  }
}

fn is_optional(op: Op, key: &str) -> bool {
  matches!(op.spec().param(key), Some(Param::Optional(_)))
}

/// Variable binding pattern of a lambda.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
  Name(String),
  Array(Vec<Pattern>),
  Object(BTreeMap<String, Pattern>),
}

impl Pattern {
  /// Every leaf name bound by the pattern; empty names bind nothing.
  pub fn names(&self) -> Vec<&str> {
    let mut out = Vec::new();
    self.collect_names(&mut out);
    out
  }

  fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
    match self {
      Pattern::Name(name) if name.is_empty() => {}
      Pattern::Name(name) => out.push(name),
      Pattern::Array(items) => items.iter().for_each(|p| p.collect_names(out)),
      Pattern::Object(fields) => fields.values().for_each(|p| p.collect_names(out)),
    }
  }

  fn from_wire(value: &Value) -> Pattern {
    match value {
      Value::Array(items) => Pattern::Array(items.iter().map(Pattern::from_wire).collect()),
      Value::Object(fields) => Pattern::Object(
        fields
          .iter()
          .map(|(k, v)| (k.clone(), Pattern::from_wire(v)))
          .collect(),
      ),
      Value::String(name) => Pattern::Name(name.clone()),
      _ => Pattern::Name(String::new()),
    }
  }
}

impl From<&str> for Pattern {
  fn from(name: &str) -> Self {
    Pattern::Name(name.to_string())
  }
}

impl From<String> for Pattern {
  fn from(name: String) -> Self {
    Pattern::Name(name)
  }
}

impl<P: Into<Pattern>> From<Vec<P>> for Pattern {
  fn from(items: Vec<P>) -> Self {
    Pattern::Array(items.into_iter().map(Into::into).collect())
  }
}

impl<P: Into<Pattern>, const N: usize> From<[P; N]> for Pattern {
  fn from(items: [P; N]) -> Self {
    Pattern::Array(items.into_iter().map(Into::into).collect())
  }
}

impl<K: Into<String>, P: Into<Pattern>> From<BTreeMap<K, P>> for Pattern {
  fn from(fields: BTreeMap<K, P>) -> Self {
    Pattern::Object(
      fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }
}

/// Variables bound by a lambda or let, handed to the body builder.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
  vars: BTreeMap<String, Expr>,
}

impl Bindings {
  pub(crate) fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
    Self {
      vars: names
        .into_iter()
        .map(|name| (name.to_string(), Expr::Var(name.to_string())))
        .collect(),
    }
  }

  pub fn get(&self, name: &str) -> Option<&Expr> {
    self.vars.get(name)
  }

  /// The variable reference for `name`; unbound names are an error.
  pub fn var(&self, name: &str) -> Result<Expr> {
    self.vars.get(name).cloned().ok_or_else(|| {
      crate::Error::InvalidValue(format!("variable {:?} is not bound here", name))
    })
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.vars.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }
}

/// Result of a lambda or let body builder. Bodies may be infallible or not.
pub trait IntoBody {
  fn into_body(self) -> Result<Expr>;
}

impl IntoBody for Expr {
  fn into_body(self) -> Result<Expr> {
    Ok(self)
  }
}

impl IntoBody for Result<Expr> {
  fn into_body(self) -> Result<Expr> {
    self
  }
}

/// Name generator for lambdas whose variables the caller does not name.
///
/// Each top-level build owns one scope. A lambda takes the next free names
/// for the duration of its body and returns them afterwards, so sibling
/// lambdas reuse names and nested ones never collide.
#[derive(Debug, Default)]
pub struct Scope {
  next: usize,
}

impl Scope {
  pub fn new() -> Self {
    Self::default()
  }

  /// Index of the next name this scope will hand out.
  pub fn next_index(&self) -> usize {
    self.next
  }

  pub fn lambda1<F, B>(&mut self, body: F) -> Result<Expr>
  where
    F: FnOnce(&mut Scope, Expr) -> B,
    B: IntoBody,
  {
    self.with_names(1, |scope, mut vars| {
      let a = vars.remove(0);
      body(scope, a)
    })
  }

  pub fn lambda2<F, B>(&mut self, body: F) -> Result<Expr>
  where
    F: FnOnce(&mut Scope, Expr, Expr) -> B,
    B: IntoBody,
  {
    self.with_names(2, |scope, vars| {
      let mut vars = vars.into_iter();
      let a = vars.next().unwrap_or(Expr::Null);
      let b = vars.next().unwrap_or(Expr::Null);
      body(scope, a, b)
    })
  }

  pub fn lambda3<F, B>(&mut self, body: F) -> Result<Expr>
  where
    F: FnOnce(&mut Scope, Expr, Expr, Expr) -> B,
    B: IntoBody,
  {
    self.with_names(3, |scope, vars| {
      let mut vars = vars.into_iter();
      let a = vars.next().unwrap_or(Expr::Null);
      let b = vars.next().unwrap_or(Expr::Null);
      let c = vars.next().unwrap_or(Expr::Null);
      body(scope, a, b, c)
    })
  }

  /// A lambda over `count` generated variables, passed to `body` in order.
  pub fn lambda_n<F, B>(&mut self, count: usize, body: F) -> Result<Expr>
  where
    F: FnOnce(&mut Scope, Vec<Expr>) -> B,
    B: IntoBody,
  {
    if count == 0 {
      return Err(crate::Error::InvalidValue(
        "a lambda must bind at least one variable".to_string(),
      ));
    }
    self.with_names(count, body)
  }

  fn with_names<F, B>(&mut self, count: usize, body: F) -> Result<Expr>
  where
    F: FnOnce(&mut Scope, Vec<Expr>) -> B,
    B: IntoBody,
  {
    let base = self.next;
    let names: Vec<String> = (base..base + count).map(|i| format!("auto{}", i)).collect();
    self.next = base + count;
    let vars = names.iter().map(|n| Expr::Var(n.clone())).collect();
    let result = body(self, vars).into_body();
    self.next = base;

    let params = if count == 1 {
      Pattern::Name(names.into_iter().next().unwrap_or_default())
    } else {
      Pattern::Array(names.into_iter().map(Pattern::Name).collect())
    };
    Ok(Expr::Lambda {
      params,
      body: Box::new(result?),
    })
  }
}

impl From<bool> for Expr {
  fn from(b: bool) -> Self {
    Expr::Bool(b)
  }
}

macro_rules! from_integer {
  ($($t:ty),*) => {
    $(impl From<$t> for Expr {
      fn from(n: $t) -> Self {
        Expr::Number(n.into())
      }
    })*
  };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

/// NaN and the infinities have no JSON form and become `Null`. Use
/// [`query::number`](crate::query::number) to reject them instead.
impl From<f64> for Expr {
  fn from(n: f64) -> Self {
    Number::from_f64(n).map(Expr::Number).unwrap_or(Expr::Null)
  }
}

impl From<f32> for Expr {
  fn from(n: f32) -> Self {
    Expr::from(f64::from(n))
  }
}

impl From<&str> for Expr {
  fn from(s: &str) -> Self {
    Expr::String(s.to_string())
  }
}

impl From<String> for Expr {
  fn from(s: String) -> Self {
    Expr::String(s)
  }
}

impl From<&String> for Expr {
  fn from(s: &String) -> Self {
    Expr::String(s.clone())
  }
}

impl From<()> for Expr {
  fn from(_: ()) -> Self {
    Expr::Null
  }
}

impl<T: Into<Expr>> From<Option<T>> for Expr {
  fn from(value: Option<T>) -> Self {
    value.map(Into::into).unwrap_or(Expr::Null)
  }
}

impl<T: Into<Expr>> From<Vec<T>> for Expr {
  fn from(items: Vec<T>) -> Self {
    Expr::Array(items.into_iter().map(Into::into).collect())
  }
}

impl<T: Into<Expr>, const N: usize> From<[T; N]> for Expr {
  fn from(items: [T; N]) -> Self {
    Expr::Array(items.into_iter().map(Into::into).collect())
  }
}

impl<K: Into<String>, T: Into<Expr>> From<BTreeMap<K, T>> for Expr {
  fn from(fields: BTreeMap<K, T>) -> Self {
    Expr::Object(
      fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }
}

impl<K: Into<String>, T: Into<Expr>> From<HashMap<K, T>> for Expr {
  fn from(fields: HashMap<K, T>) -> Self {
    Expr::Object(
      fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }
}

impl From<serde_json::Value> for Expr {
  fn from(value: serde_json::Value) -> Self {
    match value {
      serde_json::Value::Null => Expr::Null,
      serde_json::Value::Bool(b) => Expr::Bool(b),
      serde_json::Value::Number(n) => Expr::Number(n),
      serde_json::Value::String(s) => Expr::String(s),
      serde_json::Value::Array(items) => Expr::Array(items.into_iter().map(Expr::from).collect()),
      serde_json::Value::Object(map) => {
        Expr::Object(map.into_iter().map(|(k, v)| (k, Expr::from(v))).collect())
      }
    }
  }
}

impl From<Value> for Expr {
  fn from(value: Value) -> Self {
    match value {
      Value::Null => Expr::Null,
      Value::Bool(b) => Expr::Bool(b),
      Value::Number(n) => Expr::Number(n),
      Value::String(s) => Expr::String(s),
      Value::Array(items) => Expr::Array(items.into_iter().map(Expr::from).collect()),
      Value::Object(map) => Expr::Object(map.into_iter().map(|(k, v)| (k, Expr::from(v))).collect()),
      other => Expr::Value(other),
    }
  }
}

impl From<&Value> for Expr {
  fn from(value: &Value) -> Self {
    Expr::from(value.clone())
  }
}

macro_rules! from_value_type {
  ($($t:ty),*) => {
    $(impl From<$t> for Expr {
      fn from(v: $t) -> Self {
        Expr::Value(Value::from(v))
      }
    })*
  };
}

from_value_type!(Ref, SetRef, FaunaTime, FaunaDate, Bytes, QueryValue);

impl From<&[u8]> for Expr {
  fn from(bytes: &[u8]) -> Self {
    Expr::Value(Value::Bytes(Bytes::from(bytes)))
  }
}

// `Vec<u8>` and `[u8; N]` go through the generic array impls; borrow them
// as `&[u8]` or wrap them in `Bytes` to send `@bytes`.
impl From<&Vec<u8>> for Expr {
  fn from(bytes: &Vec<u8>) -> Self {
    Expr::from(bytes.as_slice())
  }
}

impl From<&Ref> for Expr {
  fn from(r: &Ref) -> Self {
    Expr::Value(Value::Ref(r.clone()))
  }
}

impl Serialize for Expr {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match self {
      Expr::Null => serializer.serialize_unit(),
      Expr::Bool(b) => serializer.serialize_bool(*b),
      Expr::Number(n) => n.serialize(serializer),
      Expr::String(s) => serializer.serialize_str(s),
      Expr::Array(items) => {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
          seq.serialize_element(item)?;
        }
        seq.end()
      }
      Expr::Object(fields) => {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("object", fields)?;
        map.end()
      }
      Expr::Value(value) => value.serialize(serializer),
      Expr::Var(name) => {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("var", name)?;
        map.end()
      }
      Expr::Lambda { params, body } => {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("lambda", params)?;
        map.serialize_entry("expr", body)?;
        map.end()
      }
      Expr::Let { bindings, body } => {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("let", &LetBindings(bindings))?;
        map.serialize_entry("in", body)?;
        map.end()
      }
      Expr::Call(call) => call.serialize(serializer),
    }
  }
}

impl Serialize for Call {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let primary = self.op.key();
    let mut map = serializer.serialize_map(Some(self.fields.len().max(1)))?;
    match self.field(primary) {
      Some(value) => map.serialize_entry(primary, value)?,
      None => map.serialize_entry(primary, &Expr::Null)?,
    }
    for (key, value) in &self.fields {
      if *key != primary {
        map.serialize_entry(key, value)?;
      }
    }
    map.end()
  }
}

impl Serialize for Pattern {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match self {
      Pattern::Name(name) => serializer.serialize_str(name),
      Pattern::Array(items) => items.serialize(serializer),
      Pattern::Object(fields) => fields.serialize(serializer),
    }
  }
}

/// `let` bindings go out as an ordered list of single-entry maps.
struct LetBindings<'a>(&'a [(String, Expr)]);

impl Serialize for LetBindings<'_> {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
    for (name, value) in self.0 {
      seq.serialize_element(&Binding(name, value))?;
    }
    seq.end()
  }
}

struct Binding<'a>(&'a str, &'a Expr);

impl Serialize for Binding<'_> {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(self.0, self.1)?;
    map.end()
  }
}
