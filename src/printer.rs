//! Functional-notation rendering of expressions and values, e.g.
//! `Match(Index("users_by_name"), "alice")`. Diagnostics only; the wire format
//! is JSON.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter, Write};

use crate::expr::{Call, Expr, Pattern};
use crate::ops::Param;
use crate::values::{Bytes, FaunaDate, FaunaTime, QueryValue, Ref, SetRef, Value};

impl Display for Expr {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Expr::Null => f.write_str("null"),
      Expr::Bool(b) => write!(f, "{}", b),
      Expr::Number(n) => write!(f, "{}", n),
      Expr::String(s) => write_quoted(f, s),
      Expr::Array(items) => write_list(f, "[", items, "]"),
      Expr::Object(fields) => write_object(f, fields),
      Expr::Value(value) => write!(f, "{}", value),
      Expr::Var(name) => {
        f.write_str("Var(")?;
        write_quoted(f, name)?;
        f.write_str(")")
      }
      Expr::Lambda { params, body } => write!(f, "Lambda({}, {})", params, body),
      Expr::Let { bindings, body } => {
        f.write_str("Let({")?;
        for (i, (name, value)) in bindings.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write_key(f, name)?;
          write!(f, ": {}", value)?;
        }
        write!(f, "}}, {})", body)
      }
      Expr::Call(call) => write!(f, "{}", call),
    }
  }
}

impl Display for Call {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let spec = self.op().spec();
    let mut args: Vec<String> = Vec::new();
    let mut options: Option<(usize, BTreeMap<&str, &Expr>)> = None;

    for (key, value) in self.fields() {
      match spec.param(key) {
        Some(Param::Named(_)) => {
          let at = args.len();
          options.get_or_insert_with(|| (at, BTreeMap::new())).1.insert(*key, value);
        }
        Some(Param::Optional(_)) if value.is_null() => {}
        Some(p) if p.is_variadic() => match value {
          Expr::Array(items) => args.extend(items.iter().map(ToString::to_string)),
          single => args.push(single.to_string()),
        },
        _ => args.push(value.to_string()),
      }
    }

    if let Some((at, opts)) = options {
      let mut rendered = String::from("{");
      for (i, (key, value)) in opts.iter().enumerate() {
        if i > 0 {
          rendered.push_str(", ");
        }
        write!(rendered, "{}: {}", key, value)?;
      }
      rendered.push('}');
      args.insert(at, rendered);
    }

    write!(f, "{}({})", spec.name, args.join(", "))
  }
}

impl Display for Pattern {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Pattern::Name(name) => write_quoted(f, name),
      Pattern::Array(items) => write_list(f, "[", items, "]"),
      Pattern::Object(fields) => write_object(f, fields),
    }
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => f.write_str("null"),
      Value::Bool(b) => write!(f, "{}", b),
      Value::Number(n) => write!(f, "{}", n),
      Value::String(s) => write_quoted(f, s),
      Value::Array(items) => write_list(f, "[", items, "]"),
      Value::Object(fields) => write_object(f, fields),
      Value::Ref(r) => write!(f, "{}", r),
      Value::Set(s) => write!(f, "{}", s),
      Value::Time(t) => write!(f, "{}", t),
      Value::Date(d) => write!(f, "{}", d),
      Value::Bytes(b) => write!(f, "{}", b),
      Value::Query(q) => write!(f, "{}", q),
    }
  }
}

impl Display for Ref {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let Some(collection) = self.collection() else {
      let Some(native) = self.native() else {
        f.write_str("Ref(")?;
        write_quoted(f, self.id())?;
        return f.write_str(")");
      };
      return match self.database() {
        Some(db) => write!(f, "{}({})", native.plural_name(), db),
        None => write!(f, "{}()", native.plural_name()),
      };
    };

    if let Some(name) = collection.native().and_then(|n| n.singular_name()) {
      write!(f, "{}(", name)?;
      write_quoted(f, self.id())?;
      if let Some(db) = self.database() {
        write!(f, ", {}", db)?;
      }
      return f.write_str(")");
    }

    write!(f, "Ref({}, ", collection)?;
    write_quoted(f, self.id())?;
    f.write_str(")")
  }
}

impl Display for SetRef {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "SetRef({})", Expr::from_wire(self.value()))
  }
}

impl Display for QueryValue {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "Query({})", Expr::from_wire(self.value()))
  }
}

impl Display for FaunaTime {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.write_str("Time(")?;
    write_quoted(f, self.as_str())?;
    f.write_str(")")
  }
}

impl Display for FaunaDate {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.write_str("Date(")?;
    write_quoted(f, self.as_str())?;
    f.write_str(")")
  }
}

impl Display for Bytes {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.write_str("Bytes(")?;
    write_quoted(f, &self.to_base64())?;
    f.write_str(")")
  }
}

fn write_quoted(f: &mut Formatter<'_>, s: &str) -> fmt::Result {
  match serde_json::to_string(s) {
    Ok(quoted) => f.write_str(&quoted),
    Err(_) => Err(fmt::Error),
  }
}

// Identifier-like keys print bare, anything else quoted.
fn write_key(f: &mut Formatter<'_>, key: &str) -> fmt::Result {
  let mut chars = key.chars();
  let bare = chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
  if bare {
    f.write_str(key)
  } else {
    write_quoted(f, key)
  }
}

fn write_list<T: Display>(f: &mut Formatter<'_>, open: &str, items: &[T], close: &str) -> fmt::Result {
  f.write_str(open)?;
  for (i, item) in items.iter().enumerate() {
    if i > 0 {
      f.write_str(", ")?;
    }
    write!(f, "{}", item)?;
  }
  f.write_str(close)
}

fn write_object<T: Display>(f: &mut Formatter<'_>, fields: &BTreeMap<String, T>) -> fmt::Result {
  f.write_str("{")?;
  for (i, (key, value)) in fields.iter().enumerate() {
    if i > 0 {
      f.write_str(", ")?;
    }
    write_key(f, key)?;
    write!(f, ": {}", value)?;
  }
  f.write_str("}")
}
