//! Operator table.
//!
//! Every query function is one [`Op`] case. Its [`OpSpec`] names the wire key
//! of each positional operand, which in turn decides arity, vararg handling
//! and whether an absent operand is omitted from the wire.

use std::fmt;

use crate::error::{Error, Result};
use crate::expr::{Call, Expr};

/// One operand slot of an operator, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
  /// Exactly one operand.
  Required(&'static str),
  /// Zero or one operand; a null operand is left off the wire.
  Optional(&'static str),
  /// A keyed option merged from a trailing options object. An explicit
  /// null is sent, an absent key is not.
  Named(&'static str),
  /// One or more trailing operands, emitted with the vararg rule.
  Varargs(&'static str),
  /// Zero or more trailing operands, emitted with the vararg rule.
  Rest(&'static str),
  /// One or more trailing operands, always emitted as an array.
  List(&'static str),
}

impl Param {
  pub fn key(self) -> &'static str {
    match self {
      Param::Required(k)
      | Param::Optional(k)
      | Param::Named(k)
      | Param::Varargs(k)
      | Param::Rest(k)
      | Param::List(k) => k,
    }
  }

  pub fn is_variadic(self) -> bool {
    matches!(self, Param::Varargs(_) | Param::Rest(_) | Param::List(_))
  }
}

/// Static description of an operator.
#[derive(Debug)]
pub struct OpSpec {
  /// Function name used by the pretty printer.
  pub name: &'static str,
  /// The wire key that identifies the operator.
  pub key: &'static str,
  pub params: &'static [Param],
}

impl OpSpec {
  pub fn param(&self, key: &str) -> Option<Param> {
    self.params.iter().copied().find(|p| p.key() == key)
  }

  pub fn arity(&self) -> Arity {
    let mut min = 0;
    let mut optional = 0;
    let mut unbounded = false;
    let mut named = false;
    for param in self.params {
      match param {
        Param::Required(_) => min += 1,
        Param::Optional(_) => optional += 1,
        Param::Named(_) => named = true,
        Param::Varargs(_) | Param::List(_) => {
          min += 1;
          unbounded = true;
        }
        Param::Rest(_) => unbounded = true,
      }
    }
    if named {
      optional += 1;
    }
    if unbounded {
      Arity::AtLeast(min)
    } else if optional == 0 {
      Arity::Exact(min)
    } else if min == 0 {
      Arity::Max(optional)
    } else {
      Arity::Between(min, min + optional)
    }
  }
}

/// Declared argument count of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
  Exact(usize),
  AtLeast(usize),
  Between(usize, usize),
  Max(usize),
}

impl Arity {
  pub fn accepts(self, count: usize) -> bool {
    match self {
      Arity::Exact(n) => count == n,
      Arity::AtLeast(n) => count >= n,
      Arity::Between(lo, hi) => (lo..=hi).contains(&count),
      Arity::Max(n) => count <= n,
    }
  }
}

impl fmt::Display for Arity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Arity::Exact(n) => write!(f, "exactly {}", n),
      Arity::AtLeast(n) => write!(f, "at least {}", n),
      Arity::Between(lo, hi) => write!(f, "between {} and {}", lo, hi),
      Arity::Max(n) => write!(f, "at most {}", n),
    }
  }
}

macro_rules! ops {
  ($($variant:ident => $key:literal [$($kind:ident $pkey:literal),*];)*) => {
    /// A query operator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Op {
      $($variant),*
    }

    impl Op {
      pub const ALL: &'static [Op] = &[$(Op::$variant),*];

      pub fn spec(self) -> &'static OpSpec {
        match self {
          $(Op::$variant => {
            const SPEC: OpSpec = OpSpec {
              name: stringify!($variant),
              key: $key,
              params: &[$(Param::$kind($pkey)),*],
            };
            &SPEC
          })*
        }
      }
    }
  };
}

ops! {
  // basic forms
  Ref => "ref" [Required "ref", Required "id"];
  Abort => "abort" [Required "abort"];
  At => "at" [Required "at", Required "expr"];
  If => "if" [Required "if", Required "then", Required "else"];
  Do => "do" [List "do"];
  Call => "call" [Required "call", Rest "arguments"];
  Query => "query" [Required "query"];

  // collections
  Map => "map" [Required "collection", Required "map"];
  Foreach => "foreach" [Required "collection", Required "foreach"];
  Filter => "filter" [Required "collection", Required "filter"];
  Take => "take" [Required "take", Required "collection"];
  Drop => "drop" [Required "drop", Required "collection"];
  Prepend => "prepend" [Required "prepend", Required "collection"];
  Append => "append" [Required "append", Required "collection"];
  Reduce => "reduce" [Required "reduce", Required "initial", Required "collection"];
  Reverse => "reverse" [Required "reverse"];
  IsEmpty => "is_empty" [Required "is_empty"];
  IsNonEmpty => "is_nonempty" [Required "is_nonempty"];

  // type checks
  IsNumber => "is_number" [Required "is_number"];
  IsDouble => "is_double" [Required "is_double"];
  IsInteger => "is_integer" [Required "is_integer"];
  IsBoolean => "is_boolean" [Required "is_boolean"];
  IsNull => "is_null" [Required "is_null"];
  IsBytes => "is_bytes" [Required "is_bytes"];
  IsTimestamp => "is_timestamp" [Required "is_timestamp"];
  IsDate => "is_date" [Required "is_date"];
  IsString => "is_string" [Required "is_string"];
  IsArray => "is_array" [Required "is_array"];
  IsObject => "is_object" [Required "is_object"];
  IsRef => "is_ref" [Required "is_ref"];
  IsSet => "is_set" [Required "is_set"];
  IsDoc => "is_doc" [Required "is_doc"];
  IsLambda => "is_lambda" [Required "is_lambda"];
  IsCollection => "is_collection" [Required "is_collection"];
  IsDatabase => "is_database" [Required "is_database"];
  IsIndex => "is_index" [Required "is_index"];
  IsFunction => "is_function" [Required "is_function"];
  IsKey => "is_key" [Required "is_key"];
  IsToken => "is_token" [Required "is_token"];
  IsCredentials => "is_credentials" [Required "is_credentials"];
  IsRole => "is_role" [Required "is_role"];

  // reads
  Get => "get" [Required "get", Optional "ts"];
  KeyFromSecret => "key_from_secret" [Required "key_from_secret"];
  Paginate => "paginate" [
    Required "paginate",
    Named "size", Named "after", Named "before", Named "ts",
    Named "events", Named "sources", Named "cursor"
  ];
  Exists => "exists" [Required "exists", Optional "ts"];

  // writes
  Create => "create" [Required "create", Optional "params"];
  Update => "update" [Required "update", Required "params"];
  Replace => "replace" [Required "replace", Required "params"];
  Delete => "delete" [Required "delete"];
  Insert => "insert" [Required "insert", Required "ts", Required "action", Required "params"];
  Remove => "remove" [Required "remove", Required "ts", Required "action"];
  CreateClass => "create_class" [Required "create_class"];
  CreateCollection => "create_collection" [Required "create_collection"];
  CreateDatabase => "create_database" [Required "create_database"];
  CreateIndex => "create_index" [Required "create_index"];
  CreateKey => "create_key" [Required "create_key"];
  CreateFunction => "create_function" [Required "create_function"];
  CreateRole => "create_role" [Required "create_role"];
  CreateAccessProvider => "create_access_provider" [Required "create_access_provider"];
  MoveDatabase => "move_database" [Required "move_database", Required "to"];

  // sets
  Singleton => "singleton" [Required "singleton"];
  Events => "events" [Required "events"];
  Match => "match" [Required "match", Rest "terms"];
  Union => "union" [Varargs "union"];
  Merge => "merge" [Required "merge", Required "with", Optional "lambda"];
  Intersection => "intersection" [Varargs "intersection"];
  Difference => "difference" [Varargs "difference"];
  Distinct => "distinct" [Required "distinct"];
  Join => "join" [Required "join", Required "with"];
  Range => "range" [Required "range", Required "from", Required "to"];
  Documents => "documents" [Required "documents"];

  // authentication
  Login => "login" [Required "login", Required "params"];
  Logout => "logout" [Required "logout"];
  Identify => "identify" [Required "identify", Required "password"];
  Identity => "identity" [];
  CurrentIdentity => "current_identity" [];
  HasIdentity => "has_identity" [];
  HasCurrentIdentity => "has_current_identity" [];
  CurrentToken => "current_token" [];
  HasCurrentToken => "has_current_token" [];

  // strings
  Concat => "concat" [Required "concat", Optional "separator"];
  Casefold => "casefold" [Required "casefold", Optional "normalizer"];
  ContainsStr => "containsstr" [Required "containsstr", Required "search"];
  ContainsStrRegex => "containsstrregex" [Required "containsstrregex", Required "pattern"];
  StartsWith => "startswith" [Required "startswith", Required "search"];
  EndsWith => "endswith" [Required "endswith", Required "search"];
  RegexEscape => "regexescape" [Required "regexescape"];
  FindStr => "findstr" [Required "findstr", Required "find", Optional "start"];
  FindStrRegex => "findstrregex" [
    Required "findstrregex", Required "pattern", Optional "start", Optional "num_results"
  ];
  Length => "length" [Required "length"];
  LowerCase => "lowercase" [Required "lowercase"];
  LTrim => "ltrim" [Required "ltrim"];
  NGram => "ngram" [Required "ngram", Optional "min", Optional "max"];
  Repeat => "repeat" [Required "repeat", Optional "number"];
  ReplaceStr => "replacestr" [Required "replacestr", Required "find", Required "replace"];
  ReplaceStrRegex => "replacestrregex" [
    Required "replacestrregex", Required "pattern", Required "replace", Optional "first"
  ];
  RTrim => "rtrim" [Required "rtrim"];
  Space => "space" [Required "space"];
  SubString => "substring" [Required "substring", Optional "start", Optional "length"];
  TitleCase => "titlecase" [Required "titlecase"];
  Trim => "trim" [Required "trim"];
  UpperCase => "uppercase" [Required "uppercase"];
  Format => "format" [Required "format", Rest "values"];

  // time and date
  Time => "time" [Required "time"];
  Epoch => "epoch" [Required "epoch", Required "unit"];
  TimeAdd => "time_add" [Required "time_add", Required "offset", Required "unit"];
  TimeSubtract => "time_subtract" [Required "time_subtract", Required "offset", Required "unit"];
  TimeDiff => "time_diff" [Required "time_diff", Required "other", Required "unit"];
  Date => "date" [Required "date"];
  Now => "now" [];
  ToSeconds => "to_seconds" [Required "to_seconds"];
  ToMillis => "to_millis" [Required "to_millis"];
  ToMicros => "to_micros" [Required "to_micros"];
  DayOfWeek => "day_of_week" [Required "day_of_week"];
  DayOfYear => "day_of_year" [Required "day_of_year"];
  DayOfMonth => "day_of_month" [Required "day_of_month"];
  Hour => "hour" [Required "hour"];
  Minute => "minute" [Required "minute"];
  Second => "second" [Required "second"];
  Month => "month" [Required "month"];
  Year => "year" [Required "year"];

  // miscellaneous
  NextId => "next_id" [];
  NewId => "new_id" [];
  Database => "database" [Required "database", Optional "scope"];
  Index => "index" [Required "index", Optional "scope"];
  Class => "class" [Required "class", Optional "scope"];
  Collection => "collection" [Required "collection", Optional "scope"];
  Function => "function" [Required "function", Optional "scope"];
  Role => "role" [Required "role", Optional "scope"];
  AccessProvider => "access_provider" [Required "access_provider", Optional "scope"];
  AccessProviders => "access_providers" [Optional "access_providers"];
  Classes => "classes" [Optional "classes"];
  Collections => "collections" [Optional "collections"];
  Databases => "databases" [Optional "databases"];
  Indexes => "indexes" [Optional "indexes"];
  Functions => "functions" [Optional "functions"];
  Roles => "roles" [Optional "roles"];
  Keys => "keys" [Optional "keys"];
  Tokens => "tokens" [Optional "tokens"];
  Credentials => "credentials" [Optional "credentials"];
  Equals => "equals" [Varargs "equals"];
  Contains => "contains" [Required "contains", Required "in"];
  ContainsPath => "contains_path" [Required "contains_path", Required "in"];
  ContainsField => "contains_field" [Required "contains_field", Required "in"];
  ContainsValue => "contains_value" [Required "contains_value", Required "in"];
  Select => "select" [Required "select", Required "from", Optional "default"];
  SelectAll => "select_all" [Required "select_all", Required "from"];

  // math
  Abs => "abs" [Required "abs"];
  Add => "add" [Varargs "add"];
  BitAnd => "bitand" [Varargs "bitand"];
  BitNot => "bitnot" [Required "bitnot"];
  BitOr => "bitor" [Varargs "bitor"];
  BitXor => "bitxor" [Varargs "bitxor"];
  Ceil => "ceil" [Required "ceil"];
  Divide => "divide" [Varargs "divide"];
  Floor => "floor" [Required "floor"];
  Max => "max" [Varargs "max"];
  Min => "min" [Varargs "min"];
  Modulo => "modulo" [Varargs "modulo"];
  Multiply => "multiply" [Varargs "multiply"];
  Round => "round" [Required "round", Optional "precision"];
  Subtract => "subtract" [Varargs "subtract"];
  Sign => "sign" [Required "sign"];
  Sqrt => "sqrt" [Required "sqrt"];
  Trunc => "trunc" [Required "trunc", Optional "precision"];
  Count => "count" [Required "count"];
  Sum => "sum" [Required "sum"];
  Mean => "mean" [Required "mean"];
  Any => "any" [Required "any"];
  All => "all" [Required "all"];
  Acos => "acos" [Required "acos"];
  Asin => "asin" [Required "asin"];
  Atan => "atan" [Required "atan"];
  Cos => "cos" [Required "cos"];
  Cosh => "cosh" [Required "cosh"];
  Degrees => "degrees" [Required "degrees"];
  Exp => "exp" [Required "exp"];
  Hypot => "hypot" [Required "hypot", Optional "b"];
  Ln => "ln" [Required "ln"];
  Log => "log" [Required "log"];
  Pow => "pow" [Required "pow", Optional "exp"];
  Radians => "radians" [Required "radians"];
  Sin => "sin" [Required "sin"];
  Sinh => "sinh" [Required "sinh"];
  Tan => "tan" [Required "tan"];
  Tanh => "tanh" [Required "tanh"];

  // logic
  LT => "lt" [Varargs "lt"];
  LTE => "lte" [Varargs "lte"];
  GT => "gt" [Varargs "gt"];
  GTE => "gte" [Varargs "gte"];
  And => "and" [Varargs "and"];
  Or => "or" [Varargs "or"];
  Not => "not" [Required "not"];

  // conversion
  ToString => "to_string" [Required "to_string"];
  ToNumber => "to_number" [Required "to_number"];
  ToObject => "to_object" [Required "to_object"];
  ToArray => "to_array" [Required "to_array"];
  ToDouble => "to_double" [Required "to_double"];
  ToInteger => "to_integer" [Required "to_integer"];
  ToTime => "to_time" [Required "to_time"];
  ToDate => "to_date" [Required "to_date"];
}

impl Op {
  pub fn name(self) -> &'static str {
    self.spec().name
  }

  pub fn key(self) -> &'static str {
    self.spec().key
  }

  pub fn arity(self) -> Arity {
    self.spec().arity()
  }

  /// Find the operator whose wire key is `key`.
  pub fn from_key(key: &str) -> Option<Op> {
    Op::ALL.iter().copied().find(|op| op.key() == key)
  }

  /// Build a call from positional operands, checking them against the table.
  pub fn invoke(self, args: Vec<Expr>) -> Result<Expr> {
    let spec = self.spec();
    let arity = spec.arity();
    if !arity.accepts(args.len()) {
      return Err(Error::InvalidArity {
        op: spec.name,
        expected: arity,
        actual: args.len(),
      });
    }
    if spec.params.iter().any(|p| matches!(p, Param::Named(_))) {
      let positional = spec
        .params
        .iter()
        .filter(|p| !matches!(p, Param::Named(_)))
        .count();
      if let Some(options) = args.get(positional) {
        validate_options(spec, options)?;
      }
    }
    Ok(Expr::Call(Box::new(self.place(args))))
  }

  /// Assign positional operands to their wire keys. Arity is the caller's
  /// concern; surplus operands for non-variadic operators are dropped.
  pub(crate) fn place(self, args: Vec<Expr>) -> Call {
    let spec = self.spec();
    let mut args = args.into_iter();
    let mut fields = Vec::with_capacity(spec.params.len());
    let mut options_taken = false;

    for param in spec.params {
      match *param {
        Param::Required(key) => {
          fields.push((key, args.next().unwrap_or(Expr::Null)));
        }
        Param::Optional(key) => match args.next() {
          Some(Expr::Null) | None => {}
          Some(value) => fields.push((key, value)),
        },
        Param::Named(_) => {
          if options_taken {
            continue;
          }
          options_taken = true;
          if let Some(Expr::Object(options)) = args.next() {
            for (name, value) in options {
              if let Some(key) = spec.param(&name).map(Param::key) {
                fields.push((key, value));
              }
            }
          }
        }
        Param::Varargs(key) | Param::Rest(key) => {
          let rest: Vec<Expr> = args.by_ref().collect();
          fields.push((key, varargs(rest)));
        }
        Param::List(key) => {
          fields.push((key, Expr::Array(args.by_ref().collect())));
        }
      }
    }

    Call::new(self, fields)
  }
}

fn validate_options(spec: &OpSpec, options: &Expr) -> Result<()> {
  match options {
    Expr::Null => Ok(()),
    Expr::Object(map) => {
      for name in map.keys() {
        if !matches!(spec.param(name), Some(Param::Named(_))) {
          return Err(Error::InvalidValue(format!(
            "{} does not accept option {:?}",
            spec.name, name
          )));
        }
      }
      Ok(())
    }
    other => Err(Error::InvalidValue(format!(
      "{} options must be an object, got {}",
      spec.name, other
    ))),
  }
}

/// Wire form of a variable-length operand list: a single operand is sent
/// bare, anything else as an array.
pub fn varargs(mut values: Vec<Expr>) -> Expr {
  if values.len() == 1 {
    values.remove(0)
  } else {
    Expr::Array(values)
  }
}
