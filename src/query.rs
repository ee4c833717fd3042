//! Query builder for FaunaDB
//!
//! One constructor per query function. Operands are anything convertible
//! into [`Expr`]; the result is a new tree, inputs are never modified.
//! Fixed-arity functions are infallible. Variadic ones check their operand
//! count against the operator table and return a `Result`.
//!
//! Optional operands use a `_with` variant that takes every optional operand;
//! passing a null (or `None`) leaves it off the wire.
//!
//! # Example
//! ```
//! use faunadb::query::{self as q, PaginateOptions};
//!
//! let users = q::match_(q::index("users_by_city"), ["Paris"]);
//! let page = q::build(|scope| {
//!     let mapper = scope.lambda1(|_, r| q::get(r))?;
//!     Ok(q::map(q::paginate_with(users, PaginateOptions::default().size(10)), mapper))
//! })
//! .unwrap();
//!
//! assert_eq!(
//!     page.to_string(),
//!     r#"Map(Paginate(Match(Index("users_by_city"), "Paris"), {size: 10}), Lambda("auto0", Get(Var("auto0"))))"#
//! );
//! ```

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::expr::{Bindings, Expr, IntoBody, Pattern, Scope};
use crate::ops::Op;
use crate::values::Bytes;

fn apply(op: Op, args: Vec<Expr>) -> Expr {
    Expr::Call(Box::new(op.place(args)))
}

fn variadic<I, E>(op: Op, values: I) -> Result<Expr>
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    op.invoke(values.into_iter().map(Into::into).collect())
}

macro_rules! nullary {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(pub fn $name() -> Expr {
            apply(Op::$op, Vec::new())
        })*
    };
}

macro_rules! unary {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(pub fn $name(value: impl Into<Expr>) -> Expr {
            apply(Op::$op, vec![value.into()])
        })*
    };
}

macro_rules! binary {
    ($($name:ident($a:ident, $b:ident) => $op:ident),* $(,)?) => {
        $(pub fn $name($a: impl Into<Expr>, $b: impl Into<Expr>) -> Expr {
            apply(Op::$op, vec![$a.into(), $b.into()])
        })*
    };
}

macro_rules! ternary {
    ($($name:ident($a:ident, $b:ident, $c:ident) => $op:ident),* $(,)?) => {
        $(pub fn $name($a: impl Into<Expr>, $b: impl Into<Expr>, $c: impl Into<Expr>) -> Expr {
            apply(Op::$op, vec![$a.into(), $b.into(), $c.into()])
        })*
    };
}

macro_rules! variadic {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(pub fn $name<I, E>(values: I) -> Result<Expr>
        where
            I: IntoIterator<Item = E>,
            E: Into<Expr>,
        {
            variadic(Op::$op, values)
        })*
    };
}

/// Options of `Paginate`. An option set to a null expression is still sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaginateOptions {
    pub size: Option<Expr>,
    pub after: Option<Expr>,
    pub before: Option<Expr>,
    pub ts: Option<Expr>,
    pub events: Option<Expr>,
    pub sources: Option<Expr>,
    pub cursor: Option<Expr>,
}

impl PaginateOptions {
    pub fn size(mut self, size: impl Into<Expr>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn after(mut self, cursor: impl Into<Expr>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub fn before(mut self, cursor: impl Into<Expr>) -> Self {
        self.before = Some(cursor.into());
        self
    }

    pub fn ts(mut self, ts: impl Into<Expr>) -> Self {
        self.ts = Some(ts.into());
        self
    }

    pub fn events(mut self, events: impl Into<Expr>) -> Self {
        self.events = Some(events.into());
        self
    }

    pub fn sources(mut self, sources: impl Into<Expr>) -> Self {
        self.sources = Some(sources.into());
        self
    }

    pub fn cursor(mut self, cursor: impl Into<Expr>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    fn into_expr(self) -> Expr {
        let mut fields = BTreeMap::new();
        let entries = [
            ("size", self.size),
            ("after", self.after),
            ("before", self.before),
            ("ts", self.ts),
            ("events", self.events),
            ("sources", self.sources),
            ("cursor", self.cursor),
        ];
        for (key, value) in entries {
            if let Some(value) = value {
                fields.insert(key.to_string(), value);
            }
        }
        Expr::Object(fields)
    }
}

// Basic forms

pub fn var(name: impl Into<String>) -> Expr {
    Expr::Var(name.into())
}

/// An object literal.
pub fn object<I, K, V>(fields: I) -> Expr
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Expr>,
{
    Expr::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

/// A lambda binding `pattern`. The builder receives every variable the
/// pattern names.
pub fn lambda<P, F, B>(pattern: P, body: F) -> Result<Expr>
where
    P: Into<Pattern>,
    F: FnOnce(&Bindings) -> B,
    B: IntoBody,
{
    let params = pattern.into();
    let bindings = Bindings::new(params.names());
    let body = body(&bindings).into_body()?;
    Ok(Expr::Lambda {
        params,
        body: Box::new(body),
    })
}

/// A lambda over an already built body.
pub fn lambda_expr(pattern: impl Into<Pattern>, body: impl Into<Expr>) -> Expr {
    Expr::Lambda {
        params: pattern.into(),
        body: Box::new(body.into()),
    }
}

/// Build a top-level expression with a fresh name scope for generated
/// lambda variables.
pub fn build<F>(body: F) -> Result<Expr>
where
    F: FnOnce(&mut Scope) -> Result<Expr>,
{
    let mut scope = Scope::new();
    body(&mut scope)
}

pub fn let_<I, K, V>(bindings: I, body: impl Into<Expr>) -> Expr
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Expr>,
{
    Expr::Let {
        bindings: bindings
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
        body: Box::new(body.into()),
    }
}

/// `Let` whose body builder receives the bound variables.
pub fn let_with<I, K, V, F, B>(bindings: I, body: F) -> Result<Expr>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Expr>,
    F: FnOnce(&Bindings) -> B,
    B: IntoBody,
{
    let bindings: Vec<(String, Expr)> = bindings
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    let vars = Bindings::new(bindings.iter().map(|(k, _)| k.as_str()));
    let body = body(&vars).into_body()?;
    Ok(Expr::Let {
        bindings,
        body: Box::new(body),
    })
}

pub fn ref_(collection: impl Into<Expr>, id: impl Into<Expr>) -> Expr {
    apply(Op::Ref, vec![collection.into(), id.into()])
}

pub fn bytes(value: impl Into<Bytes>) -> Expr {
    Expr::from(value.into())
}

pub fn bytes_base64(encoded: &str) -> Result<Expr> {
    Ok(Expr::from(Bytes::from_base64(encoded)?))
}

/// A float literal that rejects NaN and the infinities.
pub fn number(n: f64) -> Result<Expr> {
    serde_json::Number::from_f64(n)
        .map(Expr::Number)
        .ok_or_else(|| Error::InvalidValue(format!("{} is not a finite number", n)))
}

pub fn if_(cond: impl Into<Expr>, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Expr {
    apply(Op::If, vec![cond.into(), then.into(), otherwise.into()])
}

/// Call a user-defined function.
pub fn call<I, E>(function: impl Into<Expr>, args: I) -> Expr
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    let mut operands = vec![function.into()];
    operands.extend(args.into_iter().map(Into::into));
    apply(Op::Call, operands)
}

/// Match an index, optionally on terms.
pub fn match_<I, E>(index: impl Into<Expr>, terms: I) -> Expr
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    let mut operands = vec![index.into()];
    operands.extend(terms.into_iter().map(Into::into));
    apply(Op::Match, operands)
}

pub fn format<I, E>(template: impl Into<Expr>, values: I) -> Expr
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    let mut operands = vec![template.into()];
    operands.extend(values.into_iter().map(Into::into));
    apply(Op::Format, operands)
}

pub fn paginate(set: impl Into<Expr>) -> Expr {
    apply(Op::Paginate, vec![set.into()])
}

pub fn paginate_with(set: impl Into<Expr>, options: PaginateOptions) -> Expr {
    apply(Op::Paginate, vec![set.into(), options.into_expr()])
}

variadic! {
    do_ => Do,
    union => Union,
    intersection => Intersection,
    difference => Difference,
    equals => Equals,
    add => Add,
    bit_and => BitAnd,
    bit_or => BitOr,
    bit_xor => BitXor,
    divide => Divide,
    max => Max,
    min => Min,
    modulo => Modulo,
    multiply => Multiply,
    subtract => Subtract,
    lt => LT,
    lte => LTE,
    gt => GT,
    gte => GTE,
    and => And,
    or => Or,
}

nullary! {
    identity => Identity,
    current_identity => CurrentIdentity,
    has_identity => HasIdentity,
    has_current_identity => HasCurrentIdentity,
    current_token => CurrentToken,
    has_current_token => HasCurrentToken,
    now => Now,
    next_id => NextId,
    new_id => NewId,
    access_providers => AccessProviders,
    classes => Classes,
    collections => Collections,
    databases => Databases,
    indexes => Indexes,
    functions => Functions,
    roles => Roles,
    keys => Keys,
    tokens => Tokens,
    credentials => Credentials,
}

unary! {
    abort => Abort,
    query => Query,
    reverse => Reverse,
    is_empty => IsEmpty,
    is_nonempty => IsNonEmpty,
    is_number => IsNumber,
    is_double => IsDouble,
    is_integer => IsInteger,
    is_boolean => IsBoolean,
    is_null => IsNull,
    is_bytes => IsBytes,
    is_timestamp => IsTimestamp,
    is_date => IsDate,
    is_string => IsString,
    is_array => IsArray,
    is_object => IsObject,
    is_ref => IsRef,
    is_set => IsSet,
    is_doc => IsDoc,
    is_lambda => IsLambda,
    is_collection => IsCollection,
    is_database => IsDatabase,
    is_index => IsIndex,
    is_function => IsFunction,
    is_key => IsKey,
    is_token => IsToken,
    is_credentials => IsCredentials,
    is_role => IsRole,
    get => Get,
    key_from_secret => KeyFromSecret,
    exists => Exists,
    create => Create,
    delete => Delete,
    create_class => CreateClass,
    create_collection => CreateCollection,
    create_database => CreateDatabase,
    create_index => CreateIndex,
    create_key => CreateKey,
    create_function => CreateFunction,
    create_role => CreateRole,
    create_access_provider => CreateAccessProvider,
    singleton => Singleton,
    events => Events,
    distinct => Distinct,
    documents => Documents,
    logout => Logout,
    concat => Concat,
    casefold => Casefold,
    regex_escape => RegexEscape,
    length => Length,
    lower_case => LowerCase,
    ltrim => LTrim,
    ngram => NGram,
    repeat => Repeat,
    rtrim => RTrim,
    space => Space,
    sub_string => SubString,
    title_case => TitleCase,
    trim => Trim,
    upper_case => UpperCase,
    time => Time,
    date => Date,
    to_seconds => ToSeconds,
    to_millis => ToMillis,
    to_micros => ToMicros,
    day_of_week => DayOfWeek,
    day_of_year => DayOfYear,
    day_of_month => DayOfMonth,
    hour => Hour,
    minute => Minute,
    second => Second,
    month => Month,
    year => Year,
    database => Database,
    index => Index,
    class => Class,
    collection => Collection,
    function => Function,
    role => Role,
    access_provider => AccessProvider,
    abs => Abs,
    bit_not => BitNot,
    ceil => Ceil,
    floor => Floor,
    round => Round,
    sign => Sign,
    sqrt => Sqrt,
    trunc => Trunc,
    count => Count,
    sum => Sum,
    mean => Mean,
    any => Any,
    all => All,
    acos => Acos,
    asin => Asin,
    atan => Atan,
    cos => Cos,
    cosh => Cosh,
    degrees => Degrees,
    exp => Exp,
    hypot => Hypot,
    ln => Ln,
    log => Log,
    pow => Pow,
    radians => Radians,
    sin => Sin,
    sinh => Sinh,
    tan => Tan,
    tanh => Tanh,
    not => Not,
    to_string => ToString,
    to_number => ToNumber,
    to_object => ToObject,
    to_array => ToArray,
    to_double => ToDouble,
    to_integer => ToInteger,
    to_time => ToTime,
    to_date => ToDate,
}

// Optional trailing operand, given explicitly.
binary! {
    get_with(reference, ts) => Get,
    exists_with(reference, ts) => Exists,
    create_with(collection, params) => Create,
    concat_with(strings, separator) => Concat,
    casefold_with(value, normalizer) => Casefold,
    repeat_with(value, number) => Repeat,
    round_with(value, precision) => Round,
    trunc_with(value, precision) => Trunc,
    hypot_with(a, b) => Hypot,
    pow_with(base, exp) => Pow,
    database_with(name, scope) => Database,
    index_with(name, scope) => Index,
    class_with(name, scope) => Class,
    collection_with(name, scope) => Collection,
    function_with(name, scope) => Function,
    role_with(name, scope) => Role,
    access_provider_with(name, scope) => AccessProvider,
}

binary! {
    at(ts, expr) => At,
    map(collection, lambda) => Map,
    foreach(collection, lambda) => Foreach,
    filter(collection, lambda) => Filter,
    take(number, collection) => Take,
    drop(number, collection) => Drop,
    prepend(elements, collection) => Prepend,
    append(elements, collection) => Append,
    update(reference, params) => Update,
    replace(reference, params) => Replace,
    merge(object, with) => Merge,
    join(source, target) => Join,
    login(reference, params) => Login,
    identify(reference, password) => Identify,
    contains_str(value, search) => ContainsStr,
    contains_str_regex(value, pattern) => ContainsStrRegex,
    starts_with(value, search) => StartsWith,
    ends_with(value, search) => EndsWith,
    find_str(value, find) => FindStr,
    find_str_regex(value, pattern) => FindStrRegex,
    epoch(number, unit) => Epoch,
    contains(path, within) => Contains,
    contains_path(path, within) => ContainsPath,
    contains_field(field, within) => ContainsField,
    contains_value(value, within) => ContainsValue,
    select(path, from) => Select,
    select_all(path, from) => SelectAll,
    move_database(from, to) => MoveDatabase,
}

ternary! {
    reduce(lambda, initial, collection) => Reduce,
    remove(reference, ts, action) => Remove,
    merge_with(object, with, lambda) => Merge,
    range(set, from, to) => Range,
    replace_str(value, find, replace) => ReplaceStr,
    time_add(base, offset, unit) => TimeAdd,
    time_subtract(base, offset, unit) => TimeSubtract,
    time_diff(start, finish, unit) => TimeDiff,
    find_str_with(value, find, start) => FindStr,
    ngram_with(terms, min, max) => NGram,
    sub_string_with(value, start, length) => SubString,
    select_with(path, from, default) => Select,
}

pub fn insert(
    reference: impl Into<Expr>,
    ts: impl Into<Expr>,
    action: impl Into<Expr>,
    params: impl Into<Expr>,
) -> Expr {
    apply(
        Op::Insert,
        vec![reference.into(), ts.into(), action.into(), params.into()],
    )
}

pub fn find_str_regex_with(
    value: impl Into<Expr>,
    pattern: impl Into<Expr>,
    start: impl Into<Expr>,
    num_results: impl Into<Expr>,
) -> Expr {
    apply(
        Op::FindStrRegex,
        vec![value.into(), pattern.into(), start.into(), num_results.into()],
    )
}

pub fn replace_str_regex(
    value: impl Into<Expr>,
    pattern: impl Into<Expr>,
    replace: impl Into<Expr>,
) -> Expr {
    apply(
        Op::ReplaceStrRegex,
        vec![value.into(), pattern.into(), replace.into()],
    )
}

pub fn replace_str_regex_with(
    value: impl Into<Expr>,
    pattern: impl Into<Expr>,
    replace: impl Into<Expr>,
    first: impl Into<Expr>,
) -> Expr {
    apply(
        Op::ReplaceStrRegex,
        vec![value.into(), pattern.into(), replace.into(), first.into()],
    )
}

/// Scoped listings of the native roots, e.g. `Collections(Database("app"))`.
pub fn access_providers_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::AccessProviders, vec![scope.into()])
}

pub fn classes_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::Classes, vec![scope.into()])
}

pub fn collections_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::Collections, vec![scope.into()])
}

pub fn databases_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::Databases, vec![scope.into()])
}

pub fn indexes_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::Indexes, vec![scope.into()])
}

pub fn functions_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::Functions, vec![scope.into()])
}

pub fn roles_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::Roles, vec![scope.into()])
}

pub fn keys_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::Keys, vec![scope.into()])
}

pub fn tokens_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::Tokens, vec![scope.into()])
}

pub fn credentials_with(scope: impl Into<Expr>) -> Expr {
    apply(Op::Credentials, vec![scope.into()])
}
