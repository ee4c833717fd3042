//! FaunaDB Rust SDK - Query Builder Tests

use std::collections::BTreeMap;

use faunadb::query::{self as q, PaginateOptions};
use faunadb::{varargs, Arity, Error, Expr, Op, Pattern, Ref, Value};
use serde_json::json;

fn wire(expr: &Expr) -> serde_json::Value {
    serde_json::to_value(expr).unwrap()
}

fn min_args(arity: Arity) -> usize {
    match arity {
        Arity::Exact(n) | Arity::AtLeast(n) | Arity::Between(n, _) => n,
        Arity::Max(_) => 0,
    }
}

#[test]
fn test_varargs_normalization() {
    assert_eq!(varargs(vec![Expr::from("a")]), Expr::from("a"));
    assert_eq!(
        varargs(vec![Expr::from("a"), Expr::from("b")]),
        Expr::from(vec!["a", "b"])
    );
    assert_eq!(wire(&q::add([1]).unwrap()), json!({"add": 1}));
    assert_eq!(wire(&q::add([1, 2, 3]).unwrap()), json!({"add": [1, 2, 3]}));
}

#[test]
fn test_arity_error_names_bound_and_count() {
    let err = Op::Ref.invoke(vec![Expr::from(1), Expr::from(2), Expr::from(3)]).unwrap_err();
    match &err {
        Error::InvalidArity { op, expected, actual } => {
            assert_eq!(*op, "Ref");
            assert_eq!(*expected, Arity::Exact(2));
            assert_eq!(*actual, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.to_string(), "Ref: expected exactly 2 arguments, got 3");

    let err = q::add(Vec::<Expr>::new()).unwrap_err();
    assert_eq!(err.to_string(), "Add: expected at least 1 arguments, got 0");

    let err = Op::Get.invoke(vec![]).unwrap_err();
    assert_eq!(err.to_string(), "Get: expected between 1 and 2 arguments, got 0");

    let err = Op::Collections.invoke(vec![Expr::Null, Expr::Null]).unwrap_err();
    assert_eq!(err.to_string(), "Collections: expected at most 1 arguments, got 2");
}

#[test]
fn test_declared_arity_never_fails() {
    for op in Op::ALL {
        let arity = op.arity();
        let count = min_args(arity);
        let args = (0..count).map(|i| Expr::from(i as i64)).collect();
        assert!(op.invoke(args).is_ok(), "{:?} rejected {} operands", op, count);
    }
}

#[test]
fn test_unknown_paginate_option_is_rejected() {
    let options = Expr::from(BTreeMap::from([("sizes", 2)]));
    let err = Op::Paginate.invoke(vec![Expr::from("set"), options]).unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
}

#[test]
fn test_lambda_with_explicit_pattern() {
    let lambda = q::lambda(["a", "b"], |vars| q::add([vars.var("a")?, vars.var("b")?])).unwrap();
    assert_eq!(
        wire(&lambda),
        json!({"lambda": ["a", "b"], "expr": {"add": [{"var": "a"}, {"var": "b"}]}})
    );

    let err = q::lambda("x", |vars| vars.var("y")).unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
}

#[test]
fn test_lambda_with_nested_pattern() {
    let pattern = Pattern::from(vec![
        Pattern::from("ref"),
        Pattern::from(BTreeMap::from([("name", "n")])),
        Pattern::from(""),
    ]);
    let lambda = q::lambda(pattern, |vars| {
        assert_eq!(vars.len(), 2);
        vars.var("ref").map(|r| q::get(r))
    });
    assert_eq!(
        wire(&lambda.unwrap()),
        json!({"lambda": ["ref", {"name": "n"}, ""], "expr": {"get": {"var": "ref"}}})
    );
}

#[test]
fn test_generated_names_are_fresh_and_restored() {
    let expr = q::build(|scope| {
        let pair = scope.lambda2(|_, a, b| q::add([a, b]))?;
        assert_eq!(scope.next_index(), 0);
        let single = scope.lambda1(|_, x| x)?;
        Ok(Expr::from(vec![pair, single]))
    })
    .unwrap();
    assert_eq!(
        wire(&expr),
        json!([
            {"lambda": ["auto0", "auto1"], "expr": {"add": [{"var": "auto0"}, {"var": "auto1"}]}},
            {"lambda": "auto0", "expr": {"var": "auto0"}}
        ])
    );
}

#[test]
fn test_nested_generated_names_do_not_collide() {
    let expr = q::build(|scope| {
        scope.lambda1(|scope, x| {
            scope.lambda1(move |_, y| q::add([x, y]))
        })
    })
    .unwrap();
    assert_eq!(
        expr.to_string(),
        r#"Lambda("auto0", Lambda("auto1", Add(Var("auto0"), Var("auto1"))))"#
    );
}

#[test]
fn test_counter_restored_after_failed_body() {
    let _ = q::build(|scope| {
        let failed = scope.lambda3(|_, _, _, _| Err::<Expr, _>(Error::InvalidValue("boom".to_string())));
        assert!(failed.is_err());
        assert_eq!(scope.next_index(), 0);
        let many = scope.lambda_n(4, |_, vars| Expr::from(vars))?;
        assert_eq!(many.to_string(), r#"Lambda(["auto0", "auto1", "auto2", "auto3"], [Var("auto0"), Var("auto1"), Var("auto2"), Var("auto3")])"#);
        assert!(scope.lambda_n(0, |_, _| Expr::Null).is_err());
        Ok(Expr::Null)
    });
}

#[test]
fn test_let_forms() {
    let expr = q::let_([("x", 1), ("y", 2)], q::var("x"));
    assert_eq!(
        wire(&expr),
        json!({"let": [{"x": 1}, {"y": 2}], "in": {"var": "x"}})
    );
    assert_eq!(expr.to_string(), r#"Let({x: 1, y: 2}, Var("x"))"#);

    let expr = q::let_with([("a", Expr::from(1))], |vars| q::add([vars.var("a")?, Expr::from(1)])).unwrap();
    assert_eq!(
        wire(&expr),
        json!({"let": [{"a": 1}], "in": {"add": [{"var": "a"}, 1]}})
    );
}

#[test]
fn test_object_literals_are_wrapped() {
    let expr = q::create_with(
        q::collection("users"),
        q::object([("data", q::object([("name", "Alice")]))]),
    );
    assert_eq!(
        wire(&expr),
        json!({
            "create": {"collection": "users"},
            "params": {"object": {"data": {"object": {"name": "Alice"}}}}
        })
    );
    assert_eq!(
        expr.to_string(),
        r#"Create(Collection("users"), {data: {name: "Alice"}})"#
    );
}

#[test]
fn test_match_without_terms() {
    let expr = q::match_(q::index("all_users"), Vec::<Expr>::new());
    assert_eq!(wire(&expr), json!({"match": {"index": "all_users"}, "terms": []}));
    assert_eq!(expr.to_string(), r#"Match(Index("all_users"))"#);

    let expr = q::match_(q::index("by_pair"), ["a", "b"]);
    assert_eq!(wire(&expr), json!({"match": {"index": "by_pair"}, "terms": ["a", "b"]}));
    assert_eq!(expr.to_string(), r#"Match(Index("by_pair"), "a", "b")"#);
}

#[test]
fn test_paginate_options() {
    let options = PaginateOptions::default().size(2).before(Expr::Null).events(true);
    let expr = q::paginate_with(q::documents(q::collection("users")), options);
    assert_eq!(
        wire(&expr),
        json!({
            "paginate": {"documents": {"collection": "users"}},
            "size": 2,
            "before": null,
            "events": true
        })
    );
    assert_eq!(
        expr.to_string(),
        r#"Paginate(Documents(Collection("users")), {before: null, events: true, size: 2})"#
    );
    assert_eq!(wire(&q::paginate("s")), json!({"paginate": "s"}));
}

#[test]
fn test_scoped_references() {
    let expr = q::collection_with("users", q::database("app"));
    assert_eq!(
        wire(&expr),
        json!({"collection": "users", "scope": {"database": "app"}})
    );
    assert_eq!(expr.to_string(), r#"Collection("users", Database("app"))"#);
    assert_eq!(q::indexes_with(q::database("app")).to_string(), r#"Indexes(Database("app"))"#);
}

#[test]
fn test_select_with_default() {
    let expr = q::select_with(["data", "name"], q::var("doc"), "unknown");
    assert_eq!(
        wire(&expr),
        json!({"select": ["data", "name"], "from": {"var": "doc"}, "default": "unknown"})
    );
    assert_eq!(
        expr.to_string(),
        r#"Select(["data", "name"], Var("doc"), "unknown")"#
    );
}

#[test]
fn test_control_flow() {
    let expr = q::if_(q::exists(q::var("r")), q::get(q::var("r")), q::abort("missing"));
    assert_eq!(
        expr.to_string(),
        r#"If(Exists(Var("r")), Get(Var("r")), Abort("missing"))"#
    );
    let expr = q::do_([q::var("a"), q::var("b")]).unwrap();
    assert_eq!(wire(&expr), json!({"do": [{"var": "a"}, {"var": "b"}]}));
    let expr = q::do_([q::var("a")]).unwrap();
    assert_eq!(wire(&expr), json!({"do": [{"var": "a"}]}));
    assert!(q::do_(Vec::<Expr>::new()).is_err());
}

#[test]
fn test_user_function_call() {
    let expr = q::call(q::function("double"), [21]);
    assert_eq!(wire(&expr), json!({"call": {"function": "double"}, "arguments": 21}));
    let expr = q::call(q::function("pair"), [1, 2]);
    assert_eq!(wire(&expr), json!({"call": {"function": "pair"}, "arguments": [1, 2]}));
    assert_eq!(expr.to_string(), r#"Call(Function("pair"), 1, 2)"#);
}

#[test]
fn test_string_functions() {
    let expr = q::concat_with(["a", "b"], "-");
    assert_eq!(wire(&expr), json!({"concat": ["a", "b"], "separator": "-"}));
    let expr = q::find_str_regex_with("abc", "b", 0, Expr::Null);
    assert_eq!(wire(&expr), json!({"findstrregex": "abc", "pattern": "b", "start": 0}));
    let expr = q::replace_str_regex("abc", "b", "x");
    assert_eq!(expr.to_string(), r#"ReplaceStrRegex("abc", "b", "x")"#);
}

#[test]
fn test_time_functions() {
    let expr = q::time_add(q::now(), 1, "day");
    assert_eq!(
        wire(&expr),
        json!({"time_add": {"now": null}, "offset": 1, "unit": "day"})
    );
    assert_eq!(expr.to_string(), r#"TimeAdd(Now(), 1, "day")"#);
    assert_eq!(wire(&q::epoch(0, "second")), json!({"epoch": 0, "unit": "second"}));
}

#[test]
fn test_literal_values() {
    let doc = Ref::with_collection("1", Ref::collection_named("users"));
    let expr = q::get(&doc);
    assert_eq!(
        wire(&expr),
        json!({"get": {"@ref": {"id": "1", "collection": {"@ref": {"id": "users", "collection": {"@ref": {"id": "collections"}}}}}}})
    );
    assert_eq!(expr.to_string(), r#"Get(Ref(Collection("users"), "1"))"#);

    let bytes = q::bytes([0xdeu8, 0xad]);
    assert_eq!(wire(&bytes), json!({"@bytes": "3q0="}));
    assert_eq!(q::bytes_base64("3q0=").unwrap(), bytes);
    assert!(q::bytes_base64("***").is_err());
}

#[test]
fn test_conversion_from_native_values() {
    let raw = json!({"name": "Alice", "tags": ["a"], "extra": null});
    let expr = Expr::from(raw);
    assert_eq!(
        wire(&expr),
        json!({"object": {"name": "Alice", "tags": ["a"], "extra": null}})
    );
    let value = Value::from(vec!["x", "y"]);
    assert_eq!(Expr::from(&value), Expr::from(vec!["x", "y"]));
    assert_eq!(Expr::from(Expr::from(3)), Expr::from(3));
    assert_eq!(Expr::from(None::<i64>), Expr::Null);
}

#[test]
fn test_borrowed_byte_buffers_become_bytes() {
    let data: Vec<u8> = vec![0xde, 0xad];
    let expr = q::object([("b", &data[..])]);
    assert_eq!(wire(&expr), json!({"object": {"b": {"@bytes": "3q0="}}}));
    assert_eq!(Expr::from(&data), q::bytes(data.clone()));

    // owned buffers stay plain arrays
    assert_eq!(wire(&Expr::from(data)), json!([222, 173]));
}

#[test]
fn test_non_finite_numbers() {
    assert_eq!(Expr::from(f64::NAN), Expr::Null);
    assert_eq!(Expr::from(f64::INFINITY), Expr::Null);
    assert_eq!(wire(&q::number(1.5).unwrap()), json!(1.5));
    assert!(matches!(q::number(f64::NAN), Err(Error::InvalidValue(_))));
    assert!(matches!(q::number(f64::NEG_INFINITY), Err(Error::InvalidValue(_))));
}

#[test]
fn test_logic_and_math_print() {
    let expr = q::and([q::gt([q::var("a"), Expr::from(1)]).unwrap(), q::not(false)]).unwrap();
    assert_eq!(expr.to_string(), r#"And(GT(Var("a"), 1), Not(false))"#);
    assert_eq!(q::round_with(1.25, 1).to_string(), "Round(1.25, 1)");
    assert_eq!(q::round(1.25).to_string(), "Round(1.25)");
}
