//! FaunaDB Rust SDK - Pagination Tests

use std::sync::{Arc, Mutex};

use faunadb::query as q;
use faunadb::{
  Client, ClientConfig, Direction, Error, Expr, HttpRequest, HttpResponse, PaginateParams, Result,
  Transform, Transport, Value,
};
use futures::future::BoxFuture;
use futures::{FutureExt, TryStreamExt};
use serde_json::json;

const ITEMS: i64 = 100;

/// Serves `Paginate` over the integers `0..ITEMS`, using positions as
/// cursors.
#[derive(Clone, Default)]
struct SetServer {
  queries: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl SetServer {
  fn queries(&self) -> Vec<serde_json::Value> {
    self.queries.lock().unwrap().clone()
  }

  fn page(paginate: &serde_json::Map<String, serde_json::Value>) -> serde_json::Value {
    let size = paginate.get("size").and_then(|s| s.as_i64()).unwrap_or(64);
    let (start, end) = match paginate.get("before") {
      Some(before) => {
        let end = before.as_i64().unwrap_or(ITEMS);
        ((end - size).max(0), end)
      }
      None => {
        let start = paginate.get("after").and_then(|a| a.as_i64()).unwrap_or(0);
        (start, (start + size).min(ITEMS))
      }
    };
    let mut page = serde_json::Map::new();
    page.insert("data".to_string(), json!((start..end).collect::<Vec<_>>()));
    if start > 0 {
      page.insert("before".to_string(), json!(start));
    }
    if end < ITEMS {
      page.insert("after".to_string(), json!(end));
    }
    json!({ "resource": page })
  }
}

fn find_paginate(value: &serde_json::Value) -> Option<&serde_json::Map<String, serde_json::Value>> {
  let fields = value.as_object()?;
  if fields.contains_key("paginate") {
    return Some(fields);
  }
  fields.values().find_map(find_paginate)
}

impl Transport for SetServer {
  fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
    let body: serde_json::Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
    let response = find_paginate(&body)
      .map(Self::page)
      .unwrap_or_else(|| json!({"resource": null}));
    self.queries.lock().unwrap().push(body);
    futures::future::ready(Ok(HttpResponse::new(200, response.to_string()))).boxed()
  }
}

fn setup() -> (Client, SetServer) {
  let server = SetServer::default();
  let client = Client::with_transport(ClientConfig::new("secret"), server.clone());
  (client, server)
}

fn items() -> Expr {
  q::documents(q::collection("items"))
}

fn numbers(page: &[Value]) -> Vec<i64> {
  page.iter().filter_map(Value::as_i64).collect()
}

#[tokio::test]
async fn test_forward_traversal_visits_every_page_in_order() {
  let (client, server) = setup();
  let mut helper = client
    .paginate(items(), PaginateParams::default().with_size(2))
    .unwrap();

  let mut pages = Vec::new();
  helper.each(|page| pages.push(numbers(&page))).await.unwrap();

  assert_eq!(pages.len(), 50);
  let flat: Vec<i64> = pages.concat();
  assert_eq!(flat, (0..ITEMS).collect::<Vec<_>>());
  assert_eq!(server.queries().len(), 50);
  // the first fetch carries no cursor at all
  let first = find_paginate(&server.queries()[0]).cloned().unwrap();
  assert!(!first.contains_key("after") && !first.contains_key("before"));
}

#[tokio::test]
async fn test_reverse_traversal_visits_every_page_in_order() {
  let (client, _server) = setup();
  let mut helper = client
    .paginate(
      items(),
      PaginateParams::default().with_size(2).with_before(Value::Null),
    )
    .unwrap();
  assert_eq!(helper.direction(), Some(Direction::Reverse));

  let mut pages = Vec::new();
  helper.each_reverse(|page| pages.push(numbers(&page))).await.unwrap();

  assert_eq!(pages.len(), 50);
  for (i, page) in pages.iter().enumerate() {
    let start = 98 - 2 * i as i64;
    assert_eq!(page, &vec![start, start + 1]);
  }
}

#[tokio::test]
async fn test_cursors_move_only_when_present() {
  let (client, _server) = setup();
  let mut helper = client
    .paginate(items(), PaginateParams::default().with_size(40))
    .unwrap();

  let page = helper.next_page().await.unwrap();
  assert_eq!(page.data.len(), 40);
  assert_eq!(page.before, None);
  assert_eq!(helper.after(), Some(&Value::from(40i64)));
  assert_eq!(helper.before(), None);

  helper.next_page().await.unwrap();
  let last = helper.next_page().await.unwrap();
  assert_eq!(numbers(&last.data), (80..ITEMS).collect::<Vec<_>>());
  assert_eq!(last.after, None);
  // the missing cursor leaves the previous one in place
  assert_eq!(helper.after(), Some(&Value::from(80i64)));
  assert_eq!(helper.before(), Some(&Value::from(80i64)));

  let previous = helper.previous_page().await.unwrap();
  assert_eq!(numbers(&previous.data), (40..80).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_initial_after_cursor() {
  let (client, server) = setup();
  let mut helper = client
    .paginate(
      items(),
      PaginateParams::default().with_size(5).with_after(10i64),
    )
    .unwrap();
  assert_eq!(helper.direction(), Some(Direction::Forward));

  let page = helper.next_page().await.unwrap();
  assert_eq!(numbers(&page.data), vec![10, 11, 12, 13, 14]);
  let sent = find_paginate(&server.queries()[0]).cloned().unwrap();
  assert_eq!(sent.get("after"), Some(&json!(10)));
}

#[tokio::test]
async fn test_before_and_after_are_exclusive() {
  let (client, server) = setup();
  let err = client
    .paginate(
      items(),
      PaginateParams::default().with_before(10i64).with_after(20i64),
    )
    .unwrap_err();
  assert!(matches!(err, Error::InvalidValue(_)));
  assert!(server.queries().is_empty());
}

#[tokio::test]
async fn test_into_stream_follows_construction_direction() {
  let (client, _server) = setup();
  let forward: Vec<Vec<Value>> = client
    .paginate(items(), PaginateParams::default().with_size(25))
    .unwrap()
    .into_stream()
    .try_collect()
    .await
    .unwrap();
  assert_eq!(forward.len(), 4);
  assert_eq!(numbers(&forward[3]).first(), Some(&75));

  let reverse: Vec<Vec<Value>> = client
    .paginate(
      items(),
      PaginateParams::default().with_size(25).with_before(Value::Null),
    )
    .unwrap()
    .into_stream()
    .try_collect()
    .await
    .unwrap();
  assert_eq!(reverse.len(), 4);
  assert_eq!(numbers(&reverse[0]).first(), Some(&75));
  assert_eq!(numbers(&reverse[3]).first(), Some(&0));
}

#[test]
fn test_transforms_are_shared_until_appended() {
  let (client, _server) = setup();
  let base = client.paginate(items(), PaginateParams::default()).unwrap();
  let mapped = base.map(q::lambda_expr("x", q::get(q::var("x"))));
  let copy = mapped.clone();
  let filtered = mapped.filter(q::lambda_expr("x", q::is_null(q::var("x"))));

  assert!(base.transforms().is_empty());
  assert_eq!(mapped.transforms().len(), 1);
  assert!(copy.shares_transforms(&mapped));
  assert!(!filtered.shares_transforms(&mapped));
  assert_eq!(filtered.transforms().len(), 2);
  assert!(matches!(filtered.transforms()[1], Transform::Filter(_)));
  assert_eq!(mapped.transforms().len(), 1);
}

#[test]
fn test_query_shape() {
  let (client, _server) = setup();
  let helper = client
    .paginate(
      items(),
      PaginateParams::default().with_size(2).with_events(true),
    )
    .unwrap();

  assert_eq!(
    serde_json::to_value(helper.query(Direction::Forward)).unwrap(),
    json!({"paginate": {"documents": {"collection": "items"}}, "size": 2, "events": true})
  );
  assert_eq!(
    serde_json::to_value(helper.query(Direction::Reverse)).unwrap(),
    json!({"paginate": {"documents": {"collection": "items"}}, "size": 2, "events": true, "before": null})
  );

  let wrapped = helper
    .map(q::lambda_expr("x", q::get(q::var("x"))))
    .filter(q::lambda_expr("d", q::var("d")));
  assert_eq!(
    wrapped.query(Direction::Forward).to_string(),
    r#"Filter(Map(Paginate(Documents(Collection("items")), {events: true, size: 2}), Lambda("x", Get(Var("x")))), Lambda("d", Var("d")))"#
  );
}

#[tokio::test]
async fn test_transformed_pages_are_fetched_through_the_wrapper() {
  let (client, server) = setup();
  let mut helper = client
    .paginate(items(), PaginateParams::default().with_size(10))
    .unwrap()
    .map(q::lambda_expr("x", q::var("x")));

  let page = helper.next_page().await.unwrap();
  assert_eq!(page.data.len(), 10);
  let sent = &server.queries()[0];
  assert!(sent.get("map").is_some());
  assert_eq!(sent["collection"]["size"], json!(10));
}
