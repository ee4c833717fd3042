//! Client tests for FaunaDB Rust SDK.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use faunadb::query as q;
use faunadb::{
  Client, ClientConfig, Error, ErrorKind, Expr, HttpRequest, HttpResponse, Method, QueryOptions,
  Result, Transport, Value,
};
use futures::future::{AbortHandle, BoxFuture};
use futures::FutureExt;
use serde_json::json;

/// Records every request and answers from a script, `{"resource": null}`
/// once the script runs out.
#[derive(Clone, Default)]
struct MockTransport {
  requests: Arc<Mutex<Vec<HttpRequest>>>,
  responses: Arc<Mutex<VecDeque<HttpResponse>>>,
  delay: Option<Duration>,
}

impl MockTransport {
  fn respond(&self, response: HttpResponse) -> &Self {
    self.responses.lock().unwrap().push_back(response);
    self
  }

  fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().unwrap().clone()
  }

  fn last_request(&self) -> HttpRequest {
    self.requests().pop().expect("no request was sent")
  }
}

impl Transport for MockTransport {
  fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
    self.requests.lock().unwrap().push(request);
    let response = self
      .responses
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| HttpResponse::new(200, r#"{"resource": null}"#));
    let delay = self.delay;
    async move {
      if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
      }
      Ok(response)
    }
    .boxed()
  }
}

fn client_with(config: ClientConfig) -> (Client, MockTransport) {
  let transport = MockTransport::default();
  (Client::with_transport(config, transport.clone()), transport)
}

#[test]
fn test_config_builders() {
  let config = ClientConfig::new("secret")
    .with_scheme("http")
    .with_domain("localhost")
    .with_port(8443)
    .with_timeout(None)
    .with_query_timeout(Duration::from_millis(1500))
    .with_header("X-Custom", "yes");
  assert_eq!(config.base_url(), "http://localhost:8443");
  assert_eq!(config.timeout, None);
  assert_eq!(config.query_timeout, Some(Duration::from_millis(1500)));
  assert_eq!(config.headers, vec![("X-Custom".to_string(), "yes".to_string())]);
}

#[tokio::test]
async fn test_query_sends_expression_and_headers() {
  let (client, transport) = client_with(
    ClientConfig::new("s3cret")
      .with_query_timeout(Duration::from_millis(1500))
      .with_header("X-Custom", "yes"),
  );
  transport.respond(HttpResponse::new(200, r#"{"resource": 3}"#));

  let result = client.query(q::add([1, 2]).unwrap()).await.unwrap();
  assert_eq!(result.as_i64(), Some(3));

  let request = transport.last_request();
  assert_eq!(request.method, Method::Post);
  assert_eq!(request.path, "");
  assert_eq!(request.header("authorization"), Some("Bearer s3cret"));
  assert_eq!(request.header("X-FaunaDB-API-Version"), Some("4"));
  assert_eq!(request.header("X-Fauna-Driver"), Some("Rust"));
  assert_eq!(request.header("X-Query-Timeout"), Some("1500"));
  assert_eq!(request.header("X-Custom"), Some("yes"));
  assert_eq!(request.header("X-Last-Seen-Txn"), None);

  let body: serde_json::Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
  assert_eq!(body, json!({"add": [1, 2]}));
}

#[tokio::test]
async fn test_query_options_override_config() {
  let (client, transport) = client_with(ClientConfig::new("default"));
  let options = QueryOptions::default()
    .with_secret("other")
    .with_query_timeout(Duration::from_secs(2));
  client.query_with(q::now(), options).await.unwrap();

  let request = transport.last_request();
  assert_eq!(request.header("Authorization"), Some("Bearer other"));
  assert_eq!(request.header("X-Query-Timeout"), Some("2000"));
}

#[tokio::test]
async fn test_txn_time_watermark() {
  let (client, transport) = client_with(ClientConfig::new("secret"));
  assert_eq!(client.last_txn_time(), None);

  transport
    .respond(HttpResponse::new(200, r#"{"resource": 1}"#).with_header("x-txn-time", "100"))
    .respond(HttpResponse::new(200, r#"{"resource": 2}"#).with_header("X-Txn-Time", "50"))
    .respond(HttpResponse::new(200, r#"{"resource": 3}"#).with_header("x-txn-time", "soon"));

  client.query(1i64).await.unwrap();
  assert_eq!(client.last_txn_time(), Some(100));

  client.query(2i64).await.unwrap();
  assert_eq!(client.last_txn_time(), Some(100));
  assert_eq!(transport.last_request().header("X-Last-Seen-Txn"), Some("100"));

  client.query(3i64).await.unwrap();
  assert_eq!(client.last_txn_time(), Some(100));

  // clones share the watermark
  let clone = client.clone();
  clone.sync_last_txn_time(250);
  assert_eq!(client.last_txn_time(), Some(250));
  client.sync_last_txn_time(10);
  assert_eq!(clone.last_txn_time(), Some(250));
}

#[tokio::test]
async fn test_remote_errors_keep_structure() {
  let (client, transport) = client_with(ClientConfig::new("secret"));
  transport.respond(HttpResponse::new(
    400,
    r#"{"errors": [{"code": "invalid argument", "description": "Number expected.", "position": ["add", 1]}]}"#,
  ));
  transport.respond(HttpResponse::new(
    404,
    r#"{"errors": [{"code": "instance not found", "description": "Document not found."}]}"#,
  ));
  transport.respond(HttpResponse::new(503, "upstream down"));

  let err = client.query(q::add([Expr::from(1), Expr::from("x")]).unwrap()).await.unwrap_err();
  let fauna = err.as_fauna().expect("remote error");
  assert_eq!(fauna.kind, ErrorKind::BadRequest);
  assert_eq!(fauna.status, 400);
  assert_eq!(fauna.code(), Some("invalid argument"));
  assert_eq!(fauna.description(), Some("Number expected."));

  let err = client.query(q::get(q::ref_(q::collection("users"), "1"))).await.unwrap_err();
  assert_eq!(err.as_fauna().map(|e| e.kind), Some(ErrorKind::NotFound));

  let err = client.query(q::now()).await.unwrap_err();
  let fauna = err.as_fauna().expect("remote error");
  assert_eq!(fauna.kind, ErrorKind::Unavailable);
  assert!(fauna.errors.is_empty());
}

#[tokio::test]
async fn test_malformed_success_body() {
  let (client, transport) = client_with(ClientConfig::new("secret"));
  transport.respond(HttpResponse::new(200, "not json"));
  let err = client.query(q::now()).await.unwrap_err();
  assert!(matches!(err, Error::Serialization(_)));
}

#[tokio::test]
async fn test_client_timeout() {
  let transport = MockTransport {
    delay: Some(Duration::from_millis(500)),
    ..MockTransport::default()
  };
  let config = ClientConfig::new("secret").with_timeout(Some(Duration::from_millis(20)));
  let client = Client::with_transport(config, transport);
  let err = client.query(q::now()).await.unwrap_err();
  assert!(matches!(err, Error::Timeout));
}

#[tokio::test]
async fn test_client_timeout_reaches_transport() {
  let (client, transport) = client_with(ClientConfig::new("secret"));
  client.query(q::now()).await.unwrap();
  client.ping(None, None).await.unwrap();
  assert!(transport
    .requests()
    .iter()
    .all(|r| r.timeout == Some(Duration::from_secs(60))));

  let (client, transport) = client_with(ClientConfig::new("secret").with_timeout(None));
  client.query(q::now()).await.unwrap();
  assert_eq!(transport.last_request().timeout, None);
}

#[tokio::test]
async fn test_abort_is_distinct_from_timeout() {
  let transport = MockTransport {
    delay: Some(Duration::from_millis(500)),
    ..MockTransport::default()
  };
  let client = Client::with_transport(ClientConfig::new("secret"), transport);

  let (handle, registration) = AbortHandle::new_pair();
  let query = client.query_with(q::now(), QueryOptions::default().with_abort(registration));
  let abort = async {
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.abort();
  };
  let (result, ()) = tokio::join!(query, abort);
  assert!(matches!(result, Err(Error::Aborted)));
}

#[tokio::test]
async fn test_ping() {
  let (client, transport) = client_with(ClientConfig::new("secret"));
  transport.respond(HttpResponse::new(200, r#"{"resource": "Scope node is OK"}"#));

  let result = client
    .ping(Some("node"), Some(Duration::from_millis(500)))
    .await
    .unwrap();
  assert_eq!(result, Value::from("Scope node is OK"));

  let request = transport.last_request();
  assert_eq!(request.method, Method::Get);
  assert_eq!(request.path, "ping");
  assert_eq!(
    request.query,
    vec![
      ("scope".to_string(), "node".to_string()),
      ("timeout".to_string(), "500".to_string()),
    ]
  );
  assert!(request.body.is_none());
}

#[tokio::test]
async fn test_decoded_resource_values() {
  let (client, transport) = client_with(ClientConfig::new("secret"));
  transport.respond(HttpResponse::new(
    200,
    r#"{"resource": {"ref": {"@ref": {"id": "1", "collection": {"@ref": {"id": "users", "collection": {"@ref": {"id": "collections"}}}}}}, "ts": 7, "data": {"name": "Alice"}}}"#,
  ));
  let doc = client.query(q::get(q::ref_(q::collection("users"), "1"))).await.unwrap();
  assert_eq!(doc["ref"].as_reference().map(|r| r.id()), Some("1"));
  assert_eq!(doc["data"]["name"].as_str(), Some("Alice"));
  assert_eq!(transport.requests().len(), 1);
}
