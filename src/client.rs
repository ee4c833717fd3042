//! FaunaDB client: configuration, query execution and the transaction
//! time watermark.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{AbortRegistration, Abortable};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::json::to_json;
use crate::page::{PageHelper, PaginateParams};
use crate::protocol::{
  find_header, FaunaError, HttpRequest, HttpResponse, Method, ResourceBody, API_VERSION,
  DRIVER_NAME, HEADER_API_VERSION, HEADER_DRIVER, HEADER_LAST_SEEN_TXN, HEADER_QUERY_TIMEOUT,
  HEADER_TXN_TIME,
};
use crate::stream::{DocumentStream, StreamClient, StreamOptions};
use crate::transport::{HttpTransport, Transport};
use crate::values::Value;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub secret: String,
  pub scheme: String,
  pub domain: String,
  /// Defaults to 443 for https and 80 otherwise
  pub port: Option<u16>,
  /// Client-side limit for a whole request; `None` waits indefinitely
  pub timeout: Option<Duration>,
  /// Server-side evaluation limit, sent with each query
  pub query_timeout: Option<Duration>,
  pub headers: Vec<(String, String)>,
}

impl ClientConfig {
  pub fn new(secret: impl Into<String>) -> Self {
    Self {
      secret: secret.into(),
      scheme: "https".to_string(),
      domain: "db.fauna.com".to_string(),
      port: None,
      timeout: Some(Duration::from_secs(60)),
      query_timeout: None,
      headers: Vec::new(),
    }
  }

  pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
    self.scheme = scheme.into();
    self
  }

  pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
    self.domain = domain.into();
    self
  }

  pub fn with_port(mut self, port: u16) -> Self {
    self.port = Some(port);
    self
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
    self.query_timeout = Some(timeout);
    self
  }

  /// Extra header sent with every request
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn port(&self) -> u16 {
    self
      .port
      .unwrap_or(if self.scheme == "https" { 443 } else { 80 })
  }

  pub fn base_url(&self) -> String {
    format!("{}://{}:{}", self.scheme, self.domain, self.port())
  }
}

/// Per-query overrides
#[derive(Debug, Default)]
pub struct QueryOptions {
  pub secret: Option<String>,
  pub query_timeout: Option<Duration>,
  /// Cancels the request when its handle is aborted
  pub abort: Option<AbortRegistration>,
}

impl QueryOptions {
  pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
    self.secret = Some(secret.into());
    self
  }

  pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
    self.query_timeout = Some(timeout);
    self
  }

  pub fn with_abort(mut self, registration: AbortRegistration) -> Self {
    self.abort = Some(registration);
    self
  }
}

/// FaunaDB client. Cheap to clone; clones share the transport and the
/// last-seen transaction time.
#[derive(Clone)]
pub struct Client {
  inner: Arc<Inner>,
}

struct Inner {
  config: ClientConfig,
  transport: Arc<dyn Transport>,
  // 0 until a transaction time has been observed
  last_txn: AtomicI64,
}

impl std::fmt::Debug for Client {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Client")
      .field("base_url", &self.inner.config.base_url())
      .field("last_txn_time", &self.last_txn_time())
      .finish_non_exhaustive()
  }
}

impl Client {
  /// Client over the default HTTP transport.
  pub fn new(config: ClientConfig) -> Result<Self> {
    let transport = HttpTransport::new(config.base_url())?;
    Ok(Self::with_transport(config, transport))
  }

  pub fn with_transport(config: ClientConfig, transport: impl Transport) -> Self {
    Self {
      inner: Arc::new(Inner {
        config,
        transport: Arc::new(transport),
        last_txn: AtomicI64::new(0),
      }),
    }
  }

  pub fn config(&self) -> &ClientConfig {
    &self.inner.config
  }

  pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
    &self.inner.transport
  }

  /// Highest transaction time seen by this client, if any.
  pub fn last_txn_time(&self) -> Option<i64> {
    let txn = self.inner.last_txn.load(Ordering::SeqCst);
    (txn > 0).then_some(txn)
  }

  /// Raise the watermark to `txn`. Lower values are ignored.
  pub fn sync_last_txn_time(&self, txn: i64) {
    self.inner.last_txn.fetch_max(txn, Ordering::SeqCst);
  }

  pub async fn query(&self, expr: impl Into<Expr>) -> Result<Value> {
    self.query_with(expr, QueryOptions::default()).await
  }

  pub async fn query_with(&self, expr: impl Into<Expr>, options: QueryOptions) -> Result<Value> {
    let expr = expr.into();
    trace!(query = %expr, "sending query");
    let mut request = self.request(
      Method::Post,
      "",
      options.secret.as_deref(),
      options.query_timeout,
    );
    request.body = Some(to_json(&expr)?);
    let response = self.execute(request, options.abort).await?;
    resource(response)
  }

  /// `GET /ping`, optionally scoped (`node`, `global`, ...) and with a server
  /// timeout.
  pub async fn ping(&self, scope: Option<&str>, timeout: Option<Duration>) -> Result<Value> {
    let mut request = self.request(Method::Get, "ping", None, None);
    if let Some(scope) = scope {
      request.query.push(("scope".to_string(), scope.to_string()));
    }
    if let Some(timeout) = timeout {
      request
        .query
        .push(("timeout".to_string(), timeout.as_millis().to_string()));
    }
    let response = self.execute(request, None).await?;
    resource(response)
  }

  /// Pagination helper over `set`.
  pub fn paginate(&self, set: impl Into<Expr>, params: PaginateParams) -> Result<PageHelper> {
    PageHelper::new(self.clone(), set, params)
  }

  /// Raw event stream over a document or set reference.
  pub fn stream(&self, expr: impl Into<Expr>, options: StreamOptions) -> StreamClient {
    StreamClient::new(self.clone(), expr.into(), options)
  }

  /// Document stream that reads a snapshot once the stream has started.
  pub fn document_stream(&self, document: impl Into<Expr>, options: StreamOptions) -> DocumentStream {
    DocumentStream::new(self.clone(), document.into(), options)
  }

  /// Request carrying the authentication, version and watermark headers.
  pub(crate) fn request(
    &self,
    method: Method,
    path: &str,
    secret: Option<&str>,
    query_timeout: Option<Duration>,
  ) -> HttpRequest {
    let config = &self.inner.config;
    let mut request = HttpRequest::new(method, path);
    let secret = secret.unwrap_or(&config.secret);
    request.headers = vec![
      ("Authorization".to_string(), format!("Bearer {}", secret)),
      (HEADER_API_VERSION.to_string(), API_VERSION.to_string()),
      (HEADER_DRIVER.to_string(), DRIVER_NAME.to_string()),
    ];
    if let Some(timeout) = query_timeout.or(config.query_timeout) {
      request
        .headers
        .push((HEADER_QUERY_TIMEOUT.to_string(), timeout.as_millis().to_string()));
    }
    if let Some(txn) = self.last_txn_time() {
      request
        .headers
        .push((HEADER_LAST_SEEN_TXN.to_string(), txn.to_string()));
    }
    request.headers.extend(config.headers.iter().cloned());
    request
  }

  async fn execute(
    &self,
    mut request: HttpRequest,
    abort: Option<AbortRegistration>,
  ) -> Result<HttpResponse> {
    // one-shot requests only; stream bodies are unbounded
    request.timeout = self.inner.config.timeout;
    let method = request.method;
    let path = format!("/{}", request.path);
    let started = Instant::now();

    let call = self.inner.transport.execute(request);
    let call = async {
      match abort {
        Some(registration) => Abortable::new(call, registration)
          .await
          .unwrap_or(Err(Error::Aborted)),
        None => call.await,
      }
    };
    let response = match self.inner.config.timeout {
      Some(limit) => tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Error::Timeout)??,
      None => call.await?,
    };

    self.observe_headers(&response.headers);
    debug!(
      method = %method,
      path = %path,
      status = response.status,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "fauna request"
    );
    Ok(response)
  }

  pub(crate) fn observe_headers(&self, headers: &[(String, String)]) {
    let Some(raw) = find_header(headers, HEADER_TXN_TIME) else {
      return;
    };
    match raw.trim().parse::<i64>() {
      Ok(txn) => self.sync_last_txn_time(txn),
      Err(_) => warn!(value = raw, "ignoring unparsable {} header", HEADER_TXN_TIME),
    }
  }
}

fn resource(response: HttpResponse) -> Result<Value> {
  if !response.is_success() {
    return Err(FaunaError::from_response(&response).into());
  }
  let body: ResourceBody = serde_json::from_str(&response.body)?;
  Ok(body.resource)
}
