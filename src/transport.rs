//! HTTP transport seam.
//!
//! The client only needs a way to execute a request and, for streams, to read
//! the response body chunk by chunk. Connection reuse belongs to the
//! implementation.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};

use crate::error::{Error, Result};
use crate::protocol::{HttpRequest, HttpResponse, Method};

/// Raw body chunks of a streaming response.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>>>;

/// A response whose body is still arriving.
pub struct StreamResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: ChunkStream,
}

impl std::fmt::Debug for StreamResponse {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StreamResponse")
      .field("status", &self.status)
      .field("headers", &self.headers)
      .finish_non_exhaustive()
  }
}

pub trait Transport: Send + Sync + 'static {
  /// Execute a request and buffer the whole response body.
  fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;

  /// Execute a request and hand back the body as it arrives. Transports
  /// without chunked reads keep the default.
  fn execute_stream(&self, request: HttpRequest) -> BoxFuture<'_, Result<StreamResponse>> {
    let _ = request;
    futures::future::ready(Err(Error::StreamsNotSupported)).boxed()
  }
}

/// Default transport over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  http: reqwest::Client,
  base_url: String,
}

impl HttpTransport {
  pub fn new(base_url: impl Into<String>) -> Result<Self> {
    let http = reqwest::Client::builder().build()?;
    Ok(Self::with_client(http, base_url))
  }

  /// Use a preconfigured `reqwest` client (proxies, pools, TLS roots).
  pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
    Self {
      http,
      base_url: base_url.into(),
    }
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn url(&self, request: &HttpRequest) -> String {
    let mut url = format!("{}/{}", self.base_url.trim_end_matches('/'), request.path);
    if !request.query.is_empty() {
      url.push('?');
      url.push_str(&encode_query(&request.query));
    }
    url
  }

  fn prepare(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    };
    let mut builder = self.http.request(method, self.url(request));
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.clone());
    }
    if let Some(timeout) = request.timeout {
      builder = builder.timeout(timeout);
    }
    builder
  }
}

impl Transport for HttpTransport {
  fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
    let builder = self.prepare(&request);
    async move {
      let response = builder.send().await?;
      let status = response.status().as_u16();
      let headers = collect_headers(response.headers());
      let body = response.text().await?;
      Ok(HttpResponse {
        status,
        headers,
        body,
      })
    }
    .boxed()
  }

  fn execute_stream(&self, request: HttpRequest) -> BoxFuture<'_, Result<StreamResponse>> {
    let builder = self.prepare(&request);
    async move {
      let response = builder.send().await?;
      let status = response.status().as_u16();
      let headers = collect_headers(response.headers());
      let body = response
        .bytes_stream()
        .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from))
        .boxed();
      Ok(StreamResponse {
        status,
        headers,
        body,
      })
    }
    .boxed()
  }
}

fn collect_headers(map: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
  map
    .iter()
    .filter_map(|(name, value)| {
      value
        .to_str()
        .ok()
        .map(|v| (name.as_str().to_string(), v.to_string()))
    })
    .collect()
}

pub(crate) fn encode_query(pairs: &[(String, String)]) -> String {
  pairs
    .iter()
    .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
    .collect::<Vec<_>>()
    .join("&")
}
