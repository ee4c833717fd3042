//! Realtime event streams.
//!
//! A [`StreamClient`] opens `POST /stream` for one expression and decodes the
//! newline-delimited records of the response body into [`StreamEvent`]s.
//! [`DocumentStream`] layers a snapshot read on top, and [`Subscription`]
//! dispatches events of either to handlers registered per [`EventType`].
//!
//! A stream moves from idle to open to closed, and never leaves closed.
//! Closing is idempotent and safe from inside a handler.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{AbortHandle, Abortable, BoxFuture};
use futures::stream::{self, Stream};
use futures::{FutureExt, StreamExt};
use thiserror::Error;
use tracing::{trace, warn};

use crate::client::{Client, QueryOptions};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::json::{to_json, JsonFragments};
use crate::protocol::{FaunaError, HttpResponse, Method};
use crate::query;
use crate::transport::ChunkStream;
use crate::values::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
  Start,
  Version,
  HistoryRewrite,
  Snapshot,
  Error,
}

impl EventType {
  pub fn as_str(self) -> &'static str {
    match self {
      EventType::Start => "start",
      EventType::Version => "version",
      EventType::HistoryRewrite => "history_rewrite",
      EventType::Snapshot => "snapshot",
      EventType::Error => "error",
    }
  }
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Error delivered through a stream's error event.
#[derive(Error, Debug)]
pub enum StreamError {
  /// An `error` record sent by the server inside the stream
  #[error("stream error: {code}: {description}")]
  Remote { code: String, description: String },

  /// The request or connection failed
  #[error(transparent)]
  Delegated(Error),

  #[error("Streams are not supported by this transport")]
  NotSupported,
}

impl StreamError {
  pub fn code(&self) -> Option<&str> {
    match self {
      StreamError::Remote { code, .. } => Some(code),
      _ => None,
    }
  }

  pub fn description(&self) -> Option<&str> {
    match self {
      StreamError::Remote { description, .. } => Some(description),
      _ => None,
    }
  }
}

#[derive(Debug)]
pub enum StreamEvent {
  Start { txn: i64, event: Value },
  Version { txn: i64, event: Value },
  HistoryRewrite { txn: i64, event: Value },
  /// Current document, read once the stream has started
  Snapshot { document: Value },
  Error(StreamError),
}

impl StreamEvent {
  pub fn kind(&self) -> EventType {
    match self {
      StreamEvent::Start { .. } => EventType::Start,
      StreamEvent::Version { .. } => EventType::Version,
      StreamEvent::HistoryRewrite { .. } => EventType::HistoryRewrite,
      StreamEvent::Snapshot { .. } => EventType::Snapshot,
      StreamEvent::Error(_) => EventType::Error,
    }
  }

  pub fn txn(&self) -> Option<i64> {
    match self {
      StreamEvent::Start { txn, .. }
      | StreamEvent::Version { txn, .. }
      | StreamEvent::HistoryRewrite { txn, .. } => Some(*txn),
      _ => None,
    }
  }

  /// Raw `event` payload of the record
  pub fn event(&self) -> Option<&Value> {
    match self {
      StreamEvent::Start { event, .. }
      | StreamEvent::Version { event, .. }
      | StreamEvent::HistoryRewrite { event, .. } => Some(event),
      _ => None,
    }
  }

  pub fn document(&self) -> Option<&Value> {
    match self {
      StreamEvent::Snapshot { document } => Some(document),
      _ => self.event().and_then(|e| e.get("document")),
    }
  }

  pub fn data(&self) -> Option<&Value> {
    self.document().and_then(|d| d.get("data"))
  }

  pub fn diff(&self) -> Option<&Value> {
    self.event().and_then(|e| e.get("diff"))
  }

  pub fn prev(&self) -> Option<&Value> {
    self.event().and_then(|e| e.get("prev"))
  }

  pub fn action(&self) -> Option<&str> {
    self.event().and_then(|e| e.get("action")).and_then(Value::as_str)
  }

  pub fn error(&self) -> Option<&StreamError> {
    match self {
      StreamEvent::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// Event fields the server may include in version records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
  Action,
  Document,
  Diff,
  Prev,
  Index,
}

impl EventField {
  pub fn as_str(self) -> &'static str {
    match self {
      EventField::Action => "action",
      EventField::Document => "document",
      EventField::Diff => "diff",
      EventField::Prev => "prev",
      EventField::Index => "index",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOptions {
  /// Requested event fields; empty leaves the server default
  pub fields: Vec<EventField>,
}

impl StreamOptions {
  pub fn with_fields(mut self, fields: impl IntoIterator<Item = EventField>) -> Self {
    self.fields = fields.into_iter().collect();
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
  Idle,
  Open,
  Closed,
}

const IDLE: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

impl StreamState {
  fn from_u8(state: u8) -> Self {
    match state {
      IDLE => StreamState::Idle,
      OPEN => StreamState::Open,
      _ => StreamState::Closed,
    }
  }
}

impl fmt::Display for StreamState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      StreamState::Idle => "idle",
      StreamState::Open => "open",
      StreamState::Closed => "closed",
    };
    f.write_str(name)
  }
}

/// Shared handle over a stream's state. Clones control the same stream.
#[derive(Debug, Clone, Default)]
pub struct StreamControl {
  inner: Arc<ControlInner>,
}

#[derive(Debug, Default)]
struct ControlInner {
  state: AtomicU8,
  // set by close(), not when the source ends or fails
  cancelled: AtomicBool,
  aborts: Mutex<Vec<AbortHandle>>,
}

impl StreamControl {
  pub fn state(&self) -> StreamState {
    StreamState::from_u8(self.inner.state.load(Ordering::SeqCst))
  }

  pub fn is_closed(&self) -> bool {
    self.state() == StreamState::Closed
  }

  /// Close the stream and cancel any in-flight transport read. Events
  /// already received but not yet delivered are dropped, except errors.
  /// Closing a closed stream does nothing.
  pub fn close(&self) {
    self.inner.cancelled.store(true, Ordering::SeqCst);
    self.finish();
  }

  fn cancelled(&self) -> bool {
    self.inner.cancelled.load(Ordering::SeqCst)
  }

  /// Close without discarding undelivered events.
  fn finish(&self) {
    if self.inner.state.swap(CLOSED, Ordering::SeqCst) == CLOSED {
      return;
    }
    let aborts = std::mem::take(&mut *self.lock_aborts());
    for handle in aborts {
      handle.abort();
    }
  }

  fn open(&self) -> Result<()> {
    self
      .inner
      .state
      .compare_exchange(IDLE, OPEN, Ordering::SeqCst, Ordering::SeqCst)
      .map(|_| ())
      .map_err(|state| {
        Error::InvalidState(format!(
          "stream cannot be started while {}",
          StreamState::from_u8(state)
        ))
      })
  }

  fn register(&self, handle: AbortHandle) {
    self.lock_aborts().push(handle.clone());
    // close() may have run before the handle was registered
    if self.is_closed() {
      handle.abort();
    }
  }

  fn lock_aborts(&self) -> std::sync::MutexGuard<'_, Vec<AbortHandle>> {
    self
      .inner
      .aborts
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

/// Raw event stream over one expression.
pub struct StreamClient {
  client: Client,
  expr: Expr,
  options: StreamOptions,
  control: StreamControl,
  body: Option<Abortable<ChunkStream>>,
  decoder: JsonFragments,
  pending: VecDeque<StreamEvent>,
  // final error, delivered even though the stream is already closed
  terminal: Option<StreamEvent>,
}

impl fmt::Debug for StreamClient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StreamClient")
      .field("expr", &self.expr)
      .field("state", &self.control.state())
      .finish_non_exhaustive()
  }
}

impl StreamClient {
  pub fn new(client: Client, expr: Expr, options: StreamOptions) -> Self {
    Self {
      client,
      expr,
      options,
      control: StreamControl::default(),
      body: None,
      decoder: JsonFragments::new(),
      pending: VecDeque::new(),
      terminal: None,
    }
  }

  pub fn control(&self) -> StreamControl {
    self.control.clone()
  }

  pub fn state(&self) -> StreamState {
    self.control.state()
  }

  pub fn close(&self) {
    self.control.close();
  }

  /// Open the stream. Only valid once, from the idle state. A request that
  /// fails is reported as the stream's first and last error event.
  pub async fn subscribe(&mut self) -> Result<()> {
    self.control.open()?;

    let mut request = self.client.request(Method::Post, "stream", None, None);
    if !self.options.fields.is_empty() {
      let fields: Vec<&str> = self.options.fields.iter().map(|f| f.as_str()).collect();
      request.query.push(("fields".to_string(), fields.join(",")));
    }
    request.body = Some(to_json(&self.expr)?);

    let (handle, registration) = AbortHandle::new_pair();
    self.control.register(handle);
    let opened = Abortable::new(self.client.transport().execute_stream(request), registration).await;

    let response = match opened {
      // closed while connecting
      Err(_) => return Ok(()),
      Ok(Err(Error::StreamsNotSupported)) => {
        self.fail(StreamError::NotSupported);
        return Ok(());
      }
      Ok(Err(e)) => {
        self.fail(StreamError::Delegated(e));
        return Ok(());
      }
      Ok(Ok(response)) => response,
    };

    self.client.observe_headers(&response.headers);
    if !(200..300).contains(&response.status) {
      let mut body = Vec::new();
      let mut chunks = response.body;
      while let Some(chunk) = chunks.next().await {
        match chunk {
          Ok(bytes) => body.extend_from_slice(&bytes),
          Err(e) => {
            self.fail(StreamError::Delegated(e));
            return Ok(());
          }
        }
      }
      let failed = HttpResponse::new(response.status, String::from_utf8_lossy(&body));
      self.fail(StreamError::Delegated(Error::Fauna(FaunaError::from_response(&failed))));
      return Ok(());
    }

    let (handle, registration) = AbortHandle::new_pair();
    self.control.register(handle);
    self.body = Some(Abortable::new(response.body, registration));
    Ok(())
  }

  /// Next event, or `None` once the stream is closed and drained.
  ///
  /// Cancel safe: dropping the future loses no event.
  pub async fn next_event(&mut self) -> Option<StreamEvent> {
    loop {
      if self.control.is_closed() {
        self.body = None;
        if self.control.cancelled() {
          self.pending.clear();
        }
        return self.pending.pop_front().or_else(|| self.terminal.take());
      }
      if let Some(event) = self.pending.pop_front() {
        return Some(event);
      }
      let body = self.body.as_mut()?;
      let next = body.next().await;

      match next {
        Some(Ok(chunk)) => match self.decoder.push(&chunk) {
          Ok(records) => {
            for record in records {
              if let Some(event) = self.decode(record) {
                self.pending.push_back(event);
              }
            }
          }
          Err(e) => self.fail(StreamError::Delegated(e)),
        },
        Some(Err(e)) => self.fail(StreamError::Delegated(e)),
        None => {
          trace!("stream body ended");
          self.body = None;
          self.control.finish();
        }
      }
    }
  }

  /// Events as a `Stream`, ending when the stream closes.
  pub fn into_stream(self) -> impl Stream<Item = StreamEvent> {
    stream::unfold(self, |mut source| async move {
      source.next_event().await.map(|event| (event, source))
    })
  }

  fn fail(&mut self, error: StreamError) {
    warn!(error = %error, "stream failed");
    self.terminal = Some(StreamEvent::Error(error));
    self.control.finish();
  }

  fn decode(&self, record: Value) -> Option<StreamEvent> {
    let txn = record["txn"].as_i64();
    if let Some(txn) = txn {
      self.client.sync_last_txn_time(txn);
    }
    let kind = record["type"].as_str().unwrap_or_default().to_string();
    trace!(kind = %kind, txn = ?txn, "stream record");

    let event = record.get("event").cloned().unwrap_or_default();
    let txn = txn.unwrap_or_default();
    match kind.as_str() {
      "start" => Some(StreamEvent::Start { txn, event }),
      "version" => Some(StreamEvent::Version { txn, event }),
      "history_rewrite" => Some(StreamEvent::HistoryRewrite { txn, event }),
      "error" => Some(StreamEvent::Error(StreamError::Remote {
        code: event["code"].as_str().unwrap_or_default().to_string(),
        description: event["description"].as_str().unwrap_or_default().to_string(),
      })),
      other => {
        warn!(kind = other, "skipping unknown stream record");
        None
      }
    }
  }
}

/// Stream over one document that emits a snapshot of it after the start
/// event.
///
/// Events received while the snapshot is being read are held back. Once it
/// arrives, the snapshot is emitted, followed by the held events newer than
/// the snapshot's `ts`; older ones are already reflected in it.
pub struct DocumentStream {
  client: Client,
  document: Expr,
  inner: StreamClient,
  started: bool,
  snapshot_pending: bool,
  buffer: Vec<StreamEvent>,
  ready: VecDeque<StreamEvent>,
  terminal: Option<StreamEvent>,
}

impl fmt::Debug for DocumentStream {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DocumentStream")
      .field("document", &self.document)
      .field("state", &self.inner.state())
      .finish_non_exhaustive()
  }
}

impl DocumentStream {
  pub fn new(client: Client, document: Expr, options: StreamOptions) -> Self {
    let inner = StreamClient::new(client.clone(), document.clone(), options);
    Self {
      client,
      document,
      inner,
      started: false,
      snapshot_pending: false,
      buffer: Vec::new(),
      ready: VecDeque::new(),
      terminal: None,
    }
  }

  pub fn control(&self) -> StreamControl {
    self.inner.control()
  }

  pub fn state(&self) -> StreamState {
    self.inner.state()
  }

  pub fn close(&self) {
    self.inner.close();
  }

  pub async fn subscribe(&mut self) -> Result<()> {
    self.inner.subscribe().await
  }

  pub async fn next_event(&mut self) -> Option<StreamEvent> {
    loop {
      if self.inner.state() == StreamState::Closed {
        if self.inner.control.cancelled() {
          self.ready.retain(|e| e.kind() == EventType::Error);
        }
        if let Some(event) = self.ready.pop_front().or_else(|| self.terminal.take()) {
          return Some(event);
        }
        return self.inner.next_event().await;
      }
      if let Some(event) = self.ready.pop_front() {
        return Some(event);
      }
      if self.snapshot_pending {
        self.take_snapshot().await;
        continue;
      }
      let event = self.inner.next_event().await?;
      if !self.started && event.kind() == EventType::Start {
        self.started = true;
        self.snapshot_pending = true;
      }
      return Some(event);
    }
  }

  pub fn into_stream(self) -> impl Stream<Item = StreamEvent> {
    stream::unfold(self, |mut source| async move {
      source.next_event().await.map(|event| (event, source))
    })
  }

  async fn take_snapshot(&mut self) {
    let client = self.client.clone();
    let (handle, registration) = AbortHandle::new_pair();
    self.inner.control.register(handle);
    let read = client.query_with(
      query::get(self.document.clone()),
      QueryOptions::default().with_abort(registration),
    );
    tokio::pin!(read);

    let mut ended = false;
    let result = loop {
      tokio::select! {
        biased;
        event = self.inner.next_event(), if !ended => match event {
          Some(event) => self.buffer.push(event),
          None => ended = true,
        },
        result = &mut read => break result,
      }
    };

    self.snapshot_pending = false;
    let buffered = std::mem::take(&mut self.buffer);
    match result {
      Ok(document) => {
        let ts = document["ts"].as_i64();
        self.ready.push_back(StreamEvent::Snapshot { document });
        for event in buffered {
          match (event.txn(), ts) {
            (Some(txn), Some(ts)) if txn <= ts => continue,
            _ => self.ready.push_back(event),
          }
        }
      }
      Err(e) => {
        let errors = buffered.into_iter().filter(|event| event.kind() == EventType::Error);
        self.ready.extend(errors);
        if let Error::Aborted = e {
          trace!("snapshot read cancelled");
          return;
        }
        warn!(error = %e, "snapshot read failed");
        self.terminal = Some(StreamEvent::Error(StreamError::Delegated(e)));
        self.inner.close();
      }
    }
  }
}

/// Anything a [`Subscription`] can drive.
pub trait EventSource: Send {
  fn subscribe(&mut self) -> BoxFuture<'_, Result<()>>;
  fn next_event(&mut self) -> BoxFuture<'_, Option<StreamEvent>>;
  fn control(&self) -> StreamControl;
}

impl EventSource for StreamClient {
  fn subscribe(&mut self) -> BoxFuture<'_, Result<()>> {
    StreamClient::subscribe(self).boxed()
  }

  fn next_event(&mut self) -> BoxFuture<'_, Option<StreamEvent>> {
    StreamClient::next_event(self).boxed()
  }

  fn control(&self) -> StreamControl {
    StreamClient::control(self)
  }
}

impl EventSource for DocumentStream {
  fn subscribe(&mut self) -> BoxFuture<'_, Result<()>> {
    DocumentStream::subscribe(self).boxed()
  }

  fn next_event(&mut self) -> BoxFuture<'_, Option<StreamEvent>> {
    DocumentStream::next_event(self).boxed()
  }

  fn control(&self) -> StreamControl {
    DocumentStream::control(self)
  }
}

type Handler = Box<dyn FnMut(&StreamEvent) + Send>;

/// Dispatches the events of a source to handlers by event type.
pub struct Subscription<S> {
  source: S,
  handlers: HashMap<EventType, Vec<Handler>>,
}

impl<S: EventSource> Subscription<S> {
  pub fn new(source: S) -> Self {
    Self {
      source,
      handlers: HashMap::new(),
    }
  }

  /// Register a handler for `kind`. Handlers of one type run in
  /// registration order.
  pub fn on<F>(mut self, kind: EventType, handler: F) -> Self
  where
    F: FnMut(&StreamEvent) + Send + 'static,
  {
    self.handlers.entry(kind).or_default().push(Box::new(handler));
    self
  }

  pub fn control(&self) -> StreamControl {
    self.source.control()
  }

  pub fn close(&self) {
    self.source.control().close();
  }

  /// Open the source and dispatch its events until it closes.
  pub async fn start(&mut self) -> Result<()> {
    self.source.subscribe().await?;
    while let Some(event) = self.source.next_event().await {
      if let Some(handlers) = self.handlers.get_mut(&event.kind()) {
        for handler in handlers.iter_mut() {
          handler(&event);
        }
      }
    }
    Ok(())
  }

  pub fn into_inner(self) -> S {
    self.source
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_control_transitions() {
    let control = StreamControl::default();
    assert_eq!(control.state(), StreamState::Idle);
    control.open().unwrap();
    assert!(matches!(control.open(), Err(Error::InvalidState(_))));
    control.close();
    control.close();
    assert_eq!(control.state(), StreamState::Closed);
    assert!(control.open().is_err());
  }

  #[test]
  fn test_late_registration_is_aborted() {
    let control = StreamControl::default();
    control.close();
    let (handle, registration) = AbortHandle::new_pair();
    control.register(handle);
    let read = Abortable::new(futures::future::pending::<()>(), registration);
    assert!(futures::executor::block_on(read).is_err());
  }
}
