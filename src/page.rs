//! Cursor-driven pagination over a set.
//!
//! A [`PageHelper`] wraps a set expression in `Paginate`, applies the
//! registered `Map`/`Filter` transforms and walks the result page by page.
//! Only a cursor present in a response moves the stored cursor; once a
//! direction's cursor is missing, traversal in that direction is finished.

use std::sync::Arc;

use futures::stream::{self, Stream};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::query::{self, PaginateOptions};
use crate::values::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  /// Follow `after` cursors
  Forward,
  /// Follow `before` cursors
  Reverse,
}

/// Initial pagination parameters. `before` and `after` are exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaginateParams {
  pub size: Option<i64>,
  pub ts: Option<Expr>,
  pub events: Option<bool>,
  pub sources: Option<bool>,
  pub before: Option<Value>,
  pub after: Option<Value>,
}

impl PaginateParams {
  pub fn with_size(mut self, size: i64) -> Self {
    self.size = Some(size);
    self
  }

  pub fn with_ts(mut self, ts: impl Into<Expr>) -> Self {
    self.ts = Some(ts.into());
    self
  }

  pub fn with_events(mut self, events: bool) -> Self {
    self.events = Some(events);
    self
  }

  pub fn with_sources(mut self, sources: bool) -> Self {
    self.sources = Some(sources);
    self
  }

  /// Start before `cursor`; `Value::Null` starts from the end of the set.
  pub fn with_before(mut self, cursor: impl Into<Value>) -> Self {
    self.before = Some(cursor.into());
    self
  }

  pub fn with_after(mut self, cursor: impl Into<Value>) -> Self {
    self.after = Some(cursor.into());
    self
  }
}

/// Transform applied on top of the `Paginate` call, in registration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
  Map(Expr),
  Filter(Expr),
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
  pub data: Vec<Value>,
  pub before: Option<Value>,
  pub after: Option<Value>,
}

impl Page {
  /// Read a page from a `Paginate` result. Elements carrying a `document`
  /// also get it under `instance`.
  pub fn from_value(value: Value) -> Result<Page> {
    let mut fields = match value {
      Value::Object(fields) => fields,
      other => {
        return Err(Error::UnexpectedResponse(format!(
          "expected a page object, got {}",
          other
        )))
      }
    };
    let data = match fields.remove("data") {
      Some(Value::Array(items)) => items.into_iter().map(alias_instance).collect(),
      Some(other) => {
        return Err(Error::UnexpectedResponse(format!(
          "page data must be an array, got {}",
          other
        )))
      }
      None => Vec::new(),
    };
    Ok(Page {
      data,
      before: cursor(fields.remove("before")),
      after: cursor(fields.remove("after")),
    })
  }
}

fn cursor(value: Option<Value>) -> Option<Value> {
  value.filter(|v| !v.is_null())
}

fn alias_instance(element: Value) -> Value {
  let mut fields = match element {
    Value::Object(fields) => fields,
    other => return other,
  };
  if let Some(document) = fields.get("document").cloned() {
    fields.entry("instance".to_string()).or_insert(document);
  }
  if let Some(inner) = fields.remove("value") {
    fields.insert("value".to_string(), alias_instance(inner));
  }
  Value::Object(fields)
}

/// Pagination engine over one set.
///
/// Clones share their transform list until one of them appends to it;
/// cursors always belong to a single clone. Fetches on one helper must not
/// overlap, which `&mut self` enforces.
#[derive(Debug, Clone)]
pub struct PageHelper {
  client: Client,
  set: Expr,
  size: Option<i64>,
  ts: Option<Expr>,
  events: Option<bool>,
  sources: Option<bool>,
  direction: Option<Direction>,
  before: Option<Value>,
  after: Option<Value>,
  transforms: Arc<Vec<Transform>>,
}

impl PageHelper {
  pub fn new(client: Client, set: impl Into<Expr>, params: PaginateParams) -> Result<Self> {
    if params.before.is_some() && params.after.is_some() {
      return Err(Error::InvalidValue(
        "before and after cursors cannot both be set".to_string(),
      ));
    }
    let direction = if params.before.is_some() {
      Some(Direction::Reverse)
    } else if params.after.is_some() {
      Some(Direction::Forward)
    } else {
      None
    };
    Ok(Self {
      client,
      set: set.into(),
      size: params.size,
      ts: params.ts,
      events: params.events,
      sources: params.sources,
      direction,
      before: params.before,
      after: params.after,
      transforms: Arc::new(Vec::new()),
    })
  }

  /// A helper that maps each page through `lambda`.
  pub fn map(&self, lambda: impl Into<Expr>) -> Self {
    self.with_transform(Transform::Map(lambda.into()))
  }

  /// A helper that filters each page with `lambda`.
  pub fn filter(&self, lambda: impl Into<Expr>) -> Self {
    self.with_transform(Transform::Filter(lambda.into()))
  }

  fn with_transform(&self, transform: Transform) -> Self {
    let mut next = self.clone();
    Arc::make_mut(&mut next.transforms).push(transform);
    next
  }

  pub fn transforms(&self) -> &[Transform] {
    &self.transforms
  }

  /// Whether this helper shares its transform list with `other`.
  pub fn shares_transforms(&self, other: &PageHelper) -> bool {
    Arc::ptr_eq(&self.transforms, &other.transforms)
  }

  pub fn direction(&self) -> Option<Direction> {
    self.direction
  }

  pub fn before(&self) -> Option<&Value> {
    self.before.as_ref()
  }

  pub fn after(&self) -> Option<&Value> {
    self.after.as_ref()
  }

  /// The query sent for one fetch in `direction` from the stored cursor.
  pub fn query(&self, direction: Direction) -> Expr {
    let mut options = PaginateOptions::default();
    if let Some(size) = self.size {
      options = options.size(size);
    }
    if let Some(ts) = &self.ts {
      options = options.ts(ts.clone());
    }
    if let Some(events) = self.events {
      options = options.events(events);
    }
    if let Some(sources) = self.sources {
      options = options.sources(sources);
    }
    match direction {
      Direction::Forward => {
        if let Some(after) = &self.after {
          options = options.after(after);
        }
      }
      Direction::Reverse => {
        options = options.before(self.before.as_ref().unwrap_or(&Value::Null));
      }
    }

    let mut expr = query::paginate_with(self.set.clone(), options);
    for transform in self.transforms.iter() {
      expr = match transform {
        Transform::Map(lambda) => query::map(expr, lambda.clone()),
        Transform::Filter(lambda) => query::filter(expr, lambda.clone()),
      };
    }
    expr
  }

  /// Fetch the page after the stored cursor.
  pub async fn next_page(&mut self) -> Result<Page> {
    self.fetch(Direction::Forward).await
  }

  /// Fetch the page before the stored cursor, or the last page when there
  /// is none.
  pub async fn previous_page(&mut self) -> Result<Page> {
    self.fetch(Direction::Reverse).await
  }

  /// Visit every page forward from the stored `after` cursor.
  pub async fn each<F>(&mut self, on_page: F) -> Result<()>
  where
    F: FnMut(Vec<Value>),
  {
    self.traverse(Direction::Forward, on_page).await
  }

  /// Visit every page backward from the stored `before` cursor.
  pub async fn each_reverse<F>(&mut self, on_page: F) -> Result<()>
  where
    F: FnMut(Vec<Value>),
  {
    self.traverse(Direction::Reverse, on_page).await
  }

  async fn traverse<F>(&mut self, direction: Direction, mut on_page: F) -> Result<()>
  where
    F: FnMut(Vec<Value>),
  {
    loop {
      let page = self.fetch(direction).await?;
      let more = has_next(&page, direction);
      on_page(page.data);
      if !more {
        return Ok(());
      }
    }
  }

  /// Pages as a stream, in the direction given at construction (forward
  /// unless a `before` cursor was supplied).
  pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Value>>> {
    let direction = self.direction.unwrap_or(Direction::Forward);
    stream::try_unfold((self, true), move |(mut helper, more)| async move {
      if !more {
        return Ok(None);
      }
      let page = helper.fetch(direction).await?;
      let more = has_next(&page, direction);
      Ok(Some((page.data, (helper, more))))
    })
  }

  async fn fetch(&mut self, direction: Direction) -> Result<Page> {
    let result = self.client.query(self.query(direction)).await?;
    let page = Page::from_value(result)?;
    if let Some(before) = &page.before {
      self.before = Some(before.clone());
    }
    if let Some(after) = &page.after {
      self.after = Some(after.clone());
    }
    Ok(page)
  }
}

fn has_next(page: &Page, direction: Direction) -> bool {
  match direction {
    Direction::Forward => page.after.is_some(),
    Direction::Reverse => page.before.is_some(),
  }
}
