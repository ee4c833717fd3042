//! HTTP wire protocol types for FaunaDB.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::values::Value;

/// API version sent with every request
pub const API_VERSION: &str = "4";

/// Driver name reported to the server
pub const DRIVER_NAME: &str = "Rust";

pub const HEADER_API_VERSION: &str = "X-FaunaDB-API-Version";
pub const HEADER_DRIVER: &str = "X-Fauna-Driver";
pub const HEADER_LAST_SEEN_TXN: &str = "X-Last-Seen-Txn";
pub const HEADER_QUERY_TIMEOUT: &str = "X-Query-Timeout";
/// Response header carrying the transaction time of the request
pub const HEADER_TXN_TIME: &str = "x-txn-time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
  Get,
  #[default]
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A request handed to a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpRequest {
  pub method: Method,
  /// Path below the base URL, without a leading slash (empty for queries)
  pub path: String,
  pub query: Vec<(String, String)>,
  pub headers: Vec<(String, String)>,
  pub body: Option<String>,
  /// Transport-level deadline, if any
  pub timeout: Option<Duration>,
}

impl HttpRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      ..Self::default()
    }
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: String,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<String>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Header lookup, case-insensitive.
  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
  headers
    .iter()
    .find(|(k, _)| k.eq_ignore_ascii_case(name))
    .map(|(_, v)| v.as_str())
}

/// Body of a successful response.
#[derive(Debug, Deserialize)]
pub(crate) struct ResourceBody {
  #[serde(default)]
  pub resource: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  errors: Vec<QueryError>,
}

/// One step of the path into the query where an error occurred.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
  Index(u64),
  Key(String),
}

impl fmt::Display for PathSegment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PathSegment::Index(i) => write!(f, "{}", i),
      PathSegment::Key(k) => f.write_str(k),
    }
  }
}

/// A field-level validation failure
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationFailure {
  pub code: String,
  pub description: String,
  #[serde(default)]
  pub field: Vec<PathSegment>,
}

/// An error entry reported by the query evaluator
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryError {
  pub code: String,
  pub description: String,
  #[serde(default)]
  pub position: Vec<PathSegment>,
  /// Sub-field failures of a `validation failed` error
  #[serde(default)]
  pub failures: Vec<ValidationFailure>,
  /// Nested errors of a `call error`
  #[serde(default)]
  pub cause: Vec<QueryError>,
}

/// HTTP-level class of a remote error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  BadRequest,
  Unauthorized,
  PermissionDenied,
  NotFound,
  MethodNotAllowed,
  InternalError,
  Unavailable,
  Other,
}

impl ErrorKind {
  pub fn from_status(status: u16) -> Self {
    match status {
      400 => Self::BadRequest,
      401 => Self::Unauthorized,
      403 => Self::PermissionDenied,
      404 => Self::NotFound,
      405 => Self::MethodNotAllowed,
      500 => Self::InternalError,
      503 => Self::Unavailable,
      _ => Self::Other,
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::BadRequest => "bad request",
      Self::Unauthorized => "unauthorized",
      Self::PermissionDenied => "permission denied",
      Self::NotFound => "not found",
      Self::MethodNotAllowed => "method not allowed",
      Self::InternalError => "internal error",
      Self::Unavailable => "unavailable",
      Self::Other => "request failed",
    };
    f.write_str(name)
  }
}

/// Refinement of a 400 response by its error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadRequestKind {
  ValidationFailed,
  CallError,
  InvalidArgument,
  InvalidExpression,
  InstanceNotUnique,
  Other,
}

impl BadRequestKind {
  pub fn from_code(code: &str) -> Self {
    match code {
      "validation failed" => Self::ValidationFailed,
      "call error" => Self::CallError,
      "invalid argument" => Self::InvalidArgument,
      "invalid expression" => Self::InvalidExpression,
      "instance not unique" => Self::InstanceNotUnique,
      _ => Self::Other,
    }
  }
}

/// Error response from the database, with every entry of its `errors` array.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} ({status}): {}", describe(.errors))]
pub struct FaunaError {
  pub kind: ErrorKind,
  pub status: u16,
  pub errors: Vec<QueryError>,
}

fn describe(errors: &[QueryError]) -> String {
  match errors.first() {
    Some(e) => format!("{}: {}", e.code, e.description),
    None => "no error details".to_string(),
  }
}

impl FaunaError {
  pub fn new(status: u16, errors: Vec<QueryError>) -> Self {
    Self {
      kind: ErrorKind::from_status(status),
      status,
      errors,
    }
  }

  /// Build from a failed response. A body without an `errors` array still
  /// yields an error of the right kind, just without entries.
  pub fn from_response(response: &HttpResponse) -> Self {
    let errors = serde_json::from_str::<ErrorBody>(&response.body)
      .map(|b| b.errors)
      .unwrap_or_default();
    Self::new(response.status, errors)
  }

  pub fn code(&self) -> Option<&str> {
    self.errors.first().map(|e| e.code.as_str())
  }

  pub fn description(&self) -> Option<&str> {
    self.errors.first().map(|e| e.description.as_str())
  }

  pub fn position(&self) -> &[PathSegment] {
    self.errors.first().map(|e| e.position.as_slice()).unwrap_or(&[])
  }

  /// Sub-kind of a 400 response; `None` for any other status.
  pub fn bad_request_kind(&self) -> Option<BadRequestKind> {
    if self.kind != ErrorKind::BadRequest {
      return None;
    }
    Some(self.code().map(BadRequestKind::from_code).unwrap_or(BadRequestKind::Other))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_body_with_position_and_failures() {
    let body = r#"{"errors":[{"position":["create",1],"code":"validation failed","description":"document data is not valid.","failures":[{"field":["data","name"],"code":"duplicate value","description":"Value is not unique."}]}]}"#;
    let err = FaunaError::from_response(&HttpResponse::new(400, body));
    assert_eq!(err.kind, ErrorKind::BadRequest);
    assert_eq!(err.bad_request_kind(), Some(BadRequestKind::ValidationFailed));
    assert_eq!(
      err.position(),
      &[PathSegment::Key("create".to_string()), PathSegment::Index(1)]
    );
    assert_eq!(err.errors[0].failures[0].code, "duplicate value");
    assert_eq!(
      err.to_string(),
      "bad request (400): validation failed: document data is not valid."
    );
  }

  #[test]
  fn test_unparsable_body_keeps_kind() {
    let err = FaunaError::from_response(&HttpResponse::new(503, "<html>busy</html>"));
    assert_eq!(err.kind, ErrorKind::Unavailable);
    assert!(err.errors.is_empty());
    assert_eq!(err.bad_request_kind(), None);
  }

  #[test]
  fn test_headers_are_case_insensitive() {
    let response = HttpResponse::new(200, "{}").with_header("X-Txn-Time", "42");
    assert_eq!(response.header(HEADER_TXN_TIME), Some("42"));
  }
}
