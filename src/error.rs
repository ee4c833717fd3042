//! Error types for the FaunaDB client SDK.

use thiserror::Error;

use crate::ops::Arity;
use crate::protocol::FaunaError;

#[derive(Error, Debug)]
pub enum Error {
  #[error("{op}: expected {expected} arguments, got {actual}")]
  InvalidArity {
    op: &'static str,
    expected: Arity,
    actual: usize,
  },

  #[error("Invalid value: {0}")]
  InvalidValue(String),

  #[error("Serialization error: {0}")]
  Serialization(String),

  #[error("Connection error: {0}")]
  Connection(String),

  #[error("Timeout")]
  Timeout,

  #[error("Request aborted")]
  Aborted,

  #[error(transparent)]
  Fauna(#[from] FaunaError),

  #[error("Streams are not supported by this transport")]
  StreamsNotSupported,

  #[error("Invalid state: {0}")]
  InvalidState(String),

  #[error("Unexpected response: {0}")]
  UnexpectedResponse(String),
}

impl Error {
  /// The structured remote error, if the database evaluator produced this one.
  pub fn as_fauna(&self) -> Option<&FaunaError> {
    match self {
      Error::Fauna(e) => Some(e),
      _ => None,
    }
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

impl From<base64::DecodeError> for Error {
  fn from(e: base64::DecodeError) -> Self {
    Self::InvalidValue(format!("invalid base64: {}", e))
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      Self::Timeout
    } else {
      Self::Connection(e.to_string())
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;
