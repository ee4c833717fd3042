//! FaunaDB Rust Client SDK
//!
//! Build query expressions with [`query`], send them with a [`Client`] and
//! read back decoded [`Value`]s. Sets can be walked page by page with
//! [`PageHelper`], documents and sets watched with [`StreamClient`] or
//! [`DocumentStream`].
//!
//! # Example
//!
//! ```no_run
//! use faunadb::query as q;
//! use faunadb::{Client, ClientConfig, PaginateParams};
//!
//! #[tokio::main]
//! async fn main() -> faunadb::Result<()> {
//!     let client = Client::new(ClientConfig::new("fnAE..."))?;
//!
//!     // Create a document
//!     let created = client
//!         .query(q::create_with(q::collection("users"), q::object([("data", q::object([("name", "Alice")]))])))
//!         .await?;
//!     println!("Created: {}", created);
//!
//!     // Walk an index page by page
//!     let mut pages = client.paginate(
//!         q::match_(q::index("users_by_name"), ["Alice"]),
//!         PaginateParams::default().with_size(10),
//!     )?;
//!     pages.each(|page| println!("Page: {:?}", page)).await?;
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod expr;
pub mod json;
pub mod ops;
mod page;
mod printer;
pub mod protocol;
pub mod query;
pub mod stream;
pub mod transport;
mod values;

pub use client::{Client, ClientConfig, QueryOptions};
pub use error::{Error, Result};
pub use expr::{Bindings, Call, Expr, IntoBody, Pattern, Scope};
pub use json::{parse_json, parse_json_streaming, to_json, to_json_pretty, JsonFragments};
pub use ops::{varargs, Arity, Op, OpSpec, Param};
pub use page::{Direction, Page, PageHelper, PaginateParams, Transform};
pub use protocol::{
  BadRequestKind, ErrorKind, FaunaError, HttpRequest, HttpResponse, Method, PathSegment,
  QueryError, ValidationFailure,
};
pub use stream::{
  DocumentStream, EventField, EventSource, EventType, StreamClient, StreamControl, StreamError,
  StreamEvent, StreamOptions, StreamState, Subscription,
};
pub use transport::{ChunkStream, HttpTransport, StreamResponse, Transport};
pub use values::{Bytes, FaunaDate, FaunaTime, Native, QueryValue, Ref, SetRef, Value};
