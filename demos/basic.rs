//! Basic example demonstrating FaunaDB Rust SDK usage.

use faunadb::query as q;
use faunadb::{Client, ClientConfig, EventType, Expr, PaginateParams, StreamOptions, Subscription};

#[tokio::main]
async fn main() -> faunadb::Result<()> {
  let secret = std::env::var("FAUNA_SECRET").unwrap_or_else(|_| "secret".to_string());
  let client = Client::new(ClientConfig::new(secret))?;

  // Ping the server
  let pong = client.ping(Some("node"), None).await?;
  println!("Ping: {}", pong);

  // Create a document
  let created = client
    .query(q::create_with(
      q::collection("users"),
      q::object([(
        "data",
        q::object([("name", "Alice"), ("email", "alice@example.com")]),
      )]),
    ))
    .await?;
  println!("Created: {}", created);
  let user = created["ref"].clone();

  // Read it back through a lambda
  let names = client
    .query(q::build(|scope| {
      let get_name = scope.lambda1(|_, r| q::select(["data", "name"], q::get(r)))?;
      Ok(q::map(vec![Expr::from(&user)], get_name))
    })?)
    .await?;
  println!("Names: {}", names);

  // Walk every document of the collection
  let mut pages = client
    .paginate(
      q::documents(q::collection("users")),
      PaginateParams::default().with_size(16),
    )?
    .map(q::lambda("r", |vars| vars.var("r").map(q::get))?);
  pages
    .each(|page| println!("Page of {} documents", page.len()))
    .await?;

  // Watch the document (update it from another client to see changes)
  println!("\nWatching {}...", user);
  println!("Press Ctrl+C to exit.\n");

  let stream = client.document_stream(&user, StreamOptions::default());
  let mut subscription = Subscription::new(stream)
    .on(EventType::Snapshot, |event| {
      println!("Snapshot: {:?}", event.document());
    })
    .on(EventType::Version, |event| {
      println!("{:?} at {:?}: {:?}", event.action(), event.txn(), event.diff());
    })
    .on(EventType::Error, |event| {
      println!("Error: {:?}", event.error());
    });
  subscription.start().await?;

  Ok(())
}
