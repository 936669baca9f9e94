//! # kvstash Quickstart
//!
//! Walks through the expiring-KV contract against two backends: the
//! in-memory store and the persistent SQLite store.
//!
//! ## Running This Example
//!
//! ```bash
//! cargo run --example quickstart
//! ```
//!
//! A temporary directory holds the SQLite database and is cleaned up on exit.

use kvstash::backends::SqliteConfig;
use kvstash::{Result, Store};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== kvstash quickstart ===\n");

    // -------------------------------------------------------------------
    // Part 1: In-memory store
    // -------------------------------------------------------------------

    let store = Store::memory();

    // Set a value without a TTL: it lives until deleted.
    store.set("user:1001", b"alice", None).await?;
    println!("set user:1001 -> alice");

    // Set a value with a short TTL.
    store
        .set("session:abc", b"token", Some(Duration::from_secs(1)))
        .await?;
    println!("set session:abc with a 1s TTL");

    if let Some(value) = store.get("user:1001").await? {
        println!("get user:1001 -> {}", String::from_utf8_lossy(&value));
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    match store.get("session:abc").await? {
        Some(_) => println!("session:abc still alive?!"),
        None => println!("session:abc expired, reads report absent"),
    }

    // Prefix-filtered listing of live entries only.
    let users = store.list(Some("user:")).await?;
    println!("live user:* entries: {:?}", users.keys().collect::<Vec<_>>());

    // -------------------------------------------------------------------
    // Part 2: Persistent SQLite store
    // -------------------------------------------------------------------

    let tmp = TempDir::new().expect("create temp dir");
    let store = Store::sqlite(
        SqliteConfig::default()
            .with_path(tmp.path().join("quickstart.sqlite3"))
            .with_table("demo")
            .with_default_ttl(Duration::from_secs(3600)),
    )?;

    // The store-wide default TTL (1h) applies when set carries none.
    store.set("cache:greeting", b"hello", None).await?;
    println!("\nset cache:greeting under the default 1h TTL");

    // An explicit TTL overrides the default.
    store
        .set("cache:flash", b"bye", Some(Duration::from_secs(1)))
        .await?;

    tokio::time::sleep(Duration::from_secs(2)).await;
    println!(
        "cache:greeting live: {}, cache:flash live: {}",
        store.exists("cache:greeting").await?,
        store.exists("cache:flash").await?
    );

    // Reset wipes all entries but keeps the table usable.
    store.reset().await?;
    println!("after reset, list is empty: {}", store.list(None).await?.is_empty());

    store.close().await?;
    println!("store closed");

    Ok(())
}
