//! Batch example
//!
//! Sends a batch with repeated entries. Duplicates share a single dispatch
//! and every input slot gets its own envelope, in input order.
//!
//! Usage:
//!   RUST_LOG=httpflex=info cargo run --example batch_dedup

use httpflex::{Client, RequestSpec};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dispatched = Arc::new(AtomicUsize::new(0));
    let counter = dispatched.clone();

    let client = Client::builder()
        .identity("PostsClient")
        .base_url("https://jsonplaceholder.typicode.com")
        .endpoint("/posts/{post_id}")
        .max_workers(4)
        .batch_timeout(Duration::from_secs(20))
        .build()?;
    client.hooks().register_before("count", move |_, _| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    let ids = [1, 2, 1, 3, 2, 1];
    let started = Instant::now();
    let envs = client
        .request_batch(ids.iter().map(|id| RequestSpec::new().param("post_id", *id)))
        .await;

    for (id, env) in ids.iter().zip(&envs) {
        let title = env
            .data
            .as_json()
            .and_then(|d| d["title"].as_str())
            .unwrap_or("-");
        println!("post {:>2}: code={} title={}", id, env.code, title);
    }
    println!(
        "{} inputs, {} dispatches, {:?}",
        envs.len(),
        dispatched.load(Ordering::Relaxed),
        started.elapsed()
    );

    let sequential = client
        .cacheless()
        .request_batch_sequential(ids.iter().map(|id| RequestSpec::new().param("post_id", *id)))
        .await;
    println!("sequential run returned {} envelopes", sequential.len());
    Ok(())
}
