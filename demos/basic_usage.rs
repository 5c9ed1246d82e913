//! Basic usage example
//!
//! Fetches a post through a cached client, then again from the cache, and
//! finally forces a refresh.
//!
//! Configuration is read from `HTTPFLEX_*` environment variables; the base
//! URL defaults to the public JSONPlaceholder API.
//!
//! Usage:
//!   RUST_LOG=httpflex=debug cargo run --example basic_usage

use httpflex::{Client, ClientBuilder, RequestSpec};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let base_url = std::env::var("POSTS_API_URL")
        .unwrap_or_else(|_| "https://jsonplaceholder.typicode.com".to_string());

    let client: Client = ClientBuilder::from_env()
        .identity("PostsClient")
        .base_url(base_url)
        .endpoint("/posts/{post_id}")
        .header("Accept", "application/json")
        .build()?;

    let first = client.request(RequestSpec::new().param("post_id", 1)).await?;
    println!("first:   {}", first.to_json());

    let cached = client.request(RequestSpec::new().param("post_id", 1)).await?;
    println!("cached:  {}", cached.to_json());

    let fresh = client.refresh().request(RequestSpec::new().param("post_id", 1)).await?;
    println!("refresh: {}", fresh.to_json());

    let missing = client.request(RequestSpec::new().param("post_id", 0)).await?;
    println!("missing: result={} code={} message={}", missing.result, missing.code, missing.message);

    let stats = client.cache_stats();
    println!("cache: hits={} misses={} sets={}", stats.hits, stats.misses, stats.sets);
    Ok(())
}
