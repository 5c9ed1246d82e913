//! Download example
//!
//! Streams a response body to disk with the file-writing parser.
//!
//! Usage:
//!   cargo run --example download_file -- https://example.com/files report.pdf

use httpflex::response::FileWriteParser;
use httpflex::{Client, Payload, RequestSpec};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let base_url = args
        .next()
        .unwrap_or_else(|| "https://jsonplaceholder.typicode.com".to_string());
    let name = args.next().unwrap_or_else(|| "posts".to_string());

    let client = Client::builder()
        .identity("Downloader")
        .base_url(base_url)
        .endpoint("/{name}")
        .cache_enabled(false)
        .parser(Arc::new(FileWriteParser::new("./downloads")))
        .build()?;

    let env = client
        .request(RequestSpec::new().param("name", name.as_str()).filename(format!("{}.out", name)))
        .await?;

    match env.data {
        Payload::File(ref path) if env.result => println!("saved to {}", path.display()),
        _ => anyhow::bail!("download failed: {} {}", env.code, env.message),
    }
    Ok(())
}
