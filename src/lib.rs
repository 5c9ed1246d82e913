//! # httpflex
//!
//! 面向 HTTP API 客户端的请求编排库：缓存、批量去重、重试、钩子与统一响应信封。
//!
//! Request orchestration for HTTP API clients. Callers describe requests as
//! parameter maps; the library renders endpoints, sends through a pluggable
//! transport, and returns every outcome as a uniform
//! [`ResponseEnvelope`] of `{result, code, message, data}`.
//!
//! ## Key Features
//!
//! - **Caching**: idempotent requests are cached under deterministic keys via [`cache`]
//! - **Batching**: ordered batches with duplicate collapsing via [`batch`]
//! - **Retries**: exponential backoff on retryable statuses and network errors via [`retry`]
//! - **Hooks**: before/after/on-error callbacks via [`hooks`]
//! - **Pluggable stages**: parsers, validators and formatters via [`response`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use httpflex::{Client, RequestSpec};
//!
//! #[tokio::main]
//! async fn main() -> httpflex::Result<()> {
//!     let client = Client::builder()
//!         .identity("PostsClient")
//!         .base_url("https://jsonplaceholder.typicode.com")
//!         .endpoint("/posts/{post_id}")
//!         .build()?;
//!
//!     let env = client.request(RequestSpec::new().param("post_id", 1)).await?;
//!     println!("{}", env.to_json());
//!
//!     let batch = client
//!         .request_batch((1..=3).map(|id| RequestSpec::new().param("post_id", id)))
//!         .await;
//!     assert_eq!(batch.len(), 3);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client, builder, configuration and the single-request dispatcher |
//! | [`batch`] | Deduplicated, ordered batch execution and executors |
//! | [`cache`] | Cache keys, façade and backends |
//! | [`hooks`] | Request lifecycle hooks |
//! | [`retry`] | Retry policy |
//! | [`request`] | Endpoint templating and request validators |
//! | [`response`] | Parsers, response validators and formatters |
//! | [`transport`] | Transport trait and the `reqwest` implementation |
//! | [`types`] | Request specs, envelopes and payloads |
//! | [`utils`] | Log sanitization and request ids |

pub mod batch;
pub mod cache;
pub mod client;
pub mod hooks;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;
pub mod types;
pub mod utils;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ErrorKind, FieldErrors};

pub use client::{CallOptions, Client, ClientBuilder, ClientConfig, RequestInput, RequestOutput};
pub use hooks::{HookContext, HookPhase, HookPipeline, HookRegistration};
pub use retry::RetryPolicy;
pub use transport::{Authenticator, BasicAuth, BearerAuth};
pub use types::{CacheMode, FilePart, Method, Params, Payload, RequestSpec, ResponseEnvelope};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
