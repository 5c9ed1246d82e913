//! 类型模块：请求描述与统一响应信封。
//!
//! # Types Module
//!
//! Core data shapes shared by every stage of a dispatch.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RequestSpec`] | One logical request: params plus per-call overrides |
//! | [`Method`] | HTTP method of a request |
//! | [`CacheMode`] | Per-call cache behaviour (default / bypass / refresh) |
//! | [`ResponseEnvelope`] | Uniform `{result, code, message, data}` result |
//! | [`Payload`] | Parsed response data carried by an envelope |
//!
//! ## Example
//!
//! ```rust
//! use httpflex::types::{Method, RequestSpec};
//!
//! let spec = RequestSpec::new()
//!     .param("post_id", 1)
//!     .method(Method::Get)
//!     .header("Accept", "application/json");
//! assert_eq!(spec.params["post_id"], 1);
//! ```

pub mod envelope;
pub mod request;

pub use envelope::{Payload, RawPayload, ResponseEnvelope, StreamHandle};
pub use request::{CacheMode, FilePart, Method, Params, RequestSpec};
