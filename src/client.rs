//! 客户端模块：配置、构建器、单请求调度与批量入口。
//!
//! Public surface: [`ClientBuilder`] produces a [`Client`]; the client runs
//! single requests through the [`Dispatcher`] and batches through the
//! [`BatchCoordinator`](crate::batch::BatchCoordinator).

mod builder;
mod config;
mod core;
mod dispatch;

pub use builder::ClientBuilder;
pub use config::{ClientConfig, DEFAULT_IDENTITY, DEFAULT_MAX_WORKERS, DEFAULT_TIMEOUT};
pub use self::core::{CallOptions, Client, RequestInput, RequestOutput};
pub use dispatch::{DispatchOptions, Dispatched, Dispatcher};
