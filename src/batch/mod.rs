//! 批处理模块：去重、有界并发执行与按输入顺序重组结果。
//!
//! # Batch Module
//!
//! A batch of request specs is partitioned into cache hits and dedup groups
//! of identical misses; each group is dispatched once on an executor and its
//! envelope copied into every slot of the group.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchCoordinator`] | Grouping, cache partitioning and ordered reassembly |
//! | [`AsyncExecutor`] | Runs a set of jobs, one outcome per job |
//! | [`TaskPoolExecutor`] | tokio tasks with a semaphore ceiling and optional wait timeout |
//! | [`SequentialExecutor`] | One job at a time on the calling task |
//! | [`JobOutcome`] | Completed envelope, timeout or failure |
//!
//! Output order follows input order only; completion order never matters.

mod coordinator;
mod executor;

pub use coordinator::BatchCoordinator;
pub use executor::{AsyncExecutor, Job, JobOutcome, SequentialExecutor, TaskPoolExecutor};
