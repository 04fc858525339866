//! Dynamically resizable worker-thread pool with per-task affinity
//!
//! # Features
//! - Pin a task to one specific worker, or route it to the least-loaded
//!   member of a candidate set
//! - Futures for submitted work: blocking `wait()`, `is_ready()`, and `.await`
//! - Grow and shrink the worker count at runtime without losing queued work
//! - Graceful shutdown (drain queues) or `abort()` (discard queued work)
//! - Panic isolation: a failing task resolves its handle, never a worker
//! - Idle hook for detecting quiescence from the outside

pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod result;

pub use errors::PoolError;
pub use handle::TaskHandle;
pub use model::{PoolStatus, WorkerId};
pub use pool::{Config, IdleHook, Pool};
pub use result::TaskResult;
