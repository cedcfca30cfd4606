//! Small shared helpers: observers, retry backoff and runtime glue.

pub mod backoff;
pub mod runtime;
pub mod subscribe;

pub use backoff::BackoffConfig;
pub use runtime::{boxed_task, sleep, spawn_detached, TaskFuture};
pub use subscribe::{ErrorFn, NextFn, PartialObserver};
