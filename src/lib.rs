//! A thread-backed pool for managing concurrent execution of closures with
//! queuing, admission policies, result handles and two-mode shutdown.
//!
//! A fixed set of worker threads is spawned when the pool is created and
//! consumes tasks from one shared FIFO queue; submitting work never spawns
//! a thread. Each submission returns a [`TaskHandle`] that can wait for,
//! poll, or pre-start cancel its task. Panics inside a task are caught at
//! the worker boundary and surfaced as that task's [`TaskOutcome::Failed`],
//! never affecting other tasks or the worker itself.

mod config;
mod error;
mod handle;
mod manager;
mod task;
mod task_queue;
mod worker;

pub use config::{AdmissionPolicy, PoolConfig};
pub use error::PoolError;
pub use handle::{TaskHandle, TaskOutcome};
pub use manager::{ShutdownMode, ThreadPoolManager};
pub use task::TaskToExecute;
pub use worker::WorkerState;
