use thiserror::Error;

/// Errors that can occur within the `thread_orchestra` pool.
#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
  #[error("Pool queue is full, task was rejected")]
  QueueFull,

  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolClosed,

  #[error("Submitted task panicked during execution: {0}")]
  TaskPanicked(String),

  #[error("Task was cancelled before it started executing")]
  TaskCancelled,

  #[error("Timed out waiting for the task outcome")]
  WaitTimedOut,

  #[error("Task outcome already taken from this handle")]
  ResultUnavailable,

  #[error("Invalid pool configuration: {0}")]
  InvalidConfig(String),

  #[error("Failed to spawn a worker thread: {0}")]
  WorkerSpawnFailed(String),
}
