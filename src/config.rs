use crate::error::PoolError;

/// The rule applied when a bounded queue is full at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
  /// Suspend the submitter until a queue slot frees up, or fail with
  /// [`PoolError::PoolClosed`] if the pool begins shutting down first.
  #[default]
  Block,
  /// Fail the submission immediately with [`PoolError::QueueFull`].
  Reject,
  /// Run the work synchronously on the submitting thread, bypassing the
  /// queue entirely.
  CallerRuns,
}

/// Construction-time options for a [`ThreadPoolManager`](crate::ThreadPoolManager).
///
/// Worker count and queue capacity are fixed for the pool's lifetime.
#[derive(Debug, Clone)]
pub struct PoolConfig {
  pub(crate) worker_count: usize,
  pub(crate) queue_capacity: Option<usize>,
  pub(crate) admission_policy: AdmissionPolicy,
  pub(crate) thread_name_prefix: String,
  pub(crate) stack_size: Option<usize>,
}

impl PoolConfig {
  /// Creates a configuration for a pool with `worker_count` threads, an
  /// unbounded queue and the [`AdmissionPolicy::Block`] policy.
  pub fn new(worker_count: usize) -> Self {
    Self {
      worker_count,
      queue_capacity: None,
      admission_policy: AdmissionPolicy::default(),
      thread_name_prefix: "orchestra-worker".to_string(),
      stack_size: None,
    }
  }

  /// Bounds the pending queue to `capacity` tasks.
  pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
    self.queue_capacity = Some(capacity);
    self
  }

  /// Selects what happens when a bounded queue is full at submission time.
  pub fn with_admission_policy(mut self, policy: AdmissionPolicy) -> Self {
    self.admission_policy = policy;
    self
  }

  /// Worker threads are named `"{prefix}-{id}"`.
  pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.thread_name_prefix = prefix.into();
    self
  }

  /// Overrides the platform default stack size for worker threads.
  pub fn with_stack_size(mut self, bytes: usize) -> Self {
    self.stack_size = Some(bytes);
    self
  }

  pub(crate) fn validate(&self) -> Result<(), PoolError> {
    if self.worker_count == 0 {
      return Err(PoolError::InvalidConfig(
        "worker_count must be at least 1".to_string(),
      ));
    }
    if self.queue_capacity == Some(0) {
      return Err(PoolError::InvalidConfig(
        "queue_capacity must be at least 1 task".to_string(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = PoolConfig::new(4);
    assert_eq!(config.worker_count, 4);
    assert_eq!(config.queue_capacity, None);
    assert_eq!(config.admission_policy, AdmissionPolicy::Block);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_zero_workers_rejected() {
    let result = PoolConfig::new(0).validate();
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
  }

  #[test]
  fn test_zero_capacity_rejected() {
    let result = PoolConfig::new(1).with_queue_capacity(0).validate();
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
  }
}
