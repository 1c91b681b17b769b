use crate::error::PoolError;
use crate::handle::{OutcomeCell, TaskOutcome};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

/// The type of work that the pool executes.
/// It must be `Send` and `'static`, and produce a result of type `R`.
pub type TaskToExecute<R> = Box<dyn FnOnce() -> R + Send + 'static>;

/// Internal representation of a task managed by the pool.
pub(crate) struct ManagedTask<R: Send + 'static> {
  pub(crate) seq: u64,
  pub(crate) work: TaskToExecute<R>,
  pub(crate) cell: Arc<OutcomeCell<R>>,
}

impl<R: Send + 'static> std::fmt::Debug for ManagedTask<R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ManagedTask").field("seq", &self.seq).finish()
  }
}

impl<R: Send + 'static> ManagedTask<R> {
  /// Flips the outcome cell to started. `false` means the task was
  /// cancelled while queued and must not run.
  pub(crate) fn claim(&self) -> bool {
    self.cell.claim()
  }

  /// Cancels the task if it has not been claimed yet.
  pub(crate) fn cancel(&self) -> bool {
    self.cell.cancel()
  }

  /// Runs the work to completion and stores the outcome.
  ///
  /// Must only be called after a successful [`claim`](Self::claim). A panic
  /// in the work is caught at this boundary and recorded as a `Failed`
  /// outcome; it never unwinds into the calling worker.
  pub(crate) fn execute(self) {
    let ManagedTask { seq, work, cell } = self;
    match catch_unwind(AssertUnwindSafe(work)) {
      Ok(value) => {
        cell.complete(TaskOutcome::Completed(value));
      }
      Err(payload) => {
        let message = panic_message(payload.as_ref());
        error!(%seq, "Task panicked during execution: {}", message);
        cell.complete(TaskOutcome::Failed(PoolError::TaskPanicked(message)));
      }
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
