use crate::error::PoolError;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// The terminal outcome of a task.
#[derive(Debug, PartialEq)]
pub enum TaskOutcome<R> {
  /// The work ran to completion and produced a value.
  Completed(R),
  /// The work panicked; the panic message is carried in the error.
  Failed(PoolError),
  /// The task was cancelled before any worker started it.
  Cancelled,
}

impl<R> TaskOutcome<R> {
  pub fn is_completed(&self) -> bool {
    matches!(self, TaskOutcome::Completed(_))
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, TaskOutcome::Failed(_))
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, TaskOutcome::Cancelled)
  }

  /// Converts the outcome into a `Result`, mapping `Cancelled` onto
  /// [`PoolError::TaskCancelled`].
  pub fn into_result(self) -> Result<R, PoolError> {
    match self {
      TaskOutcome::Completed(value) => Ok(value),
      TaskOutcome::Failed(error) => Err(error),
      TaskOutcome::Cancelled => Err(PoolError::TaskCancelled),
    }
  }
}

enum CellState<R> {
  /// No terminal outcome yet. `started` flips when a worker claims the task.
  Pending { started: bool },
  /// Terminal outcome waiting to be taken through the handle.
  Ready(TaskOutcome<R>),
  /// The outcome was already taken via `wait`, `wait_timeout` or `try_get`.
  Taken,
}

/// The slot shared between a queued task and its handle.
///
/// Every transition happens under one mutex, so a racing `cancel` and a
/// worker's claim resolve to exactly one winner: the task either runs to
/// a `Completed`/`Failed` outcome or becomes `Cancelled`, never both.
pub(crate) struct OutcomeCell<R> {
  state: Mutex<CellState<R>>,
  cv: Condvar,
}

impl<R> OutcomeCell<R> {
  pub(crate) fn new() -> Self {
    Self {
      state: Mutex::new(CellState::Pending { started: false }),
      cv: Condvar::new(),
    }
  }

  /// Marks the task as started. Returns `false` if the task is no longer
  /// claimable (cancelled while queued, or already claimed).
  pub(crate) fn claim(&self) -> bool {
    let mut state = self.state.lock();
    match &mut *state {
      CellState::Pending { started } if !*started => {
        *started = true;
        true
      }
      _ => false,
    }
  }

  /// Stores the terminal outcome and wakes every waiter.
  pub(crate) fn complete(&self, outcome: TaskOutcome<R>) {
    let mut state = self.state.lock();
    debug_assert!(matches!(*state, CellState::Pending { .. }));
    *state = CellState::Ready(outcome);
    self.cv.notify_all();
  }

  /// Flips a not-yet-started task to `Cancelled`. Returns `false` if the
  /// task is executing or already terminal.
  pub(crate) fn cancel(&self) -> bool {
    let mut state = self.state.lock();
    match *state {
      CellState::Pending { started: false } => {
        *state = CellState::Ready(TaskOutcome::Cancelled);
        self.cv.notify_all();
        true
      }
      _ => false,
    }
  }

  pub(crate) fn is_terminal(&self) -> bool {
    !matches!(*self.state.lock(), CellState::Pending { .. })
  }

  fn take_ready(state: &mut CellState<R>) -> Option<TaskOutcome<R>> {
    if matches!(*state, CellState::Ready(_)) {
      match std::mem::replace(state, CellState::Taken) {
        CellState::Ready(outcome) => Some(outcome),
        _ => unreachable!("state was checked to be Ready"),
      }
    } else {
      None
    }
  }

  pub(crate) fn wait(&self) -> Result<TaskOutcome<R>, PoolError> {
    let mut state = self.state.lock();
    loop {
      if let Some(outcome) = Self::take_ready(&mut state) {
        return Ok(outcome);
      }
      if matches!(*state, CellState::Taken) {
        return Err(PoolError::ResultUnavailable);
      }
      self.cv.wait(&mut state);
    }
  }

  pub(crate) fn wait_timeout(&self, timeout: Duration) -> Result<TaskOutcome<R>, PoolError> {
    let deadline = Instant::now() + timeout;
    let mut state = self.state.lock();
    loop {
      if let Some(outcome) = Self::take_ready(&mut state) {
        return Ok(outcome);
      }
      if matches!(*state, CellState::Taken) {
        return Err(PoolError::ResultUnavailable);
      }
      if self.cv.wait_until(&mut state, deadline).timed_out() {
        // The outcome may have landed right at the deadline.
        return match Self::take_ready(&mut state) {
          Some(outcome) => Ok(outcome),
          None => Err(PoolError::WaitTimedOut),
        };
      }
    }
  }

  pub(crate) fn try_get(&self) -> Option<TaskOutcome<R>> {
    Self::take_ready(&mut self.state.lock())
  }
}

/// A handle to a task submitted to the
/// [`ThreadPoolManager`](crate::ThreadPoolManager).
///
/// Allows observing completion, taking the single outcome out, and
/// cancelling the task while it is still queued.
pub struct TaskHandle<R: Send + 'static> {
  pub(crate) seq: u64,
  pub(crate) cell: Arc<OutcomeCell<R>>,
}

impl<R: Send + 'static> TaskHandle<R> {
  /// Returns the process-wide sequence number assigned at submission.
  pub fn id(&self) -> u64 {
    self.seq
  }

  /// Returns `true` once the task has reached a terminal outcome.
  pub fn is_finished(&self) -> bool {
    self.cell.is_terminal()
  }

  /// Requests cancellation of this task.
  ///
  /// Succeeds (and makes the outcome `Cancelled`) only while the task is
  /// still queued. A task that is already executing or terminal is left
  /// untouched and `false` is returned; in-progress work is never
  /// interrupted.
  pub fn cancel(&self) -> bool {
    let cancelled = self.cell.cancel();
    if cancelled {
      debug!(seq = %self.seq, "TaskHandle: task cancelled before execution.");
    }
    cancelled
  }

  /// Blocks the calling thread until the task reaches a terminal outcome,
  /// then takes the outcome out of the handle.
  ///
  /// # Errors
  /// Returns [`PoolError::ResultUnavailable`] if the outcome was already
  /// taken by an earlier call.
  pub fn wait(&self) -> Result<TaskOutcome<R>, PoolError> {
    self.cell.wait()
  }

  /// Like [`wait`](Self::wait), but gives up after `timeout`.
  ///
  /// An elapsed timeout yields [`PoolError::WaitTimedOut`] and does not
  /// affect the task itself; the task keeps running and a later `wait` or
  /// `try_get` can still observe its outcome.
  pub fn wait_timeout(&self, timeout: Duration) -> Result<TaskOutcome<R>, PoolError> {
    self.cell.wait_timeout(timeout)
  }

  /// Non-blocking poll. Returns `None` while the task is still pending, or
  /// after the outcome has already been taken.
  pub fn try_get(&self) -> Option<TaskOutcome<R>> {
    self.cell.try_get()
  }
}

impl<R: Send + 'static> fmt::Debug for TaskHandle<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskHandle")
      .field("seq", &self.seq)
      .field("finished", &self.is_finished())
      .finish()
  }
}
