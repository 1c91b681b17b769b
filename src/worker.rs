use crate::task_queue::{Pop, TaskQueue};

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info, trace};

/// Observable lifecycle of a single worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
  /// Parked on the queue, waiting for a task.
  Idle = 0,
  /// Running one task to completion.
  Executing = 1,
  /// Observed queue closure, about to exit its loop.
  Stopping = 2,
  /// Loop exited; the thread is finished or joinable.
  Stopped = 3,
}

impl WorkerState {
  fn from_u8(raw: u8) -> WorkerState {
    match raw {
      0 => WorkerState::Idle,
      1 => WorkerState::Executing,
      2 => WorkerState::Stopping,
      _ => WorkerState::Stopped,
    }
  }
}

/// Atomic wrapper so the manager can observe worker states without racing
/// against the worker loop.
pub(crate) struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
  pub(crate) fn new() -> Self {
    Self(AtomicU8::new(WorkerState::Idle as u8))
  }

  pub(crate) fn set(&self, state: WorkerState) {
    self.0.store(state as u8, Ordering::Release);
  }

  pub(crate) fn get(&self) -> WorkerState {
    WorkerState::from_u8(self.0.load(Ordering::Acquire))
  }
}

/// What the manager keeps for each spawned worker thread.
pub(crate) struct WorkerHandle {
  pub(crate) id: usize,
  pub(crate) state: Arc<WorkerStateCell>,
  pub(crate) thread: Option<JoinHandle<()>>,
}

/// The loop every worker thread runs: pull, execute, repeat, until the
/// queue reports closed-and-empty.
///
/// A worker holds at most one task at a time and never preempts it; a
/// panicking task is converted into a `Failed` outcome inside
/// `ManagedTask::execute` and the worker returns to `Idle`. Tasks that
/// were cancelled while queued lose their claim and are skipped without
/// executing.
pub(crate) fn run_worker_loop<R: Send + 'static>(
  id: usize,
  pool_name: Arc<String>,
  queue: Arc<TaskQueue<R>>,
  state: Arc<WorkerStateCell>,
  active_tasks: Arc<DashMap<u64, Instant>>,
) {
  info!(pool_name = %pool_name, worker_id = id, "Worker loop started.");

  loop {
    state.set(WorkerState::Idle);
    match queue.pop_blocking() {
      Pop::Task(task) => {
        let seq = task.seq;
        if !task.claim() {
          debug!(pool_name = %pool_name, worker_id = id, %seq, "Dequeued task already cancelled, skipping.");
          continue;
        }
        state.set(WorkerState::Executing);
        active_tasks.insert(seq, Instant::now());
        debug!(pool_name = %pool_name, worker_id = id, %seq, "Dequeued task, executing.");
        task.execute();
        active_tasks.remove(&seq);
        trace!(pool_name = %pool_name, worker_id = id, %seq, "Task finished processing.");
      }
      Pop::Closed => {
        state.set(WorkerState::Stopping);
        info!(pool_name = %pool_name, worker_id = id, "Task queue closed and empty. Worker loop terminating.");
        break;
      }
    }
  }

  state.set(WorkerState::Stopped);
}
