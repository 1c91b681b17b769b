use crate::config::{AdmissionPolicy, PoolConfig};
use crate::error::PoolError;
use crate::handle::{OutcomeCell, TaskHandle};
use crate::task::{ManagedTask, TaskToExecute};
use crate::task_queue::{PushError, TaskQueue};
use crate::worker::{run_worker_loop, WorkerHandle, WorkerState, WorkerStateCell};

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

lazy_static::lazy_static! {
  static ref NEXT_TASK_SEQ_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Defines how the pool should behave upon shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
  /// Drains every queued task before stopping. Running tasks complete.
  Graceful,
  /// Cancels queued tasks that have not started. Running tasks complete.
  Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum PoolState {
  Running = 0,
  Draining = 1,
  Stopped = 2,
}

impl PoolState {
  fn from_u8(raw: u8) -> PoolState {
    match raw {
      0 => PoolState::Running,
      1 => PoolState::Draining,
      _ => PoolState::Stopped,
    }
  }
}

/// A fixed-size pool of worker threads consuming tasks from a shared FIFO
/// queue.
///
/// Workers are spawned up front and live until shutdown; submitting work
/// never creates a thread. Admission of a task into execution follows
/// queue order, completion order is unordered across tasks.
///
/// A worker thread that dies outside of task execution (e.g. a fatal
/// signal) is not restarted; its queued work stays pending for the
/// remaining workers.
pub struct ThreadPoolManager<R: Send + 'static> {
  pool_name: Arc<String>,
  queue: Arc<TaskQueue<R>>,
  workers: Mutex<Vec<WorkerHandle>>,
  state: AtomicU8,
  active_tasks: Arc<DashMap<u64, Instant>>,
  policy: AdmissionPolicy,
}

impl<R: Send + 'static> ThreadPoolManager<R> {
  /// Creates the pool and spawns every worker thread up front.
  ///
  /// Fails fast with [`PoolError::InvalidConfig`] before any thread starts
  /// if the configuration is unusable.
  pub fn new(config: PoolConfig, pool_name: &str) -> Result<Arc<Self>, PoolError> {
    config.validate()?;

    let pool_name_arc = Arc::new(pool_name.to_string());
    let queue = Arc::new(TaskQueue::new(config.queue_capacity));
    let active_tasks: Arc<DashMap<u64, Instant>> = Arc::new(DashMap::new());

    let mut workers = Vec::with_capacity(config.worker_count);
    for id in 0..config.worker_count {
      let state = Arc::new(WorkerStateCell::new());
      let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
      if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
      }

      let worker_pool_name = pool_name_arc.clone();
      let worker_queue = queue.clone();
      let worker_state = state.clone();
      let worker_active_tasks = active_tasks.clone();

      let spawn_result = builder.spawn(move || {
        run_worker_loop(id, worker_pool_name, worker_queue, worker_state, worker_active_tasks);
      });

      let thread = match spawn_result {
        Ok(thread) => thread,
        Err(spawn_error) => {
          error!(pool_name = %pool_name_arc, worker_id = id, "Failed to spawn worker thread: {}", spawn_error);
          // Release the workers spawned so far; they exit once they observe
          // the closed, empty queue.
          queue.close();
          return Err(PoolError::WorkerSpawnFailed(spawn_error.to_string()));
        }
      };

      workers.push(WorkerHandle {
        id,
        state,
        thread: Some(thread),
      });
    }

    info!(pool_name = %pool_name_arc, worker_count = config.worker_count, policy = ?config.admission_policy, "Thread pool started.");

    Ok(Arc::new(Self {
      pool_name: pool_name_arc,
      queue,
      workers: Mutex::new(workers),
      state: AtomicU8::new(PoolState::Running as u8),
      active_tasks,
      policy: config.admission_policy,
    }))
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  /// Returns the current number of tasks in the pending queue.
  pub fn queued_task_count(&self) -> usize {
    self.queue.len()
  }

  /// Returns the number of tasks currently being executed.
  pub fn active_task_count(&self) -> usize {
    self.active_tasks.len()
  }

  pub fn worker_count(&self) -> usize {
    self.workers.lock().len()
  }

  /// Snapshot of every worker's lifecycle state, in worker-id order.
  pub fn worker_states(&self) -> Vec<WorkerState> {
    self.workers.lock().iter().map(|worker| worker.state.get()).collect()
  }

  pub fn is_shutdown(&self) -> bool {
    self.pool_state() == PoolState::Stopped
  }

  /// Wraps `work` into a task, assigns it the next sequence number, and
  /// admits it to the queue according to the pool's admission policy.
  ///
  /// # Errors
  /// [`PoolError::PoolClosed`] once shutdown has begun, and
  /// [`PoolError::QueueFull`] when a bounded queue is full under the
  /// [`AdmissionPolicy::Reject`] policy.
  pub fn submit(&self, work: TaskToExecute<R>) -> Result<TaskHandle<R>, PoolError> {
    if self.pool_state() != PoolState::Running {
      warn!(pool_name = %self.pool_name, "Submit: Attempted to submit task to a pool that is shutting down or stopped.");
      return Err(PoolError::PoolClosed);
    }

    let seq = NEXT_TASK_SEQ_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let cell = Arc::new(OutcomeCell::new());
    let task = ManagedTask {
      seq,
      work,
      cell: cell.clone(),
    };

    debug!(pool_name = %self.pool_name, %seq, "Submitting task to queue.");

    match self.policy {
      AdmissionPolicy::Block => {
        if self.queue.push_blocking(task).is_err() {
          warn!(pool_name = %self.pool_name, %seq, "Submit: Queue closed while waiting for space.");
          return Err(PoolError::PoolClosed);
        }
      }
      AdmissionPolicy::Reject => {
        if let Err((_task, push_error)) = self.queue.try_push(task) {
          return Err(match push_error {
            PushError::Full => PoolError::QueueFull,
            PushError::Closed => PoolError::PoolClosed,
          });
        }
      }
      AdmissionPolicy::CallerRuns => {
        if let Err((task, push_error)) = self.queue.try_push(task) {
          if push_error == PushError::Closed {
            return Err(PoolError::PoolClosed);
          }
          debug!(pool_name = %self.pool_name, %seq, "Queue full. Running task on the submitting thread.");
          self.run_on_caller(task);
        }
      }
    }

    Ok(TaskHandle { seq, cell })
  }

  /// Boxes a closure and submits it. Convenience over
  /// [`submit`](Self::submit).
  pub fn execute<F>(&self, work: F) -> Result<TaskHandle<R>, PoolError>
  where
    F: FnOnce() -> R + Send + 'static,
  {
    self.submit(Box::new(work))
  }

  /// Stops the pool.
  ///
  /// Both modes refuse new submissions immediately and return only once
  /// every worker thread has been joined. Calling `shutdown` on a pool
  /// that is already stopped is a no-op returning `Ok`.
  pub fn shutdown(&self, mode: ShutdownMode) -> Result<(), PoolError> {
    let transition = self.state.compare_exchange(
      PoolState::Running as u8,
      PoolState::Draining as u8,
      AtomicOrdering::AcqRel,
      AtomicOrdering::Acquire,
    );

    match transition {
      Ok(_) => {
        info!(pool_name = %self.pool_name, ?mode, "Initiating pool shutdown.");
        self.queue.close();
        if mode == ShutdownMode::Immediate {
          let drained = self.queue.drain();
          info!(pool_name = %self.pool_name, count = drained.len(), "Immediate shutdown: cancelling queued tasks.");
          for task in drained {
            if task.cancel() {
              debug!(pool_name = %self.pool_name, seq = %task.seq, "Cancelled queued task during shutdown.");
            }
          }
        }
      }
      Err(observed) if observed == PoolState::Stopped as u8 => {
        trace!(pool_name = %self.pool_name, "Shutdown: pool already stopped.");
        return Ok(());
      }
      Err(_) => {
        info!(pool_name = %self.pool_name, "Shutdown already in progress; waiting for workers.");
      }
    }

    self.join_workers();

    // The first caller to finish joining flips the pool to Stopped.
    let _ = self.state.compare_exchange(
      PoolState::Draining as u8,
      PoolState::Stopped as u8,
      AtomicOrdering::AcqRel,
      AtomicOrdering::Acquire,
    );

    info!(pool_name = %self.pool_name, "Pool shutdown complete.");
    Ok(())
  }

  fn run_on_caller(&self, task: ManagedTask<R>) {
    let seq = task.seq;
    self.active_tasks.insert(seq, Instant::now());
    // The handle has not been returned yet, so nothing can have cancelled
    // the task; the claim only fails if shutdown raced us here.
    if task.claim() {
      task.execute();
    }
    self.active_tasks.remove(&seq);
  }

  fn join_workers(&self) {
    let handles: Vec<(usize, JoinHandle<()>)> = {
      let mut workers = self.workers.lock();
      workers
        .iter_mut()
        .filter_map(|worker| worker.thread.take().map(|thread| (worker.id, thread)))
        .collect()
    };

    for (id, thread) in handles {
      if thread.join().is_err() {
        error!(pool_name = %self.pool_name, worker_id = id, "Worker thread panicked outside of task execution.");
      } else {
        trace!(pool_name = %self.pool_name, worker_id = id, "Worker joined.");
      }
    }
  }

  fn pool_state(&self) -> PoolState {
    PoolState::from_u8(self.state.load(AtomicOrdering::Acquire))
  }
}

impl<R: Send + 'static> Drop for ThreadPoolManager<R> {
  fn drop(&mut self) {
    if self.pool_state() == PoolState::Running {
      info!(
        pool_name = %self.pool_name,
        "ThreadPoolManager dropped without shutdown. Closing queue; workers drain and exit on their own."
      );
      self.state.store(PoolState::Draining as u8, AtomicOrdering::Release);
      // Joining here could block indefinitely behind long tasks, so the
      // worker threads are left to drain the queue and exit detached.
      self.queue.close();
    }
  }
}
