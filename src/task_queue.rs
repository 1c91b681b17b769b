use crate::task::ManagedTask;

use std::collections::VecDeque;
use std::fmt;

use parking_lot::{Condvar, Mutex};

/// Result of a blocking pop: either the head task, or the signal that the
/// queue is closed and fully drained.
pub(crate) enum Pop<R: Send + 'static> {
  Task(ManagedTask<R>),
  Closed,
}

/// Why a non-blocking push was refused. The task travels back with the
/// error so the caller can still run or drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushError {
  Full,
  Closed,
}

struct QueueInner<R: Send + 'static> {
  tasks: VecDeque<ManagedTask<R>>,
  closed: bool,
}

/// A bounded (or unbounded), mutex-guarded FIFO of pending tasks.
///
/// A single lock covers every mutation, so the serialization order the
/// lock establishes among racing pushes IS the dequeue order. Two condvars
/// keep the blocking paths apart: `consumers` parks idle workers,
/// `producers` parks submitters blocked on a full queue.
pub(crate) struct TaskQueue<R: Send + 'static> {
  inner: Mutex<QueueInner<R>>,
  consumers: Condvar,
  producers: Condvar,
  capacity: Option<usize>,
}

impl<R: Send + 'static> fmt::Debug for TaskQueue<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    f.debug_struct("TaskQueue")
      .field("len", &inner.tasks.len())
      .field("closed", &inner.closed)
      .field("capacity", &self.capacity)
      .finish()
  }
}

impl<R: Send + 'static> TaskQueue<R> {
  /// Creates a queue with the given capacity; `None` means unbounded.
  pub(crate) fn new(capacity: Option<usize>) -> Self {
    Self {
      inner: Mutex::new(QueueInner {
        tasks: VecDeque::new(),
        closed: false,
      }),
      consumers: Condvar::new(),
      producers: Condvar::new(),
      capacity,
    }
  }

  /// Inserts at the tail without blocking, waking at most one consumer.
  pub(crate) fn try_push(&self, task: ManagedTask<R>) -> Result<(), (ManagedTask<R>, PushError)> {
    let mut inner = self.inner.lock();
    if inner.closed {
      return Err((task, PushError::Closed));
    }
    if self.is_full(&inner) {
      return Err((task, PushError::Full));
    }
    inner.tasks.push_back(task);
    self.consumers.notify_one();
    Ok(())
  }

  /// Inserts at the tail, suspending while the queue is full. Fails with
  /// the task handed back if the queue closes while waiting.
  pub(crate) fn push_blocking(&self, task: ManagedTask<R>) -> Result<(), ManagedTask<R>> {
    let mut inner = self.inner.lock();
    loop {
      if inner.closed {
        return Err(task);
      }
      if !self.is_full(&inner) {
        inner.tasks.push_back(task);
        self.consumers.notify_one();
        return Ok(());
      }
      self.producers.wait(&mut inner);
    }
  }

  /// Removes the head, suspending while the queue is empty and open.
  ///
  /// A closed queue keeps yielding tasks until it is drained, then reports
  /// `Pop::Closed`; graceful shutdown relies on this.
  pub(crate) fn pop_blocking(&self) -> Pop<R> {
    let mut inner = self.inner.lock();
    loop {
      if let Some(task) = inner.tasks.pop_front() {
        self.producers.notify_one();
        return Pop::Task(task);
      }
      if inner.closed {
        return Pop::Closed;
      }
      self.consumers.wait(&mut inner);
    }
  }

  /// Closes the queue for new pushes and wakes every parked thread so it
  /// can observe closure.
  pub(crate) fn close(&self) {
    let mut inner = self.inner.lock();
    inner.closed = true;
    self.consumers.notify_all();
    self.producers.notify_all();
  }

  /// Removes and returns every still-queued task. Immediate shutdown uses
  /// this to cancel work that has not started.
  pub(crate) fn drain(&self) -> Vec<ManagedTask<R>> {
    let mut inner = self.inner.lock();
    let drained: Vec<ManagedTask<R>> = inner.tasks.drain(..).collect();
    if !drained.is_empty() {
      self.producers.notify_all();
    }
    drained
  }

  pub(crate) fn len(&self) -> usize {
    self.inner.lock().tasks.len()
  }

  fn is_full(&self, inner: &QueueInner<R>) -> bool {
    self.capacity.map_or(false, |cap| inner.tasks.len() >= cap)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::handle::OutcomeCell;
  use std::sync::Arc;
  use std::thread;
  use std::time::Duration;

  // Helper to create a dummy ManagedTask for testing the queue.
  fn dummy_task(seq: u64) -> ManagedTask<String> {
    ManagedTask {
      seq,
      work: Box::new(move || format!("done-{}", seq)),
      cell: Arc::new(OutcomeCell::new()),
    }
  }

  #[test]
  fn test_fifo_order() {
    let queue = TaskQueue::<String>::new(None);
    for seq in 0..5 {
      queue.try_push(dummy_task(seq)).unwrap();
    }
    for expected in 0..5 {
      match queue.pop_blocking() {
        Pop::Task(task) => assert_eq!(task.seq, expected),
        Pop::Closed => panic!("queue closed unexpectedly"),
      }
    }
  }

  #[test]
  fn test_try_push_full() {
    let queue = TaskQueue::<String>::new(Some(1));
    queue.try_push(dummy_task(1)).unwrap();
    let result = queue.try_push(dummy_task(2));
    match result {
      Err((task, PushError::Full)) => assert_eq!(task.seq, 2),
      _ => panic!("expected Full"),
    }
    assert_eq!(queue.len(), 1);
  }

  #[test]
  fn test_close_wakes_blocked_consumer() {
    let queue = Arc::new(TaskQueue::<String>::new(None));
    let consumer = {
      let queue = queue.clone();
      thread::spawn(move || matches!(queue.pop_blocking(), Pop::Closed))
    };
    // Give the consumer a moment to park on the empty queue.
    thread::sleep(Duration::from_millis(20));
    queue.close();
    assert!(consumer.join().unwrap());
  }

  #[test]
  fn test_closed_queue_drains_before_reporting_closed() {
    let queue = TaskQueue::<String>::new(None);
    queue.try_push(dummy_task(1)).unwrap();
    queue.close();
    assert!(matches!(queue.pop_blocking(), Pop::Task(_)));
    assert!(matches!(queue.pop_blocking(), Pop::Closed));
  }

  #[test]
  fn test_push_blocking_unblocks_after_pop() {
    let queue = Arc::new(TaskQueue::<String>::new(Some(1)));
    queue.try_push(dummy_task(1)).unwrap();

    let producer = {
      let queue = queue.clone();
      thread::spawn(move || queue.push_blocking(dummy_task(2)).is_ok())
    };
    thread::sleep(Duration::from_millis(20));
    assert_eq!(queue.len(), 1, "producer should still be parked");

    assert!(matches!(queue.pop_blocking(), Pop::Task(_)));
    assert!(producer.join().unwrap());
    assert_eq!(queue.len(), 1);
  }

  #[test]
  fn test_push_blocking_fails_on_close() {
    let queue = Arc::new(TaskQueue::<String>::new(Some(1)));
    queue.try_push(dummy_task(1)).unwrap();

    let producer = {
      let queue = queue.clone();
      thread::spawn(move || queue.push_blocking(dummy_task(2)).is_err())
    };
    thread::sleep(Duration::from_millis(20));
    queue.close();
    assert!(producer.join().unwrap());
  }

  #[test]
  fn test_drain_empties_queue() {
    let queue = TaskQueue::<String>::new(None);
    for seq in 0..3 {
      queue.try_push(dummy_task(seq)).unwrap();
    }
    let drained = queue.drain();
    assert_eq!(drained.len(), 3);
    assert_eq!(queue.len(), 0);
    // Draining does not close the queue.
    assert!(queue.try_push(dummy_task(9)).is_ok());
  }
}
