//! Virtual-time scheduler for deterministic tests.
//!
//! Time only moves when the test says so. Due tasks run synchronously on the
//! thread calling [`TestScheduler::advance_by`] or [`TestScheduler::flush`],
//! in order of their due time and FIFO for equal due times.
//!
//! ```rust
//! use std::sync::{atomic::{AtomicBool, Ordering}, Arc};
//! use rxsingle::scheduler::{Duration, Scheduler, TestScheduler};
//!
//! let scheduler = TestScheduler::new();
//! let fired = Arc::new(AtomicBool::new(false));
//! let f = fired.clone();
//! scheduler.schedule(Duration::from_millis(100), Box::new(move || f.store(true, Ordering::SeqCst)));
//!
//! scheduler.advance_by(Duration::from_millis(99));
//! assert!(!fired.load(Ordering::SeqCst));
//! scheduler.advance_by(Duration::from_millis(1));
//! assert!(fired.load(Ordering::SeqCst));
//! ```
//!
//! Clones share the same clock and task queue, so a clone can be handed to
//! the operator under test while the test keeps driving the original.

use std::{
  cmp::Ordering,
  collections::BinaryHeap,
  sync::{
    atomic::{AtomicBool, Ordering as AtomicOrdering},
    Arc, Mutex, MutexGuard,
  },
};

use super::{Duration, Scheduler, Task};
use crate::disposable::{Disposable, Dispose};

// ==================== Internal State ====================

#[derive(Default)]
struct State {
  virtual_time: Duration,
  task_queue: BinaryHeap<ScheduledTask>,
  next_task_id: usize,
}

struct ScheduledTask {
  scheduled_time: Duration,
  task_id: usize,
  task: Task,
  cancelled: Arc<Cancelled>,
}

impl PartialEq for ScheduledTask {
  fn eq(&self, other: &Self) -> bool {
    self.scheduled_time == other.scheduled_time && self.task_id == other.task_id
  }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for ScheduledTask {
  fn cmp(&self, other: &Self) -> Ordering {
    // Min-heap: earlier times first, then FIFO by task_id
    other
      .scheduled_time
      .cmp(&self.scheduled_time)
      .then_with(|| other.task_id.cmp(&self.task_id))
  }
}

#[derive(Default)]
struct Cancelled(AtomicBool);

impl Dispose for Cancelled {
  fn dispose(&self) { self.0.store(true, AtomicOrdering::Release); }

  fn is_disposed(&self) -> bool { self.0.load(AtomicOrdering::Acquire) }
}

// ==================== TestScheduler ====================

/// A virtual time scheduler for deterministic testing.
#[derive(Clone, Default)]
pub struct TestScheduler {
  state: Arc<Mutex<State>>,
}

impl TestScheduler {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, State> {
    // A panicking task never runs while the lock is held.
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Current virtual time.
  pub fn now(&self) -> Duration { self.lock().virtual_time }

  /// Number of tasks that are scheduled and not cancelled.
  pub fn pending_count(&self) -> usize {
    self
      .lock()
      .task_queue
      .iter()
      .filter(|t| !t.cancelled.is_disposed())
      .count()
  }

  pub fn is_empty(&self) -> bool { self.pending_count() == 0 }

  /// Advance virtual time by `duration`, running every task that becomes due.
  pub fn advance_by(&self, duration: Duration) {
    let target_time = self.lock().virtual_time + duration;
    self.execute_tasks_until(Some(target_time));
    let mut state = self.lock();
    if state.virtual_time < target_time {
      state.virtual_time = target_time;
    }
  }

  /// Run every pending task, moving time forward to each task's due time.
  pub fn flush(&self) { self.execute_tasks_until(None); }

  fn execute_tasks_until(&self, target_time: Option<Duration>) {
    loop {
      let next = {
        let mut state = self.lock();
        let due = state
          .task_queue
          .peek()
          .is_some_and(|peek| target_time.map_or(true, |limit| peek.scheduled_time <= limit));
        if !due {
          return;
        }
        let task = state.task_queue.pop();
        if let Some(task) = &task {
          state.virtual_time = task.scheduled_time;
        }
        task
      };

      // Run outside the lock so the task may schedule more work.
      if let Some(scheduled) = next {
        if !scheduled.cancelled.is_disposed() {
          (scheduled.task)();
        }
      }
    }
  }
}

impl Scheduler for TestScheduler {
  fn schedule(&self, delay: Duration, task: Task) -> Disposable {
    let cancelled = Arc::new(Cancelled::default());
    let mut state = self.lock();
    let scheduled_time = state.virtual_time + delay;
    let task_id = state.next_task_id;
    state.next_task_id += 1;
    state.task_queue.push(ScheduledTask { scheduled_time, task_id, task, cancelled: cancelled.clone() });
    Disposable::new(cancelled)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Task) {
    let log = Arc::new(Mutex::new(vec![]));
    let l = log.clone();
    let make = move |n: u32| -> Task {
      let l = l.clone();
      Box::new(move || l.lock().unwrap().push(n))
    };
    (log, make)
  }

  #[rxsingle_macro::test]
  fn advance_by_is_cumulative() {
    let scheduler = TestScheduler::new();
    scheduler.advance_by(Duration::from_millis(100));
    scheduler.advance_by(Duration::from_millis(50));
    assert_eq!(scheduler.now(), Duration::from_millis(150));
  }

  #[rxsingle_macro::test]
  fn tasks_run_in_due_order_then_fifo() {
    let scheduler = TestScheduler::new();
    let (log, task) = recorder();
    scheduler.schedule(Duration::from_millis(30), task(3));
    scheduler.schedule(Duration::from_millis(10), task(1));
    scheduler.schedule(Duration::from_millis(10), task(2));

    scheduler.advance_by(Duration::from_millis(10));
    assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    assert_eq!(scheduler.pending_count(), 1);

    scheduler.flush();
    assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(scheduler.now(), Duration::from_millis(30));
  }

  #[rxsingle_macro::test]
  fn cancelled_task_is_skipped() {
    let scheduler = TestScheduler::new();
    let (log, task) = recorder();
    let handle = scheduler.schedule(Duration::from_millis(10), task(1));
    handle.dispose();
    assert!(scheduler.is_empty());
    scheduler.flush();
    assert!(log.lock().unwrap().is_empty());
  }

  #[rxsingle_macro::test]
  fn task_can_schedule_more_work() {
    let scheduler = TestScheduler::new();
    let (log, task) = recorder();
    let inner = scheduler.clone();
    let second = task(2);
    let first = task(1);
    scheduler.schedule(
      Duration::from_millis(10),
      Box::new(move || {
        first();
        inner.schedule(Duration::from_millis(10), second);
      }),
    );

    scheduler.advance_by(Duration::from_millis(15));
    assert_eq!(*log.lock().unwrap(), vec![1]);
    scheduler.advance_by(Duration::from_millis(5));
    assert_eq!(*log.lock().unwrap(), vec![1, 2]);
  }
}
