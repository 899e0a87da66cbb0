use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread::{self, Thread},
  time::Instant,
};

use super::{Duration, Scheduler, Task};
use crate::disposable::{Disposable, Dispose};

/// Runs every task on a freshly spawned thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewThreadScheduler;

struct ThreadTask {
  cancelled: AtomicBool,
  thread: Thread,
}

impl Dispose for ThreadTask {
  fn dispose(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      self.thread.unpark();
    }
  }

  fn is_disposed(&self) -> bool { self.cancelled.load(Ordering::Acquire) }
}

impl Scheduler for NewThreadScheduler {
  fn schedule(&self, delay: Duration, task: Task) -> Disposable {
    let deadline = Instant::now() + delay;
    let (tx, rx) = std::sync::mpsc::sync_channel::<Arc<ThreadTask>>(1);
    let handle = thread::spawn(move || {
      let Ok(control) = rx.recv() else { return };
      loop {
        if control.is_disposed() {
          return;
        }
        let now = Instant::now();
        if now >= deadline {
          break;
        }
        thread::park_timeout(deadline - now);
      }
      task();
    });

    let control = Arc::new(ThreadTask { cancelled: AtomicBool::new(false), thread: handle.thread().clone() });
    // The worker only exits early if this send fails, which cannot happen
    // while it is still waiting on `rx`.
    let _ = tx.send(control.clone());
    Disposable::new(control)
  }
}
