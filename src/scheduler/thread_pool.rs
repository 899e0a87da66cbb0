use futures::{executor::ThreadPool, future::abortable};

use super::{Duration, Scheduler, Task};
use crate::{disposable::Disposable, error::Error};

/// Runs tasks on a `futures` thread pool, timing delays with `futures-time`.
#[derive(Clone)]
pub struct ThreadPoolScheduler {
  pool: ThreadPool,
}

impl ThreadPoolScheduler {
  pub fn new() -> Result<Self, Error> { ThreadPool::new().map(Self::with_pool).map_err(Error::new) }

  pub fn with_pool(pool: ThreadPool) -> Self { Self { pool } }
}

impl Scheduler for ThreadPoolScheduler {
  fn schedule(&self, delay: Duration, task: Task) -> Disposable {
    let (fut, handle) = abortable(async move {
      if !delay.is_zero() {
        futures_time::task::sleep(delay.into()).await;
      }
      task();
    });
    self.pool.spawn_ok(async move {
      let _ = fut.await;
    });
    Disposable::from_fn(move || handle.abort())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc;

  use super::*;

  #[rxsingle_macro::test]
  fn runs_and_cancels() {
    let scheduler = ThreadPoolScheduler::new().unwrap();

    let (tx, rx) = mpsc::channel();
    scheduler.schedule(
      Duration::from_millis(5),
      Box::new(move || {
        let _ = tx.send(1);
      }),
    );
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(1));

    let (tx, rx) = mpsc::channel::<i32>();
    let handle = scheduler.schedule(
      Duration::from_millis(50),
      Box::new(move || {
        let _ = tx.send(2);
      }),
    );
    handle.dispose();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
  }
}
