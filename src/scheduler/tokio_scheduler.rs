use tokio::runtime::Handle;

use super::{Duration, Scheduler, Task};
use crate::{disposable::Disposable, error::Error};

/// Spawns tasks on a tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
  handle: Handle,
}

impl TokioScheduler {
  pub fn new(handle: Handle) -> Self { Self { handle } }

  /// Use the runtime the caller is running on.
  pub fn current() -> Result<Self, Error> { Handle::try_current().map(Self::new).map_err(Error::new) }
}

impl Scheduler for TokioScheduler {
  fn schedule(&self, delay: Duration, task: Task) -> Disposable {
    let join = self.handle.spawn(async move {
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      task();
    });
    Disposable::from_fn(move || join.abort())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  };

  use super::*;

  #[rxsingle_macro::test(shared)]
  async fn runs_on_current_runtime() {
    let scheduler = TokioScheduler::current().unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let r = ran.clone();
    scheduler.schedule(Duration::from_millis(5), Box::new(move || r.store(true, Ordering::SeqCst)));

    let cancelled = Arc::new(AtomicBool::new(false));
    let c = cancelled.clone();
    scheduler
      .schedule(Duration::from_millis(5), Box::new(move || c.store(true, Ordering::SeqCst)))
      .dispose();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ran.load(Ordering::SeqCst));
    assert!(!cancelled.load(Ordering::SeqCst));
  }
}
