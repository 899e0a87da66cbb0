//! Schedulers run delayed work for the time-based operators.
//!
//! The core only needs one thing from a scheduler: "run this closure after
//! `delay` and give me a handle that cancels it". [`Timeout`] and
//! [`delay_subscription`] are the consumers; everything else in the crate is
//! scheduler-free.
//!
//! | Scheduler | Availability |
//! |---|---|
//! | [`NewThreadScheduler`] | always |
//! | [`TestScheduler`] | always, virtual time for tests |
//! | [`ThreadPoolScheduler`] | feature `futures-scheduler` (default) |
//! | [`TokioScheduler`] | feature `tokio-scheduler` |
//!
//! [`Timeout`]: crate::ops::timeout
//! [`delay_subscription`]: crate::ops::delay_subscription

use std::sync::Arc;

pub use std::time::Duration;

use crate::disposable::Disposable;

mod new_thread;
pub mod test_scheduler;
#[cfg(feature = "futures-scheduler")]
mod thread_pool;
#[cfg(feature = "tokio-scheduler")]
mod tokio_scheduler;

pub use new_thread::NewThreadScheduler;
pub use test_scheduler::TestScheduler;
#[cfg(feature = "futures-scheduler")]
pub use thread_pool::ThreadPoolScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use tokio_scheduler::TokioScheduler;

/// A unit of scheduled work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks after a delay.
///
/// Disposing the returned handle before the task started must prevent it
/// from running. Once the task is running, disposing is a no-op.
pub trait Scheduler: Send + Sync {
  fn schedule(&self, delay: Duration, task: Task) -> Disposable;

  fn schedule_now(&self, task: Task) -> Disposable { self.schedule(Duration::ZERO, task) }
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
  fn schedule(&self, delay: Duration, task: Task) -> Disposable { (**self).schedule(delay, task) }
}

/// Type-erased scheduler stored by the operators.
pub type SharedScheduler = Arc<dyn Scheduler>;

pub(crate) fn share<S: Scheduler + 'static>(scheduler: S) -> SharedScheduler { Arc::new(scheduler) }
