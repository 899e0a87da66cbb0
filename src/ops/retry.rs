//! Resubscribe to a failing source.
//!
//! Whether another attempt is made is decided by a [`RetryPolicy`]:
//!
//! ```rust
//! use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
//! use rxsingle::prelude::*;
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let c = calls.clone();
//! let flaky = Single::from_fn(move || match c.fetch_add(1, Ordering::SeqCst) {
//!   0 | 1 => Err(Error::msg("not yet")),
//!   n => Ok(n),
//! });
//!
//! flaky.retry_times(5).test().assert_success(2);
//! assert_eq!(calls.load(Ordering::SeqCst), 3);
//! ```
//!
//! Sources that fail synchronously are resubscribed through a [`Wip`]
//! trampoline, so a long run of immediate failures loops in one stack frame
//! instead of recursing.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  drain::Wip,
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
  single::{Single, SingleSource},
};

/// Decides whether a failed subscription is retried.
///
/// A policy returning `Err` stops retrying; the downstream then receives the
/// original failure merged with the policy's error.
pub trait RetryPolicy: Send + Sync {
  /// `attempt` is the number of retries already made for this subscriber.
  fn should_retry(&self, err: &Error, attempt: usize) -> Result<bool, Error>;
}

/// Retry at most this many times.
impl RetryPolicy for usize {
  fn should_retry(&self, _err: &Error, attempt: usize) -> Result<bool, Error> { Ok(attempt < *self) }
}

/// Policy that never gives up.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forever;

impl RetryPolicy for Forever {
  fn should_retry(&self, _err: &Error, _attempt: usize) -> Result<bool, Error> { Ok(true) }
}

impl<F> RetryPolicy for F
where
  F: Fn(&Error, usize) -> Result<bool, Error> + Send + Sync,
{
  fn should_retry(&self, err: &Error, attempt: usize) -> Result<bool, Error> { self(err, attempt) }
}

pub struct Retry<T, P> {
  source: Single<T>,
  policy: Arc<P>,
}

impl<T, P> Retry<T, P> {
  pub(crate) fn new(source: Single<T>, policy: P) -> Self { Self { source, policy: Arc::new(policy) } }
}

impl<T, P> SingleSource<T> for Retry<T, P>
where
  T: Send + 'static,
  P: RetryPolicy + 'static,
{
  fn subscribe(&self, mut observer: BoxedSingleObserver<T>) {
    let state = Arc::new(RetryState {
      source: self.source.clone(),
      policy: self.policy.clone(),
      attempts: AtomicUsize::new(0),
      upstream: DisposableSlot::new(),
      downstream: TakeCell::empty(),
      wip: Wip::new(),
    });
    observer.on_subscribe(Disposable::new(state.clone()));
    state.downstream.put(observer);
    if state.upstream.is_disposed() {
      drop(state.downstream.take());
      return;
    }
    state.resubscribe();
  }
}

struct RetryState<T, P> {
  source: Single<T>,
  policy: Arc<P>,
  attempts: AtomicUsize,
  upstream: DisposableSlot,
  downstream: TakeCell<BoxedSingleObserver<T>>,
  wip: Wip,
}

impl<T, P> RetryState<T, P>
where
  T: Send + 'static,
  P: RetryPolicy + 'static,
{
  fn resubscribe(self: &Arc<Self>) {
    self.wip.trampoline(|| {
      if self.upstream.is_disposed() || self.downstream.is_empty() {
        return;
      }
      self.source.subscribe_with(RetryObserver { state: self.clone() });
    });
  }
}

impl<T: Send, P: Send + Sync> Dispose for RetryState<T, P> {
  fn dispose(&self) {
    self.upstream.dispose();
    drop(self.downstream.take());
  }

  fn is_disposed(&self) -> bool { self.upstream.is_disposed() }
}

struct RetryObserver<T, P> {
  state: Arc<RetryState<T, P>>,
}

impl<T, P> SingleObserver<T> for RetryObserver<T, P>
where
  T: Send + 'static,
  P: RetryPolicy + 'static,
{
  fn on_subscribe(&mut self, d: Disposable) { self.state.upstream.update(d); }

  fn on_success(self, value: T) {
    if let Some(observer) = self.state.downstream.take() {
      self.state.upstream.weak_dispose();
      observer.on_success(value);
    }
  }

  fn on_error(self, err: Error) {
    let state = self.state;
    if state.upstream.is_disposed() {
      return;
    }
    let attempt = state.attempts.fetch_add(1, Ordering::Relaxed);
    let failure = match state.policy.should_retry(&err, attempt) {
      Ok(true) => {
        tracing::trace!(attempt = attempt + 1, error = %err, "retry: resubscribing");
        state.resubscribe();
        return;
      }
      Ok(false) => err,
      Err(policy_err) => Error::merge(err, policy_err),
    };
    if let Some(observer) = state.downstream.take() {
      state.upstream.weak_dispose();
      observer.on_error(failure);
    }
  }
}
