//! Resubscribe to a source after each success, emitting every value.
//!
//! The output is an [`Observable`](crate::observable::Observable): one item
//! per successful subscription, then completion once the [`RepeatPolicy`]
//! says stop. The first failure ends the stream with that error.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use super::retry::Forever;
use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  drain::Wip,
  error::Error,
  observable::ObservableSource,
  observer::{BoxedObserver, Observer, SingleObserver},
  single::Single,
};

/// Decides whether the source is subscribed (again).
pub trait RepeatPolicy: Send + Sync {
  /// `completed` is the number of successful subscriptions so far; it is 0
  /// for the check made before the first subscription.
  fn should_repeat(&self, completed: usize) -> Result<bool, Error>;
}

/// Subscribe this many times in total.
impl RepeatPolicy for usize {
  fn should_repeat(&self, completed: usize) -> Result<bool, Error> { Ok(completed < *self) }
}

impl RepeatPolicy for Forever {
  fn should_repeat(&self, _completed: usize) -> Result<bool, Error> { Ok(true) }
}

impl<F> RepeatPolicy for F
where
  F: Fn(usize) -> Result<bool, Error> + Send + Sync,
{
  fn should_repeat(&self, completed: usize) -> Result<bool, Error> { self(completed) }
}

pub struct Repeat<T, P> {
  source: Single<T>,
  policy: Arc<P>,
}

impl<T, P> Repeat<T, P> {
  pub(crate) fn new(source: Single<T>, policy: P) -> Self { Self { source, policy: Arc::new(policy) } }
}

impl<T, P> ObservableSource<T> for Repeat<T, P>
where
  T: Send + 'static,
  P: RepeatPolicy + 'static,
{
  fn subscribe(&self, mut observer: BoxedObserver<T>) {
    let state = Arc::new(RepeatState {
      source: self.source.clone(),
      policy: self.policy.clone(),
      completed: AtomicUsize::new(0),
      upstream: DisposableSlot::new(),
      downstream: TakeCell::empty(),
      wip: Wip::new(),
    });
    observer.on_subscribe(Disposable::new(state.clone()));
    if state.upstream.is_disposed() {
      return;
    }
    match self.policy.should_repeat(0) {
      Ok(true) => {
        state.downstream.put(observer);
        state.resubscribe();
      }
      Ok(false) => observer.on_complete(),
      Err(err) => observer.on_error(err),
    }
  }
}

struct RepeatState<T, P> {
  source: Single<T>,
  policy: Arc<P>,
  completed: AtomicUsize,
  upstream: DisposableSlot,
  downstream: TakeCell<BoxedObserver<T>>,
  wip: Wip,
}

impl<T, P> RepeatState<T, P>
where
  T: Send + 'static,
  P: RepeatPolicy + 'static,
{
  fn resubscribe(self: &Arc<Self>) {
    self.wip.trampoline(|| {
      if !self.upstream.is_disposed() {
        self.source.subscribe_with(RepeatObserver { state: self.clone() });
      }
    });
  }
}

impl<T: Send, P: Send + Sync> Dispose for RepeatState<T, P> {
  fn dispose(&self) {
    self.upstream.dispose();
    drop(self.downstream.take());
  }

  fn is_disposed(&self) -> bool { self.upstream.is_disposed() }
}

struct RepeatObserver<T, P> {
  state: Arc<RepeatState<T, P>>,
}

impl<T, P> SingleObserver<T> for RepeatObserver<T, P>
where
  T: Send + 'static,
  P: RepeatPolicy + 'static,
{
  fn on_subscribe(&mut self, d: Disposable) { self.state.upstream.update(d); }

  fn on_success(self, value: T) {
    let state = self.state;
    // Taken while emitting; a dispose racing with `on_next` finds the cell
    // empty and the observer is dropped below instead.
    let Some(mut observer) = state.downstream.take() else { return };
    observer.on_next(value);
    let completed = state.completed.fetch_add(1, Ordering::Relaxed) + 1;
    match state.policy.should_repeat(completed) {
      Ok(true) => {
        state.downstream.put(observer);
        if state.upstream.is_disposed() {
          drop(state.downstream.take());
          return;
        }
        tracing::trace!(completed, "repeat: resubscribing");
        state.resubscribe();
      }
      Ok(false) => {
        state.upstream.weak_dispose();
        observer.on_complete();
      }
      Err(err) => {
        state.upstream.weak_dispose();
        observer.on_error(err);
      }
    }
  }

  fn on_error(self, err: Error) {
    if let Some(observer) = self.state.downstream.take() {
      self.state.upstream.weak_dispose();
      observer.on_error(err);
    }
  }
}
