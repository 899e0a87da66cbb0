use std::sync::Arc;

use super::ObservableSource;
use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  error::Error,
  observer::{BoxedObserver, Observer},
};

pub(crate) struct Create<F>(pub(crate) F);

impl<T, F> ObservableSource<T> for Create<F>
where
  T: 'static,
  F: Fn(ObservableEmitter<T>) -> Result<(), Error> + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedObserver<T>) {
    let emitter = ObservableEmitter(Arc::new(EmitterState { observer: TakeCell::empty(), resource: DisposableSlot::new() }));
    observer.on_subscribe(Disposable::new(emitter.0.clone()));
    if emitter.is_disposed() {
      return;
    }
    emitter.park(observer);
    if let Err(err) = (self.0)(emitter.clone()) {
      emitter.on_error(err);
    }
  }
}

struct EmitterState<T> {
  observer: TakeCell<BoxedObserver<T>>,
  resource: DisposableSlot,
}

impl<T> Dispose for EmitterState<T> {
  fn dispose(&self) {
    self.resource.dispose();
    drop(self.observer.take());
  }

  fn is_disposed(&self) -> bool { self.resource.is_disposed() }
}

/// Signals the observer of an [`Observable::create`](super::Observable::create)
/// subscription.
///
/// Calls must not overlap: the usual stream contract of one signal at a time
/// applies. Signals after a terminal one, or after disposal, are dropped.
pub struct ObservableEmitter<T>(Arc<EmitterState<T>>);

impl<T> Clone for ObservableEmitter<T> {
  fn clone(&self) -> Self { ObservableEmitter(self.0.clone()) }
}

impl<T> ObservableEmitter<T> {
  fn park(&self, observer: BoxedObserver<T>) {
    self.0.observer.put(observer);
    // A dispose racing with the hand-back may have missed the observer.
    if self.is_disposed() {
      drop(self.0.observer.take());
    }
  }

  pub fn on_next(&self, value: T) {
    if let Some(mut observer) = self.0.observer.take() {
      observer.on_next(value);
      self.park(observer);
    }
  }

  pub fn on_error(&self, err: Error) {
    if let Some(observer) = self.0.observer.take() {
      observer.on_error(err);
      self.0.resource.dispose();
    }
  }

  pub fn on_complete(&self) {
    if let Some(observer) = self.0.observer.take() {
      observer.on_complete();
      self.0.resource.dispose();
    }
  }

  /// Attach a resource that is disposed with the subscription.
  pub fn set_disposable(&self, d: Disposable) { self.0.resource.replace(d); }

  pub fn is_disposed(&self) -> bool { self.0.resource.is_disposed() }
}
