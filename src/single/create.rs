use std::sync::Arc;

use super::SingleSource;
use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
};

pub(crate) struct Create<F>(pub(crate) F);

impl<T, F> SingleSource<T> for Create<F>
where
  T: 'static,
  F: Fn(SingleEmitter<T>) -> Result<(), Error> + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedSingleObserver<T>) {
    let emitter = SingleEmitter(Arc::new(EmitterState { observer: TakeCell::empty(), resource: DisposableSlot::new() }));
    observer.on_subscribe(Disposable::new(emitter.0.clone()));
    if emitter.is_disposed() {
      return;
    }
    emitter.0.observer.put(observer);
    // A dispose racing with the hand-over above may have missed the observer.
    if emitter.is_disposed() {
      drop(emitter.0.observer.take());
      return;
    }
    if let Err(err) = (self.0)(emitter.clone()) {
      emitter.on_error(err);
    }
  }
}

struct EmitterState<T> {
  observer: TakeCell<BoxedSingleObserver<T>>,
  resource: DisposableSlot,
}

impl<T> Dispose for EmitterState<T> {
  fn dispose(&self) {
    self.resource.dispose();
    drop(self.observer.take());
  }

  fn is_disposed(&self) -> bool { self.resource.is_disposed() }
}

/// Signals the observer of a [`Single::create`](super::Single::create)
/// subscription.
///
/// The first terminal call wins; later ones are dropped. Once a terminal
/// signal went out, or the subscriber disposed, the resource registered with
/// [`SingleEmitter::set_disposable`] is disposed.
pub struct SingleEmitter<T>(Arc<EmitterState<T>>);

impl<T> Clone for SingleEmitter<T> {
  fn clone(&self) -> Self { SingleEmitter(self.0.clone()) }
}

impl<T> SingleEmitter<T> {
  pub fn on_success(&self, value: T) {
    if let Some(observer) = self.0.observer.take() {
      observer.on_success(value);
      self.0.resource.dispose();
    }
  }

  pub fn on_error(&self, err: Error) {
    match self.0.observer.take() {
      Some(observer) => {
        observer.on_error(err);
        self.0.resource.dispose();
      }
      None if !self.is_disposed() => tracing::warn!(error = %err, "single emitter: error after terminal signal dropped"),
      None => {}
    }
  }

  /// Attach a resource that is disposed with the subscription, replacing
  /// (and disposing) any previous one.
  pub fn set_disposable(&self, d: Disposable) { self.0.resource.replace(d); }

  pub fn is_disposed(&self) -> bool { self.0.resource.is_disposed() }
}
