use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::subscribers::{deliver, register, Registered, SingleRegistry};
use crate::{
  error::Error,
  observer::BoxedSingleObserver,
  single::{Single, SingleSource},
};

/// A single-result source completed from the outside.
///
/// Observers that subscribe before the subject terminates get the terminal
/// event when it happens; later ones get the stored event right away. Only
/// the first `on_success`/`on_error` counts.
pub struct SingleSubject<T> {
  inner: Arc<SubjectState<T>>,
}

struct SubjectState<T> {
  observers: Arc<SingleRegistry<T>>,
  result: OnceCell<Result<T, Error>>,
}

impl<T> Clone for SingleSubject<T> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleSubject<T> {
  fn default() -> Self { Self::new() }
}

impl<T: Clone + Send + Sync + 'static> SingleSubject<T> {
  pub fn new() -> Self {
    Self { inner: Arc::new(SubjectState { observers: Arc::default(), result: OnceCell::new() }) }
  }

  pub fn on_success(&self, value: T) { self.terminate(Ok(value)) }

  pub fn on_error(&self, err: Error) { self.terminate(Err(err)) }

  fn terminate(&self, result: Result<T, Error>) {
    if let Err(late) = self.inner.result.set(result) {
      if let Err(err) = late {
        tracing::warn!(error = %err, "single subject: error after terminal event dropped");
      }
      return;
    }
    let Some(result) = self.inner.result.get() else { return };
    for registration in self.inner.observers.terminate() {
      if let Some(observer) = registration.take_live() {
        deliver(observer, result);
      }
    }
  }

  /// Number of observers currently waiting for the terminal event.
  pub fn observer_count(&self) -> usize { self.inner.observers.len() }

  pub fn has_observers(&self) -> bool { self.observer_count() > 0 }

  pub fn is_terminated(&self) -> bool { self.inner.result.get().is_some() }

  pub fn value(&self) -> Option<T> { self.inner.result.get().and_then(|r| r.as_ref().ok().cloned()) }

  pub fn error(&self) -> Option<Error> { self.inner.result.get().and_then(|r| r.as_ref().err().cloned()) }

  pub fn as_single(&self) -> Single<T> { Single::new(self.clone()) }
}

impl<T: Clone + Send + Sync + 'static> SingleSource<T> for SingleSubject<T> {
  fn subscribe(&self, observer: BoxedSingleObserver<T>) {
    if let Registered::Late(observer) = register(&self.inner.observers, observer) {
      if let Some(result) = self.inner.result.get() {
        deliver(observer, result);
      }
    }
  }
}
