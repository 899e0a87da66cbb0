//! Multi-item streams.
//!
//! The crate is about single-result sources, but a few coordinators produce
//! many values (`repeat`, `concat_eager`) and the `..._when` operators hand
//! the user a stream of terminations to turn into a trigger stream. This
//! module carries just enough of a stream type for those jobs: a few
//! factories plus `map`, `filter` and `take`. There is no backpressure; items
//! are pushed as they come.

use std::sync::Arc;

use crate::{
  disposable::{Disposable, DisposableSlot},
  error::Error,
  observer::{BoxedObserver, FnObserver, Observer},
  ops,
  testing::TestObserver,
};

mod create;
mod from_iter;
mod trivial;

pub use create::ObservableEmitter;

/// A producer of zero or more items followed by at most one terminal signal.
pub trait ObservableSource<T>: Send + Sync {
  fn subscribe(&self, observer: BoxedObserver<T>);
}

/// Cloneable handle to an [`ObservableSource`].
pub struct Observable<T> {
  source: Arc<dyn ObservableSource<T>>,
}

impl<T> Clone for Observable<T> {
  fn clone(&self) -> Self { Self { source: self.source.clone() } }
}

impl<T> ObservableSource<T> for Observable<T> {
  fn subscribe(&self, observer: BoxedObserver<T>) { self.source.subscribe(observer) }
}

impl<T: Send + 'static> Observable<T> {
  pub fn new(source: impl ObservableSource<T> + 'static) -> Self { Self { source: Arc::new(source) } }

  pub fn subscribe_boxed(&self, observer: BoxedObserver<T>) { self.source.subscribe(observer) }

  pub fn subscribe_with<O>(&self, observer: O)
  where
    O: Observer<T> + Send + 'static,
  {
    self.source.subscribe(Box::new(observer))
  }

  /// Subscribe with three callbacks. The returned handle cancels the upstream.
  pub fn subscribe<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Disposable
  where
    N: FnMut(T) + Send + 'static,
    E: FnOnce(Error) + Send + 'static,
    C: FnOnce() + Send + 'static,
  {
    let upstream = Arc::new(DisposableSlot::new());
    self.subscribe_with(FnObserver { on_next, on_error, on_complete, upstream: upstream.clone() });
    Disposable::new(upstream)
  }

  pub fn test(&self) -> TestObserver<T> {
    let observer = TestObserver::new();
    self.subscribe_with(observer.clone());
    observer
  }

  // ==================== Factories ====================

  /// Emit every item of `iter`, then complete.
  pub fn from_iter<I>(iter: I) -> Self
  where
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
  {
    Self::new(from_iter::FromIter(iter))
  }

  pub fn just(value: T) -> Self
  where
    T: Clone + Sync,
  {
    Self::from_iter([value])
  }

  pub fn empty() -> Self { Self::new(trivial::Empty) }

  pub fn error(err: impl Into<Error>) -> Self { Self::new(trivial::Fail(err.into())) }

  pub fn never() -> Self { Self::new(trivial::Never) }

  /// Build a stream from a callback driving an [`ObservableEmitter`].
  pub fn create<F>(f: F) -> Self
  where
    F: Fn(ObservableEmitter<T>) -> Result<(), Error> + Send + Sync + 'static,
  {
    Self::new(create::Create(f))
  }

  // ==================== Operators ====================

  pub fn map<U, F>(&self, f: F) -> Observable<U>
  where
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
  {
    Observable::new(ops::map::MapObservable::new(self.clone(), f))
  }

  pub fn filter<F>(&self, predicate: F) -> Self
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    Self::new(ops::filter::Filter::new(self.clone(), predicate))
  }

  /// Emit at most `count` items, then complete and cancel the upstream.
  pub fn take(&self, count: usize) -> Self {
    if count == 0 {
      return Self::empty();
    }
    Self::new(ops::take::Take::new(self.clone(), count))
  }
}
