use std::sync::Arc;

use crate::{
  disposable::Disposable,
  error::Error,
  observable::{Observable, ObservableSource},
  observer::{BoxedObserver, BoxedSingleObserver, Observer, SingleObserver},
  single::{Single, SingleSource},
};

pub struct MapSingle<T, F> {
  source: Single<T>,
  func: Arc<F>,
}

impl<T, F> MapSingle<T, F> {
  pub(crate) fn new(source: Single<T>, func: F) -> Self { Self { source, func: Arc::new(func) } }
}

impl<T, U, F> SingleSource<U> for MapSingle<T, F>
where
  T: Send + 'static,
  U: Send + 'static,
  F: Fn(T) -> Result<U, Error> + Send + Sync + 'static,
{
  fn subscribe(&self, observer: BoxedSingleObserver<U>) {
    self
      .source
      .subscribe_with(MapSingleObserver { observer, func: self.func.clone() })
  }
}

struct MapSingleObserver<U, F> {
  observer: BoxedSingleObserver<U>,
  func: Arc<F>,
}

impl<T, U, F> SingleObserver<T> for MapSingleObserver<U, F>
where
  F: Fn(T) -> Result<U, Error>,
{
  fn on_subscribe(&mut self, d: Disposable) { self.observer.on_subscribe(d) }

  fn on_success(self, value: T) {
    match (self.func)(value) {
      Ok(mapped) => self.observer.on_success(mapped),
      Err(err) => self.observer.on_error(err),
    }
  }

  fn on_error(self, err: Error) { self.observer.on_error(err) }
}

pub struct MapObservable<T, F> {
  source: Observable<T>,
  func: Arc<F>,
}

impl<T, F> MapObservable<T, F> {
  pub(crate) fn new(source: Observable<T>, func: F) -> Self { Self { source, func: Arc::new(func) } }
}

impl<T, U, F> ObservableSource<U> for MapObservable<T, F>
where
  T: Send + 'static,
  U: Send + 'static,
  F: Fn(T) -> U + Send + Sync + 'static,
{
  fn subscribe(&self, observer: BoxedObserver<U>) {
    self
      .source
      .subscribe_with(MapObserver { observer, func: self.func.clone() })
  }
}

struct MapObserver<U, F> {
  observer: BoxedObserver<U>,
  func: Arc<F>,
}

impl<T, U, F> Observer<T> for MapObserver<U, F>
where
  F: Fn(T) -> U,
{
  fn on_subscribe(&mut self, d: Disposable) { self.observer.on_subscribe(d) }

  fn on_next(&mut self, value: T) { self.observer.on_next((self.func)(value)) }

  fn on_error(self, err: Error) { self.observer.on_error(err) }

  fn on_complete(self) { self.observer.on_complete() }
}

#[cfg(test)]
mod tests {
  use crate::prelude::*;

  #[rxsingle_macro::test]
  fn map_single() {
    Single::just(2).map(|v| Ok(v * 3)).test().assert_success(6);
    Single::<i32>::error("e").map(|v| Ok(v + 1)).test().assert_error_msg("e");
  }

  #[rxsingle_macro::test]
  fn mapper_error_becomes_on_error() {
    Single::just(1)
      .map(|_| Err::<i32, _>(Error::msg("mapper failed")))
      .test()
      .assert_error_msg("mapper failed");
  }

  #[rxsingle_macro::test]
  fn map_observable() {
    Observable::from_iter(1..=3)
      .map(|v| v * 10)
      .test()
      .assert_values(&[10, 20, 30])
      .assert_complete();
  }
}
