use std::sync::Arc;

use crate::{
  disposable::Disposable,
  error::Error,
  observable::{Observable, ObservableSource},
  observer::{BoxedObserver, Observer},
};

pub struct Filter<T, F> {
  source: Observable<T>,
  predicate: Arc<F>,
}

impl<T, F> Filter<T, F> {
  pub(crate) fn new(source: Observable<T>, predicate: F) -> Self { Self { source, predicate: Arc::new(predicate) } }
}

impl<T, F> ObservableSource<T> for Filter<T, F>
where
  T: Send + 'static,
  F: Fn(&T) -> bool + Send + Sync + 'static,
{
  fn subscribe(&self, observer: BoxedObserver<T>) {
    self
      .source
      .subscribe_with(FilterObserver { observer, predicate: self.predicate.clone() })
  }
}

struct FilterObserver<T, F> {
  observer: BoxedObserver<T>,
  predicate: Arc<F>,
}

impl<T, F> Observer<T> for FilterObserver<T, F>
where
  F: Fn(&T) -> bool,
{
  fn on_subscribe(&mut self, d: Disposable) { self.observer.on_subscribe(d) }

  fn on_next(&mut self, value: T) {
    if (self.predicate)(&value) {
      self.observer.on_next(value)
    }
  }

  fn on_error(self, err: Error) { self.observer.on_error(err) }

  fn on_complete(self) { self.observer.on_complete() }
}

#[cfg(test)]
mod tests {
  use crate::prelude::*;

  #[rxsingle_macro::test]
  fn keeps_matching_items() {
    Observable::from_iter(0..10)
      .filter(|v| v % 3 == 0)
      .test()
      .assert_values(&[0, 3, 6, 9])
      .assert_complete();
  }
}
