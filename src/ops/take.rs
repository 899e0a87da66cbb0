use crate::{
  disposable::Disposable,
  error::Error,
  observable::{Observable, ObservableSource},
  observer::{BoxedObserver, Observer},
};

pub struct Take<T> {
  source: Observable<T>,
  count: usize,
}

impl<T> Take<T> {
  pub(crate) fn new(source: Observable<T>, count: usize) -> Self { Self { source, count } }
}

impl<T: Send + 'static> ObservableSource<T> for Take<T> {
  fn subscribe(&self, observer: BoxedObserver<T>) {
    self.source.subscribe_with(TakeObserver {
      observer: Some(observer),
      remaining: self.count,
      upstream: None,
    })
  }
}

struct TakeObserver<T> {
  observer: Option<BoxedObserver<T>>,
  remaining: usize,
  upstream: Option<Disposable>,
}

impl<T> Observer<T> for TakeObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) {
    self.upstream = Some(d.clone());
    if let Some(observer) = self.observer.as_mut() {
      observer.on_subscribe(d);
    }
  }

  fn on_next(&mut self, value: T) {
    let Some(observer) = self.observer.as_mut() else { return };
    self.remaining -= 1;
    observer.on_next(value);
    if self.remaining == 0 {
      if let Some(upstream) = self.upstream.take() {
        upstream.dispose();
      }
      if let Some(observer) = self.observer.take() {
        observer.on_complete();
      }
    }
  }

  fn on_error(mut self, err: Error) {
    if let Some(observer) = self.observer.take() {
      observer.on_error(err);
    }
  }

  fn on_complete(mut self) {
    if let Some(observer) = self.observer.take() {
      observer.on_complete();
    }
  }
}
