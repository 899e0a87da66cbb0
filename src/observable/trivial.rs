use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use super::ObservableSource;
use crate::{
  cell::TakeCell,
  disposable::{Disposable, Dispose},
  error::Error,
  observer::{BoxedObserver, Observer},
};

pub(crate) struct Empty;

impl<T> ObservableSource<T> for Empty {
  fn subscribe(&self, mut observer: BoxedObserver<T>) {
    let d = Disposable::flag();
    observer.on_subscribe(d.clone());
    if !d.is_disposed() {
      observer.on_complete();
    }
  }
}

pub(crate) struct Fail(pub(crate) Error);

impl<T> ObservableSource<T> for Fail {
  fn subscribe(&self, mut observer: BoxedObserver<T>) {
    let d = Disposable::flag();
    observer.on_subscribe(d.clone());
    if !d.is_disposed() {
      observer.on_error(self.0.clone());
    }
  }
}

pub(crate) struct Never;

struct Parked<T> {
  observer: TakeCell<BoxedObserver<T>>,
  disposed: AtomicBool,
}

impl<T> Dispose for Parked<T> {
  fn dispose(&self) {
    self.disposed.store(true, Ordering::Release);
    drop(self.observer.take());
  }

  fn is_disposed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

impl<T: 'static> ObservableSource<T> for Never {
  fn subscribe(&self, mut observer: BoxedObserver<T>) {
    let parked = Arc::new(Parked { observer: TakeCell::empty(), disposed: AtomicBool::new(false) });
    observer.on_subscribe(Disposable::new(parked.clone()));
    parked.observer.put(observer);
    if parked.is_disposed() {
      drop(parked.observer.take());
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::prelude::*;

  #[rxsingle_macro::test]
  fn empty_error_never() {
    Observable::<i32>::empty().test().assert_values(&[]).assert_complete();
    Observable::<i32>::error("e").test().assert_error_msg("e");
    let t = Observable::<i32>::never().test();
    t.assert_not_complete();
    t.dispose();
  }
}
