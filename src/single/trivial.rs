use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use super::SingleSource;
use crate::{
  cell::TakeCell,
  disposable::{Disposable, Dispose},
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
};

pub(crate) struct Just<T>(pub(crate) T);

impl<T: Clone + Send + Sync> SingleSource<T> for Just<T> {
  fn subscribe(&self, mut observer: BoxedSingleObserver<T>) {
    let d = Disposable::flag();
    observer.on_subscribe(d.clone());
    if !d.is_disposed() {
      observer.on_success(self.0.clone());
    }
  }
}

pub(crate) struct Fail(pub(crate) Error);

impl<T> SingleSource<T> for Fail {
  fn subscribe(&self, observer: BoxedSingleObserver<T>) { signal_error(observer, self.0.clone()) }
}

pub(crate) struct Never;

/// Keeps a `never` observer alive until its subscription is disposed.
struct Parked<T> {
  observer: TakeCell<BoxedSingleObserver<T>>,
  disposed: AtomicBool,
}

impl<T> Dispose for Parked<T> {
  fn dispose(&self) {
    self.disposed.store(true, Ordering::Release);
    drop(self.observer.take());
  }

  fn is_disposed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

impl<T: 'static> SingleSource<T> for Never {
  fn subscribe(&self, mut observer: BoxedSingleObserver<T>) {
    let parked = Arc::new(Parked { observer: TakeCell::empty(), disposed: AtomicBool::new(false) });
    observer.on_subscribe(Disposable::new(parked.clone()));
    parked.observer.put(observer);
    if parked.is_disposed() {
      drop(parked.observer.take());
    }
  }
}

/// Deliver `on_subscribe` with an inert handle followed by `err`.
pub(crate) fn signal_error<T>(mut observer: BoxedSingleObserver<T>, err: Error) {
  let d = Disposable::flag();
  observer.on_subscribe(d.clone());
  if !d.is_disposed() {
    observer.on_error(err);
  }
}

#[cfg(test)]
mod tests {
  use crate::prelude::*;

  #[rxsingle_macro::test]
  fn just_and_error() {
    Single::just(1).test().assert_success(1);
    Single::<i32>::error("bad").test().assert_error_msg("bad");
  }

  #[rxsingle_macro::test]
  fn never_holds_observer_until_disposed() {
    let t = Single::<i32>::never().test();
    t.assert_no_terminal();
    assert_eq!(t.subscribe_count(), 1);
    t.dispose();
    t.assert_no_terminal();
  }
}
