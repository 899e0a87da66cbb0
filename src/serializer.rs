//! Lock-free serialization of one item source racing with terminal signals.
//!
//! `repeat_when` has two independent producers feeding the same downstream:
//! the repeated source delivers items, and the trigger stream may complete or
//! fail at any time on another thread. [`HalfSerializer`] lets exactly one of
//! them talk to the downstream at a time. An item that loses the race to a
//! terminal signal is dropped; a terminal signal that loses the race to an
//! item is delivered by the item's thread once it is done.
//!
//! Only one thread may call `on_next` at a time. `on_error` and
//! `on_complete` may be called from anywhere.

use crate::{
  drain::{DrainCell, Wip},
  error::{Error, ErrorSlot},
  observer::{BoxedObserver, Observer},
};

pub struct HalfSerializer<T> {
  wip: Wip,
  errors: ErrorSlot,
  downstream: DrainCell<Option<BoxedObserver<T>>>,
}

impl<T> HalfSerializer<T> {
  pub fn new(downstream: BoxedObserver<T>) -> Self {
    Self { wip: Wip::new(), errors: ErrorSlot::new(), downstream: DrainCell::new(Some(downstream)) }
  }

  pub fn on_next(&self, value: T) {
    if !self.wip.claim() {
      return;
    }
    // SAFETY: `claim` made us the only thread touching the downstream.
    if let Some(observer) = unsafe { self.downstream.get() }.as_mut() {
      observer.on_next(value);
    }
    if self.wip.leave(1) != 0 {
      self.finish();
    }
  }

  pub fn on_error(&self, err: Error) {
    if !self.errors.add(err) {
      tracing::warn!("half serializer: error after terminal signal dropped");
      return;
    }
    if self.wip.enter() {
      self.finish();
    }
  }

  pub fn on_complete(&self) {
    if self.wip.enter() {
      self.finish();
    }
  }

  /// `true` once a terminal signal has been delivered downstream.
  pub fn is_done(&self) -> bool { self.errors.is_terminated() }

  /// Deliver the terminal signal. The counter never returns to zero after
  /// this, so the caller stays the owner for good.
  fn finish(&self) {
    let err = self.errors.terminate();
    // SAFETY: the caller owns the drain and never gives it back.
    let Some(observer) = unsafe { self.downstream.get() }.take() else { return };
    match err {
      Some(err) => observer.on_error(err),
      None => observer.on_complete(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread};

  use super::*;
  use crate::{disposable::Disposable, testing::TestObserver};

  fn serializer() -> (Arc<HalfSerializer<i32>>, TestObserver<i32>) {
    let t = TestObserver::new();
    let mut downstream: BoxedObserver<i32> = Box::new(t.clone());
    downstream.on_subscribe(Disposable::empty());
    (Arc::new(HalfSerializer::new(downstream)), t)
  }

  #[rxsingle_macro::test]
  fn items_then_complete() {
    let (s, t) = serializer();
    s.on_next(1);
    s.on_next(2);
    s.on_complete();
    s.on_next(3);
    s.on_error("late".into());
    t.assert_values(&[1, 2]).assert_complete();
    assert!(s.is_done());
  }

  #[rxsingle_macro::test]
  fn error_wins_over_later_items() {
    let (s, t) = serializer();
    s.on_error("boom".into());
    s.on_next(1);
    t.assert_values(&[]).assert_error_msg("boom");
  }

  #[rxsingle_macro::test(repeat = 50)]
  fn racing_terminal_is_delivered_once() {
    let (s, t) = serializer();
    let items = s.clone();
    let producer = thread::spawn(move || (0..1000).for_each(|i| items.on_next(i)));
    let s2 = s.clone();
    let terminator = thread::spawn(move || s2.on_complete());
    producer.join().unwrap();
    terminator.join().unwrap();

    t.assert_complete();
    let values = t.values();
    assert!(values.windows(2).all(|w| w[0] + 1 == w[1]));
  }
}
