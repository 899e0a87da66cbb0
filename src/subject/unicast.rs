use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use once_cell::sync::OnceCell;

use crate::{
  cell::TakeCell,
  disposable::{Disposable, Dispose},
  drain::{DrainCell, Wip},
  error::Error,
  observable::{Observable, ObservableSource},
  observer::{BoxedObserver, Observer},
  queue::{self, Consumer, Producer},
};

/// A relay that buffers items until its one and only subscriber arrives.
///
/// Items are queued in the lock-free SPSC queue, so calls to `on_next` must
/// not overlap each other; the subscriber side is drained by whichever
/// thread gets there first. A second subscriber is refused with
/// [`Error::ProtocolViolation`].
pub struct UnicastSubject<T> {
  inner: Arc<Relay<T>>,
}

struct Relay<T> {
  producer: TakeCell<Producer<T>>,
  pending: TakeCell<BoxedObserver<T>>,
  subscribed: AtomicBool,
  disposed: AtomicBool,
  terminal: OnceCell<Option<Error>>,
  wip: Wip,
  drain: DrainCell<DrainState<T>>,
}

struct DrainState<T> {
  consumer: Consumer<T>,
  observer: Option<BoxedObserver<T>>,
}

impl<T> Clone for UnicastSubject<T> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T: Send + 'static> Default for UnicastSubject<T> {
  fn default() -> Self { Self::new() }
}

impl<T: Send + 'static> UnicastSubject<T> {
  pub fn new() -> Self {
    let (producer, consumer) = queue::channel();
    Self {
      inner: Arc::new(Relay {
        producer: TakeCell::new(producer),
        pending: TakeCell::empty(),
        subscribed: AtomicBool::new(false),
        disposed: AtomicBool::new(false),
        terminal: OnceCell::new(),
        wip: Wip::new(),
        drain: DrainCell::new(DrainState { consumer, observer: None }),
      }),
    }
  }

  pub fn on_next(&self, value: T) {
    let relay = &self.inner;
    if relay.terminal.get().is_some() || relay.disposed.load(Ordering::Acquire) {
      return;
    }
    match relay.producer.take() {
      Some(mut producer) => {
        producer.offer(value);
        relay.producer.put(producer);
      }
      None => tracing::warn!("unicast subject: overlapping on_next calls, item dropped"),
    }
    relay.drain();
  }

  pub fn on_error(&self, err: Error) {
    if self.inner.terminal.set(Some(err)).is_err() {
      tracing::warn!("unicast subject: error after terminal event dropped");
    }
    self.inner.drain();
  }

  pub fn on_complete(&self) {
    let _ = self.inner.terminal.set(None);
    self.inner.drain();
  }

  pub fn has_observer(&self) -> bool {
    self.inner.subscribed.load(Ordering::Acquire) && !self.inner.disposed.load(Ordering::Acquire)
  }

  pub fn as_observable(&self) -> Observable<T> { Observable::new(self.clone()) }
}

impl<T> Relay<T> {
  fn drain(&self) {
    if !self.wip.enter() {
      return;
    }
    let mut missed = 1;
    loop {
      // SAFETY: we own the drain until `leave` returns zero.
      let state = unsafe { self.drain.get() };
      if state.observer.is_none() {
        state.observer = self.pending.take();
      }
      if self.disposed.load(Ordering::Acquire) {
        state.consumer.clear();
        state.observer = None;
      } else {
        self.emit(state);
      }
      missed = self.wip.leave(missed);
      if missed == 0 {
        break;
      }
    }
  }

  fn emit(&self, state: &mut DrainState<T>) {
    loop {
      let Some(observer) = state.observer.as_mut() else { return };
      // Read the terminal flag before polling: every item offered before the
      // terminal event is visible once the flag is.
      let terminal = self.terminal.get();
      match state.consumer.poll() {
        Some(value) => observer.on_next(value),
        None => {
          let Some(terminal) = terminal else { return };
          let Some(observer) = state.observer.take() else { return };
          match terminal {
            Some(err) => observer.on_error(err.clone()),
            None => observer.on_complete(),
          }
          return;
        }
      }
      if self.disposed.load(Ordering::Acquire) {
        return;
      }
    }
  }
}

impl<T: Send> Dispose for Relay<T> {
  fn dispose(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.drain();
    }
  }

  fn is_disposed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

impl<T: Send + 'static> ObservableSource<T> for UnicastSubject<T> {
  fn subscribe(&self, mut observer: BoxedObserver<T>) {
    let relay = &self.inner;
    if relay.subscribed.swap(true, Ordering::AcqRel) {
      tracing::warn!("unicast subject: second subscriber refused");
      let d = Disposable::flag();
      observer.on_subscribe(d);
      observer.on_error(Error::ProtocolViolation("unicast subject allows only one subscriber"));
      return;
    }
    observer.on_subscribe(Disposable::new(relay.clone()));
    if relay.disposed.load(Ordering::Acquire) {
      return;
    }
    relay.pending.put(observer);
    relay.drain();
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use crate::prelude::*;

  #[rxsingle_macro::test]
  fn buffers_until_subscribed() {
    let subject = UnicastSubject::new();
    subject.on_next(1);
    subject.on_next(2);
    let t = subject.as_observable().test();
    t.assert_values(&[1, 2]);
    subject.on_next(3);
    subject.on_complete();
    t.assert_values(&[1, 2, 3]).assert_complete();
  }

  #[rxsingle_macro::test]
  fn subscriber_survives_an_empty_drain() {
    let subject = UnicastSubject::new();
    let t = subject.as_observable().test();
    subject.on_next(1);
    subject.on_next(2);
    t.assert_values(&[1, 2]).assert_not_complete();
    subject.on_complete();
    t.assert_complete();
  }

  #[rxsingle_macro::test]
  fn second_subscriber_is_refused() {
    let subject = UnicastSubject::<i32>::new();
    let _first = subject.as_observable().test();
    let second = subject.as_observable().test();
    assert!(matches!(second.assert_error(), Error::ProtocolViolation(_)));
  }

  #[rxsingle_macro::test]
  fn error_after_buffered_items() {
    let subject = UnicastSubject::new();
    subject.on_next("a");
    subject.on_error("stop".into());
    subject.on_next("b");
    let t = subject.as_observable().test();
    t.assert_values(&["a"]).assert_error_msg("stop");
  }

  #[rxsingle_macro::test]
  fn dispose_stops_delivery() {
    let subject = UnicastSubject::new();
    let t = subject.as_observable().test();
    subject.on_next(1);
    t.dispose();
    subject.on_next(2);
    subject.on_complete();
    t.assert_values(&[1]).assert_not_complete();
    assert!(!subject.has_observer());
  }

  #[rxsingle_macro::test(repeat = 10)]
  fn producer_and_consumer_on_different_threads() {
    let subject = UnicastSubject::new();
    let s = subject.clone();
    let producer = thread::spawn(move || {
      (0..10_000).for_each(|i| s.on_next(i));
      s.on_complete();
    });
    let t = subject.as_observable().test();
    producer.join().unwrap();
    assert!(t.await_done(std::time::Duration::from_secs(5)));
    assert_eq!(t.values(), (0..10_000).collect::<Vec<_>>());
    t.assert_complete();
  }
}
