//! Race a source against a timer, optionally switching to a fallback.
//!
//! A one-shot flag decides the winner. If the source signals first the timer
//! task is cancelled. If the timer fires first the source is disposed and the
//! downstream gets [`Error::Timeout`], or the fallback is subscribed through
//! its own single-assignment slot.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
  scheduler::{Duration, SharedScheduler},
  single::{Single, SingleSource},
};

pub struct Timeout<T> {
  source: Single<T>,
  delay: Duration,
  scheduler: SharedScheduler,
  fallback: Option<Single<T>>,
}

impl<T> Timeout<T> {
  pub(crate) fn new(
    source: Single<T>, delay: Duration, scheduler: SharedScheduler, fallback: Option<Single<T>>,
  ) -> Self {
    Self { source, delay, scheduler, fallback }
  }
}

impl<T: Send + 'static> SingleSource<T> for Timeout<T> {
  fn subscribe(&self, mut observer: BoxedSingleObserver<T>) {
    let state = Arc::new(TimeoutState {
      decided: AtomicBool::new(false),
      upstream: DisposableSlot::new(),
      timer: DisposableSlot::new(),
      fallback: DisposableSlot::new(),
      downstream: TakeCell::empty(),
    });
    observer.on_subscribe(Disposable::new(state.clone()));
    state.downstream.put(observer);
    if state.is_disposed() {
      drop(state.downstream.take());
      return;
    }

    let on_timer = state.clone();
    let fallback = self.fallback.clone();
    let delay = self.delay;
    let task = self
      .scheduler
      .schedule(delay, Box::new(move || on_timer.time_out(delay, fallback)));
    state.timer.set_once(task);

    self.source.subscribe_with(SourceObserver { state });
  }
}

struct TimeoutState<T> {
  decided: AtomicBool,
  upstream: DisposableSlot,
  timer: DisposableSlot,
  fallback: DisposableSlot,
  downstream: TakeCell<BoxedSingleObserver<T>>,
}

impl<T: Send + 'static> TimeoutState<T> {
  fn decide(&self) -> bool { !self.decided.swap(true, Ordering::AcqRel) }

  fn time_out(self: Arc<Self>, delay: Duration, fallback: Option<Single<T>>) {
    if !self.decide() {
      return;
    }
    self.timer.weak_dispose();
    self.upstream.dispose();
    match fallback {
      Some(fallback) => {
        tracing::debug!(?delay, "timeout: timer won, switching to fallback");
        fallback.subscribe_with(FallbackObserver { state: self });
      }
      None => {
        tracing::debug!(?delay, "timeout: timer won");
        if let Some(observer) = self.downstream.take() {
          observer.on_error(Error::Timeout(delay));
        }
      }
    }
  }
}

impl<T: Send> Dispose for TimeoutState<T> {
  fn dispose(&self) {
    self.decided.store(true, Ordering::Release);
    self.timer.dispose();
    self.upstream.dispose();
    self.fallback.dispose();
    drop(self.downstream.take());
  }

  fn is_disposed(&self) -> bool { self.fallback.is_disposed() }
}

struct SourceObserver<T> {
  state: Arc<TimeoutState<T>>,
}

impl<T: Send + 'static> SourceObserver<T> {
  fn finish(self, deliver: impl FnOnce(BoxedSingleObserver<T>)) {
    let state = self.state;
    if !state.decide() {
      return;
    }
    tracing::trace!("timeout: source won");
    state.timer.dispose();
    state.upstream.weak_dispose();
    if let Some(observer) = state.downstream.take() {
      deliver(observer);
    }
  }
}

impl<T: Send + 'static> SingleObserver<T> for SourceObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.state.upstream.set_once(d); }

  fn on_success(self, value: T) { self.finish(|o| o.on_success(value)) }

  fn on_error(self, err: Error) { self.finish(|o| o.on_error(err)) }
}

struct FallbackObserver<T> {
  state: Arc<TimeoutState<T>>,
}

impl<T> SingleObserver<T> for FallbackObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.state.fallback.set_once(d); }

  fn on_success(self, value: T) {
    self.state.fallback.weak_dispose();
    if let Some(observer) = self.state.downstream.take() {
      observer.on_success(value);
    }
  }

  fn on_error(self, err: Error) {
    self.state.fallback.weak_dispose();
    if let Some(observer) = self.state.downstream.take() {
      observer.on_error(err);
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::prelude::*;

  #[rxsingle_macro::test]
  fn source_wins_and_cancels_timer() {
    let scheduler = TestScheduler::new();
    let subject = SingleSubject::new();
    let t = subject.as_single().timeout(Duration::from_millis(100), scheduler.clone()).test();
    assert_eq!(scheduler.pending_count(), 1);

    scheduler.advance_by(Duration::from_millis(50));
    subject.on_success(1);
    t.assert_success(1);
    assert!(scheduler.is_empty());
  }

  #[rxsingle_macro::test]
  fn timer_wins_with_timeout_error() {
    let scheduler = TestScheduler::new();
    let subject = SingleSubject::<i32>::new();
    let t = subject.as_single().timeout(Duration::from_millis(100), scheduler.clone()).test();

    scheduler.advance_by(Duration::from_millis(100));
    assert!(matches!(t.assert_error(), Error::Timeout(d) if d == Duration::from_millis(100)));
    assert_eq!(subject.observer_count(), 0);

    subject.on_success(1);
    assert_eq!(t.terminal_count(), 1);
  }

  #[rxsingle_macro::test]
  fn timer_wins_with_fallback() {
    let scheduler = TestScheduler::new();
    let subject = SingleSubject::<i32>::new();
    let fallback = SingleSubject::new();
    let t = subject
      .as_single()
      .timeout_with(Duration::from_millis(10), scheduler.clone(), fallback.as_single())
      .test();
    assert!(!fallback.has_observers());

    scheduler.advance_by(Duration::from_millis(10));
    assert_eq!(subject.observer_count(), 0);
    assert_eq!(fallback.observer_count(), 1);
    t.assert_no_terminal();

    subject.on_success(1);
    fallback.on_success(2);
    t.assert_success(2);
  }

  #[rxsingle_macro::test]
  fn source_error_wins_too() {
    let scheduler = TestScheduler::new();
    Single::<i32>::error("early")
      .timeout(Duration::from_millis(10), scheduler.clone())
      .test()
      .assert_error_msg("early");
    assert!(scheduler.is_empty());
  }

  #[rxsingle_macro::test]
  fn dispose_cancels_everything() {
    let scheduler = TestScheduler::new();
    let subject = SingleSubject::<i32>::new();
    let t = subject.as_single().timeout(Duration::from_millis(10), scheduler.clone()).test();
    t.dispose();
    assert!(scheduler.is_empty());
    assert_eq!(subject.observer_count(), 0);
    scheduler.flush();
    t.assert_no_terminal();
  }

  #[rxsingle_macro::test]
  fn works_on_real_threads() {
    let t = Single::<i32>::never()
      .timeout_with(Duration::from_millis(10), NewThreadScheduler, Single::just(7))
      .test();
    assert!(t.await_done(Duration::from_secs(5)));
    t.assert_success(7);
  }
}
