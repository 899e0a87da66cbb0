//! Share one upstream subscription and replay its terminal event.
//!
//! The first subscriber consumes the source out of a [`TakeCell`] and
//! subscribes it; every subscriber, first or not, is registered in the same
//! copy-on-write registry `SingleSubject` uses. When the upstream terminates
//! the registry is frozen and every registered observer receives a clone of
//! the result. Subscribers arriving after that get the stored result right
//! away without touching the upstream again.
//!
//! Disposing a downstream subscription only removes that observer; the shared
//! upstream keeps running. Use [`Single::cache_with_cancel`] to get hold of
//! the upstream handle for a forced teardown.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot},
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
  single::{Single, SingleSource},
  subject::subscribers::{deliver, register, Registered, SingleRegistry},
};

/// Receives the shared upstream subscription once it is established.
pub type CancelHook = Box<dyn Fn(Disposable) + Send + Sync>;

pub struct Cache<T> {
  inner: Arc<CacheState<T>>,
}

struct CacheState<T> {
  source: TakeCell<Single<T>>,
  observers: Arc<SingleRegistry<T>>,
  result: OnceCell<Result<T, Error>>,
  upstream: DisposableSlot,
  cancel: Option<CancelHook>,
}

impl<T> Cache<T> {
  pub(crate) fn new(source: Single<T>, cancel: Option<CancelHook>) -> Self {
    Self {
      inner: Arc::new(CacheState {
        source: TakeCell::new(source),
        observers: Arc::default(),
        result: OnceCell::new(),
        upstream: DisposableSlot::new(),
        cancel,
      }),
    }
  }
}

impl<T: Clone + Send + Sync + 'static> SingleSource<T> for Cache<T> {
  fn subscribe(&self, observer: BoxedSingleObserver<T>) {
    match register(&self.inner.observers, observer) {
      Registered::Added => {
        if let Some(source) = self.inner.source.take() {
          tracing::trace!("cache: connecting upstream");
          source.subscribe_with(CacheObserver { state: self.inner.clone() });
        }
      }
      Registered::Late(observer) => {
        if let Some(result) = self.inner.result.get() {
          deliver(observer, result);
        }
      }
      Registered::Cancelled => {}
    }
  }
}

struct CacheObserver<T> {
  state: Arc<CacheState<T>>,
}

impl<T: Clone> CacheObserver<T> {
  fn finish(self, result: Result<T, Error>) {
    let state = self.state;
    state.upstream.weak_dispose();
    if state.result.set(result).is_err() {
      tracing::warn!("cache: upstream signalled twice");
      return;
    }
    let Some(result) = state.result.get() else { return };
    for registration in state.observers.terminate() {
      if let Some(observer) = registration.take_live() {
        deliver(observer, result);
      }
    }
  }
}

impl<T: Clone> SingleObserver<T> for CacheObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) {
    if self.state.upstream.set_once(d.clone()) {
      if let Some(cancel) = &self.state.cancel {
        cancel(d);
      }
    }
  }

  fn on_success(self, value: T) { self.finish(Ok(value)) }

  fn on_error(self, err: Error) { self.finish(Err(err)) }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::{
      atomic::{AtomicUsize, Ordering},
      Mutex,
    },
    thread,
  };

  use crate::prelude::*;

  use super::*;

  fn counted(value: i32) -> (Single<i32>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let source = Single::from_fn(move || {
      c.fetch_add(1, Ordering::SeqCst);
      Ok(value)
    });
    (source, calls)
  }

  #[rxsingle_macro::test]
  fn side_effect_runs_once() {
    let (source, calls) = counted(9);
    let cached = source.cache();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    for _ in 0..3 {
      cached.test().assert_success(9);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[rxsingle_macro::test]
  fn early_subscribers_wait_for_upstream() {
    let subject = SingleSubject::new();
    let cached = subject.as_single().cache();
    let a = cached.test();
    let b = cached.test();
    assert_eq!(subject.observer_count(), 1);
    a.assert_no_terminal();

    subject.on_success("done");
    a.assert_success("done");
    b.assert_success("done");
    cached.test().assert_success("done");
  }

  #[rxsingle_macro::test]
  fn errors_are_replayed() {
    let cached = Single::<i32>::error("broken").cache();
    cached.test().assert_error_msg("broken");
    cached.test().assert_error_msg("broken");
  }

  #[rxsingle_macro::test]
  fn disposed_observer_is_skipped() {
    let subject = SingleSubject::new();
    let cached = subject.as_single().cache();
    let gone = cached.test();
    let kept = cached.test();
    gone.dispose();

    subject.on_success(1);
    gone.assert_no_terminal();
    kept.assert_success(1);
  }

  #[rxsingle_macro::test]
  fn cancel_hook_gets_upstream() {
    let subject = SingleSubject::<i32>::new();
    let handle = Arc::new(Mutex::new(None));
    let h = handle.clone();
    let cached = subject
      .as_single()
      .cache_with_cancel(move |d| *h.lock().unwrap() = Some(d));
    let t = cached.test();
    assert_eq!(subject.observer_count(), 1);

    handle.lock().unwrap().take().unwrap().dispose();
    assert_eq!(subject.observer_count(), 0);
    t.assert_no_terminal();
  }

  #[rxsingle_macro::test(repeat = 50)]
  fn concurrent_subscribers_share_one_result() {
    let (source, calls) = counted(3);
    let subject = SingleSubject::new();
    let cached = subject.as_single().zip_with(source, |_: (), v| Ok(v)).cache();

    let handles: Vec<_> = (0..3)
      .map(|_| {
        let cached = cached.clone();
        thread::spawn(move || cached.test())
      })
      .collect();
    let trigger = thread::spawn(move || subject.on_success(()));

    trigger.join().unwrap();
    for h in handles {
      let t = h.join().unwrap();
      assert!(t.await_done(Duration::from_secs(5)));
      t.assert_success(3);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
