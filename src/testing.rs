//! Recording observers for tests.
//!
//! [`TestSingleObserver`] and [`TestObserver`] are cheap `Clone` handles over
//! a shared record. Subscribe one clone and inspect the record through
//! another; [`Single::test`](crate::single::Single::test) and
//! [`Observable::test`](crate::observable::Observable::test) do exactly that.
//!
//! Every terminal signal is recorded, even a forbidden second one, so tests
//! can assert "exactly one terminal" instead of just "at least one".

use std::{
  fmt::Debug,
  sync::{Arc, Condvar, Mutex, MutexGuard},
  time::Duration,
};

use crate::{
  disposable::{Disposable, DisposableSlot},
  error::Error,
  observer::{Observer, SingleObserver},
};

/// Terminal signal recorded by [`TestSingleObserver`].
#[derive(Debug, Clone)]
pub enum Outcome<T> {
  Success(T),
  Error(Error),
}

struct Record<S> {
  state: Mutex<S>,
  done: Condvar,
  upstream: DisposableSlot,
}

impl<S: Default> Record<S> {
  fn new() -> Self { Self { state: Mutex::new(S::default()), done: Condvar::new(), upstream: DisposableSlot::new() } }
}

impl<S> Record<S> {
  fn lock(&self) -> MutexGuard<'_, S> { self.state.lock().unwrap_or_else(|e| e.into_inner()) }

  fn wait_until(&self, timeout: Duration, done: impl Fn(&S) -> bool) -> bool {
    let guard = self.lock();
    let (guard, _) = self
      .done
      .wait_timeout_while(guard, timeout, |s| !done(s))
      .unwrap_or_else(|e| e.into_inner());
    done(&guard)
  }
}

// ============================================================================
// TestSingleObserver
// ============================================================================

struct SingleState<T> {
  subscribed: usize,
  outcomes: Vec<Outcome<T>>,
}

impl<T> Default for SingleState<T> {
  fn default() -> Self { Self { subscribed: 0, outcomes: vec![] } }
}

/// Records the signals of a single-result source.
pub struct TestSingleObserver<T> {
  record: Arc<Record<SingleState<T>>>,
}

impl<T> Clone for TestSingleObserver<T> {
  fn clone(&self) -> Self { Self { record: self.record.clone() } }
}

impl<T> Default for TestSingleObserver<T> {
  fn default() -> Self { Self::new() }
}

impl<T> TestSingleObserver<T> {
  pub fn new() -> Self { Self { record: Arc::new(Record::new()) } }

  /// Number of `on_subscribe` calls seen.
  pub fn subscribe_count(&self) -> usize { self.record.lock().subscribed }

  /// Number of terminal signals seen.
  pub fn terminal_count(&self) -> usize { self.record.lock().outcomes.len() }

  pub fn is_done(&self) -> bool { self.terminal_count() > 0 }

  /// Block until a terminal signal arrives or `timeout` passes.
  pub fn await_done(&self, timeout: Duration) -> bool {
    self.record.wait_until(timeout, |s| !s.outcomes.is_empty())
  }

  /// Cancel the upstream this observer was subscribed to.
  pub fn dispose(&self) { self.record.upstream.dispose() }

  pub fn is_disposed(&self) -> bool { self.record.upstream.is_disposed() }

  pub fn error(&self) -> Option<Error> {
    self.record.lock().outcomes.iter().find_map(|o| match o {
      Outcome::Error(e) => Some(e.clone()),
      Outcome::Success(_) => None,
    })
  }

  /// Assert no terminal signal was delivered.
  pub fn assert_no_terminal(&self) -> &Self {
    assert_eq!(self.terminal_count(), 0, "expected no terminal signal");
    self
  }

  /// Assert exactly one error was delivered and return it.
  pub fn assert_error(&self) -> Error {
    let state = self.record.lock();
    assert_eq!(state.subscribed, 1, "expected exactly one on_subscribe");
    match state.outcomes.as_slice() {
      [Outcome::Error(e)] => e.clone(),
      [Outcome::Success(_)] => panic!("expected an error, got a success"),
      other => panic!("expected exactly one terminal signal, got {}", other.len()),
    }
  }

  /// Assert exactly one error was delivered and its message equals `msg`.
  pub fn assert_error_msg(&self, msg: &str) -> &Self {
    assert_eq!(self.assert_error().to_string(), msg);
    self
  }
}

impl<T: Clone> TestSingleObserver<T> {
  pub fn value(&self) -> Option<T> {
    self.record.lock().outcomes.iter().find_map(|o| match o {
      Outcome::Success(v) => Some(v.clone()),
      Outcome::Error(_) => None,
    })
  }

  pub fn outcomes(&self) -> Vec<Outcome<T>> { self.record.lock().outcomes.clone() }
}

impl<T: PartialEq + Debug> TestSingleObserver<T> {
  /// Assert exactly one success carrying `expected` was delivered.
  pub fn assert_success(&self, expected: T) -> &Self {
    let state = self.record.lock();
    assert_eq!(state.subscribed, 1, "expected exactly one on_subscribe");
    match state.outcomes.as_slice() {
      [Outcome::Success(v)] => assert_eq!(v, &expected),
      [Outcome::Error(e)] => panic!("expected a success, got error: {e}"),
      other => panic!("expected exactly one terminal signal, got {}", other.len()),
    }
    self
  }
}

impl<T> TestSingleObserver<T> {
  fn finish(self, outcome: Outcome<T>) {
    let mut state = self.record.lock();
    state.outcomes.push(outcome);
    drop(state);
    self.record.done.notify_all();
  }
}

impl<T> SingleObserver<T> for TestSingleObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) {
    self.record.lock().subscribed += 1;
    self.record.upstream.set_once(d);
  }

  fn on_success(self, value: T) { self.finish(Outcome::Success(value)) }

  fn on_error(self, err: Error) { self.finish(Outcome::Error(err)) }
}

// ============================================================================
// TestObserver
// ============================================================================

struct StreamState<T> {
  subscribed: usize,
  values: Vec<T>,
  completions: usize,
  errors: Vec<Error>,
}

impl<T> Default for StreamState<T> {
  fn default() -> Self { Self { subscribed: 0, values: vec![], completions: 0, errors: vec![] } }
}

impl<T> StreamState<T> {
  fn terminals(&self) -> usize { self.completions + self.errors.len() }
}

/// Records the signals of a multi-item stream.
pub struct TestObserver<T> {
  record: Arc<Record<StreamState<T>>>,
}

impl<T> Clone for TestObserver<T> {
  fn clone(&self) -> Self { Self { record: self.record.clone() } }
}

impl<T> Default for TestObserver<T> {
  fn default() -> Self { Self::new() }
}

impl<T> TestObserver<T> {
  pub fn new() -> Self { Self { record: Arc::new(Record::new()) } }

  pub fn subscribe_count(&self) -> usize { self.record.lock().subscribed }

  pub fn value_count(&self) -> usize { self.record.lock().values.len() }

  pub fn terminal_count(&self) -> usize { self.record.lock().terminals() }

  pub fn is_done(&self) -> bool { self.terminal_count() > 0 }

  pub fn await_done(&self, timeout: Duration) -> bool { self.record.wait_until(timeout, |s| s.terminals() > 0) }

  pub fn dispose(&self) { self.record.upstream.dispose() }

  pub fn is_disposed(&self) -> bool { self.record.upstream.is_disposed() }

  pub fn error(&self) -> Option<Error> { self.record.lock().errors.first().cloned() }

  pub fn assert_complete(&self) -> &Self {
    let state = self.record.lock();
    assert_eq!(state.completions, 1, "expected exactly one completion");
    assert!(state.errors.is_empty(), "expected no error, got: {}", state.errors[0]);
    self
  }

  pub fn assert_not_complete(&self) -> &Self {
    assert_eq!(self.terminal_count(), 0, "expected no terminal signal");
    self
  }

  /// Assert exactly one error and no completion, returning the error.
  pub fn assert_error(&self) -> Error {
    let state = self.record.lock();
    assert_eq!(state.completions, 0, "expected an error, got a completion");
    match state.errors.as_slice() {
      [e] => e.clone(),
      other => panic!("expected exactly one error, got {}", other.len()),
    }
  }

  pub fn assert_error_msg(&self, msg: &str) -> &Self {
    assert_eq!(self.assert_error().to_string(), msg);
    self
  }
}

impl<T: Clone> TestObserver<T> {
  pub fn values(&self) -> Vec<T> { self.record.lock().values.clone() }
}

impl<T: PartialEq + Debug> TestObserver<T> {
  pub fn assert_values(&self, expected: &[T]) -> &Self {
    assert_eq!(self.record.lock().values.as_slice(), expected);
    self
  }
}

impl<T> Observer<T> for TestObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) {
    self.record.lock().subscribed += 1;
    self.record.upstream.set_once(d);
  }

  fn on_next(&mut self, value: T) { self.record.lock().values.push(value); }

  fn on_error(self, err: Error) {
    self.record.lock().errors.push(err);
    self.record.done.notify_all();
  }

  fn on_complete(self) {
    self.record.lock().completions += 1;
    self.record.done.notify_all();
  }
}
