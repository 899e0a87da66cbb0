//! Wait for every source to succeed, then combine the values.
//!
//! A readiness counter starts at the number of branches and only counts
//! down; the branch whose decrement takes it to zero finalizes. In
//! [`ErrorMode::Immediate`] the first error forces the counter to zero in
//! one swap, which both claims the downstream and stops every later branch
//! from finalizing. In [`ErrorMode::Delayed`] errors are collected in an
//! [`ErrorSlot`] and reported after the last branch finished.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use super::ErrorMode;
use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  error::{Error, ErrorSlot},
  observer::{BoxedSingleObserver, SingleObserver},
  single::{Single, SingleSource},
};

pub(crate) fn zip<T, R, F>(sources: Vec<Single<T>>, mode: ErrorMode, combiner: F) -> Single<R>
where
  T: Send + 'static,
  R: Send + 'static,
  F: Fn(Vec<T>) -> Result<R, Error> + Send + Sync + 'static,
{
  match <[Single<T>; 1]>::try_from(sources) {
    Ok([only]) => only.map(move |value| combiner(vec![value])),
    Err(sources) if sources.is_empty() => Single::error(Error::NoSources),
    Err(sources) => Single::new(Zip { sources: sources.into(), mode, combiner: Arc::new(combiner) }),
  }
}

enum Pair<T, U> {
  Left(T),
  Right(U),
}

pub(crate) fn zip_pair<T, U, R, F>(left: Single<T>, right: Single<U>, combiner: F) -> Single<R>
where
  T: Send + 'static,
  U: Send + 'static,
  R: Send + 'static,
  F: Fn(T, U) -> Result<R, Error> + Send + Sync + 'static,
{
  let sources = vec![left.map(|v| Ok(Pair::Left(v))), right.map(|v| Ok(Pair::Right(v)))];
  zip(sources, ErrorMode::Immediate, move |values| {
    let mut values = values.into_iter();
    match (values.next(), values.next()) {
      (Some(Pair::Left(l)), Some(Pair::Right(r))) => combiner(l, r),
      _ => Err(Error::ProtocolViolation("zip delivered values out of order")),
    }
  })
}

pub struct Zip<T, F> {
  sources: Arc<[Single<T>]>,
  mode: ErrorMode,
  combiner: Arc<F>,
}

impl<T, R, F> SingleSource<R> for Zip<T, F>
where
  T: Send + 'static,
  R: Send + 'static,
  F: Fn(Vec<T>) -> Result<R, Error> + Send + Sync + 'static,
{
  fn subscribe(&self, mut observer: BoxedSingleObserver<R>) {
    let n = self.sources.len();
    let state = Arc::new(ZipState {
      values: (0..n).map(|_| TakeCell::empty()).collect(),
      branches: (0..n).map(|_| DisposableSlot::new()).collect(),
      ready: AtomicUsize::new(n),
      errors: ErrorSlot::new(),
      mode: self.mode,
      combiner: self.combiner.clone(),
      downstream: TakeCell::empty(),
    });
    observer.on_subscribe(Disposable::new(state.clone()));
    state.downstream.put(observer);
    if state.is_cancelled() {
      drop(state.downstream.take());
      return;
    }

    for (index, source) in self.sources.iter().enumerate() {
      if state.is_cancelled() {
        break;
      }
      source.subscribe_with(ZipObserver { index, state: state.clone() });
    }
  }
}

struct ZipState<T, R, F> {
  values: Box<[TakeCell<T>]>,
  branches: Box<[DisposableSlot]>,
  ready: AtomicUsize,
  errors: ErrorSlot,
  mode: ErrorMode,
  combiner: Arc<F>,
  downstream: TakeCell<BoxedSingleObserver<R>>,
}

impl<T, R, F> ZipState<T, R, F> {
  fn is_cancelled(&self) -> bool { self.ready.load(Ordering::Acquire) == 0 }

  /// Count one branch as finished. Returns `true` for the last one.
  fn count_down(&self) -> bool {
    self
      .ready
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
      == Ok(1)
  }

  /// Force the counter to zero. Returns `true` if it was still running.
  fn force_finish(&self) -> bool { self.ready.swap(0, Ordering::AcqRel) > 0 }

  fn clear(&self) {
    self.branches.iter().for_each(DisposableSlot::dispose);
    self.values.iter().for_each(|v| drop(v.take()));
  }
}

impl<T, R, F> ZipState<T, R, F>
where
  F: Fn(Vec<T>) -> Result<R, Error>,
{
  fn success(&self, index: usize, value: T) {
    self.branches[index].weak_dispose();
    self.values[index].put(value);
    if self.count_down() {
      self.finish();
    } else if self.is_cancelled() {
      // Lost to a fail-fast error or a dispose; drop what we stored.
      drop(self.values[index].take());
    }
  }

  fn error(&self, index: usize, err: Error) {
    match self.mode {
      ErrorMode::Immediate => {
        if self.force_finish() {
          self.clear();
          if let Some(observer) = self.downstream.take() {
            observer.on_error(err);
          }
        } else {
          tracing::debug!(branch = index, error = %err, "zip: error after the result was settled dropped");
        }
      }
      ErrorMode::Delayed => {
        self.branches[index].weak_dispose();
        self.errors.add(err);
        if self.count_down() {
          self.finish();
        }
      }
    }
  }

  fn finish(&self) {
    let Some(observer) = self.downstream.take() else {
      self.clear();
      return;
    };
    if let Some(err) = self.errors.terminate() {
      self.clear();
      return observer.on_error(err);
    }
    let values: Option<Vec<T>> = self.values.iter().map(TakeCell::take).collect();
    match values.map(|values| (self.combiner)(values)) {
      Some(Ok(result)) => observer.on_success(result),
      Some(Err(err)) => observer.on_error(err),
      None => observer.on_error(Error::ProtocolViolation("zip finished with a missing value")),
    }
  }
}

impl<T: Send, R, F: Send + Sync> Dispose for ZipState<T, R, F> {
  fn dispose(&self) {
    if self.force_finish() {
      self.clear();
      drop(self.downstream.take());
    }
  }

  fn is_disposed(&self) -> bool { self.is_cancelled() }
}

struct ZipObserver<T, R, F> {
  index: usize,
  state: Arc<ZipState<T, R, F>>,
}

impl<T, R, F> SingleObserver<T> for ZipObserver<T, R, F>
where
  F: Fn(Vec<T>) -> Result<R, Error>,
{
  fn on_subscribe(&mut self, d: Disposable) { self.state.branches[self.index].set_once(d); }

  fn on_success(self, value: T) { self.state.success(self.index, value) }

  fn on_error(self, err: Error) { self.state.error(self.index, err) }
}
