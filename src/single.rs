//! The single-result source and its handle.
//!
//! A [`SingleSource`] delivers `on_subscribe` once and then exactly one of
//! `on_success` / `on_error` to each observer it is given. [`Single`] wraps a
//! source in an `Arc`, so it is cheap to clone and can be subscribed any
//! number of times; that is what lets `retry`, `repeat`, `cache` and the
//! coordinators resubscribe the very same source.
//!
//! ```rust
//! use rxsingle::prelude::*;
//!
//! let doubled = Single::just(21).map(|v| Ok(v * 2));
//! doubled.test().assert_success(42);
//! ```

use std::{future::Future, sync::Arc};

use crate::{
  disposable::{Disposable, DisposableSlot},
  error::Error,
  observable::Observable,
  observer::{BoxedSingleObserver, FnSingleObserver, SingleObserver},
  ops::{
    self,
    cache::Cache,
    redo_when::{RepeatWhen, RetryWhen},
    repeat::{Repeat, RepeatPolicy},
    retry::{Retry, RetryPolicy},
    timeout::Timeout,
    using::{CleanupMode, Using},
    ErrorMode,
  },
  scheduler::{self, Duration, Scheduler},
  testing::TestSingleObserver,
};

mod create;
mod defer;
mod from_fn;
mod timer;
mod trivial;

pub use create::SingleEmitter;
pub(crate) use trivial::signal_error;

/// A producer of exactly one value or one error per subscription.
pub trait SingleSource<T>: Send + Sync {
  fn subscribe(&self, observer: BoxedSingleObserver<T>);
}

/// Cloneable handle to a [`SingleSource`].
pub struct Single<T> {
  source: Arc<dyn SingleSource<T>>,
}

impl<T> Clone for Single<T> {
  fn clone(&self) -> Self { Self { source: self.source.clone() } }
}

impl<T> SingleSource<T> for Single<T> {
  fn subscribe(&self, observer: BoxedSingleObserver<T>) { self.source.subscribe(observer) }
}

impl<T: Send + 'static> Single<T> {
  pub fn new(source: impl SingleSource<T> + 'static) -> Self { Self { source: Arc::new(source) } }

  // ==================== Subscribing ====================

  pub fn subscribe_boxed(&self, observer: BoxedSingleObserver<T>) { self.source.subscribe(observer) }

  pub fn subscribe_with<O>(&self, observer: O)
  where
    O: SingleObserver<T> + Send + 'static,
  {
    self.source.subscribe(Box::new(observer))
  }

  /// Subscribe with two callbacks. The returned handle cancels the upstream.
  pub fn subscribe<S, E>(&self, on_success: S, on_error: E) -> Disposable
  where
    S: FnOnce(T) + Send + 'static,
    E: FnOnce(Error) + Send + 'static,
  {
    let upstream = Arc::new(DisposableSlot::new());
    self.subscribe_with(FnSingleObserver { on_success, on_error, upstream: upstream.clone() });
    Disposable::new(upstream)
  }

  /// Subscribe a fresh [`TestSingleObserver`] and return it.
  pub fn test(&self) -> TestSingleObserver<T> {
    let observer = TestSingleObserver::new();
    self.subscribe_with(observer.clone());
    observer
  }

  // ==================== Factories ====================

  /// Succeed with a clone of `value` on every subscription.
  pub fn just(value: T) -> Self
  where
    T: Clone + Sync,
  {
    Self::new(trivial::Just(value))
  }

  /// Fail with `err` on every subscription.
  pub fn error(err: impl Into<Error>) -> Self { Self::new(trivial::Fail(err.into())) }

  /// Never signal. The observer is released when the subscription is disposed.
  pub fn never() -> Self { Self::new(trivial::Never) }

  /// Build a source from a callback driving a [`SingleEmitter`].
  ///
  /// An `Err` returned by the callback is delivered as `on_error` unless the
  /// emitter already signalled.
  pub fn create<F>(f: F) -> Self
  where
    F: Fn(SingleEmitter<T>) -> Result<(), Error> + Send + Sync + 'static,
  {
    Self::new(create::Create(f))
  }

  /// Call `f` on each subscription and deliver its result.
  pub fn from_fn<F>(f: F) -> Self
  where
    F: Fn() -> Result<T, Error> + Send + Sync + 'static,
  {
    Self::new(from_fn::FromFn(f))
  }

  /// Build a new inner source for each subscription.
  pub fn defer<F>(f: F) -> Self
  where
    F: Fn() -> Result<Single<T>, Error> + Send + Sync + 'static,
  {
    Self::new(defer::Defer(f))
  }

  // ==================== Coordinators ====================

  /// Mirror whichever source signals first.
  pub fn amb(sources: Vec<Single<T>>) -> Self { ops::amb::amb(sources) }

  /// Race sources produced by a fallible iterator.
  ///
  /// The iterator is drained before anything is subscribed; an `Err` item
  /// fails the race immediately without subscribing any source.
  pub fn amb_iter<I>(sources: I) -> Self
  where
    I: IntoIterator<Item = Result<Single<T>, Error>> + Clone + Send + Sync + 'static,
  {
    ops::amb::amb_iter(sources)
  }

  /// Race `self` against `other`.
  pub fn amb_with(&self, other: Single<T>) -> Self { ops::amb::amb(vec![self.clone(), other]) }

  /// Wait for every source to succeed and combine the values in order.
  pub fn zip<R, F>(sources: Vec<Single<T>>, mode: ErrorMode, combiner: F) -> Single<R>
  where
    R: Send + 'static,
    F: Fn(Vec<T>) -> Result<R, Error> + Send + Sync + 'static,
  {
    ops::zip::zip(sources, mode, combiner)
  }

  pub fn zip_with<U, R, F>(&self, other: Single<U>, combiner: F) -> Single<R>
  where
    U: Send + 'static,
    R: Send + 'static,
    F: Fn(T, U) -> Result<R, Error> + Send + Sync + 'static,
  {
    ops::zip::zip_pair(self.clone(), other, combiner)
  }

  /// Subscribe to up to `max_concurrency` sources at once and emit their
  /// values in submission order.
  pub fn concat_eager(sources: Vec<Single<T>>, max_concurrency: usize, mode: ErrorMode) -> Observable<T> {
    ops::concat_eager::from_vec(sources, max_concurrency, mode)
  }

  /// [`Single::concat_eager`] over a lazily pulled, fallible iterator.
  pub fn concat_eager_iter<I>(sources: I, max_concurrency: usize, mode: ErrorMode) -> Observable<T>
  where
    I: IntoIterator<Item = Result<Single<T>, Error>> + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
  {
    ops::concat_eager::from_iter(sources, max_concurrency, mode)
  }

  /// [`Single::concat_eager`] over sources pushed by an outer stream.
  pub fn concat_eager_observable(
    sources: Observable<Single<T>>, max_concurrency: usize, mode: ErrorMode,
  ) -> Observable<T> {
    ops::concat_eager::from_observable(sources, max_concurrency, mode)
  }

  /// Derive a source from a per-subscription resource and clean it up on
  /// every exit path.
  pub fn using<R, F, S, C>(resource: F, selector: S, cleanup: C, mode: CleanupMode) -> Self
  where
    R: Send + 'static,
    F: Fn() -> Result<R, Error> + Send + Sync + 'static,
    S: Fn(&R) -> Result<Single<T>, Error> + Send + Sync + 'static,
    C: Fn(R) -> Result<(), Error> + Send + Sync + 'static,
  {
    Self::new(Using::new(resource, selector, cleanup, mode))
  }

  // ==================== Operators ====================

  pub fn map<U, F>(&self, f: F) -> Single<U>
  where
    U: Send + 'static,
    F: Fn(T) -> Result<U, Error> + Send + Sync + 'static,
  {
    Single::new(ops::map::MapSingle::new(self.clone(), f))
  }

  /// Subscribe once, share the terminal event with every subscriber.
  pub fn cache(&self) -> Self
  where
    T: Clone + Sync,
  {
    Self::new(Cache::new(self.clone(), None))
  }

  /// Like [`Single::cache`], handing the real upstream subscription to
  /// `cancel` once it is established.
  pub fn cache_with_cancel(&self, cancel: impl Fn(Disposable) + Send + Sync + 'static) -> Self
  where
    T: Clone + Sync,
  {
    Self::new(Cache::new(self.clone(), Some(Box::new(cancel))))
  }

  /// Resubscribe on error while `policy` allows it.
  pub fn retry(&self, policy: impl RetryPolicy + 'static) -> Self { Self::new(Retry::new(self.clone(), policy)) }

  /// Resubscribe on error at most `times` times.
  pub fn retry_times(&self, times: usize) -> Self { self.retry(times) }

  /// Resubscribe on error once per item of the trigger stream `handler`
  /// builds from the stream of errors.
  pub fn retry_when<F>(&self, handler: F) -> Self
  where
    F: Fn(Observable<Error>) -> Observable<()> + Send + Sync + 'static,
  {
    Self::new(RetryWhen::new(self.clone(), handler))
  }

  /// Resubscribe on success while `policy` allows it, emitting every value.
  pub fn repeat(&self, policy: impl RepeatPolicy + 'static) -> Observable<T> {
    Observable::new(Repeat::new(self.clone(), policy))
  }

  /// Subscribe `times` times in total, emitting every value.
  pub fn repeat_times(&self, times: usize) -> Observable<T> { self.repeat(times) }

  /// Resubscribe on success once per item of the trigger stream `handler`
  /// builds from the stream of completions.
  pub fn repeat_when<F>(&self, handler: F) -> Observable<T>
  where
    F: Fn(Observable<()>) -> Observable<()> + Send + Sync + 'static,
  {
    Observable::new(RepeatWhen::new(self.clone(), handler))
  }

  /// Fail with [`Error::Timeout`] unless a signal arrives within `delay`.
  pub fn timeout(&self, delay: Duration, scheduler: impl Scheduler + 'static) -> Self {
    Self::new(Timeout::new(self.clone(), delay, scheduler::share(scheduler), None))
  }

  /// Switch to `fallback` unless a signal arrives within `delay`.
  pub fn timeout_with(&self, delay: Duration, scheduler: impl Scheduler + 'static, fallback: Single<T>) -> Self {
    Self::new(Timeout::new(self.clone(), delay, scheduler::share(scheduler), Some(fallback)))
  }

  /// Wait `delay` before subscribing upstream.
  pub fn delay_subscription(&self, delay: Duration, scheduler: impl Scheduler + 'static) -> Self {
    Self::new(ops::delay_subscription::DelaySubscription::new(
      self.clone(),
      delay,
      scheduler::share(scheduler),
    ))
  }

  /// Await the result. Dropping the future cancels the subscription.
  pub fn into_future(self) -> impl Future<Output = Result<T, Error>> + Send { ops::into_future::SingleFuture::new(&self) }
}

impl Single<()> {
  /// Succeed with `()` after `delay`.
  pub fn timer(delay: Duration, scheduler: impl Scheduler + 'static) -> Self {
    Self::new(timer::Timer { delay, scheduler: scheduler::share(scheduler) })
  }
}
