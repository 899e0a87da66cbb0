//! Observer traits and implementations
//!
//! A [`SingleObserver`] receives `on_subscribe` once and then exactly one of
//! `on_success` / `on_error`. The terminal methods consume the observer, so a
//! second terminal signal cannot be expressed.
//!
//! [`Observer`] is the multi-item counterpart used by the operators whose
//! output is a stream (`repeat`, `concat_eager`) and by the trigger streams of
//! the `..._when` operators.

use crate::{disposable::Disposable, error::Error};

// ============================================================================
// SingleObserver
// ============================================================================

/// Consumer of a single-result source.
pub trait SingleObserver<T> {
  /// Receive the cancellation handle. Called once, before any terminal signal.
  fn on_subscribe(&mut self, d: Disposable);

  fn on_success(self, value: T);

  fn on_error(self, err: Error);
}

/// Object-safe mirror of [`SingleObserver`].
pub trait DynSingleObserver<T> {
  fn box_on_subscribe(&mut self, d: Disposable);
  fn box_on_success(self: Box<Self>, value: T);
  fn box_on_error(self: Box<Self>, err: Error);
}

impl<T, O> DynSingleObserver<T> for O
where
  O: SingleObserver<T>,
{
  fn box_on_subscribe(&mut self, d: Disposable) { self.on_subscribe(d) }
  fn box_on_success(self: Box<Self>, value: T) { (*self).on_success(value) }
  fn box_on_error(self: Box<Self>, err: Error) { (*self).on_error(err) }
}

/// The observer type every [`SingleSource`](crate::single::SingleSource)
/// receives.
pub type BoxedSingleObserver<T> = Box<dyn DynSingleObserver<T> + Send>;

impl<T> SingleObserver<T> for BoxedSingleObserver<T> {
  #[inline]
  fn on_subscribe(&mut self, d: Disposable) { (**self).box_on_subscribe(d) }

  #[inline]
  fn on_success(self, value: T) { self.box_on_success(value) }

  #[inline]
  fn on_error(self, err: Error) { self.box_on_error(err) }
}

// ============================================================================
// Observer
// ============================================================================

/// Consumer of a multi-item stream.
pub trait Observer<T> {
  fn on_subscribe(&mut self, d: Disposable);

  fn on_next(&mut self, value: T);

  fn on_error(self, err: Error);

  fn on_complete(self);
}

/// Object-safe mirror of [`Observer`].
pub trait DynObserver<T> {
  fn box_on_subscribe(&mut self, d: Disposable);
  fn box_on_next(&mut self, value: T);
  fn box_on_error(self: Box<Self>, err: Error);
  fn box_on_complete(self: Box<Self>);
}

impl<T, O> DynObserver<T> for O
where
  O: Observer<T>,
{
  fn box_on_subscribe(&mut self, d: Disposable) { self.on_subscribe(d) }
  fn box_on_next(&mut self, value: T) { self.on_next(value) }
  fn box_on_error(self: Box<Self>, err: Error) { (*self).on_error(err) }
  fn box_on_complete(self: Box<Self>) { (*self).on_complete() }
}

pub type BoxedObserver<T> = Box<dyn DynObserver<T> + Send>;

impl<T> Observer<T> for BoxedObserver<T> {
  #[inline]
  fn on_subscribe(&mut self, d: Disposable) { (**self).box_on_subscribe(d) }

  #[inline]
  fn on_next(&mut self, value: T) { (**self).box_on_next(value) }

  #[inline]
  fn on_error(self, err: Error) { self.box_on_error(err) }

  #[inline]
  fn on_complete(self) { self.box_on_complete() }
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Single observer built from two closures.
///
/// Created by [`Single::subscribe`](crate::single::Single::subscribe); the
/// handle passed to `on_subscribe` is forwarded into `slot` so that the
/// caller's `Disposable` can cancel the upstream.
pub struct FnSingleObserver<S, E> {
  pub(crate) on_success: S,
  pub(crate) on_error: E,
  pub(crate) upstream: std::sync::Arc<crate::disposable::DisposableSlot>,
}

impl<T, S, E> SingleObserver<T> for FnSingleObserver<S, E>
where
  S: FnOnce(T),
  E: FnOnce(Error),
{
  fn on_subscribe(&mut self, d: Disposable) { self.upstream.set_once(d); }

  fn on_success(self, value: T) {
    self.upstream.weak_dispose();
    (self.on_success)(value)
  }

  fn on_error(self, err: Error) {
    self.upstream.weak_dispose();
    (self.on_error)(err)
  }
}

/// Stream observer built from three closures.
pub struct FnObserver<N, E, C> {
  pub(crate) on_next: N,
  pub(crate) on_error: E,
  pub(crate) on_complete: C,
  pub(crate) upstream: std::sync::Arc<crate::disposable::DisposableSlot>,
}

impl<T, N, E, C> Observer<T> for FnObserver<N, E, C>
where
  N: FnMut(T),
  E: FnOnce(Error),
  C: FnOnce(),
{
  fn on_subscribe(&mut self, d: Disposable) { self.upstream.set_once(d); }

  fn on_next(&mut self, value: T) {
    if !self.upstream.is_disposed() {
      (self.on_next)(value)
    }
  }

  fn on_error(self, err: Error) {
    self.upstream.weak_dispose();
    (self.on_error)(err)
  }

  fn on_complete(self) {
    self.upstream.weak_dispose();
    (self.on_complete)()
  }
}
