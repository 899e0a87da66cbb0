//! Per-subscription resource with guaranteed cleanup.
//!
//! Every subscription acquires a fresh resource, derives the real source from
//! it and releases it exactly once, whether the source succeeds, fails or is
//! disposed. [`CleanupMode`] decides whether the release happens before or
//! after the terminal signal is forwarded, and with it what happens to a
//! failing cleanup:
//!
//! | mode | cleanup runs | cleanup failure |
//! |---|---|---|
//! | `Eager` | before forwarding | turns a success into that error, is merged into an error |
//! | `Lazy` | after forwarding | logged with `tracing::warn!`, not delivered |

use std::sync::Arc;

use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
  single::{signal_error, Single, SingleSource},
};

/// When the resource of [`Single::using`] is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupMode {
  /// Release before the terminal signal is forwarded.
  #[default]
  Eager,
  /// Release after the terminal signal is forwarded.
  Lazy,
}

pub struct Using<F, S, C> {
  resource: F,
  selector: S,
  cleanup: Arc<C>,
  mode: CleanupMode,
}

impl<F, S, C> Using<F, S, C> {
  pub(crate) fn new(resource: F, selector: S, cleanup: C, mode: CleanupMode) -> Self {
    Self { resource, selector, cleanup: Arc::new(cleanup), mode }
  }
}

impl<T, R, F, S, C> SingleSource<T> for Using<F, S, C>
where
  T: Send + 'static,
  R: Send + 'static,
  F: Fn() -> Result<R, Error> + Send + Sync,
  S: Fn(&R) -> Result<Single<T>, Error> + Send + Sync,
  C: Fn(R) -> Result<(), Error> + Send + Sync + 'static,
{
  fn subscribe(&self, observer: BoxedSingleObserver<T>) {
    let resource = match (self.resource)() {
      Ok(resource) => resource,
      Err(err) => return signal_error(observer, err),
    };
    let source = match (self.selector)(&resource) {
      Ok(source) => source,
      Err(err) => {
        let state = Resource::<T, R, C>::new(resource, self.cleanup.clone());
        match self.mode {
          CleanupMode::Eager => signal_error(observer, state.release_into(err)),
          CleanupMode::Lazy => {
            signal_error(observer, err);
            state.release_logged();
          }
        }
        return;
      }
    };
    let state = Arc::new(Resource::new(resource, self.cleanup.clone()));
    source.subscribe_with(UsingObserver { pending: Some(observer), state, mode: self.mode });
  }
}

/// The acquired resource, the handle of the source derived from it and the
/// parked downstream.
struct Resource<T, R, C> {
  resource: TakeCell<R>,
  cleanup: Arc<C>,
  upstream: DisposableSlot,
  downstream: TakeCell<BoxedSingleObserver<T>>,
}

impl<T, R, C> Resource<T, R, C>
where
  C: Fn(R) -> Result<(), Error>,
{
  fn new(resource: R, cleanup: Arc<C>) -> Self {
    Self {
      resource: TakeCell::new(resource),
      cleanup,
      upstream: DisposableSlot::new(),
      downstream: TakeCell::empty(),
    }
  }

  /// Run the cleanup unless another path already did.
  fn release(&self) -> Result<(), Error> {
    match self.resource.take() {
      Some(resource) => (self.cleanup)(resource),
      None => Ok(()),
    }
  }

  fn release_logged(&self) {
    if let Err(err) = self.release() {
      tracing::warn!(error = %err, "using: cleanup failed");
    }
  }

  /// Release and fold a cleanup failure into `err`.
  fn release_into(&self, err: Error) -> Error {
    match self.release() {
      Ok(()) => err,
      Err(cleanup_err) => Error::merge(err, cleanup_err),
    }
  }
}

impl<T, R, C> Dispose for Resource<T, R, C>
where
  R: Send,
  C: Fn(R) -> Result<(), Error> + Send + Sync,
{
  fn dispose(&self) {
    drop(self.downstream.take());
    self.upstream.dispose();
    self.release_logged();
  }

  fn is_disposed(&self) -> bool { self.upstream.is_disposed() }
}

struct UsingObserver<T, R, C> {
  pending: Option<BoxedSingleObserver<T>>,
  state: Arc<Resource<T, R, C>>,
  mode: CleanupMode,
}

impl<T, R, C> SingleObserver<T> for UsingObserver<T, R, C>
where
  T: 'static,
  R: Send + 'static,
  C: Fn(R) -> Result<(), Error> + Send + Sync + 'static,
{
  fn on_subscribe(&mut self, d: Disposable) {
    self.state.upstream.set_once(d);
    let Some(mut observer) = self.pending.take() else { return };
    observer.on_subscribe(Disposable::new(self.state.clone()));
    self.state.downstream.put(observer);
    if self.state.is_disposed() {
      drop(self.state.downstream.take());
    }
  }

  fn on_success(self, value: T) {
    let state = self.state;
    state.upstream.weak_dispose();
    match self.mode {
      CleanupMode::Eager => {
        // A dispose issued by the cleanup itself still wins.
        let released = state.release();
        let Some(observer) = state.downstream.take() else { return };
        match released {
          Ok(()) => observer.on_success(value),
          Err(err) => observer.on_error(err),
        }
      }
      CleanupMode::Lazy => {
        let Some(observer) = state.downstream.take() else { return };
        observer.on_success(value);
        state.release_logged();
      }
    }
  }

  fn on_error(self, err: Error) {
    let state = self.state;
    state.upstream.weak_dispose();
    match self.mode {
      CleanupMode::Eager => {
        let err = state.release_into(err);
        if let Some(observer) = state.downstream.take() {
          observer.on_error(err);
        }
      }
      CleanupMode::Lazy => {
        let Some(observer) = state.downstream.take() else { return };
        observer.on_error(err);
        state.release_logged();
      }
    }
  }
}
