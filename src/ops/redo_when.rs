//! `retry_when` / `repeat_when`: resubscription driven by a trigger stream.
//!
//! Each termination of the source is pushed into a private
//! [`UnicastSubject`] relay (the error for `retry_when`, `()` for
//! `repeat_when`). The user's handler turns the relay into a trigger stream;
//! every trigger item resubscribes the source once. A completed trigger ends
//! the operator and a failed trigger fails it.
//!
//! Resubscription goes through the same [`Wip`] trampoline as `retry`, so a
//! handler that answers synchronously does not grow the stack.

use std::sync::Arc;

use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  drain::Wip,
  error::Error,
  observable::{Observable, ObservableSource},
  observer::{BoxedObserver, BoxedSingleObserver, Observer, SingleObserver},
  serializer::HalfSerializer,
  single::{Single, SingleSource},
  subject::UnicastSubject,
};

/// Handles of the two live subscriptions: the current source attempt and
/// the trigger stream.
#[derive(Default)]
struct Links {
  upstream: DisposableSlot,
  trigger: DisposableSlot,
}

impl Links {
  fn dispose(&self) {
    self.upstream.dispose();
    self.trigger.dispose();
  }

  fn is_disposed(&self) -> bool { self.upstream.is_disposed() }
}

impl Dispose for Links {
  fn dispose(&self) { Links::dispose(self) }

  fn is_disposed(&self) -> bool { Links::is_disposed(self) }
}

// ============================================================================
// retry_when
// ============================================================================

pub struct RetryWhen<T, F> {
  source: Single<T>,
  handler: F,
}

impl<T, F> RetryWhen<T, F> {
  pub(crate) fn new(source: Single<T>, handler: F) -> Self { Self { source, handler } }
}

impl<T, F> SingleSource<T> for RetryWhen<T, F>
where
  T: Send + 'static,
  F: Fn(Observable<Error>) -> Observable<()> + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedSingleObserver<T>) {
    let relay = UnicastSubject::new();
    let trigger = (self.handler)(relay.as_observable());
    let state = Arc::new(RetryWhenState {
      source: self.source.clone(),
      relay,
      links: Links::default(),
      downstream: TakeCell::empty(),
      wip: Wip::new(),
    });
    observer.on_subscribe(Disposable::new(state.clone()));
    state.downstream.put(observer);
    if state.links.is_disposed() {
      drop(state.downstream.take());
      return;
    }
    trigger.subscribe_with(RetryTrigger { state: state.clone() });
    state.resubscribe();
  }
}

struct RetryWhenState<T> {
  source: Single<T>,
  relay: UnicastSubject<Error>,
  links: Links,
  downstream: TakeCell<BoxedSingleObserver<T>>,
  wip: Wip,
}

impl<T: Send + 'static> RetryWhenState<T> {
  fn resubscribe(self: &Arc<Self>) {
    self.wip.trampoline(|| {
      if self.links.is_disposed() || self.downstream.is_empty() {
        return;
      }
      self.source.subscribe_with(RetryWhenObserver { state: self.clone() });
    });
  }

  /// Deliver a terminal error coming from the trigger side.
  fn fail(&self, err: Error) {
    if let Some(observer) = self.downstream.take() {
      self.links.upstream.dispose();
      observer.on_error(err);
    }
  }
}

impl<T: Send> Dispose for RetryWhenState<T> {
  fn dispose(&self) {
    self.links.dispose();
    drop(self.downstream.take());
  }

  fn is_disposed(&self) -> bool { self.links.is_disposed() }
}

struct RetryWhenObserver<T> {
  state: Arc<RetryWhenState<T>>,
}

impl<T: Send + 'static> SingleObserver<T> for RetryWhenObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.state.links.upstream.update(d); }

  fn on_success(self, value: T) {
    if let Some(observer) = self.state.downstream.take() {
      self.state.links.trigger.dispose();
      observer.on_success(value);
    }
  }

  fn on_error(self, err: Error) {
    if !self.state.links.is_disposed() {
      self.state.relay.on_next(err);
    }
  }
}

struct RetryTrigger<T> {
  state: Arc<RetryWhenState<T>>,
}

impl<T: Send + 'static> Observer<()> for RetryTrigger<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.state.links.trigger.set_once(d); }

  fn on_next(&mut self, _: ()) {
    tracing::trace!("retry_when: trigger fired, resubscribing");
    self.state.resubscribe();
  }

  fn on_error(self, err: Error) { self.state.fail(err) }

  fn on_complete(self) { self.state.fail(Error::NoSuchElement) }
}

// ============================================================================
// repeat_when
// ============================================================================

pub struct RepeatWhen<T, F> {
  source: Single<T>,
  handler: F,
}

impl<T, F> RepeatWhen<T, F> {
  pub(crate) fn new(source: Single<T>, handler: F) -> Self { Self { source, handler } }
}

impl<T, F> ObservableSource<T> for RepeatWhen<T, F>
where
  T: Send + 'static,
  F: Fn(Observable<()>) -> Observable<()> + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedObserver<T>) {
    let links = Arc::new(Links::default());
    observer.on_subscribe(Disposable::new(links.clone()));
    if links.is_disposed() {
      return;
    }
    let relay = UnicastSubject::new();
    let trigger = (self.handler)(relay.as_observable());
    let state = Arc::new(RepeatWhenState {
      source: self.source.clone(),
      relay,
      links,
      serializer: HalfSerializer::new(observer),
      wip: Wip::new(),
    });
    trigger.subscribe_with(RepeatTrigger { state: state.clone() });
    state.resubscribe();
  }
}

struct RepeatWhenState<T> {
  source: Single<T>,
  relay: UnicastSubject<()>,
  links: Arc<Links>,
  serializer: HalfSerializer<T>,
  wip: Wip,
}

impl<T: Send + 'static> RepeatWhenState<T> {
  fn resubscribe(self: &Arc<Self>) {
    self.wip.trampoline(|| {
      if self.links.is_disposed() || self.serializer.is_done() {
        return;
      }
      self.source.subscribe_with(RepeatWhenObserver { state: self.clone() });
    });
  }
}

struct RepeatWhenObserver<T> {
  state: Arc<RepeatWhenState<T>>,
}

impl<T: Send + 'static> SingleObserver<T> for RepeatWhenObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.state.links.upstream.update(d); }

  fn on_success(self, value: T) {
    if self.state.links.is_disposed() {
      return;
    }
    self.state.serializer.on_next(value);
    self.state.relay.on_next(());
  }

  fn on_error(self, err: Error) {
    self.state.links.trigger.dispose();
    self.state.serializer.on_error(err);
  }
}

struct RepeatTrigger<T> {
  state: Arc<RepeatWhenState<T>>,
}

impl<T: Send + 'static> Observer<()> for RepeatTrigger<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.state.links.trigger.set_once(d); }

  fn on_next(&mut self, _: ()) {
    tracing::trace!("repeat_when: trigger fired, resubscribing");
    self.state.resubscribe();
  }

  fn on_error(self, err: Error) {
    self.state.links.upstream.dispose();
    self.state.serializer.on_error(err);
  }

  fn on_complete(self) {
    self.state.links.upstream.dispose();
    self.state.serializer.on_complete();
  }
}
