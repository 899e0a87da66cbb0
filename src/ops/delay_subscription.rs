use std::sync::Arc;

use crate::{
  disposable::{Disposable, DisposableSlot, Dispose},
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
  scheduler::{Duration, SharedScheduler},
  single::{Single, SingleSource},
};

pub struct DelaySubscription<T> {
  source: Single<T>,
  delay: Duration,
  scheduler: SharedScheduler,
}

impl<T> DelaySubscription<T> {
  pub(crate) fn new(source: Single<T>, delay: Duration, scheduler: SharedScheduler) -> Self {
    Self { source, delay, scheduler }
  }
}

#[derive(Default)]
struct Pending {
  timer: DisposableSlot,
  upstream: DisposableSlot,
}

impl Dispose for Pending {
  fn dispose(&self) {
    self.timer.dispose();
    self.upstream.dispose();
  }

  fn is_disposed(&self) -> bool { self.upstream.is_disposed() }
}

impl<T: Send + 'static> SingleSource<T> for DelaySubscription<T> {
  fn subscribe(&self, mut observer: BoxedSingleObserver<T>) {
    let pending = Arc::new(Pending::default());
    observer.on_subscribe(Disposable::new(pending.clone()));
    if pending.is_disposed() {
      return;
    }
    let source = self.source.clone();
    let p = pending.clone();
    let task = self.scheduler.schedule(
      self.delay,
      Box::new(move || {
        p.timer.weak_dispose();
        if !p.is_disposed() {
          source.subscribe_with(Delayed { observer, pending: p });
        }
      }),
    );
    pending.timer.set_once(task);
  }
}

/// Forwards to the original observer, which already got its `on_subscribe`.
struct Delayed<T> {
  observer: BoxedSingleObserver<T>,
  pending: Arc<Pending>,
}

impl<T> SingleObserver<T> for Delayed<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.pending.upstream.set_once(d); }

  fn on_success(self, value: T) {
    self.pending.upstream.weak_dispose();
    self.observer.on_success(value);
  }

  fn on_error(self, err: Error) {
    self.pending.upstream.weak_dispose();
    self.observer.on_error(err);
  }
}
