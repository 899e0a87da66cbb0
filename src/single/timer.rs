use std::sync::Arc;

use super::SingleSource;
use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot},
  observer::{BoxedSingleObserver, SingleObserver},
  scheduler::{Duration, SharedScheduler},
};

pub(crate) struct Timer {
  pub(crate) delay: Duration,
  pub(crate) scheduler: SharedScheduler,
}

impl SingleSource<()> for Timer {
  fn subscribe(&self, mut observer: BoxedSingleObserver<()>) {
    let slot = Arc::new(DisposableSlot::new());
    observer.on_subscribe(Disposable::new(slot.clone()));
    let observer = TakeCell::new(observer);
    let guard = slot.clone();
    let task = self.scheduler.schedule(
      self.delay,
      Box::new(move || {
        if guard.is_disposed() {
          return;
        }
        if let Some(observer) = observer.take() {
          guard.weak_dispose();
          observer.on_success(());
        }
      }),
    );
    slot.set_once(task);
  }
}
