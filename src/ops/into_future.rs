//! Await a [`Single`] from async code.
//!
//! ```rust
//! use rxsingle::prelude::*;
//!
//! let value = futures::executor::block_on(Single::just(3).map(|v| Ok(v + 1)).into_future());
//! assert_eq!(value.unwrap(), 4);
//! ```
//!
//! Dropping the future before it resolves disposes the subscription. If the
//! source drops its observer without signalling the future resolves to
//! [`Error::Abandoned`].

use std::{
  future::Future,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
};

use futures::channel::oneshot;
use pin_project_lite::pin_project;

use crate::{
  disposable::{Disposable, DisposableSlot},
  error::Error,
  observer::SingleObserver,
  single::Single,
};

pin_project! {
  pub struct SingleFuture<T> {
    #[pin]
    result: oneshot::Receiver<Result<T, Error>>,
    subscription: DisposeOnDrop,
  }
}

struct DisposeOnDrop(Arc<DisposableSlot>);

impl Drop for DisposeOnDrop {
  fn drop(&mut self) { self.0.dispose(); }
}

impl<T: Send + 'static> SingleFuture<T> {
  pub(crate) fn new(source: &Single<T>) -> Self {
    let (tx, rx) = oneshot::channel();
    let upstream = Arc::new(DisposableSlot::new());
    source.subscribe_with(FutureObserver { tx, upstream: upstream.clone() });
    Self { result: rx, subscription: DisposeOnDrop(upstream) }
  }
}

impl<T> Future for SingleFuture<T> {
  type Output = Result<T, Error>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    self
      .project()
      .result
      .poll(cx)
      .map(|received| received.unwrap_or(Err(Error::Abandoned)))
  }
}

struct FutureObserver<T> {
  tx: oneshot::Sender<Result<T, Error>>,
  upstream: Arc<DisposableSlot>,
}

impl<T> SingleObserver<T> for FutureObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.upstream.set_once(d); }

  fn on_success(self, value: T) {
    self.upstream.weak_dispose();
    let _ = self.tx.send(Ok(value));
  }

  fn on_error(self, err: Error) {
    self.upstream.weak_dispose();
    let _ = self.tx.send(Err(err));
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use crate::prelude::*;

  #[rxsingle_macro::test(shared)]
  async fn resolves_with_value_and_error() {
    assert_eq!(Single::just(1).into_future().await.unwrap(), 1);
    let err = Single::<i32>::error("nope").into_future().await.unwrap_err();
    assert_eq!(err.to_string(), "nope");
  }

  #[rxsingle_macro::test(shared)]
  async fn resolves_from_another_thread() {
    let subject = SingleSubject::new();
    let s = subject.clone();
    let fut = subject.as_single().into_future();
    thread::spawn(move || s.on_success("late"));
    assert_eq!(fut.await.unwrap(), "late");
  }

  #[rxsingle_macro::test]
  fn drop_disposes_subscription() {
    let subject = SingleSubject::<i32>::new();
    let fut = subject.as_single().into_future();
    assert_eq!(subject.observer_count(), 1);
    drop(fut);
    assert_eq!(subject.observer_count(), 0);
  }

  struct Forgetful;

  impl SingleSource<i32> for Forgetful {
    fn subscribe(&self, observer: BoxedSingleObserver<i32>) { drop(observer) }
  }

  #[rxsingle_macro::test]
  fn abandoned_source() {
    let result = futures::executor::block_on(Single::new(Forgetful).into_future());
    assert!(matches!(result, Err(Error::Abandoned)));
  }
}
