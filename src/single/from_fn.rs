use super::SingleSource;
use crate::{
  disposable::Disposable,
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
};

pub(crate) struct FromFn<F>(pub(crate) F);

impl<T, F> SingleSource<T> for FromFn<F>
where
  F: Fn() -> Result<T, Error> + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedSingleObserver<T>) {
    let d = Disposable::flag();
    observer.on_subscribe(d.clone());
    if d.is_disposed() {
      return;
    }
    let result = (self.0)();
    if d.is_disposed() {
      return;
    }
    match result {
      Ok(value) => observer.on_success(value),
      Err(err) => observer.on_error(err),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use crate::prelude::*;

  #[rxsingle_macro::test]
  fn calls_once_per_subscription() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let single = Single::from_fn(move || Ok(c.fetch_add(1, Ordering::SeqCst)));
    single.test().assert_success(0);
    single.test().assert_success(1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[rxsingle_macro::test]
  fn err_is_delivered() { Single::<()>::from_fn(|| Err("nope".into())).test().assert_error_msg("nope"); }
}
