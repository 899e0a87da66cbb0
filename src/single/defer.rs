use super::{signal_error, Single, SingleSource};
use crate::{error::Error, observer::BoxedSingleObserver};

pub(crate) struct Defer<F>(pub(crate) F);

impl<T, F> SingleSource<T> for Defer<F>
where
  F: Fn() -> Result<Single<T>, Error> + Send + Sync,
{
  fn subscribe(&self, observer: BoxedSingleObserver<T>) {
    match (self.0)() {
      Ok(source) => source.source.subscribe(observer),
      Err(err) => signal_error(observer, err),
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
  fn factory_runs_per_subscription() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let single = Single::defer(move || Ok(Single::just(c.fetch_add(1, Ordering::SeqCst) * 10)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    single.test().assert_success(0);
    single.test().assert_success(10);
  }

  #[rxsingle_macro::test]
  fn factory_error() { Single::<u8>::defer(|| Err("no source".into())).test().assert_error_msg("no source"); }
}
