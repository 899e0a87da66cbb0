use super::ObservableSource;
use crate::{
  disposable::Disposable,
  observer::{BoxedObserver, Observer},
};

pub(crate) struct FromIter<I>(pub(crate) I);

impl<I> ObservableSource<I::Item> for FromIter<I>
where
  I: IntoIterator + Clone + Send + Sync,
{
  fn subscribe(&self, mut observer: BoxedObserver<I::Item>) {
    let d = Disposable::flag();
    observer.on_subscribe(d.clone());
    for item in self.0.clone() {
      if d.is_disposed() {
        return;
      }
      observer.on_next(item);
    }
    if !d.is_disposed() {
      observer.on_complete();
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::prelude::*;

  #[rxsingle_macro::test]
  fn emits_in_order_per_subscription() {
    let source = Observable::from_iter(vec![1, 2, 3]);
    source.test().assert_values(&[1, 2, 3]).assert_complete();
    source.test().assert_values(&[1, 2, 3]).assert_complete();
  }

  #[rxsingle_macro::test]
  fn stops_when_disposed_midway() {
    Observable::from_iter(0..)
      .take(3)
      .test()
      .assert_values(&[0, 1, 2])
      .assert_complete();
  }
}
