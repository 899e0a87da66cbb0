//! Race several sources; the first terminal signal wins.
//!
//! Every branch gets its own [`DisposableSlot`]. The first branch to signal
//! claims the winner cell with a CAS, disposes every other branch, clears its
//! own slot and forwards its signal. Later signals find the cell taken and
//! are dropped.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
  single::{signal_error, Single, SingleSource},
};

const NONE: usize = usize::MAX;
const CANCELLED: usize = usize::MAX - 1;

pub(crate) fn amb<T: Send + 'static>(sources: Vec<Single<T>>) -> Single<T> {
  match sources.len() {
    0 => Single::error(Error::NoSources),
    1 => sources.into_iter().next().unwrap_or_else(|| Single::error(Error::NoSources)),
    _ => Single::new(Amb { sources: sources.into() }),
  }
}

pub(crate) fn amb_iter<T, I>(sources: I) -> Single<T>
where
  T: Send + 'static,
  I: IntoIterator<Item = Result<Single<T>, Error>> + Clone + Send + Sync + 'static,
{
  Single::new(AmbIter(sources))
}

pub struct Amb<T> {
  sources: Arc<[Single<T>]>,
}

impl<T: Send + 'static> SingleSource<T> for Amb<T> {
  fn subscribe(&self, observer: BoxedSingleObserver<T>) { race(&self.sources, observer) }
}

pub struct AmbIter<I>(I);

impl<T, I> SingleSource<T> for AmbIter<I>
where
  T: Send + 'static,
  I: IntoIterator<Item = Result<Single<T>, Error>> + Clone + Send + Sync,
{
  fn subscribe(&self, observer: BoxedSingleObserver<T>) {
    match self.0.clone().into_iter().collect::<Result<Vec<_>, _>>() {
      Ok(sources) => race(&sources, observer),
      Err(err) => signal_error(observer, err),
    }
  }
}

fn race<T: Send + 'static>(sources: &[Single<T>], mut observer: BoxedSingleObserver<T>) {
  match sources {
    [] => return signal_error(observer, Error::NoSources),
    [only] => return only.subscribe_boxed(observer),
    _ => {}
  }

  let state = Arc::new(AmbState {
    winner: AtomicUsize::new(NONE),
    branches: sources.iter().map(|_| DisposableSlot::new()).collect(),
    downstream: TakeCell::empty(),
  });
  observer.on_subscribe(Disposable::new(state.clone()));
  state.downstream.put(observer);
  if state.is_settled() {
    drop(state.downstream.take());
    return;
  }

  for (index, source) in sources.iter().enumerate() {
    if state.is_settled() {
      break;
    }
    source.subscribe_with(AmbObserver { index, state: state.clone() });
  }
}

struct AmbState<T> {
  winner: AtomicUsize,
  branches: Box<[DisposableSlot]>,
  downstream: TakeCell<BoxedSingleObserver<T>>,
}

impl<T> AmbState<T> {
  fn is_settled(&self) -> bool { self.winner.load(Ordering::Acquire) != NONE }

  /// Claim the race for `index` and cancel everybody else.
  fn win(&self, index: usize) -> Option<BoxedSingleObserver<T>> {
    self
      .winner
      .compare_exchange(NONE, index, Ordering::AcqRel, Ordering::Acquire)
      .ok()?;
    tracing::trace!(winner = index, "amb: branch won the race");
    for (i, slot) in self.branches.iter().enumerate() {
      if i == index {
        slot.weak_dispose();
      } else {
        slot.dispose();
      }
    }
    self.downstream.take()
  }
}

impl<T: Send> Dispose for AmbState<T> {
  fn dispose(&self) {
    if self
      .winner
      .compare_exchange(NONE, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
    {
      self.branches.iter().for_each(DisposableSlot::dispose);
      drop(self.downstream.take());
    }
  }

  fn is_disposed(&self) -> bool { self.is_settled() }
}

struct AmbObserver<T> {
  index: usize,
  state: Arc<AmbState<T>>,
}

impl<T> SingleObserver<T> for AmbObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.state.branches[self.index].set_once(d); }

  fn on_success(self, value: T) {
    if let Some(observer) = self.state.win(self.index) {
      observer.on_success(value);
    }
  }

  fn on_error(self, err: Error) {
    match self.state.win(self.index) {
      Some(observer) => observer.on_error(err),
      None => tracing::debug!(branch = self.index, error = %err, "amb: error from a losing branch dropped"),
    }
  }
}
