//! Eagerly subscribe to several sources, emit their values in submission
//! order.
//!
//! One generic coordinator drives every flavour. Where the sources come from
//! is abstracted by [`SourceFeed`]: a fixed array, a fallible iterator, or an
//! outer stream pushing sources through the SPSC queue. The coordinator keeps
//! a FIFO of branches in submission order and runs a drain loop guarded by a
//! [`Wip`] counter, so only one thread at a time admits new sources and talks
//! to the downstream, whichever thread a branch completes on.

use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc, Weak,
  },
};

use once_cell::sync::OnceCell;

use super::ErrorMode;
use crate::{
  cell::TakeCell,
  disposable::{Disposable, DisposableSlot, Dispose},
  drain::{DrainCell, Wip},
  error::{Error, ErrorSlot},
  observable::{Observable, ObservableSource},
  observer::{BoxedObserver, Observer, SingleObserver},
  queue::{self, Consumer, Producer},
  single::Single,
};

/// `max_concurrency` value that subscribes to every source right away.
pub const UNBOUNDED: usize = usize::MAX;

pub(crate) fn from_vec<T: Send + 'static>(
  sources: Vec<Single<T>>, max_concurrency: usize, mode: ErrorMode,
) -> Observable<T> {
  Observable::new(ArraySource { sources: sources.into(), max_concurrency, mode })
}

pub(crate) fn from_iter<T, I>(sources: I, max_concurrency: usize, mode: ErrorMode) -> Observable<T>
where
  T: Send + 'static,
  I: IntoIterator<Item = Result<Single<T>, Error>> + Clone + Send + Sync + 'static,
  I::IntoIter: Send + 'static,
{
  Observable::new(IterSource { sources, max_concurrency, mode })
}

pub(crate) fn from_observable<T: Send + 'static>(
  sources: Observable<Single<T>>, max_concurrency: usize, mode: ErrorMode,
) -> Observable<T> {
  Observable::new(PushSource { sources, max_concurrency, mode })
}

// ============================================================================
// Source feeds
// ============================================================================

/// What a feed has to offer right now.
pub(crate) enum Feed<T> {
  Source(Single<T>),
  /// Producing the next source failed; becomes an already-failed branch.
  Failed(Error),
  /// Nothing yet; the feed calls back into the drain when it has more.
  Pending,
  Exhausted,
}

/// Pull side of the sources handed to the coordinator.
///
/// Only ever called by the current drain owner.
pub(crate) trait SourceFeed<T>: Send {
  fn next(&mut self) -> Feed<T>;

  /// Stop producing; called once when the coordinator is cancelled.
  fn cancel(&mut self) {}
}

struct ArrayFeed<T> {
  sources: Arc<[Single<T>]>,
  index: usize,
}

impl<T> SourceFeed<T> for ArrayFeed<T> {
  fn next(&mut self) -> Feed<T> {
    match self.sources.get(self.index) {
      Some(source) => {
        self.index += 1;
        Feed::Source(source.clone())
      }
      None => Feed::Exhausted,
    }
  }
}

struct IterFeed<It> {
  iter: Option<It>,
}

impl<T, It> SourceFeed<T> for IterFeed<It>
where
  It: Iterator<Item = Result<Single<T>, Error>> + Send,
{
  fn next(&mut self) -> Feed<T> {
    let Some(iter) = self.iter.as_mut() else { return Feed::Exhausted };
    match iter.next() {
      Some(Ok(source)) => Feed::Source(source),
      Some(Err(err)) => {
        self.iter = None;
        Feed::Failed(err)
      }
      None => {
        self.iter = None;
        Feed::Exhausted
      }
    }
  }

  fn cancel(&mut self) { self.iter = None; }
}

/// State shared between a [`PushFeed`] and the outer stream's observer.
struct PushShared {
  terminal: OnceCell<Option<Error>>,
  outer: DisposableSlot,
}

struct PushFeed<T> {
  queue: Consumer<Single<T>>,
  shared: Arc<PushShared>,
  reported: bool,
}

impl<T> SourceFeed<T> for PushFeed<T> {
  fn next(&mut self) -> Feed<T> {
    // Read the terminal flag before polling, see `UnicastSubject`.
    let terminal = self.shared.terminal.get();
    if let Some(source) = self.queue.poll() {
      return Feed::Source(source);
    }
    match terminal {
      None => Feed::Pending,
      Some(Some(err)) if !self.reported => {
        self.reported = true;
        Feed::Failed(err.clone())
      }
      Some(_) => Feed::Exhausted,
    }
  }

  fn cancel(&mut self) {
    self.shared.outer.dispose();
    self.queue.clear();
  }
}

// ============================================================================
// Observable sources
// ============================================================================

struct ArraySource<T> {
  sources: Arc<[Single<T>]>,
  max_concurrency: usize,
  mode: ErrorMode,
}

impl<T: Send + 'static> ObservableSource<T> for ArraySource<T> {
  fn subscribe(&self, observer: BoxedObserver<T>) {
    let feed = ArrayFeed { sources: self.sources.clone(), index: 0 };
    ConcatEager::start(feed, self.max_concurrency, self.mode, observer);
  }
}

struct IterSource<I> {
  sources: I,
  max_concurrency: usize,
  mode: ErrorMode,
}

impl<T, I> ObservableSource<T> for IterSource<I>
where
  T: Send + 'static,
  I: IntoIterator<Item = Result<Single<T>, Error>> + Clone + Send + Sync,
  I::IntoIter: Send + 'static,
{
  fn subscribe(&self, observer: BoxedObserver<T>) {
    let feed = IterFeed { iter: Some(self.sources.clone().into_iter()) };
    ConcatEager::start(feed, self.max_concurrency, self.mode, observer);
  }
}

struct PushSource<T> {
  sources: Observable<Single<T>>,
  max_concurrency: usize,
  mode: ErrorMode,
}

impl<T: Send + 'static> ObservableSource<T> for PushSource<T> {
  fn subscribe(&self, observer: BoxedObserver<T>) {
    let (producer, consumer) = queue::channel();
    let shared = Arc::new(PushShared { terminal: OnceCell::new(), outer: DisposableSlot::new() });
    let feed = PushFeed { queue: consumer, shared: shared.clone(), reported: false };
    let parent = ConcatEager::start(feed, self.max_concurrency, self.mode, observer);
    if parent.cancelled.load(Ordering::Acquire) {
      return;
    }
    self.sources.subscribe_with(OuterObserver { producer, shared, parent });
  }
}

struct OuterObserver<T> {
  producer: Producer<Single<T>>,
  shared: Arc<PushShared>,
  parent: Arc<ConcatEager<T, PushFeed<T>>>,
}

impl<T: Send + 'static> Observer<Single<T>> for OuterObserver<T> {
  fn on_subscribe(&mut self, d: Disposable) { self.shared.outer.set_once(d); }

  fn on_next(&mut self, source: Single<T>) {
    self.producer.offer(source);
    self.parent.drain();
  }

  fn on_error(self, err: Error) {
    let _ = self.shared.terminal.set(Some(err));
    self.shared.outer.weak_dispose();
    self.parent.drain();
  }

  fn on_complete(self) {
    let _ = self.shared.terminal.set(None);
    self.shared.outer.weak_dispose();
    self.parent.drain();
  }
}

// ============================================================================
// Coordinator
// ============================================================================

const PENDING: u8 = 0;
const SUCCEEDED: u8 = 1;
const FAILED: u8 = 2;

struct Branch<T> {
  state: AtomicU8,
  value: TakeCell<T>,
  upstream: DisposableSlot,
}

impl<T> Branch<T> {
  fn new(state: u8) -> Arc<Self> {
    Arc::new(Branch { state: AtomicU8::new(state), value: TakeCell::empty(), upstream: DisposableSlot::new() })
  }
}

struct DrainState<T, F> {
  feed: F,
  queue: VecDeque<Arc<Branch<T>>>,
  active: usize,
  exhausted: bool,
  done: bool,
  downstream: Option<BoxedObserver<T>>,
}

pub(crate) struct ConcatEager<T, F> {
  me: Weak<Self>,
  wip: Wip,
  cancelled: AtomicBool,
  errors: ErrorSlot,
  max_concurrency: usize,
  mode: ErrorMode,
  pending: TakeCell<BoxedObserver<T>>,
  state: DrainCell<DrainState<T, F>>,
}

impl<T, F> ConcatEager<T, F>
where
  T: Send + 'static,
  F: SourceFeed<T> + 'static,
{
  fn start(feed: F, max_concurrency: usize, mode: ErrorMode, mut observer: BoxedObserver<T>) -> Arc<Self> {
    let this = Arc::new_cyclic(|me| ConcatEager {
      me: me.clone(),
      wip: Wip::new(),
      cancelled: AtomicBool::new(false),
      errors: ErrorSlot::new(),
      max_concurrency: max_concurrency.max(1),
      mode,
      pending: TakeCell::empty(),
      state: DrainCell::new(DrainState {
        feed,
        queue: VecDeque::new(),
        active: 0,
        exhausted: false,
        done: false,
        downstream: None,
      }),
    });
    observer.on_subscribe(Disposable::new(this.clone()));
    this.pending.put(observer);
    this.drain();
    this
  }

  fn drain(&self) {
    if !self.wip.enter() {
      return;
    }
    let mut missed = 1;
    loop {
      // SAFETY: we own the drain until `leave` returns zero.
      let state = unsafe { self.state.get() };
      if state.downstream.is_none() && !state.done {
        state.downstream = self.pending.take();
      }
      if self.cancelled.load(Ordering::Acquire) {
        self.cancel_all(state);
      } else if !state.done && state.downstream.is_some() {
        self.step(state);
      }
      missed = self.wip.leave(missed);
      if missed == 0 {
        break;
      }
    }
  }

  fn step(&self, state: &mut DrainState<T, F>) {
    loop {
      if self.mode == ErrorMode::Immediate && self.errors.has_error() {
        let observer = state.downstream.take();
        let err = self.errors.terminate();
        self.cancel_all(state);
        if let (Some(observer), Some(err)) = (observer, err) {
          observer.on_error(err);
        }
        return;
      }

      while !state.exhausted && state.active < self.max_concurrency {
        if self.cancelled.load(Ordering::Acquire) {
          return;
        }
        match state.feed.next() {
          Feed::Source(source) => {
            let branch = Branch::new(PENDING);
            state.queue.push_back(branch.clone());
            state.active += 1;
            if let Some(parent) = self.me.upgrade() {
              source.subscribe_with(BranchObserver { branch, parent });
            }
          }
          Feed::Failed(err) => {
            self.errors.add(err);
            state.queue.push_back(Branch::new(FAILED));
            state.active += 1;
          }
          Feed::Pending => break,
          Feed::Exhausted => state.exhausted = true,
        }
      }

      let mut progressed = false;
      while let Some(head) = state.queue.front() {
        if self.cancelled.load(Ordering::Acquire) {
          return;
        }
        if self.mode == ErrorMode::Immediate && self.errors.has_error() {
          break;
        }
        match head.state.load(Ordering::Acquire) {
          SUCCEEDED => {
            let value = head.value.take();
            state.queue.pop_front();
            state.active -= 1;
            progressed = true;
            if let (Some(value), Some(observer)) = (value, state.downstream.as_mut()) {
              observer.on_next(value);
            }
          }
          FAILED => {
            state.queue.pop_front();
            state.active -= 1;
            progressed = true;
          }
          _ => break,
        }
      }

      if self.mode == ErrorMode::Immediate && self.errors.has_error() {
        continue;
      }

      if state.exhausted && state.queue.is_empty() {
        state.done = true;
        if let Some(observer) = state.downstream.take() {
          match self.errors.terminate() {
            Some(err) => observer.on_error(err),
            None => observer.on_complete(),
          }
        }
        return;
      }

      if !progressed {
        return;
      }
    }
  }

  fn cancel_all(&self, state: &mut DrainState<T, F>) {
    if !state.done {
      state.done = true;
      state.feed.cancel();
    }
    for branch in state.queue.drain(..) {
      branch.upstream.dispose();
      drop(branch.value.take());
    }
    state.active = 0;
    state.downstream = None;
    drop(self.pending.take());
  }
}

impl<T, F> Dispose for ConcatEager<T, F>
where
  T: Send + 'static,
  F: SourceFeed<T> + 'static,
{
  fn dispose(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      self.drain();
    }
  }

  fn is_disposed(&self) -> bool { self.cancelled.load(Ordering::Acquire) }
}

struct BranchObserver<T, F> {
  branch: Arc<Branch<T>>,
  parent: Arc<ConcatEager<T, F>>,
}

impl<T, F> SingleObserver<T> for BranchObserver<T, F>
where
  T: Send + 'static,
  F: SourceFeed<T> + 'static,
{
  fn on_subscribe(&mut self, d: Disposable) { self.branch.upstream.set_once(d); }

  fn on_success(self, value: T) {
    self.branch.value.put(value);
    self.branch.state.store(SUCCEEDED, Ordering::Release);
    self.branch.upstream.weak_dispose();
    self.parent.drain();
  }

  fn on_error(self, err: Error) {
    self.parent.errors.add(err);
    self.branch.state.store(FAILED, Ordering::Release);
    self.branch.upstream.weak_dispose();
    self.parent.drain();
  }
}
