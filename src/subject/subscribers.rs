//! Copy-on-write observer registry.
//!
//! The registry is an immutable list behind an `ArcSwap`. Adding or removing
//! copies the list and CAS-replaces the whole thing; readers snapshot it
//! without coordination. Terminating swaps in a frozen state that refuses
//! every later `add`, so a subscriber that loses the race to register knows
//! it has to read the cached terminal event instead.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Weak,
};

use arc_swap::{ArcSwap, Guard};

use crate::{
  cell::TakeCell,
  disposable::{Disposable, Dispose},
  error::Error,
  observer::{BoxedSingleObserver, SingleObserver},
};

enum Registry<Ob> {
  Active(Vec<Arc<Ob>>),
  Terminated,
}

pub(crate) struct Subscribers<Ob> {
  state: ArcSwap<Registry<Ob>>,
}

impl<Ob> Default for Subscribers<Ob> {
  fn default() -> Self { Self { state: ArcSwap::from_pointee(Registry::Active(Vec::new())) } }
}

impl<Ob> Subscribers<Ob> {
  /// Returns `false` if the registry is already terminated.
  pub(crate) fn add(&self, observer: Arc<Ob>) -> bool {
    self.update(|list| {
      let mut next = list.to_vec();
      next.push(observer.clone());
      Some(next)
    })
  }

  /// Remove the entry living at `target`, if present.
  pub(crate) fn remove(&self, target: *const Ob) {
    self.update(|list| {
      let idx = list.iter().position(|ob| std::ptr::eq(Arc::as_ptr(ob), target))?;
      let mut next = list.to_vec();
      next.remove(idx);
      Some(next)
    });
  }

  /// Freeze the registry and hand back the final snapshot.
  ///
  /// Only the first call gets the observers; later calls get nothing.
  pub(crate) fn terminate(&self) -> Vec<Arc<Ob>> {
    match &*self.state.swap(Arc::new(Registry::Terminated)) {
      Registry::Active(list) => list.clone(),
      Registry::Terminated => Vec::new(),
    }
  }

  pub(crate) fn len(&self) -> usize {
    match &**self.state.load() {
      Registry::Active(list) => list.len(),
      Registry::Terminated => 0,
    }
  }

  pub(crate) fn is_terminated(&self) -> bool { matches!(&**self.state.load(), Registry::Terminated) }

  /// CAS-retry loop. `f` returns the replacement list, or `None` to leave
  /// the registry untouched. Returns `false` only when terminated.
  fn update(&self, mut f: impl FnMut(&[Arc<Ob>]) -> Option<Vec<Arc<Ob>>>) -> bool {
    let mut current = self.state.load_full();
    loop {
      let next = match &*current {
        Registry::Terminated => return false,
        Registry::Active(list) => match f(list) {
          Some(next) => Arc::new(Registry::Active(next)),
          None => return true,
        },
      };
      let prev = self.state.compare_and_swap(&current, next);
      if Arc::ptr_eq(&*prev, &current) {
        return true;
      }
      current = Guard::into_inner(prev);
    }
  }
}

// ============================================================================
// SingleRegistration
// ============================================================================

/// One downstream observer of a multicasting single source.
///
/// The registration is the observer's `Disposable`: disposing it drops the
/// observer and splices the entry out of the registry it belongs to.
pub(crate) struct SingleRegistration<T> {
  observer: TakeCell<BoxedSingleObserver<T>>,
  disposed: AtomicBool,
  registry: Weak<Subscribers<SingleRegistration<T>>>,
}

pub(crate) type SingleRegistry<T> = Subscribers<SingleRegistration<T>>;

impl<T> SingleRegistration<T> {
  /// Take the observer for delivery unless the registration was disposed.
  pub(crate) fn take_live(&self) -> Option<BoxedSingleObserver<T>> {
    let observer = self.observer.take()?;
    (!self.disposed.load(Ordering::Acquire)).then_some(observer)
  }
}

impl<T> Dispose for SingleRegistration<T> {
  fn dispose(&self) {
    if self.disposed.swap(true, Ordering::AcqRel) {
      return;
    }
    drop(self.observer.take());
    if let Some(registry) = self.registry.upgrade() {
      registry.remove(self);
    }
  }

  fn is_disposed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

pub(crate) enum Registered<T> {
  /// The observer is in the registry and will get the terminal event.
  Added,
  /// The observer disposed its subscription during registration.
  Cancelled,
  /// The registry had already terminated; the caller delivers the cached
  /// terminal event to this observer.
  Late(BoxedSingleObserver<T>),
}

/// Call `on_subscribe` and add the observer to `registry`.
pub(crate) fn register<T: 'static>(
  registry: &Arc<SingleRegistry<T>>, mut observer: BoxedSingleObserver<T>,
) -> Registered<T> {
  let registration = Arc::new(SingleRegistration {
    observer: TakeCell::empty(),
    disposed: AtomicBool::new(false),
    registry: Arc::downgrade(registry),
  });
  observer.on_subscribe(Disposable::new(registration.clone()));
  registration.observer.put(observer);
  if registration.is_disposed() {
    drop(registration.observer.take());
    return Registered::Cancelled;
  }
  if registry.add(registration.clone()) {
    if registration.is_disposed() {
      registry.remove(Arc::as_ptr(&registration));
    }
    return Registered::Added;
  }
  match registration.take_live() {
    Some(observer) => Registered::Late(observer),
    None => Registered::Cancelled,
  }
}

/// Hand a stored terminal event to `observer`.
pub(crate) fn deliver<T: Clone>(observer: BoxedSingleObserver<T>, result: &Result<T, Error>) {
  match result {
    Ok(value) => observer.on_success(value.clone()),
    Err(err) => observer.on_error(err.clone()),
  }
}
