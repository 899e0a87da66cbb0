//! Cancellation handles and the atomic single-owner resource slot.
//!
//! A [`Disposable`] is the handle an observer receives in `on_subscribe`.
//! Disposing it stops further work; it never retracts a signal that already
//! won the race to be delivered.
//!
//! [`DisposableSlot`] is the safety net every coordinator is built on. It is
//! `Empty`, holds one resource, or is `DISPOSED`. Once disposed it never goes
//! back, and any resource handed to a disposed slot is disposed on the spot.
//! None of its operations panic.

use std::{
  fmt,
  ptr::{self, NonNull},
  sync::{
    atomic::{AtomicBool, AtomicPtr, Ordering},
    Arc,
  },
};

use crate::cell::TakeCell;

/// Something that can be cancelled from any thread.
///
/// Implementations must make `dispose` idempotent.
pub trait Dispose: Send + Sync {
  fn dispose(&self);

  fn is_disposed(&self) -> bool;
}

/// Shared, cloneable cancellation handle.
#[derive(Clone)]
pub struct Disposable(Arc<dyn Dispose>);

impl Disposable {
  pub fn new<D: Dispose + 'static>(inner: Arc<D>) -> Self { Disposable(inner) }

  /// Run `f` on the first `dispose` call.
  pub fn from_fn(f: impl FnOnce() + Send + 'static) -> Self {
    let action: Action = Box::new(f);
    Disposable(Arc::new(ActionDisposable(TakeCell::new(action))))
  }

  /// A handle with nothing behind it; disposing it does nothing.
  pub fn empty() -> Self { Disposable(Arc::new(EmptyDisposable)) }

  /// A handle that only records whether it was disposed.
  pub fn flag() -> Self { Disposable(Arc::new(FlagDisposable(AtomicBool::new(false)))) }

  /// A handle that is disposed already.
  pub fn disposed() -> Self { Disposable(Arc::new(FlagDisposable(AtomicBool::new(true)))) }

  #[inline]
  pub fn dispose(&self) { self.0.dispose() }

  #[inline]
  pub fn is_disposed(&self) -> bool { self.0.is_disposed() }

  /// `true` if both handles point at the same resource.
  pub fn same(&self, other: &Disposable) -> bool {
    ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
  }
}

impl<D: Dispose + 'static> From<Arc<D>> for Disposable {
  fn from(inner: Arc<D>) -> Self { Disposable(inner) }
}

impl fmt::Debug for Disposable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Disposable")
      .field("is_disposed", &self.is_disposed())
      .finish()
  }
}

struct EmptyDisposable;

impl Dispose for EmptyDisposable {
  fn dispose(&self) {}

  fn is_disposed(&self) -> bool { false }
}

struct FlagDisposable(AtomicBool);

impl Dispose for FlagDisposable {
  fn dispose(&self) { self.0.store(true, Ordering::Release); }

  fn is_disposed(&self) -> bool { self.0.load(Ordering::Acquire) }
}

type Action = Box<dyn FnOnce() + Send>;

struct ActionDisposable(TakeCell<Action>);

impl Dispose for ActionDisposable {
  fn dispose(&self) {
    if let Some(action) = self.0.take() {
      action();
    }
  }

  fn is_disposed(&self) -> bool { self.0.is_empty() }
}

// ============================================================================
// DisposableSlot
// ============================================================================

/// Atomic single-owner cell for a [`Disposable`].
pub struct DisposableSlot {
  ptr: AtomicPtr<Disposable>,
}

/// Marker address for the `DISPOSED` state. It is never dereferenced and no
/// `Box<Disposable>` allocation can live at the dangling address.
#[inline]
fn disposed_marker() -> *mut Disposable { NonNull::dangling().as_ptr() }

impl Default for DisposableSlot {
  fn default() -> Self { Self::new() }
}

impl DisposableSlot {
  pub const fn new() -> Self { Self { ptr: AtomicPtr::new(ptr::null_mut()) } }

  /// Assign the slot once.
  ///
  /// If the slot is already disposed `d` is disposed immediately. Assigning
  /// an occupied slot is a protocol violation: it is logged, `d` is disposed
  /// and the held resource is left alone. Returns `true` if `d` was stored.
  pub fn set_once(&self, d: Disposable) -> bool {
    let raw = Box::into_raw(Box::new(d));
    match self.ptr.compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire) {
      Ok(_) => true,
      Err(current) => {
        // SAFETY: `raw` was never published.
        let d = unsafe { Box::from_raw(raw) };
        if current != disposed_marker() {
          tracing::warn!("disposable slot assigned twice, disposing the late resource");
        }
        d.dispose();
        false
      }
    }
  }

  /// Swap in `d` and dispose whatever was held before.
  ///
  /// If the slot is disposed, `d` is disposed instead. Returns `true` if `d`
  /// was stored.
  pub fn replace(&self, d: Disposable) -> bool {
    match self.swap_in(d) {
      Ok(Some(prev)) => {
        prev.dispose();
        true
      }
      Ok(None) => true,
      Err(d) => {
        d.dispose();
        false
      }
    }
  }

  /// Swap in `d` without disposing the previous resource.
  ///
  /// Used when the previous resource is known to have finished already.
  /// Returns `true` if `d` was stored.
  pub fn update(&self, d: Disposable) -> bool {
    match self.swap_in(d) {
      Ok(_) => true,
      Err(d) => {
        d.dispose();
        false
      }
    }
  }

  fn swap_in(&self, d: Disposable) -> Result<Option<Disposable>, Disposable> {
    let raw = Box::into_raw(Box::new(d));
    let mut current = self.ptr.load(Ordering::Acquire);
    loop {
      if current == disposed_marker() {
        // SAFETY: `raw` was never published.
        return Err(*unsafe { Box::from_raw(raw) });
      }
      match self.ptr.compare_exchange_weak(current, raw, Ordering::AcqRel, Ordering::Acquire) {
        // SAFETY: the exchange moved ownership of `current` to us.
        Ok(prev) => return Ok((!prev.is_null()).then(|| *unsafe { Box::from_raw(prev) })),
        Err(actual) => current = actual,
      }
    }
  }

  /// Move to `DISPOSED` and dispose the held resource, exactly once.
  pub fn dispose(&self) {
    let prev = self.ptr.swap(disposed_marker(), Ordering::AcqRel);
    if !prev.is_null() && prev != disposed_marker() {
      // SAFETY: the swap moved ownership of `prev` to us.
      unsafe { Box::from_raw(prev) }.dispose();
    }
  }

  /// Clear the slot without disposing the held resource.
  ///
  /// Called once the resource has finished on its own, so that a later
  /// `dispose` is a no-op instead of a redundant cancel. A disposed slot
  /// stays disposed.
  pub fn weak_dispose(&self) {
    let mut current = self.ptr.load(Ordering::Acquire);
    while !current.is_null() && current != disposed_marker() {
      match self.ptr.compare_exchange_weak(
        current,
        ptr::null_mut(),
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(prev) => {
          // SAFETY: the exchange moved ownership of `prev` to us.
          drop(unsafe { Box::from_raw(prev) });
          return;
        }
        Err(actual) => current = actual,
      }
    }
  }

  #[inline]
  pub fn is_disposed(&self) -> bool { self.ptr.load(Ordering::Acquire) == disposed_marker() }

  /// `true` while the slot holds nothing and is not disposed.
  pub fn is_empty(&self) -> bool { self.ptr.load(Ordering::Acquire).is_null() }
}

impl Dispose for DisposableSlot {
  fn dispose(&self) { DisposableSlot::dispose(self) }

  fn is_disposed(&self) -> bool { DisposableSlot::is_disposed(self) }
}

impl Drop for DisposableSlot {
  fn drop(&mut self) {
    let raw = *self.ptr.get_mut();
    if !raw.is_null() && raw != disposed_marker() {
      // SAFETY: exclusive access; the slot owns the box.
      drop(unsafe { Box::from_raw(raw) });
    }
  }
}

impl fmt::Debug for DisposableSlot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = match self.ptr.load(Ordering::Acquire) {
      p if p.is_null() => "empty",
      p if p == disposed_marker() => "disposed",
      _ => "occupied",
    };
    f.debug_tuple("DisposableSlot").field(&state).finish()
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
  };

  use super::*;

  fn counting() -> (Disposable, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    (Disposable::from_fn(move || { c.fetch_add(1, Ordering::SeqCst); }), count)
  }

  #[rxsingle_macro::test]
  fn set_once_then_dispose() {
    let slot = DisposableSlot::new();
    let (d, count) = counting();
    assert!(slot.set_once(d));
    assert!(!slot.is_disposed());

    slot.dispose();
    slot.dispose();
    assert!(slot.is_disposed());
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[rxsingle_macro::test]
  fn set_after_dispose_disposes_immediately() {
    let slot = DisposableSlot::new();
    slot.dispose();

    let (d, count) = counting();
    assert!(!slot.set_once(d));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let (d, count) = counting();
    assert!(!slot.replace(d));
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[rxsingle_macro::test]
  fn second_set_once_is_rejected_without_panicking() {
    let slot = DisposableSlot::new();
    let (first, first_count) = counting();
    let (second, second_count) = counting();
    assert!(slot.set_once(first));
    assert!(!slot.set_once(second));

    assert_eq!(second_count.load(Ordering::SeqCst), 1);
    assert_eq!(first_count.load(Ordering::SeqCst), 0);
    slot.dispose();
    assert_eq!(first_count.load(Ordering::SeqCst), 1);
  }

  #[rxsingle_macro::test]
  fn replace_disposes_previous() {
    let slot = DisposableSlot::new();
    let (first, first_count) = counting();
    let (second, second_count) = counting();
    slot.replace(first);
    slot.replace(second);
    assert_eq!(first_count.load(Ordering::SeqCst), 1);
    assert_eq!(second_count.load(Ordering::SeqCst), 0);
  }

  #[rxsingle_macro::test]
  fn update_keeps_previous_alive() {
    let slot = DisposableSlot::new();
    let (first, first_count) = counting();
    let (second, second_count) = counting();
    slot.update(first);
    slot.update(second);
    slot.dispose();
    assert_eq!(first_count.load(Ordering::SeqCst), 0);
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
  }

  #[rxsingle_macro::test]
  fn weak_dispose_turns_later_dispose_into_noop() {
    let slot = DisposableSlot::new();
    let (d, count) = counting();
    slot.set_once(d);
    slot.weak_dispose();
    assert!(slot.is_empty());

    slot.dispose();
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(slot.is_disposed());

    // Clearing a disposed slot does not revive it.
    slot.weak_dispose();
    assert!(slot.is_disposed());
  }

  #[rxsingle_macro::test(repeat = 100)]
  fn racing_set_and_dispose_never_leaks() {
    let slot = Arc::new(DisposableSlot::new());
    let (d, count) = counting();

    let setter = {
      let slot = slot.clone();
      thread::spawn(move || slot.set_once(d))
    };
    let disposer = {
      let slot = slot.clone();
      thread::spawn(move || slot.dispose())
    };
    setter.join().unwrap();
    disposer.join().unwrap();

    assert!(slot.is_disposed());
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[rxsingle_macro::test]
  fn disposable_handles() {
    let empty = Disposable::empty();
    empty.dispose();
    assert!(!empty.is_disposed());

    let flag = Disposable::flag();
    let alias = flag.clone();
    assert!(flag.same(&alias));
    alias.dispose();
    assert!(flag.is_disposed());
    assert!(Disposable::disposed().is_disposed());
  }
}
