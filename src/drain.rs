//! Work-in-progress counter used as a drain trampoline.
//!
//! Any thread may signal "there is work" by calling [`Wip::enter`]. Only the
//! call that moves the counter from 0 to 1 gets `true` and becomes the drain
//! owner; everybody else just leaves their increment behind. The owner loops
//! until [`Wip::leave`] reports that no increment was missed, which collapses
//! arbitrarily deep synchronous re-entry into a single stack frame and keeps
//! at most one thread inside the coordination logic at any instant.

use std::{
  cell::UnsafeCell,
  sync::atomic::{AtomicUsize, Ordering},
};

#[derive(Debug, Default)]
pub struct Wip(AtomicUsize);

impl Wip {
  pub const fn new() -> Self { Wip(AtomicUsize::new(0)) }

  /// Record one unit of work. Returns `true` if the caller became the owner.
  #[inline]
  pub fn enter(&self) -> bool { self.0.fetch_add(1, Ordering::AcqRel) == 0 }

  /// Become the owner only if nobody else holds or has requested the drain.
  ///
  /// Unlike `enter`, a failed claim leaves no work behind.
  #[inline]
  pub fn claim(&self) -> bool { self.0.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire).is_ok() }

  /// Retire `missed` units of work and return how many arrived meanwhile.
  ///
  /// The owner keeps draining while the result is non-zero.
  #[inline]
  pub fn leave(&self, missed: usize) -> usize { self.0.fetch_sub(missed, Ordering::AcqRel) - missed }

  /// Run `step` once for every unit of work, trampolining re-entrant calls.
  ///
  /// A call made from inside `step` returns immediately; its step runs on the
  /// next iteration of the outermost call.
  pub fn trampoline(&self, mut step: impl FnMut()) {
    if !self.enter() {
      return;
    }
    loop {
      step();
      if self.leave(1) == 0 {
        break;
      }
    }
  }

  pub fn is_idle(&self) -> bool { self.0.load(Ordering::Acquire) == 0 }
}

/// State that only the current [`Wip`] owner may touch.
///
/// The `Wip` counter's acquire/release transitions order every owner's
/// accesses after the previous owner's, which is what makes handing out
/// `&mut T` from `&self` sound.
pub struct DrainCell<T>(UnsafeCell<T>);

// SAFETY: access is serialized by the owning `Wip`, see `get`.
unsafe impl<T: Send> Sync for DrainCell<T> {}

impl<T> DrainCell<T> {
  pub fn new(value: T) -> Self { DrainCell(UnsafeCell::new(value)) }

  /// # Safety
  ///
  /// The caller must currently own the drain this cell belongs to, and must
  /// not hold the returned reference beyond that ownership.
  #[allow(clippy::mut_from_ref)]
  #[inline]
  pub unsafe fn get(&self) -> &mut T { &mut *self.0.get() }
}

#[cfg(test)]
mod tests {
  use std::{cell::Cell, sync::Arc, thread};

  use super::*;

  #[rxsingle_macro::test]
  fn only_first_enter_owns() {
    let wip = Wip::new();
    assert!(wip.enter());
    assert!(!wip.enter());
    assert!(!wip.enter());
    assert_eq!(wip.leave(1), 2);
    assert_eq!(wip.leave(2), 0);
    assert!(wip.is_idle());
  }

  #[rxsingle_macro::test]
  fn trampoline_flattens_recursion() {
    let wip = Wip::new();
    let depth = Cell::new(0);
    let max_depth = Cell::new(0);
    let runs = Cell::new(0);

    fn step(wip: &Wip, depth: &Cell<usize>, max_depth: &Cell<usize>, runs: &Cell<usize>) {
      wip.trampoline(|| {
        depth.set(depth.get() + 1);
        max_depth.set(max_depth.get().max(depth.get()));
        runs.set(runs.get() + 1);
        if runs.get() < 10_000 {
          step(wip, depth, max_depth, runs);
        }
        depth.set(depth.get() - 1);
      });
    }

    step(&wip, &depth, &max_depth, &runs);
    assert_eq!(runs.get(), 10_000);
    assert_eq!(max_depth.get(), 1);
    assert!(wip.is_idle());
  }

  #[rxsingle_macro::test(repeat = 20)]
  fn concurrent_work_is_never_lost() {
    let wip = Arc::new(Wip::new());
    let cell = Arc::new(DrainCell::new(0usize));

    let handles: Vec<_> = (0..4)
      .map(|_| {
        let wip = wip.clone();
        let cell = cell.clone();
        thread::spawn(move || {
          for _ in 0..1000 {
            // SAFETY: the closure only runs while this thread owns `wip`.
            wip.trampoline(|| unsafe { *cell.get() += 1 });
          }
        })
      })
      .collect();
    handles.into_iter().for_each(|h| h.join().unwrap());

    assert!(wip.is_idle());
    // SAFETY: every worker has been joined.
    assert_eq!(unsafe { *cell.get() }, 4000);
  }
}
