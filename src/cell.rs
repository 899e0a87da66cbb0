//! Lock-free ownership cells.

use std::{
  marker::PhantomData,
  ptr,
  sync::atomic::{AtomicPtr, Ordering},
};

/// A cell holding at most one owned value, moved in and out atomically.
///
/// Coordinators park their downstream observer here: whichever thread manages
/// to `take` it is the only one that can deliver the terminal signal.
pub struct TakeCell<T> {
  ptr: AtomicPtr<T>,
  _owns: PhantomData<Box<T>>,
}

// SAFETY: the value is only ever reachable by the single thread that swapped
// its pointer out, so sharing the cell only requires the value to be `Send`.
unsafe impl<T: Send> Send for TakeCell<T> {}
unsafe impl<T: Send> Sync for TakeCell<T> {}

impl<T> Default for TakeCell<T> {
  fn default() -> Self { Self::empty() }
}

impl<T> TakeCell<T> {
  pub fn new(value: T) -> Self {
    Self { ptr: AtomicPtr::new(Box::into_raw(Box::new(value))), _owns: PhantomData }
  }

  pub const fn empty() -> Self { Self { ptr: AtomicPtr::new(ptr::null_mut()), _owns: PhantomData } }

  /// Move the value out, leaving the cell empty.
  pub fn take(&self) -> Option<T> {
    let raw = self.ptr.swap(ptr::null_mut(), Ordering::AcqRel);
    // SAFETY: non-null pointers in the cell always come from `Box::into_raw`
    // and the swap transferred exclusive ownership to us.
    (!raw.is_null()).then(|| *unsafe { Box::from_raw(raw) })
  }

  /// Store a value, returning whatever was held before.
  pub fn put(&self, value: T) -> Option<T> {
    let raw = self.ptr.swap(Box::into_raw(Box::new(value)), Ordering::AcqRel);
    // SAFETY: see `take`.
    (!raw.is_null()).then(|| *unsafe { Box::from_raw(raw) })
  }

  /// Store a value only if the cell is empty; otherwise hand it back.
  pub fn put_if_empty(&self, value: T) -> Result<(), T> {
    let raw = Box::into_raw(Box::new(value));
    match self.ptr.compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire) {
      Ok(_) => Ok(()),
      // SAFETY: `raw` was never published.
      Err(_) => Err(*unsafe { Box::from_raw(raw) }),
    }
  }

  pub fn is_empty(&self) -> bool { self.ptr.load(Ordering::Acquire).is_null() }
}

impl<T> Drop for TakeCell<T> {
  fn drop(&mut self) {
    let raw = *self.ptr.get_mut();
    if !raw.is_null() {
      // SAFETY: we have `&mut self`, nobody else can observe the pointer.
      drop(unsafe { Box::from_raw(raw) });
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread};

  use super::*;

  #[rxsingle_macro::test]
  fn take_is_exactly_once() {
    let cell = TakeCell::new(String::from("v"));
    assert!(!cell.is_empty());
    assert_eq!(cell.take().as_deref(), Some("v"));
    assert_eq!(cell.take(), None);
    assert!(cell.is_empty());
  }

  #[rxsingle_macro::test]
  fn put_if_empty_rejects_second_value() {
    let cell = TakeCell::empty();
    assert!(cell.put_if_empty(1).is_ok());
    assert_eq!(cell.put_if_empty(2), Err(2));
    assert_eq!(cell.put(3), Some(1));
    assert_eq!(cell.take(), Some(3));
  }

  #[rxsingle_macro::test(repeat = 50)]
  fn racing_takers_get_one_value() {
    let cell = Arc::new(TakeCell::new(7));
    let handles: Vec<_> = (0..4)
      .map(|_| {
        let cell = cell.clone();
        thread::spawn(move || cell.take())
      })
      .collect();
    let taken: Vec<_> = handles.into_iter().filter_map(|h| h.join().unwrap()).collect();
    assert_eq!(taken, vec![7]);
  }
}
