//! Unbounded lock-free single-producer/single-consumer queue.
//!
//! Items live in fixed-size segments linked forward. The producer owns the
//! tail cursor and the consumer owns the head cursor; the only fields both
//! sides touch are the per-slot `ready` flags, the `next` links and the two
//! counters used by `is_empty`, and every such access is an acquire load
//! paired with a release store. A segment is never revisited once the
//! consumer moves past it, at which point the consumer frees it.
//!
//! ```rust
//! use rxsingle::queue;
//!
//! let (mut tx, mut rx) = queue::channel();
//! tx.offer(1);
//! tx.offer(2);
//! assert_eq!(rx.poll(), Some(1));
//! assert_eq!(rx.poll(), Some(2));
//! assert!(rx.is_empty());
//! ```

use std::{
  cell::UnsafeCell,
  mem::MaybeUninit,
  ptr,
  sync::{
    atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering},
    Arc,
  },
};

/// Number of slots per segment.
pub const SEGMENT_CAPACITY: usize = 32;

struct Slot<T> {
  ready: AtomicBool,
  value: UnsafeCell<MaybeUninit<T>>,
}

struct Segment<T> {
  slots: [Slot<T>; SEGMENT_CAPACITY],
  next: AtomicPtr<Segment<T>>,
}

impl<T> Segment<T> {
  fn alloc() -> *mut Segment<T> {
    Box::into_raw(Box::new(Segment {
      slots: std::array::from_fn(|_| Slot {
        ready: AtomicBool::new(false),
        value: UnsafeCell::new(MaybeUninit::uninit()),
      }),
      next: AtomicPtr::new(ptr::null_mut()),
    }))
  }
}

struct Shared<T> {
  /// Items offered so far. Written by the producer only.
  offered: AtomicUsize,
  /// Items polled or cleared so far. Written by the consumer only.
  polled: AtomicUsize,
  /// First segment still owned by the consumer; used to free what is left
  /// when both halves are gone.
  head: AtomicPtr<Segment<T>>,
  head_index: AtomicUsize,
}

// SAFETY: slot values are handed from the producer to the consumer through
// the release/acquire `ready` flags; no slot is accessed by both at once.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
  fn drop(&mut self) {
    let mut segment = *self.head.get_mut();
    let mut index = *self.head_index.get_mut();
    while !segment.is_null() {
      // SAFETY: both halves are gone, so we own every remaining segment.
      let mut owned = unsafe { Box::from_raw(segment) };
      for slot in &mut owned.slots[index..] {
        if *slot.ready.get_mut() {
          // SAFETY: `ready` means the slot holds an initialized, unpolled value.
          unsafe { slot.value.get_mut().assume_init_drop() };
        }
      }
      segment = *owned.next.get_mut();
      index = 0;
    }
  }
}

/// Create a connected producer/consumer pair.
pub fn channel<T>() -> (Producer<T>, Consumer<T>) {
  let first = Segment::alloc();
  let shared = Arc::new(Shared {
    offered: AtomicUsize::new(0),
    polled: AtomicUsize::new(0),
    head: AtomicPtr::new(first),
    head_index: AtomicUsize::new(0),
  });
  let producer = Producer { shared: shared.clone(), tail: first, tail_index: 0 };
  let consumer = Consumer { shared, head: first, head_index: 0 };
  (producer, consumer)
}

/// The producing half. Not `Clone`: there is exactly one producer.
pub struct Producer<T> {
  shared: Arc<Shared<T>>,
  tail: *mut Segment<T>,
  tail_index: usize,
}

// SAFETY: `tail` points into memory kept alive by `shared`; the producer is
// the only writer of the slots past the consumer's cursor.
unsafe impl<T: Send> Send for Producer<T> {}

impl<T> Producer<T> {
  /// Append an item. Never blocks and never fails.
  pub fn offer(&mut self, item: T) {
    if self.tail_index == SEGMENT_CAPACITY {
      let next = Segment::alloc();
      // SAFETY: `tail` stays valid until the consumer has moved past it,
      // which cannot happen before the link below is published.
      unsafe { (*self.tail).next.store(next, Ordering::Release) };
      self.tail = next;
      self.tail_index = 0;
    }
    // SAFETY: the slot at `tail_index` has never been written and is not
    // read by the consumer until `ready` is set.
    let slot = unsafe { &(*self.tail).slots[self.tail_index] };
    unsafe { (*slot.value.get()).write(item) };
    // Count before publishing, so `polled` never overtakes `offered`.
    self.shared.offered.fetch_add(1, Ordering::Release);
    slot.ready.store(true, Ordering::Release);
    self.tail_index += 1;
  }
}

/// The consuming half. Not `Clone`: there is exactly one consumer.
pub struct Consumer<T> {
  shared: Arc<Shared<T>>,
  head: *mut Segment<T>,
  head_index: usize,
}

// SAFETY: see `Producer`.
unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Consumer<T> {
  /// Take the oldest item, or `None` if nothing is visible yet.
  pub fn poll(&mut self) -> Option<T> {
    if self.head_index == SEGMENT_CAPACITY {
      // End of this segment: follow the link once it is published.
      // SAFETY: `head` is owned by the consumer until freed here.
      let next = unsafe { (*self.head).next.load(Ordering::Acquire) };
      if next.is_null() {
        return None;
      }
      // SAFETY: the producer moved on to `next` before publishing it and
      // never touches this segment again.
      drop(unsafe { Box::from_raw(self.head) });
      self.head = next;
      self.head_index = 0;
      self.shared.head.store(next, Ordering::Release);
    }
    // SAFETY: `head` is valid; the value is initialized once `ready` is seen.
    let slot = unsafe { &(*self.head).slots[self.head_index] };
    if !slot.ready.load(Ordering::Acquire) {
      return None;
    }
    let item = unsafe { (*slot.value.get()).assume_init_read() };
    // The slot is never reused; clearing `ready` keeps `Shared::drop` from
    // dropping the moved-out value.
    slot.ready.store(false, Ordering::Relaxed);
    self.head_index += 1;
    self.shared.head_index.store(self.head_index, Ordering::Relaxed);
    self.shared.polled.fetch_add(1, Ordering::Release);
    Some(item)
  }

  /// `true` if every offered item has been consumed.
  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Number of items currently queued, counting one that is still being
  /// written.
  pub fn len(&self) -> usize {
    let polled = self.shared.polled.load(Ordering::Acquire);
    self.shared.offered.load(Ordering::Acquire).saturating_sub(polled)
  }

  /// Drop every visible item.
  pub fn clear(&mut self) { while self.poll().is_some() {} }
}

#[cfg(test)]
mod tests {
  use std::{sync::atomic::AtomicUsize, thread};

  use super::*;

  #[rxsingle_macro::test]
  fn fifo_across_segments() {
    let (mut tx, mut rx) = channel();
    for i in 0..(SEGMENT_CAPACITY * 3 + 5) {
      tx.offer(i);
    }
    assert_eq!(rx.len(), SEGMENT_CAPACITY * 3 + 5);
    for i in 0..(SEGMENT_CAPACITY * 3 + 5) {
      assert_eq!(rx.poll(), Some(i));
    }
    assert_eq!(rx.poll(), None);
    assert!(rx.is_empty());
  }

  #[rxsingle_macro::test]
  fn poll_at_segment_boundary_before_link() {
    let (mut tx, mut rx) = channel();
    for i in 0..SEGMENT_CAPACITY {
      tx.offer(i);
    }
    while rx.poll().is_some() {}
    assert_eq!(rx.poll(), None);
    tx.offer(99);
    assert_eq!(rx.poll(), Some(99));
  }

  #[rxsingle_macro::test]
  fn clear_drains_everything() {
    let (mut tx, mut rx) = channel();
    (0..100).for_each(|i| tx.offer(i));
    rx.clear();
    assert!(rx.is_empty());
    assert_eq!(rx.poll(), None);
  }

  #[rxsingle_macro::test]
  fn unconsumed_items_are_dropped_once() {
    struct Counted(Arc<AtomicUsize>);
    impl Drop for Counted {
      fn drop(&mut self) { self.0.fetch_add(1, Ordering::SeqCst); }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let (mut tx, mut rx) = channel();
    for _ in 0..(SEGMENT_CAPACITY + 10) {
      tx.offer(Counted(drops.clone()));
    }
    for _ in 0..5 {
      drop(rx.poll());
    }
    assert_eq!(drops.load(Ordering::SeqCst), 5);
    drop(tx);
    drop(rx);
    assert_eq!(drops.load(Ordering::SeqCst), SEGMENT_CAPACITY + 10);
  }

  #[rxsingle_macro::test]
  fn cross_thread_order_is_preserved() {
    const N: usize = 100_000;
    let (mut tx, mut rx) = channel();
    let producer = thread::spawn(move || (0..N).for_each(|i| tx.offer(i)));

    let mut expected = 0;
    while expected < N {
      if let Some(v) = rx.poll() {
        assert_eq!(v, expected);
        expected += 1;
      } else {
        thread::yield_now();
      }
    }
    producer.join().unwrap();
    assert!(rx.is_empty());
  }

  #[rxsingle_macro::test(repeat = 20)]
  fn len_never_exceeds_offered_while_racing() {
    const N: usize = 10_000;
    let (mut tx, mut rx) = channel();
    let producer = thread::spawn(move || (0..N).for_each(|i| tx.offer(i)));

    let mut seen = 0;
    while seen < N {
      assert!(rx.len() <= N - seen);
      if rx.poll().is_some() {
        seen += 1;
        assert!(rx.len() <= N - seen);
      }
    }
    producer.join().unwrap();
    assert_eq!(rx.len(), 0);
  }
}
