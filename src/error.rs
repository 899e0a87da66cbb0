//! Error type and the lock-free error accumulator.
//!
//! Every terminal failure in this crate is an [`Error`]. It is cheap to clone
//! (all payloads are `Arc`-backed) because multicasting coordinators such as
//! `cache` and `SingleSubject` replay the same error to many observers.
//!
//! Multiple failures are combined with [`Error::merge`], which always produces
//! a flat [`CompositeError`]: a composite is never nested inside another one.
//! [`ErrorSlot`] is the atomic cell coordinators use to accumulate errors from
//! concurrently terminating branches.

use std::{fmt, sync::Arc, time::Duration};

use arc_swap::ArcSwapOption;
use smallvec::SmallVec;

/// The error delivered through `on_error`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
  /// A failure raised by an upstream source or a user callback.
  #[error(transparent)]
  Source(Arc<dyn std::error::Error + Send + Sync + 'static>),

  /// A plain message failure.
  #[error("{0}")]
  Message(Arc<str>),

  /// Several failures reported together, flattened.
  #[error("{0}")]
  Composite(CompositeError),

  /// A `timeout` elapsed before the source signalled and no fallback was set.
  #[error("the source did not signal within {0:?}")]
  Timeout(Duration),

  /// A coordinator that needs at least one source was given none.
  #[error("no sources were provided")]
  NoSources,

  /// A repeat/retry trigger stream completed instead of requesting another
  /// subscription.
  #[error("the trigger completed without producing an element")]
  NoSuchElement,

  /// A source was used against its contract.
  #[error("protocol violation: {0}")]
  ProtocolViolation(&'static str),

  /// The source released its observer without signalling.
  #[error("the source was dropped before it signalled")]
  Abandoned,
}

impl Error {
  /// Wrap any standard error.
  pub fn new<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Source(Arc::new(err))
  }

  /// Build an error from a message.
  pub fn msg(message: impl Into<String>) -> Self { Error::Message(Arc::from(message.into())) }

  /// Combine two errors into one flat composite.
  ///
  /// If either side is already a composite its members are spliced in, so the
  /// result never contains a nested composite.
  pub fn merge(first: Error, second: Error) -> Error {
    let mut errors: SmallVec<[Error; 4]> = SmallVec::new();
    errors.extend(first.into_flat());
    errors.extend(second.into_flat());
    Error::Composite(CompositeError(errors.into_iter().collect()))
  }

  /// Combine any number of errors.
  ///
  /// Returns `None` for an empty input and the error itself for a single
  /// non-composite error.
  pub fn compose(errors: impl IntoIterator<Item = Error>) -> Option<Error> {
    errors.into_iter().fold(None, |acc, err| match acc {
      None => Some(err),
      Some(acc) => Some(Error::merge(acc, err)),
    })
  }

  /// The individual failures carried by this error.
  ///
  /// A composite yields its members, anything else yields itself.
  pub fn errors(&self) -> &[Error] {
    match self {
      Error::Composite(composite) => composite.errors(),
      other => std::slice::from_ref(other),
    }
  }

  /// `true` if this is a composite of several failures.
  pub fn is_composite(&self) -> bool { matches!(self, Error::Composite(_)) }

  fn into_flat(self) -> SmallVec<[Error; 4]> {
    match self {
      Error::Composite(composite) => composite.0.iter().cloned().collect(),
      other => smallvec::smallvec![other],
    }
  }
}

impl From<&'static str> for Error {
  fn from(message: &'static str) -> Self { Error::Message(Arc::from(message)) }
}

impl From<String> for Error {
  fn from(message: String) -> Self { Error::Message(Arc::from(message)) }
}

/// A flat list of failures.
#[derive(Debug, Clone)]
pub struct CompositeError(Arc<[Error]>);

impl CompositeError {
  pub fn errors(&self) -> &[Error] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for CompositeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} errors occurred", self.0.len())?;
    for (idx, err) in self.0.iter().enumerate() {
      write!(f, "{} {err}", if idx == 0 { ":" } else { ";" })?;
    }
    Ok(())
  }
}

// ============================================================================
// ErrorSlot
// ============================================================================

enum Accumulated {
  Error(Error),
  /// No further errors are accepted; whatever was accumulated has been handed
  /// out by `terminate`.
  Terminated,
}

/// Atomic error accumulator.
///
/// The slot is empty, holds one error (or a flat composite), or is
/// `TERMINATED`. The terminated state lets a consumer that wakes up tell
/// "finished without error" apart from "nothing happened yet".
pub struct ErrorSlot {
  state: ArcSwapOption<Accumulated>,
}

impl Default for ErrorSlot {
  fn default() -> Self { Self::new() }
}

impl ErrorSlot {
  pub fn new() -> Self { Self { state: ArcSwapOption::const_empty() } }

  /// Add an error, merging it with anything already held.
  ///
  /// Returns `false` if the slot was already terminated; the error is then
  /// not recorded and the caller owns its fate.
  pub fn add(&self, err: Error) -> bool {
    let mut current = self.state.load_full();
    loop {
      let next = match current.as_deref() {
        Some(Accumulated::Terminated) => return false,
        Some(Accumulated::Error(held)) => Error::merge(held.clone(), err.clone()),
        None => err.clone(),
      };
      let prev = self.state.compare_and_swap(&current, Some(Arc::new(Accumulated::Error(next))));
      if ptr_eq(&prev, &current) {
        return true;
      }
      current = arc_swap::Guard::into_inner(prev);
    }
  }

  /// Switch to the terminated state and return the accumulated error, if any.
  ///
  /// Only the first call observes the accumulated error; later calls return
  /// `None`.
  pub fn terminate(&self) -> Option<Error> {
    match self.state.swap(Some(Arc::new(Accumulated::Terminated))).as_deref() {
      Some(Accumulated::Error(err)) => Some(err.clone()),
      _ => None,
    }
  }

  /// Mark the slot terminated only if no error was recorded.
  ///
  /// Returns `true` if this call performed the "terminated without error"
  /// transition.
  pub fn terminate_empty(&self) -> bool {
    let prev = self
      .state
      .compare_and_swap(&None::<Arc<Accumulated>>, Some(Arc::new(Accumulated::Terminated)));
    prev.is_none()
  }

  pub fn is_terminated(&self) -> bool {
    matches!(self.state.load().as_deref(), Some(Accumulated::Terminated))
  }

  /// `true` if an error is currently held (and not yet terminated).
  pub fn has_error(&self) -> bool {
    matches!(self.state.load().as_deref(), Some(Accumulated::Error(_)))
  }

  /// A copy of the currently held error.
  pub fn get(&self) -> Option<Error> {
    match self.state.load().as_deref() {
      Some(Accumulated::Error(err)) => Some(err.clone()),
      _ => None,
    }
  }
}

fn ptr_eq(a: &Option<Arc<Accumulated>>, b: &Option<Arc<Accumulated>>) -> bool {
  match (a, b) {
    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
    (None, None) => true,
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;

  #[rxsingle_macro::test]
  fn merge_never_nests_composites() {
    let left = Error::merge("a".into(), "b".into());
    let right = Error::merge("c".into(), "d".into());
    let merged = Error::merge(left, right);

    let messages: Vec<_> = merged.errors().iter().map(ToString::to_string).collect();
    assert_eq!(messages, ["a", "b", "c", "d"]);
    assert!(merged.errors().iter().all(|e| !e.is_composite()));
  }

  #[rxsingle_macro::test]
  fn compose_keeps_single_error_unwrapped() {
    assert!(Error::compose(Vec::new()).is_none());
    let single = Error::compose([Error::msg("only")]).unwrap();
    assert!(!single.is_composite());
    assert_eq!(single.to_string(), "only");
  }

  #[rxsingle_macro::test]
  fn slot_accumulates_in_order() {
    let slot = ErrorSlot::new();
    assert!(slot.add("first".into()));
    assert!(!slot.get().unwrap().is_composite());
    assert!(slot.add("second".into()));

    let err = slot.terminate().unwrap();
    let messages: Vec<_> = err.errors().iter().map(ToString::to_string).collect();
    assert_eq!(messages, ["first", "second"]);
    assert!(slot.is_terminated());
    assert!(!slot.add("late".into()));
    assert!(slot.terminate().is_none());
  }

  #[rxsingle_macro::test]
  fn terminated_sentinel_distinguishes_empty_success() {
    let slot = ErrorSlot::new();
    assert!(!slot.is_terminated());
    assert!(slot.terminate_empty());
    assert!(slot.is_terminated());
    assert!(slot.get().is_none());

    let failed = ErrorSlot::new();
    failed.add("boom".into());
    assert!(!failed.terminate_empty());
    assert!(failed.has_error());
  }

  #[rxsingle_macro::test]
  fn concurrent_adds_are_all_kept() {
    let slot = Arc::new(ErrorSlot::new());
    let handles: Vec<_> = (0..8)
      .map(|i| {
        let slot = slot.clone();
        thread::spawn(move || {
          for j in 0..50 {
            slot.add(Error::msg(format!("{i}-{j}")));
          }
        })
      })
      .collect();
    handles.into_iter().for_each(|h| h.join().unwrap());

    assert_eq!(slot.terminate().unwrap().errors().len(), 400);
  }
}
