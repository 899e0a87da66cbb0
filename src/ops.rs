//! Operators and coordinators.
//!
//! Each submodule holds one operator: its source type, the observers it
//! subscribes upstream, and its tests. The user-facing methods live on
//! [`Single`](crate::single::Single) and
//! [`Observable`](crate::observable::Observable).

pub mod amb;
pub mod cache;
pub mod concat_eager;
pub mod delay_subscription;
pub mod filter;
pub mod into_future;
pub mod map;
pub mod redo_when;
pub mod repeat;
pub mod retry;
pub mod take;
pub mod timeout;
pub mod using;
pub mod zip;

/// How a coordinator over several sources reacts to a failing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
  /// Fail fast: cancel every other source and forward the first error.
  #[default]
  Immediate,
  /// Let every source finish, then forward all errors as one composite.
  Delayed,
}
