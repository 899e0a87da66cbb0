//! # rxsingle: lock-free single-result reactive sources
//!
//! A [`Single`] delivers `on_subscribe` once and then exactly one of
//! `on_success` / `on_error`. This crate provides that protocol plus the
//! coordinators that combine such sources without taking a lock:
//!
//! ```rust
//! use rxsingle::prelude::*;
//!
//! let fast = Single::just(1);
//! let slow = Single::never();
//! Single::amb(vec![slow, fast]).test().assert_success(1);
//!
//! Single::zip(vec![Single::just(2), Single::just(3)], ErrorMode::Immediate, |v| Ok(v.iter().product::<i32>()))
//!   .test()
//!   .assert_success(6);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Single`] | Cloneable handle to a single-result source, carries the operators |
//! | [`Observable`] | Multi-item stream produced by `repeat` and `concat_eager` |
//! | [`SingleObserver`] / [`Observer`] | Consumers; terminal methods take `self` |
//! | [`Disposable`] | Cancellation handle handed out through `on_subscribe` |
//! | [`DisposableSlot`] | Atomic single-owner slot every coordinator is built on |
//!
//! ## Coordinators
//!
//! `amb`, `zip`, `concat_eager`, `cache`, `retry` / `repeat` and their
//! `..._when` forms, `timeout`, `using`. All of them accept sources that
//! signal synchronously on the subscribing thread or later on any other
//! thread.
//!
//! ## Feature Flags
//!
//! - **`futures-scheduler`** (default): `ThreadPoolScheduler` on the
//!   `futures` thread pool
//! - **`tokio-scheduler`**: `TokioScheduler` on a tokio runtime
//!
//! [`Single`]: single::Single
//! [`Observable`]: observable::Observable
//! [`SingleObserver`]: observer::SingleObserver
//! [`Observer`]: observer::Observer
//! [`Disposable`]: disposable::Disposable
//! [`DisposableSlot`]: disposable::DisposableSlot

pub mod cell;
pub mod disposable;
pub mod drain;
pub mod error;
pub mod observable;
pub mod observer;
pub mod ops;
pub mod prelude;
pub mod queue;
pub mod scheduler;
pub mod serializer;
pub mod single;
pub mod subject;
pub mod testing;

pub use prelude::*;

#[cfg(doctest)]
mod __markdown_doctests {
  #![doc = include_str!("../README.md")]
}
