//! Prelude module for convenient imports

pub use crate::{
  disposable::{Disposable, DisposableSlot, Dispose},
  error::{CompositeError, Error, ErrorSlot},
  observable::{Observable, ObservableEmitter, ObservableSource},
  observer::{BoxedObserver, BoxedSingleObserver, Observer, SingleObserver},
  ops::{
    concat_eager::UNBOUNDED,
    repeat::RepeatPolicy,
    retry::{Forever, RetryPolicy},
    using::CleanupMode,
    ErrorMode,
  },
  scheduler::{Duration, NewThreadScheduler, Scheduler, TestScheduler},
  single::{Single, SingleEmitter, SingleSource},
  subject::{SingleSubject, UnicastSubject},
  testing::{TestObserver, TestSingleObserver},
};
#[cfg(feature = "futures-scheduler")]
pub use crate::scheduler::ThreadPoolScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use crate::scheduler::TokioScheduler;
