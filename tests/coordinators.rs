//! End-to-end checks of the coordinators through the public API.

use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Barrier, Mutex,
  },
  thread,
};

use rxsingle::prelude::*;

fn counting<T>(f: impl Fn(usize) -> Result<T, Error> + Send + Sync + 'static) -> (Single<T>, Arc<AtomicUsize>)
where
  T: Send + 'static,
{
  let calls = Arc::new(AtomicUsize::new(0));
  let c = calls.clone();
  (Single::from_fn(move || f(c.fetch_add(1, Ordering::SeqCst))), calls)
}

/// Run `a` and `b` on two threads released at the same instant.
fn race(a: impl FnOnce() + Send + 'static, b: impl FnOnce() + Send + 'static) {
  let barrier = Arc::new(Barrier::new(2));
  let other = barrier.clone();
  let h = thread::spawn(move || {
    other.wait();
    b();
  });
  barrier.wait();
  a();
  h.join().unwrap();
}

// ==================== Amb ====================

#[rxsingle_macro::test]
fn amb_delivers_one_result_and_unsubscribes_losers() {
  let subjects: Vec<SingleSubject<i32>> = (0..4).map(|_| SingleSubject::new()).collect();
  let t = Single::amb(subjects.iter().map(SingleSubject::as_single).collect()).test();
  assert!(subjects.iter().all(|s| s.observer_count() == 1));

  subjects[2].on_success(2);
  t.assert_success(2);
  assert!(subjects.iter().all(|s| s.observer_count() == 0));

  subjects[0].on_success(0);
  assert_eq!(t.terminal_count(), 1);
}

#[rxsingle_macro::test(repeat = 100)]
fn amb_concurrent_completion_race() {
  let a = SingleSubject::<()>::new();
  let b = SingleSubject::<()>::new();
  let t = Single::amb(vec![a.as_single(), b.as_single()]).test();

  let (a2, b2) = (a.clone(), b.clone());
  race(move || a2.on_success(()), move || b2.on_success(()));

  t.assert_success(());
  assert_eq!(a.observer_count(), 0);
  assert_eq!(b.observer_count(), 0);
}

#[rxsingle_macro::test]
fn amb_and_zip_reject_empty_input() {
  assert!(matches!(Single::<i32>::amb(vec![]).test().assert_error(), Error::NoSources));
  let zipped = Single::<i32>::zip(vec![], ErrorMode::Immediate, |v| Ok(v.len()));
  assert!(matches!(zipped.test().assert_error(), Error::NoSources));
}

// ==================== Zip ====================

#[rxsingle_macro::test]
fn zip_combines_in_order() {
  let subjects: Vec<SingleSubject<i32>> = (0..3).map(|_| SingleSubject::new()).collect();
  let t = Single::zip(
    subjects.iter().map(SingleSubject::as_single).collect(),
    ErrorMode::Immediate,
    |values| Ok(values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")),
  )
  .test();
  subjects[2].on_success(3);
  subjects[0].on_success(1);
  t.assert_no_terminal();
  subjects[1].on_success(2);
  t.assert_success("1,2,3".to_owned());
}

#[rxsingle_macro::test]
fn zip_fail_fast_and_delayed() {
  let subjects: Vec<SingleSubject<i32>> = (0..3).map(|_| SingleSubject::new()).collect();
  let sources = || subjects.iter().map(SingleSubject::as_single).collect::<Vec<_>>();

  let fast = Single::zip(sources(), ErrorMode::Immediate, |v| Ok(v.len())).test();
  subjects[1].on_error("middle".into());
  fast.assert_error_msg("middle");
  assert_eq!(subjects[0].observer_count(), 0);
  assert_eq!(subjects[2].observer_count(), 0);

  let others: Vec<SingleSubject<i32>> = (0..3).map(|_| SingleSubject::new()).collect();
  let delayed = Single::zip(
    others.iter().map(SingleSubject::as_single).collect(),
    ErrorMode::Delayed,
    |v| Ok(v.len()),
  )
  .test();
  others[0].on_error("a".into());
  others[2].on_error("c".into());
  delayed.assert_no_terminal();
  others[1].on_success(1);
  let err = delayed.assert_error();
  assert_eq!(err.errors().len(), 2);
}

// ==================== Cache ====================

#[rxsingle_macro::test]
fn cache_runs_side_effect_once_for_all_subscribers() {
  let (source, calls) = counting(|n| Ok(n + 100));
  let cached = source.cache();

  let handles: Vec<_> = (0..3)
    .map(|_| {
      let cached = cached.clone();
      thread::spawn(move || cached.test())
    })
    .collect();
  for h in handles {
    h.join().unwrap().assert_success(100);
  }
  cached.test().assert_success(100);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ==================== ConcatEager ====================

#[rxsingle_macro::test]
fn concat_eager_sequential_with_one_slot() {
  let subjects: Vec<SingleSubject<i32>> = (0..3).map(|_| SingleSubject::new()).collect();
  let t = Single::concat_eager(subjects.iter().map(SingleSubject::as_single).collect(), 1, ErrorMode::Immediate)
    .test();
  for (i, s) in subjects.iter().enumerate() {
    assert_eq!(s.observer_count(), 1, "source {i} should be the only one subscribed");
    assert!(subjects[i + 1..].iter().all(|s| !s.has_observers()));
    s.on_success(i as i32);
  }
  t.assert_values(&[0, 1, 2]).assert_complete();
}

#[rxsingle_macro::test]
fn concat_eager_all_at_once_keeps_order() {
  let subjects: Vec<SingleSubject<i32>> = (0..5).map(|_| SingleSubject::new()).collect();
  let t = Single::concat_eager(subjects.iter().map(SingleSubject::as_single).collect(), 5, ErrorMode::Immediate)
    .test();
  assert!(subjects.iter().all(SingleSubject::has_observers));

  for i in [4, 1, 3, 0, 2] {
    subjects[i].on_success(i as i32);
  }
  t.assert_values(&[0, 1, 2, 3, 4]).assert_complete();
}

#[rxsingle_macro::test(repeat = 20)]
fn concat_eager_completions_from_many_threads() {
  let subjects: Vec<SingleSubject<usize>> = (0..8).map(|_| SingleSubject::new()).collect();
  let t = Single::concat_eager(subjects.iter().map(SingleSubject::as_single).collect(), UNBOUNDED, ErrorMode::Immediate)
    .test();

  let handles: Vec<_> = subjects
    .into_iter()
    .enumerate()
    .map(|(i, s)| thread::spawn(move || s.on_success(i)))
    .collect();
  handles.into_iter().for_each(|h| h.join().unwrap());

  assert!(t.await_done(Duration::from_secs(5)));
  t.assert_values(&[0, 1, 2, 3, 4, 5, 6, 7]).assert_complete();
}

// ==================== Retry / Repeat ====================

#[rxsingle_macro::test]
fn retry_count_invokes_count_plus_one_times() {
  for i in [0, 1, 3, 10] {
    let (source, calls) = counting(|_| -> Result<i32, Error> { Err(Error::msg("always")) });
    source.retry_times(i).test().assert_error_msg("always");
    assert_eq!(calls.load(Ordering::SeqCst), i + 1);
  }
}

#[rxsingle_macro::test]
fn unbounded_retry_after_five_failures() {
  let (source, calls) = counting(|n| if n < 5 { Err(Error::msg("not yet")) } else { Ok(n) });
  source.retry(Forever).test().assert_success(5);
  assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[rxsingle_macro::test]
fn retry_across_threads() {
  let (inner, calls) = counting(|n| if n < 3 { Err(Error::msg("busy")) } else { Ok(n) });
  let t = inner
    .delay_subscription(Duration::from_millis(1), NewThreadScheduler)
    .retry(Forever)
    .test();
  assert!(t.await_done(Duration::from_secs(5)));
  t.assert_success(3);
  assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[rxsingle_macro::test]
fn repeat_emits_each_round() {
  let (source, calls) = counting(Ok);
  source.repeat_times(4).test().assert_values(&[0, 1, 2, 3]).assert_complete();
  assert_eq!(calls.load(Ordering::SeqCst), 4);
}

// ==================== Timeout ====================

#[rxsingle_macro::test]
fn timeout_fallback_subscribed_once() {
  let scheduler = TestScheduler::new();
  let (fallback, calls) = counting(|_| Ok(-1));
  let subject = SingleSubject::new();
  let t = subject
    .as_single()
    .timeout_with(Duration::from_millis(5), scheduler.clone(), fallback)
    .test();
  scheduler.advance_by(Duration::from_millis(5));
  subject.on_success(1);
  t.assert_success(-1);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rxsingle_macro::test(repeat = 200)]
fn timeout_timer_and_source_race_on_separate_threads() {
  let (fallback, calls) = counting(|_| Ok(-1));
  let subject = SingleSubject::new();
  let t = subject
    .as_single()
    .timeout_with(Duration::ZERO, NewThreadScheduler, fallback)
    .test();
  let s = subject.clone();
  let source = thread::spawn(move || s.on_success(1));

  assert!(t.await_done(Duration::from_secs(5)));
  source.join().unwrap();
  // Let the losing timer thread run to the end.
  thread::sleep(Duration::from_millis(2));

  assert_eq!(t.terminal_count(), 1);
  let fallbacks = calls.load(Ordering::SeqCst);
  match t.value() {
    Some(1) => assert_eq!(fallbacks, 0),
    Some(-1) => assert_eq!(fallbacks, 1),
    other => panic!("unexpected outcome: {other:?}"),
  }
}

// ==================== Using ====================

#[rxsingle_macro::test]
fn using_eager_and_lazy_cleanup_ordering() {
  for (mode, expected) in [(CleanupMode::Eager, 0), (CleanupMode::Lazy, 1)] {
    let delivered = Arc::new(AtomicUsize::new(0));
    let seen_at_cleanup = Arc::new(Mutex::new(None));
    let (d, s) = (delivered.clone(), seen_at_cleanup.clone());

    Single::using(
      || Ok(()),
      |_| Ok(Single::just(1)),
      move |_| {
        *s.lock().unwrap() = Some(d.load(Ordering::SeqCst));
        Ok(())
      },
      mode,
    )
    .subscribe(
      {
        let delivered = delivered.clone();
        move |_| {
          delivered.fetch_add(1, Ordering::SeqCst);
        }
      },
      |_| {},
    );

    assert_eq!(*seen_at_cleanup.lock().unwrap(), Some(expected), "{mode:?}");
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
  }
}

#[rxsingle_macro::test]
fn using_cleanup_failure_asymmetry() {
  let build = |mode| {
    Single::using(
      || Ok(()),
      |_| Ok(Single::just(1)),
      |_| Err(Error::msg("cleanup failed")),
      mode,
    )
  };
  build(CleanupMode::Eager).test().assert_error_msg("cleanup failed");
  build(CleanupMode::Lazy).test().assert_success(1);
}

// ==================== Cancellation ====================

#[rxsingle_macro::test]
fn dispose_before_signal_means_no_delivery() {
  let subject = SingleSubject::<i32>::new();
  let scheduler = TestScheduler::new();
  let observers = [
    Single::amb(vec![subject.as_single(), Single::never()]).test(),
    Single::zip(vec![subject.as_single()], ErrorMode::Immediate, |v| Ok(v[0])).test(),
    subject.as_single().cache().test(),
    subject.as_single().retry(Forever).test(),
    subject.as_single().timeout(Duration::from_secs(1), scheduler.clone()).test(),
  ];
  observers.iter().for_each(TestSingleObserver::dispose);

  subject.on_success(1);
  scheduler.flush();
  for t in &observers {
    t.assert_no_terminal();
  }
}
