//! End-to-end shutdown, budget, and teardown tests.

use seqpool::test_utils::init_test_logging;
use seqpool::{PoolObserver, SequencedPool, SequencedPoolHandle, ShutdownBehavior};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Polls `condition` until it holds or `deadline` elapses.
fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn shutdown_waits_for_block_shutdown_tasks() {
    init_test_logging();
    seqpool::test_phase!("shutdown_waits_for_block_shutdown_tasks");

    let pool = SequencedPool::new(2, "sd-block");
    let done = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&done);
    assert!(pool.post(move || {
        thread::sleep(Duration::from_millis(150));
        flag.store(true, Ordering::SeqCst);
    }));

    pool.shutdown();
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(pool.pending_count(), 0);
    seqpool::test_complete!("shutdown_waits_for_block_shutdown_tasks");
}

/// Dropped when its owning closure is destroyed. Posting from a destructor
/// exercises the discard-outside-the-lock rule.
struct DiscardProbe {
    handle: SequencedPoolHandle,
    dropped: Arc<AtomicBool>,
    /// 0 = not attempted, 1 = accepted, 2 = rejected.
    post_result: Arc<AtomicU8>,
}

impl Drop for DiscardProbe {
    fn drop(&mut self) {
        let accepted = self
            .handle
            .post_with_shutdown_behavior(ShutdownBehavior::SkipOnShutdown, || {});
        self.post_result
            .store(if accepted { 1 } else { 2 }, Ordering::SeqCst);
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[test]
fn skip_on_shutdown_pending_task_is_discarded_without_running() {
    init_test_logging();
    seqpool::test_phase!("skip_on_shutdown_pending_task_is_discarded_without_running");

    let pool = SequencedPool::new(1, "sd-skip");
    let ran = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));
    let post_result = Arc::new(AtomicU8::new(0));

    // Occupy the single worker so the skip task stays pending.
    assert!(pool.post(|| {
        thread::sleep(Duration::from_millis(150));
    }));

    let probe = DiscardProbe {
        handle: pool.handle(),
        dropped: Arc::clone(&dropped),
        post_result: Arc::clone(&post_result),
    };
    let ran_flag = Arc::clone(&ran);
    assert!(
        pool.post_with_shutdown_behavior(ShutdownBehavior::SkipOnShutdown, move || {
            let _probe = &probe;
            ran_flag.store(true, Ordering::SeqCst);
        })
    );

    pool.shutdown();
    // The discard is dropped by the exiting worker with the lock released,
    // which may complete slightly after shutdown() returns.
    assert!(
        wait_until(Duration::from_secs(5), || dropped.load(Ordering::SeqCst)),
        "skip task must be destroyed"
    );
    assert!(!ran.load(Ordering::SeqCst), "skip task must not run");
    assert_eq!(
        post_result.load(Ordering::SeqCst),
        2,
        "post from the discarded closure's destructor must be rejected"
    );
    seqpool::test_complete!("skip_on_shutdown_pending_task_is_discarded_without_running");
}

#[test]
fn continue_on_shutdown_does_not_block_shutdown() {
    init_test_logging();
    seqpool::test_phase!("continue_on_shutdown_does_not_block_shutdown");

    let pool = SequencedPool::new(1, "sd-continue");
    let started = Arc::new(AtomicBool::new(false));
    let stop_gate = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let s = Arc::clone(&started);
    let gate = Arc::clone(&stop_gate);
    let f = Arc::clone(&finished);
    assert!(
        pool.post_with_shutdown_behavior(ShutdownBehavior::ContinueOnShutdown, move || {
            s.store(true, Ordering::SeqCst);
            let start = Instant::now();
            while !gate.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(5) {
                thread::sleep(Duration::from_millis(2));
            }
            f.store(true, Ordering::SeqCst);
        })
    );
    assert!(wait_until(Duration::from_secs(5), || {
        started.load(Ordering::SeqCst)
    }));

    let shutdown_started = Instant::now();
    pool.shutdown();
    assert!(
        shutdown_started.elapsed() < Duration::from_secs(1),
        "shutdown must not wait for a ContinueOnShutdown task"
    );
    assert!(!finished.load(Ordering::SeqCst));

    stop_gate.store(true, Ordering::SeqCst);
    drop(pool);
    assert!(finished.load(Ordering::SeqCst), "drop joins the worker");
    seqpool::test_complete!("continue_on_shutdown_does_not_block_shutdown");
}

#[test]
fn post_after_shutdown_respects_budget() {
    init_test_logging();
    seqpool::test_phase!("post_after_shutdown_respects_budget");

    let pool = SequencedPool::new(1, "sd-budget");
    pool.shutdown_with_budget(2);

    // Blocking posts are admitted up to the budget.
    assert!(pool.post(|| {}));
    assert!(pool.post(|| {}));
    assert!(!pool.post(|| {}));

    // Non-blocking work is always rejected once shutdown started.
    assert!(!pool.post_delayed(Duration::from_millis(10), || {}));
    assert!(!pool.post_with_shutdown_behavior(ShutdownBehavior::SkipOnShutdown, || {}));
    assert!(!pool.post_with_shutdown_behavior(ShutdownBehavior::ContinueOnShutdown, || {}));
    seqpool::test_complete!("post_after_shutdown_respects_budget");
}

#[test]
fn worker_running_non_blocking_task_cannot_post_blocking_work_during_shutdown() {
    init_test_logging();
    seqpool::test_phase!("worker_running_non_blocking_task_cannot_post_blocking_work_during_shutdown");

    let pool = SequencedPool::new(1, "sd-descend");
    let started = Arc::new(AtomicBool::new(false));
    let post_result = Arc::new(AtomicU8::new(0));

    let s = Arc::clone(&started);
    let result = Arc::clone(&post_result);
    let handle = pool.handle();
    assert!(
        pool.post_with_shutdown_behavior(ShutdownBehavior::SkipOnShutdown, move || {
            s.store(true, Ordering::SeqCst);
            let start = Instant::now();
            while !handle.is_shutdown_in_progress() && start.elapsed() < Duration::from_secs(5) {
                thread::sleep(Duration::from_millis(2));
            }
            // Caller is a worker running a SkipOnShutdown task: rejected even
            // though the budget would allow new blocking work.
            let accepted = handle.post(|| {});
            result.store(if accepted { 1 } else { 2 }, Ordering::SeqCst);
        })
    );
    assert!(wait_until(Duration::from_secs(5), || {
        started.load(Ordering::SeqCst)
    }));

    pool.shutdown_with_budget(5);
    assert_eq!(post_result.load(Ordering::SeqCst), 2);
    seqpool::test_complete!("worker_running_non_blocking_task_cannot_post_blocking_work_during_shutdown");
}

#[test]
fn drop_after_shutdown_joins_workers() {
    init_test_logging();
    seqpool::test_phase!("drop_after_shutdown_joins_workers");

    let pool = SequencedPool::new(2, "sd-drop");
    let started = Arc::new(AtomicBool::new(false));
    let post_result = Arc::new(AtomicU8::new(0));

    let s = Arc::clone(&started);
    let result = Arc::clone(&post_result);
    let handle = pool.handle();
    assert!(pool.post(move || {
        s.store(true, Ordering::SeqCst);
        let start = Instant::now();
        while !handle.is_shutdown_in_progress() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(2));
        }
        let accepted =
            handle.post_with_shutdown_behavior(ShutdownBehavior::SkipOnShutdown, || {});
        result.store(if accepted { 1 } else { 2 }, Ordering::SeqCst);
    }));
    assert!(wait_until(Duration::from_secs(5), || {
        started.load(Ordering::SeqCst)
    }));

    pool.shutdown();
    drop(pool);
    assert_eq!(
        post_result.load(Ordering::SeqCst),
        2,
        "the rejected post must have happened before shutdown completed"
    );
    seqpool::test_complete!("drop_after_shutdown_joins_workers");
}

#[derive(Default)]
struct RecordingObserver {
    has_work: AtomicUsize,
    will_wait: AtomicBool,
    destruct: AtomicBool,
}

impl PoolObserver for RecordingObserver {
    fn on_has_work(&self) {
        self.has_work.fetch_add(1, Ordering::SeqCst);
    }
    fn will_wait_for_shutdown(&self) {
        self.will_wait.store(true, Ordering::SeqCst);
    }
    fn on_destruct(&self) {
        self.destruct.store(true, Ordering::SeqCst);
    }
}

#[test]
fn observer_sees_lifecycle_events() {
    init_test_logging();
    seqpool::test_phase!("observer_sees_lifecycle_events");

    let observer = Arc::new(RecordingObserver::default());
    let pool = SequencedPool::builder()
        .max_threads(1)
        .thread_name_prefix("sd-observer")
        .observer(Arc::clone(&observer) as Arc<dyn PoolObserver>)
        .build();

    assert!(pool.post(|| {
        thread::sleep(Duration::from_millis(200));
    }));
    // The first post starts a thread; this one signals it.
    assert!(pool.post(|| {}));
    assert!(observer.has_work.load(Ordering::SeqCst) >= 1);

    pool.shutdown();
    assert!(observer.will_wait.load(Ordering::SeqCst));

    drop(pool);
    assert!(observer.destruct.load(Ordering::SeqCst));
    seqpool::test_complete!("observer_sees_lifecycle_events");
}

#[test]
fn panicking_task_does_not_wedge_its_sequence() {
    init_test_logging();
    seqpool::test_phase!("panicking_task_does_not_wedge_its_sequence");

    let pool = SequencedPool::new(2, "sd-panic");
    let token = pool.sequence_token();
    let ran_after_panic = Arc::new(AtomicBool::new(false));

    assert!(pool.post_sequenced(token, || panic!("intentional test panic")));
    let flag = Arc::clone(&ran_after_panic);
    assert!(pool.post_sequenced(token, move || {
        flag.store(true, Ordering::SeqCst);
    }));

    pool.shutdown();
    assert!(
        ran_after_panic.load(Ordering::SeqCst),
        "sequence must stay runnable after a panicking task"
    );
    seqpool::test_complete!("panicking_task_does_not_wedge_its_sequence");
}

#[test]
fn shutdown_is_idempotent() {
    init_test_logging();
    seqpool::test_phase!("shutdown_is_idempotent");

    let pool = SequencedPool::new(1, "sd-twice");
    assert!(pool.post(|| {}));
    pool.shutdown();
    assert!(pool.is_shutdown_in_progress());
    pool.shutdown();
    assert!(pool.is_shutdown_in_progress());
    seqpool::test_complete!("shutdown_is_idempotent");
}
