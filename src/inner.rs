//! The pool engine.
//!
//! One mutex guards every piece of scheduling state: the pending set, the
//! set of sequences currently being executed, the worker registry, the
//! counters, and the shutdown/flush state machines. Two condition variables
//! hang off that mutex:
//!
//! - `has_work`: waited on by idle workers; signalled by posts, by shutdown,
//!   and by workers finishing or exiting.
//! - `can_shutdown`: waited on by the thread inside [`Inner::shutdown`] and by
//!   the thread inside [`Inner::flush_for_testing`]; signalled by workers as
//!   the relevant counters drain.
//!
//! The lock protects metadata only. Task closures always run, and are always
//! destroyed, with the lock released, so a closure is free to post new work
//! or query the pool from inside its own body or destructor.

use crate::config::PoolConfig;
use crate::task::{PendingTaskSet, SequencedTask, ShutdownBehavior, Task, TaskKey};
use crate::token::SequenceToken;
use crate::worker::{self, Worker};
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Phases of the flush barrier. One worker is elected to drain the pending
/// set while every other worker idles; see [`Inner::flush_for_testing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanupState {
    /// Steady state; no flush in progress.
    Done,
    /// A flush was requested; no worker has picked it up yet.
    Requested,
    /// The elected worker is waiting for its siblings to idle.
    Starting,
    /// The elected worker is draining the pending set alone.
    Running,
    /// Drained; idlers are being released.
    Finishing,
}

/// Result of one `get_work` scan.
enum GetWork {
    /// A ready, runnable task was selected and removed from the pending set.
    Found(TaskKey, SequencedTask),
    /// The earliest runnable task lies in the future by this much.
    Wait(Duration),
    /// Nothing runnable at all.
    NotFound,
}

/// State guarded by the engine mutex.
struct Shared {
    /// Name → token memo for named sequences.
    named_tokens: HashMap<String, SequenceToken>,
    /// Submission-order counter; assigned under the lock at post time.
    next_sequence_task_number: u64,
    pending_tasks: PendingTaskSet,
    /// Pending tasks with `BlockShutdown` behavior (subset of `pending_tasks`).
    blocking_shutdown_pending_task_count: usize,
    /// Token ids currently being executed by some worker.
    current_sequences: HashSet<u64>,
    /// Thread registry. Entries are never removed; join handles are drained
    /// only when the pool is dropped.
    threads: HashMap<ThreadId, Worker>,
    thread_handles: Vec<JoinHandle<()>>,
    /// At most one thread creation is in flight; the flag is cleared by the
    /// new thread itself when it registers, so `shutdown` cannot complete
    /// believing no more threads will appear.
    thread_being_created: bool,
    /// Workers currently parked in the idle wait.
    waiting_thread_count: usize,
    /// Workers currently executing a task whose behavior is not
    /// `ContinueOnShutdown`.
    blocking_shutdown_thread_count: usize,
    /// Monotonic false → true.
    shutdown_called: bool,
    /// Remaining budget of `BlockShutdown` tasks accepted after shutdown.
    max_blocking_tasks_after_shutdown: usize,
    cleanup_state: CleanupState,
    /// Workers idled into the flush barrier.
    cleanup_idlers: usize,
}

impl Shared {
    fn new() -> Self {
        Self {
            named_tokens: HashMap::new(),
            next_sequence_task_number: 0,
            pending_tasks: PendingTaskSet::default(),
            blocking_shutdown_pending_task_count: 0,
            current_sequences: HashSet::new(),
            threads: HashMap::new(),
            thread_handles: Vec::new(),
            thread_being_created: false,
            waiting_thread_count: 0,
            blocking_shutdown_thread_count: 0,
            shutdown_called: false,
            max_blocking_tasks_after_shutdown: 0,
            cleanup_state: CleanupState::Done,
            cleanup_idlers: 0,
        }
    }

    /// A token is runnable iff it is unsequenced or no worker is executing it.
    fn is_sequence_runnable(&self, token_id: u64) -> bool {
        token_id == 0 || !self.current_sequences.contains(&token_id)
    }

    fn named_token(&mut self, name: &str) -> SequenceToken {
        if let Some(token) = self.named_tokens.get(name) {
            return *token;
        }
        let token = SequenceToken::next();
        self.named_tokens.insert(name.to_string(), token);
        token
    }

    /// Shutdown is complete once no thread creation is in flight, no worker is
    /// executing a non-`ContinueOnShutdown` task, and no `BlockShutdown` task
    /// is still pending.
    fn can_shutdown(&self) -> bool {
        !self.thread_being_created
            && self.blocking_shutdown_thread_count == 0
            && self.blocking_shutdown_pending_task_count == 0
    }
}

/// The pool engine shared by the facade, handles, task runners, and workers.
pub(crate) struct Inner {
    config: PoolConfig,
    /// Thread that constructed the pool; `shutdown` must run on it.
    owner: ThreadId,
    shared: Mutex<Shared>,
    has_work_cv: Condvar,
    can_shutdown_cv: Condvar,
}

impl Inner {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            owner: thread::current().id(),
            shared: Mutex::new(Shared::new()),
            has_work_cv: Condvar::new(),
            can_shutdown_cv: Condvar::new(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().expect("pool state lock poisoned")
    }

    fn wait_has_work<'a>(&'a self, guard: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
        self.has_work_cv
            .wait(guard)
            .expect("pool state lock poisoned")
    }

    fn wait_has_work_timeout<'a>(
        &'a self,
        guard: MutexGuard<'a, Shared>,
        timeout: Duration,
    ) -> MutexGuard<'a, Shared> {
        self.has_work_cv
            .wait_timeout(guard, timeout)
            .expect("pool state lock poisoned")
            .0
    }

    fn wait_can_shutdown<'a>(&'a self, guard: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
        self.can_shutdown_cv
            .wait(guard)
            .expect("pool state lock poisoned")
    }

    /// Wakes one idle worker and tells the observer work arrived. Called with
    /// the lock released so the observer is free to call back into the pool.
    fn signal_has_work(&self) {
        if let Some(observer) = &self.config.observer {
            observer.on_has_work();
        }
        self.has_work_cv.notify_one();
    }

    // === Thread creation ===

    /// Decides, under the lock, whether one more worker would help right now.
    ///
    /// Returns the new thread's ordinal (for naming), or 0. The "no thread is
    /// idle" condition intentionally treats a timed-waiting worker as idle,
    /// which can briefly under-provision after a burst of posts; the re-check
    /// a worker performs before running each task closes the gap.
    fn prepare_to_start_additional_thread_if_helpful(&self, shared: &mut Shared) -> usize {
        if !shared.shutdown_called
            && !shared.thread_being_created
            && shared.cleanup_state == CleanupState::Done
            && shared.threads.len() < self.config.max_threads
            && shared.waiting_thread_count == 0
        {
            let has_runnable = shared
                .pending_tasks
                .iter()
                .any(|(_, entry)| shared.is_sequence_runnable(entry.sequence_token_id));
            if has_runnable {
                shared.thread_being_created = true;
                return shared.threads.len() + 1;
            }
        }
        0
    }

    /// Scans the pending set in time order for the first ready task whose
    /// sequence is runnable.
    ///
    /// Tasks that shutdown makes obsolete are removed and their closures
    /// pushed into `discards`; the caller must drop those with the lock
    /// released, because a closure's destructor may re-enter the pool.
    fn get_work(&self, shared: &mut Shared, discards: &mut Vec<Task>) -> GetWork {
        let now = Instant::now();
        let mut unrunnable = 0usize;
        let mut discard_keys: Vec<TaskKey> = Vec::new();
        let mut selected: Option<TaskKey> = None;
        let mut outcome = GetWork::NotFound;

        for (key, entry) in shared.pending_tasks.iter() {
            if !shared.is_sequence_runnable(entry.sequence_token_id) {
                unrunnable += 1;
                continue;
            }
            if shared.shutdown_called
                && entry.shutdown_behavior != ShutdownBehavior::BlockShutdown
            {
                discard_keys.push(*key);
                continue;
            }
            if key.time_to_run > now {
                // The set is time-ordered: nothing later can be ready sooner.
                outcome = GetWork::Wait(key.time_to_run - now);
                break;
            }
            selected = Some(*key);
            break;
        }

        if !discard_keys.is_empty() {
            tracing::trace!(count = discard_keys.len(), "discarding tasks at shutdown");
            for key in &discard_keys {
                if let Some(task) = shared.pending_tasks.remove(key) {
                    discards.push(task.task);
                }
            }
        }

        if let Some(key) = selected {
            let entry = shared
                .pending_tasks
                .remove(&key)
                .expect("selected pending task vanished");
            if entry.shutdown_behavior == ShutdownBehavior::BlockShutdown {
                shared.blocking_shutdown_pending_task_count -= 1;
            }
            return GetWork::Found(key, entry);
        }
        if matches!(outcome, GetWork::NotFound) && unrunnable > 0 {
            tracing::trace!(unrunnable, "all pending tasks belong to busy sequences");
        }
        outcome
    }

    /// Bookkeeping before a task runs: reserve its sequence, count it toward
    /// shutdown, and record it in the worker's registry entry.
    fn will_run_worker_task(
        &self,
        shared: &mut Shared,
        thread_id: ThreadId,
        sequence_token_id: u64,
        shutdown_behavior: ShutdownBehavior,
    ) {
        if sequence_token_id != 0 {
            let inserted = shared.current_sequences.insert(sequence_token_id);
            debug_assert!(inserted, "sequence already marked running");
        }
        if shutdown_behavior != ShutdownBehavior::ContinueOnShutdown {
            shared.blocking_shutdown_thread_count += 1;
        }
        let entry = shared
            .threads
            .get_mut(&thread_id)
            .expect("worker not registered");
        entry.is_processing_task = true;
        entry.task_sequence_token_id = sequence_token_id;
        entry.task_shutdown_behavior = shutdown_behavior;
    }

    /// Exact inverse of [`will_run_worker_task`]; every dequeue-and-run pairs
    /// with exactly one call.
    ///
    /// [`will_run_worker_task`]: Inner::will_run_worker_task
    fn did_run_worker_task(
        &self,
        shared: &mut Shared,
        thread_id: ThreadId,
        sequence_token_id: u64,
        shutdown_behavior: ShutdownBehavior,
    ) {
        if let Some(entry) = shared.threads.get_mut(&thread_id) {
            entry.is_processing_task = false;
            entry.task_sequence_token_id = 0;
        }
        if sequence_token_id != 0 {
            let removed = shared.current_sequences.remove(&sequence_token_id);
            debug_assert!(removed, "sequence unmarked without being marked");
        }
        if shutdown_behavior != ShutdownBehavior::ContinueOnShutdown {
            shared.blocking_shutdown_thread_count -= 1;
            if shared.shutdown_called && shared.can_shutdown() {
                self.can_shutdown_cv.notify_all();
            }
        }
    }

    // === Shutdown and flush ===

    /// Begins shutdown and blocks until it is safe to tear the pool down.
    ///
    /// `max_new_blocking_tasks` is the budget of `BlockShutdown` tasks still
    /// accepted after this point (for work posted by tasks that shutdown is
    /// already waiting for).
    pub fn shutdown(&self, max_new_blocking_tasks: usize) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "shutdown must run on the thread that created the pool"
        );
        let mut shared = self.lock();
        debug_assert_eq!(
            shared.cleanup_state,
            CleanupState::Done,
            "shutdown during flush_for_testing"
        );
        if shared.shutdown_called {
            return;
        }
        shared.shutdown_called = true;
        shared.max_blocking_tasks_after_shutdown = max_new_blocking_tasks;
        tracing::debug!(
            pending = shared.pending_tasks.len(),
            threads = shared.threads.len(),
            "pool shutdown initiated"
        );
        // Wake everyone: workers re-evaluate, discard obsolete work, and exit.
        self.has_work_cv.notify_all();
        if shared.can_shutdown() {
            tracing::debug!("pool shutdown complete");
            return;
        }
        drop(shared);

        if let Some(observer) = &self.config.observer {
            observer.will_wait_for_shutdown();
        }
        let mut shared = self.lock();
        while !shared.can_shutdown() {
            shared = self.wait_can_shutdown(shared);
        }
        tracing::debug!("pool shutdown complete");
    }

    /// Blocks until every currently-pending task has executed and all workers
    /// but the elected drainer are idle. Quiescence barrier for tests; does
    /// not shut the pool down.
    ///
    /// Waits for delayed tasks to become due and run. Must not be called from
    /// a pool worker, after shutdown, or concurrently with itself.
    pub fn flush_for_testing(&self) {
        debug_assert!(
            !self.runs_tasks_on_current_thread(),
            "flush_for_testing called from a pool worker"
        );
        let mut shared = self.lock();
        debug_assert!(!shared.shutdown_called, "flush_for_testing after shutdown");
        debug_assert_eq!(
            shared.cleanup_state,
            CleanupState::Done,
            "concurrent flush_for_testing"
        );
        if shared.pending_tasks.is_empty()
            && shared.waiting_thread_count == shared.threads.len()
            && !shared.thread_being_created
        {
            return;
        }
        shared.cleanup_state = CleanupState::Requested;
        shared.cleanup_idlers = 0;
        self.has_work_cv.notify_one();
        while shared.cleanup_state != CleanupState::Done {
            shared = self.wait_can_shutdown(shared);
        }
    }

    /// Joins every worker thread. Called from the facade's `Drop` after
    /// shutdown has completed.
    pub fn join_all_workers(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut shared = self.lock();
            shared.thread_handles.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    // === Tokens and introspection ===

    pub fn named_sequence_token(&self, name: &str) -> SequenceToken {
        self.lock().named_token(name)
    }

    pub fn runs_tasks_on_current_thread(&self) -> bool {
        self.lock().threads.contains_key(&thread::current().id())
    }

    pub fn is_running_sequence_on_current_thread(&self, token: SequenceToken) -> bool {
        let shared = self.lock();
        shared
            .threads
            .get(&thread::current().id())
            .is_some_and(|entry| {
                entry.is_processing_task && entry.task_sequence_token_id == token.raw()
            })
    }

    pub fn current_sequence_token(&self) -> Option<SequenceToken> {
        let shared = self.lock();
        shared
            .threads
            .get(&thread::current().id())
            .and_then(|entry| {
                if entry.is_processing_task && entry.task_sequence_token_id != 0 {
                    Some(SequenceToken::from_raw(entry.task_sequence_token_id))
                } else {
                    None
                }
            })
    }

    pub fn is_shutdown_in_progress(&self) -> bool {
        self.lock().shutdown_called
    }

    pub fn active_threads(&self) -> usize {
        self.lock().threads.len()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending_tasks.len()
    }
}

/// Single funnel for the whole `post_*` family.
///
/// Returns `true` iff the task was durably enqueued. With `sequence_name`
/// given, name resolution and enqueue happen under one lock acquisition.
/// Free function over `&Arc<Inner>` because acceptance may have to finish
/// starting a worker thread, which needs a clonable engine reference.
pub(crate) fn post_task(
    inner: &Arc<Inner>,
    sequence_name: Option<&str>,
    token: SequenceToken,
    shutdown_behavior: ShutdownBehavior,
    delay: Duration,
    task: Task,
) -> bool {
    debug_assert!(
        delay.is_zero() || shutdown_behavior == ShutdownBehavior::SkipOnShutdown,
        "delayed tasks must use ShutdownBehavior::SkipOnShutdown"
    );
    let time_to_run = Instant::now() + delay;
    let new_thread_ordinal;
    {
        let mut shared = inner.lock();
        if shared.shutdown_called {
            // Only blocking work is admitted now, and only within the budget,
            // and never on behalf of a task that shutdown is not already
            // waiting for (its descendants would never run).
            if shutdown_behavior != ShutdownBehavior::BlockShutdown {
                return false;
            }
            if let Some(entry) = shared.threads.get(&thread::current().id()) {
                if entry.is_processing_task
                    && entry.task_shutdown_behavior != ShutdownBehavior::BlockShutdown
                {
                    return false;
                }
            }
            if shared.max_blocking_tasks_after_shutdown == 0 {
                return false;
            }
            shared.max_blocking_tasks_after_shutdown -= 1;
        }

        let sequence_token_id = match sequence_name {
            Some(name) => shared.named_token(name).raw(),
            None => token.raw(),
        };
        shared.next_sequence_task_number += 1;
        let key = TaskKey {
            time_to_run,
            sequence_task_number: shared.next_sequence_task_number,
        };
        if shutdown_behavior == ShutdownBehavior::BlockShutdown {
            shared.blocking_shutdown_pending_task_count += 1;
        }
        shared.pending_tasks.insert(
            key,
            SequencedTask {
                sequence_token_id,
                shutdown_behavior,
                task,
            },
        );
        new_thread_ordinal = inner.prepare_to_start_additional_thread_if_helpful(&mut shared);
    }
    // Lock released: either complete the thread start or wake a sleeper.
    if new_thread_ordinal > 0 {
        finish_starting_additional_thread(inner, new_thread_ordinal);
    } else {
        inner.signal_has_work();
    }
    true
}

/// Constructs the thread reserved by
/// [`Inner::prepare_to_start_additional_thread_if_helpful`], outside the lock
/// so task submission never blocks on OS thread-creation latency.
///
/// On spawn failure the reservation is released and the next post retries.
fn finish_starting_additional_thread(inner: &Arc<Inner>, ordinal: usize) {
    match worker::spawn_worker(Arc::clone(inner), ordinal) {
        Ok(handle) => {
            inner.lock().thread_handles.push(handle);
        }
        Err(error) => {
            tracing::error!(%error, ordinal, "failed to spawn worker thread");
            inner.lock().thread_being_created = false;
            inner.signal_has_work();
        }
    }
}

/// Body of every worker thread.
pub(crate) fn thread_loop(inner: &Arc<Inner>) {
    let thread_id = thread::current().id();
    tracing::trace!(?thread_id, "worker started");
    let mut is_cleanup_runner = false;
    let mut parting_discards: Vec<Task> = Vec::new();

    let mut shared = inner.lock();
    debug_assert!(shared.thread_being_created);
    shared.thread_being_created = false;
    shared.threads.insert(thread_id, Worker::new());

    loop {
        // Flush-barrier rendezvous. The worker that observes Requested is
        // elected to drain; everyone else idles until the drain finishes.
        match shared.cleanup_state {
            CleanupState::Requested => {
                shared.cleanup_state = CleanupState::Starting;
                is_cleanup_runner = true;
                inner.has_work_cv.notify_all();
                while shared.cleanup_idlers + 1 != shared.threads.len() {
                    inner.has_work_cv.notify_all();
                    shared = inner.wait_has_work(shared);
                }
                shared.cleanup_state = CleanupState::Running;
                inner.has_work_cv.notify_all();
            }
            CleanupState::Starting | CleanupState::Running if !is_cleanup_runner => {
                shared.cleanup_idlers += 1;
                inner.has_work_cv.notify_all();
                while matches!(
                    shared.cleanup_state,
                    CleanupState::Starting | CleanupState::Running
                ) {
                    shared = inner.wait_has_work(shared);
                }
                shared.cleanup_idlers -= 1;
                inner.has_work_cv.notify_all();
            }
            _ => {}
        }

        let mut discards: Vec<Task> = Vec::new();
        match inner.get_work(&mut shared, &mut discards) {
            GetWork::Found(_key, selected) => {
                let SequencedTask {
                    sequence_token_id,
                    shutdown_behavior,
                    task,
                } = selected;
                inner.will_run_worker_task(
                    &mut shared,
                    thread_id,
                    sequence_token_id,
                    shutdown_behavior,
                );
                // Checked before dropping the lock so a second thread can
                // start concurrently with this task running.
                let new_thread_ordinal =
                    inner.prepare_to_start_additional_thread_if_helpful(&mut shared);
                drop(shared);

                drop(discards);
                if new_thread_ordinal > 0 {
                    finish_starting_additional_thread(inner, new_thread_ordinal);
                }

                // The closure is consumed (and destroyed) here, while this
                // worker is still marked as running the task, so its
                // destructor can query its own sequence state.
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    tracing::error!(?thread_id, "task panicked; worker continuing");
                }

                shared = inner.lock();
                inner.did_run_worker_task(
                    &mut shared,
                    thread_id,
                    sequence_token_id,
                    shutdown_behavior,
                );
            }
            GetWork::Wait(wait) => {
                if !discards.is_empty() {
                    drop(shared);
                    drop(discards);
                    shared = inner.lock();
                    continue;
                }
                shared.waiting_thread_count += 1;
                shared = inner.wait_has_work_timeout(shared, wait);
                shared.waiting_thread_count -= 1;
            }
            GetWork::NotFound => {
                if is_cleanup_runner && shared.cleanup_state == CleanupState::Running {
                    // Drained. Release the idlers, wait for them to leave the
                    // barrier, then report completion.
                    shared.cleanup_state = CleanupState::Finishing;
                    inner.has_work_cv.notify_all();
                    while shared.cleanup_idlers != 0 {
                        shared = inner.wait_has_work(shared);
                    }
                    shared.cleanup_state = CleanupState::Done;
                    is_cleanup_runner = false;
                    inner.has_work_cv.notify_all();
                    inner.can_shutdown_cv.notify_all();
                    continue;
                }
                if shared.shutdown_called && shared.blocking_shutdown_pending_task_count == 0 {
                    parting_discards = discards;
                    break;
                }
                if !discards.is_empty() {
                    drop(shared);
                    drop(discards);
                    shared = inner.lock();
                    continue;
                }
                shared.waiting_thread_count += 1;
                shared = inner.wait_has_work(shared);
                shared.waiting_thread_count -= 1;
            }
        }
    }

    // Registry entry is kept; only the join handle is taken at pool drop.
    // Wake a sibling so shutdown fan-out completes, then report toward
    // can_shutdown.
    drop(shared);
    drop(parting_discards);
    tracing::trace!(?thread_id, "worker exiting");
    inner.has_work_cv.notify_one();
    inner.can_shutdown_cv.notify_one();
}
